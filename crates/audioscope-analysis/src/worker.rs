//! Analyzer threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, instrument, trace};

use audioscope_types::{Publisher, SampleBlock};

use crate::error::AnalysisError;
use crate::AnalysisResult;

/// How long a worker waits for input before rechecking its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Incremental analysis over the sample stream.
pub trait Analyzer: Send + 'static {
    type Output: Send + Sync + 'static;

    /// Feed one block, appending any results to `out`.
    fn process(&mut self, block: &SampleBlock, out: &mut Vec<Self::Output>);
}

/// Runs one analyzer on its own thread, publishing what it produces.
///
/// The thread ends when stopped or when the input channel disconnects.
pub struct AnalyzerWorker<A: Analyzer> {
    name: String,
    worker_thread: Option<JoinHandle<A>>,
    should_stop: Arc<AtomicBool>,
    blocks_processed: Arc<AtomicU64>,
    publisher: Arc<Publisher<A::Output>>,
}

impl<A: Analyzer> AnalyzerWorker<A> {
    /// Spawn a thread feeding `input` through `analyzer`.
    #[instrument(name = "analyzer_spawn", skip(analyzer, input, publisher))]
    pub fn spawn(
        thread_name: &str,
        analyzer: A,
        input: Receiver<Arc<SampleBlock>>,
        publisher: Arc<Publisher<A::Output>>,
    ) -> AnalysisResult<Self> {
        let should_stop = Arc::new(AtomicBool::new(false));
        let blocks_processed = Arc::new(AtomicU64::new(0));

        let thread_stop = Arc::clone(&should_stop);
        let thread_count = Arc::clone(&blocks_processed);
        let thread_publisher = Arc::clone(&publisher);

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                analyzer_thread(analyzer, input, thread_publisher, thread_stop, thread_count)
            })
            .map_err(|e| AnalysisError::Thread(e.to_string()))?;

        info!(analyzer = thread_name, "Analyzer started");
        Ok(Self {
            name: thread_name.to_string(),
            worker_thread: Some(handle),
            should_stop,
            blocks_processed,
            publisher,
        })
    }

    /// Subscribe to the analyzer's results.
    pub fn subscribe(&self) -> Receiver<Arc<A::Output>> {
        self.publisher.subscribe()
    }

    /// Blocks consumed so far.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    /// Stop the thread and take back the analyzer.
    #[instrument(name = "analyzer_stop", skip(self), fields(analyzer = %self.name))]
    pub fn stop(&mut self) -> Option<A> {
        let handle = self.worker_thread.take()?;
        self.should_stop.store(true, Ordering::SeqCst);
        let analyzer = handle.join().ok();
        info!("Analyzer stopped");
        analyzer
    }
}

impl<A: Analyzer> Drop for AnalyzerWorker<A> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn analyzer_thread<A: Analyzer>(
    mut analyzer: A,
    input: Receiver<Arc<SampleBlock>>,
    publisher: Arc<Publisher<A::Output>>,
    should_stop: Arc<AtomicBool>,
    blocks_processed: Arc<AtomicU64>,
) -> A {
    debug!("Analyzer thread started");
    let mut results = Vec::new();

    while !should_stop.load(Ordering::SeqCst) {
        let block = match input.recv_timeout(POLL_INTERVAL) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Sample stream closed");
                break;
            }
        };

        analyzer.process(&block, &mut results);
        blocks_processed.fetch_add(1, Ordering::Relaxed);
        if !results.is_empty() {
            trace!(count = results.len(), "Publishing analysis results");
        }
        for result in results.drain(..) {
            publisher.publish(result);
        }
    }

    debug!("Analyzer thread exiting");
    analyzer
}
