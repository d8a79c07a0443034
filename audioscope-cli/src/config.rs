//! Configuration file handling.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use audioscope_types::{EngineConfig, OutputTarget, SourceSelection};

use crate::args::CliArgs;

/// Everything needed to run the monitor. Missing sections take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub source: SourceSelection,
    pub output: OutputTarget,
}

impl AppConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Override file values with command-line flags.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(device) = &args.device {
            self.source.device = Some(device.clone());
        }
        if let Some(channels) = args.channels {
            self.source.channels = channels;
        }
        if let Some(rate) = args.sample_rate {
            self.source.sample_rate = rate;
        }
        if let Some((encoding, bits)) = args.format {
            self.source.encoding = encoding;
            self.source.bits = bits;
        }
        if let Some(gain) = args.gain {
            self.source.gain = gain;
        }
        if let Some(output) = &args.output {
            self.output = output.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audioscope_types::SampleEncoding;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{ "engine": { "spectrum_size": 2048 }, "output": { "device": { "name": null } } }"#,
        )
        .unwrap();

        assert_eq!(config.engine.spectrum_size, 2048);
        assert_eq!(config.engine.level_period_ms, 100);
        assert_eq!(config.source, SourceSelection::default());
        assert_eq!(config.output, OutputTarget::Device { name: None });
    }

    #[test]
    fn test_invalid_engine_section_is_rejected() {
        let err = AppConfig::from_json(r#"{ "engine": { "drop_threshold_ms": 10 } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            channels: Some(1),
            format: Some((SampleEncoding::SignedInt, 16)),
            output: Some(OutputTarget::Null),
            ..CliArgs::default()
        };

        config.apply_args(&args);

        assert_eq!(config.source.channels, 1);
        assert_eq!(config.source.encoding, SampleEncoding::SignedInt);
        assert_eq!(config.source.bits, 16);
        assert_eq!(config.source.sample_rate, 48_000);
        assert_eq!(config.output, OutputTarget::Null);
    }
}
