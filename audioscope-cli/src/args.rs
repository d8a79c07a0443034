//! Command-line argument parsing.

use std::env;

use audioscope_types::{OutputTarget, SampleEncoding};

/// Parsed command-line arguments.
///
/// Source and output flags override the values from the config file.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    /// JSON configuration file.
    pub config_path: Option<String>,
    /// Capture device name.
    pub device: Option<String>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    /// Sample encoding and width.
    pub format: Option<(SampleEncoding, u16)>,
    pub gain: Option<f32>,
    pub output: Option<OutputTarget>,
    /// Stop after this many seconds.
    pub seconds: Option<u64>,
    pub list_devices: bool,
    pub show_help: bool,
}

/// Parse a sample format such as `s16` or `f32`.
pub fn parse_format(value: &str) -> Option<(SampleEncoding, u16)> {
    let value = value.to_ascii_lowercase();
    let (encoding, bits) = value.split_at(1.min(value.len()));
    let encoding = match encoding {
        "s" | "i" => SampleEncoding::SignedInt,
        "u" => SampleEncoding::UnsignedInt,
        "f" => SampleEncoding::Float,
        _ => return None,
    };
    bits.parse().ok().map(|bits| (encoding, bits))
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    /// Parse arguments from an iterator, without the program name.
    pub fn parse_from<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut parsed = Self::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };

            match flag.as_str() {
                "--help" | "-h" => parsed.show_help = true,
                "--list-devices" => parsed.list_devices = true,
                "--config" | "--device" | "--channels" | "--rate" | "--format" | "--gain"
                | "--output" | "--seconds" => {
                    let Some(value) = inline.or_else(|| iter.next()) else {
                        eprintln!("{} requires an argument", flag);
                        parsed.show_help = true;
                        continue;
                    };
                    if !parsed.apply(&flag, &value) {
                        eprintln!("Invalid value for {}: {}", flag, value);
                        parsed.show_help = true;
                    }
                }
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    parsed.show_help = true;
                }
            }
        }

        parsed
    }

    fn apply(&mut self, flag: &str, value: &str) -> bool {
        match flag {
            "--config" => self.config_path = Some(value.to_string()),
            "--device" => self.device = Some(value.to_string()),
            "--channels" => match value.parse() {
                Ok(channels) if channels > 0 => self.channels = Some(channels),
                _ => return false,
            },
            "--rate" => match value.parse() {
                Ok(rate) if rate > 0 => self.sample_rate = Some(rate),
                _ => return false,
            },
            "--format" => match parse_format(value) {
                Some(format) => self.format = Some(format),
                None => return false,
            },
            "--gain" => match value.parse() {
                Ok(gain) => self.gain = Some(gain),
                Err(_) => return false,
            },
            "--output" => {
                self.output = Some(match value {
                    "null" | "none" => OutputTarget::Null,
                    "default" => OutputTarget::Device { name: None },
                    name => OutputTarget::Device {
                        name: Some(name.to_string()),
                    },
                })
            }
            "--seconds" => match value.parse() {
                Ok(seconds) => self.seconds = Some(seconds),
                Err(_) => return false,
            },
            _ => return false,
        }
        true
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  audioscope [options]\n\n\
             Options:\n\
             \x20 --config <file>      JSON configuration (engine, source, output)\n\
             \x20 --device <name>      Capture device (default input if omitted)\n\
             \x20 --channels <n>       Capture channel count\n\
             \x20 --rate <hz>          Capture sample rate\n\
             \x20 --format <fmt>       Sample format: s16, s32, u16, u32, f32\n\
             \x20 --gain <x>           Input gain applied after conversion\n\
             \x20 --output <target>    null, default, or an output device name\n\
             \x20 --seconds <n>        Stop after n seconds\n\
             \x20 --list-devices       List audio devices and exit\n\
             \x20 -h, --help           Show this help\n\n\
             Logging is controlled with RUST_LOG (e.g. RUST_LOG=audioscope_audio=debug).\n"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(parse(&[]), CliArgs::default());
    }

    #[test]
    fn test_source_flags() {
        let args = parse(&[
            "--device",
            "USB Mic",
            "--channels=1",
            "--rate",
            "44100",
            "--format",
            "s16",
            "--gain=2.5",
        ]);

        assert_eq!(args.device.as_deref(), Some("USB Mic"));
        assert_eq!(args.channels, Some(1));
        assert_eq!(args.sample_rate, Some(44_100));
        assert_eq!(args.format, Some((SampleEncoding::SignedInt, 16)));
        assert_eq!(args.gain, Some(2.5));
        assert!(!args.show_help);
    }

    #[test]
    fn test_output_targets() {
        assert_eq!(parse(&["--output", "null"]).output, Some(OutputTarget::Null));
        assert_eq!(
            parse(&["--output=default"]).output,
            Some(OutputTarget::Device { name: None })
        );
        assert_eq!(
            parse(&["--output", "Speakers"]).output,
            Some(OutputTarget::Device {
                name: Some("Speakers".to_string())
            })
        );
    }

    #[test]
    fn test_bad_values_request_help() {
        assert!(parse(&["--channels", "0"]).show_help);
        assert!(parse(&["--format", "s24x"]).show_help);
        assert!(parse(&["--rate"]).show_help);
        assert!(parse(&["--bogus"]).show_help);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("f32"), Some((SampleEncoding::Float, 32)));
        assert_eq!(parse_format("U16"), Some((SampleEncoding::UnsignedInt, 16)));
        assert_eq!(parse_format("i32"), Some((SampleEncoding::SignedInt, 32)));
        assert_eq!(parse_format("x16"), None);
        assert_eq!(parse_format(""), None);
    }
}
