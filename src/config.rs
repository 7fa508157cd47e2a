use crate::{AvError, Result};
use log::LevelFilter;
use std::env;
use std::path::Path;

/// File name looked up in the working directory by [`Config::load`].
pub const CONFIG_FILE: &str = "avpipe.toml";

/// Prefix of the environment variables read by [`Config::from_env`].
pub const ENV_PREFIX: &str = "AVPIPE_";

/// Tunables shared by sessions, decoders and pipelines.
///
/// Nothing is stored globally: build a `Config` and pass it where it is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bytes read before container detection
    pub probe_window: usize,
    /// Packets `probe_streams` may read ahead by default
    pub probe_packets: usize,
    /// Bytes of packet payload `probe_streams` may read ahead by default
    pub probe_bytes: usize,
    /// Read chunk size used by demuxers
    pub io_buffer_size: usize,
    /// Line size alignment of decoded frames
    pub frame_alignment: usize,
    /// Frames a decoder may hold before `send` reports `Busy`
    pub decoder_queue_depth: usize,
    /// Maximum samples per packet for PCM containers
    pub audio_packet_samples: usize,
    /// Maximum samples per decoded PCM frame
    pub audio_frame_samples: usize,
    /// Default level for loggers built from this config
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_window: 64 * 1024,
            probe_packets: 64,
            probe_bytes: 4 * 1024 * 1024,
            io_buffer_size: 32 * 1024,
            frame_alignment: 32,
            decoder_queue_depth: 4,
            audio_packet_samples: 4096,
            audio_frame_samples: 1024,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    /// Defaults, overridden by `./avpipe.toml` when present, overridden by
    /// `AVPIPE_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        if Path::new(CONFIG_FILE).exists() {
            config.merge_file(CONFIG_FILE)?;
        }
        config.merge_env()?;
        Ok(config)
    }

    /// Defaults overridden by the `key = value` lines of `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Config::default();
        config.merge_file(path)?;
        Ok(config)
    }

    /// Defaults overridden by `AVPIPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.merge_env()?;
        Ok(config)
    }

    /// Applies the `key = value` lines of `path`. Blank lines and `#`
    /// comments are ignored; values may be quoted.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| AvError::resource_io(path, e))?;
        self.merge_str(&content)
            .map_err(|e| e.with_resource(&path.display().to_string()))
    }

    /// Applies `key = value` lines from a string.
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        for (number, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                AvError::format(format!("line {}: expected `key = value`", number + 1))
            })?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.set(key.trim(), value)
                .map_err(|e| AvError::format(format!("line {}: {e}", number + 1)))?;
        }
        Ok(())
    }

    /// Applies every recognised `AVPIPE_*` environment variable.
    pub fn merge_env(&mut self) -> Result<()> {
        for (name, value) in env::vars() {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                let key = key.to_ascii_lowercase();
                if Self::KEYS.contains(&key.as_str()) {
                    self.set(&key, &value)
                        .map_err(|e| AvError::format(format!("{name}: {e}")))?;
                }
            }
        }
        Ok(())
    }

    const KEYS: [&'static str; 9] = [
        "probe_window",
        "probe_packets",
        "probe_bytes",
        "io_buffer_size",
        "frame_alignment",
        "decoder_queue_depth",
        "audio_packet_samples",
        "audio_frame_samples",
        "log_level",
    ];

    /// Sets one option by name.
    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        let number = || {
            value
                .replace('_', "")
                .parse::<usize>()
                .map_err(|e| format!("invalid value {value:?} for {key}: {e}"))
        };
        match key {
            "probe_window" => self.probe_window = number()?,
            "probe_packets" => self.probe_packets = number()?,
            "probe_bytes" => self.probe_bytes = number()?,
            "io_buffer_size" => self.io_buffer_size = number()?.max(1),
            "frame_alignment" => {
                let align = number()?;
                if !align.is_power_of_two() {
                    return Err(format!("frame_alignment must be a power of two, got {align}"));
                }
                self.frame_alignment = align;
            }
            "decoder_queue_depth" => self.decoder_queue_depth = number()?.max(1),
            "audio_packet_samples" => self.audio_packet_samples = number()?.max(1),
            "audio_frame_samples" => self.audio_frame_samples = number()?.max(1),
            "log_level" => {
                self.log_level = value
                    .parse::<LevelFilter>()
                    .map_err(|_| format!("invalid log level {value:?}"))?
            }
            other => return Err(format!("unknown option {other:?}")),
        }
        Ok(())
    }
}

/// Writes a commented template with the default values, unless `path`
/// already exists.
pub fn write_default_template(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    let d = Config::default();
    let template = format!(
        r#"# avpipe configuration
# Every key is optional; environment variables AVPIPE_<KEY> take precedence.

# Bytes read before container detection
probe_window = {}
# Read-ahead budget of probe_streams
probe_packets = {}
probe_bytes = {}

# Demuxer read chunk size
io_buffer_size = {}
# Line size alignment of decoded frames (power of two)
frame_alignment = {}
# Frames a decoder buffers before reporting Busy
decoder_queue_depth = {}

# PCM packetization
audio_packet_samples = {}
audio_frame_samples = {}

# off, error, warn, info, debug, trace
log_level = "{}"
"#,
        d.probe_window,
        d.probe_packets,
        d.probe_bytes,
        d.io_buffer_size,
        d.frame_alignment,
        d.decoder_queue_depth,
        d.audio_packet_samples,
        d.audio_frame_samples,
        d.log_level.as_str().to_ascii_lowercase(),
    );
    std::fs::write(path, template).map_err(|e| AvError::resource_io(path, e))
}
