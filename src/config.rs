// src/config.rs

//! Configuration for the simulated line and the session around it.
//!
//! Settings are read from a JSON file. Every section and field has a default,
//! so a partial file only overrides what it names, and a missing file at the
//! default location means "all defaults".

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the user's config dir holding `config.json`.
pub const CONFIG_DIR_NAME: &str = "baudsim";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("escape character {0:?} must be a single ASCII character")]
    InvalidEscape(char),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("baud limits are inverted: min {min} > max {max}")]
    BaudLimits { min: u32, max: u32 },
}

/// Root of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Framing and limits of the simulated serial line.
    pub line: LineConfig,
    /// Keyboard and buffering behaviour.
    pub session: SessionConfig,
    /// The child process.
    pub shell: ShellConfig,
}

/// Framing and limits of the simulated serial line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LineConfig {
    /// Bit-times per transmitted byte: start bit, 8 data bits, stop bit.
    pub bits_per_byte: u32,
    /// Refresh rate of the reference display. The pacing timer never fires
    /// faster than this.
    pub reference_fps: u32,
    pub min_baud: u32,
    pub max_baud: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            bits_per_byte: 10,
            reference_fps: 60,
            min_baud: 150,
            max_baud: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Typed as the first character of a line, ends the session.
    pub escape_char: char,
    /// Largest single read from the PTY.
    pub read_chunk_size: usize,
    /// Starting size of the pending-output buffer. It doubles on demand.
    pub initial_buffer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            escape_char: '~',
            read_chunk_size: 4096,
            initial_buffer_capacity: 4096,
        }
    }
}

impl SessionConfig {
    /// The escape character as the byte the keyboard delivers.
    pub fn escape_byte(&self) -> Result<u8, ConfigError> {
        if self.escape_char.is_ascii() {
            Ok(self.escape_char as u8)
        } else {
            Err(ConfigError::InvalidEscape(self.escape_char))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            program: PathBuf::from("/bin/sh"),
            args: Vec::new(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/baudsim/config.json` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads `path` if given, else the default location.
    ///
    /// An explicitly named file must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    log::debug!("No config file found, using defaults.");
                    Config::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.escape_byte()?;
        let nonzero = [
            ("line.bits_per_byte", self.line.bits_per_byte as usize),
            ("line.reference_fps", self.line.reference_fps as usize),
            ("line.min_baud", self.line.min_baud as usize),
            ("session.read_chunk_size", self.session.read_chunk_size),
            (
                "session.initial_buffer_capacity",
                self.session.initial_buffer_capacity,
            ),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field: *field });
        }
        if self.line.min_baud > self.line.max_baud {
            return Err(ConfigError::BaudLimits {
                min: self.line.min_baud,
                max: self.line.max_baud,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn defaults_describe_8n1_line_at_60hz() {
        let config = Config::default();
        assert_eq!(config.line.bits_per_byte, 10);
        assert_eq!(config.line.reference_fps, 60);
        assert_eq!((config.line.min_baud, config.line.max_baud), (150, 200_000));
        assert_eq!(config.session.escape_byte().unwrap(), b'~');
        assert_eq!(config.shell.program, PathBuf::from("/bin/sh"));
        assert!(config.validate().is_ok());
    }

    #[test_log::test]
    fn partial_json_keeps_other_defaults() {
        let config = Config::from_json(r#"{ "session": { "escape_char": "!" } }"#).unwrap();
        assert_eq!(config.session.escape_byte().unwrap(), b'!');
        assert_eq!(config.session.read_chunk_size, 4096);
        assert_eq!(config.line, LineConfig::default());
    }

    #[test_log::test]
    fn non_ascii_escape_is_rejected() {
        let mut config = Config::default();
        config.session.escape_char = 'é';
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEscape('é'))
        ));
    }

    #[test_log::test]
    fn zero_fields_are_rejected() {
        let mut config = Config::default();
        config.line.reference_fps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "line.reference_fps"
            })
        ));
    }

    #[test_log::test]
    fn inverted_baud_limits_are_rejected() {
        let mut config = Config::default();
        config.line.min_baud = 9600;
        config.line.max_baud = 300;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BaudLimits { min: 9600, max: 300 })
        ));
    }

    #[test_log::test]
    fn missing_explicit_file_is_an_error() {
        let path = Path::new("/nonexistent/baudsim/config.json");
        assert!(matches!(
            Config::load(Some(path)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test_log::test]
    fn malformed_file_reports_parse_error() {
        let path = std::env::temp_dir().join(format!("baudsim-config-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let result = Config::load(Some(&path));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
