//! Configuration file loading
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! programmer = "linux_gpio:gpiochip=0,reset=25,sck=11,mosi=10,miso=9,count=17"
//! supply_mv = 5000
//!
//! [sim]
//! chip = "attiny84"
//! cal = "0x9A"
//! khz = 8130
//! slope = 30
//! ```
//!
//! Command line arguments override the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG: &str = "avrcal.toml";

/// Supply voltage shown when nothing else is configured
pub const DEFAULT_SUPPLY_MV: u16 = 5000;

/// Errors while loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected keys
    #[error("Invalid config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Programmer string used when `-p` is not given
    pub programmer: Option<String>,
    /// Supply voltage to display, in millivolts
    pub supply_mv: Option<u16>,
    /// Simulated bench parameters
    pub sim: SimSection,
}

/// `[sim]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimSection {
    /// Registry target to simulate
    pub chip: Option<String>,
    /// Factory calibration byte
    #[serde(deserialize_with = "deserialize_hex_u8_opt")]
    pub cal: Option<u8>,
    /// Oscillator frequency at the factory byte, in kHz
    pub khz: Option<u32>,
    /// kHz per calibration step
    pub slope: Option<i32>,
}

impl SimSection {
    /// Render as programmer options (`key`, `value`) for the sim backend
    pub fn to_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(chip) = &self.chip {
            options.push(("chip", chip.clone()));
        }
        if let Some(cal) = self.cal {
            options.push(("cal", format!("0x{:02X}", cal)));
        }
        if let Some(khz) = self.khz {
            options.push(("khz", khz.to_string()));
        }
        if let Some(slope) = self.slope {
            options.push(("slope", slope.to_string()));
        }
        options
    }
}

impl Config {
    /// Load the configuration
    ///
    /// An explicit `path` must exist. Without one, `./avrcal.toml` is used if
    /// present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Programmer from the command line, falling back to the file
    pub fn programmer_or(&self, cli: Option<String>) -> Result<String, String> {
        cli.or_else(|| self.programmer.clone()).ok_or_else(|| {
            format!(
                "No programmer given. Use -p <programmer> or set 'programmer' in {}",
                DEFAULT_CONFIG
            )
        })
    }

    /// Supply voltage from the command line, falling back to the file
    pub fn supply_mv_or(&self, cli: Option<u16>) -> u16 {
        cli.or(self.supply_mv).unwrap_or(DEFAULT_SUPPLY_MV)
    }
}

/// Deserialize an optional u8 that can be hex ("0x9A") or an integer
fn deserialize_hex_u8_opt<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u8),
        Str(String),
    }

    match Option::<HexOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(n)) => Ok(Some(n)),
        Some(HexOrInt::Str(s)) => parse_u8(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}
