//! Error types for avrcal-core
//!
//! This module provides a no_std compatible error type shared by the
//! protocol engine and the calibration controller.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
///
/// Only two failures are modelled on the wire. Writes to flash, fuses and
/// EEPROM are assumed to succeed once their settle delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The programming-enable handshake was not echoed by the target
    EnterFailed {
        /// Byte returned where the target should have echoed 0x53
        echo: u8,
    },
    /// The target signature is not present in the registry
    UnsupportedDevice {
        /// Signature bytes 1 and 2 (vendor byte omitted)
        signature: u16,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnterFailed { echo } => write!(
                f,
                "enter failed: programming enable not acknowledged (got 0x{:02X})",
                echo
            ),
            Self::UnsupportedDevice { signature } => {
                write!(f, "unsupported device (signature 0x{:04X})", signature)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::UnsupportedDevice { signature: 0x1234 }.to_string(),
            "unsupported device (signature 0x1234)"
        );
        assert!(Error::EnterFailed { echo: 0xFF }
            .to_string()
            .starts_with("enter failed"));
    }
}
