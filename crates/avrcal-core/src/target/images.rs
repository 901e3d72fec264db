//! Compiled-in instrumentation images
//!
//! The byte content is opaque to the engine: it is written to flash word by
//! word and never decoded. See `images/README.md` for what each image does.

/// Revision of the image set; bump when any of the binaries change
pub const IMAGE_REVISION: u32 = 1;

/// ATtiny13: Timer0 toggles PB0
pub const ATTINY13: &[u8] = include_bytes!("../../images/attiny13.bin");

/// ATtiny24/44/84: Timer1 toggles PA6
pub const ATTINYX4: &[u8] = include_bytes!("../../images/attinyx4.bin");

/// ATmega8: Timer2 toggles PB3
pub const ATMEGA8: &[u8] = include_bytes!("../../images/atmega8.bin");
