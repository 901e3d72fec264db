//! Target descriptor type definitions

/// Fuse bytes written before the instrumentation image
///
/// All three are always sent, in low, high, extended order. Parts without an
/// extended fuse ignore the last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fuses {
    /// Low fuse (clock source, startup time, clock divider)
    pub low: u8,
    /// High fuse (reset, SPI enable, brown-out)
    pub high: u8,
    /// Extended fuse
    pub extended: u8,
}

impl Fuses {
    /// Create a fuse set
    pub const fn new(low: u8, high: u8, extended: u8) -> Self {
        Self {
            low,
            high,
            extended,
        }
    }
}

/// Reset time-out selected by the registry fuses, in microseconds
///
/// Every entry programs SUT=10, which holds the part in reset for 14CK + 64 ms
/// after RESET is released. The image only starts emitting after that.
pub const RESET_STARTUP_US: u32 = 65_000;

/// Settle delays for the serial programming link, in microseconds
///
/// The engine never polls the target for completion, so every value here must
/// be at least the datasheet minimum for the part family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspTiming {
    /// Delay after pulling RESET active before the enable command (datasheet: >= 20 ms)
    pub enter_settle_us: u32,
    /// Delay after releasing the lines so the target leaves reset and boots
    ///
    /// Must cover [`RESET_STARTUP_US`], or the gate window opens before the
    /// image runs.
    pub exit_release_us: u32,
    /// Delay after a fuse, flash page or EEPROM write (tWD_FUSE / tWD_FLASH / tWD_EEPROM)
    pub write_settle_us: u32,
    /// Delay after chip erase (tWD_ERASE)
    pub erase_settle_us: u32,
}

impl IspTiming {
    /// Timing suitable for the ATtiny families (4.5 ms write, 9 ms erase worst case)
    pub const TINY: Self = Self {
        enter_settle_us: 20_000,
        exit_release_us: 70_000,
        write_settle_us: 5_000,
        erase_settle_us: 10_000,
    };

    /// Timing for ATmega8, whose EEPROM write needs 8.5 ms
    pub const MEGA8: Self = Self {
        enter_settle_us: 20_000,
        exit_release_us: 70_000,
        write_settle_us: 10_000,
        erase_settle_us: 10_000,
    };
}

impl Default for IspTiming {
    fn default() -> Self {
        Self::TINY
    }
}

/// Supported target definition
///
/// Compiled into the registry; copied into the controller as the active
/// target for the duration of one calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Display name (e.g., "ATtiny84")
    pub name: &'static str,
    /// Signature bytes 1 and 2; byte 0 is always the Atmel vendor code 0x1E
    pub signature: u16,
    /// Fuse configuration for running the instrumentation image
    pub fuses: Fuses,
    /// Flash page size in 16-bit words
    pub page_words: u16,
    /// Instrumentation image (little-endian program words from address 0)
    pub image: &'static [u8],
    /// Oscillator frequency the image should produce once calibrated, in kHz
    pub expected_khz: u32,
    /// Signature-row index of the factory calibration byte for this frequency
    pub cal_index: u8,
    /// Programming delays for this family
    pub timing: IspTiming,
}

impl TargetDescriptor {
    /// Length of the instrumentation image in bytes
    pub const fn image_len(&self) -> usize {
        self.image.len()
    }

    /// Number of 16-bit words the image occupies (a trailing odd byte counts as a word)
    pub const fn image_words(&self) -> usize {
        self.image.len().div_ceil(2)
    }

    /// Number of flash pages the image touches, including a trailing partial page
    pub const fn image_pages(&self) -> usize {
        self.image_words().div_ceil(self.page_words as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static IMAGE: [u8; 70] = [0; 70];

    fn descriptor(page_words: u16, image: &'static [u8]) -> TargetDescriptor {
        TargetDescriptor {
            name: "test",
            signature: 0x9999,
            fuses: Fuses::new(0, 0, 0),
            page_words,
            image,
            expected_khz: 8000,
            cal_index: 0,
            timing: IspTiming::TINY,
        }
    }

    #[test]
    fn test_image_pages() {
        // 35 words: one full 32-word page plus 3 words
        let d = descriptor(32, &IMAGE);
        assert_eq!(d.image_words(), 35);
        assert_eq!(d.image_pages(), 2);

        let d = descriptor(32, &IMAGE[..64]);
        assert_eq!(d.image_pages(), 1);

        let d = descriptor(16, &IMAGE[..3]);
        assert_eq!(d.image_words(), 2);
        assert_eq!(d.image_pages(), 1);
    }
}
