//! Bit-level serial programming link
//!
//! This module provides the trait that a programmer backend implements to
//! drive the four ISP lines (RESET, SCK, MOSI, MISO) and the helpers that
//! turn those line operations into byte and instruction exchanges.
//!
//! ## Timing
//!
//! The link is SPI mode 0, MSB first: MOSI is set while SCK is low, the
//! target samples it on the rising edge, and MISO is sampled by the
//! programmer while SCK is high. The SCK frequency must stay below a quarter
//! of the target clock, which `half_period_delay` is responsible for.

use bitflags::bitflags;

bitflags! {
    /// Lines currently driven by the programmer
    ///
    /// An empty set means every line is high-impedance and the target runs
    /// freely.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lines: u8 {
        /// RESET (active low on the target)
        const RESET = 1 << 0;
        /// Serial clock
        const SCK   = 1 << 1;
        /// Programmer to target data
        const MOSI  = 1 << 2;
    }
}

/// Trait for low-level ISP line control
///
/// Implementations are not expected to fail: a backend that cannot set a
/// line logs the problem and carries on, the same way the target would see
/// a stuck line.
pub trait IspLink {
    /// Drive RESET (`active=true` pulls the target into reset)
    fn set_reset(&mut self, active: bool);

    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Get MISO line value
    fn get_miso(&self) -> bool;

    /// Delay for half a clock period
    fn half_period_delay(&self);

    /// Busy-wait for the given number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Put every line into high-impedance
    fn release(&mut self);

    /// Lines currently driven
    fn driven(&self) -> Lines;

    /// Optional: Set SCK and MOSI atomically (optimization)
    ///
    /// Default implementation calls `set_sck` then `set_mosi`.
    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) {
        self.set_sck(sck);
        self.set_mosi(mosi);
    }

    /// Optional: Set SCK and get MISO atomically (optimization)
    ///
    /// Default implementation calls `set_sck` then `get_miso`.
    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        self.set_sck(sck);
        self.get_miso()
    }
}

// Blanket impl for boxed links to allow trait objects
#[cfg(feature = "alloc")]
impl IspLink for alloc::boxed::Box<dyn IspLink + Send> {
    fn set_reset(&mut self, active: bool) {
        (**self).set_reset(active)
    }

    fn set_sck(&mut self, high: bool) {
        (**self).set_sck(high)
    }

    fn set_mosi(&mut self, high: bool) {
        (**self).set_mosi(high)
    }

    fn get_miso(&self) -> bool {
        (**self).get_miso()
    }

    fn half_period_delay(&self) {
        (**self).half_period_delay()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn driven(&self) -> Lines {
        (**self).driven()
    }

    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) {
        (**self).set_sck_set_mosi(sck, mosi)
    }

    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        (**self).set_sck_get_miso(sck)
    }
}

/// Bitbang helper functions
///
/// These are standalone functions that can be used by any `IspLink`
/// implementation.
pub mod bitbang {
    use super::IspLink;

    /// Exchange one byte (MSB first), returning what the target shifted out
    pub fn transfer_byte<L: IspLink + ?Sized>(link: &mut L, byte: u8) -> u8 {
        let mut received = 0u8;
        for i in (0..8).rev() {
            let bit = (byte >> i) & 1 != 0;
            link.set_sck_set_mosi(false, bit);
            link.half_period_delay();
            received <<= 1;
            if link.set_sck_get_miso(true) {
                received |= 1;
            }
            link.half_period_delay();
        }
        received
    }

    /// Exchange one four-byte instruction and return the four response bytes
    ///
    /// SCK is left low afterwards.
    pub fn instruction<L: IspLink + ?Sized>(link: &mut L, bytes: [u8; 4]) -> [u8; 4] {
        let mut response = [0u8; 4];
        for (out, &byte) in response.iter_mut().zip(bytes.iter()) {
            *out = transfer_byte(link, byte);
        }
        link.set_sck(false);
        log::trace!(
            "isp: {:02X} {:02X} {:02X} {:02X} -> {:02X} {:02X} {:02X} {:02X}",
            bytes[0],
            bytes[1],
            bytes[2],
            bytes[3],
            response[0],
            response[1],
            response[2],
            response[3]
        );
        response
    }
}
