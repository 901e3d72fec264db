//! Simulated AVR target
//!
//! A bit-level serial programming slave with the memories the calibration
//! touches, and an oscillator whose frequency depends on the OSCCAL value
//! the running image loaded from EEPROM.

use avrcal_core::isp::opcodes;
use avrcal_core::target::{Fuses, RESET_STARTUP_US};

/// Flash size in words (8 KiB)
pub const FLASH_WORDS: usize = 4096;

/// EEPROM size in bytes
pub const EEPROM_SIZE: usize = 512;

/// Linear oscillator model
///
/// `khz(v) = center_khz + (v - center) * khz_per_step`, floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oscillator {
    /// Calibration value at which the oscillator runs at `center_khz`
    pub center: u8,
    /// Frequency at `center`
    pub center_khz: u32,
    /// Frequency change per calibration step (may be negative)
    pub khz_per_step: i32,
}

impl Oscillator {
    /// Frequency in kHz for a calibration value
    pub fn khz(&self, osccal: u8) -> u32 {
        let steps = osccal as i64 - self.center as i64;
        let khz = self.center_khz as i64 + steps * self.khz_per_step as i64;
        khz.max(0) as u32
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        // About 1.6% fast at the factory value, 30 kHz per step
        Self {
            center: 0x9A,
            center_khz: 8130,
            khz_per_step: 30,
        }
    }
}

/// Configuration for the simulated target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Device signature (bytes 1 and 2 of the signature row)
    pub signature: u16,
    /// Factory calibration bytes in the signature row
    pub calibration: [u8; 4],
    /// Oscillator behaviour
    pub oscillator: Oscillator,
    /// Whether a target is connected at all
    pub connected: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            signature: 0x930C, // ATtiny84
            calibration: [0x9A; 4],
            oscillator: Oscillator::default(),
            connected: true,
        }
    }
}

/// State of the simulated target
#[derive(Debug)]
pub struct TargetModel {
    config: SimConfig,
    flash: Vec<u16>,
    page: Vec<(u16, u16)>,
    eeprom: Vec<u8>,
    fuses: Fuses,
    commits: Vec<u16>,
    erases: usize,

    reset: bool,
    programming: bool,
    mosi: bool,
    miso: bool,
    rx: u8,
    tx: u8,
    bits: u8,
    frame: Vec<u8>,

    running: Option<u8>,
    boots: usize,

    clock_us: u64,
    released_at: u64,
}

impl TargetModel {
    /// Create a blank target
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            flash: vec![0xFFFF; FLASH_WORDS],
            page: Vec::new(),
            eeprom: vec![0xFF; EEPROM_SIZE],
            fuses: Fuses::new(0x62, 0xDF, 0xFF),
            commits: Vec::new(),
            erases: 0,
            reset: false,
            programming: false,
            mosi: false,
            miso: false,
            rx: 0,
            tx: 0,
            bits: 0,
            frame: Vec::with_capacity(4),
            running: None,
            boots: 0,
            clock_us: 0,
            released_at: 0,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Mutable configuration (e.g. to unplug the target between sessions)
    pub fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.config
    }

    /// Flash contents in words
    pub fn flash(&self) -> &[u16] {
        &self.flash
    }

    /// EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Current fuse bytes
    pub fn fuses(&self) -> Fuses {
        self.fuses
    }

    /// Word addresses of every page commit, in order
    pub fn commits(&self) -> &[u16] {
        &self.commits
    }

    /// Number of chip erases
    pub fn erases(&self) -> usize {
        self.erases
    }

    /// Number of times the target left reset with a programmed image
    pub fn boots(&self) -> usize {
        self.boots
    }

    /// Whether the target is held in programming mode
    pub fn in_programming_mode(&self) -> bool {
        self.programming
    }

    /// OSCCAL value of the running image, `None` while in reset or unprogrammed
    pub fn running_osccal(&self) -> Option<u8> {
        if self.reset {
            None
        } else {
            self.running
        }
    }

    /// Let simulated time pass
    pub fn advance_us(&mut self, us: u64) {
        self.clock_us += us;
    }

    /// Whether the reset time-out after the last release has elapsed
    pub fn started(&self) -> bool {
        self.clock_us - self.released_at >= RESET_STARTUP_US as u64
    }

    /// Oscillator frequency the running image produces
    ///
    /// Zero while in reset, during the start-up time-out, or when unprogrammed.
    pub fn frequency_khz(&self) -> u32 {
        if !self.started() {
            return 0;
        }
        match self.running_osccal() {
            Some(osccal) if self.config.connected => self.config.oscillator.khz(osccal),
            _ => 0,
        }
    }

    /// RESET line: `true` holds the target in reset
    pub fn set_reset(&mut self, active: bool) {
        if active == self.reset {
            return;
        }
        self.reset = active;
        self.programming = false;
        self.bits = 0;
        self.frame.clear();
        self.tx = 0;
        self.miso = false;

        if active {
            self.running = None;
            return;
        }

        self.released_at = self.clock_us;
        if self.flash[0] != 0xFFFF {
            // The image loads OSCCAL from EEPROM address 0 at boot
            let osccal = self.eeprom[opcodes::OSCCAL_EEPROM_ADDR as usize];
            self.running = Some(osccal);
            self.boots += 1;
            log::trace!("sim: target boots with OSCCAL 0x{:02X}", osccal);
        }
    }

    /// MOSI line
    pub fn set_mosi(&mut self, high: bool) {
        self.mosi = high;
    }

    /// SCK line; the target shifts on the rising edge
    pub fn set_sck(&mut self, high: bool) {
        if !high || !self.reset || !self.config.connected {
            return;
        }
        self.miso = (self.tx >> (7 - self.bits)) & 1 != 0;
        self.rx = (self.rx << 1) | self.mosi as u8;
        self.bits += 1;
        if self.bits == 8 {
            self.bits = 0;
            let byte = self.rx;
            self.byte_received(byte);
        }
    }

    /// MISO line as seen by the programmer (pulled up when nothing drives it)
    pub fn miso(&self) -> bool {
        if !self.config.connected {
            return true;
        }
        self.reset && self.miso
    }

    fn byte_received(&mut self, byte: u8) {
        self.frame.push(byte);

        // Every byte is echoed one byte later, except read results
        self.tx = byte;
        if self.frame.len() == 3 && self.programming {
            match self.frame[0] {
                opcodes::READ_SIGNATURE => self.tx = self.signature_byte(self.frame[2]),
                opcodes::READ_CALIBRATION => {
                    self.tx = self.config.calibration[self.frame[2] as usize % 4]
                }
                _ => {}
            }
        }

        if self.frame.len() == 4 {
            let frame = [self.frame[0], self.frame[1], self.frame[2], self.frame[3]];
            self.frame.clear();
            self.execute(frame);
        }
    }

    fn signature_byte(&self, offset: u8) -> u8 {
        let [hi, lo] = self.config.signature.to_be_bytes();
        match offset % 3 {
            0 => 0x1E,
            1 => hi,
            _ => lo,
        }
    }

    fn execute(&mut self, frame: [u8; 4]) {
        let [op, b1, b2, value] = frame;
        let addr = u16::from_be_bytes([b1, b2]);

        if !self.programming {
            if op == opcodes::PROG && b1 == opcodes::PROG_ENABLE {
                self.programming = true;
            }
            return;
        }

        match (op, b1) {
            (opcodes::PROG, opcodes::CHIP_ERASE) => {
                self.flash.fill(0xFFFF);
                self.eeprom.fill(0xFF);
                self.erases += 1;
            }
            (opcodes::PROG, opcodes::WRITE_FUSE_LOW) => self.fuses.low = value,
            (opcodes::PROG, opcodes::WRITE_FUSE_HIGH) => self.fuses.high = value,
            (opcodes::PROG, opcodes::WRITE_FUSE_EXT) => self.fuses.extended = value,
            (opcodes::LOAD_PAGE_LOW, _) => self.load(addr, value, false),
            (opcodes::LOAD_PAGE_HIGH, _) => self.load(addr, value, true),
            (opcodes::WRITE_PAGE, _) => {
                // Programming can only clear bits
                for (word, data) in self.page.drain(..) {
                    self.flash[word as usize % FLASH_WORDS] &= data;
                }
                self.commits.push(addr);
            }
            (opcodes::WRITE_EEPROM, _) => {
                self.eeprom[addr as usize % EEPROM_SIZE] = value;
            }
            _ => log::trace!("sim: ignoring {:02X?}", frame),
        }
    }

    fn load(&mut self, addr: u16, value: u8, high: bool) {
        let index = match self.page.iter().position(|(a, _)| *a == addr) {
            Some(index) => index,
            None => {
                self.page.push((addr, 0xFFFF));
                self.page.len() - 1
            }
        };
        let slot = &mut self.page[index].1;
        if high {
            *slot = (*slot & 0x00FF) | (value as u16) << 8;
        } else {
            *slot = (*slot & 0xFF00) | value as u16;
        }
    }
}
