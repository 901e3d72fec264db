//! Serial programming instruction set
//!
//! `Programmer` owns the link and tracks whether a programming session is
//! open. Instructions are only reachable through the `Session` guard that a
//! successful `Programmer::enter` returns, so nothing is ever clocked into a
//! target that has not acknowledged programming mode. The guard releases
//! the link when it is dropped.

use crate::error::{Error, Result};
use crate::target::{Fuses, IspTiming};

use super::link::{bitbang, IspLink};
use super::opcodes;

/// Link session state as seen from outside the engine
///
/// While an instruction is being clocked out the session is briefly neither
/// of these, but that is never observable through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Lines high-impedance, no session
    Released,
    /// Programming enable acknowledged by the target
    Entered,
}

/// ISP programmer driving one target over an owned link
pub struct Programmer<L> {
    link: L,
    state: SessionState,
    timing: IspTiming,
}

impl<L: IspLink> Programmer<L> {
    /// Create a programmer with default timing
    ///
    /// The link is released immediately so the target starts out running.
    pub fn new(mut link: L) -> Self {
        link.release();
        Self {
            link,
            state: SessionState::Released,
            timing: IspTiming::default(),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Timing in use for settle delays
    pub fn timing(&self) -> IspTiming {
        self.timing
    }

    /// Replace the settle delays (e.g. once the target family is known)
    pub fn set_timing(&mut self, timing: IspTiming) {
        self.timing = timing;
    }

    /// Borrow the underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutably borrow the underlying link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Consume the programmer and return the link
    pub fn into_inner(mut self) -> L {
        self.exit();
        // `Programmer` has no Drop impl, so the link can be moved out
        self.link
    }

    /// Put the target into programming mode
    ///
    /// Holds RESET active with SCK idle low, waits the enter settle delay and
    /// sends the programming-enable instruction. The target acknowledges by
    /// echoing 0x53 in the third response byte; anything else releases the
    /// link again and fails with [`Error::EnterFailed`].
    pub fn enter(&mut self) -> Result<Session<'_, L>> {
        if self.state == SessionState::Entered {
            log::warn!("isp: enter() while a session is open, restarting it");
            self.exit();
        }

        self.link.set_sck(false);
        self.link.set_mosi(false);
        self.link.set_reset(true);
        self.link.delay_us(self.timing.enter_settle_us);

        let response = bitbang::instruction(
            &mut self.link,
            [opcodes::PROG, opcodes::PROG_ENABLE, 0x00, 0x00],
        );
        if response[2] != opcodes::PROG_ENABLE {
            log::debug!(
                "isp: programming enable not echoed (got 0x{:02X})",
                response[2]
            );
            self.exit();
            return Err(Error::EnterFailed { echo: response[2] });
        }

        log::debug!("isp: programming mode entered");
        self.state = SessionState::Entered;
        Ok(Session { programmer: self })
    }

    /// Release all lines and let the target run
    ///
    /// Safe to call at any time; calling it with no session open only waits
    /// the release delay again.
    pub fn exit(&mut self) {
        self.link.release();
        self.link.delay_us(self.timing.exit_release_us);
        if self.state == SessionState::Entered {
            log::debug!("isp: programming mode left");
        }
        self.state = SessionState::Released;
    }
}

/// Open programming session
///
/// Every instruction of the target's serial programming set is a method
/// here. Dropping the session releases the link.
pub struct Session<'a, L: IspLink> {
    programmer: &'a mut Programmer<L>,
}

impl<L: IspLink> Session<'_, L> {
    fn exchange(&mut self, bytes: [u8; 4]) -> [u8; 4] {
        bitbang::instruction(&mut self.programmer.link, bytes)
    }

    fn settle(&mut self, us: u32) {
        self.programmer.link.delay_us(us);
    }

    fn write_settle(&mut self) {
        let us = self.programmer.timing.write_settle_us;
        self.settle(us);
    }

    /// Switch to the settle delays of the identified target
    ///
    /// Applies to the rest of this session and every later one.
    pub fn set_timing(&mut self, timing: IspTiming) {
        self.programmer.timing = timing;
    }

    /// Read one byte of the signature row
    pub fn read_signature_byte(&mut self, offset: u8) -> u8 {
        self.exchange([opcodes::READ_SIGNATURE, 0x00, offset, 0x00])[3]
    }

    /// Read the device signature (bytes 1 and 2 of the signature row)
    ///
    /// The vendor byte at offset 0 is 0x1E on every supported part and is
    /// not read.
    pub fn read_signature(&mut self) -> u16 {
        let hi = self.read_signature_byte(opcodes::SIGNATURE_DEVICE_OFFSET);
        let lo = self.read_signature_byte(opcodes::SIGNATURE_DEVICE_OFFSET + 1);
        let signature = u16::from_be_bytes([hi, lo]);
        log::debug!("isp: signature 0x{:04X}", signature);
        signature
    }

    /// Read a factory calibration byte from the signature row
    pub fn read_calibration_byte(&mut self, index: u8) -> u8 {
        let value = self.exchange([opcodes::READ_CALIBRATION, 0x00, index, 0x00])[3];
        log::debug!("isp: calibration byte [{}] = 0x{:02X}", index, value);
        value
    }

    /// Write the low, high and extended fuses, in that order
    pub fn write_fuses(&mut self, fuses: &Fuses) {
        for (opcode, value) in [
            (opcodes::WRITE_FUSE_LOW, fuses.low),
            (opcodes::WRITE_FUSE_HIGH, fuses.high),
            (opcodes::WRITE_FUSE_EXT, fuses.extended),
        ] {
            self.exchange([opcodes::PROG, opcode, 0x00, value]);
            self.write_settle();
        }
        log::debug!(
            "isp: fuses written (L=0x{:02X} H=0x{:02X} E=0x{:02X})",
            fuses.low,
            fuses.high,
            fuses.extended
        );
    }

    /// Erase flash and EEPROM
    pub fn erase_chip(&mut self) {
        self.exchange([opcodes::PROG, opcodes::CHIP_ERASE, 0x00, 0x00]);
        let us = self.programmer.timing.erase_settle_us;
        self.settle(us);
        log::debug!("isp: chip erased");
    }

    /// Program `image` into flash starting at word 0
    ///
    /// Bytes are taken in little-endian pairs. After every `page_words`
    /// words the filled page is committed; a trailing partial page is
    /// committed as well.
    pub fn write_flash(&mut self, image: &[u8], page_words: u16) {
        self.write_flash_with_progress(image, page_words, &mut |_, _| {});
    }

    /// Like [`Session::write_flash`], calling `progress(words_done, total_words)`
    /// after each committed page
    pub fn write_flash_with_progress(
        &mut self,
        image: &[u8],
        page_words: u16,
        progress: &mut dyn FnMut(usize, usize),
    ) {
        let page_words = page_words.max(1);
        let total = image.len().div_ceil(2);
        let mut page_start: u16 = 0;
        let mut filled: u16 = 0;
        let mut pages = 0usize;

        for (i, pair) in image.chunks(2).enumerate() {
            let addr = i as u16;
            let [ah, al] = addr.to_be_bytes();
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0xFF);
            self.exchange([opcodes::LOAD_PAGE_LOW, ah, al, low]);
            self.exchange([opcodes::LOAD_PAGE_HIGH, ah, al, high]);
            filled += 1;

            if filled == page_words {
                self.commit_page(page_start);
                pages += 1;
                progress(i + 1, total);
                page_start = addr + 1;
                filled = 0;
            }
        }

        if filled > 0 {
            self.commit_page(page_start);
            pages += 1;
            progress(total, total);
        }

        log::debug!("isp: {} words written in {} page(s)", total, pages);
    }

    fn commit_page(&mut self, word_addr: u16) {
        let [ah, al] = word_addr.to_be_bytes();
        self.exchange([opcodes::WRITE_PAGE, ah, al, 0x00]);
        self.write_settle();
    }

    /// Write a single EEPROM byte
    pub fn write_eeprom(&mut self, addr: u16, value: u8) {
        let [ah, al] = addr.to_be_bytes();
        self.exchange([opcodes::WRITE_EEPROM, ah, al, value]);
        self.write_settle();
        log::trace!("isp: eeprom[0x{:03X}] = 0x{:02X}", addr, value);
    }

    /// Close the session and release the link
    pub fn exit(self) {
        // Drop does the work
    }
}

impl<L: IspLink> Drop for Session<'_, L> {
    fn drop(&mut self) {
        self.programmer.exit();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::isp::link::Lines;
    use std::vec::Vec;

    /// Link that reassembles instructions from the bit stream and answers
    /// from a canned responder
    struct RecordingLink {
        lines: Lines,
        mosi: bool,
        miso: bool,
        rx: u8,
        bits: u8,
        tx: u8,
        current: Vec<u8>,
        instructions: Vec<[u8; 4]>,
        delays: Vec<u32>,
        acknowledge: bool,
        signature: [u8; 3],
    }

    impl RecordingLink {
        fn new() -> Self {
            Self {
                lines: Lines::empty(),
                mosi: false,
                miso: false,
                rx: 0,
                bits: 0,
                tx: 0,
                current: Vec::new(),
                instructions: Vec::new(),
                delays: Vec::new(),
                acknowledge: true,
                signature: [0x1E, 0x93, 0x0C],
            }
        }

        fn count(&self, first: u8) -> usize {
            self.instructions.iter().filter(|i| i[0] == first).count()
        }

        fn byte_received(&mut self, byte: u8) {
            self.current.push(byte);
            self.tx = match self.current.len() {
                // Echo of byte 1 comes back while byte 2 is clocked
                2 if self.acknowledge => self.current[1],
                2 => 0xFF,
                3 => match self.current[0] {
                    opcodes::READ_SIGNATURE => self.signature[self.current[2] as usize % 3],
                    opcodes::READ_CALIBRATION => 0x80 + self.current[2],
                    _ => byte,
                },
                _ => byte,
            };
            if self.current.len() == 4 {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&self.current);
                self.instructions.push(bytes);
                self.current.clear();
            }
        }
    }

    impl IspLink for RecordingLink {
        fn set_reset(&mut self, active: bool) {
            self.lines.insert(Lines::RESET);
            if !active {
                self.current.clear();
            }
        }

        fn set_sck(&mut self, high: bool) {
            self.lines.insert(Lines::SCK);
            if high {
                self.miso = (self.tx >> (7 - self.bits)) & 1 != 0;
                self.rx = (self.rx << 1) | self.mosi as u8;
                self.bits += 1;
                if self.bits == 8 {
                    self.bits = 0;
                    let rx = self.rx;
                    self.byte_received(rx);
                }
            }
        }

        fn set_mosi(&mut self, high: bool) {
            self.lines.insert(Lines::MOSI);
            self.mosi = high;
        }

        fn get_miso(&self) -> bool {
            self.miso
        }

        fn half_period_delay(&self) {}

        fn delay_us(&mut self, us: u32) {
            self.delays.push(us);
        }

        fn release(&mut self) {
            self.lines = Lines::empty();
        }

        fn driven(&self) -> Lines {
            self.lines
        }
    }

    // The responder decides the byte shifted out during byte N once byte N-1
    // is complete; MISO is latched on each rising edge.

    #[test]
    fn test_enter_and_exit() {
        let mut prog = Programmer::new(RecordingLink::new());
        {
            let session = prog.enter().unwrap();
            session.exit();
        }
        assert_eq!(prog.state(), SessionState::Released);
        assert!(prog.link().driven().is_empty());
        assert_eq!(prog.link().instructions[0], [0xAC, 0x53, 0x00, 0x00]);
        assert!(prog.link().delays.contains(&IspTiming::TINY.enter_settle_us));
    }

    #[test]
    fn test_exit_is_idempotent() {
        let mut prog = Programmer::new(RecordingLink::new());
        prog.exit();
        prog.exit();
        assert_eq!(prog.state(), SessionState::Released);
        assert!(prog.link().driven().is_empty());
        assert!(prog.link().instructions.is_empty());
    }

    #[test]
    fn test_enter_failure_releases() {
        let mut link = RecordingLink::new();
        link.acknowledge = false;
        let mut prog = Programmer::new(link);
        let err = prog.enter().err().unwrap();
        assert_eq!(err, Error::EnterFailed { echo: 0xFF });
        assert_eq!(prog.state(), SessionState::Released);
        assert!(prog.link().driven().is_empty());
        assert_eq!(prog.link().instructions.len(), 1);
    }

    #[test]
    fn test_read_signature() {
        let mut prog = Programmer::new(RecordingLink::new());
        let mut session = prog.enter().unwrap();
        assert_eq!(session.read_signature(), 0x930C);
        assert_eq!(session.read_calibration_byte(3), 0x83);
        drop(session);

        let reads: Vec<_> = prog
            .link()
            .instructions
            .iter()
            .filter(|i| i[0] == opcodes::READ_SIGNATURE)
            .map(|i| i[2])
            .collect();
        assert_eq!(reads, [1, 2]);
    }

    #[test]
    fn test_fuse_order() {
        let mut prog = Programmer::new(RecordingLink::new());
        prog.enter()
            .unwrap()
            .write_fuses(&Fuses::new(0xE2, 0xDF, 0xFF));
        let fuses: Vec<_> = prog.link().instructions[1..]
            .iter()
            .map(|i| (i[1], i[3]))
            .collect();
        assert_eq!(fuses, [(0xA0, 0xE2), (0xA8, 0xDF), (0xA4, 0xFF)]);
    }

    #[test]
    fn test_flash_exact_page() {
        let image = [0x5Au8; 64]; // 32 words
        let mut prog = Programmer::new(RecordingLink::new());
        prog.enter().unwrap().write_flash(&image, 32);

        let link = prog.link();
        assert_eq!(link.count(opcodes::LOAD_PAGE_LOW), 32);
        assert_eq!(link.count(opcodes::LOAD_PAGE_HIGH), 32);
        assert_eq!(link.count(opcodes::WRITE_PAGE), 1);
    }

    #[test]
    fn test_flash_partial_page_committed() {
        let image: Vec<u8> = (0..70u8).collect(); // 32 + 3 words
        let mut prog = Programmer::new(RecordingLink::new());
        prog.enter().unwrap().write_flash(&image, 32);

        let commits: Vec<_> = prog
            .link()
            .instructions
            .iter()
            .filter(|i| i[0] == opcodes::WRITE_PAGE)
            .map(|i| u16::from_be_bytes([i[1], i[2]]))
            .collect();
        assert_eq!(commits, [0, 32]);

        // Last word loaded at address 34 with bytes 68/69
        let last_low = prog
            .link()
            .instructions
            .iter()
            .filter(|i| i[0] == opcodes::LOAD_PAGE_LOW)
            .last()
            .copied()
            .unwrap();
        assert_eq!(last_low, [0x40, 0x00, 34, 68]);
    }

    #[test]
    fn test_flash_progress() {
        let image = [0u8; 70];
        let mut seen = Vec::new();
        let mut prog = Programmer::new(RecordingLink::new());
        prog.enter()
            .unwrap()
            .write_flash_with_progress(&image, 32, &mut |done, total| seen.push((done, total)));
        assert_eq!(seen, [(32, 35), (35, 35)]);
    }

    #[test]
    fn test_write_eeprom() {
        let mut prog = Programmer::new(RecordingLink::new());
        prog.set_timing(IspTiming::MEGA8);
        prog.enter().unwrap().write_eeprom(0x101, 0xA5);
        assert_eq!(prog.link().instructions[1], [0xC0, 0x01, 0x01, 0xA5]);
        assert!(prog.link().delays.contains(&IspTiming::MEGA8.write_settle_us));
    }
}
