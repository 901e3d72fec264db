//! AVR serial programming instruction bytes
//!
//! Every instruction is four bytes long. The first byte selects the
//! operation; for the `AC` group the second byte does.

// ============================================================================
// Programming control
// ============================================================================

/// First byte of the programming-enable, chip-erase and fuse-write group
pub const PROG: u8 = 0xAC;
/// Programming Enable (second byte, echoed back in the third response byte)
pub const PROG_ENABLE: u8 = 0x53;
/// Chip Erase (second byte)
pub const CHIP_ERASE: u8 = 0x80;

// ============================================================================
// Signature row
// ============================================================================

/// Read Signature Byte
pub const READ_SIGNATURE: u8 = 0x30;
/// Read Calibration Byte
pub const READ_CALIBRATION: u8 = 0x38;

// ============================================================================
// Fuses (second byte of the `PROG` group)
// ============================================================================

/// Write Fuse bits (low)
pub const WRITE_FUSE_LOW: u8 = 0xA0;
/// Write Fuse High bits
pub const WRITE_FUSE_HIGH: u8 = 0xA8;
/// Write Extended Fuse bits
pub const WRITE_FUSE_EXT: u8 = 0xA4;

// ============================================================================
// Program memory
// ============================================================================

/// Load Program Memory Page, low byte
pub const LOAD_PAGE_LOW: u8 = 0x40;
/// Load Program Memory Page, high byte
pub const LOAD_PAGE_HIGH: u8 = 0x48;
/// Write Program Memory Page
pub const WRITE_PAGE: u8 = 0x4C;

// ============================================================================
// EEPROM
// ============================================================================

/// Write EEPROM Memory (single byte)
pub const WRITE_EEPROM: u8 = 0xC0;

/// Signature-row offset of the first device byte (offset 0 is the vendor code)
pub const SIGNATURE_DEVICE_OFFSET: u8 = 1;

/// EEPROM address the instrumentation image reads OSCCAL from
pub const OSCCAL_EEPROM_ADDR: u16 = 0;
