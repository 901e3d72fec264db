//! avrcal-linux-gpio - Linux GPIO calibration bench
//!
//! This crate drives the AVR serial programming lines and counts the target's
//! pulse train using the Linux character device GPIO interface (gpiocdev).
//! This is useful on platforms like Raspberry Pi where GPIO pins are easily
//! accessible.
//!
//! # Example
//!
//! ```no_run
//! use avrcal_core::isp::Programmer;
//! use avrcal_linux_gpio::{LinuxGpioIsp, LinuxGpioIspConfig};
//!
//! let config = LinuxGpioIspConfig::new("/dev/gpiochip0", 25, 11, 10, 9);
//! //                                   device          RST SCK MOSI MISO
//! let mut programmer = Programmer::new(LinuxGpioIsp::open(&config)?);
//! let signature = programmer.enter()?.read_signature();
//! println!("Signature: 0x{:04X}", signature);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with avrcal CLI
//!
//! ```bash
//! avrcal probe -p linux_gpio:gpiochip=0,reset=25,sck=11,mosi=10,miso=9,count=17
//!
//! # Target output fed through a /64 divider
//! avrcal calibrate -p linux_gpio:dev=/dev/gpiochip0,reset=25,sck=11,mosi=10,miso=9,count=17,div=64
//! ```
//!
//! # GPIO Pin Wiring
//!
//! | Target Pin | GPIO Function  | Description |
//! |------------|----------------|-------------|
//! | RESET      | reset (output) | Held low during programming |
//! | SCK        | sck (output)   | Serial Clock |
//! | MOSI       | mosi (output)  | Programmer to target |
//! | MISO       | miso (input)   | Target to programmer |
//! | OC0A/OC1A  | count (input)  | Instrumentation pulse train |
//! | GND        | GND            | Ground |
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod counter;
pub mod device;
pub mod error;

// Re-exports
pub use counter::{LinuxGpioCounter, LinuxGpioCounterConfig};
pub use device::{parse_options, LinuxGpioIsp, LinuxGpioIspConfig};
pub use error::{LinuxGpioError, Result};

use avrcal_core::counter::CounterHardware;
use avrcal_core::isp::IspLink;

/// Link and counter of a GPIO bench, boxed for the CLI
pub type GpioBackend = (
    Box<dyn IspLink + Send>,
    Box<dyn CounterHardware + Send>,
);

/// Open the GPIO link and pulse counter and return them boxed
///
/// This is a convenience function for use in the CLI programmer dispatch.
///
/// # Example Options
///
/// - `dev=/dev/gpiochip0` - GPIO chip device path (or use gpiochip=N)
/// - `reset=25`, `sck=11`, `mosi=10`, `miso=9` - ISP line offsets (required)
/// - `count=17` - pulse input line offset (required)
/// - `div=64` - external divider in front of the pulse input (optional)
/// - `ispspeed=100` - SCK speed in kHz (optional, default ~100 kHz)
pub fn open_linux_gpio(
    options: &[(&str, &str)],
) -> std::result::Result<GpioBackend, Box<dyn std::error::Error>> {
    let isp_config = device::parse_options(options)?;
    let mut counter_config = counter::parse_options(options)?;
    counter_config.device = isp_config.device.clone();
    check_counter_line(&isp_config, &counter_config)?;

    let link = LinuxGpioIsp::open(&isp_config)?;
    let counter = LinuxGpioCounter::open(&counter_config)?;
    Ok((Box::new(link), Box::new(counter)))
}

/// Reject a pulse input that shares a line with the programming link
fn check_counter_line(isp: &LinuxGpioIspConfig, counter: &LinuxGpioCounterConfig) -> Result<()> {
    if isp.offsets().contains(&counter.line) {
        return Err(LinuxGpioError::DuplicateLine(counter.line));
    }
    Ok(())
}
