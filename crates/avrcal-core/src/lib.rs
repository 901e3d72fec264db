//! avrcal-core - Core library for AVR oscillator calibration
//!
//! This crate identifies an AVR target over its serial programming (ISP)
//! link, loads an instrumentation image that emits a clock-derived pulse
//! train, and searches the target's oscillator calibration byte until the
//! measured frequency is as close as possible to the nominal one. The chosen
//! value is left in EEPROM address 0, where the target firmware picks it up
//! at boot.
//!
//! It is designed to be `no_std` compatible so the same controller can run on
//! the bench microcontroller itself or on a host driving GPIO lines.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable boxed link and counter trait objects
//!
//! # Example
//!
//! ```ignore
//! use avrcal_core::calibrate::{Calibrator, FixedSupply, Panel};
//! use avrcal_core::counter::{CounterHardware, FrequencyCounter, GateIrq};
//! use avrcal_core::isp::{IspLink, Programmer};
//! use avrcal_core::target;
//!
//! static IRQ: GateIrq = GateIrq::new();
//!
//! fn calibrate_once<L: IspLink, H: CounterHardware>(link: L, hw: H, panel: &mut dyn Panel) {
//!     let counter = FrequencyCounter::new(hw, &IRQ);
//!     let mut cal = Calibrator::new(Programmer::new(link), counter, target::TARGETS);
//!     match cal.run_session(panel, &mut FixedSupply(5000)) {
//!         Ok(report) => println!("OSCCAL = 0x{:02X}", report.committed),
//!         Err(e) => println!("Calibration failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod calibrate;
pub mod counter;
pub mod error;
pub mod isp;
pub mod target;

pub use error::{Error, Result};
