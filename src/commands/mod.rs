//! CLI command implementations
//!
//! Every command that talks to a target builds a `Calibrator` from the
//! opened bench; `probe` only identifies, `calibrate` runs full sessions.

mod calibrate;
mod list;
mod probe;

pub use calibrate::run_calibrate;
pub use list::{list_programmers, list_targets};
pub use probe::run_probe;

use avrcal_core::calibrate::Calibrator;
use avrcal_core::counter::{CounterHardware, FrequencyCounter, GateIrq};
use avrcal_core::isp::{IspLink, Programmer};
use avrcal_core::target;

use crate::programmers::Backend;

type BenchCalibrator<'a> =
    Calibrator<'a, Box<dyn IspLink + Send>, Box<dyn CounterHardware + Send>>;

/// Wire an opened bench into a calibrator over the built-in registry
fn calibrator(backend: Backend, irq: &GateIrq) -> BenchCalibrator<'_> {
    let (link, hw) = backend;
    Calibrator::new(
        Programmer::new(link),
        FrequencyCounter::new(hw, irq),
        target::TARGETS,
    )
}
