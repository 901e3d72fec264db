//! Collaborators outside the calibration core
//!
//! The controller reports progress to a [`Panel`] (a character display on
//! the bench, a terminal on a host), waits on a [`Trigger`] between
//! sessions, and samples a [`SupplyMonitor`] for display. None of them
//! influence the search.

use crate::error::Error;
use crate::target::TargetDescriptor;

use super::state::{CalibrationReport, Phase, Trial};

/// Output surface for session progress
pub trait Panel {
    /// Ready for the next target
    fn prompt(&mut self) {}

    /// Controller entered a new phase
    fn phase(&mut self, phase: Phase) {
        let _ = phase;
    }

    /// Target identified
    fn device(&mut self, target: &TargetDescriptor, factory: u8);

    /// Flash programming progress in words
    fn flash_progress(&mut self, done: usize, total: usize) {
        let _ = (done, total);
    }

    /// A trial has been measured
    fn trial(&mut self, trial: &Trial);

    /// Session finished and the best value is committed
    fn done(&mut self, report: &CalibrationReport);

    /// Session aborted
    fn error(&mut self, error: &Error);
}

/// Start-of-session input
pub trait Trigger {
    /// Block until the operator asks for a session
    ///
    /// Returns `false` when no more sessions should be run.
    fn wait(&mut self) -> bool;
}

/// Supply voltage source, display only
pub trait SupplyMonitor {
    /// Current supply voltage in millivolts
    fn millivolts(&mut self) -> u16;
}

/// Supply monitor reporting a constant voltage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSupply(pub u16);

impl SupplyMonitor for FixedSupply {
    fn millivolts(&mut self) -> u16 {
        self.0
    }
}

/// Panel that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPanel;

impl Panel for LogPanel {
    fn device(&mut self, target: &TargetDescriptor, factory: u8) {
        log::info!("{} found, factory OSCCAL 0x{:02X}", target.name, factory);
    }

    fn trial(&mut self, trial: &Trial) {
        log::info!(
            "OSCCAL 0x{:02X}: {} ({} mV)",
            trial.osccal,
            trial.frequency,
            trial.supply_mv
        );
    }

    fn done(&mut self, report: &CalibrationReport) {
        log::info!(
            "{}: OSCCAL 0x{:02X} committed, {}",
            report.target.name,
            report.committed,
            report.frequency
        );
    }

    fn error(&mut self, error: &Error) {
        log::error!("{}", error);
    }
}
