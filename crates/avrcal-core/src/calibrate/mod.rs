//! Calibration controller
//!
//! The controller runs one session per trigger:
//!
//! 1. **Identifying** - enter programming mode, read the signature, look it
//!    up and read the factory calibration byte.
//! 2. **Programming** - in the same session erase the chip, write fuses, the
//!    instrumentation image and the factory byte to EEPROM address 0, then
//!    release the target so it boots the image.
//! 3. **Measuring / Adjusting** - measure, let [`CalibrationState`] pick the
//!    next value, write it to EEPROM and release again, until the search
//!    stops.
//! 4. **Committing** - write the best value once more, since the last value
//!    written may have been a rejected trial.
//!
//! Whatever happens the controller ends in [`Phase::Idle`] with the link
//! released.

mod state;
mod ui;

pub use state::*;
pub use ui::*;

use crate::counter::{CounterHardware, Frequency, FrequencyCounter};
use crate::error::{Error, Result};
use crate::isp::opcodes::OSCCAL_EEPROM_ADDR;
use crate::isp::{IspLink, Programmer};
use crate::target::{self, TargetDescriptor};

/// Calibration controller owning the programmer and the frequency counter
pub struct Calibrator<'a, L, H> {
    programmer: Programmer<L>,
    counter: FrequencyCounter<'a, H>,
    registry: &'a [TargetDescriptor],
    phase: Phase,
    active: Option<TargetDescriptor>,
}

fn transition(phase: &mut Phase, next: Phase, panel: &mut dyn Panel) {
    if *phase != next {
        log::debug!("calibrate: {} -> {}", phase, next);
        *phase = next;
        panel.phase(next);
    }
}

impl<'a, L: IspLink, H: CounterHardware> Calibrator<'a, L, H> {
    /// Create a controller for the targets in `registry`
    pub fn new(
        programmer: Programmer<L>,
        counter: FrequencyCounter<'a, H>,
        registry: &'a [TargetDescriptor],
    ) -> Self {
        Self {
            programmer,
            counter,
            registry,
            phase: Phase::Idle,
            active: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Target of the session in progress, if any
    pub fn active_target(&self) -> Option<&TargetDescriptor> {
        self.active.as_ref()
    }

    /// Borrow the programmer
    pub fn programmer(&self) -> &Programmer<L> {
        &self.programmer
    }

    /// Mutably borrow the programmer
    pub fn programmer_mut(&mut self) -> &mut Programmer<L> {
        &mut self.programmer
    }

    /// Mutably borrow the frequency counter
    pub fn counter_mut(&mut self) -> &mut FrequencyCounter<'a, H> {
        &mut self.counter
    }

    /// Split the controller back into its parts
    pub fn into_parts(self) -> (Programmer<L>, FrequencyCounter<'a, H>) {
        (self.programmer, self.counter)
    }

    /// Identify the target without modifying it
    ///
    /// Returns the descriptor and the factory calibration byte.
    pub fn identify(&mut self) -> Result<(TargetDescriptor, u8)> {
        let mut session = self.programmer.enter()?;
        let signature = session.read_signature();
        let target = target::lookup_in(self.registry, signature)
            .ok_or(Error::UnsupportedDevice { signature })?;
        let factory = session.read_calibration_byte(target.cal_index);
        Ok((target, factory))
    }

    /// Prompt, wait for the trigger and run sessions until the trigger says stop
    ///
    /// Failed sessions are reported to the panel and do not end the loop.
    /// Returns the number of sessions that completed.
    pub fn run(
        &mut self,
        panel: &mut dyn Panel,
        trigger: &mut dyn Trigger,
        supply: &mut dyn SupplyMonitor,
    ) -> usize {
        let mut completed = 0;
        loop {
            panel.prompt();
            if !trigger.wait() {
                return completed;
            }
            if self.run_session(panel, supply).is_ok() {
                completed += 1;
            }
        }
    }

    /// Run one complete calibration session
    pub fn run_session(
        &mut self,
        panel: &mut dyn Panel,
        supply: &mut dyn SupplyMonitor,
    ) -> Result<CalibrationReport> {
        let result = self.calibrate(panel, supply);

        self.active = None;
        transition(&mut self.phase, Phase::Idle, panel);

        match &result {
            Ok(report) => {
                log::info!(
                    "{}: OSCCAL 0x{:02X} -> 0x{:02X} ({}, {}, {} trial(s))",
                    report.target.name,
                    report.factory,
                    report.committed,
                    report.frequency,
                    report.outcome,
                    report.trials.len()
                );
                panel.done(report);
            }
            Err(e) => {
                log::warn!("calibration aborted: {}", e);
                panel.error(e);
            }
        }
        result
    }

    fn calibrate(
        &mut self,
        panel: &mut dyn Panel,
        supply: &mut dyn SupplyMonitor,
    ) -> Result<CalibrationReport> {
        transition(&mut self.phase, Phase::Identifying, panel);

        let (target, factory) = {
            let mut session = self.programmer.enter()?;
            let signature = session.read_signature();
            let Some(target) = target::lookup_in(self.registry, signature) else {
                session.exit();
                return Err(Error::UnsupportedDevice { signature });
            };
            let factory = session.read_calibration_byte(target.cal_index);
            self.active = Some(target);
            panel.device(&target, factory);

            transition(&mut self.phase, Phase::Programming, panel);
            session.set_timing(target.timing);
            session.erase_chip();
            session.write_fuses(&target.fuses);
            session.write_flash_with_progress(target.image, target.page_words, &mut |done, total| {
                panel.flash_progress(done, total)
            });
            session.write_eeprom(OSCCAL_EEPROM_ADDR, factory);
            session.exit();
            (target, factory)
        };

        let expected = Frequency::from_khz(target.expected_khz);
        let mut state = CalibrationState::new(factory);
        let mut trials = heapless::Vec::new();

        let outcome = loop {
            transition(&mut self.phase, Phase::Measuring, panel);
            let osccal = state.trial();
            let frequency = self.counter.measure();
            let verdict = state.record(frequency, expected);

            let trial = Trial {
                osccal,
                frequency,
                deviation: frequency.abs_diff(expected),
                supply_mv: supply.millivolts(),
                accepted: verdict.improved,
            };
            log::debug!(
                "calibrate: OSCCAL 0x{:02X} -> {} (deviation {} kHz{})",
                osccal,
                frequency,
                trial.deviation,
                if trial.accepted { "" } else { ", rejected" }
            );
            panel.trial(&trial);
            // `record` stops the search at MAX_TRIALS measurements
            if trials.push(trial).is_err() {
                log::warn!("calibrate: trial history full, OSCCAL 0x{:02X} not kept", osccal);
            }

            match verdict.step {
                Step::Continue(next) => {
                    transition(&mut self.phase, Phase::Adjusting, panel);
                    self.programmer
                        .enter()?
                        .write_eeprom(OSCCAL_EEPROM_ADDR, next);
                }
                Step::Stop(outcome) => break outcome,
            }
        };

        transition(&mut self.phase, Phase::Committing, panel);
        self.programmer
            .enter()?
            .write_eeprom(OSCCAL_EEPROM_ADDR, state.best());

        Ok(CalibrationReport {
            target,
            factory,
            committed: state.best(),
            frequency: state.best_frequency(),
            deviation: state.best_deviation(),
            outcome,
            trials,
        })
    }
}
