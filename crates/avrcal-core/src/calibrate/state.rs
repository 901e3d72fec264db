//! Calibration search state

use core::fmt;

use crate::counter::Frequency;
use crate::target::TargetDescriptor;

/// Maximum number of measurements in one session
pub const MAX_TRIALS: usize = 256;

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a trigger; initial and terminal state of every session
    #[default]
    Idle,
    /// Entering programming mode and looking the signature up
    Identifying,
    /// Erasing, writing fuses, flash image and the initial trial
    Programming,
    /// Counting the pulse train of the running image
    Measuring,
    /// Writing the next trial value
    Adjusting,
    /// Writing the best value found
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Identifying => "identifying",
            Self::Programming => "programming",
            Self::Measuring => "measuring",
            Self::Adjusting => "adjusting",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Why the search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A trial hit the expected frequency exactly
    Exact,
    /// A trial was no better than the previous best
    Overshoot,
    /// The next trial would have wrapped past 0x00 or 0xFF, or
    /// [`MAX_TRIALS`] measurements were taken
    Bound,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact match"),
            Self::Overshoot => write!(f, "closest value found"),
            Self::Bound => write!(f, "calibration range exhausted"),
        }
    }
}

/// One measured trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    /// OSCCAL value the target was running with
    pub osccal: u8,
    /// Measured oscillator frequency
    pub frequency: Frequency,
    /// Absolute distance to the expected frequency in kHz
    pub deviation: u32,
    /// Supply voltage at the time of measurement, for display only
    pub supply_mv: u16,
    /// Whether the trial improved on the previous best
    pub accepted: bool,
}

/// What the controller should do after a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write this OSCCAL value and measure again
    Continue(u8),
    /// Stop and commit the best value
    Stop(Outcome),
}

/// Result of feeding one measurement to [`CalibrationState::record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The measurement became the new best
    pub improved: bool,
    /// What to do next
    pub step: Step,
}

/// Search state for one session
///
/// Single-step search: the calibration byte moves one unit per trial in
/// the direction that brings the frequency towards the target, and stops as
/// soon as a trial does not improve on the best one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationState {
    trial: u8,
    best: u8,
    best_deviation: u32,
    best_frequency: Frequency,
    measurements: usize,
    outcome: Option<Outcome>,
}

impl CalibrationState {
    /// Start a search from `initial` (usually the factory value)
    pub const fn new(initial: u8) -> Self {
        Self {
            trial: initial,
            best: initial,
            best_deviation: u32::MAX,
            best_frequency: Frequency::from_khz(0),
            measurements: 0,
            outcome: None,
        }
    }

    /// Value the target is currently running with
    pub fn trial(&self) -> u8 {
        self.trial
    }

    /// Best value so far
    pub fn best(&self) -> u8 {
        self.best
    }

    /// Deviation of the best value (`u32::MAX` before the first measurement)
    pub fn best_deviation(&self) -> u32 {
        self.best_deviation
    }

    /// Frequency measured for the best value
    pub fn best_frequency(&self) -> Frequency {
        self.best_frequency
    }

    /// Set once the search has finished
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Number of measurements recorded so far
    pub fn measurements(&self) -> usize {
        self.measurements
    }

    /// Feed the measurement for the current trial and decide the next step
    ///
    /// The search stops after [`MAX_TRIALS`] measurements even if a noisy
    /// reading keeps it moving back and forth.
    pub fn record(&mut self, measured: Frequency, expected: Frequency) -> Verdict {
        if let Some(outcome) = self.outcome {
            return Verdict {
                improved: false,
                step: Step::Stop(outcome),
            };
        }
        self.measurements += 1;

        let deviation = measured.abs_diff(expected);
        if deviation >= self.best_deviation {
            return self.finish(false, Outcome::Overshoot);
        }

        self.best = self.trial;
        self.best_deviation = deviation;
        self.best_frequency = measured;
        if deviation == 0 {
            return self.finish(true, Outcome::Exact);
        }
        if self.measurements >= MAX_TRIALS {
            return self.finish(true, Outcome::Bound);
        }

        let next = if measured > expected {
            self.trial.checked_sub(1)
        } else {
            self.trial.checked_add(1)
        };
        match next {
            Some(value) => {
                self.trial = value;
                Verdict {
                    improved: true,
                    step: Step::Continue(value),
                }
            }
            None => self.finish(true, Outcome::Bound),
        }
    }

    fn finish(&mut self, improved: bool, outcome: Outcome) -> Verdict {
        self.outcome = Some(outcome);
        Verdict {
            improved,
            step: Step::Stop(outcome),
        }
    }
}

/// Result of a completed session
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    /// Target that was calibrated
    pub target: TargetDescriptor,
    /// Factory calibration byte read from the signature row
    pub factory: u8,
    /// Value left in EEPROM address 0
    pub committed: u8,
    /// Frequency measured with the committed value
    pub frequency: Frequency,
    /// Deviation of the committed value in kHz
    pub deviation: u32,
    /// Why the search stopped
    pub outcome: Outcome,
    /// Every trial in measurement order
    pub trials: heapless::Vec<Trial, MAX_TRIALS>,
}
