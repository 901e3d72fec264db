//! avrcal-sim - Simulated calibration bench
//!
//! This crate provides a link and a pulse counter backed by an in-memory AVR
//! target. The target decodes the serial programming bit stream, keeps
//! flash, EEPROM and fuses, and once released runs an oscillator whose
//! frequency follows the OSCCAL value it loaded from EEPROM. It's useful for
//! testing and development without real hardware.
//!
//! ```
//! use avrcal_core::calibrate::{Calibrator, FixedSupply, LogPanel};
//! use avrcal_core::counter::{FrequencyCounter, GateIrq};
//! use avrcal_core::isp::Programmer;
//! use avrcal_core::target;
//! use avrcal_sim::{Bench, SimConfig};
//!
//! let bench = Bench::new(SimConfig::default());
//! let irq = GateIrq::new();
//! let counter = FrequencyCounter::new(bench.counter(), &irq);
//! let mut cal = Calibrator::new(Programmer::new(bench.link()), counter, target::TARGETS);
//! let report = cal.run_session(&mut LogPanel, &mut FixedSupply(5000)).unwrap();
//! assert_eq!(bench.target().eeprom()[0], report.committed);
//! ```

mod model;

pub use model::{Oscillator, SimConfig, TargetModel, EEPROM_SIZE, FLASH_WORDS};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use avrcal_core::counter::{CounterHardware, GateIrq, COUNTER_BITS, SIGNAL_DIVISOR};
use avrcal_core::isp::{IspLink, Lines};
use avrcal_core::target;

/// A simulated target shared between a link and a counter
#[derive(Debug, Clone)]
pub struct Bench {
    model: Arc<Mutex<TargetModel>>,
}

impl Bench {
    /// Create a bench with a blank target
    pub fn new(config: SimConfig) -> Self {
        Self {
            model: Arc::new(Mutex::new(TargetModel::new(config))),
        }
    }

    /// Lock the target for inspection or modification
    pub fn target(&self) -> MutexGuard<'_, TargetModel> {
        lock(&self.model)
    }

    /// Programming link wired to this target
    pub fn link(&self) -> SimLink {
        SimLink {
            model: Arc::clone(&self.model),
            lines: Lines::empty(),
            elapsed_us: 0,
        }
    }

    /// Pulse counter wired to this target's output
    pub fn counter(&self) -> SimCounter {
        SimCounter {
            model: Arc::clone(&self.model),
            register: 0,
            pending: 0,
            gate_us: 0,
            running: false,
        }
    }
}

fn lock(model: &Mutex<TargetModel>) -> MutexGuard<'_, TargetModel> {
    // The model has no invariants a panicking holder could break
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated programming link
#[derive(Debug)]
pub struct SimLink {
    model: Arc<Mutex<TargetModel>>,
    lines: Lines,
    elapsed_us: u64,
}

impl SimLink {
    /// Total time spent in settle delays
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }
}

impl IspLink for SimLink {
    fn set_reset(&mut self, active: bool) {
        self.lines.insert(Lines::RESET);
        lock(&self.model).set_reset(active);
    }

    fn set_sck(&mut self, high: bool) {
        self.lines.insert(Lines::SCK);
        lock(&self.model).set_sck(high);
    }

    fn set_mosi(&mut self, high: bool) {
        self.lines.insert(Lines::MOSI);
        lock(&self.model).set_mosi(high);
    }

    fn get_miso(&self) -> bool {
        lock(&self.model).miso()
    }

    fn half_period_delay(&self) {
        // No delay needed for an in-memory target
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
        lock(&self.model).advance_us(us as u64);
    }

    fn release(&mut self) {
        lock(&self.model).set_reset(false);
        self.lines = Lines::empty();
    }

    fn driven(&self) -> Lines {
        self.lines
    }
}

/// Simulated pulse counter and gate timer
///
/// The whole gate window elapses inside the first `wait_for_interrupt`.
#[derive(Debug)]
pub struct SimCounter {
    model: Arc<Mutex<TargetModel>>,
    register: u8,
    pending: u32,
    gate_us: u32,
    running: bool,
}

impl CounterHardware for SimCounter {
    fn reset(&mut self) {
        self.register = 0;
        self.pending = 0;
    }

    fn start(&mut self, gate_us: u32) {
        let khz = lock(&self.model).frequency_khz() as u64;
        self.pending = (khz * gate_us as u64 / (SIGNAL_DIVISOR as u64 * 1000)) as u32;
        self.gate_us = gate_us;
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn count(&self) -> u8 {
        self.register
    }

    fn wait_for_interrupt(&mut self, irq: &GateIrq) {
        if !self.running {
            return;
        }
        for _ in 0..(self.pending >> COUNTER_BITS) {
            irq.on_overflow();
        }
        self.register = self.pending as u8;
        self.running = false;
        lock(&self.model).advance_us(self.gate_us as u64);
        irq.on_gate_elapsed();
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `chip=NAME` - simulate a registry target (e.g. `attiny13`)
/// - `sig=0xNNNN` - device signature, overrides `chip`
/// - `cal=0xNN` - factory calibration byte (all four slots)
/// - `khz=N` - oscillator frequency at the factory calibration byte
/// - `slope=N` - kHz change per calibration step (may be negative)
pub fn parse_options(options: &[(&str, &str)]) -> Result<SimConfig, String> {
    let mut config = SimConfig::default();

    for (key, value) in options {
        match *key {
            "chip" => {
                let target = target::lookup_by_name(value)
                    .ok_or_else(|| format!("Unknown chip: {}", value))?;
                config.signature = target.signature;
                config.oscillator.center_khz = target.expected_khz + target.expected_khz / 60;
            }
            "sig" => {
                config.signature =
                    parse_u16(value).ok_or_else(|| format!("Invalid sig value: {}", value))?;
            }
            "cal" => {
                let cal = parse_u16(value)
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| format!("Invalid cal value: {}", value))?;
                config.calibration = [cal; 4];
                config.oscillator.center = cal;
            }
            "khz" => {
                config.oscillator.center_khz = value
                    .parse()
                    .map_err(|_| format!("Invalid khz value: {}", value))?;
            }
            "slope" => {
                config.oscillator.khz_per_step = value
                    .parse()
                    .map_err(|_| format!("Invalid slope value: {}", value))?;
            }
            _ => {
                log::warn!("sim: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

fn parse_u16(value: &str) -> Option<u16> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Link and counter of a simulated bench, boxed for the CLI
pub type SimBackend = (
    Box<dyn IspLink + Send>,
    Box<dyn CounterHardware + Send>,
);

/// Open a simulated bench and return its boxed link and counter
///
/// This is a convenience function for use in the CLI programmer dispatch.
pub fn open_sim(options: &[(&str, &str)]) -> Result<SimBackend, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    log::info!(
        "sim: target 0x{:04X}, factory OSCCAL 0x{:02X} at {} kHz",
        config.signature,
        config.oscillator.center,
        config.oscillator.center_khz
    );
    let bench = Bench::new(config);
    Ok((Box::new(bench.link()), Box::new(bench.counter())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrcal_core::calibrate::{
        CalibrationReport, Calibrator, FixedSupply, Outcome, Panel, Phase, Trial,
    };
    use avrcal_core::counter::{Frequency, FrequencyCounter};
    use avrcal_core::isp::{Programmer, SessionState};
    use avrcal_core::target::{IspTiming, TargetDescriptor, RESET_STARTUP_US};
    use avrcal_core::Error;

    /// Panel that records everything it is told
    #[derive(Default)]
    struct RecordingPanel {
        phases: Vec<Phase>,
        device: Option<(&'static str, u8)>,
        progress: Vec<(usize, usize)>,
        trials: Vec<Trial>,
        done: Option<u8>,
        errors: Vec<Error>,
    }

    impl Panel for RecordingPanel {
        fn phase(&mut self, phase: Phase) {
            self.phases.push(phase);
        }

        fn device(&mut self, target: &TargetDescriptor, factory: u8) {
            self.device = Some((target.name, factory));
        }

        fn flash_progress(&mut self, done: usize, total: usize) {
            self.progress.push((done, total));
        }

        fn trial(&mut self, trial: &Trial) {
            self.trials.push(*trial);
        }

        fn done(&mut self, report: &CalibrationReport) {
            self.done = Some(report.committed);
        }

        fn error(&mut self, error: &Error) {
            self.errors.push(*error);
        }
    }

    fn session(bench: &Bench) -> (Result<CalibrationReport, Error>, RecordingPanel) {
        let irq = GateIrq::new();
        let counter = FrequencyCounter::new(bench.counter(), &irq);
        let mut cal = Calibrator::new(Programmer::new(bench.link()), counter, target::TARGETS);
        let mut panel = RecordingPanel::default();
        let result = cal.run_session(&mut panel, &mut FixedSupply(4980));
        assert_eq!(cal.phase(), Phase::Idle);
        assert!(cal.active_target().is_none());
        assert_eq!(cal.programmer().state(), SessionState::Released);
        assert!(cal.programmer().link().driven().is_empty());
        (result, panel)
    }

    #[test]
    fn test_programming_link() {
        let bench = Bench::new(SimConfig::default());
        let mut prog = Programmer::new(bench.link());
        {
            let mut session = prog.enter().unwrap();
            assert_eq!(session.read_signature(), 0x930C);
            assert_eq!(session.read_calibration_byte(0), 0x9A);
            session.write_eeprom(0x10, 0x42);
        }
        assert!(!bench.target().in_programming_mode());
        assert_eq!(bench.target().eeprom()[0x10], 0x42);
    }

    #[test]
    fn test_counter_reading() {
        let bench = Bench::new(SimConfig::default());
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(bench.counter(), &irq);

        // Nothing programmed yet
        assert_eq!(counter.measure(), Frequency::from_khz(0));

        {
            let mut prog = Programmer::new(bench.link());
            let mut session = prog.enter().unwrap();
            session.write_flash(&[0x00, 0xC0], 32);
            session.write_eeprom(0, 0x9A);
        }
        assert_eq!(bench.target().running_osccal(), Some(0x9A));
        assert_eq!(counter.measure_raw(), 16_260);
        assert_eq!(counter.measure(), Frequency::from_khz(8130));
    }

    #[test]
    fn test_no_pulses_during_startup() {
        let bench = Bench::new(SimConfig::default());
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(bench.counter(), &irq);

        let mut prog = Programmer::new(bench.link());
        prog.set_timing(IspTiming {
            exit_release_us: 10_000,
            ..IspTiming::TINY
        });
        {
            let mut session = prog.enter().unwrap();
            session.write_flash(&[0x00, 0xC0], 32);
            session.write_eeprom(0, 0x9A);
        }

        // Gate closes 42 ms after release, inside the 64 ms reset time-out
        assert_eq!(counter.measure(), Frequency::from_khz(0));
        assert!(!bench.target().started());

        prog.link_mut().delay_us(RESET_STARTUP_US);
        assert_eq!(counter.measure(), Frequency::from_khz(8130));
    }

    #[test]
    fn test_full_session() {
        let bench = Bench::new(SimConfig::default());
        let (result, panel) = session(&bench);
        let report = result.unwrap();

        let attiny84 = target::lookup(0x930C).unwrap();
        assert_eq!(report.target.name, "ATtiny84");
        assert_eq!(report.factory, 0x9A);
        assert_eq!(panel.device, Some(("ATtiny84", 0x9A)));

        // 8130, 8100, 8070, 8040, 8010, then 7980 is worse
        let visited: Vec<u8> = report.trials.iter().map(|t| t.osccal).collect();
        assert_eq!(visited, [0x9A, 0x99, 0x98, 0x97, 0x96, 0x95]);
        assert!(report.trials[..5].iter().all(|t| t.accepted));
        assert!(!report.trials[5].accepted);
        assert!(report.trials.iter().all(|t| t.supply_mv == 4980));
        assert_eq!(report.committed, 0x96);
        assert_eq!(report.frequency, Frequency::from_khz(8010));
        assert_eq!(report.deviation, 10);
        assert_eq!(report.outcome, Outcome::Overshoot);
        assert_eq!(panel.done, Some(0x96));
        assert!(panel.errors.is_empty());

        let target = bench.target();
        assert_eq!(target.erases(), 1);
        assert_eq!(target.fuses(), attiny84.fuses);
        assert_eq!(target.eeprom()[0], 0x96);
        assert_eq!(target.running_osccal(), Some(0x96));

        // Image is in flash, little-endian words
        for (i, pair) in attiny84.image.chunks(2).enumerate() {
            let high = pair.get(1).copied().unwrap_or(0xFF);
            assert_eq!(target.flash()[i], u16::from_le_bytes([pair[0], high]));
        }
        assert_eq!(target.commits().len(), attiny84.image_pages());
        assert_eq!(
            panel.progress.last(),
            Some(&(attiny84.image_words(), attiny84.image_words()))
        );

        assert_eq!(panel.phases.first(), Some(&Phase::Identifying));
        assert_eq!(panel.phases[1], Phase::Programming);
        assert_eq!(panel.phases.last(), Some(&Phase::Idle));
        assert!(panel.phases.contains(&Phase::Committing));
    }

    #[test]
    fn test_exact_first_trial() {
        let mut config = SimConfig::default();
        config.oscillator.center_khz = 8000;
        let bench = Bench::new(config);
        let (result, panel) = session(&bench);
        let report = result.unwrap();
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.committed, 0x9A);
        assert_eq!(report.outcome, Outcome::Exact);
        assert!(!panel.phases.contains(&Phase::Adjusting));
    }

    #[test]
    fn test_slow_target_steps_up() {
        let config = parse_options(&[("cal", "0x40"), ("khz", "7900"), ("slope", "25")]).unwrap();
        let bench = Bench::new(config);
        let report = session(&bench).0.unwrap();
        // 7900, 7925, 7950, 7975, 8000
        assert_eq!(report.committed, 0x44);
        assert_eq!(report.outcome, Outcome::Exact);
        assert_eq!(bench.target().eeprom()[0], 0x44);
    }

    #[test]
    fn test_atmega8_uses_its_calibration_slot() {
        let mut config = parse_options(&[("chip", "atmega8")]).unwrap();
        config.calibration = [0x10, 0x20, 0x30, 0xA0];
        config.oscillator.center = 0xA0;
        config.oscillator.center_khz = 8000;
        let bench = Bench::new(config);
        let report = session(&bench).0.unwrap();
        assert_eq!(report.target.name, "ATmega8");
        assert_eq!(report.factory, 0xA0);
        assert_eq!(report.committed, 0xA0);
        assert_eq!(bench.target().fuses().low, 0xE4);
    }

    #[test]
    fn test_bound_at_zero() {
        let config = parse_options(&[("cal", "0x01"), ("khz", "9000"), ("slope", "10")]).unwrap();
        let bench = Bench::new(config);
        let report = session(&bench).0.unwrap();
        let visited: Vec<u8> = report.trials.iter().map(|t| t.osccal).collect();
        assert_eq!(visited, [0x01, 0x00]);
        assert_eq!(report.committed, 0x00);
        assert_eq!(report.outcome, Outcome::Bound);
    }

    #[test]
    fn test_unsupported_device() {
        let config = parse_options(&[("sig", "0x9108")]).unwrap();
        let bench = Bench::new(config);
        let (result, panel) = session(&bench);
        assert_eq!(
            result.unwrap_err(),
            Error::UnsupportedDevice { signature: 0x9108 }
        );
        assert_eq!(panel.errors.len(), 1);
        assert!(panel.device.is_none());
        // Nothing was written
        assert_eq!(bench.target().erases(), 0);
        assert!(bench.target().eeprom().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_no_target() {
        let mut config = SimConfig::default();
        config.connected = false;
        let bench = Bench::new(config);
        let (result, panel) = session(&bench);
        assert_eq!(result.unwrap_err(), Error::EnterFailed { echo: 0xFF });
        assert_eq!(panel.phases, [Phase::Identifying, Phase::Idle]);
    }

    #[test]
    fn test_probe_writes_nothing() {
        let bench = Bench::new(SimConfig::default());
        let irq = GateIrq::new();
        let counter = FrequencyCounter::new(bench.counter(), &irq);
        let mut cal = Calibrator::new(Programmer::new(bench.link()), counter, target::TARGETS);
        let (target, factory) = cal.identify().unwrap();
        assert_eq!(target.name, "ATtiny84");
        assert_eq!(factory, 0x9A);
        assert_eq!(bench.target().erases(), 0);
        assert!(bench.target().commits().is_empty());
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("chip", "ATtiny13"), ("cal", "0x5c")]).unwrap();
        assert_eq!(config.signature, 0x9007);
        assert_eq!(config.calibration, [0x5C; 4]);
        assert_eq!(config.oscillator.center_khz, 9760);

        assert!(parse_options(&[("chip", "attiny2313")]).is_err());
        assert!(parse_options(&[("cal", "0x100")]).is_err());
        assert!(parse_options(&[("slope", "fast")]).is_err());
    }
}
