//! Calibrate command implementation

use std::io::{self, BufRead, Write};

use indicatif::{ProgressBar, ProgressStyle};

use avrcal_core::calibrate::{
    CalibrationReport, FixedSupply, Panel, Phase, Trial, Trigger,
};
use avrcal_core::counter::GateIrq;
use avrcal_core::target::TargetDescriptor;
use avrcal_core::Error;

use crate::programmers::Backend;

/// Run calibration sessions on the opened bench
///
/// With `once` a single session runs and its failure is the command's
/// failure. Otherwise sessions repeat on Enter until 'q' or end of input.
pub fn run_calibrate(
    backend: Backend,
    supply_mv: u16,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let irq = GateIrq::new();
    let mut calibrator = super::calibrator(backend, &irq);
    let mut panel = TerminalPanel::default();
    let mut supply = FixedSupply(supply_mv);

    if once {
        calibrator
            .run_session(&mut panel, &mut supply)
            .map_err(|e| format!("Calibration failed: {}", e))?;
        return Ok(());
    }

    let stdin = io::stdin();
    let mut trigger = LineTrigger::new(stdin.lock());
    let completed = calibrator.run(&mut panel, &mut trigger, &mut supply);
    println!("{} target(s) calibrated", completed);
    Ok(())
}

/// Create a progress bar for flash programming
fn create_flash_bar(total: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} words Programming",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Terminal output for calibration sessions
#[derive(Default)]
struct TerminalPanel {
    bar: Option<ProgressBar>,
}

impl TerminalPanel {
    fn finish_bar(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

impl Panel for TerminalPanel {
    fn prompt(&mut self) {
        println!();
        print!("Connect a target and press Enter (q to quit): ");
        let _ = io::stdout().flush();
    }

    fn phase(&mut self, phase: Phase) {
        if phase != Phase::Programming {
            self.finish_bar();
        }
    }

    fn device(&mut self, target: &TargetDescriptor, factory: u8) {
        println!(
            "{} (signature 0x{:04X}), factory OSCCAL 0x{:02X}",
            target.name, target.signature, factory
        );
    }

    fn flash_progress(&mut self, done: usize, total: usize) {
        let pb = self.bar.get_or_insert_with(|| {
            create_flash_bar(total as u64).unwrap_or_else(|_| ProgressBar::new(total as u64))
        });
        pb.set_position(done as u64);
    }

    fn trial(&mut self, trial: &Trial) {
        println!(
            "  OSCCAL 0x{:02X}  {:>10}  off by {:>4} kHz  {}.{:02} V{}",
            trial.osccal,
            trial.frequency.to_string(),
            trial.deviation,
            trial.supply_mv / 1000,
            trial.supply_mv % 1000 / 10,
            if trial.accepted { "" } else { "  (worse)" }
        );
    }

    fn done(&mut self, report: &CalibrationReport) {
        self.finish_bar();
        println!(
            "{}: OSCCAL 0x{:02X} -> 0x{:02X}, {} ({} kHz off), {}",
            report.target.name,
            report.factory,
            report.committed,
            report.frequency,
            report.deviation,
            report.outcome
        );
    }

    fn error(&mut self, error: &Error) {
        self.finish_bar();
        eprintln!("Calibration failed: {}", error);
    }
}

/// Session trigger reading lines from the operator
///
/// An empty line starts a session; `q` or end of input stops.
struct LineTrigger<R> {
    input: R,
}

impl<R: BufRead> LineTrigger<R> {
    fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Trigger for LineTrigger<R> {
    fn wait(&mut self) -> bool {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => false,
            Ok(_) => !line.trim().eq_ignore_ascii_case("q"),
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_trigger() {
        let mut trigger = LineTrigger::new(Cursor::new("\n\nQ\n\n"));
        assert!(trigger.wait());
        assert!(trigger.wait());
        assert!(!trigger.wait());
    }

    #[test]
    fn test_line_trigger_eof() {
        let mut trigger = LineTrigger::new(Cursor::new(""));
        assert!(!trigger.wait());
    }

    #[cfg(feature = "sim")]
    #[test]
    fn test_sessions_until_quit() {
        let backend = avrcal_sim::open_sim(&[]).unwrap();
        let irq = GateIrq::new();
        let mut calibrator = super::super::calibrator(backend, &irq);
        let mut trigger = LineTrigger::new(Cursor::new("\n\nq\n"));
        let completed = calibrator.run(
            &mut TerminalPanel::default(),
            &mut trigger,
            &mut FixedSupply(5000),
        );
        assert_eq!(completed, 2);
        assert_eq!(calibrator.phase(), Phase::Idle);
    }
}
