//! avrcal - AVR internal oscillator calibrator
//!
//! Identifies an AVR target over its serial programming link, loads an
//! instrumentation image, and tunes the oscillator calibration byte against
//! a gated frequency counter. The result is left in EEPROM address 0 for the
//! application firmware to load at boot.
//!
//! # Architecture
//!
//! A bench is a programming link plus a pulse counter, opened from a
//! programmer string:
//! - **sim** - an in-memory target with an oscillator model, for testing
//! - **linux_gpio** - GPIO character device lines on a Linux host
//!
//! The calibration itself lives in `avrcal-core` and is shared by every bench.

mod cli;
mod commands;
mod config;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;

/// Default log filter for a verbosity count; `RUST_LOG` still takes precedence
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(cli.verbose)),
    )
    .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::List => {
            commands::list_targets();
            Ok(())
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
        Commands::Probe { programmer } => {
            let programmer = config.programmer_or(programmer)?;
            let backend = programmers::open_backend(&programmer, &config)?;
            commands::run_probe(backend)
        }
        Commands::Calibrate {
            programmer,
            once,
            supply_mv,
        } => {
            let programmer = config.programmer_or(programmer)?;
            let backend = programmers::open_backend(&programmer, &config)?;
            commands::run_calibrate(backend, config.supply_mv_or(supply_mv), once)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(default_filter(0), "info");
        assert_eq!(default_filter(1), "debug");
        assert_eq!(default_filter(2), "trace");
        assert_eq!(default_filter(5), "trace");
    }

    #[test]
    fn test_verbose_enables_debug_records() {
        let logger = env_logger::Builder::new()
            .parse_filters(default_filter(1))
            .build();
        assert_eq!(logger.filter(), log::LevelFilter::Debug);

        let logger = env_logger::Builder::new()
            .parse_filters(default_filter(0))
            .build();
        assert_eq!(logger.filter(), log::LevelFilter::Info);
    }
}
