//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const PROGRAMMER_HELP: &str =
    "Programmer to use, e.g. sim or linux_gpio:gpiochip=0,reset=25,sck=11,mosi=10,miso=9,count=17 \
     (defaults to 'programmer' from the config file)";

#[derive(Parser)]
#[command(name = "avrcal")]
#[command(author, version, about = "AVR internal oscillator calibrator", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML). Defaults to ./avrcal.toml if present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List supported targets
    List,

    /// List available programmers
    ListProgrammers,

    /// Identify the connected target without modifying it
    Probe {
        #[arg(short, long, help = PROGRAMMER_HELP)]
        programmer: Option<String>,
    },

    /// Program the instrumentation image and calibrate the oscillator
    ///
    /// Runs one session per Enter press until 'q' or end of input. The
    /// chosen calibration byte is left in EEPROM address 0.
    Calibrate {
        #[arg(short, long, help = PROGRAMMER_HELP)]
        programmer: Option<String>,

        /// Calibrate a single target and exit
        #[arg(long)]
        once: bool,

        /// Supply voltage to display, in millivolts
        #[arg(long, value_name = "MV")]
        supply_mv: Option<u16>,
    },
}
