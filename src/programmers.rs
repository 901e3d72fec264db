//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use avrcal_core::counter::CounterHardware;
use avrcal_core::isp::IspLink;

use crate::config::Config;

/// Programming link and pulse counter of one bench
pub type Backend = (
    Box<dyn IspLink + Send>,
    Box<dyn CounterHardware + Send>,
);

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "sim")]
    programmers.push(ProgrammerInfo {
        name: "sim",
        aliases: &["dummy"],
        description: "Simulated target and counter (chip=<name>,cal=<byte>,khz=<n>,slope=<n>)",
    });

    #[cfg(feature = "linux-gpio")]
    programmers.push(ProgrammerInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpio"],
        description: "Linux GPIO bitbang (dev=/dev/gpiochipN,reset=,sck=,mosi=,miso=,count=,div=)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Find the canonical name for a programmer name or alias
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Open the bench described by a programmer string
///
/// The programmer string can be just the name (e.g., "sim") or include
/// parameters (e.g., "sim:chip=attiny13").
#[allow(unused_variables)]
pub fn open_backend(programmer: &str, config: &Config) -> Result<Backend, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    let canonical_name = match find_programmer(name) {
        Some(n) => n,
        None => return Err(unknown_programmer_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "sim")]
        "sim" => {
            // Command line options replace the same keys from the config file
            let from_file = config.sim.to_options();
            let mut merged: Vec<(&str, &str)> = from_file
                .iter()
                .filter(|(key, _)| !options.iter().any(|(k, _)| k == key))
                .map(|(k, v)| (*k, v.as_str()))
                .collect();
            merged.extend(options);

            log::info!("Opening simulated bench...");
            avrcal_sim::open_sim(&merged).map_err(|e| format!("Invalid sim parameters: {}", e).into())
        }

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" => {
            log::info!("Opening Linux GPIO programmer...");
            avrcal_linux_gpio::open_linux_gpio(&options).map_err(|e| {
                format!(
                    "Failed to open Linux GPIO programmer: {}\n\
                     Make sure the GPIO chip exists and you have read/write permissions.",
                    e
                )
                .into()
            })
        }

        _ => Err(unknown_programmer_error(name)),
    }
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.push_str("\nUse 'avrcal list-programmers' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_programmer_string() {
        assert_eq!(parse_programmer_string("sim"), ("sim", vec![]));
        assert_eq!(
            parse_programmer_string("sim:chip=attiny13,cal=0x5C"),
            ("sim", vec![("chip", "attiny13"), ("cal", "0x5C")])
        );
        // Entries without '=' are dropped
        assert_eq!(
            parse_programmer_string("linux_gpio:gpiochip=0,bogus"),
            ("linux_gpio", vec![("gpiochip", "0")])
        );
    }

    #[test]
    fn test_unknown_programmer() {
        assert_eq!(find_programmer("ch341a"), None);
        assert!(open_backend("ch341a", &Config::default()).is_err());
    }

    #[cfg(feature = "sim")]
    #[test]
    fn test_sim_aliases_and_config() {
        assert_eq!(find_programmer("dummy"), Some("sim"));

        let config = Config::parse("[sim]\nchip = \"attiny2313\"\n").unwrap();
        // Unknown chip in the file is reported
        assert!(open_backend("sim", &config).is_err());
        // but the command line overrides it
        assert!(open_backend("sim:chip=attiny13", &config).is_ok());
    }
}
