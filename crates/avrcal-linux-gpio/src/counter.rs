//! Gate-window pulse counter on a GPIO input
//!
//! Rising edges are read as kernel edge events, so the counted rate is
//! limited to a few tens of kHz. Feed the target's output through an external
//! binary divider and set `div` to its ratio to measure a full-speed image.

use std::time::{Duration, Instant};

use gpiocdev::line::{EdgeDetection, Offset};
use gpiocdev::request::Request;

use avrcal_core::counter::{CounterHardware, GateIrq, COUNTER_BITS};

use crate::error::{LinuxGpioError, Result};

/// Configuration for the GPIO pulse counter
#[derive(Debug, Clone)]
pub struct LinuxGpioCounterConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Input line carrying the pulse train
    pub line: Offset,
    /// Ratio of an external divider in front of the input (1 = none)
    pub prescaler: u32,
}

/// Number of register wraps when the pulse total moves from `before` to `after`
fn wraps(before: u32, after: u32) -> u32 {
    (after >> COUNTER_BITS) - (before >> COUNTER_BITS)
}

/// Pulse counter emulating an 8-bit counting register with GPIO edge events
pub struct LinuxGpioCounter {
    request: Request,
    prescaler: u32,
    pulses: u32,
    deadline: Option<Instant>,
}

impl LinuxGpioCounter {
    /// Request the input line with rising edge detection
    pub fn open(config: &LinuxGpioCounterConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }

        let request = Request::builder()
            .on_chip(&config.device)
            .with_consumer("avrcal-counter")
            .with_line(config.line)
            .as_input()
            .with_edge_detection(EdgeDetection::RisingEdge)
            .request()
            .map_err(LinuxGpioError::LineRequestFailed)?;

        log::info!(
            "linux_gpio: Counting on {} line {} (divider {})",
            config.device,
            config.line,
            config.prescaler
        );

        Ok(Self {
            request,
            prescaler: config.prescaler.max(1),
            pulses: 0,
            deadline: None,
        })
    }

    fn drain(&mut self) {
        while let Ok(true) = self.request.has_edge_event() {
            if let Err(e) = self.request.read_edge_event() {
                log::warn!("linux_gpio: Failed to drain edge event: {}", e);
                break;
            }
        }
    }

    fn close_gate(&mut self, irq: &GateIrq) {
        self.deadline = None;
        irq.on_gate_elapsed();
    }
}

impl CounterHardware for LinuxGpioCounter {
    fn reset(&mut self) {
        self.pulses = 0;
        self.drain();
    }

    fn start(&mut self, gate_us: u32) {
        self.deadline = Some(Instant::now() + Duration::from_micros(gate_us as u64));
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    fn count(&self) -> u8 {
        self.pulses as u8
    }

    fn wait_for_interrupt(&mut self, irq: &GateIrq) {
        let Some(deadline) = self.deadline else {
            self.close_gate(irq);
            return;
        };

        let now = Instant::now();
        if now >= deadline {
            self.close_gate(irq);
            return;
        }

        match self.request.wait_edge_event(deadline - now) {
            Ok(true) => match self.request.read_edge_event() {
                Ok(_) => {
                    let before = self.pulses;
                    self.pulses = before.saturating_add(self.prescaler);
                    for _ in 0..wraps(before, self.pulses) {
                        irq.on_overflow();
                    }
                }
                Err(e) => log::error!("{}", LinuxGpioError::EdgeEventFailed(e)),
            },
            // Timed out; the next call closes the gate
            Ok(false) => {}
            Err(e) => {
                log::error!("{}", LinuxGpioError::EdgeEventFailed(e));
                self.close_gate(irq);
            }
        }
    }
}

/// Parse counter options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` or `gpiochip=N` - GPIO chip, shared with the link
/// - `count=N` - input line offset carrying the pulse train (required)
/// - `div=N` - external divider ratio in front of the input (optional, default 1)
pub fn parse_options(
    options: &[(&str, &str)],
) -> std::result::Result<LinuxGpioCounterConfig, String> {
    let mut device = String::new();
    let mut line = None;
    let mut prescaler = 1;

    for (key, value) in options {
        match *key {
            "dev" => device = value.to_string(),
            "gpiochip" => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid gpiochip value: {}", value))?;
                device = format!("/dev/gpiochip{}", n);
            }
            "count" => {
                line = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid count value: {}", value))?,
                );
            }
            "div" => {
                prescaler = value
                    .parse()
                    .ok()
                    .filter(|&d: &u32| d > 0)
                    .ok_or_else(|| format!("Invalid div value: {}", value))?;
            }
            _ => {}
        }
    }

    let line = line.ok_or_else(|| "Missing required parameter: count".to_string())?;
    Ok(LinuxGpioCounterConfig {
        device,
        line,
        prescaler,
    })
}
