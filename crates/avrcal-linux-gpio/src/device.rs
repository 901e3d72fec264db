//! Linux GPIO ISP bitbanging link
//!
//! This module provides the `LinuxGpioIsp` struct that implements the
//! `IspLink` trait using Linux's GPIO character device interface (gpiocdev).
//!
//! All four lines are requested as inputs so the target runs undisturbed
//! until the first line is driven. A line becomes an output the first time
//! it is set and goes back to high-impedance on `release`.

use std::time::Duration;

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use avrcal_core::isp::{IspLink, Lines};

/// GPIO line indices
#[derive(Debug, Clone, Copy)]
enum Line {
    Reset = 0,
    Sck = 1,
    Mosi = 2,
    Miso = 3,
}

/// Number of GPIO lines we use
const MAX_LINES: usize = 4;

/// Lines the programmer can drive, with their `Lines` flag
const OUTPUTS: [(Line, Lines); 3] = [
    (Line::Reset, Lines::RESET),
    (Line::Sck, Lines::SCK),
    (Line::Mosi, Lines::MOSI),
];

/// Default half-period delay in nanoseconds (for ~100 kHz SCK)
///
/// SCK must stay below a quarter of the target clock; 100 kHz is safe down
/// to a 1 MHz target.
const DEFAULT_HALF_PERIOD_NS: u64 = 5000;

/// Configuration for opening a Linux GPIO ISP link
#[derive(Debug, Clone)]
pub struct LinuxGpioIspConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// RESET GPIO line offset (driven low to hold the target in reset)
    pub reset: Offset,
    /// SCK (Clock) GPIO line offset
    pub sck: Offset,
    /// MOSI (programmer to target) GPIO line offset
    pub mosi: Offset,
    /// MISO (target to programmer) GPIO line offset
    pub miso: Offset,
    /// Half-period delay in nanoseconds
    pub half_period_ns: u64,
}

impl Default for LinuxGpioIspConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            reset: 0,
            sck: 0,
            mosi: 0,
            miso: 0,
            half_period_ns: DEFAULT_HALF_PERIOD_NS,
        }
    }
}

impl LinuxGpioIspConfig {
    /// Create a new configuration with the given device path and pins
    pub fn new(
        device: impl Into<String>,
        reset: Offset,
        sck: Offset,
        mosi: Offset,
        miso: Offset,
    ) -> Self {
        Self {
            device: device.into(),
            reset,
            sck,
            mosi,
            miso,
            ..Default::default()
        }
    }

    /// Set the half-period delay in nanoseconds
    pub fn with_half_period_ns(mut self, ns: u64) -> Self {
        self.half_period_ns = ns;
        self
    }

    /// Set SCK speed in Hz (approximate, via half-period calculation)
    pub fn with_speed_hz(mut self, hz: u32) -> Self {
        if hz > 0 {
            self.half_period_ns = 500_000_000 / hz as u64;
        }
        self
    }

    pub(crate) fn offsets(&self) -> [Offset; MAX_LINES] {
        let mut offsets = [0; MAX_LINES];
        offsets[Line::Reset as usize] = self.reset;
        offsets[Line::Sck as usize] = self.sck;
        offsets[Line::Mosi as usize] = self.mosi;
        offsets[Line::Miso as usize] = self.miso;
        offsets
    }
}

fn level(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

/// Linux GPIO ISP link using bitbanging
pub struct LinuxGpioIsp {
    /// GPIO line request handle
    request: Request,
    /// GPIO line offsets indexed by Line enum
    offsets: [Offset; MAX_LINES],
    /// Lines currently configured as outputs
    lines: Lines,
    /// Last level set on each output line
    levels: [bool; MAX_LINES],
    /// Half-period delay in nanoseconds
    half_period_ns: u64,
}

impl LinuxGpioIsp {
    /// Open a Linux GPIO ISP link with the given configuration
    pub fn open(config: &LinuxGpioIspConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }

        let offsets = config.offsets();
        for (i, offset) in offsets.iter().enumerate() {
            if offsets[i + 1..].contains(offset) {
                return Err(LinuxGpioError::DuplicateLine(*offset));
            }
        }

        log::debug!("linux_gpio: Opening device {}", config.device);

        // Everything starts as an input so the target keeps running
        let mut req_config = Config::default();
        for offset in offsets {
            req_config.with_line(offset).as_input();
        }

        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer("avrcal")
            .request()
            .map_err(LinuxGpioError::LineRequestFailed)?;

        log::info!(
            "linux_gpio: Opened {} (reset={}, sck={}, mosi={}, miso={})",
            config.device,
            config.reset,
            config.sck,
            config.mosi,
            config.miso
        );

        Ok(Self {
            request,
            offsets,
            lines: Lines::empty(),
            levels: [false; MAX_LINES],
            half_period_ns: config.half_period_ns,
        })
    }

    /// Line configuration matching the current driven set
    fn line_config(&self) -> Config {
        let mut cfg = Config::default();
        for (line, flag) in OUTPUTS {
            let offset = self.offsets[line as usize];
            if self.lines.contains(flag) {
                cfg.with_line(offset)
                    .as_output(level(self.levels[line as usize]));
            } else {
                cfg.with_line(offset).as_input();
            }
        }
        cfg.with_line(self.offsets[Line::Miso as usize]).as_input();
        cfg
    }

    fn drive(&mut self, line: Line, flag: Lines, high: bool) {
        self.levels[line as usize] = high;

        if !self.lines.contains(flag) {
            self.lines.insert(flag);
            if let Err(e) = self.request.reconfigure(&self.line_config()) {
                log::error!("Failed to configure {:?} as output: {}", line, e);
            }
            return;
        }

        if let Err(e) = self.request.set_value(self.offsets[line as usize], level(high)) {
            log::error!("Failed to set {:?}: {}", line, e);
        }
    }
}

impl IspLink for LinuxGpioIsp {
    fn set_reset(&mut self, active: bool) {
        // RESET is active low
        self.drive(Line::Reset, Lines::RESET, !active);
    }

    fn set_sck(&mut self, high: bool) {
        self.drive(Line::Sck, Lines::SCK, high);
    }

    fn set_mosi(&mut self, high: bool) {
        self.drive(Line::Mosi, Lines::MOSI, high);
    }

    fn get_miso(&self) -> bool {
        match self.request.value(self.offsets[Line::Miso as usize]) {
            Ok(Value::Active) => true,
            Ok(Value::Inactive) => false,
            Err(e) => {
                log::error!("Failed to get MISO: {}", e);
                false
            }
        }
    }

    fn half_period_delay(&self) {
        if self.half_period_ns > 0 {
            std::thread::sleep(Duration::from_nanos(self.half_period_ns));
        }
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }

    fn release(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        self.lines = Lines::empty();
        if let Err(e) = self.request.reconfigure(&self.line_config()) {
            log::error!("Failed to release GPIO lines: {}", e);
        }
    }

    fn driven(&self) -> Lines {
        self.lines
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path (required, or use gpiochip)
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
/// - `reset=N` - RESET GPIO line offset (required)
/// - `sck=N` - SCK (clock) GPIO line offset (required)
/// - `mosi=N` - MOSI GPIO line offset (required)
/// - `miso=N` - MISO GPIO line offset (required)
/// - `ispspeed=N` - SCK speed in kHz (optional, default ~100 kHz)
///
/// Counter options (`count`, `div`) are accepted and left to
/// [`crate::counter::parse_options`].
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxGpioIspConfig, String> {
    let mut config = LinuxGpioIspConfig::default();
    let mut have_reset = false;
    let mut have_sck = false;
    let mut have_mosi = false;
    let mut have_miso = false;
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                gpiochip = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid gpiochip value: {}", value))?,
                );
            }
            "reset" => {
                config.reset = value
                    .parse()
                    .map_err(|_| format!("Invalid reset value: {}", value))?;
                have_reset = true;
            }
            "sck" => {
                config.sck = value
                    .parse()
                    .map_err(|_| format!("Invalid sck value: {}", value))?;
                have_sck = true;
            }
            "mosi" => {
                config.mosi = value
                    .parse()
                    .map_err(|_| format!("Invalid mosi value: {}", value))?;
                have_mosi = true;
            }
            "miso" => {
                config.miso = value
                    .parse()
                    .map_err(|_| format!("Invalid miso value: {}", value))?;
                have_miso = true;
            }
            "ispspeed" => {
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid ispspeed value: {}", value))?;
                config = config.with_speed_hz(speed_khz * 1000);
            }
            "count" | "div" => {}
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    // Handle dev vs gpiochip
    if config.device.is_empty() {
        if let Some(n) = gpiochip {
            config.device = format!("/dev/gpiochip{}", n);
        } else {
            return Err("Either 'dev' or 'gpiochip' must be specified.\n\
                 e.g. linux_gpio:dev=/dev/gpiochip0,reset=25,sck=11,mosi=10,miso=9,count=17"
                .to_string());
        }
    } else if gpiochip.is_some() {
        return Err("Only one of 'dev' or 'gpiochip' can be specified".to_string());
    }

    if !have_reset {
        return Err("Missing required parameter: reset".to_string());
    }
    if !have_sck {
        return Err("Missing required parameter: sck".to_string());
    }
    if !have_mosi {
        return Err("Missing required parameter: mosi".to_string());
    }
    if !have_miso {
        return Err("Missing required parameter: miso".to_string());
    }

    Ok(config)
}
