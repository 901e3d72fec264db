//! Gated pulse counter
//!
//! The instrumentation image toggles an output at a fixed fraction of the
//! target oscillator. Two timers turn that into a frequency: one counts
//! edges on the input, the other fires once after [`GATE_MS`] and stops the
//! count. The counting register is only 8 bits wide, so its overflow
//! interrupt extends it in software by another 16 bits.
//!
//! Interrupt handlers (or a backend standing in for them) talk to the
//! measuring code exclusively through [`GateIrq`]. The overflow extension is
//! written only while sampling is in progress and read only after the gate
//! handler has cleared the sampling flag, so the flag's release/acquire pair
//! is the only synchronisation needed.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Gate window length in milliseconds
pub const GATE_MS: u32 = 32;

/// Gate window length in microseconds
pub const GATE_US: u32 = GATE_MS * 1000;

/// Ratio between the target oscillator and the counted edges
///
/// Counted edges over the gate therefore equal `f_osc / SIGNAL_DIVISOR *
/// GATE_MS / 1000`, i.e. two counts per kHz with the default constants.
pub const SIGNAL_DIVISOR: u32 = 16;

/// Width of the hardware counting register in bits
pub const COUNTER_BITS: u32 = 8;

/// Convert a raw count over one gate window into kHz
pub const fn count_to_khz(count: u32) -> u32 {
    count * SIGNAL_DIVISOR / GATE_MS
}

/// Oscillator frequency in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Frequency(u32);

impl Frequency {
    /// Create from a value in kHz
    pub const fn from_khz(khz: u32) -> Self {
        Self(khz)
    }

    /// Create from a raw gate-window count
    pub const fn from_count(count: u32) -> Self {
        Self(count_to_khz(count))
    }

    /// Value in kHz
    pub const fn khz(self) -> u32 {
        self.0
    }

    /// Absolute difference to `other` in kHz
    pub const fn abs_diff(self, other: Self) -> u32 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kHz", self.0)
    }
}

/// State shared with the counter and gate interrupt handlers
#[derive(Debug)]
pub struct GateIrq {
    sampling: AtomicBool,
    overflows: AtomicU16,
}

impl GateIrq {
    /// Create an idle state (suitable for a `static`)
    pub const fn new() -> Self {
        Self {
            sampling: AtomicBool::new(false),
            overflows: AtomicU16::new(0),
        }
    }

    fn arm(&self) {
        self.overflows.store(0, Ordering::Relaxed);
        self.sampling.store(true, Ordering::Release);
    }

    /// Counter overflow interrupt: extend the count by one register wrap
    pub fn on_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Gate timer interrupt: the window is over
    ///
    /// The handler must also stop the pulse counter; `measure` stops both
    /// timers again once it sees the flag, which is harmless.
    pub fn on_gate_elapsed(&self) {
        self.sampling.store(false, Ordering::Release);
    }

    /// Whether a gate window is still open
    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    fn extension(&self) -> u16 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl Default for GateIrq {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulse counter and gate timer pair
pub trait CounterHardware {
    /// Clear the pulse register and the gate timer
    fn reset(&mut self);

    /// Arm the gate timer for `gate_us` and start counting pulses
    fn start(&mut self, gate_us: u32);

    /// Stop both timers
    fn stop(&mut self);

    /// Current value of the hardware pulse register
    fn count(&self) -> u8;

    /// Wait until an interrupt may have changed `irq`
    ///
    /// On a microcontroller the ISRs update a `static GateIrq` directly and
    /// this just spins. Hosted and simulated backends deliver their overflow
    /// and gate events to `irq` from here instead.
    fn wait_for_interrupt(&mut self, irq: &GateIrq) {
        let _ = irq;
        core::hint::spin_loop();
    }
}

#[cfg(feature = "alloc")]
impl CounterHardware for alloc::boxed::Box<dyn CounterHardware + Send> {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn start(&mut self, gate_us: u32) {
        (**self).start(gate_us)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn count(&self) -> u8 {
        (**self).count()
    }

    fn wait_for_interrupt(&mut self, irq: &GateIrq) {
        (**self).wait_for_interrupt(irq)
    }
}

/// Frequency counter built from a [`CounterHardware`] and its interrupt state
pub struct FrequencyCounter<'a, H> {
    hw: H,
    irq: &'a GateIrq,
}

impl<'a, H: CounterHardware> FrequencyCounter<'a, H> {
    /// Create a counter; `irq` must be the state the hardware's ISRs update
    pub fn new(hw: H, irq: &'a GateIrq) -> Self {
        Self { hw, irq }
    }

    /// Borrow the hardware
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Mutably borrow the hardware
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Count pulses over one gate window and return the raw count
    ///
    /// Blocks for exactly one gate window.
    pub fn measure_raw(&mut self) -> u32 {
        self.hw.stop();
        self.hw.reset();
        self.irq.arm();
        self.hw.start(GATE_US);

        while self.irq.is_sampling() {
            self.hw.wait_for_interrupt(self.irq);
        }
        self.hw.stop();

        let count = ((self.irq.extension() as u32) << COUNTER_BITS) | self.hw.count() as u32;
        log::trace!("counter: {} pulses in {} ms", count, GATE_MS);
        count
    }

    /// Measure the target oscillator frequency
    ///
    /// Returns zero when no pulses arrive.
    pub fn measure(&mut self) -> Frequency {
        Frequency::from_count(self.measure_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counter that delivers a fixed number of pulses per gate window
    struct FakeCounter {
        pulses: u32,
        register: u8,
        running: bool,
        gate_us: u32,
        waits: u32,
    }

    impl FakeCounter {
        fn new(pulses: u32) -> Self {
            Self {
                pulses,
                register: 0,
                running: false,
                gate_us: 0,
                waits: 0,
            }
        }
    }

    impl CounterHardware for FakeCounter {
        fn reset(&mut self) {
            self.register = 0;
        }

        fn start(&mut self, gate_us: u32) {
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
            self.waits += 1;
            for _ in 0..(self.pulses >> COUNTER_BITS) {
                irq.on_overflow();
            }
            self.register = self.pulses as u8;
            self.running = false;
            irq.on_gate_elapsed();
        }
    }

    #[test]
    fn test_reference_conversion() {
        assert_eq!(count_to_khz(16000), 8000);
        assert_eq!(Frequency::from_count(19200).khz(), 9600);
    }

    #[test]
    fn test_measure() {
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(FakeCounter::new(16000), &irq);
        assert_eq!(counter.measure(), Frequency::from_khz(8000));
        assert_eq!(counter.hardware().gate_us, 32_000);
        assert_eq!(counter.hardware().waits, 1);
        assert!(!counter.hardware().running);
        assert!(!irq.is_sampling());
    }

    #[test]
    fn test_extension_beyond_register() {
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(FakeCounter::new(70_001), &irq);
        assert_eq!(counter.measure_raw(), 70_001);
    }

    #[test]
    fn test_extension_reset_between_measurements() {
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(FakeCounter::new(1000), &irq);
        assert_eq!(counter.measure_raw(), 1000);
        assert_eq!(counter.measure_raw(), 1000);
    }

    #[test]
    fn test_no_signal() {
        let irq = GateIrq::new();
        let mut counter = FrequencyCounter::new(FakeCounter::new(0), &irq);
        assert_eq!(counter.measure().khz(), 0);
    }

    #[test]
    fn test_abs_diff() {
        let a = Frequency::from_khz(8040);
        let b = Frequency::from_khz(8000);
        assert_eq!(a.abs_diff(b), 40);
        assert_eq!(b.abs_diff(a), 40);
    }
}
