//! Probe command implementation

use avrcal_core::counter::GateIrq;

use crate::programmers::Backend;

/// Identify the connected target and print what calibration would start from
pub fn run_probe(backend: Backend) -> Result<(), Box<dyn std::error::Error>> {
    let irq = GateIrq::new();
    let mut calibrator = super::calibrator(backend, &irq);

    match calibrator.identify() {
        Ok((target, factory)) => {
            println!("Found target:");
            println!("  Name:       {}", target.name);
            println!("  Signature:  1E {:04X}", target.signature);
            println!("  Frequency:  {} kHz nominal", target.expected_khz);
            println!("  Flash page: {} words", target.page_words);
            println!(
                "  Fuses:      L={:02X} H={:02X} E={:02X} (written on calibrate)",
                target.fuses.low, target.fuses.high, target.fuses.extended
            );
            println!(
                "  Factory calibration [{}]: 0x{:02X}",
                target.cal_index, factory
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Probe failed: {}", e);
            Err(Box::new(e))
        }
    }
}
