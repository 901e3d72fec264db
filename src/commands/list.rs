//! List commands implementation

use avrcal_core::counter::Frequency;
use avrcal_core::target::{self, images};

use crate::programmers;

/// List all available programmers
pub fn list_programmers() {
    print!("{}", programmers::programmer_help());
}

/// List all supported targets
pub fn list_targets() {
    println!("Supported targets (image revision {}):", images::IMAGE_REVISION);
    println!();
    println!(
        "{:<10} {:>9} {:>10} {:>6} {:>10} {:>8}",
        "Name", "Signature", "Frequency", "Page", "Fuses", "Image"
    );
    println!("{}", "-".repeat(58));

    for t in target::TARGETS {
        let fuses = format!(
            "{:02X}/{:02X}/{:02X}",
            t.fuses.low, t.fuses.high, t.fuses.extended
        );
        println!(
            "{:<10} {:>9} {:>10} {:>6} {:>10} {:>8}",
            t.name,
            format!("0x{:04X}", t.signature),
            Frequency::from_khz(t.expected_khz).to_string(),
            format!("{} w", t.page_words),
            fuses,
            format!("{} B", t.image_len())
        );
    }
}
