//! Static target registry
//!
//! A small table of supported parts. Lookup is a linear scan in table order;
//! signatures are unique so the first match is the only match.

use super::images;
use super::types::{Fuses, IspTiming, TargetDescriptor};

/// All supported targets
pub static TARGETS: &[TargetDescriptor] = &[
    TargetDescriptor {
        name: "ATtiny13",
        signature: 0x9007,
        // 9.6 MHz internal RC, CKDIV8 off
        fuses: Fuses::new(0x7A, 0xFF, 0xFF),
        page_words: 16,
        image: images::ATTINY13,
        expected_khz: 9600,
        cal_index: 0,
        timing: IspTiming::TINY,
    },
    TargetDescriptor {
        name: "ATtiny24",
        signature: 0x910B,
        // 8 MHz internal RC, CKDIV8 off
        fuses: Fuses::new(0xE2, 0xDF, 0xFF),
        page_words: 16,
        image: images::ATTINYX4,
        expected_khz: 8000,
        cal_index: 0,
        timing: IspTiming::TINY,
    },
    TargetDescriptor {
        name: "ATtiny44",
        signature: 0x9207,
        fuses: Fuses::new(0xE2, 0xDF, 0xFF),
        page_words: 32,
        image: images::ATTINYX4,
        expected_khz: 8000,
        cal_index: 0,
        timing: IspTiming::TINY,
    },
    TargetDescriptor {
        name: "ATtiny84",
        signature: 0x930C,
        fuses: Fuses::new(0xE2, 0xDF, 0xFF),
        page_words: 32,
        image: images::ATTINYX4,
        expected_khz: 8000,
        cal_index: 0,
        timing: IspTiming::TINY,
    },
    TargetDescriptor {
        name: "ATmega8",
        signature: 0x9307,
        // 8 MHz internal RC; factory value for 8 MHz lives at index 3
        fuses: Fuses::new(0xE4, 0xD9, 0xFF),
        page_words: 32,
        image: images::ATMEGA8,
        expected_khz: 8000,
        cal_index: 3,
        timing: IspTiming::MEGA8,
    },
];

/// Find the descriptor for a signature in the default table
pub fn lookup(signature: u16) -> Option<TargetDescriptor> {
    lookup_in(TARGETS, signature)
}

/// Find the descriptor for a signature in an arbitrary table
pub fn lookup_in(table: &[TargetDescriptor], signature: u16) -> Option<TargetDescriptor> {
    table.iter().find(|t| t.signature == signature).copied()
}

/// Find a target by display name (case-insensitive)
pub fn lookup_by_name(name: &str) -> Option<TargetDescriptor> {
    TARGETS
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_every_entry() {
        for target in TARGETS {
            let found = lookup(target.signature).unwrap();
            assert_eq!(found.signature, target.signature);
            assert_eq!(found.name, target.name);
        }
    }

    #[test]
    fn test_lookup_missing() {
        assert_eq!(lookup(0x0000), None);
        assert_eq!(lookup(0xFFFF), None);
        assert_eq!(lookup(0x9108), None);
    }

    #[test]
    fn test_signatures_unique() {
        for (i, a) in TARGETS.iter().enumerate() {
            for b in &TARGETS[i + 1..] {
                assert_ne!(a.signature, b.signature, "{} / {}", a.name, b.name);
            }
        }
    }

    #[test]
    fn test_images_consistent() {
        for target in TARGETS {
            assert!(target.page_words > 0, "{}", target.name);
            assert!(!target.image.is_empty(), "{}", target.name);
            assert_eq!(target.image_len() % 2, 0, "{}", target.name);
        }
    }

    #[test]
    fn test_release_covers_startup() {
        use crate::target::RESET_STARTUP_US;

        for target in TARGETS {
            // The image must be running for the whole gate window
            assert!(
                target.timing.exit_release_us >= RESET_STARTUP_US,
                "{}: gate opens {} us after release",
                target.name,
                target.timing.exit_release_us
            );
        }
    }

    #[test]
    fn test_attiny84() {
        let t = lookup(0x930C).unwrap();
        assert_eq!(t.name, "ATtiny84");
        assert_eq!(t.expected_khz, 8000);
        assert_eq!(t.page_words, 32);
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(lookup_by_name("attiny13").unwrap().signature, 0x9007);
        assert_eq!(lookup_by_name("ATMEGA8").unwrap().cal_index, 3);
        assert!(lookup_by_name("atmega328p").is_none());
    }
}
