// MIT License - Copyright (c) 2026 Peter Wright

use bitflags::bitflags;

bitflags! {
    /// The three independently armable alarm partitions.
    ///
    /// Any subset is representable as a union; the panel's night/home modes
    /// are configured as such unions (e.g. A|B for "perimeter only").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Zones: u8 {
        const A = 1;
        const B = 2;
        const C = 4;
        const ABC = 7;
    }
}

impl Zones {
    /// Build from the numeric form stored in the bridge configuration.
    ///
    /// Out-of-range bits are dropped; 0 means no zones.
    pub fn from_bits_lossy(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }

    /// Split a zone set into the sequence of arm commands the panel accepts.
    ///
    /// The panel's control form only has buttons for A, B, C and ABC, so the
    /// full union arms in one request and every other subset arms one zone
    /// at a time.
    pub fn decompose(self) -> Vec<Zones> {
        if self == Zones::ABC {
            return vec![Zones::ABC];
        }
        [Zones::A, Zones::B, Zones::C]
            .into_iter()
            .filter(|z| self.contains(*z))
            .collect()
    }

    /// Short display form used in logs and MQTT payloads ("A", "ABC", ...).
    pub fn letters(self) -> String {
        let mut s = String::new();
        if self.contains(Zones::A) {
            s.push('A');
        }
        if self.contains(Zones::B) {
            s.push('B');
        }
        if self.contains(Zones::C) {
            s.push('C');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_singles() {
        assert_eq!(Zones::A.decompose(), vec![Zones::A]);
        assert_eq!(Zones::B.decompose(), vec![Zones::B]);
        assert_eq!(Zones::C.decompose(), vec![Zones::C]);
    }

    #[test]
    fn test_decompose_full_union_is_one_command() {
        assert_eq!(Zones::ABC.decompose(), vec![Zones::ABC]);
    }

    #[test]
    fn test_decompose_empty() {
        assert_eq!(Zones::empty().decompose(), Vec::<Zones>::new());
    }

    #[test]
    fn test_disjoint_pairs_roundtrip() {
        // The union of any two disjoint zones decomposes back to the pair.
        let pairs = [
            (Zones::A, Zones::B),
            (Zones::A, Zones::C),
            (Zones::B, Zones::C),
        ];
        for (x, y) in pairs {
            assert_eq!((x | y).decompose(), vec![x, y]);
        }
    }

    #[test]
    fn test_from_bits_lossy() {
        assert_eq!(Zones::from_bits_lossy(0), Zones::empty());
        assert_eq!(Zones::from_bits_lossy(3), Zones::A | Zones::B);
        assert_eq!(Zones::from_bits_lossy(7), Zones::ABC);
        // High bits are dropped
        assert_eq!(Zones::from_bits_lossy(0xF8 | 5), Zones::A | Zones::C);
    }

    #[test]
    fn test_letters() {
        assert_eq!((Zones::A | Zones::C).letters(), "AC");
        assert_eq!(Zones::ABC.letters(), "ABC");
        assert_eq!(Zones::empty().letters(), "");
    }
}
