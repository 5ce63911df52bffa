use std::fmt;

use serde::{Deserialize, Serialize};

use super::TargetClass;

/// Result of one scan: an address per target class, 0 when not found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGlobals {
    pub gworld: u64,
    pub gnames: u64,
    pub gobjects: u64,
}

impl ResolvedGlobals {
    /// At least one class was found.
    pub fn is_valid(&self) -> bool {
        self.gworld != 0 || self.gnames != 0 || self.gobjects != 0
    }

    pub fn get(&self, class: TargetClass) -> u64 {
        match class {
            TargetClass::GWorld => self.gworld,
            TargetClass::GNames => self.gnames,
            TargetClass::GObjects => self.gobjects,
        }
    }

    pub fn set(&mut self, class: TargetClass, address: u64) {
        match class {
            TargetClass::GWorld => self.gworld = address,
            TargetClass::GNames => self.gnames = address,
            TargetClass::GObjects => self.gobjects = address,
        }
    }

    /// Found classes with their addresses.
    pub fn found(&self) -> impl Iterator<Item = (TargetClass, u64)> + '_ {
        TargetClass::all()
            .map(|class| (class, self.get(class)))
            .filter(|(_, address)| *address != 0)
    }

    /// One `<Class>: 0x<ADDR>` line per found class.
    pub fn summary(&self) -> String {
        self.found()
            .map(|(class, address)| format!("{}: 0x{:X}", class, address))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ResolvedGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_invalid() {
        assert!(!ResolvedGlobals::default().is_valid());
        assert_eq!(ResolvedGlobals::default().summary(), "");
    }

    #[test]
    fn test_partial_result_is_valid() {
        let mut globals = ResolvedGlobals::default();
        globals.set(TargetClass::GNames, 0x1_4500_0000);
        assert!(globals.is_valid());
        assert_eq!(globals.get(TargetClass::GNames), 0x1_4500_0000);
        assert_eq!(globals.get(TargetClass::GWorld), 0);
    }

    #[test]
    fn test_summary_lists_found_classes_in_order() {
        let globals = ResolvedGlobals {
            gworld: 0x1_4A2B_3C40,
            gnames: 0,
            gobjects: 0x1_4A00_0010,
        };
        assert_eq!(
            globals.summary(),
            "GWorld: 0x14A2B3C40\nGObjects: 0x14A000010"
        );
        assert_eq!(globals.found().count(), 2);
    }
}
