use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::{Error, Result};
use crate::pattern::CompiledPattern;

/// Engine global being searched for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TargetClass {
    GWorld,
    GNames,
    GObjects,
}

impl TargetClass {
    /// Opcode prefixes of the RIP-relative instructions that reference this
    /// global, in preference order.
    pub fn instruction_prefixes(self) -> &'static [[u8; 3]] {
        match self {
            // mov [rip+disp32], rax
            TargetClass::GWorld => &[[0x48, 0x89, 0x05]],
            // lea rcx, [rip+disp32] / mov rax, [rip+disp32]
            TargetClass::GNames => &[[0x48, 0x8D, 0x0D], [0x48, 0x8B, 0x05]],
            // mov r9, [rip+disp32]
            TargetClass::GObjects => &[[0x4C, 0x8B, 0x0D]],
        }
    }

    pub fn all() -> impl Iterator<Item = TargetClass> {
        TargetClass::iter()
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| Error::UnknownTargetClass(name.to_string()))
    }
}

/// One compiled signature variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub class: TargetClass,
    pub pattern: CompiledPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDef {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSignatures {
    pub class: TargetClass,
    pub signatures: Vec<SignatureDef>,
}

/// On-disk form of a signature table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureFile {
    pub version: String,
    pub classes: Vec<ClassSignatures>,
}

pub const BUILTIN_VERSION: &str = "builtin";

const BUILTIN_SIGNATURES: &[(TargetClass, &str, &str)] = &[
    (
        TargetClass::GWorld,
        "GWorld (Variant 1)",
        "48 89 05 ?? ?? ?? ?? ?? 8B ?? ?? ?? F6 86 3B 01 00 00 40",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 2)",
        "48 89 05 ?? ?? ?? ?? ?? 8B ?? ?? F6 86 3B 01 00 00 40",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 3)",
        "48 89 05 ?? ?? ?? ?? ?? 8B ?? ?? ?? ?? ?? F6 86 ?? 01 00 00 40",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 4)",
        "?? 8B ?? ?? ?? 00 00 ?? 48 89 05 ?? ?? ?? ?? ?? 8B ?? ?? ?? 00 00 ?? ?? ?? ?? ?? 00 ??",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 5)",
        "48 89 05 ?? ?? ?? 02 48 8B 8F A0 ?? ?? ??",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 6)",
        "48 89 05 ?? ?? ?? ?? 49 8B ?? 78 F6 ?? 3B 01 ?? ?? 40",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 7)",
        "E8 ?? ?? ?? FF ?? 8B ?? 78 48 89 05 ?? ?? ?? ?? ?? 8B ?? 78",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 8)",
        "48 89 05 ?? ?? ?? ?? ?? 8B ?? 88 ?? ?? ?? F6 ?? 0B 01 ?? ?? 40 75 ??",
    ),
    (
        TargetClass::GWorld,
        "GWorld (Variant 9)",
        "48 8B 3D ?? ?? ?? ?? 48 8B 5C 24 ?? 48 8B C7",
    ),
    (
        TargetClass::GNames,
        "GNames (Variant 1)",
        "48 8D 0D ?? ?? ?? ?? E8 ?? ?? FE FF 4C 8B C0 C6 05 ?? ?? ?? ?? 01",
    ),
    (
        TargetClass::GNames,
        "GNames (Variant 2)",
        "48 8D 0D ?? ?? ?? 03 E8 ?? ?? FF FF 4C ?? C0",
    ),
    (
        TargetClass::GNames,
        "GNames (Variant 3)",
        "48 8D 0D ?? ?? ?? ?? E8 ?? ?? FF FF 48 8B D0 C6 05 ?? ?? ?? ?? 01",
    ),
    (
        TargetClass::GNames,
        "GNames (Variant 4)",
        "48 8B 05 ?? ?? ?? 02 48 85 C0 75 5F B9 08 08 ??",
    ),
    (
        TargetClass::GObjects,
        "GObjects (Variant 1)",
        "4C 8B 0D ?? ?? ?? ?? 99 0F B7 D2",
    ),
    (
        TargetClass::GObjects,
        "GObjects (Variant 2)",
        "4C 8B 0D ?? ?? ?? ?? 41 3B C0 7D 17",
    ),
    (
        TargetClass::GObjects,
        "GObjects (Variant 3)",
        "4C 8B 0D ?? ?? ?? 04 90 0F B7 C6 8B D6",
    ),
    (
        TargetClass::GObjects,
        "GObjects (Variant 4)",
        "4C 8B 0D ?? ?? ?? ?? 8B D0 C1 EA 10",
    ),
];

/// Signature variants grouped by target class, in priority order.
///
/// Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTable {
    version: String,
    classes: Vec<(TargetClass, Vec<Signature>)>,
}

impl SignatureTable {
    /// The table compiled into the binary.
    pub fn builtin() -> &'static SignatureTable {
        static BUILTIN: OnceLock<SignatureTable> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            SignatureTable::from_file(&builtin_signature_file())
                .expect("built-in signatures are valid patterns")
        })
    }

    /// Compile a signature file. Any malformed pattern rejects the whole file.
    pub fn from_file(file: &SignatureFile) -> Result<Self> {
        let mut classes: Vec<(TargetClass, Vec<Signature>)> = Vec::new();

        for group in &file.classes {
            let mut compiled = Vec::with_capacity(group.signatures.len());
            for def in &group.signatures {
                let pattern = CompiledPattern::compile(&def.pattern).map_err(|e| {
                    Error::InvalidPattern(format!("signature '{}': {}", def.name, e))
                })?;
                compiled.push(Signature {
                    name: def.name.clone(),
                    class: group.class,
                    pattern,
                });
            }

            match classes.iter_mut().find(|(class, _)| *class == group.class) {
                Some((_, existing)) => existing.extend(compiled),
                None => classes.push((group.class, compiled)),
            }
        }

        Ok(Self {
            version: file.version.clone(),
            classes,
        })
    }

    pub fn to_file(&self) -> SignatureFile {
        SignatureFile {
            version: self.version.clone(),
            classes: self
                .classes
                .iter()
                .map(|(class, signatures)| ClassSignatures {
                    class: *class,
                    signatures: signatures
                        .iter()
                        .map(|s| SignatureDef {
                            name: s.name.clone(),
                            pattern: s.pattern.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Variants for `class` in priority order; empty if the table has none.
    pub fn variants(&self, class: TargetClass) -> &[Signature] {
        self.classes
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, signatures)| signatures.as_slice())
            .unwrap_or(&[])
    }

    /// Classes present in the table, in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = TargetClass> + '_ {
        self.classes.iter().map(|(class, _)| *class)
    }

    pub fn len(&self) -> usize {
        self.classes.iter().map(|(_, s)| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

fn builtin_signature_file() -> SignatureFile {
    let mut classes: Vec<ClassSignatures> = Vec::new();
    for (class, name, pattern) in BUILTIN_SIGNATURES {
        let def = SignatureDef {
            name: name.to_string(),
            pattern: pattern.to_string(),
        };
        match classes.iter_mut().find(|g| g.class == *class) {
            Some(group) => group.signatures.push(def),
            None => classes.push(ClassSignatures {
                class: *class,
                signatures: vec![def],
            }),
        }
    }

    SignatureFile {
        version: BUILTIN_VERSION.to_string(),
        classes,
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<SignatureTable> {
    let content = fs::read_to_string(&path)?;
    let file: SignatureFile = serde_json::from_str(&content)?;
    SignatureTable::from_file(&file)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, table: &SignatureTable) -> Result<()> {
    let content = serde_json::to_string_pretty(&table.to_file())?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_table_compiles() {
        let table = SignatureTable::builtin();
        assert_eq!(table.version(), BUILTIN_VERSION);
        assert_eq!(table.variants(TargetClass::GWorld).len(), 9);
        assert_eq!(table.variants(TargetClass::GNames).len(), 4);
        assert_eq!(table.variants(TargetClass::GObjects).len(), 4);
        assert_eq!(table.len(), BUILTIN_SIGNATURES.len());
    }

    #[test]
    fn test_builtin_variants_keep_declaration_order() {
        let names: Vec<_> = SignatureTable::builtin()
            .variants(TargetClass::GNames)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "GNames (Variant 1)",
                "GNames (Variant 2)",
                "GNames (Variant 3)",
                "GNames (Variant 4)"
            ]
        );
    }

    #[test]
    fn test_builtin_has_no_duplicate_patterns() {
        let table = SignatureTable::builtin();
        for class in TargetClass::all() {
            let variants = table.variants(class);
            for (i, a) in variants.iter().enumerate() {
                for b in &variants[i + 1..] {
                    assert_ne!(a.pattern, b.pattern, "{} duplicates {}", a.name, b.name);
                }
            }
        }
    }

    #[test]
    fn test_target_class_from_name() {
        assert_eq!(TargetClass::from_name("GWorld").unwrap(), TargetClass::GWorld);
        assert_eq!(TargetClass::from_name("gnames").unwrap(), TargetClass::GNames);
        assert_eq!(TargetClass::from_name(" GOBJECTS ").unwrap(), TargetClass::GObjects);
        assert!(matches!(
            TargetClass::from_name("GEngine"),
            Err(Error::UnknownTargetClass(_))
        ));
        assert_eq!(TargetClass::GWorld.to_string(), "GWorld");
    }

    #[test]
    fn test_instruction_prefixes() {
        assert_eq!(TargetClass::GWorld.instruction_prefixes(), &[[0x48, 0x89, 0x05]]);
        assert_eq!(TargetClass::GNames.instruction_prefixes().len(), 2);
        assert_eq!(TargetClass::GObjects.instruction_prefixes()[0], [0x4C, 0x8B, 0x0D]);
    }

    #[test]
    fn test_from_file_rejects_bad_pattern() {
        let file = SignatureFile {
            version: "test".to_string(),
            classes: vec![ClassSignatures {
                class: TargetClass::GWorld,
                signatures: vec![SignatureDef {
                    name: "broken".to_string(),
                    pattern: "48 ZZ".to_string(),
                }],
            }],
        };
        let err = SignatureTable::from_file(&file).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_from_file_merges_repeated_classes() {
        let group = |pattern: &str| ClassSignatures {
            class: TargetClass::GObjects,
            signatures: vec![SignatureDef {
                name: pattern.to_string(),
                pattern: pattern.to_string(),
            }],
        };
        let file = SignatureFile {
            version: "test".to_string(),
            classes: vec![group("4C 8B 0D"), group("4C 8B 0D ?? 99")],
        };
        let table = SignatureTable::from_file(&file).unwrap();
        assert_eq!(table.variants(TargetClass::GObjects).len(), 2);
        assert!(table.variants(TargetClass::GWorld).is_empty());
        assert_eq!(table.classes().count(), 1);
    }

    #[test]
    fn test_save_and_load_signatures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.json");

        save_signatures(&path, SignatureTable::builtin()).unwrap();
        let loaded = load_signatures(&path).unwrap();
        assert_eq!(&loaded, SignatureTable::builtin());
    }

    #[test]
    fn test_load_signatures_missing_file() {
        let err = load_signatures("/nonexistent/uefind/signatures.json").unwrap_err();
        assert!(err.is_not_found());
    }
}
