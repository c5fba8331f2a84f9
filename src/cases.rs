//! The table of conformance cases and the schema directory each one uses.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardVersion {
    #[serde(rename = "1.0")]
    Version1,
    #[serde(rename = "2.0")]
    Version20,
    #[serde(rename = "2.3")]
    Version23,
}

impl fmt::Display for StandardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandardVersion::Version1 => write!(f, "1.0"),
            StandardVersion::Version20 => write!(f, "2.0"),
            StandardVersion::Version23 => write!(f, "2.3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Minimum,
    Basic,
    BasicWL,
    Comfort,
    XRechnung,
    Extended,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Minimum => "Minimum",
            Profile::Basic => "Basic",
            Profile::BasicWL => "BasicWL",
            Profile::Comfort => "Comfort",
            Profile::XRechnung => "XRechnung",
            Profile::Extended => "Extended",
        };
        f.write_str(name)
    }
}

/// The XML syntax a document is serialized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Cii,
    Ubl,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Cii => write!(f, "CII"),
            Dialect::Ubl => write!(f, "UBL"),
        }
    }
}

/// Which business document the producer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Invoice,
    CreditNote,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Invoice => write!(f, "Invoice"),
            DocumentKind::CreditNote => write!(f, "CreditNote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseKey {
    pub version: StandardVersion,
    pub profile: Profile,
    pub dialect: Dialect,
}

impl CaseKey {
    pub fn new(version: StandardVersion, profile: Profile, dialect: Dialect) -> Self {
        Self {
            version,
            profile,
            dialect,
        }
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.version, self.profile, self.dialect)
    }
}

/// One row of the table: a key, its schema directory relative to the
/// documentation root, and the document kinds checked against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseEntry {
    #[serde(flatten)]
    pub key: CaseKey,
    pub schema_dir: String,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<DocumentKind>,
}

fn default_kinds() -> Vec<DocumentKind> {
    vec![DocumentKind::Invoice]
}

/// A single check to run: a key, a document kind and the absolute schema
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConformanceCase {
    pub key: CaseKey,
    pub kind: DocumentKind,
    pub schema_dir: PathBuf,
}

impl fmt::Display for ConformanceCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.kind)
    }
}

/// Maps case keys to schema directories below a documentation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseTable {
    root: PathBuf,
    entries: Vec<CaseEntry>,
}

const XRECHNUNG_UBL_XSD: &str = r"xRechnung\XRechnung 3.0.1\validator-configuration-xrechnung_3.0.1_2023-09-22\resources\ubl\2.1\xsd";

impl CaseTable {
    pub fn new(root: impl AsRef<Path>, entries: Vec<CaseEntry>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            entries,
        }
    }

    /// The schema matrix the invoice library is checked against: every
    /// supported CII profile plus XRechnung UBL invoices and credit notes.
    pub fn builtin(root: impl AsRef<Path>) -> Self {
        use Dialect::*;
        use Profile::*;
        use StandardVersion::*;

        let cii = |version, profile, dir: &str| CaseEntry {
            key: CaseKey::new(version, profile, Cii),
            schema_dir: dir.to_string(),
            kinds: default_kinds(),
        };

        let entries = vec![
            cii(Version1, Basic, r"zugferd10\Schema"),
            cii(Version1, Comfort, r"zugferd10\Schema"),
            cii(Version1, Extended, r"zugferd10\Schema"),
            cii(Version20, Minimum, r"zugferd20\Schema\BASIC und MINIMUM"),
            cii(Version20, Basic, r"zugferd20\Schema\BASIC und MINIMUM"),
            cii(Version20, BasicWL, r"zugferd20\Schema\BASIC und MINIMUM"),
            cii(Version20, Comfort, r"zugferd20\Schema\EN16931"),
            cii(Version20, Extended, r"zugferd20\Schema\EXTENDED"),
            cii(Version23, Minimum, r"zugferd23de\Schema\0. Factur-X_1.07.2_MINIMUM"),
            cii(Version23, Basic, r"zugferd23de\Schema\2. Factur-X_1.07.2_BASIC"),
            cii(Version23, BasicWL, r"zugferd23de\Schema\1. Factur-X_1.07.2_BASICWL"),
            cii(Version23, Comfort, r"zugferd23de\Schema\3. Factur-X_1.07.2_EN16931"),
            cii(Version23, XRechnung, r"zugferd23de\Schema\3. Factur-X_1.07.2_EN16931"),
            cii(Version23, Extended, r"zugferd23de\Schema\4. Factur-X_1.07.2_EXTENDED"),
            CaseEntry {
                key: CaseKey::new(Version23, XRechnung, Ubl),
                schema_dir: XRECHNUNG_UBL_XSD.to_string(),
                kinds: vec![DocumentKind::Invoice, DocumentKind::CreditNote],
            },
        ];

        Self::new(root, entries)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[CaseEntry] {
        &self.entries
    }

    /// Add or replace the entry for a key.
    pub fn insert(&mut self, entry: CaseEntry) {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// The schema directory for `key`.
    pub fn resolve(&self, key: &CaseKey) -> Result<PathBuf> {
        self.entries
            .iter()
            .find(|e| e.key == *key)
            .map(|e| self.root.join(normalize_path(&e.schema_dir)))
            .ok_or_else(|| ValidationError::UnknownCase {
                key: key.to_string(),
            })
    }

    /// Every (key, kind) pair in table order.
    pub fn cases(&self) -> Vec<ConformanceCase> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let schema_dir = self.root.join(normalize_path(&entry.schema_dir));
                entry.kinds.iter().map(move |&kind| ConformanceCase {
                    key: entry.key,
                    kind,
                    schema_dir: schema_dir.clone(),
                })
            })
            .collect()
    }
}

/// Accept both separator styles in configured paths.
pub fn normalize_path(raw: &str) -> PathBuf {
    let unified = raw.replace('\\', "/");
    unified
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(
            if unified.starts_with('/') {
                PathBuf::from("/")
            } else {
                PathBuf::new()
            },
            |path, part| path.join(part),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_covers_reference_matrix() {
        let table = CaseTable::builtin("/docs");
        assert_eq!(table.entries().len(), 15);

        let cases = table.cases();
        assert_eq!(cases.len(), 16);
        assert_eq!(
            cases
                .iter()
                .filter(|c| c.key.dialect == Dialect::Ubl)
                .map(|c| c.kind)
                .collect::<Vec<_>>(),
            vec![DocumentKind::Invoice, DocumentKind::CreditNote]
        );
    }

    #[test]
    fn test_resolve_normalizes_separators() {
        let table = CaseTable::builtin("/docs");
        let key = CaseKey::new(StandardVersion::Version23, Profile::Minimum, Dialect::Cii);

        let dir = table.resolve(&key).unwrap();
        assert_eq!(
            dir,
            PathBuf::from("/docs/zugferd23de/Schema/0. Factur-X_1.07.2_MINIMUM")
        );
    }

    #[test]
    fn test_comfort_and_xrechnung_share_en16931() {
        let table = CaseTable::builtin("docs");
        let comfort = CaseKey::new(StandardVersion::Version23, Profile::Comfort, Dialect::Cii);
        let xrechnung = CaseKey::new(StandardVersion::Version23, Profile::XRechnung, Dialect::Cii);

        assert_eq!(table.resolve(&comfort).unwrap(), table.resolve(&xrechnung).unwrap());
    }

    #[test]
    fn test_unknown_case() {
        let table = CaseTable::builtin("docs");
        let key = CaseKey::new(StandardVersion::Version1, Profile::Minimum, Dialect::Cii);

        match table.resolve(&key) {
            Err(ValidationError::UnknownCase { key }) => assert_eq!(key, "1.0/Minimum/CII"),
            other => panic!("Expected UnknownCase, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut table = CaseTable::builtin("docs");
        let key = CaseKey::new(StandardVersion::Version20, Profile::Comfort, Dialect::Cii);
        table.insert(CaseEntry {
            key,
            schema_dir: "custom/en16931".to_string(),
            kinds: default_kinds(),
        });

        assert_eq!(table.entries().len(), 15);
        assert_eq!(
            table.resolve(&key).unwrap(),
            PathBuf::from("docs/custom/en16931")
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(r"a\b\c"), PathBuf::from("a/b/c"));
        assert_eq!(normalize_path("a//b/"), PathBuf::from("a/b"));
        assert_eq!(normalize_path("/abs/dir"), PathBuf::from("/abs/dir"));
        assert_eq!(
            normalize_path(r"..\..\documentation\zugferd10"),
            PathBuf::from("../../documentation/zugferd10")
        );
    }

    #[test]
    fn test_case_entry_deserializes_flat() {
        let entry: CaseEntry = toml::from_str(
            r#"
version = "2.3"
profile = "xrechnung"
dialect = "ubl"
schema_dir = 'xRechnung\ubl\xsd'
kinds = ["invoice", "credit_note"]
"#,
        )
        .unwrap();

        assert_eq!(
            entry.key,
            CaseKey::new(StandardVersion::Version23, Profile::XRechnung, Dialect::Ubl)
        );
        assert_eq!(entry.kinds.len(), 2);
    }
}
