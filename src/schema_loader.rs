//! Loading a directory of schema files with per-file load policies.
//!
//! Most schema files are handed to libxml2 by path. A few legacy files ship
//! with a DOCTYPE that points at the W3C XMLSchema DTD; those are read
//! through a hardened parser first and dropped when nothing usable comes
//! back.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::discovery::SchemaDiscovery;
use crate::error::{Result, ValidationError};
use crate::inspect::SchemaHeader;
use crate::libxml2::{LibXml2Wrapper, XmlDocument};

/// The legacy xmldsig schema bundled with UBL 2.1, which declares an
/// external DTD.
pub const LEGACY_XMLDSIG_SCHEMA: &str = "UBL-xmldsig-core-schema-2.1.xsd";

/// How a single schema file is brought into the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Pass the path straight to the compiler. Compile errors are recorded,
    /// not raised.
    #[default]
    Default,
    /// Parse without network, DTD loading or entity substitution; skip the
    /// file if that does not yield an `xs:schema` document.
    DtdDisabledTolerant,
}

impl fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPolicy::Default => write!(f, "default"),
            LoadPolicy::DtdDisabledTolerant => write!(f, "dtd-disabled-tolerant"),
        }
    }
}

/// Selects a policy for every path ending in `suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub suffix: String,
    pub policy: LoadPolicy,
}

impl PolicyRule {
    pub fn new(suffix: impl Into<String>, policy: LoadPolicy) -> Self {
        Self {
            suffix: suffix.into().replace('\\', "/"),
            policy,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        path.ends_with(&self.suffix)
    }
}

/// Ordered policy rules; the first matching rule wins, `Default` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadPolicySet {
    rules: Vec<PolicyRule>,
}

impl LoadPolicySet {
    /// A set without any exceptions.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn policy_for(&self, path: &Path) -> LoadPolicy {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map_or(LoadPolicy::Default, |rule| rule.policy)
    }
}

impl Default for LoadPolicySet {
    fn default() -> Self {
        Self::empty().with_rule(PolicyRule::new(
            LEGACY_XMLDSIG_SCHEMA,
            LoadPolicy::DtdDisabledTolerant,
        ))
    }
}

/// A schema ready to be compiled.
#[derive(Debug)]
pub enum SchemaSource {
    /// Compiled from its path; imports resolve relative to it.
    Path(PathBuf),
    /// Already parsed by the hardened reader.
    Parsed {
        path: PathBuf,
        document: XmlDocument,
        header: SchemaHeader,
    },
}

impl SchemaSource {
    pub fn path(&self) -> &Path {
        match self {
            SchemaSource::Path(path) => path,
            SchemaSource::Parsed { path, .. } => path,
        }
    }
}

/// A file the loader left out, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSchema {
    pub path: PathBuf,
    pub reason: String,
}

impl From<SkippedSchema> for ValidationError {
    fn from(skipped: SkippedSchema) -> Self {
        ValidationError::SchemaFileUnreadable {
            path: skipped.path,
            reason: skipped.reason,
        }
    }
}

/// Everything found under one schema directory.
#[derive(Debug, Default)]
pub struct LoadedSchemas {
    pub sources: Vec<SchemaSource>,
    pub skipped: Vec<SkippedSchema>,
}

impl LoadedSchemas {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Enumerates a schema directory and applies the load policy per file.
pub struct SchemaFileLoader {
    discovery: SchemaDiscovery,
    policies: LoadPolicySet,
    libxml2: LibXml2Wrapper,
}

impl SchemaFileLoader {
    pub fn new(policies: LoadPolicySet) -> Self {
        Self {
            discovery: SchemaDiscovery::new(),
            policies,
            libxml2: LibXml2Wrapper::new(),
        }
    }

    pub fn with_discovery(mut self, discovery: SchemaDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn policies(&self) -> &LoadPolicySet {
        &self.policies
    }

    /// Load every schema file below `directory` in path order.
    ///
    /// Only traversal of the directory itself can fail; files rejected by
    /// the tolerant policy end up in `skipped`.
    pub fn load(&self, directory: &Path) -> Result<LoadedSchemas> {
        let files = self.discovery.discover(directory)?;
        let mut loaded = LoadedSchemas::default();

        for path in files {
            let policy = self.policies.policy_for(&path);
            debug!(path = %path.display(), %policy, "Loading schema file");

            match policy {
                LoadPolicy::Default => loaded.sources.push(SchemaSource::Path(path)),
                LoadPolicy::DtdDisabledTolerant => match self.load_tolerant(&path) {
                    Ok(source) => loaded.sources.push(source),
                    Err(skipped) => {
                        warn!(
                            path = %skipped.path.display(),
                            reason = %skipped.reason,
                            "Skipping unreadable schema file"
                        );
                        loaded.skipped.push(skipped);
                    }
                },
            }
        }

        info!(
            directory = %directory.display(),
            loaded = loaded.sources.len(),
            skipped = loaded.skipped.len(),
            "Loaded schema directory"
        );
        Ok(loaded)
    }

    fn load_tolerant(&self, path: &Path) -> std::result::Result<SchemaSource, SkippedSchema> {
        let skipped = |reason: String| SkippedSchema {
            path: path.to_path_buf(),
            reason,
        };

        let document = self
            .libxml2
            .read_document_hardened(path)
            .map_err(|e| skipped(e.to_string()))?;

        let header = SchemaHeader::read(path).map_err(|e| match e {
            ValidationError::SchemaFileUnreadable { reason, .. } => skipped(reason),
            other => skipped(other.to_string()),
        })?;

        Ok(SchemaSource::Parsed {
            path: path.to_path_buf(),
            document,
            header,
        })
    }
}

impl Default for SchemaFileLoader {
    fn default() -> Self {
        Self::new(LoadPolicySet::default())
    }
}
