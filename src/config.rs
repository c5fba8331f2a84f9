use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::cache::DEFAULT_MAX_BUNDLES;
use crate::cases::{CaseEntry, CaseTable, normalize_path};
use crate::compiler::CompileStrictness;
use crate::diagnostics::{DEFAULT_CONTEXT_LINES, DEFAULT_WRAP_WIDTH, DiagnosticFormatter};
use crate::discovery::SchemaDiscovery;
use crate::schema_loader::{LEGACY_XMLDSIG_SCHEMA, LoadPolicy, LoadPolicySet, PolicyRule};
use crate::validator::ValidationOptions;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "EINVOICE_XSD_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub schemas: SchemaConfig,
    pub validation: ValidationOptions,
    pub report: ReportConfig,
    pub cases: CasesConfig,
}

/// Schema loading and compilation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Escalate unresolved schema references to errors
    pub strictness: CompileStrictness,
    /// Per-file load policy exceptions
    pub policy_rules: Vec<PolicyRule>,
    /// Schema files to ignore (glob syntax)
    pub exclude_patterns: Vec<String>,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    /// Compiled bundles kept in memory
    pub cache_capacity: u64,
}

/// Report formatting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub wrap_width: usize,
    pub context_lines: usize,
}

/// The case table and how it is run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CasesConfig {
    /// Root that case schema directories are relative to
    pub documentation_root: PathBuf,
    /// Start from the built-in table
    pub include_builtin: bool,
    /// Added to, or replacing, built-in entries
    pub entries: Vec<CaseEntry>,
    /// Worker threads for batch checks (None = rayon default)
    pub threads: Option<usize>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            strictness: CompileStrictness::Lenient,
            policy_rules: vec![PolicyRule::new(
                LEGACY_XMLDSIG_SCHEMA,
                LoadPolicy::DtdDisabledTolerant,
            )],
            exclude_patterns: Vec::new(),
            max_depth: None,
            follow_symlinks: false,
            cache_capacity: DEFAULT_MAX_BUNDLES,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

impl Default for CasesConfig {
    fn default() -> Self {
        Self {
            documentation_root: PathBuf::from("documentation"),
            include_builtin: true,
            entries: Vec::new(),
            threads: None,
        }
    }
}

/// Configuration manager for loading configuration files and overrides
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment. Without an
    /// explicit path the standard locations are searched.
    pub fn load_config(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::find_config_file()?.unwrap_or_default(),
        };

        let config = Self::apply_environment_overrides(config)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "einvoice-xsd.toml",
            "einvoice-xsd.json",
            ".einvoice-xsd.toml",
            ".einvoice-xsd.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("einvoice-xsd");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Schema settings
        if let Some(strictness) = env_var(env, "STRICTNESS") {
            config.schemas.strictness = match strictness.to_lowercase().as_str() {
                "lenient" => CompileStrictness::Lenient,
                "strict" => CompileStrictness::Strict,
                _ => return Err(invalid_env("STRICTNESS", &strictness)),
            };
        }
        if let Some(patterns) = env_var(env, "EXCLUDE") {
            config.schemas.exclude_patterns = split_list(&patterns);
        }
        if let Some(capacity) = parse_env(env, "CACHE_CAPACITY")? {
            config.schemas.cache_capacity = capacity;
        }

        // Validation settings
        if let Some(value) = parse_env(env, "INLINE_SCHEMA")? {
            config.validation.process_inline_schema = value;
        }
        if let Some(value) = parse_env(env, "SCHEMA_LOCATION")? {
            config.validation.process_schema_location = value;
        }
        if let Some(value) = parse_env(env, "IDENTITY_CONSTRAINTS")? {
            config.validation.process_identity_constraints = value;
        }
        if let Some(value) = parse_env(env, "REPORT_WARNINGS")? {
            config.validation.report_warnings = value;
        }

        // Report settings
        if let Some(width) = parse_env(env, "WRAP_WIDTH")? {
            config.report.wrap_width = width;
        }
        if let Some(lines) = parse_env(env, "CONTEXT_LINES")? {
            config.report.context_lines = lines;
        }

        // Case settings
        if let Some(root) = env_var(env, "DOCS_ROOT") {
            config.cases.documentation_root = normalize_path(&root);
        }
        if let Some(threads) = parse_env(env, "THREADS")? {
            config.cases.threads = Some(threads);
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.schemas.cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }

        for rule in &config.schemas.policy_rules {
            if rule.suffix.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Policy rule suffix cannot be empty".to_string(),
                ));
            }
        }

        for pattern in &config.schemas.exclude_patterns {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }

        if config.report.wrap_width < 20 {
            return Err(ConfigError::Validation(
                "Wrap width must be at least 20".to_string(),
            ));
        }

        if config.report.context_lines > 100 {
            return Err(ConfigError::Validation(
                "Context lines cannot exceed 100".to_string(),
            ));
        }

        if let Some(threads) = config.cases.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        for entry in &config.cases.entries {
            if entry.schema_dir.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Case {} has an empty schema directory",
                    entry.key
                )));
            }
            if entry.kinds.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Case {} lists no document kinds",
                    entry.key
                )));
            }
        }

        Ok(())
    }

    /// Get the effective load policies
    pub fn policy_set(config: &Config) -> LoadPolicySet {
        LoadPolicySet::from_rules(config.schemas.policy_rules.clone())
    }

    /// Build schema discovery from the schema settings
    pub fn discovery(config: &Config) -> crate::error::Result<SchemaDiscovery> {
        SchemaDiscovery::new()
            .with_max_depth(config.schemas.max_depth)
            .with_follow_symlinks(config.schemas.follow_symlinks)
            .with_exclude_patterns(&config.schemas.exclude_patterns)
    }

    /// Get the effective report formatter
    pub fn formatter(config: &Config) -> DiagnosticFormatter {
        DiagnosticFormatter::new()
            .with_wrap_width(config.report.wrap_width)
            .with_context_lines(config.report.context_lines)
    }

    /// Get the effective case table: the built-in table (if enabled) with
    /// configured entries layered on top
    pub fn case_table(config: &Config) -> CaseTable {
        let root = normalize_path(&config.cases.documentation_root.to_string_lossy());
        let mut table = if config.cases.include_builtin {
            CaseTable::builtin(&root)
        } else {
            CaseTable::new(&root, Vec::new())
        };

        for entry in &config.cases.entries {
            table.insert(entry.clone());
        }
        table
    }
}

fn env_var(env: &impl EnvProvider, name: &str) -> Option<String> {
    env.get(&format!("{}{}", ENV_PREFIX, name))
}

fn parse_env<T: FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    env_var(env, name)
        .map(|value| value.trim().parse().map_err(|_| invalid_env(name, &value)))
        .transpose()
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::Environment(format!("Invalid {}{} value: {}", ENV_PREFIX, name, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
