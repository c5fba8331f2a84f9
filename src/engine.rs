//! Wiring of the pipeline: case → schema bundle → validation → report.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::{BundleCache, BundleKey};
use crate::cases::{CaseKey, CaseTable, ConformanceCase, DocumentKind};
use crate::compiler::{CompileStrictness, SchemaBundle, SchemaSetCompiler};
use crate::config::{Config, ConfigManager};
use crate::diagnostics::{DiagnosticFormatter, DiagnosticReport, SourceLineIndex};
use crate::error::{Result, ValidationError};
use crate::schema_loader::SchemaFileLoader;
use crate::validator::StreamingValidator;

/// Renders the business document for a case as XML.
///
/// This is the seam to the invoice model and its serializers, which live
/// outside this crate.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentProducer: Send + Sync {
    fn produce(&self, key: &CaseKey, kind: DocumentKind) -> anyhow::Result<Vec<u8>>;
}

impl<F> DocumentProducer for F
where
    F: Fn(&CaseKey, DocumentKind) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn produce(&self, key: &CaseKey, kind: DocumentKind) -> anyhow::Result<Vec<u8>> {
        self(key, kind)
    }
}

/// Result of checking one case
#[derive(Debug)]
pub struct CaseOutcome {
    pub case: ConformanceCase,
    pub result: Result<DiagnosticReport>,
    pub duration: Duration,
}

impl CaseOutcome {
    /// A case passes when its document produced no report entries.
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(report) if report.is_conformant())
    }

    /// The rendered report or error, `None` when the case passed.
    pub fn failure_message(&self) -> Option<String> {
        match &self.result {
            Ok(report) if report.is_conformant() => None,
            Ok(report) => Some(report.render()),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Checks documents against the schema bundle for their case.
pub struct ConformanceEngine {
    cache: Arc<BundleCache>,
    loader: SchemaFileLoader,
    strictness: CompileStrictness,
    validator: StreamingValidator,
    formatter: DiagnosticFormatter,
    cases: CaseTable,
    threads: Option<usize>,
}

impl ConformanceEngine {
    /// Build an engine from configuration with a private bundle cache.
    pub fn new(config: &Config) -> Result<Self> {
        ConfigManager::validate_config(config)?;

        let loader = SchemaFileLoader::new(ConfigManager::policy_set(config))
            .with_discovery(ConfigManager::discovery(config)?);

        Ok(Self {
            cache: Arc::new(BundleCache::new(config.schemas.cache_capacity)),
            loader,
            strictness: config.schemas.strictness,
            validator: StreamingValidator::new(config.validation),
            formatter: ConfigManager::formatter(config),
            cases: ConfigManager::case_table(config),
            threads: config.cases.threads,
        })
    }

    /// Share a bundle cache, such as `BundleCache::global()`, across engines.
    pub fn with_cache(mut self, cache: Arc<BundleCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cases(mut self, cases: CaseTable) -> Self {
        self.cases = cases;
        self
    }

    pub fn cache(&self) -> &Arc<BundleCache> {
        &self.cache
    }

    pub fn cases(&self) -> &CaseTable {
        &self.cases
    }

    /// The compiled bundle for `schema_dir`, compiled on first use.
    pub fn bundle(&self, schema_dir: &Path) -> Result<Arc<SchemaBundle>> {
        let key = BundleKey::new(schema_dir, self.loader.policies().clone(), self.strictness);

        self.cache.get_or_compile(key, || {
            let loaded = self.loader.load(schema_dir)?;
            SchemaSetCompiler::new(self.strictness).compile(schema_dir, loaded)
        })
    }

    /// Validate one document against the bundle in `schema_dir`.
    ///
    /// Validation consumes the stream; it is then rewound to where it
    /// started to build the source context of the report.
    pub fn validate_document<S>(&self, schema_dir: &Path, stream: &mut S) -> Result<DiagnosticReport>
    where
        S: Read + Seek + ?Sized,
    {
        let bundle = self.bundle(schema_dir)?;
        let start = stream.stream_position()?;

        let events = self.validator.validate(&bundle, stream)?;
        if events.is_empty() {
            return Ok(DiagnosticReport::default());
        }

        stream.seek(SeekFrom::Start(start))?;
        let mut text = Vec::new();
        stream.read_to_end(&mut text)?;
        let source = SourceLineIndex::from_bytes(&text);

        debug!(
            schema_dir = %schema_dir.display(),
            events = events.len(),
            lines = source.len(),
            "Formatting diagnostics"
        );
        Ok(self.formatter.format(&events, &source))
    }

    /// Produce the document for `key` and validate it.
    pub fn check(
        &self,
        key: &CaseKey,
        kind: DocumentKind,
        producer: &dyn DocumentProducer,
    ) -> Result<DiagnosticReport> {
        let schema_dir = self.cases.resolve(key)?;
        let case = ConformanceCase {
            key: *key,
            kind,
            schema_dir,
        };
        self.run_case(&case, producer)
    }

    pub fn check_case(&self, case: &ConformanceCase, producer: &dyn DocumentProducer) -> CaseOutcome {
        let started = Instant::now();
        let result = self.run_case(case, producer);
        let duration = started.elapsed();

        match &result {
            Ok(report) => info!(
                case = %case,
                passed = report.is_conformant(),
                entries = report.len(),
                duration_ms = duration.as_millis() as u64,
                "Checked case"
            ),
            Err(e) => warn!(case = %case, error = %e, "Case could not be checked"),
        }

        CaseOutcome {
            case: case.clone(),
            result,
            duration,
        }
    }

    /// Check every case in the table in parallel. Outcomes keep table order.
    pub fn check_cases(&self, producer: &dyn DocumentProducer) -> Vec<CaseOutcome> {
        let cases = self.cases.cases();
        let run = || -> Vec<CaseOutcome> {
            cases
                .par_iter()
                .map(|case| self.check_case(case, producer))
                .collect()
        };

        let outcomes = match self.threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    warn!(error = %e, "Falling back to the global thread pool");
                    run()
                }
            },
            None => run(),
        };

        let passed = outcomes.iter().filter(|o| o.passed()).count();
        info!(total = outcomes.len(), passed, "Checked case table");
        outcomes
    }

    fn run_case(&self, case: &ConformanceCase, producer: &dyn DocumentProducer) -> Result<DiagnosticReport> {
        let bytes = producer
            .produce(&case.key, case.kind)
            .map_err(ValidationError::DocumentProduction)?;

        let mut stream = Cursor::new(bytes);
        self.validate_document(&case.schema_dir, &mut stream)
    }
}
