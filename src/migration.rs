use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::{
    document::Document,
    migration_log::MigrationLog,
    rule_catalog::RuleCatalog,
    schema_version::SchemaVersion,
    transformation_engine::{SchemaTransformationEngine, TransformationError},
    transformation_rule::AppliedTransformation,
    version_detector::{Detection, VersionDetector},
};

/// Extension used when the input file name has none.
pub const DEFAULT_EXTENSION: &str = "grc";

/// Runs detection, target resolution and transformation for one document.
pub struct Migrator<'a> {
    catalog: &'a RuleCatalog,
}

/// Everything a caller needs after a successful migration
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub document: Document,
    pub output_path: PathBuf,
    pub detection: Detection,
    pub upgrade_targets: Vec<SchemaVersion>,
    pub target_version: SchemaVersion,
    pub applied_transformations: Vec<AppliedTransformation>,
    pub log: MigrationLog,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("No input file selected")]
    NoInputSelected,

    #[error("Target version {0} is not in the rule catalog")]
    InvalidTarget(SchemaVersion),

    #[error("Conversion failed: {0}")]
    Transformation(#[from] TransformationError),
}

/// A failed migration and the log lines produced before it failed.
#[derive(Debug)]
pub struct MigrationFailure {
    pub error: MigrationError,
    pub log: MigrationLog,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for MigrationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<'a> Migrator<'a> {
    pub fn new(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve the target version, failing if the catalog does not know it.
    ///
    /// Without a request the catalog default is used.
    pub fn resolve_target(
        &self,
        requested: Option<&SchemaVersion>,
    ) -> Result<SchemaVersion, MigrationError> {
        match requested {
            Some(version) if self.catalog.contains_version(version) => Ok(version.clone()),
            Some(version) => Err(MigrationError::InvalidTarget(version.clone())),
            None => Ok(self.catalog.default_target().clone()),
        }
    }

    /// Migrate `document`, read from `input_path`, to `requested_target`.
    ///
    /// Preconditions are checked before any work. If the transformation fails
    /// the document is dropped and the partial log is returned with the error.
    pub fn migrate(
        &self,
        input_path: &Path,
        mut document: Document,
        requested_target: Option<&SchemaVersion>,
    ) -> Result<MigrationOutcome, MigrationFailure> {
        let mut log = MigrationLog::new();

        if input_path.as_os_str().is_empty() {
            return Err(MigrationFailure {
                error: MigrationError::NoInputSelected,
                log,
            });
        }
        let target_version = match self.resolve_target(requested_target) {
            Ok(version) => version,
            Err(error) => return Err(MigrationFailure { error, log }),
        };

        let detection = VersionDetector::new(self.catalog).detect(&document);
        log.extend(detection.evidence.iter().cloned());
        log.push(format!("Source version: {}", detection.version));

        let upgrade_targets = self.catalog.upgrade_targets(&detection.version);
        if upgrade_targets.is_empty() {
            log.push("No newer catalog versions available");
        } else {
            let labels: Vec<&str> = upgrade_targets.iter().map(SchemaVersion::as_str).collect();
            log.push(format!("Available target versions: {}", labels.join(", ")));
        }
        log.push(format!("Converting to version {}", target_version));

        tracing::info!(
            input = %input_path.display(),
            source = %detection.version,
            target = %target_version,
            "starting migration"
        );

        let engine = SchemaTransformationEngine::new(self.catalog);
        let result = match engine.transform(&mut document, &target_version, &mut log) {
            Ok(result) => result,
            Err(e) => {
                log.push(format!("Error during conversion: {}", e));
                tracing::error!("migration of {} failed: {}", input_path.display(), e);
                return Err(MigrationFailure {
                    error: e.into(),
                    log,
                });
            }
        };

        let output_path = output_path_for(input_path, &target_version);
        log.push("Conversion completed successfully!");
        log.push(format!("Output file: {}", output_path.display()));

        Ok(MigrationOutcome {
            document,
            output_path,
            detection,
            upgrade_targets,
            target_version,
            applied_transformations: result.applied_transformations,
            log,
        })
    }
}

/// `<dir>/<stem>_converted_<target>.<ext>` for an input `<dir>/<stem>.<ext>`.
///
/// The name is assembled as a string because the target label itself
/// contains a dot that `Path::with_extension` would treat as an extension.
pub fn output_path_for(input_path: &Path, target_version: &SchemaVersion) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = input_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let file_name = format!("{}_converted_{}.{}", stem, target_version, extension);
    match input_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}
