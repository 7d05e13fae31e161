// GNU Radio Companion flow-graph upgrade engine
pub mod schema_version;
pub mod transformation_rule;
pub mod rule_catalog;
pub mod document;
pub mod migration_log;
pub mod version_detector;
pub mod transformation_engine;
pub mod migration;
pub mod reporter;

// Re-export core types for convenience
pub use schema_version::{DetectedVersion, SchemaVersion};
pub use transformation_rule::{AppliedTransformation, ParameterRule, TransformationType, ValueSubstitution};
pub use rule_catalog::{ParameterRuleSet, RuleCatalog};
pub use document::{Document, DocumentError, Element, Node};
pub use migration_log::MigrationLog;
pub use version_detector::{Detection, VersionDetector};
pub use transformation_engine::{SchemaTransformationEngine, TransformationError, TransformationResult};
pub use migration::{output_path_for, MigrationError, MigrationFailure, MigrationOutcome, Migrator};
pub use reporter::{ReportFormat, TransformationReport, TransformationReporter};
