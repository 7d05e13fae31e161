use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::{
    migration::MigrationOutcome,
    rule_catalog::RuleCatalog,
    schema_version::SchemaVersion,
    transformation_rule::{AppliedTransformation, TransformationType},
    version_detector::Detection,
};

/// Reporter for generating transformation reports in various formats
pub struct TransformationReporter {
    output_format: ReportFormat,
}

/// Available output formats for transformation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

/// Comprehensive transformation report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationReport {
    /// Detected source version label, or `Unknown`/`Error`.
    pub source_version: String,
    pub version_details: String,
    pub upgrade_targets: Vec<SchemaVersion>,
    pub target_version: Option<SchemaVersion>,
    pub output_file: Option<String>,
    pub applied_transformations: Vec<AppliedTransformation>,
    pub transformation_summary: TransformationSummary,
    pub log: Vec<String>,
}

/// Summary of transformation results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationSummary {
    pub total_transformations: usize,
    pub blocks_renamed: usize,
    pub parameters_renamed: usize,
    pub values_substituted: usize,
    pub parameters_removed: usize,
    pub options_updated: usize,
}

impl TransformationReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Report for a completed migration
    pub fn generate_report(&self, catalog: &RuleCatalog, outcome: &MigrationOutcome) -> TransformationReport {
        TransformationReport {
            source_version: outcome.detection.version.to_string(),
            version_details: catalog.describe(&outcome.detection.version).to_string(),
            upgrade_targets: outcome.upgrade_targets.clone(),
            target_version: Some(outcome.target_version.clone()),
            output_file: Some(outcome.output_path.display().to_string()),
            applied_transformations: outcome.applied_transformations.clone(),
            transformation_summary: self.create_transformation_summary(&outcome.applied_transformations),
            log: outcome.log.lines().to_vec(),
        }
    }

    /// Report for a detection-only run: no target, no changes.
    pub fn generate_detection_report(&self, catalog: &RuleCatalog, detection: &Detection) -> TransformationReport {
        TransformationReport {
            source_version: detection.version.to_string(),
            version_details: catalog.describe(&detection.version).to_string(),
            upgrade_targets: catalog.upgrade_targets(&detection.version),
            target_version: None,
            output_file: None,
            applied_transformations: Vec::new(),
            transformation_summary: TransformationSummary::default(),
            log: detection.evidence.clone(),
        }
    }

    /// Format the report according to the configured output format
    pub fn format_report(&self, report: &TransformationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => self.format_console_report(report),
            ReportFormat::Json => self.format_json_report(report),
            ReportFormat::Yaml => self.format_yaml_report(report),
        }
    }

    /// Create transformation summary from applied transformations
    fn create_transformation_summary(&self, transformations: &[AppliedTransformation]) -> TransformationSummary {
        let mut summary = TransformationSummary {
            total_transformations: transformations.len(),
            ..TransformationSummary::default()
        };

        for transformation in transformations {
            match transformation.transformation_type {
                TransformationType::RenameBlock => summary.blocks_renamed += 1,
                TransformationType::RenameParameter => summary.parameters_renamed += 1,
                TransformationType::SubstituteValue => summary.values_substituted += 1,
                TransformationType::RemoveParameter => summary.parameters_removed += 1,
                TransformationType::UpdateGenerateOptions => summary.options_updated += 1,
            }
        }

        summary
    }

    /// Format report for console output
    fn format_console_report(&self, report: &TransformationReport) -> Result<String, ReportError> {
        let mut output = String::new();

        for line in &report.log {
            output.push_str(line);
            output.push('\n');
        }

        output.push_str("\n=== Flow Graph Conversion Report ===\n\n");
        output.push_str(&format!("Source Version: {}\n", report.source_version));
        for line in report.version_details.lines() {
            output.push_str(&format!("  {}\n", line));
        }

        match &report.target_version {
            Some(target) => output.push_str(&format!("Target Version: {}\n", target)),
            None => {
                let targets: Vec<&str> = report.upgrade_targets.iter().map(SchemaVersion::as_str).collect();
                output.push_str(&format!("Available Targets: {}\n", targets.join(", ")));
            }
        }

        if report.target_version.is_some() {
            let summary = &report.transformation_summary;
            output.push_str(&format!("\nTransformations Applied: {}\n", summary.total_transformations));
            output.push_str(&format!("  • Blocks renamed: {}\n", summary.blocks_renamed));
            output.push_str(&format!("  • Parameters renamed: {}\n", summary.parameters_renamed));
            output.push_str(&format!("  • Values substituted: {}\n", summary.values_substituted));
            output.push_str(&format!("  • Parameters removed: {}\n", summary.parameters_removed));
            output.push_str(&format!("  • GUI options updated: {}\n", summary.options_updated));
        }

        if let Some(output_file) = &report.output_file {
            output.push_str(&format!("\n  ✓ Output file: {}\n", output_file));
        }

        Ok(output)
    }

    /// Format report as JSON
    fn format_json_report(&self, report: &TransformationReport) -> Result<String, ReportError> {
        serde_json::to_string_pretty(report)
            .map_err(|e| ReportError::SerializationError(e.to_string()))
    }

    /// Format report as YAML
    fn format_yaml_report(&self, report: &TransformationReport) -> Result<String, ReportError> {
        serde_yaml::to_string(report)
            .map_err(|e| ReportError::SerializationError(e.to_string()))
    }
}

impl Default for TransformationReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown report format '{0}' (expected console, json or yaml)")]
    UnknownFormat(String),
}
