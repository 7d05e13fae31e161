use crate::{
    document::Document,
    rule_catalog::RuleCatalog,
    schema_version::{DetectedVersion, SchemaVersion},
};
use std::collections::BTreeMap;

/// Root attribute written by the flow-graph editor that produced the document.
pub const CREATED_MARKER_ATTRIBUTE: &str = "created";

/// Infers the schema version a flow-graph document was written for.
pub struct VersionDetector<'a> {
    catalog: &'a RuleCatalog,
}

/// Detection result together with the evidence behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub version: DetectedVersion,
    /// Every indicator match, one entry per matching prefix per block.
    pub candidates: Vec<SchemaVersion>,
    pub evidence: Vec<String>,
}

impl<'a> VersionDetector<'a> {
    pub fn new(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    /// Parse `source` and detect its version. Unparseable input is a detection failure.
    pub fn detect_source(&self, source: &str) -> Detection {
        match Document::parse(source) {
            Ok(document) => self.detect(&document),
            Err(e) => Self::failed(e.to_string()),
        }
    }

    /// Detect the version of a parsed document.
    ///
    /// An explicit creation marker wins outright. Otherwise every block key is
    /// matched against the indicator prefixes and the smallest label (string
    /// order) among all matches is chosen.
    pub fn detect(&self, document: &Document) -> Detection {
        let mut evidence = Vec::new();

        if let Some(marker) = document
            .root
            .attribute(CREATED_MARKER_ATTRIBUTE)
            .filter(|m| !m.is_empty())
        {
            evidence.push(format!("GRC format version found: {}", marker));
            match SchemaVersion::from_marker(marker) {
                Ok(version) => {
                    return Detection {
                        version: DetectedVersion::Known(version),
                        candidates: Vec::new(),
                        evidence,
                    };
                }
                Err(e) => {
                    tracing::debug!("ignoring creation marker: {}", e);
                    evidence.push(format!(
                        "Ignoring malformed version marker {:?}, checking block types",
                        marker
                    ));
                }
            }
        }

        let mut candidates = Vec::new();
        for block in document.root.descendants_named("block") {
            let Some(key) = block.child_text("key") else {
                continue;
            };
            let Some(block_key) = key else {
                let mut failed = Self::failed("block key element has no text".to_string());
                evidence.append(&mut failed.evidence);
                return Detection { evidence, ..failed };
            };

            for indicator in self.catalog.indicator_matches(&block_key) {
                tracing::trace!(block = %block_key, prefix = %indicator.prefix, "indicator match");
                candidates.push(indicator.version.clone());
            }
        }

        let Some(oldest) = candidates.iter().min().cloned() else {
            evidence.push("Could not detect version automatically".to_string());
            return Detection {
                version: DetectedVersion::Undetermined,
                candidates,
                evidence,
            };
        };

        let mut tally: BTreeMap<&SchemaVersion, usize> = BTreeMap::new();
        for candidate in &candidates {
            *tally.entry(candidate).or_default() += 1;
        }
        let summary: Vec<String> = tally
            .iter()
            .map(|(version, count)| format!("{} x{}", version, count))
            .collect();
        evidence.push(format!("Block type indicators: {}", summary.join(", ")));
        evidence.push(format!("Detected version {} based on block types", oldest));

        Detection {
            version: DetectedVersion::Known(oldest),
            candidates,
            evidence,
        }
    }

    fn failed(reason: String) -> Detection {
        Detection {
            evidence: vec![format!("Error detecting version: {}", reason)],
            version: DetectedVersion::DetectionFailed { reason },
            candidates: Vec::new(),
        }
    }
}
