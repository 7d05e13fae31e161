use std::collections::BTreeMap;
use thiserror::Error;
use crate::{
    schema_version::{DetectedVersion, SchemaVersion},
    transformation_rule::ParameterRule,
};

/// Parameter rules for one block, keyed by the parameter's original key.
pub type ParameterRuleSet = BTreeMap<String, ParameterRule>;

/// Versioned lookup tables that drive detection and transformation.
///
/// Lookups never fail: unknown block keys resolve to themselves and unknown
/// blocks or parameters simply have no rule.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    block_renames: BTreeMap<String, String>,
    parameter_rules: BTreeMap<String, ParameterRuleSet>,
    version_indicators: Vec<VersionIndicator>,
    versions: Vec<VersionInfo>,
    legacy_baseline: SchemaVersion,
    default_target: SchemaVersion,
}

/// Block key prefix that hints at the schema version a document was written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIndicator {
    pub prefix: String,
    pub version: SchemaVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: SchemaVersion,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Block key cannot be empty")]
    EmptyBlockKey,

    #[error("Parameter key cannot be empty for block {0}")]
    EmptyParameterKey(String),

    #[error("Rule for {0}.{1} renames to an empty key")]
    EmptyRenameTarget(String, String),

    #[error("Version indicator prefix cannot be empty")]
    EmptyIndicatorPrefix,
}

const UNDETERMINED_DESCRIPTION: &str =
    "Version could not be detected\nPlease check the file manually";
const FAILED_DESCRIPTION: &str =
    "Error occurred while detecting version\nPlease check if the file is a valid GRC file";
const MISSING_DESCRIPTION: &str = "Version information not available";

impl RuleCatalog {
    /// An empty catalog. Every block passes through unchanged.
    pub fn new(legacy_baseline: SchemaVersion, default_target: SchemaVersion) -> Self {
        Self {
            block_renames: BTreeMap::new(),
            parameter_rules: BTreeMap::new(),
            version_indicators: Vec::new(),
            versions: Vec::new(),
            legacy_baseline,
            default_target,
        }
    }

    /// The built-in GNU Radio 3.7 (WX GUI) to 3.8+ (Qt GUI) tables.
    pub fn standard() -> Self {
        let v37 = SchemaVersion::new(3, 7);
        let v38 = SchemaVersion::new(3, 8);
        let v39 = SchemaVersion::new(3, 9);
        let v310 = SchemaVersion::new(3, 10);

        let mut catalog = Self::new(v37.clone(), v310.clone());

        for (old, new) in [
            ("wxgui_fftsink2", "qtgui_freq_sink_x"),
            ("wxgui_waterfallsink2", "qtgui_waterfall_sink_x"),
            ("wxgui_scopesink2", "qtgui_time_sink_x"),
            ("wxgui_constellationsink2", "qtgui_const_sink_x"),
            ("gr_throttle", "blocks_throttle"),
            ("gr_file_source", "blocks_file_source"),
            ("gr_file_sink", "blocks_file_sink"),
            ("gr_complex_to_float", "blocks_complex_to_float"),
            ("gr_float_to_complex", "blocks_float_to_complex"),
            ("variable_slider", "variable_qtgui_range"),
            ("osmosdr_source", "soapy_rtlsdr_source"),
            ("blks2_selector", "blocks_selector"),
            ("gr_multiply_xx", "blocks_multiply_xx"),
            ("gr_add_xx", "blocks_add_xx"),
        ] {
            catalog.block_renames.insert(old.to_string(), new.to_string());
        }

        catalog.insert_parameter_rules(
            "variable_qtgui_range",
            [
                ("style", ParameterRule::substitute("wx.SL_HORIZONTAL", "QtCore.Qt.Horizontal")),
                ("grid_pos", ParameterRule::rename("gui_hint")),
                ("notebook", ParameterRule::remove()),
            ],
        );
        catalog.insert_parameter_rules(
            "qtgui_freq_sink_x",
            [
                ("baseband_freq", ParameterRule::rename("center_freq")),
                ("y_per_div", ParameterRule::rename("y_per_div").with_note("Now in dB")),
                ("ref_level", ParameterRule::rename("ref_level").with_note("Now in dB")),
            ],
        );

        for (prefix, version) in [
            ("wxgui_", &v37),
            ("gr_", &v37),
            ("blks2_", &v37),
            ("qtgui_", &v38),
            ("blocks_", &v38),
            ("soapy_", &v310),
            ("pdu_", &v39),
        ] {
            catalog.version_indicators.push(VersionIndicator {
                prefix: prefix.to_string(),
                version: version.clone(),
            });
        }

        for (version, description) in [
            (v37, "Legacy version with WX GUI\n- Uses old block names (gr_, blks2_)\n- WX GUI components\n- Python 2 compatibility"),
            (v38, "Transition version\n- Introduces Qt GUI\n- Removes XMLRPC\n- Python 3 required"),
            (v39, "Modern version\n- SWIG replaced with Pybind11\n- Improved naming consistency\n- Better type handling"),
            (v310, "Latest stable version\n- Enhanced Qt GUI\n- Improved error messages\n- Modern parameter names"),
        ] {
            catalog.versions.push(VersionInfo {
                version,
                description: description.to_string(),
            });
        }

        catalog
    }

    /// Add a block rename. An existing mapping for `old_key` is replaced.
    pub fn add_block_rename(&mut self, old_key: &str, new_key: &str) -> Result<(), CatalogError> {
        if old_key.is_empty() || new_key.is_empty() {
            return Err(CatalogError::EmptyBlockKey);
        }
        self.block_renames.insert(old_key.to_string(), new_key.to_string());
        Ok(())
    }

    /// Register parameter rules for blocks whose (renamed) key is `block_key`.
    pub fn add_parameter_rules(
        &mut self,
        block_key: &str,
        rules: ParameterRuleSet,
    ) -> Result<(), CatalogError> {
        self.validate_rules(block_key, &rules)?;
        self.parameter_rules
            .entry(block_key.to_string())
            .or_default()
            .extend(rules);
        Ok(())
    }

    pub fn add_version_indicator(
        &mut self,
        prefix: &str,
        version: SchemaVersion,
    ) -> Result<(), CatalogError> {
        if prefix.is_empty() {
            return Err(CatalogError::EmptyIndicatorPrefix);
        }
        self.version_indicators.push(VersionIndicator {
            prefix: prefix.to_string(),
            version,
        });
        Ok(())
    }

    pub fn add_version(&mut self, version: SchemaVersion, description: &str) {
        match self.versions.iter_mut().find(|info| info.version == version) {
            Some(info) => info.description = description.to_string(),
            None => self.versions.push(VersionInfo {
                version,
                description: description.to_string(),
            }),
        }
    }

    /// New block key for `key`, or `key` itself when no rename is registered.
    pub fn resolve_block_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.block_renames.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Parameter rules for a block, looked up by its new key.
    pub fn parameter_rules(&self, block_key: &str) -> Option<&ParameterRuleSet> {
        self.parameter_rules.get(block_key)
    }

    /// Every indicator whose prefix starts `block_key`, in declaration order.
    pub fn indicator_matches<'a>(
        &'a self,
        block_key: &'a str,
    ) -> impl Iterator<Item = &'a VersionIndicator> + 'a {
        self.version_indicators
            .iter()
            .filter(move |indicator| block_key.starts_with(indicator.prefix.as_str()))
    }

    /// Human-readable notes for a detection result.
    pub fn describe(&self, detected: &DetectedVersion) -> &str {
        match detected {
            DetectedVersion::Known(version) => self
                .versions
                .iter()
                .find(|info| &info.version == version)
                .map(|info| info.description.as_str())
                .unwrap_or(MISSING_DESCRIPTION),
            DetectedVersion::Undetermined => UNDETERMINED_DESCRIPTION,
            DetectedVersion::DetectionFailed { .. } => FAILED_DESCRIPTION,
        }
    }

    /// Known versions in declaration order.
    pub fn available_versions(&self) -> Vec<SchemaVersion> {
        self.versions.iter().map(|info| info.version.clone()).collect()
    }

    pub fn contains_version(&self, version: &SchemaVersion) -> bool {
        self.versions.iter().any(|info| &info.version == version)
    }

    pub fn default_target(&self) -> &SchemaVersion {
        &self.default_target
    }

    /// Versions a document can be upgraded to, compared as label strings.
    ///
    /// Without a detected version the legacy baseline stands in for the source.
    pub fn upgrade_targets(&self, detected: &DetectedVersion) -> Vec<SchemaVersion> {
        let source = detected.known().unwrap_or(&self.legacy_baseline);
        self.versions
            .iter()
            .filter(|info| &info.version > source)
            .map(|info| info.version.clone())
            .collect()
    }

    fn insert_parameter_rules<const N: usize>(
        &mut self,
        block_key: &str,
        rules: [(&str, ParameterRule); N],
    ) {
        let set = self.parameter_rules.entry(block_key.to_string()).or_default();
        for (param_key, rule) in rules {
            set.insert(param_key.to_string(), rule);
        }
    }

    fn validate_rules(&self, block_key: &str, rules: &ParameterRuleSet) -> Result<(), CatalogError> {
        if block_key.is_empty() {
            return Err(CatalogError::EmptyBlockKey);
        }

        for (param_key, rule) in rules {
            if param_key.is_empty() {
                return Err(CatalogError::EmptyParameterKey(block_key.to_string()));
            }

            if rule.rename_to.as_deref() == Some("") {
                return Err(CatalogError::EmptyRenameTarget(
                    block_key.to_string(),
                    param_key.clone(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_block_key_falls_back_to_identity() {
        let catalog = RuleCatalog::standard();
        assert_eq!(catalog.resolve_block_key("wxgui_fftsink2"), "qtgui_freq_sink_x");
        assert_eq!(catalog.resolve_block_key("variable_slider"), "variable_qtgui_range");
        assert_eq!(catalog.resolve_block_key("analog_sig_source_x"), "analog_sig_source_x");
        assert_eq!(catalog.resolve_block_key("qtgui_freq_sink_x"), "qtgui_freq_sink_x");
    }

    #[test]
    fn test_parameter_rules_keyed_by_new_block_key() {
        let catalog = RuleCatalog::standard();
        let rules = catalog.parameter_rules("variable_qtgui_range").unwrap();
        assert!(rules["notebook"].remove);
        assert_eq!(rules["grid_pos"].rename_to.as_deref(), Some("gui_hint"));

        assert!(catalog.parameter_rules("variable_slider").is_none());
        assert!(catalog.parameter_rules("blocks_throttle").is_none());
    }

    #[test]
    fn test_indicator_matches_collects_every_prefix() {
        let mut catalog = RuleCatalog::standard();
        catalog
            .add_version_indicator("gr_file", SchemaVersion::new(3, 6))
            .unwrap();

        let matches: Vec<_> = catalog
            .indicator_matches("gr_file_source")
            .map(|indicator| indicator.version.to_string())
            .collect();
        assert_eq!(matches, vec!["3.7", "3.6"]);

        assert_eq!(catalog.indicator_matches("analog_noise_source_x").count(), 0);
    }

    #[test]
    fn test_describe_covers_every_detectable_label() {
        let catalog = RuleCatalog::standard();
        for indicator in &catalog.version_indicators {
            let description = catalog.describe(&DetectedVersion::Known(indicator.version.clone()));
            assert_ne!(description, MISSING_DESCRIPTION);
        }
        assert!(catalog.describe(&DetectedVersion::Undetermined).contains("could not be detected"));
        assert_eq!(
            catalog.describe(&DetectedVersion::Known(SchemaVersion::new(4, 0))),
            MISSING_DESCRIPTION
        );
    }

    #[test]
    fn test_upgrade_targets_compare_labels_as_strings() {
        let catalog = RuleCatalog::standard();

        let from_37 = catalog.upgrade_targets(&DetectedVersion::Known(SchemaVersion::new(3, 7)));
        assert_eq!(from_37, vec![SchemaVersion::new(3, 8), SchemaVersion::new(3, 9)]);

        let from_310 = catalog.upgrade_targets(&DetectedVersion::Known(SchemaVersion::new(3, 10)));
        assert_eq!(
            from_310,
            vec![SchemaVersion::new(3, 7), SchemaVersion::new(3, 8), SchemaVersion::new(3, 9)]
        );

        let unknown = catalog.upgrade_targets(&DetectedVersion::Undetermined);
        assert_eq!(unknown, from_37);
    }

    #[test]
    fn test_add_parameter_rules_validates_keys() {
        let mut catalog = RuleCatalog::new(SchemaVersion::new(3, 7), SchemaVersion::new(3, 10));

        let mut rules = ParameterRuleSet::new();
        rules.insert(String::new(), ParameterRule::remove());
        assert!(matches!(
            catalog.add_parameter_rules("blocks_throttle", rules),
            Err(CatalogError::EmptyParameterKey(_))
        ));

        let mut rules = ParameterRuleSet::new();
        rules.insert("samples_per_second".to_string(), ParameterRule::rename(""));
        assert!(matches!(
            catalog.add_parameter_rules("blocks_throttle", rules),
            Err(CatalogError::EmptyRenameTarget(_, _))
        ));

        let mut rules = ParameterRuleSet::new();
        rules.insert("samples_per_second".to_string(), ParameterRule::rename("samp_rate"));
        catalog.add_parameter_rules("blocks_throttle", rules).unwrap();
        assert!(catalog.parameter_rules("blocks_throttle").is_some());
    }

    #[test]
    fn test_versions_and_default_target() {
        let mut catalog = RuleCatalog::standard();
        assert_eq!(catalog.available_versions().len(), 4);
        assert_eq!(catalog.default_target(), &SchemaVersion::new(3, 10));
        assert!(!catalog.contains_version(&SchemaVersion::new(3, 11)));

        catalog.add_version(SchemaVersion::new(3, 11), "Next");
        assert!(catalog.contains_version(&SchemaVersion::new(3, 11)));
        assert!(catalog.add_block_rename("", "x").is_err());
    }
}
