use thiserror::Error;
use crate::{
    document::{Document, Element, Node},
    migration_log::MigrationLog,
    rule_catalog::{ParameterRuleSet, RuleCatalog},
    schema_version::SchemaVersion,
    transformation_rule::{AppliedTransformation, TransformationType},
};

/// Key of the document-level parameter that selects the GUI toolkit.
pub const GENERATE_OPTIONS_KEY: &str = "generate_options";
pub const LEGACY_GUI_MARKER: &str = "wx_gui";
pub const MODERN_GUI_MARKER: &str = "qt_gui";

const BLOCK: &str = "block";
const PARAM: &str = "param";
const KEY: &str = "key";
const VALUE: &str = "value";

/// Rewrites blocks and their parameters according to a rule catalog.
pub struct SchemaTransformationEngine<'a> {
    catalog: &'a RuleCatalog,
}

/// Result of a transformation operation
#[derive(Debug, Clone)]
pub struct TransformationResult {
    pub applied_transformations: Vec<AppliedTransformation>,
    pub blocks_visited: usize,
    pub target_version: SchemaVersion,
}

/// Errors that can occur during transformation
#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Block #{block_index} has no key element")]
    MissingBlockKey { block_index: usize },

    #[error("Parameter #{param_index} of block {block_key} has no key element")]
    MissingParameterKey { block_key: String, param_index: usize },
}

impl<'a> SchemaTransformationEngine<'a> {
    pub fn new(catalog: &'a RuleCatalog) -> Self {
        Self { catalog }
    }

    /// Transform `document` in place, appending a line to `log` for every change.
    ///
    /// `target_version` is recorded but does not select rules. On error the
    /// document keeps the changes made so far and `log` holds their lines.
    pub fn transform(
        &self,
        document: &mut Document,
        target_version: &SchemaVersion,
        log: &mut MigrationLog,
    ) -> Result<TransformationResult, TransformationError> {
        let mut applied = Vec::new();

        if let Some(change) = self.update_generate_options(document, log) {
            applied.push(change);
        }

        let mut block_index = 0;
        document.root.visit_descendants_mut(BLOCK, &mut |block: &mut Element| {
            let changes = self.convert_block(block, block_index, log)?;
            applied.extend(changes);
            block_index += 1;
            Ok::<(), TransformationError>(())
        })?;

        tracing::debug!(
            blocks = block_index,
            changes = applied.len(),
            target = %target_version,
            "transformation pass finished"
        );

        Ok(TransformationResult {
            applied_transformations: applied,
            blocks_visited: block_index,
            target_version: target_version.clone(),
        })
    }

    /// Switch the first `generate_options` parameter from the WX to the Qt toolkit.
    fn update_generate_options(
        &self,
        document: &mut Document,
        log: &mut MigrationLog,
    ) -> Option<AppliedTransformation> {
        let param = document.root.find_descendant_mut(&|element: &Element| {
            element.name == PARAM
                && element.child_text(KEY).flatten().as_deref() == Some(GENERATE_OPTIONS_KEY)
        })?;

        let value = param.child_mut(VALUE)?;
        let old_value = value.text()?;
        if !old_value.contains(LEGACY_GUI_MARKER) {
            return None;
        }

        value.set_text(MODERN_GUI_MARKER);
        log.push(format!(
            "Updated {}: {} -> {}",
            GENERATE_OPTIONS_KEY, LEGACY_GUI_MARKER, MODERN_GUI_MARKER
        ));

        Some(
            AppliedTransformation::new(TransformationType::UpdateGenerateOptions, GENERATE_OPTIONS_KEY)
                .with_values(Some(old_value), Some(MODERN_GUI_MARKER.to_string())),
        )
    }

    /// Rename one block, then apply the parameter rules registered for its new key.
    fn convert_block(
        &self,
        block: &mut Element,
        block_index: usize,
        log: &mut MigrationLog,
    ) -> Result<Vec<AppliedTransformation>, TransformationError> {
        let key_element = block
            .child_mut(KEY)
            .ok_or(TransformationError::MissingBlockKey { block_index })?;
        let original_key = key_element.text().unwrap_or_default();

        let mut applied = Vec::new();
        let new_key = self.catalog.resolve_block_key(&original_key).to_string();
        if new_key != original_key {
            log.push(format!("Converting block: {} -> {}", original_key, new_key));
            key_element.set_text(new_key.as_str());
            applied.push(
                AppliedTransformation::new(TransformationType::RenameBlock, original_key.as_str())
                    .in_block(new_key.as_str())
                    .with_values(Some(original_key.clone()), Some(new_key.clone())),
            );
        }

        if let Some(rules) = self.catalog.parameter_rules(&new_key) {
            applied.extend(self.apply_parameter_rules(block, &new_key, rules, log)?);
        }

        Ok(applied)
    }

    fn apply_parameter_rules(
        &self,
        block: &mut Element,
        block_key: &str,
        rules: &ParameterRuleSet,
        log: &mut MigrationLog,
    ) -> Result<Vec<AppliedTransformation>, TransformationError> {
        let mut applied = Vec::new();
        let mut removed = Vec::new();
        let mut param_index = 0;

        for (position, node) in block.children.iter_mut().enumerate() {
            let Node::Element(param) = node else {
                continue;
            };
            if param.name != PARAM {
                continue;
            }
            param_index += 1;

            let param_key = param
                .child_text(KEY)
                .ok_or_else(|| TransformationError::MissingParameterKey {
                    block_key: block_key.to_string(),
                    param_index: param_index - 1,
                })?
                .unwrap_or_default();

            let Some(rule) = rules.get(&param_key) else {
                continue;
            };

            if let Some(new_name) = rule.rename_to.as_deref() {
                if let Some(key_element) = param.child_mut(KEY) {
                    key_element.set_text(new_name);
                }
                log.push(format!("  Updated parameter: {} -> {}", param_key, new_name));
                applied.push(
                    AppliedTransformation::new(TransformationType::RenameParameter, param_key.as_str())
                        .in_block(block_key)
                        .with_values(Some(param_key.clone()), Some(new_name.to_string())),
                );
            }

            if let Some(note) = &rule.note {
                log.push(format!("  Note for {}: {}", param_key, note));
            }

            if let Some(value_element) = param.child_mut(VALUE) {
                let current = value_element.text();
                if let Some(new_value) = rule.substituted_value(current.as_deref()) {
                    value_element.set_text(new_value);
                    log.push(format!("  Updated value: {} -> {}", current.as_deref().unwrap_or_default(), new_value));
                    applied.push(
                        AppliedTransformation::new(TransformationType::SubstituteValue, param_key.as_str())
                            .in_block(block_key)
                            .with_values(current, Some(new_value.to_string())),
                    );
                }
            }

            if rule.remove {
                removed.push(position);
                log.push(format!("  Removed parameter: {}", param_key));
                applied.push(
                    AppliedTransformation::new(TransformationType::RemoveParameter, param_key.as_str())
                        .in_block(block_key)
                        .with_values(param.child_text(VALUE).flatten(), None),
                );
            }
        }

        block.remove_children(&removed);
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformation_rule::ParameterRule;

    fn transform(source: &str) -> (Document, Vec<AppliedTransformation>, MigrationLog) {
        let catalog = RuleCatalog::standard();
        let engine = SchemaTransformationEngine::new(&catalog);
        let mut document = Document::parse(source).unwrap();
        let mut log = MigrationLog::new();
        let result = engine
            .transform(&mut document, &SchemaVersion::new(3, 10), &mut log)
            .unwrap();
        (document, result.applied_transformations, log)
    }

    fn block_keys(document: &Document) -> Vec<String> {
        document
            .root
            .descendants_named(BLOCK)
            .iter()
            .filter_map(|block| block.child_text(KEY).flatten())
            .collect()
    }

    fn param_keys(block: &Element) -> Vec<String> {
        block
            .child_elements()
            .filter(|child| child.name == PARAM)
            .filter_map(|param| param.child_text(KEY).flatten())
            .collect()
    }

    #[test]
    fn test_renamed_block_without_matching_rule_keeps_params() {
        let (document, applied, log) = transform(
            r#"<flow_graph><block><key>wxgui_fftsink2</key>
                 <param><key>grid_pos</key><value>0,0,1,1</value></param>
               </block></flow_graph>"#,
        );

        assert_eq!(block_keys(&document), vec!["qtgui_freq_sink_x"]);
        let block = document.root.child(BLOCK).unwrap();
        assert_eq!(param_keys(block), vec!["grid_pos"]);
        assert_eq!(
            block.child(PARAM).unwrap().child_text(VALUE),
            Some(Some("0,0,1,1".to_string()))
        );
        assert_eq!(applied.len(), 1);
        assert_eq!(log.lines(), ["Converting block: wxgui_fftsink2 -> qtgui_freq_sink_x"]);
    }

    #[test]
    fn test_slider_conversion_applies_all_rule_kinds() {
        let (document, applied, log) = transform(
            r#"<flow_graph><block><key>variable_slider</key>
                 <param><key>style</key><value>wx.SL_HORIZONTAL</value></param>
                 <param><key>grid_pos</key><value>1,0,1,1</value></param>
                 <param><key>notebook</key><value>anything</value></param>
               </block></flow_graph>"#,
        );

        let block = document.root.child(BLOCK).unwrap();
        assert_eq!(block.child_text(KEY), Some(Some("variable_qtgui_range".to_string())));
        assert_eq!(param_keys(block), vec!["style", "gui_hint"]);
        assert_eq!(
            block.child(PARAM).unwrap().child_text(VALUE),
            Some(Some("QtCore.Qt.Horizontal".to_string()))
        );

        let kinds: Vec<_> = applied.iter().map(|a| a.transformation_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransformationType::RenameBlock,
                TransformationType::SubstituteValue,
                TransformationType::RenameParameter,
                TransformationType::RemoveParameter,
            ]
        );
        assert_eq!(log.lines()[3], "  Removed parameter: notebook");
    }

    #[test]
    fn test_substitution_needs_exact_value() {
        let (document, applied, _) = transform(
            r#"<flow_graph><block><key>variable_qtgui_range</key>
                 <param><key>style</key><value>wx.SL_HORIZONTAL </value></param>
               </block></flow_graph>"#,
        );
        let block = document.root.child(BLOCK).unwrap();
        assert_eq!(
            block.child(PARAM).unwrap().child_text(VALUE),
            Some(Some("wx.SL_HORIZONTAL ".to_string()))
        );
        assert!(applied.is_empty());
    }

    #[test]
    fn test_rules_fire_for_already_renamed_blocks() {
        let (document, _, log) = transform(
            r#"<flow_graph><block><key>qtgui_freq_sink_x</key>
                 <param><key>baseband_freq</key><value>0</value></param>
                 <param><key>ref_level</key><value>0</value></param>
               </block></flow_graph>"#,
        );
        let block = document.root.child(BLOCK).unwrap();
        assert_eq!(param_keys(block), vec!["center_freq", "ref_level"]);
        assert_eq!(
            log.lines(),
            [
                "  Updated parameter: baseband_freq -> center_freq",
                "  Updated parameter: ref_level -> ref_level",
                "  Note for ref_level: Now in dB",
            ]
        );
    }

    #[test]
    fn test_rules_keyed_by_original_parameter_names() {
        let mut catalog = RuleCatalog::standard();
        let mut rules = ParameterRuleSet::new();
        rules.insert("a".to_string(), ParameterRule::rename("b"));
        rules.insert("b".to_string(), ParameterRule::rename("c"));
        catalog.add_parameter_rules("blocks_throttle", rules).unwrap();

        let mut document = Document::parse(
            r#"<flow_graph><block><key>gr_throttle</key>
                 <param><key>a</key><value>1</value></param>
                 <param><key>b</key><value>2</value></param>
               </block></flow_graph>"#,
        )
        .unwrap();
        let mut log = MigrationLog::new();
        SchemaTransformationEngine::new(&catalog)
            .transform(&mut document, &SchemaVersion::new(3, 10), &mut log)
            .unwrap();

        let block = document.root.child(BLOCK).unwrap();
        assert_eq!(param_keys(block), vec!["b", "c"]);
    }

    #[test]
    fn test_remove_wins_over_rename() {
        let mut catalog = RuleCatalog::standard();
        let mut rules = ParameterRuleSet::new();
        rules.insert(
            "freq".to_string(),
            ParameterRule::rename("frequency").with_substitution("0", "1").with_removal(),
        );
        catalog.add_parameter_rules("analog_sig_source_x", rules).unwrap();

        let mut document = Document::parse(
            r#"<flow_graph><block><key>analog_sig_source_x</key>
                 <param><key>freq</key><value>0</value></param>
               </block></flow_graph>"#,
        )
        .unwrap();
        let mut log = MigrationLog::new();
        SchemaTransformationEngine::new(&catalog)
            .transform(&mut document, &SchemaVersion::new(3, 10), &mut log)
            .unwrap();

        let block = document.root.child(BLOCK).unwrap();
        assert!(param_keys(block).is_empty());
        assert_eq!(log.len(), 3);
        assert_eq!(log.lines()[2], "  Removed parameter: freq");
    }

    #[test]
    fn test_generate_options_switched_once() {
        let source = r#"<flow_graph><block><key>options</key>
                 <param><key>generate_options</key><value>wx_gui</value></param>
               </block></flow_graph>"#;
        let (document, applied, log) = transform(source);
        let param = document.root.child(BLOCK).unwrap().child(PARAM).unwrap();
        assert_eq!(param.child_text(VALUE), Some(Some("qt_gui".to_string())));
        assert_eq!(applied[0].transformation_type, TransformationType::UpdateGenerateOptions);
        assert_eq!(log.lines(), ["Updated generate_options: wx_gui -> qt_gui"]);

        let (_, applied, log) = transform(&source.replace("wx_gui", "qt_gui"));
        assert!(applied.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let catalog = RuleCatalog::standard();
        let engine = SchemaTransformationEngine::new(&catalog);
        let mut document = Document::parse(
            r#"<flow_graph><block><key>variable_slider</key>
                 <param><key>style</key><value>wx.SL_HORIZONTAL</value></param>
                 <param><key>notebook</key><value></value></param>
               </block><block><key>gr_add_xx</key></block></flow_graph>"#,
        )
        .unwrap();
        let target = SchemaVersion::new(3, 10);

        engine.transform(&mut document, &target, &mut MigrationLog::new()).unwrap();
        let once = document.clone();
        let second = engine.transform(&mut document, &target, &mut MigrationLog::new()).unwrap();

        assert_eq!(document, once);
        assert!(second.applied_transformations.is_empty());
    }

    #[test]
    fn test_block_without_key_aborts_with_partial_log() {
        let catalog = RuleCatalog::standard();
        let mut document = Document::parse(
            r#"<flow_graph>
                 <block><key>gr_throttle</key></block>
                 <block><param><key>x</key></param></block>
                 <block><key>gr_add_xx</key></block>
               </flow_graph>"#,
        )
        .unwrap();
        let mut log = MigrationLog::new();

        let err = SchemaTransformationEngine::new(&catalog)
            .transform(&mut document, &SchemaVersion::new(3, 10), &mut log)
            .unwrap_err();

        assert!(matches!(err, TransformationError::MissingBlockKey { block_index: 1 }));
        assert_eq!(log.lines(), ["Converting block: gr_throttle -> blocks_throttle"]);
    }

    #[test]
    fn test_param_without_key_is_an_error() {
        let catalog = RuleCatalog::standard();
        let mut document = Document::parse(
            r#"<flow_graph><block><key>variable_slider</key><param><value>1</value></param></block></flow_graph>"#,
        )
        .unwrap();
        let err = SchemaTransformationEngine::new(&catalog)
            .transform(&mut document, &SchemaVersion::new(3, 10), &mut MigrationLog::new())
            .unwrap_err();
        assert!(matches!(err, TransformationError::MissingParameterKey { param_index: 0, .. }));
    }
}
