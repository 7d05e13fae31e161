use serde::{Deserialize, Serialize};

/// How a single parameter of a renamed block changes.
///
/// The fields are independent and are evaluated in a fixed order:
/// rename, then value substitution, then removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRule {
    pub rename_to: Option<String>,
    pub substitute: Option<ValueSubstitution>,
    pub remove: bool,
    /// Informational text logged whenever the rule fires.
    pub note: Option<String>,
}

/// Replace `old` with `new`, only on an exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSubstitution {
    pub old: String,
    pub new: String,
}

/// Types of transformations that can be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformationType {
    /// Block identifier rewritten through the rename map
    RenameBlock,
    /// Parameter key changed, value untouched
    RenameParameter,
    /// Parameter value replaced after an exact match
    SubstituteValue,
    /// Parameter detached from its block
    RemoveParameter,
    /// Document-level GUI toolkit option switched
    UpdateGenerateOptions,
}

/// Represents a transformation that was applied during processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTransformation {
    /// Block key after renaming; `None` for document-level changes.
    pub block_key: Option<String>,
    /// Block or parameter key the change targets, as it stood before the change.
    pub target: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub transformation_type: TransformationType,
}

impl ParameterRule {
    pub fn rename(new_key: impl Into<String>) -> Self {
        Self {
            rename_to: Some(new_key.into()),
            ..Self::default()
        }
    }

    pub fn substitute(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            substitute: Some(ValueSubstitution {
                old: old.into(),
                new: new.into(),
            }),
            ..Self::default()
        }
    }

    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Self::default()
        }
    }

    pub fn with_substitution(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.substitute = Some(ValueSubstitution {
            old: old.into(),
            new: new.into(),
        });
        self
    }

    pub fn with_removal(mut self) -> Self {
        self.remove = true;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// True when the rule would change nothing about a parameter.
    pub fn is_inert(&self) -> bool {
        self.rename_to.is_none() && self.substitute.is_none() && !self.remove
    }

    /// Substituted value for `current`, if the rule's expected value matches it exactly.
    pub fn substituted_value(&self, current: Option<&str>) -> Option<&str> {
        match (&self.substitute, current) {
            (Some(substitution), Some(value)) if value == substitution.old => {
                Some(substitution.new.as_str())
            }
            _ => None,
        }
    }
}

impl AppliedTransformation {
    pub fn new(transformation_type: TransformationType, target: impl Into<String>) -> Self {
        Self {
            block_key: None,
            target: target.into(),
            old_value: None,
            new_value: None,
            transformation_type,
        }
    }

    pub fn in_block(mut self, block_key: impl Into<String>) -> Self {
        self.block_key = Some(block_key.into());
        self
    }

    pub fn with_values(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }
}
