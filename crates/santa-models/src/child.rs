//! Child profiles captured by the order wizard.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ModelError, ModelResult};

/// Maximum number of children a single order may feature.
pub const MAX_CHILDREN: usize = 4;

/// Input data for script and prompt generation. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    #[validate(range(max = 17))]
    pub age: u8,

    /// Pronoun Santa should use ("he", "she", "they")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 16))]
    pub pronoun: Option<String>,

    #[serde(default)]
    #[validate(length(max = 10))]
    pub interests: Vec<String>,

    #[serde(default)]
    #[validate(length(max = 10))]
    pub wishlist: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 280))]
    pub good_deed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub personal_message: Option<String>,
}

impl ChildProfile {
    pub fn new(name: impl Into<String>, age: u8) -> Self {
        Self {
            name: name.into(),
            age,
            pronoun: None,
            interests: Vec::new(),
            wishlist: Vec::new(),
            good_deed: None,
            personal_message: None,
        }
    }

    pub fn with_interests(mut self, interests: Vec<String>) -> Self {
        self.interests = interests;
        self
    }

    pub fn with_wishlist(mut self, wishlist: Vec<String>) -> Self {
        self.wishlist = wishlist;
        self
    }
}

/// Check the child list of an order: 1..=MAX_CHILDREN entries, each valid.
pub fn validate_children(children: &[ChildProfile]) -> ModelResult<()> {
    if children.is_empty() {
        return Err(ModelError::validation("order must feature at least one child"));
    }
    if children.len() > MAX_CHILDREN {
        return Err(ModelError::validation(format!(
            "order may feature at most {} children, got {}",
            MAX_CHILDREN,
            children.len()
        )));
    }
    for (i, child) in children.iter().enumerate() {
        child
            .validate()
            .map_err(|e| ModelError::validation(format!("child {}: {}", i + 1, e)))?;
        if child.name.trim().is_empty() {
            return Err(ModelError::validation(format!("child {}: name is blank", i + 1)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_children() {
        let kids = vec![
            ChildProfile::new("Ava", 6).with_interests(vec!["reindeer".into()]),
            ChildProfile::new("Leo", 9),
        ];
        assert!(validate_children(&kids).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_too_many() {
        assert!(validate_children(&[]).is_err());

        let kids: Vec<_> = (0..=MAX_CHILDREN)
            .map(|i| ChildProfile::new(format!("kid{}", i), 5))
            .collect();
        assert!(validate_children(&kids).is_err());
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(validate_children(&[ChildProfile::new("", 5)]).is_err());
        assert!(validate_children(&[ChildProfile::new("   ", 5)]).is_err());
        assert!(validate_children(&[ChildProfile::new("Old", 30)]).is_err());
    }

    #[test]
    fn test_camel_case_wire_format() {
        let mut child = ChildProfile::new("Mia", 4);
        child.good_deed = Some("fed the cat".into());
        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json["goodDeed"], "fed the cat");
        assert!(json.get("personalMessage").is_none());
    }
}
