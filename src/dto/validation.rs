//! Validation helpers for DTOs.

use indexmap::IndexMap;
use validator::ValidationError;

use crate::dto::admin::PatternRuleInput;

const MAX_NOTES_LEN: usize = 280;

/// Pattern ids must be non-empty identifiers and points non-negative.
///
/// Ids unknown to the detector are accepted so newer clients can store rules early.
pub fn validate_pattern_rules(
    rules: &IndexMap<String, PatternRuleInput>,
) -> Result<(), ValidationError> {
    for (id, rule) in rules {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            let mut err = ValidationError::new("pattern_id_format");
            err.message = Some(format!("Pattern id `{id}` must be alphanumeric").into());
            return Err(err);
        }
        if rule.points < 0 {
            let mut err = ValidationError::new("pattern_points_negative");
            err.message = Some(format!("Pattern `{id}` cannot award negative points").into());
            return Err(err);
        }
    }
    Ok(())
}

/// Notes attached to a manual award stay short and non-blank.
pub fn validate_notes(notes: &str) -> Result<(), ValidationError> {
    if notes.trim().is_empty() {
        let mut err = ValidationError::new("notes_blank");
        err.message = Some("Notes must not be blank".into());
        return Err(err);
    }
    if notes.chars().count() > MAX_NOTES_LEN {
        let mut err = ValidationError::new("notes_length");
        err.message = Some(format!("Notes are limited to {MAX_NOTES_LEN} characters").into());
        return Err(err);
    }
    Ok(())
}
