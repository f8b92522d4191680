//! Field validation shared by the services

use chrono::NaiveDate;

use crate::error::StorageError;

pub const TITLE_MAX: usize = 200;
pub const CATEGORY_NAME_MAX: usize = 100;
pub const ITEM_DESCRIPTION_MAX: usize = 255;
pub const COLOR_MAX: usize = 20;
pub const USERNAME_MAX: usize = 150;

/// Non-blank text of at most `max` characters
pub fn required_text(field: &str, value: &str, max: usize) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidInput(format!("{} is required", field)));
    }
    bounded_text(field, value, max)
}

/// Text of at most `max` characters (may be empty)
pub fn bounded_text(field: &str, value: &str, max: usize) -> Result<(), StorageError> {
    if value.chars().count() > max {
        return Err(StorageError::InvalidInput(format!(
            "{} must be <= {} characters",
            field, max
        )));
    }
    Ok(())
}

pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<(), StorageError> {
    match value {
        Some(v) => required_text(field, v, max),
        None => Ok(()),
    }
}

/// `end` must not precede `start` when both are set
pub fn date_order(
    start_field: &str,
    start: Option<NaiveDate>,
    end_field: &str,
    end: Option<NaiveDate>,
) -> Result<(), StorageError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(StorageError::InvalidInput(format!(
                "{} must not be before {}",
                end_field, start_field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert!(required_text("title", "Lisbon", TITLE_MAX).is_ok());
        assert!(required_text("title", "   ", TITLE_MAX).is_err());
        assert!(required_text("title", &"x".repeat(TITLE_MAX + 1), TITLE_MAX).is_err());
        // Limits count characters, not bytes.
        assert!(required_text("title", &"é".repeat(TITLE_MAX), TITLE_MAX).is_ok());
    }

    #[test]
    fn test_date_order() {
        let may = |d| NaiveDate::from_ymd_opt(2026, 5, d);
        assert!(date_order("start_date", may(1), "end_date", may(1)).is_ok());
        assert!(date_order("start_date", may(2), "end_date", may(1)).is_err());
        assert!(date_order("start_date", None, "end_date", may(1)).is_ok());
    }
}
