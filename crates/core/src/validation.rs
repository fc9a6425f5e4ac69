//! Input validation for catalog, schedule and whitelist operations.
//!
//! Pure functions returning [`CoreError::Validation`] so every layer can
//! reuse them without a database.

use crate::error::CoreError;

/// Maximum length of a job name, category, subject or type key.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validate a job name.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_IDENTIFIER_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_job_name(name: &str) -> Result<(), CoreError> {
    validate_identifier("Job name", name)?;
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Job name may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate a free-form identifier (category, subject, type key).
///
/// Must be non-blank and at most `MAX_IDENTIFIER_LEN` characters.
pub fn validate_identifier(what: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{what} must not be empty")));
    }
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::Validation(format!(
            "{what} must not exceed {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate the shape of a cron expression.
///
/// Only the field count is checked (5 fields, or 6 with seconds);
/// evaluating the expression is the job of whatever clock fires schedules.
pub fn validate_cron_expression(expr: &str) -> Result<(), CoreError> {
    let fields = expr.split_whitespace().count();
    if fields == 5 || fields == 6 {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Cron expression must have 5 or 6 fields, got {fields}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_job_name() {
        assert!(validate_job_name("classify-123").is_ok());
        assert!(validate_job_name("report.daily_v2").is_ok());
    }

    #[test]
    fn empty_job_name_rejected() {
        assert!(validate_job_name("").is_err());
    }

    #[test]
    fn job_name_with_spaces_rejected() {
        assert!(validate_job_name("classify 123").is_err());
    }

    #[test]
    fn identifier_too_long_rejected() {
        let value = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier("Category", &value).is_err());
    }

    #[test]
    fn blank_identifier_rejected() {
        let err = validate_identifier("Subject", "   ").unwrap_err();
        assert!(err.to_string().contains("Subject"));
    }

    #[test]
    fn cron_with_five_or_six_fields_accepted() {
        assert!(validate_cron_expression("0 3 * * *").is_ok());
        assert!(validate_cron_expression("0 0 3 * * MON").is_ok());
    }

    #[test]
    fn cron_with_wrong_field_count_rejected() {
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }
}
