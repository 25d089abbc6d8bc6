use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Trimmed, non-empty text within `max` characters
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_field(field, "is required"));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::invalid_field(field, format!("must be at most {} characters", max)));
    }
    Ok(trimmed.to_string())
}

/// Blank optional text becomes `None`
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}

pub fn email(field: &str, value: &str) -> Result<String, ApiError> {
    let normalized = value.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || normalized.chars().any(char::is_whitespace) {
        return Err(ApiError::invalid_field(field, "must be a valid email address"));
    }
    Ok(normalized)
}

pub fn password(field: &str, value: &str) -> Result<(), ApiError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_field(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// Parse a value against a fixed set of allowed strings
pub fn one_of<T>(field: &str, value: &str, parse: impl Fn(&str) -> Option<T>, allowed: &str) -> Result<T, ApiError> {
    parse(value).ok_or_else(|| ApiError::invalid_field(field, format!("must be one of: {}", allowed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_trims_and_limits() {
        assert_eq!(required_text("name", "  Acme  ", 10).unwrap(), "Acme");
        assert!(required_text("name", "   ", 10).is_err());
        assert!(required_text("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn optional_text_drops_blanks() {
        assert_eq!(optional_text("notes", Some("  "), 10).unwrap(), None);
        assert_eq!(optional_text("notes", Some("x"), 10).unwrap(), Some("x".to_string()));
        assert_eq!(optional_text("notes", None, 10).unwrap(), None);
    }

    #[test]
    fn email_is_normalized_and_checked() {
        assert_eq!(email("email", " Jane@Firm.Test ").unwrap(), "jane@firm.test");
        for bad in ["jane", "jane@", "@firm.test", "jane@firm", "ja ne@firm.test"] {
            assert!(email("email", bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(password("password", "1234567").is_err());
        assert!(password("password", "12345678").is_ok());
    }
}
