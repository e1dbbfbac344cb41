// Field validation helpers shared by request types

use validator::{ValidationError, ValidationErrors};

/// Trim a string field, rejecting empty values when required
pub fn trim_and_validate_field(field: &str, required: bool) -> Result<String, String> {
    let trimmed = field.trim().to_string();
    if trimmed.is_empty() && required {
        Err("Field cannot be empty".to_string())
    } else {
        Ok(trimmed)
    }
}

/// Trim an optional field, mapping blank input to `None`
pub fn trim_optional_field(field: Option<&String>) -> Option<String> {
    field.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Lowercase and trim an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// At least 8 characters with an uppercase letter, a lowercase letter and a digit
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(
            "Password must be at least 8 characters and contain uppercase, lowercase and a digit"
                .into(),
        );
        Err(err)
    }
}

/// Flatten validator errors into one readable line, e.g. `title: must not be empty`
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "is invalid".to_string());
            format!("{}: {}", field, message)
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "must not be empty"))]
        title: String,
        #[validate(custom = "validate_password_strength")]
        password: String,
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Password1").is_ok());
        assert!(validate_password_strength("password1").is_err());
        assert!(validate_password_strength("PASSWORD1").is_err());
        assert!(validate_password_strength("Password").is_err());
        assert!(validate_password_strength("Pass1").is_err());
    }

    #[test]
    fn test_format_validation_errors() {
        let probe = Probe {
            title: String::new(),
            password: "weak".into(),
        };
        let message = format_validation_errors(&probe.validate().unwrap_err());

        assert!(message.contains("title: must not be empty"));
        assert!(message.contains("password: Password must be at least 8 characters"));
    }

    #[test]
    fn test_trim_helpers() {
        assert_eq!(trim_and_validate_field("  Surf  ", true).unwrap(), "Surf");
        assert!(trim_and_validate_field("   ", true).is_err());
        assert_eq!(trim_optional_field(Some(&"  ".to_string())), None);
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
