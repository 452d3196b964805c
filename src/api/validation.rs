use regex::Regex;
use std::sync::OnceLock;

use super::ApiError;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"))
}

pub fn validate_id(id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if trimmed.len() > 254 || !email_regex().is_match(trimmed) {
        return Err(ApiError::validation("Email is not valid"));
    }
    Ok(trimmed)
}

pub fn validate_name(name: &str) -> Result<&str, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    if trimmed.chars().count() > 100 {
        return Err(ApiError::validation("Name must be 100 characters or less"));
    }
    Ok(trimmed)
}

pub fn validate_required<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(value)
}

pub fn validate_title(title: &str) -> Result<&str, ApiError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Title cannot be empty"));
    }
    if trimmed.chars().count() > 255 {
        return Err(ApiError::validation("Title must be 255 characters or less"));
    }
    Ok(trimmed)
}

/// Plausibility bounds for a manual blood-pressure entry.
pub fn validate_vitals(systolic: i32, diastolic: i32, pulse: i32, weight: f64) -> Result<(), ApiError> {
    if !(40..=300).contains(&systolic) {
        return Err(ApiError::validation("Systolic must be between 40 and 300"));
    }
    if !(20..=200).contains(&diastolic) {
        return Err(ApiError::validation("Diastolic must be between 20 and 200"));
    }
    if diastolic >= systolic {
        return Err(ApiError::validation("Diastolic must be lower than systolic"));
    }
    if !(20..=300).contains(&pulse) {
        return Err(ApiError::validation("Pulse must be between 20 and 300"));
    }
    if !weight.is_finite() || !(0.0..=500.0).contains(&weight) {
        return Err(ApiError::validation("Weight must be between 0 and 500"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id(1).is_ok());
        assert!(validate_id(0).is_err());
        assert!(validate_id(-3).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" alice@x.com ").unwrap(), "alice@x.com");
        assert!(validate_email("Alice@X.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@x").is_err());
        assert!(validate_email("al ice@x.com").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Alice ").unwrap(), "Alice");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_vitals() {
        assert!(validate_vitals(120, 80, 60, 75.5).is_ok());
        assert!(validate_vitals(80, 120, 60, 75.5).is_err());
        assert!(validate_vitals(120, 80, 0, 75.5).is_err());
        assert!(validate_vitals(120, 80, 60, f64::NAN).is_err());
        assert!(validate_vitals(500, 80, 60, 75.5).is_err());
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title(" Ode to Joy ").unwrap(), "Ode to Joy");
        assert!(validate_title("").is_err());
    }
}
