//! Input validation for account credentials

use regex::Regex;
use std::sync::OnceLock;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a new account password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    if password.trim().is_empty() {
        return Err("Password cannot be only whitespace".to_string());
    }

    Ok(())
}

/// Validate a required display name such as a company or contact name
pub fn validate_name(label: &str, value: &str) -> Result<(), String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(format!("{} is required", label));
    }

    if value.chars().count() > 255 {
        return Err(format!("{} must be at most 255 characters long", label));
    }

    Ok(())
}

/// Normalize an email for lookups and uniqueness
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
