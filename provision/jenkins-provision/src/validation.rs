//! Input validation for bootstrap configuration
//!
//! Every name from the configuration file ends up inside CLI arguments,
//! job XML or GitHub API paths. Validating the character set up front keeps
//! injection out of all three.

use anyhow::Result;

/// Maximum length for configured names (GitHub caps repository names at 100)
pub const IDENTIFIER_MAX_LENGTH: usize = 100;

/// Characters allowed in identifiers besides alphanumerics
const IDENTIFIER_ALLOWED_CHARS: &[char] = &['_', '-', '.'];

/// Validate a configured name before it is interpolated anywhere
///
/// Identifiers must:
/// - Not be empty
/// - Not exceed 100 characters
/// - Contain only alphanumeric, underscore, hyphen, or dot
///
/// # Arguments
/// * `name` - The identifier to validate
/// * `field_name` - Description of the field for error messages
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(anyhow::Error)` with detailed message if invalid
pub fn validate_identifier(name: &str, field_name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("{} cannot be empty", field_name);
    }

    if name.len() > IDENTIFIER_MAX_LENGTH {
        anyhow::bail!(
            "{} exceeds maximum identifier length ({} > {})",
            field_name,
            name.len(),
            IDENTIFIER_MAX_LENGTH
        );
    }

    let invalid_chars: Vec<char> = name
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && !IDENTIFIER_ALLOWED_CHARS.contains(c))
        .collect();

    if !invalid_chars.is_empty() {
        anyhow::bail!(
            "{} contains invalid characters: {:?} (allowed: a-z, A-Z, 0-9, _, -, .)",
            field_name,
            invalid_chars
        );
    }

    Ok(())
}

/// Validate configuration numeric values are within reasonable bounds
///
/// # Arguments
/// * `value` - The value to validate
/// * `field_name` - Description of the field for error messages
/// * `min` - Minimum allowed value
/// * `max` - Maximum allowed value
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(anyhow::Error)` if out of bounds
pub fn validate_numeric_range(value: u64, field_name: &str, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        anyhow::bail!(
            "{} must be between {} and {}, got: {}",
            field_name,
            min,
            max,
            value
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("storefront", "repository").is_ok());
        assert!(validate_identifier("workflow-job", "plugin").is_ok());
        assert!(validate_identifier("acme-dev-github-token", "secret").is_ok());
        assert!(validate_identifier("release.2024", "branch").is_ok());
        assert!(validate_identifier("_internal", "name").is_ok());
    }

    #[test]
    fn test_validate_identifier_invalid() {
        // Empty
        assert!(validate_identifier("", "field").is_err());

        // Shell and URL metacharacters
        assert!(validate_identifier("repo;rm -rf /", "field").is_err());
        assert!(validate_identifier("repo name", "field").is_err());
        assert!(validate_identifier("repo/name", "field").is_err());
        assert!(validate_identifier("repo$(id)", "field").is_err());

        // Too long
        let long_name = "a".repeat(101);
        assert!(validate_identifier(&long_name, "field").is_err());
    }

    #[test]
    fn test_validate_numeric_range() {
        // Valid values
        assert!(validate_numeric_range(5, "port", 1, 10).is_ok());
        assert!(validate_numeric_range(1, "port", 1, 10).is_ok());
        assert!(validate_numeric_range(10, "port", 1, 10).is_ok());

        // Invalid values
        assert!(validate_numeric_range(0, "port", 1, 10).is_err());
        assert!(validate_numeric_range(11, "port", 1, 10).is_err());
        assert!(validate_numeric_range(100, "port", 1, 10).is_err());
    }
}
