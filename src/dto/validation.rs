//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted team name, counted in characters after trimming.
pub const TEAM_NAME_MAX_CHARS: usize = 32;

/// Validates that a team name has 1 to 32 characters once surrounding whitespace is removed.
///
/// # Examples
///
/// ```ignore
/// validate_team_name("Net Ninjas") // Ok
/// validate_team_name("   ")        // Err - blank
/// ```
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("team_name_blank");
        err.message = Some("Team name must not be blank".into());
        return Err(err);
    }

    let chars = trimmed.chars().count();
    if chars > TEAM_NAME_MAX_CHARS {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must be at most {TEAM_NAME_MAX_CHARS} characters (got {chars})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("team_name_format");
        err.message = Some("Team name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates the admin identity recorded on force-resolved matches.
pub fn validate_actor(actor: &str) -> Result<(), ValidationError> {
    if actor.trim().is_empty() {
        let mut err = ValidationError::new("actor_blank");
        err.message = Some("Actor must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_team_name_valid() {
        assert!(validate_team_name("Alpha").is_ok());
        assert!(validate_team_name("  Spike Squad  ").is_ok());
        assert!(validate_team_name(&"x".repeat(32)).is_ok());
        assert!(validate_team_name("Équipe Été").is_ok());
    }

    #[test]
    fn test_validate_team_name_invalid_length() {
        assert!(validate_team_name("").is_err());
        assert!(validate_team_name("    ").is_err());
        assert!(validate_team_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_team_name_invalid_format() {
        assert!(validate_team_name("Alpha\nBeta").is_err());
        assert!(validate_team_name("tab\tname").is_err());
    }

    #[test]
    fn test_validate_actor() {
        assert!(validate_actor("referee").is_ok());
        assert!(validate_actor(" ").is_err());
    }
}
