//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a league identifier (team, season or player id).
///
/// Identifiers are non-empty, at most 64 characters, and made of ASCII
/// letters, digits, `_` or `-`.
///
/// # Examples
///
/// ```ignore
/// validate_league_id("SSPSLT0001") // Ok
/// validate_league_id("")           // Err - empty
/// validate_league_id("team 1")     // Err - space
/// ```
pub fn validate_league_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > 64 {
        let mut err = ValidationError::new("league_id_length");
        err.message = Some(
            format!(
                "Identifier must be between 1 and 64 characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("league_id_format");
        err.message =
            Some("Identifier must contain only ASCII letters, digits, '_' or '-'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a currency amount: finite, non-negative, at most two decimals.
pub fn validate_money(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount < 0.0 {
        let mut err = ValidationError::new("money_range");
        err.message = Some("Amount must be a non-negative number".into());
        return Err(err);
    }

    let cents = amount * 100.0;
    if (cents - cents.round()).abs() > 1e-6 {
        let mut err = ValidationError::new("money_precision");
        err.message = Some("Amount must have at most two decimals".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_league_id_valid() {
        assert!(validate_league_id("SSPSLT0001").is_ok());
        assert!(validate_league_id("sspsls16").is_ok());
        assert!(validate_league_id("player_12-b").is_ok());
    }

    #[test]
    fn test_validate_league_id_invalid_length() {
        assert!(validate_league_id("").is_err());
        assert!(validate_league_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_league_id_invalid_format() {
        assert!(validate_league_id("team 1").is_err());
        assert!(validate_league_id("team/1").is_err());
        assert!(validate_league_id("équipe").is_err());
    }

    #[test]
    fn test_validate_money() {
        assert!(validate_money(0.0).is_ok());
        assert!(validate_money(50.5).is_ok());
        assert!(validate_money(12.34).is_ok());
        assert!(validate_money(-1.0).is_err());
        assert!(validate_money(1.234).is_err());
        assert!(validate_money(f64::NAN).is_err());
    }
}
