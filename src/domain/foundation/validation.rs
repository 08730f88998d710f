//! Input validation helpers shared by the HTTP surface and the reconciler.

use super::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 128;
const MAX_EXTERNAL_ID_LENGTH: usize = 64;

/// Lower-cases and trims an email address. Empty input stays empty.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes and validates an email address, returning the normalized form.
pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(ValidationError::empty_field("email"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::out_of_range(
            "email",
            3,
            MAX_EMAIL_LENGTH,
            email.len(),
        ));
    }
    if email.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
        return Err(ValidationError::invalid_format("email", "contains forbidden characters"));
    }

    let (local, domain) = email
        .rsplit_once('@')
        .ok_or_else(|| ValidationError::invalid_format("email", "missing @ symbol"))?;
    if local.is_empty() || local.contains('@') {
        return Err(ValidationError::invalid_format("email", "invalid local part"));
    }
    if domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(ValidationError::invalid_format("email", "invalid domain"));
    }

    Ok(email)
}

/// Password strength requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_number: bool,
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_upper: true,
            require_lower: true,
            require_number: true,
            require_symbol: true,
        }
    }
}

impl PasswordPolicy {
    /// Checks a candidate password against the policy.
    pub fn validate(&self, password: &str) -> Result<(), ValidationError> {
        if password.is_empty() {
            return Err(ValidationError::empty_field("password"));
        }
        let length = password.chars().count();
        if length < self.min_length || length > self.max_length {
            return Err(ValidationError::out_of_range(
                "password",
                self.min_length,
                self.max_length,
                length,
            ));
        }
        if self.require_upper && !password.chars().any(|c| c.is_uppercase()) {
            return Err(ValidationError::invalid_format(
                "password",
                "must contain an uppercase letter",
            ));
        }
        if self.require_lower && !password.chars().any(|c| c.is_lowercase()) {
            return Err(ValidationError::invalid_format(
                "password",
                "must contain a lowercase letter",
            ));
        }
        if self.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(ValidationError::invalid_format("password", "must contain a number"));
        }
        if self.require_symbol && !password.chars().any(|c| c.is_ascii_punctuation()) {
            return Err(ValidationError::invalid_format("password", "must contain a symbol"));
        }
        Ok(())
    }
}

/// Checks a password against the default policy.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    PasswordPolicy::default().validate(password)
}

/// Validates an optional human name. Blank input yields `None`.
pub fn validate_optional_name(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    let name = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(name) => name,
    };
    let length = name.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::out_of_range(field, 1, MAX_NAME_LENGTH, length));
    }
    Ok(Some(name.to_string()))
}

/// Validates a provider-issued identifier such as `user_01H...`.
///
/// Only ASCII letters, digits and underscores are accepted so the id can be
/// embedded in an outbound request path as-is.
pub fn validate_external_id(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    if id.len() > MAX_EXTERNAL_ID_LENGTH {
        return Err(ValidationError::out_of_range(
            field,
            1,
            MAX_EXTERNAL_ID_LENGTH,
            id.len(),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::invalid_format(
            field,
            "may only contain letters, digits and underscores",
        ));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ════════════════════════════════════════════════════════════════════════════
    // Email
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email("   "), "");
    }

    #[test]
    fn validate_email_accepts_common_addresses() {
        assert_eq!(validate_email("a@example.com").unwrap(), "a@example.com");
        assert_eq!(
            validate_email(" First.Last+tag@sub.example.org ").unwrap(),
            "first.last+tag@sub.example.org"
        );
    }

    #[test]
    fn validate_email_rejects_malformed_addresses() {
        assert!(matches!(validate_email(""), Err(ValidationError::EmptyField { .. })));
        for bad in ["plain", "@example.com", "a@", "a@localhost", "a@b..com", "a b@c.com"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Password
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn default_policy_accepts_strong_password() {
        assert!(PasswordPolicy::default().validate("Str0ng!Pass").is_ok());
    }

    #[test]
    fn validate_password_uses_default_policy() {
        assert!(validate_password("Str0ng!Pass").is_ok());
        assert!(validate_password("weak").is_err());
    }

    #[test]
    fn default_policy_names_the_missing_class() {
        let policy = PasswordPolicy::default();
        assert!(matches!(policy.validate("short1!"), Err(ValidationError::OutOfRange { .. })));
        assert!(policy.validate("nouppercase1!").is_err());
        assert!(policy.validate("NOLOWERCASE1!").is_err());
        assert!(policy.validate("NoNumbers!!").is_err());
        assert!(policy.validate("NoSymbols123").is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Names
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn optional_name_blank_is_none() {
        assert_eq!(validate_optional_name("first_name", Some("   ")).unwrap(), None);
        assert_eq!(validate_optional_name("first_name", None).unwrap(), None);
    }

    #[test]
    fn optional_name_too_long_is_rejected() {
        let long = "x".repeat(129);
        assert!(validate_optional_name("last_name", Some(&long)).is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // External ids
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn external_id_accepts_provider_shapes() {
        assert_eq!(
            validate_external_id("user_id", " user_01HXYZ ").unwrap(),
            "user_01HXYZ"
        );
    }

    #[test]
    fn external_id_rejects_path_characters() {
        for bad in ["../x#", "user/1", "user?x=1", "user%2F", "user 1", "user.1"] {
            assert!(
                matches!(
                    validate_external_id("user_id", bad),
                    Err(ValidationError::InvalidFormat { .. })
                ),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            validate_external_id("user_id", "  "),
            Err(ValidationError::EmptyField { .. })
        ));
        assert!(validate_external_id("user_id", &"a".repeat(65)).is_err());
    }

    proptest! {
        #[test]
        fn normalize_email_is_idempotent(raw in "\\PC{0,40}") {
            let once = normalize_email(&raw);
            prop_assert_eq!(normalize_email(&once), once.clone());
        }

        #[test]
        fn validated_email_is_already_normalized(local in "[a-zA-Z0-9._+]{1,12}", domain in "[a-zA-Z0-9]{1,10}") {
            let raw = format!(" {}@{}.Com ", local, domain);
            if let Ok(email) = validate_email(&raw) {
                prop_assert_eq!(normalize_email(&email), email);
            }
        }

        #[test]
        fn accepted_external_ids_are_single_path_segments(raw in "\\PC{0,24}") {
            if let Ok(id) = validate_external_id("user_id", &raw) {
                prop_assert!(!id.contains(['/', '?', '#', '%', '.']));
            }
        }
    }
}
