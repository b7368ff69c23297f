use std::sync::LazyLock;

use regex::Regex;

use shared_models::{MAX_HEALTH_PLAN_CARD_LEN, MIN_HEALTH_PLAN_CARD_LEN};
use shared_utils::text::{digits, squash_whitespace};

use crate::models::{ContactField, IdentityError};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$").expect("static regex")
});

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 120;

pub fn validate_name(raw: &str) -> Result<String, IdentityError> {
    let name = squash_whitespace(raw);
    let len = name.chars().count();

    if len < NAME_MIN_CHARS || len > NAME_MAX_CHARS {
        return Err(IdentityError::invalid(
            ContactField::Name,
            format!("name must have {}-{} characters", NAME_MIN_CHARS, NAME_MAX_CHARS),
        ));
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        return Err(IdentityError::invalid(ContactField::Name, "name must not contain digits"));
    }
    Ok(name)
}

/// Brazilian phone: area code plus 8 or 9 digits.
pub fn validate_phone(raw: &str) -> Result<String, IdentityError> {
    let phone = digits(raw);
    if !(10..=11).contains(&phone.len()) {
        return Err(IdentityError::invalid(ContactField::Phone, "phone must have 10 or 11 digits"));
    }
    Ok(phone)
}

pub fn validate_email(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim().to_lowercase();
    if !EMAIL.is_match(&email) {
        return Err(IdentityError::invalid(ContactField::Email, "invalid e-mail address"));
    }
    Ok(email)
}

/// Letters and digits only, upper-cased; longer input is cut at the column width.
pub fn validate_health_plan_card(raw: &str) -> Result<String, IdentityError> {
    let card: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_HEALTH_PLAN_CARD_LEN)
        .collect::<String>()
        .to_uppercase();
    if card.len() < MIN_HEALTH_PLAN_CARD_LEN {
        return Err(IdentityError::invalid(
            ContactField::HealthPlanCard,
            format!("health plan card must have at least {} letters or digits", MIN_HEALTH_PLAN_CARD_LEN),
        ));
    }
    Ok(card)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn phone_lengths() {
        assert_eq!(validate_phone("(31) 99999-8888").unwrap(), "31999998888");
        assert_eq!(validate_phone("3133334444").unwrap(), "3133334444");
        assert_matches!(
            validate_phone("99999"),
            Err(IdentityError::Invalid { field: ContactField::Phone, .. })
        );
    }

    #[test]
    fn names_and_emails() {
        assert_eq!(validate_name("  Maria   Silva ").unwrap(), "Maria Silva");
        assert!(validate_name("Al").is_err());
        assert!(validate_name("R2D2").is_err());
        assert_eq!(validate_email("Maria@Example.COM").unwrap(), "maria@example.com");
        assert!(validate_email("maria@").is_err());
    }

    #[test]
    fn health_plan_cards() {
        assert_eq!(validate_health_plan_card("uni 1234-56").unwrap(), "UNI123456");
        assert_matches!(
            validate_health_plan_card("12-34"),
            Err(IdentityError::Invalid { field: ContactField::HealthPlanCard, .. })
        );
        assert_eq!(validate_health_plan_card(&"9".repeat(80)).unwrap().len(), 50);
    }
}
