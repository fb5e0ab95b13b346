use super::{Person, Validate};
use crate::utils::error::ValidationError;

#[test]
fn test_required_fields() {
    assert!(Person::new("Ana", "X").ensure_required().is_ok());
    assert_eq!(
        Person::new("", "Smith").ensure_required(),
        Err(ValidationError::Required("First Name"))
    );
    assert_eq!(
        Person::new("Ana", "").ensure_required(),
        Err(ValidationError::Required("Last Name"))
    );
}

#[test]
fn test_consumer_rule_accepts_short_names() {
    // Length bounds are enforced on entry, not on consumption.
    assert!(Person::new("Ana", "X").ensure_valid().is_ok());
}

#[test]
fn test_validate_length_bounds() {
    assert!(Person::new("Al", "Bo").validate().is_ok());
    assert!(Person::new("A".repeat(50), "Smith").validate().is_ok());

    match Person::new("Ana", "X").validate() {
        Err(ValidationError::Length { field, min, max }) => {
            assert_eq!(field, "Last Name");
            assert_eq!((min, max), (2, 50));
        }
        other => panic!("Expected length error, got {other:?}"),
    }
    assert!(Person::new("A".repeat(51), "Smith").validate().is_err());
}

#[test]
fn test_validate_counts_characters_not_bytes() {
    // Two characters, four bytes.
    assert!(Person::new("Éé", "Öö").validate().is_ok());
}

#[test]
fn test_validate_reports_required_before_length() {
    assert_eq!(
        Person::new("", "X").validate(),
        Err(ValidationError::Required("First Name"))
    );
}

#[test]
fn test_full_name() {
    assert_eq!(Person::new("Ana", "Lopez").full_name(), "Ana Lopez");
}

#[test]
fn test_message_type_strings() {
    use super::MessageType;

    assert_eq!(MessageType::Vip.to_string(), "VIP");
    assert_eq!("Regular".parse::<MessageType>(), Ok(MessageType::Regular));
    assert!("vip".parse::<MessageType>().is_err());
}
