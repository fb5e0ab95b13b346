use super::{Codec, JsonCodec};
use crate::model::Person;

fn codec() -> JsonCodec<Person> {
    JsonCodec::new()
}

#[test]
fn test_encode_uses_field_names() {
    let body = codec().encode(&Person::new("Ana", "Lopez")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["FirstName"], "Ana");
    assert_eq!(value["LastName"], "Lopez");
}

#[test]
fn test_round_trip() {
    let person = Person::new("Ana", "X");
    let body = codec().encode(&person).unwrap();
    assert_eq!(codec().decode(&body).unwrap(), person);
}

#[test]
fn test_decode_ignores_field_order_and_accepts_camel_case() {
    let person = codec()
        .decode(br#"{"lastName":"Lopez","firstName":"Ana"}"#)
        .unwrap();
    assert_eq!(person, Person::new("Ana", "Lopez"));
}

#[test]
fn test_decode_rejects_malformed_input() {
    let inputs: [&[u8]; 6] = [
        b"",
        b"not json",
        b"{\"FirstName\":\"Ana\"",
        b"[\"Ana\",\"Lopez\"]",
        &[0xff, 0xfe, 0x00],
        b"42",
    ];
    for input in inputs {
        assert!(codec().decode(input).is_err(), "decoded {input:?}");
    }
}

#[test]
fn test_decode_null_is_an_error() {
    assert!(codec().decode(b"null").is_err());
}

#[test]
fn test_decode_missing_fields_is_an_error() {
    assert!(codec().decode(b"{}").is_err());
    assert!(codec().decode(br#"{"FirstName":"Ana"}"#).is_err());
    assert!(codec().decode(br#"{"FirstName":"Ana","LastName":null}"#).is_err());
}

#[test]
fn test_decode_keeps_empty_strings_for_validation() {
    // Present-but-empty is a processing concern, not a decode failure.
    let person = codec()
        .decode(br#"{"FirstName":"","LastName":""}"#)
        .unwrap();
    assert_eq!(person, Person::new("", ""));
}
