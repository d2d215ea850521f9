//! Unit tests for entity identifiers

use core_kernel::{EntityId, Value};

#[test]
fn test_new_and_value() {
    let id = EntityId::new(17);
    assert_eq!(id.value(), 17);
    assert!(id.is_assigned());
    assert_eq!(id.assigned(), Some(id));
}

#[test]
fn test_display_is_plain_number() {
    assert_eq!(EntityId::new(5).to_string(), "5");
}

#[test]
fn test_round_trip_through_string() {
    let id = EntityId::new(9001);
    let parsed: EntityId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn test_i64_conversions() {
    let id = EntityId::from(12);
    let raw: i64 = id.into();
    assert_eq!(raw, 12);
}

#[test]
fn test_converts_to_int_value() {
    assert_eq!(Value::from(EntityId::new(3)), Value::Int(3));
    assert_eq!(Value::from(None::<EntityId>), Value::Null);
}

#[test]
fn test_serde_is_transparent() {
    let json = serde_json::to_string(&EntityId::new(8)).unwrap();
    assert_eq!(json, "8");
    let back: EntityId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, EntityId::new(8));
}

#[test]
fn test_ordering_follows_value() {
    assert!(EntityId::new(1) < EntityId::new(2));
    assert!(EntityId::UNASSIGNED < EntityId::new(1));
}
