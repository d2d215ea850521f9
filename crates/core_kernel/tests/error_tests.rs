//! Tests for core_kernel error types

use core_kernel::error::CoreError;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Unknown media type `gif`");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Unknown media type `gif`"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_mapping_display() {
    let error = CoreError::mapping("file_size", "int", "text");
    let display = error.to_string();

    assert!(display.contains("file_size"));
    assert!(display.contains("expected int"));
}

#[test]
fn test_core_error_unknown_column() {
    let error = CoreError::unknown_column("Fuel", "colour");

    match &error {
        CoreError::UnknownColumn { entity, column } => {
            assert_eq!(*entity, "Fuel");
            assert_eq!(*column, "colour");
        }
        _ => panic!("Expected UnknownColumn error"),
    }
    assert_eq!(error.to_string(), "Fuel has no column `colour`");
}
