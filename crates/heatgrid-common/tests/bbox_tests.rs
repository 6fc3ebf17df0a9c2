//! Tests for BoundingBox parsing and validation.

use heatgrid_common::bbox::{BboxParseError, BoundingBox};
use heatgrid_common::HeatgridError;

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_integer() {
    let bbox: BoundingBox = "-80,-180,80,180".parse().unwrap();
    assert_eq!(bbox, BoundingBox::new(-80.0, -180.0, 80.0, 180.0));
}

#[test]
fn test_parse_floating() {
    let bbox = BoundingBox::from_str_coords("24.75,-125.5,50.125,-66.25").unwrap();
    assert!((bbox.start_lat - 24.75).abs() < 0.001);
    assert!((bbox.start_lng - (-125.5)).abs() < 0.001);
    assert!((bbox.end_lat - 50.125).abs() < 0.001);
    assert!((bbox.end_lng - (-66.25)).abs() < 0.001);
}

#[test]
fn test_parse_too_few() {
    let result = BoundingBox::from_str_coords("0,0,10");
    assert!(matches!(result, Err(BboxParseError::InvalidFormat(_))));
}

#[test]
fn test_parse_too_many() {
    let result = BoundingBox::from_str_coords("0,0,10,10,20");
    assert!(matches!(result, Err(BboxParseError::InvalidFormat(_))));
}

#[test]
fn test_parse_invalid_number() {
    let result = BoundingBox::from_str_coords("north,0,10,10");
    assert!(matches!(result, Err(BboxParseError::InvalidNumber(_))));
}

#[test]
fn test_parse_empty_string() {
    let result = BoundingBox::from_str_coords("");
    assert!(matches!(result, Err(BboxParseError::InvalidFormat(_))));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validate_world() {
    assert!(BoundingBox::new(-90.0, -180.0, 90.0, 180.0).validate().is_ok());
}

#[test]
fn test_validate_latitude() {
    let err = BoundingBox::new(0.0, 0.0, 91.0, 10.0).validate().unwrap_err();
    assert_eq!(err.code(), "invalid_bbox");
}

#[test]
fn test_validate_longitude() {
    let result = BoundingBox::new(0.0, -400.0, 10.0, 10.0).validate();
    assert!(matches!(result, Err(HeatgridError::InvalidBbox(_))));
}

#[test]
fn test_validate_infinite() {
    let result = BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0).validate();
    assert!(matches!(result, Err(HeatgridError::InvalidBbox(_))));
}
