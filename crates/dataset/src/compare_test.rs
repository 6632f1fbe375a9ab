//! Tests for explicit case-sensitivity comparison

use std::cmp::Ordering;

use crate::{compare_str, str_eq};

#[test]
fn test_case_sensitive() {
    assert!(str_eq("SignalID", "SignalID", false));
    assert!(!str_eq("SignalID", "signalid", false));
    assert_eq!(compare_str("B", "a", false), Ordering::Less);
}

#[test]
fn test_ignore_case() {
    assert!(str_eq("SignalID", "signalid", true));
    assert!(str_eq("ÄRGER", "ärger", true));
    assert_eq!(compare_str("B", "a", true), Ordering::Greater);
    assert_eq!(compare_str("abc", "ABCD", true), Ordering::Less);
}
