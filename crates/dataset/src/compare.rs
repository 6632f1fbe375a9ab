//! String comparison with an explicit case-sensitivity flag
//!
//! Lookups that must tolerate case differences (document field names, table
//! names supplied by external tools) pass the flag at the call site instead of
//! relying on any process-wide comparer.

use std::cmp::Ordering;

/// Compare two strings, optionally ignoring ASCII and Unicode case
pub fn compare_str(a: &str, b: &str, ignore_case: bool) -> Ordering {
    if !ignore_case {
        return a.cmp(b);
    }

    let mut left = a.chars().flat_map(char::to_lowercase);
    let mut right = b.chars().flat_map(char::to_lowercase);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match l.cmp(&r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Equality form of [`compare_str`]
#[inline]
pub fn str_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.eq_ignore_ascii_case(b) || compare_str(a, b, true).is_eq()
    } else {
        a == b
    }
}
