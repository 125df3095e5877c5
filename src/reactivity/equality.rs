// ============================================================================
// digest-scope - Equality Functions
// The two comparison policies used by watchers
// ============================================================================
//
// Reference watchers compare by identity: scalars by value, containers by
// pointer. Value watchers compare structurally. In both policies NaN equals
// NaN, otherwise a watcher returning NaN would never stabilize.
// ============================================================================

use crate::core::types::{Array, Object, Value};

// =============================================================================
// SAFE FLOAT EQUALITY
// =============================================================================

/// Safe not-equal check for f64.
/// Handles NaN correctly: NaN == NaN returns true (unlike IEEE 754).
///
/// # Example
/// ```
/// use digest_scope::reactivity::equality::safe_not_equal_f64;
///
/// assert!(safe_not_equal_f64(&1.0, &2.0));
/// assert!(!safe_not_equal_f64(&1.0, &1.0));
/// assert!(!safe_not_equal_f64(&f64::NAN, &f64::NAN));
/// assert!(safe_not_equal_f64(&f64::NAN, &1.0));
/// ```
pub fn safe_not_equal_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return !b.is_nan();
    }
    a != b
}

/// Safe equality for f64 values.
/// Handles NaN correctly: NaN == NaN returns true.
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    !safe_not_equal_f64(a, b)
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Identity comparison.
///
/// Scalars compare by value (NaN equals NaN); arrays and objects are equal
/// only when they are the same container.
///
/// # Example
/// ```
/// use digest_scope::reactivity::equality::identical;
/// use digest_scope::{array, Value};
///
/// let a = array![1, 2];
/// let b = array![1, 2];
/// assert!(identical(&a, &a.clone()));
/// assert!(!identical(&a, &b));
/// assert!(identical(&Value::from(f64::NAN), &Value::from(f64::NAN)));
/// ```
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => safe_equals_f64(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        _ => false,
    }
}

// =============================================================================
// DEEP EQUALITY
// =============================================================================

/// Structural comparison.
///
/// Arrays compare element-wise, objects key-wise (key order is ignored),
/// scalars as in `identical`. Cyclic values are supported: a pair of
/// containers already under comparison is assumed equal.
///
/// # Example
/// ```
/// use digest_scope::reactivity::equality::deep_equals;
/// use digest_scope::{array, object};
///
/// assert!(deep_equals(&array![1, 2, 3], &array![1, 2, 3]));
/// assert!(deep_equals(
///     &object! { "a" => 1, "b" => 2 },
///     &object! { "b" => 2, "a" => 1 },
/// ));
/// assert!(!deep_equals(&array![1, 2], &array![1, 2, 3]));
/// ```
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    let mut in_progress = Vec::new();
    deep_equals_with(a, b, &mut in_progress)
}

type PtrPair = (*const (), *const ());

fn deep_equals_with(a: &Value, b: &Value, in_progress: &mut Vec<PtrPair>) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let pair = (a.as_ptr(), b.as_ptr());
            if in_progress.contains(&pair) {
                return true;
            }
            in_progress.push(pair);
            let equal = arrays_equal(a, b, in_progress);
            in_progress.pop();
            equal
        }
        (Value::Object(a), Value::Object(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let pair = (a.as_ptr(), b.as_ptr());
            if in_progress.contains(&pair) {
                return true;
            }
            in_progress.push(pair);
            let equal = objects_equal(a, b, in_progress);
            in_progress.pop();
            equal
        }
        _ => identical(a, b),
    }
}

fn arrays_equal(a: &Array, b: &Array, in_progress: &mut Vec<PtrPair>) -> bool {
    // Snapshots, so no borrow is held while recursing into aliased containers.
    let left = a.to_vec();
    let right = b.to_vec();
    left.len() == right.len()
        && left
            .iter()
            .zip(&right)
            .all(|(x, y)| deep_equals_with(x, y, in_progress))
}

fn objects_equal(a: &Object, b: &Object, in_progress: &mut Vec<PtrPair>) -> bool {
    let left = a.entries();
    let right = b.borrow().clone();
    left.len() == right.len()
        && left.iter().all(|(key, x)| match right.get(key) {
            Some(y) => deep_equals_with(x, y, in_progress),
            None => false,
        })
}

// =============================================================================
// WATCH POLICY
// =============================================================================

/// The comparison a watcher uses: deep when `value_eq`, identity otherwise.
pub fn are_equal(new_value: &Value, old_value: &Value, value_eq: bool) -> bool {
    if value_eq {
        deep_equals(new_value, old_value)
    } else {
        identical(new_value, old_value)
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Undefined),
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<f64>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::vec(("[a-d]", inner), 0..4).prop_map(|entries| {
                    let object = Object::new();
                    for (key, value) in entries {
                        object.insert(key, value);
                    }
                    Value::Object(object)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn deep_equality_is_reflexive(v in value()) {
            prop_assert!(deep_equals(&v, &v));
        }

        #[test]
        fn deep_clone_is_deep_equal(v in value()) {
            prop_assert!(deep_equals(&v, &v.deep_clone()));
        }

        #[test]
        fn deep_equality_is_symmetric(a in value(), b in value()) {
            prop_assert_eq!(deep_equals(&a, &b), deep_equals(&b, &a));
        }

        #[test]
        fn identity_implies_deep_equality(a in value(), b in value()) {
            if identical(&a, &b) {
                prop_assert!(deep_equals(&a, &b));
            }
        }

        #[test]
        fn shallow_clone_of_container_is_not_identical(v in value()) {
            let copy = v.shallow_clone();
            match v {
                Value::Array(_) | Value::Object(_) => prop_assert!(!identical(&v, &copy)),
                _ => prop_assert!(identical(&v, &copy)),
            }
            prop_assert!(deep_equals(&v, &copy));
        }
    }
}
