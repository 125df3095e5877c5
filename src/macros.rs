// ============================================================================
// digest-scope - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// This reduces the boilerplate of manually cloning `Rc` handles before
/// moving them into a watch listener.
///
/// # Usage
///
/// ```rust
/// use digest_scope::{cloned, Scope};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let scope = Scope::new_root();
/// let calls = Rc::new(Cell::new(0));
///
/// scope.watch(
///     |s| s.get("a"),
///     cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
/// );
/// scope.digest().unwrap();
/// assert_eq!(calls.get(), 1);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Build a `Value::Array` from anything convertible into `Value`.
///
/// # Usage
///
/// ```rust
/// use digest_scope::{array, Value};
///
/// let items = array![1, "two", true];
/// assert_eq!(items.as_array().map(|a| a.len()), Some(3));
/// assert_eq!(array![], Value::from(Vec::<Value>::new()));
/// ```
#[macro_export]
macro_rules! array {
    () => {
        $crate::Value::Array($crate::Array::new())
    };
    ($($item:expr),+ $(,)?) => {
        $crate::Value::Array($crate::Array::from_vec(vec![
            $( $crate::Value::from($item) ),+
        ]))
    };
}

/// Build a `Value::Object` from `key => value` pairs, keeping their order.
///
/// # Usage
///
/// ```rust
/// use digest_scope::{object, Value};
///
/// let user = object! { "name" => "Jill", "age" => 30 };
/// let age = user.as_object().map(|o| o.get("age"));
/// assert_eq!(age, Some(Value::from(30)));
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::Value::Object($crate::Object::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let object = $crate::Object::new();
            $( object.insert($key, $crate::Value::from($value)); )+
            $crate::Value::Object(object)
        }
    };
}

/// Build the `Vec<WatchFn>` taken by `Scope::watch_group`.
///
/// # Usage
///
/// ```rust
/// use digest_scope::{watch_fns, Scope};
///
/// let scope = Scope::new_root();
/// let fns = watch_fns![|s| s.get("a"), |s| s.get("b")];
/// scope.watch_group(fns, |_, _, _| {});
/// ```
#[macro_export]
macro_rules! watch_fns {
    ($($f:expr),* $(,)?) => {
        vec![ $( $crate::watch_fn($f) ),* ]
    };
}
