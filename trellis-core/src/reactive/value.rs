//! Dynamic Value Model
//!
//! The reactive engine and the renderer operate on loosely-typed data:
//! component props, reactive state fields, provide/inject payloads and
//! event-handler arguments. `Value` is the tagged union that carries all
//! of them.
//!
//! Equality is structural for plain data and *identity-based* for callbacks
//! and stores. Prop diffing relies on this: handing the renderer the same
//! `Callback` twice is "unchanged", a freshly built one is "changed".

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;

use super::store::Store;

/// An ordered string-keyed aggregate, the shape of props and state.
pub type Fields = IndexMap<String, Value>;

/// A callable value: event handlers, slot payload producers, lazy inject
/// defaults.
///
/// Compared by pointer identity, like function values in the host language
/// the runtime embeds into.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a callback that has no meaningful return value.
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self(Arc::new(move |args| {
            f(args);
            Value::Null
        }))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback")
    }
}

/// A dynamically typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Fields),
    /// A nested reactive aggregate. Compared by store identity.
    Store(Store),
    Func(Callback),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Callback> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&Store> {
        match self {
            Value::Store(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as display text, the way text interpolation does.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Map(_) | Value::Store(_) | Value::Func(_) => {
                format!("{self:?}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Store> for Value {
    fn from(v: Store) -> Self {
        Value::Store(v)
    }
}

impl From<Callback> for Value {
    fn from(v: Callback) -> Self {
        Value::Func(v)
    }
}

/// The write gate: a store field is only re-written (and its subscribers
/// only triggered) when the new value actually differs.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    old != new
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_for_plain_values() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from("a"), Value::Null);
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let a = Callback::new(|_| Value::Null);
        let b = Callback::new(|_| Value::Null);

        assert_eq!(Value::Func(a.clone()), Value::Func(a.clone()));
        assert_ne!(Value::Func(a), Value::Func(b));
    }

    #[test]
    fn has_changed_gate() {
        assert!(!has_changed(&Value::Int(3), &Value::Int(3)));
        assert!(has_changed(&Value::Int(3), &Value::Int(4)));
        assert!(has_changed(&Value::Null, &Value::Int(0)));
    }

    #[test]
    fn display_text() {
        assert_eq!(Value::Int(42).display(), "42");
        assert_eq!(Value::from("hi").display(), "hi");
        assert_eq!(Value::Null.display(), "");
    }
}
