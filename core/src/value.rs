use std::fmt;
use std::rc::Rc;

use crate::cast;

// VALUE
// ================================================================================================

/// A dynamic value flowing between blocks.
///
/// Values are produced by reporter blocks, folded out of shadow inputs at cache-build time, and
/// stored in the argument bundles of cached operations. The runtime is single-threaded, so string
/// payloads are shared via [`Rc`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    /// An `{id, name}` bundle for variable, list, and broadcast fields. These are resolved by the
    /// primitive (or by the compiler's inlined accessors), never cast arithmetically.
    Named(Rc<NamedRef>),
}

/// The `{id, name}` payload carried by [`Value::Named`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedRef {
    pub id: Rc<str>,
    pub name: Rc<str>,
}

impl Value {
    /// Returns a string value sharing no allocation with the input.
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Returns a `{id, name}` bundle value.
    pub fn named(id: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Value::Named(Rc::new(NamedRef {
            id: Rc::from(id.as_ref()),
            name: Rc::from(name.as_ref()),
        }))
    }

    /// Returns the `{id, name}` bundle if this value is one.
    pub fn as_named(&self) -> Option<&NamedRef> {
        match self {
            Value::Named(named) => Some(named),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn to_num(&self) -> f64 {
        cast::to_number(self)
    }

    #[inline(always)]
    pub fn to_bool(&self) -> bool {
        cast::to_boolean(self)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Num(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cast::to_text(self))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}
