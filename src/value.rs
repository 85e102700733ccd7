//! Runtime values for the Monkey VM.
//!
//! The [`Value`] enum is the central representation of all data at runtime.
//! Scalars (`Integer`, `Boolean`, `Null`) are stored inline; strings and
//! aggregates are behind [`Rc`] so the stack, the globals vector, and closure
//! capture lists can share them without copying.  Nothing mutates a value
//! after construction — re-binding a slot replaces the whole value — so
//! reference counting is all the memory management the VM needs.
//!
//! # Hash keys
//!
//! Only integers, booleans, and strings are usable as hash keys.  A
//! [`HashKey`] is a (type tag, value) projection of the key, so two distinct
//! constructions of the same string hash identically; the original key
//! object is kept alongside the value in a [`HashPair`] so a hash can print
//! itself.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::Instructions;

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A runtime value in the Monkey VM.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// Immutable UTF-8 string.
    Str(Rc<str>),
    /// The null value.
    Null,
    /// An ordered sequence of values.
    Array(Rc<Vec<Value>>),
    /// A hash map from hashable keys to key/value pairs.
    Hash(Rc<HashMap<HashKey, HashPair>>),
    /// A compiled function body (only ever seen in the constant pool; at
    /// runtime it is always wrapped in a [`Closure`]).
    Function(Rc<CompiledFunction>),
    /// A compiled function plus its captured free variables.
    Closure(Rc<Closure>),
    /// A builtin, by index into [`crate::builtins::BUILTINS`].
    Builtin(usize),
}

/// A key/value pair stored in a hash; `key` is the original key object.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// The bytecode and frame layout of one compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Number of local slots to reserve above the arguments.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A function together with the values it captured at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    /// Captured free variables, in `OpGetFree` index order.
    pub free: Vec<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hash keys
// ─────────────────────────────────────────────────────────────────────────────

/// A hashable projection of a [`Value`]: the type tag plus the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(Rc<str>),
}

impl Value {
    /// The hash key for this value, or `None` if the type is unusable as a
    /// hash key.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::Boolean(b) => Some(HashKey::Boolean(*b)),
            Value::Str(s) => Some(HashKey::Str(s.clone())),
            _ => None,
        }
    }

    /// The type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
        }
    }
}

// Structural equality for scalars and aggregates; functions and closures
// compare by identity.  The VM's `==` operator has its own, narrower rules —
// this impl serves the API surface and the tests.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// The inspect form shown by the REPL and printed by `puts`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
        }
    }
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    /// Build an array value.
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(elements))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::string("hello").to_string(), "hello");
        assert_eq!(
            Value::array(vec![Value::Integer(1), Value::Integer(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_hash_keys_by_value() {
        let hello1 = Value::string("Hello World");
        let hello2 = Value::string("Hello World");
        let diff = Value::string("My name is johnny");
        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());

        // Same payload, different type tag: never equal.
        assert_ne!(
            Value::Integer(1).hash_key(),
            Value::Boolean(true).hash_key()
        );
    }

    #[test]
    fn test_unhashable_types() {
        assert!(Value::array(vec![]).hash_key().is_none());
        assert!(Value::Null.hash_key().is_none());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Integer(1), Value::Integer(1));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        assert_ne!(Value::Integer(1), Value::Boolean(true));
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_eq!(
            Value::array(vec![Value::Integer(1)]),
            Value::array(vec![Value::Integer(1)])
        );
    }
}
