//! Built-in functions for the Monkey VM.
//!
//! Builtins live in a fixed, index-addressable registry: the compiler
//! pre-defines each name at its registry index, `OpGetBuiltin` pushes the
//! index, and the VM dispatches `OpCall` on it straight into the Rust
//! function.  The registry order is part of the bytecode contract — changing
//! it invalidates previously compiled programs.
//!
//! Every builtin enforces its arity strictly and errors on argument types it
//! does not support.  Array-consuming builtins never mutate their argument;
//! `rest` and `push` return fresh arrays.

use crate::value::Value;

/// The type signature of a builtin: arguments in, value (or error) out.
pub type BuiltinFn = fn(args: &[Value]) -> Result<Value, String>;

/// One registry entry.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The registry.  Index order is fixed (see module docs).
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "puts", func: builtin_puts },
    Builtin { name: "first", func: builtin_first },
    Builtin { name: "last", func: builtin_last },
    Builtin { name: "rest", func: builtin_rest },
    Builtin { name: "push", func: builtin_push },
];

fn check_arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() != want {
        return Err(format!(
            "wrong number of arguments. got={}, want={want}",
            args.len()
        ));
    }
    Ok(())
}

/// `len(x)` — byte length of a string, or element count of an array.
fn builtin_len(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
        Value::Array(elements) => Ok(Value::Integer(elements.len() as i64)),
        other => Err(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

/// `puts(args…)` — print each argument's display form on its own line.
fn builtin_puts(args: &[Value]) -> Result<Value, String> {
    for arg in args {
        println!("{arg}");
    }
    Ok(Value::Null)
}

/// `first(arr)` — the first element, or null for an empty array.
fn builtin_first(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => Ok(elements.first().cloned().unwrap_or(Value::Null)),
        other => Err(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `last(arr)` — the last element, or null for an empty array.
fn builtin_last(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => Ok(elements.last().cloned().unwrap_or(Value::Null)),
        other => Err(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `rest(arr)` — a new array of everything but the first element, or null
/// for an empty array.
fn builtin_rest(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::array(elements[1..].to_vec()))
            }
        }
        other => Err(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `push(arr, x)` — a new array with `x` appended; the original is untouched.
fn builtin_push(args: &[Value]) -> Result<Value, String> {
    check_arity(args, 2)?;
    match &args[0] {
        Value::Array(elements) => {
            let mut appended = elements.as_ref().clone();
            appended.push(args[1].clone());
            Ok(Value::array(appended))
        }
        other => Err(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
