//! Native functions callable from scripts.
//!
//! A [`BuiltinRegistry`] maps names to `Fn(&[Value]) -> Result<Value, RuntimeError>`.
//! User-defined functions shadow builtins of the same name.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorKind, RuntimeError};
use crate::value::Value;

pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    functions: HashMap<String, NativeFn>,
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry").field("functions", &self.names()).finish()
    }
}

impl BuiltinRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard prelude.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("len", len);
        registry.register("type", |args| Ok(Value::from(type_of(args.first()))));
        registry.register("str", |args| {
            Ok(Value::String(args.first().map(Value::as_string).unwrap_or_default()))
        });
        registry.register("num", num);
        registry.register("int", |args| Ok(Value::Number(number(args, 0, "int")?.trunc())));
        registry.register("abs", |args| Ok(Value::Number(number(args, 0, "abs")?.abs())));
        registry.register("floor", |args| Ok(Value::Number(number(args, 0, "floor")?.floor())));
        registry.register("ceil", |args| Ok(Value::Number(number(args, 0, "ceil")?.ceil())));
        registry.register("round", |args| Ok(Value::Number(number(args, 0, "round")?.round())));
        registry.register("min", |args| extreme(args, "min", f64::min));
        registry.register("max", |args| extreme(args, "max", f64::max));
        registry.register("upper", |args| Ok(Value::String(string(args, 0, "upper")?.to_uppercase())));
        registry.register("lower", |args| Ok(Value::String(string(args, 0, "lower")?.to_lowercase())));
        registry.register("trim", |args| Ok(Value::from(string(args, 0, "trim")?.trim())));
        registry.register("split", split);
        registry.register("join", join);
        registry.register("contains", contains);
        registry.register("keys", keys);
        registry.register("values", values);
        registry.register("push", push);
        registry.register("range", range);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    {
        self.functions.insert(name.into(), Rc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn type_of(value: Option<&Value>) -> &'static str {
    value.map_or("null", Value::type_name)
}

fn number(args: &[Value], i: usize, name: &str) -> Result<f64, RuntimeError> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(RuntimeError::type_mismatch(format!(
            "{}() expects a number, got {}",
            name,
            type_of(other)
        ))),
    }
}

fn string<'a>(args: &'a [Value], i: usize, name: &str) -> Result<&'a str, RuntimeError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s),
        other => Err(RuntimeError::type_mismatch(format!(
            "{}() expects a string, got {}",
            name,
            type_of(other)
        ))),
    }
}

fn array<'a>(args: &'a [Value], i: usize, name: &str) -> Result<&'a Vec<Value>, RuntimeError> {
    match args.get(i) {
        Some(Value::Array(items)) => Ok(items),
        other => Err(RuntimeError::type_mismatch(format!(
            "{}() expects an array, got {}",
            name,
            type_of(other)
        ))),
    }
}

fn len(args: &[Value]) -> Result<Value, RuntimeError> {
    let n = match args.first() {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(fields)) => fields.len(),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "len() expects a string, array or object, got {}",
                type_of(other)
            )))
        }
    };
    Ok(Value::Number(n as f64))
}

fn num(args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Bool(b)) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        Some(other) => other.as_number().map(Value::Number).ok_or_else(|| {
            RuntimeError::type_mismatch(format!("num() cannot convert {:?}", other.as_string()))
        }),
        None => Err(RuntimeError::type_mismatch("num() expects an argument")),
    }
}

fn extreme(args: &[Value], name: &str, pick: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    // Either a single array argument or the numbers themselves
    let items: &[Value] = match args {
        [Value::Array(items)] => items,
        _ => args,
    };
    let mut best: Option<f64> = None;
    for item in items {
        let n = match item {
            Value::Number(n) => *n,
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "{}() expects numbers, got {}",
                    name,
                    other.type_name()
                )))
            }
        };
        best = Some(best.map_or(n, |b| pick(b, n)));
    }
    Ok(best.map_or(Value::Null, Value::Number))
}

fn split(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = string(args, 0, "split")?;
    let parts: Vec<Value> = match args.get(1) {
        None | Some(Value::Null) => s.split_whitespace().map(Value::from).collect(),
        Some(sep) => {
            let sep = sep.as_string();
            if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::from).collect()
            }
        }
    };
    Ok(Value::Array(parts))
}

fn join(args: &[Value]) -> Result<Value, RuntimeError> {
    let items = array(args, 0, "join")?;
    let sep = args.get(1).map(Value::as_string).unwrap_or_default();
    let joined = items.iter().map(Value::as_string).collect::<Vec<_>>().join(&sep);
    Ok(Value::String(joined))
}

fn contains(args: &[Value]) -> Result<Value, RuntimeError> {
    let needle = args.get(1);
    let text = needle.map(Value::as_string).unwrap_or_default();
    let found = match args.first() {
        Some(Value::Array(items)) => items.iter().any(|item| Some(item) == needle),
        Some(Value::String(s)) => s.contains(text.as_str()),
        Some(Value::Object(fields)) => fields.contains_key(text.as_str()),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "contains() cannot search a {}",
                type_of(other)
            )))
        }
    };
    Ok(Value::Bool(found))
}

fn keys(args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Object(fields)) => {
            Ok(Value::Array(fields.keys().map(|k| Value::from(k.as_str())).collect()))
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "keys() expects an object, got {}",
            type_of(other)
        ))),
    }
}

fn values(args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Object(fields)) => Ok(Value::Array(fields.values().cloned().collect())),
        other => Err(RuntimeError::type_mismatch(format!(
            "values() expects an object, got {}",
            type_of(other)
        ))),
    }
}

/// Returns a new array; values are copied, so the argument is left untouched.
fn push(args: &[Value]) -> Result<Value, RuntimeError> {
    let mut items = array(args, 0, "push")?.clone();
    items.extend(args.iter().skip(1).cloned());
    Ok(Value::Array(items))
}

const MAX_RANGE: f64 = 1_000_000.0;

fn range(args: &[Value]) -> Result<Value, RuntimeError> {
    let (start, end) = match args.len() {
        0 | 1 => (0.0, number(args, 0, "range")?),
        _ => (number(args, 0, "range")?, number(args, 1, "range")?),
    };
    let (start, end) = (start.trunc(), end.trunc());
    if end - start > MAX_RANGE {
        return Err(RuntimeError::new(
            ErrorKind::IndexOutOfRange,
            format!("range() of {} elements is too large", end - start),
        ));
    }
    let mut items = Vec::new();
    let mut n = start;
    while n < end {
        items.push(Value::Number(n));
        n += 1.0;
    }
    Ok(Value::Array(items))
}
