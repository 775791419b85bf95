//! Key-path resolution over the JSON tree.
//!
//! Lookups walk slash-separated paths through nested objects and return a
//! [`Cursor`]: the item itself plus enough surrounding context to iterate
//! siblings and report the item's own key. Resolution against the section
//! stack tries the current context first and then every saved ancestor
//! context down to the root, which is what gives sections their inherited
//! scope.

use crate::driver::ValueText;
use crate::tag::Comparator;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Container owning a resolved item, kept for sibling iteration.
#[derive(Debug, Clone, Copy)]
pub enum Parent<'a> {
    Array(&'a Vec<Value>),
    Object(&'a Map<String, Value>),
}

/// A JSON item plus its position within the owning container.
///
/// `name` is the item's key when the parent is an object; the root and array
/// elements are unnamed.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    pub value: &'a Value,
    pub name: Option<&'a str>,
    pub parent: Option<Parent<'a>>,
    pub index: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor for a root value, outside any container.
    pub fn root(value: &'a Value) -> Self {
        Cursor {
            value,
            name: None,
            parent: None,
            index: 0,
        }
    }

    /// The next sibling within the parent container, in document order.
    pub fn next_sibling(&self) -> Option<Cursor<'a>> {
        let index = self.index + 1;
        match self.parent? {
            Parent::Array(items) => items.get(index).map(|value| Cursor {
                value,
                name: None,
                parent: self.parent,
                index,
            }),
            Parent::Object(map) => map.iter().nth(index).map(|(key, value)| Cursor {
                value,
                name: Some(key.as_str()),
                parent: self.parent,
                index,
            }),
        }
    }
}

/// First child of a container value, or `None` for empty containers and
/// scalars.
pub fn first_child(value: &Value) -> Option<Cursor<'_>> {
    match value {
        Value::Array(items) => items.first().map(|child| Cursor {
            value: child,
            name: None,
            parent: Some(Parent::Array(items)),
            index: 0,
        }),
        Value::Object(map) => map.iter().next().map(|(key, child)| Cursor {
            value: child,
            name: Some(key.as_str()),
            parent: Some(Parent::Object(map)),
            index: 0,
        }),
        _ => None,
    }
}

/// Resolve a slash-separated path against one context value.
///
/// Every step requires an object; lookups through arrays or scalars fail.
pub fn find_here<'a>(context: &'a Value, path: &str) -> Option<Cursor<'a>> {
    let mut current = context;
    let mut found: Option<Cursor<'a>> = None;

    for segment in path.split('/') {
        let map = current.as_object()?;
        let (index, key, value) = map
            .iter()
            .enumerate()
            .find_map(|(i, (k, v))| (k == segment).then_some((i, k, v)))?;
        found = Some(Cursor {
            value,
            name: Some(key.as_str()),
            parent: Some(Parent::Object(map)),
            index,
        });
        current = value;
    }

    found
}

/// Lossless textual form of an item, used when it is referenced as a value.
///
/// Strings are borrowed as-is, doubles use the shortest `%.9g`-equivalent
/// form, integers and literals use their standard spelling, and containers
/// serialize to canonical JSON.
pub fn self_value(value: &Value) -> ValueText<'_> {
    match value {
        Value::String(s) => ValueText::Borrowed(s),
        Value::Number(n) if n.is_f64() => {
            ValueText::Owned(format_g9(n.as_f64().unwrap_or_default()))
        }
        Value::Number(n) => ValueText::Owned(n.to_string()),
        Value::Bool(true) => ValueText::Borrowed("true"),
        Value::Bool(false) => ValueText::Borrowed("false"),
        Value::Null => ValueText::Borrowed("null"),
        container => ValueText::Owned(serde_json::to_string(container).unwrap_or_default()),
    }
}

/// Typed three-way comparison of an item against a textual operand.
///
/// Numeric items parse the operand in their own domain; a parse failure
/// compares as equal. Strings compare bytewise. Containers and literals have
/// no ordering and also compare as equal.
pub fn compare(item: &Value, operand: &str) -> Ordering {
    match item {
        Value::Number(n) if n.is_f64() => match operand.parse::<f64>() {
            Ok(rhs) => n
                .as_f64()
                .unwrap_or_default()
                .partial_cmp(&rhs)
                .unwrap_or(Ordering::Equal),
            Err(_) => Ordering::Equal,
        },
        Value::Number(n) if n.is_i64() => match operand.parse::<i64>() {
            Ok(rhs) => n.as_i64().unwrap_or_default().cmp(&rhs),
            Err(_) => Ordering::Equal,
        },
        Value::Number(n) => match operand.parse::<u64>() {
            Ok(rhs) => n.as_u64().unwrap_or_default().cmp(&rhs),
            Err(_) => Ordering::Equal,
        },
        Value::String(s) => s.as_bytes().cmp(operand.as_bytes()),
        _ => Ordering::Equal,
    }
}

/// Apply a comparator to an item, honoring a leading `!` on the operand.
pub fn eval_comparator(item: &Value, operand: &str, comparator: Comparator) -> bool {
    let (negate, operand) = match operand.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, operand),
    };

    let ordering = compare(item, operand);
    let truth = match comparator {
        Comparator::Eq => ordering == Ordering::Equal,
        Comparator::Lt => ordering == Ordering::Less,
        Comparator::Le => ordering != Ordering::Greater,
        Comparator::Gt => ordering == Ordering::Greater,
        Comparator::Ge => ordering != Ordering::Less,
        Comparator::None => false,
    };

    truth != negate
}

/// Shortest-roundtrip decimal formatting equivalent to C's `%.9g`.
///
/// Nine significant digits, positional notation while the exponent fits in
/// [-4, 9), scientific otherwise with a signed two-digit exponent.
pub fn format_g9(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let sci = format!("{:.8e}", v);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();

    if !(-4..9).contains(&exponent) {
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let precision = (8 - exponent).max(0) as usize;
        let fixed = format!("{v:.precision$}");
        if fixed.contains('.') {
            fixed
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            fixed
        }
    }
}
