//! Tag-expression parsing.
//!
//! A tag body combines a key path with an optional comparison operand.
//! Dotted navigation becomes slash-separated path segments, a backslash
//! escapes the following character, and `~0`/`~1` address keys containing a
//! literal `~` or `/` when the JSON-pointer dialect is enabled. The extension
//! operators `=`, `<`, `<=`, `>`, `>=` split off an operand and stop the
//! scan; a `*` requests object iteration. Operators whose dialect flag is not
//! set pass through into the path verbatim.

use crate::Flags;

/// Comparison requested by a tag expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    None,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed tag body: slash-separated key path plus optional operand.
///
/// The operand keeps a leading `!`; negation is applied at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagExpr {
    pub path: String,
    pub operand: Option<String>,
    pub comparator: Comparator,
}

/// Translate a raw tag body into a [`TagExpr`] under the given dialect.
pub fn parse_tag(body: &str, flags: Flags) -> TagExpr {
    let mut path = String::with_capacity(body.len());
    let mut comparator = Comparator::None;
    let mut operand: Option<String> = None;

    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '.' => path.push('/'),
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    path.push(escaped);
                }
            }
            '~' if flags.contains(Flags::JSON_POINTER) => match chars.clone().next() {
                Some((_, '1')) => {
                    chars.next();
                    path.push('/');
                }
                Some((_, '0')) => {
                    chars.next();
                    path.push('~');
                }
                _ => path.push('~'),
            },
            '*' if flags.contains(Flags::OBJECT_ITER) => {
                operand = Some("*".to_string());
                break;
            }
            '=' if flags.contains(Flags::EQUAL) => {
                comparator = Comparator::Eq;
                operand = Some(body[idx + 1..].to_string());
                break;
            }
            '<' | '>' if flags.contains(Flags::COMPARE) => {
                let mut rest = idx + 1;
                comparator = if c == '<' { Comparator::Lt } else { Comparator::Gt };
                if body[rest..].starts_with('=') {
                    comparator = if c == '<' { Comparator::Le } else { Comparator::Ge };
                    rest += 1;
                }
                operand = Some(body[rest..].to_string());
                break;
            }
            other => path.push(other),
        }
    }

    TagExpr {
        path,
        operand,
        comparator,
    }
}
