//! Generic Mustache template processor.
//!
//! Walks the template text, tracks the active delimiters and the lexical
//! section stack, and drives a [`TemplateHooks`] implementation through the
//! seven-method callback contract. Skipped regions (a section whose `enter`
//! declined, or the body of an inverted section that entered) are still
//! parsed, with nested sections counted and close-tag names validated, but
//! no data callbacks run and nothing is emitted. Partial text is processed
//! recursively with the delimiters active at the inclusion point.

use crate::error::RenderError;
use crate::registry::PartialPayload;
use crate::{Flags, MAX_DEPTH, MAX_TAG_LENGTH};
use std::sync::Arc;

/// Text handed back by `get`/`partial`: borrowed from the JSON tree, owned
/// by the callback, or shared out of the partial cache.
pub enum ValueText<'a> {
    Borrowed(&'a str),
    Owned(String),
    Shared(Arc<PartialPayload>),
}

impl ValueText<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            ValueText::Borrowed(s) => s,
            ValueText::Owned(s) => s,
            ValueText::Shared(payload) => payload.text(),
        }
    }
}

/// The callback contract between the driver and the render state machine.
///
/// The lifetime ties borrowed return values to the JSON tree rather than to
/// the hook object, so a returned string can outlive the `&mut self` call.
pub(crate) trait TemplateHooks<'a> {
    fn start(&mut self) -> Result<(), RenderError>;
    fn enter(&mut self, name: &str) -> Result<bool, RenderError>;
    fn next(&mut self) -> Result<bool, RenderError>;
    fn leave(&mut self) -> Result<(), RenderError>;
    fn get(&mut self, name: &str) -> Result<ValueText<'a>, RenderError>;
    fn partial(&mut self, name: &str) -> Result<ValueText<'a>, RenderError>;
    fn emit(&mut self, text: &str, escape: bool) -> Result<(), RenderError>;
}

/// Render one template through `hooks`.
pub(crate) fn process<'a, H: TemplateHooks<'a>>(
    template: &str,
    hooks: &mut H,
    flags: Flags,
) -> Result<(), RenderError> {
    hooks.start()?;
    process_fragment(template, hooks, flags, "{{", "}}", 0)
}

/// One open section in the lexical stack.
struct Frame<'t> {
    name: &'t str,
    resume: usize,
    entered: bool,
    was_enabled: bool,
}

enum TagKind {
    Variable { escape: bool },
    SectionOpen { inverted: bool },
    SectionClose,
    Partial,
    Comment,
}

fn process_fragment<'a, H: TemplateHooks<'a>>(
    template: &str,
    hooks: &mut H,
    flags: Flags,
    open: &str,
    close: &str,
    partial_depth: usize,
) -> Result<(), RenderError> {
    let mut open = open.to_string();
    let mut close = close.to_string();
    let mut stack: Vec<Frame<'_>> = Vec::new();
    let mut enabled = true;
    let mut pos = 0;

    loop {
        let Some(found) = template[pos..].find(open.as_str()) else {
            if enabled && pos < template.len() {
                hooks.emit(&template[pos..], false)?;
            }
            return if stack.is_empty() {
                Ok(())
            } else {
                Err(RenderError::UnexpectedEnd)
            };
        };

        let tag_open = pos + found;
        if enabled && tag_open > pos {
            hooks.emit(&template[pos..tag_open], false)?;
        }

        let body_start = tag_open + open.len();
        let rest = &template[body_start..];

        // `{` tags close with `}` plus the closing delimiter.
        let (body, after) = if rest.starts_with('{') {
            let brace_close = format!("}}{close}");
            match rest[1..].find(&brace_close) {
                Some(end) => (&rest[1..1 + end], body_start + 1 + end + brace_close.len()),
                None => {
                    return Err(if rest.find(close.as_str()).is_some() {
                        RenderError::BadUnescape
                    } else {
                        RenderError::UnexpectedEnd
                    });
                }
            }
        } else {
            match rest.find(close.as_str()) {
                Some(end) => (&rest[..end], body_start + end + close.len()),
                None => return Err(RenderError::UnexpectedEnd),
            }
        };
        pos = after;

        // Delimiter changes and comments are lexical: they apply even inside
        // skipped regions.
        if let Some(inner) = body.strip_prefix('=') {
            let Some(inner) = inner.strip_suffix('=') else {
                return Err(RenderError::BadSeparators);
            };
            let parts: Vec<&str> = inner.split_whitespace().collect();
            let &[new_open, new_close] = parts.as_slice() else {
                return Err(RenderError::BadSeparators);
            };
            open = new_open.to_string();
            close = new_close.to_string();
            continue;
        }

        let (kind, raw_name) = if rest.starts_with('{') {
            (TagKind::Variable { escape: false }, body)
        } else {
            match body.chars().next() {
                Some('!') => (TagKind::Comment, ""),
                Some('#') => (TagKind::SectionOpen { inverted: false }, &body[1..]),
                Some('^') => (TagKind::SectionOpen { inverted: true }, &body[1..]),
                Some('/') => (TagKind::SectionClose, &body[1..]),
                Some('>') => (TagKind::Partial, &body[1..]),
                Some('&') => (TagKind::Variable { escape: false }, &body[1..]),
                Some(':') if flags.contains(Flags::COLON) => {
                    (TagKind::Variable { escape: true }, &body[1..])
                }
                _ => (TagKind::Variable { escape: true }, body),
            }
        };

        if matches!(kind, TagKind::Comment) {
            continue;
        }

        let name = raw_name.trim();
        if name.len() > MAX_TAG_LENGTH {
            return Err(RenderError::TagTooLong);
        }
        if name.is_empty() && !flags.contains(Flags::EMPTY_TAG) {
            return Err(RenderError::EmptyTag);
        }

        match kind {
            TagKind::SectionOpen { inverted } => {
                if stack.len() >= MAX_DEPTH {
                    return Err(RenderError::TooDeep);
                }
                let entered = if enabled { hooks.enter(name)? } else { false };
                stack.push(Frame {
                    name,
                    resume: pos,
                    entered,
                    was_enabled: enabled,
                });
                if entered == inverted {
                    enabled = false;
                }
            }
            TagKind::SectionClose => {
                let Some(frame) = stack.pop() else {
                    return Err(RenderError::BadClose);
                };
                if frame.name != name {
                    return Err(RenderError::BadClose);
                }
                let again = if enabled && frame.entered {
                    hooks.next()?
                } else {
                    false
                };
                if again {
                    pos = frame.resume;
                    stack.push(frame);
                } else {
                    enabled = frame.was_enabled;
                    if enabled && frame.entered {
                        hooks.leave()?;
                    }
                }
            }
            TagKind::Partial => {
                if enabled {
                    if partial_depth >= MAX_DEPTH {
                        return Err(RenderError::TooDeep);
                    }
                    let text = hooks.partial(name)?;
                    process_fragment(
                        text.as_str(),
                        hooks,
                        flags,
                        &open,
                        &close,
                        partial_depth + 1,
                    )?;
                }
            }
            TagKind::Variable { escape } => {
                if enabled {
                    let text = hooks.get(name)?;
                    hooks.emit(text.as_str(), escape)?;
                }
            }
            TagKind::Comment => {}
        }
    }
}
