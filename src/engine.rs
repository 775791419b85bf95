//! The render state machine.
//!
//! Implements the seven-method callback contract over a JSON tree: a section
//! stack with iteration cursors, Mustache scoping extended with ancestor
//! lookup, lambda capture buffers, and writer redirection. Emission lands in
//! the capture buffer of the innermost open lambda section; everything else
//! goes to the result buffer that the caller receives at the end.

use crate::driver::{TemplateHooks, ValueText};
use crate::error::RenderError;
use crate::registry::Registry;
use crate::resolve::{self, Cursor};
use crate::tag::{Comparator, TagExpr, parse_tag};
use crate::{Flags, MAX_DEPTH, expr};
use serde_json::Value;

/// A JSON string with exactly these bytes marks its key as a lambda
/// reference, resolved through the registry at render time.
pub const LAMBDA_MARKER: &str = "(=>)";

struct LambdaSlot {
    name: String,
    capture: String,
}

struct Frame<'a> {
    saved: Option<Cursor<'a>>,
    iterate: bool,
    lambda: Option<LambdaSlot>,
}

pub(crate) struct Engine<'a> {
    root: Option<&'a Value>,
    context: Option<Cursor<'a>>,
    flags: Flags,
    registry: &'a Registry,
    // stack[0] is the base frame; open sections stack above it.
    stack: Vec<Frame<'a>>,
    result: String,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(root: Option<&'a Value>, flags: Flags, registry: &'a Registry) -> Self {
        Engine {
            root,
            context: root.map(Cursor::root),
            flags,
            registry,
            stack: Vec::new(),
            result: String::new(),
        }
    }

    /// The rendered output; meaningful only after a successful render.
    pub(crate) fn finish(self) -> String {
        self.result
    }

    /// Resolve a path against the current context, then each saved ancestor
    /// context down to the root.
    fn find(&self, path: &str) -> Option<Cursor<'a>> {
        let context = self.context?;
        if let Some(hit) = resolve::find_here(context.value, path) {
            return Some(hit);
        }
        for frame in self.stack.iter().rev() {
            if let Some(saved) = frame.saved {
                if let Some(hit) = resolve::find_here(saved.value, path) {
                    return Some(hit);
                }
            }
        }
        None
    }

    /// Append to the innermost open lambda capture, or the result buffer.
    fn write(&mut self, text: &str) {
        for frame in self.stack.iter_mut().rev() {
            if let Some(lambda) = frame.lambda.as_mut() {
                lambda.capture.push_str(text);
                return;
            }
        }
        self.result.push_str(text);
    }

    fn enter_scalar(
        &mut self,
        item: Cursor<'a>,
        tag: &TagExpr,
        frame: Frame<'a>,
    ) -> Result<bool, RenderError> {
        let truthy = match (&tag.operand, tag.comparator) {
            (Some(operand), comparator) if comparator != Comparator::None => {
                resolve::eval_comparator(item.value, operand, comparator)
            }
            _ => !resolve::self_value(item.value).as_str().is_empty(),
        };
        if !truthy {
            return Ok(false);
        }
        self.context = Some(item);
        self.stack.push(frame);
        Ok(true)
    }

    /// Resolve an expression identifier to a numeric binding.
    ///
    /// Identifiers go through the same dotted-path translation as tag keys
    /// (comparison operators stay verbatim; they cannot occur here). An item
    /// that exists but is not numeric binds NaN.
    fn lookup_number(&self, ident: &str) -> Option<f64> {
        let path_flags = self
            .flags
            .difference(Flags::EQUAL | Flags::COMPARE | Flags::OBJECT_ITER);
        let tag = parse_tag(ident, path_flags);
        let item = self.find(&tag.path)?;
        match item.value {
            Value::Number(n) => {
                if n.is_f64() {
                    n.as_f64()
                } else if n.is_i64() {
                    n.as_i64().map(|v| v as f64)
                } else {
                    n.as_u64().map(|v| v as f64)
                }
            }
            _ => Some(f64::NAN),
        }
    }
}

impl<'a> TemplateHooks<'a> for Engine<'a> {
    fn start(&mut self) -> Result<(), RenderError> {
        if self.flags.contains(Flags::COMPARE) {
            self.flags |= Flags::EQUAL;
        }
        if let Some(root) = self.root {
            if !root.is_object() {
                return Err(RenderError::InvalidRoot);
            }
        }
        self.context = self.root.map(Cursor::root);
        self.stack.clear();
        self.stack.push(Frame {
            saved: self.context,
            iterate: false,
            lambda: None,
        });
        self.result = String::with_capacity(4096);
        Ok(())
    }

    fn enter(&mut self, name: &str) -> Result<bool, RenderError> {
        let Some(context) = self.context else {
            return Ok(false);
        };
        if self.stack.len() >= MAX_DEPTH {
            return Err(RenderError::TooDeep);
        }
        let mut frame = Frame {
            saved: Some(context),
            iterate: false,
            lambda: None,
        };

        if name == "*" && self.flags.contains(Flags::OBJECT_ITER) {
            if context.value.is_object() {
                if let Some(first) = resolve::first_child(context.value) {
                    self.context = Some(first);
                    frame.iterate = true;
                    self.stack.push(frame);
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let tag = parse_tag(name, self.flags);
        let Some(item) = self.find(&tag.path) else {
            return Ok(false);
        };

        match item.value {
            Value::Bool(b) => {
                if !*b {
                    return Ok(false);
                }
                self.stack.push(frame);
                Ok(true)
            }
            Value::Null => Ok(false),
            Value::Array(_) => {
                let Some(first) = resolve::first_child(item.value) else {
                    return Ok(false);
                };
                self.context = Some(first);
                frame.iterate = true;
                self.stack.push(frame);
                Ok(true)
            }
            Value::Object(_) => {
                if tag.operand.as_deref() == Some("*") && self.flags.contains(Flags::OBJECT_ITER) {
                    if let Some(first) = resolve::first_child(item.value) {
                        self.context = Some(first);
                        frame.iterate = true;
                        self.stack.push(frame);
                        return Ok(true);
                    }
                }
                self.context = Some(item);
                self.stack.push(frame);
                Ok(true)
            }
            Value::String(s) if s == LAMBDA_MARKER => {
                if let Some(lambda_name) = item.name.filter(|n| self.registry.has_lambda(n)) {
                    frame.lambda = Some(LambdaSlot {
                        name: lambda_name.to_string(),
                        capture: String::new(),
                    });
                    self.stack.push(frame);
                    return Ok(true);
                }
                self.enter_scalar(item, &tag, frame)
            }
            _ => self.enter_scalar(item, &tag, frame),
        }
    }

    fn next(&mut self) -> Result<bool, RenderError> {
        let iterating = self.stack.last().is_some_and(|frame| frame.iterate);
        if !iterating {
            return Ok(false);
        }
        let Some(context) = self.context else {
            return Ok(false);
        };
        match context.next_sibling() {
            Some(sibling) => {
                self.context = Some(sibling);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn leave(&mut self) -> Result<(), RenderError> {
        if self.stack.len() <= 1 {
            return Err(RenderError::BadClose);
        }
        let Some(frame) = self.stack.pop() else {
            return Err(RenderError::BadClose);
        };
        self.context = frame.saved;

        if let Some(lambda) = frame.lambda {
            let mut buf = lambda.capture;
            self.registry.lambda_invoke(&lambda.name, self.root, &mut buf);
            self.write(&buf);
        }
        Ok(())
    }

    fn get(&mut self, name: &str) -> Result<ValueText<'a>, RenderError> {
        let Some(context) = self.context else {
            return Ok(ValueText::Borrowed(""));
        };

        if name == "*" && self.flags.contains(Flags::OBJECT_ITER) {
            return Ok(ValueText::Borrowed(context.name.unwrap_or("")));
        }
        if name == "." && self.flags.contains(Flags::SINGLE_DOT) {
            return Ok(resolve::self_value(context.value));
        }

        let tag = parse_tag(name, self.flags);
        if let Some(item) = self.find(&tag.path) {
            let matched = match &tag.operand {
                None => true,
                // an operand without comparator (`*`) does not filter
                Some(_) if tag.comparator == Comparator::None => true,
                Some(operand) => resolve::eval_comparator(item.value, operand, tag.comparator),
            };
            if matched {
                if let Value::String(s) = item.value {
                    if s == LAMBDA_MARKER {
                        if let Some(lambda_name) =
                            item.name.filter(|n| self.registry.has_lambda(n))
                        {
                            let mut buf = String::new();
                            self.registry.lambda_invoke(lambda_name, self.root, &mut buf);
                            return Ok(ValueText::Owned(buf));
                        }
                    }
                }
                return Ok(resolve::self_value(item.value));
            }
        }

        if self.flags.contains(Flags::TINY_EXPR) {
            let this: &Engine<'a> = self;
            let value = expr::eval(name, &|ident| this.lookup_number(ident));
            if !value.is_nan() {
                return Ok(ValueText::Owned(resolve::format_g9(value)));
            }
        }

        Ok(ValueText::Borrowed(""))
    }

    fn partial(&mut self, name: &str) -> Result<ValueText<'a>, RenderError> {
        // data items shadow registry files, enabling inline substitution
        if self.context.is_some() {
            if let Some(item) = self.find(name) {
                return Ok(resolve::self_value(item.value));
            }
        }

        if self.flags.contains(Flags::INC_PARTIAL) {
            match self.registry.partial_lookup(name) {
                Ok(Some(payload)) => return Ok(ValueText::Shared(payload)),
                Ok(None) => {
                    tracing::debug!(partial = name, "partial not found");
                }
                Err(err) => {
                    tracing::warn!(partial = name, error = %err, "partial read failed");
                    return Err(RenderError::System);
                }
            }
        }

        Ok(ValueText::Borrowed(""))
    }

    fn emit(&mut self, text: &str, escape: bool) -> Result<(), RenderError> {
        if !escape {
            self.write(text);
            return Ok(());
        }
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                other => escaped.push(other),
            }
        }
        self.write(&escaped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Flags, Registry, render_with};
    use serde_json::json;

    fn render_plain(template: &str, data: serde_json::Value) -> String {
        let registry = Registry::new();
        render_with(template, Some(&data), Flags::ALL, &registry).expect("render")
    }

    #[test]
    fn scalar_section_enters_on_non_empty_self_value() {
        assert_eq!(
            render_plain("{{#s}}[{{.}}]{{/s}}", json!({"s": "text"})),
            "[text]"
        );
        assert_eq!(render_plain("{{#s}}[{{.}}]{{/s}}", json!({"s": ""})), "");
        assert_eq!(render_plain("{{#n}}[{{.}}]{{/n}}", json!({"n": 0})), "[0]");
    }

    #[test]
    fn literal_sections_enter_only_on_true() {
        assert_eq!(
            render_plain("{{#t}}yes{{/t}}{{#f}}no{{/f}}", json!({"t": true, "f": false})),
            "yes"
        );
        assert_eq!(render_plain("{{#x}}no{{/x}}", json!({"x": null})), "");
    }

    #[test]
    fn null_context_renders_empty() {
        let registry = Registry::new();
        let out = render_with("a {{x}} b", None, Flags::ALL, &registry).expect("render");
        assert_eq!(out, "a  b");
    }

    #[test]
    fn non_object_root_is_rejected() {
        let registry = Registry::new();
        let data = json!([1, 2, 3]);
        let err = render_with("x", Some(&data), Flags::ALL, &registry).unwrap_err();
        assert_eq!(err, crate::RenderError::InvalidRoot);
    }

    #[test]
    fn lambda_capture_redirects_nested_emission() {
        let mut registry = Registry::new();
        registry.bind_lambdas(vec![
            (
                "wrap".to_string(),
                Box::new(|_, buf: &mut String| {
                    *buf = format!("({buf})");
                }),
            ),
            (
                "upper".to_string(),
                Box::new(|_, buf: &mut String| buf.make_ascii_uppercase()),
            ),
        ]);
        let data = json!({"wrap": "(=>)", "upper": "(=>)", "name": "kai"});
        let out = render_with(
            "{{#wrap}}a {{#upper}}{{name}}{{/upper}} b{{/wrap}}",
            Some(&data),
            Flags::ALL,
            &registry,
        )
        .expect("render");
        assert_eq!(out, "(a KAI b)");
    }

    #[test]
    fn lambda_value_tag_runs_on_empty_buffer() {
        let mut registry = Registry::new();
        registry.bind_lambdas(vec![(
            "stamp".to_string(),
            Box::new(|_, buf: &mut String| buf.push_str("v1")),
        )]);
        let data = json!({"stamp": "(=>)"});
        let out = render_with("rev: {{stamp}}", Some(&data), Flags::ALL, &registry)
            .expect("render");
        assert_eq!(out, "rev: v1");
    }

    #[test]
    fn lambda_receives_the_render_root() {
        let mut registry = Registry::new();
        registry.bind_lambdas(vec![(
            "ctx".to_string(),
            Box::new(|root, buf: &mut String| {
                let who = root
                    .and_then(|r| r.get("who"))
                    .and_then(|w| w.as_str())
                    .unwrap_or("?");
                buf.push_str(who);
            }),
        )]);
        let data = json!({"ctx": "(=>)", "who": "root-data", "nest": {"x": 1}});
        let out = render_with(
            "{{#nest}}{{#ctx}}{{/ctx}}{{/nest}}",
            Some(&data),
            Flags::ALL,
            &registry,
        )
        .expect("render");
        assert_eq!(out, "root-data");
    }

    #[test]
    fn unregistered_lambda_marker_falls_back_to_scalar() {
        assert_eq!(
            render_plain("{{#l}}body{{/l}}", json!({"l": "(=>)"})),
            "body"
        );
    }

    #[test]
    fn tiny_expr_fallback_formats_doubles() {
        let registry = Registry::new();
        let data = json!({"a": 2, "b": 3});
        let flags = Flags::ALL | Flags::TINY_EXPR;
        let out = render_with("{{a+b*2}}", Some(&data), flags, &registry).expect("render");
        assert_eq!(out, "8");
        let out = render_with("{{missing+1}}", Some(&data), flags, &registry).expect("render");
        assert_eq!(out, "");
    }

    #[test]
    fn expression_identifiers_use_dotted_paths() {
        let registry = Registry::new();
        let data = json!({"box": {"w": 3, "h": 4}});
        let flags = Flags::ALL | Flags::TINY_EXPR;
        let out =
            render_with("{{box.w * box.h}}", Some(&data), flags, &registry).expect("render");
        assert_eq!(out, "12");
    }
}
