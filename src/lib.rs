//! Mustache template rendering bound to a JSON data model.
//!
//! The crate renders Mustache templates against `serde_json` values with an
//! extension dialect: typed comparisons (`{{#n>=10}}`), value-equality
//! sections (`{{#k=v}}`), object iteration (`{{#*}}`), JSON-pointer key
//! escapes, user lambdas whose rendered body is post-processed in place,
//! file-backed partials behind a reference-counted cache, and an arithmetic
//! fallback over numeric fields. The public contract is the [`render`]
//! family plus the registry surface: bind partial paths and lambda
//! transformers once (process-wide or as an explicit [`Registry`] value),
//! then render as often as needed. Failures carry the fixed negative codes
//! of [`RenderError`]; missing keys and missing partials are not failures
//! and render as empty.

mod driver;
mod engine;
mod expr;
mod resolve;
mod tag;

pub mod error;
pub mod registry;

pub use engine::LAMBDA_MARKER;
pub use error::{RenderError, strerror};
pub use registry::{
    LambdaFn, PartialPayload, Registry, bind_lambdas, bind_partials, lambda_invoke,
    partial_lookup, registry_init, registry_teardown,
};

use serde_json::Value;

/// Maximum number of open frames: the base frame plus nested sections.
pub const MAX_DEPTH: usize = 256;
/// Longest tag name the driver accepts.
pub const MAX_TAG_LENGTH: usize = 1024;
/// Largest partial file the registry will load, in bytes.
pub const MAX_PARTIAL_SIZE: usize = 65535;

bitflags::bitflags! {
    /// Dialect selection. Bit positions are the ABI.
    ///
    /// `COLON` and `EMPTY_TAG` are driver-level bits; the rest select data
    /// extensions. `COMPARE` implies `EQUAL` at render start, and
    /// `ESC_FIRST_CMP` is accepted but reserved. `ALL` covers everything
    /// except `TINY_EXPR`, which callers opt into separately.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        const COLON = 1;
        const EMPTY_TAG = 2;
        const SINGLE_DOT = 4;
        const EQUAL = 8;
        const COMPARE = 16;
        const JSON_POINTER = 32;
        const OBJECT_ITER = 64;
        const INC_PARTIAL = 128;
        const ESC_FIRST_CMP = 256;
        const TINY_EXPR = 512;
        const ALL = 511;
    }
}

/// Render `template` against a JSON text.
///
/// `data` may be absent, in which case every tag resolves to nothing.
/// Invalid JSON aborts with [`RenderError::InvalidRoot`] after a log notice.
/// Partials and lambdas come from the process-default registry.
pub fn render(template: &str, data: Option<&str>, flags: Flags) -> Result<String, RenderError> {
    let parsed = match data {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(error = %err, "data is not valid JSON");
                return Err(RenderError::InvalidRoot);
            }
        },
        None => None,
    };
    render_value(template, parsed.as_ref(), flags)
}

/// Render `template` against a pre-parsed value (null or an object root),
/// consulting the process-default registry.
pub fn render_value(
    template: &str,
    root: Option<&Value>,
    flags: Flags,
) -> Result<String, RenderError> {
    let guard = registry::default_guard();
    match guard.as_ref() {
        Some(registry) => render_with(template, root, flags, registry),
        None => render_with(template, root, flags, &Registry::new()),
    }
}

/// Render with an explicit registry, bypassing the process default.
pub fn render_with<'a>(
    template: &str,
    root: Option<&'a Value>,
    flags: Flags,
    registry: &'a Registry,
) -> Result<String, RenderError> {
    let mut engine = engine::Engine::new(root, flags, registry);
    driver::process(template, &mut engine, flags)?;
    Ok(engine.finish())
}
