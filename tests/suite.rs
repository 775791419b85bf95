// Centralized integration suite for the rendering engine: the end-to-end
// scenarios plus the universal properties (determinism, scoping, escaping,
// round-tripping, depth bounds) that every dialect combination must hold.

use anyhow::Result;
use serde_json::{Value, json};
use stachebind::{Flags, MAX_DEPTH, Registry, RenderError, render_with};

fn render_plain(template: &str, data: &Value) -> Result<String> {
    let registry = Registry::new();
    Ok(render_with(template, Some(data), Flags::ALL, &registry)?)
}

#[test]
fn basic_substitution() -> Result<()> {
    let data = json!({"who": "world"});
    assert_eq!(render_plain("Hello {{who}}!", &data)?, "Hello world!");
    Ok(())
}

#[test]
fn section_over_array() -> Result<()> {
    let data = json!({"xs": [{"v": 1}, {"v": 2}, {"v": 3}]});
    assert_eq!(render_plain("{{#xs}}[{{v}}]{{/xs}}", &data)?, "[1][2][3]");
    Ok(())
}

#[test]
fn comparison_sections() -> Result<()> {
    let data = json!({"n": 7});
    let template = "{{#n>=10}}big{{/n>=10}}{{#n<10}}small{{/n<10}}";
    assert_eq!(render_plain(template, &data)?, "small");
    Ok(())
}

#[test]
fn object_iteration() -> Result<()> {
    let data = json!({"a": "x", "b": "y"});
    assert_eq!(render_plain("{{#*}}{{*}}={{.}};{{/*}}", &data)?, "a=x;b=y;");
    Ok(())
}

#[test]
fn lambda_transforms_rendered_body() -> Result<()> {
    let mut registry = Registry::new();
    registry.bind_lambdas(vec![(
        "upper".to_string(),
        Box::new(|_, buf: &mut String| buf.make_ascii_uppercase()),
    )]);
    let data = json!({"upper": "(=>)", "name": "kai"});
    let out = render_with(
        "{{#upper}}hello {{name}}{{/upper}}",
        Some(&data),
        Flags::ALL,
        &registry,
    )?;
    assert_eq!(out, "HELLO KAI");
    Ok(())
}

#[test]
fn html_escape() -> Result<()> {
    let data = json!({"x": "<a&b>"});
    assert_eq!(
        render_plain("{{x}} {{{x}}}", &data)?,
        "&lt;a&amp;b&gt; <a&b>"
    );
    Ok(())
}

#[test]
fn rendering_is_deterministic() -> Result<()> {
    let data = json!({
        "title": "t",
        "items": [{"n": 1}, {"n": 2}],
        "flags": {"a": true, "b": false}
    });
    let template = "{{title}}: {{#items}}{{n}},{{/items}} {{#flags.a}}on{{/flags.a}}";
    let first = render_plain(template, &data)?;
    let second = render_plain(template, &data)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn array_iteration_matches_per_element_rendering() -> Result<()> {
    let data = json!({"xs": [{"v": "a"}, {"v": "b"}, {"v": "c"}]});
    let iterated = render_plain("{{#xs}}<{{v}}>{{/xs}}", &data)?;

    let mut concatenated = String::new();
    for element in data["xs"].as_array().expect("array") {
        let one = json!({"v": element["v"]});
        concatenated.push_str(&render_plain("<{{v}}>", &one)?);
    }
    assert_eq!(iterated, concatenated);
    Ok(())
}

#[test]
fn ancestor_lookup_reaches_outer_frames() -> Result<()> {
    let data = json!({"outer": "X", "a": {}});
    assert_eq!(render_plain("{{#a}}{{outer}}{{/a}}", &data)?, "X");

    let nested = json!({"top": "T", "a": {"b": {"mid": "M"}}});
    assert_eq!(
        render_plain("{{#a}}{{#b}}{{top}}-{{mid}}{{/b}}{{/a}}", &nested)?,
        "T-M"
    );
    Ok(())
}

#[test]
fn escaping_applies_exactly_four_substitutions() -> Result<()> {
    let tricky = "&<>\"'/ plain &amp; again";
    let data = json!({"s": tricky});
    assert_eq!(render_plain("{{{s}}}", &data)?, tricky);
    assert_eq!(
        render_plain("{{s}}", &data)?,
        "&amp;&lt;&gt;&quot;'/ plain &amp;amp; again"
    );
    Ok(())
}

#[test]
fn self_value_round_trips_scalars() -> Result<()> {
    let scalars = json!({
        "i": -42,
        "u": 18446744073709551615u64,
        "f": 1.5,
        "small": 0.1,
        "big": 1e300,
        "t": true,
        "nil": null
    });
    for (key, original) in scalars.as_object().expect("object") {
        let rendered = render_plain(&format!("{{{{{key}}}}}"), &scalars)?;
        let reparsed: Value = serde_json::from_str(&rendered)?;
        assert_eq!(&reparsed, original, "round-trip for key {key}");
    }
    Ok(())
}

#[test]
fn lambda_nesting_composes_inner_output() -> Result<()> {
    let mut registry = Registry::new();
    registry.bind_lambdas(vec![
        (
            "outer".to_string(),
            Box::new(|_, buf: &mut String| {
                *buf = format!("O[{buf}]");
            }),
        ),
        (
            "inner".to_string(),
            Box::new(|_, buf: &mut String| {
                *buf = format!("I[{buf}]");
            }),
        ),
    ]);
    let data = json!({"outer": "(=>)", "inner": "(=>)", "v": "x"});
    let out = render_with(
        "{{#outer}}a {{#inner}}{{v}}{{/inner}} b{{/outer}}",
        Some(&data),
        Flags::ALL,
        &registry,
    )?;
    // inner sees its fully rendered body; outer sees inner's transformed
    // output concatenated with the sibling text
    assert_eq!(out, "O[a I[x] b]");
    Ok(())
}

#[test]
fn over_deep_nesting_fails_with_too_deep() {
    let registry = Registry::new();
    let data = json!({"a": {}});
    let opens = "{{#a}}".repeat(MAX_DEPTH + 1);
    let closes = "{{/a}}".repeat(MAX_DEPTH + 1);
    let template = format!("{opens}body{closes}");
    let err = render_with(&template, Some(&data), Flags::ALL, &registry).unwrap_err();
    assert_eq!(err, RenderError::TooDeep);
}

#[test]
fn negated_operands_invert_the_test() -> Result<()> {
    let data = json!({"n": 7, "s": "abc"});
    assert_eq!(render_plain("{{#n=!5}}not five{{/n=!5}}", &data)?, "not five");
    assert_eq!(render_plain("{{#n=!7}}never{{/n=!7}}", &data)?, "");
    assert_eq!(render_plain("{{#s=!abc}}never{{/s=!abc}}", &data)?, "");
    assert_eq!(render_plain("{{#n>=!10}}small{{/n>=!10}}", &data)?, "small");
    Ok(())
}

#[test]
fn missing_keys_render_empty_without_failing() -> Result<()> {
    let data = json!({"present": "x"});
    assert_eq!(
        render_plain("[{{absent}}]{{#absent}}no{{/absent}}[{{present}}]", &data)?,
        "[][x]"
    );
    Ok(())
}

#[test]
fn inverted_sections() -> Result<()> {
    let data = json!({"present": "x", "empty": [], "xs": [1]});
    assert_eq!(render_plain("{{^missing}}shown{{/missing}}", &data)?, "shown");
    assert_eq!(render_plain("{{^present}}hidden{{/present}}", &data)?, "");
    assert_eq!(render_plain("{{^empty}}none{{/empty}}", &data)?, "none");
    assert_eq!(render_plain("{{^xs}}none{{/xs}}", &data)?, "");
    Ok(())
}

#[test]
fn invalid_json_data_is_an_invalid_root() {
    let err = stachebind::render("x", Some("{not json"), Flags::ALL).unwrap_err();
    assert_eq!(err, RenderError::InvalidRoot);
    assert_eq!(err.code(), -9);
    assert_eq!(stachebind::strerror(err.code()), "invalid root");
}
