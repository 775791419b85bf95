//! Command-line front end for the rendering engine.
//!
//! Renders a template file against an optional JSON data file and writes the
//! result to stdout. Partial search paths and the dialect flag set come from
//! the command line or from a small JSON manifest describing the whole job;
//! explicit flags override manifest fields. Render failures print the code
//! and message on stderr and exit nonzero.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use stachebind::Flags;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse()?;
    let job = args.into_job()?;

    let template = fs::read_to_string(&job.template)
        .with_context(|| format!("reading template {}", job.template.display()))?;
    let data = match &job.data {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading data {}", path.display()))?,
        ),
        None => None,
    };

    stachebind::registry_init();
    if !job.partials.is_empty() {
        stachebind::bind_partials(&job.partials)?;
    }

    match stachebind::render(&template, data.as_deref(), job.flags) {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(err) => bail!("render failed: {err} (code {})", err.code()),
    }
}

/// JSON job description accepted via `--manifest`.
#[derive(Debug, Deserialize)]
struct Manifest {
    template: PathBuf,
    #[serde(default)]
    data: Option<PathBuf>,
    #[serde(default)]
    flags: Option<Vec<String>>,
    #[serde(default)]
    partials: Vec<PathBuf>,
}

/// Fully resolved render job.
struct Job {
    template: PathBuf,
    data: Option<PathBuf>,
    flags: Flags,
    partials: Vec<PathBuf>,
}

struct CliArgs {
    manifest: Option<PathBuf>,
    template: Option<PathBuf>,
    data: Option<PathBuf>,
    flags: Option<Flags>,
    partials: Vec<PathBuf>,
    expr: bool,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        let mut args = env::args_os().skip(1);
        let mut parsed = CliArgs {
            manifest: None,
            template: None,
            data: None,
            flags: None,
            partials: Vec::new(),
            expr: false,
        };

        while let Some(arg_os) = args.next() {
            let arg = arg_os
                .into_string()
                .map_err(|_| anyhow::anyhow!("argument is not valid UTF-8"))?;
            match arg.as_str() {
                "--manifest" => {
                    parsed.manifest = Some(PathBuf::from(next_value(&mut args, "--manifest")?));
                }
                "--template" => {
                    parsed.template = Some(PathBuf::from(next_value(&mut args, "--template")?));
                }
                "--data" => {
                    parsed.data = Some(PathBuf::from(next_value(&mut args, "--data")?));
                }
                "--flags" => {
                    let raw = next_value(&mut args, "--flags")?;
                    parsed.flags = Some(parse_flags(&raw)?);
                }
                "--partials" => {
                    parsed
                        .partials
                        .push(PathBuf::from(next_value(&mut args, "--partials")?));
                }
                "--expr" => parsed.expr = true,
                "--help" | "-h" => {
                    print!("{}", usage());
                    std::process::exit(0);
                }
                other => bail!("unknown flag: {other}"),
            }
        }

        Ok(parsed)
    }

    fn into_job(self) -> Result<Job> {
        let manifest = match &self.manifest {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading manifest {}", path.display()))?;
                Some(
                    serde_json::from_str::<Manifest>(&raw)
                        .with_context(|| format!("parsing manifest {}", path.display()))?,
                )
            }
            None => None,
        };

        let (manifest_template, manifest_data, manifest_flags, manifest_partials) = match manifest {
            Some(m) => (Some(m.template), m.data, m.flags, m.partials),
            None => (None, None, None, Vec::new()),
        };

        let Some(template) = self.template.or(manifest_template) else {
            bail!("no template given; use --template or a manifest");
        };

        let mut flags = match (self.flags, manifest_flags) {
            (Some(explicit), _) => explicit,
            (None, Some(names)) => {
                parse_flags(&names.join(",")).context("parsing manifest flags")?
            }
            (None, None) => Flags::ALL,
        };
        if self.expr {
            flags |= Flags::TINY_EXPR;
        }

        let mut partials = manifest_partials;
        partials.extend(self.partials);

        Ok(Job {
            template,
            data: self.data.or(manifest_data),
            flags,
            partials,
        })
    }
}

fn next_value(args: &mut impl Iterator<Item = std::ffi::OsString>, flag: &str) -> Result<String> {
    let Some(raw) = args.next() else {
        bail!("{flag} requires a value");
    };
    match raw.into_string() {
        Ok(value) => Ok(value),
        Err(_) => bail!("{flag} value is not valid UTF-8"),
    }
}

/// Parse `all`, `none`, or a comma-separated list of flag names.
fn parse_flags(raw: &str) -> Result<Flags> {
    match raw {
        "all" => return Ok(Flags::ALL),
        "none" => return Ok(Flags::empty()),
        _ => {}
    }

    let mut flags = Flags::empty();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        flags |= match name {
            "colon" => Flags::COLON,
            "empty-tag" => Flags::EMPTY_TAG,
            "single-dot" => Flags::SINGLE_DOT,
            "equal" => Flags::EQUAL,
            "compare" => Flags::COMPARE,
            "json-pointer" => Flags::JSON_POINTER,
            "object-iter" => Flags::OBJECT_ITER,
            "inc-partial" => Flags::INC_PARTIAL,
            "esc-first-cmp" => Flags::ESC_FIRST_CMP,
            "tiny-expr" => Flags::TINY_EXPR,
            other => bail!("unknown dialect flag: {other}"),
        };
    }
    Ok(flags)
}

fn usage() -> &'static str {
    "Usage: stache-render [--manifest PATH] [--template PATH] [--data PATH]\n\
    \x20                  [--flags all|none|NAME,...] [--partials PATH]... [--expr]\n\
Renders a Mustache template against a JSON data file and prints the result.\n\
Flag names: colon, empty-tag, single-dot, equal, compare, json-pointer,\n\
object-iter, inc-partial, esc-first-cmp, tiny-expr.\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flags_keywords() {
        assert_eq!(parse_flags("all").unwrap(), Flags::ALL);
        assert_eq!(parse_flags("none").unwrap(), Flags::empty());
    }

    #[test]
    fn parse_flags_list() {
        let flags = parse_flags("equal,compare, object-iter").unwrap();
        assert!(flags.contains(Flags::EQUAL));
        assert!(flags.contains(Flags::COMPARE));
        assert!(flags.contains(Flags::OBJECT_ITER));
        assert!(!flags.contains(Flags::TINY_EXPR));
    }

    #[test]
    fn parse_flags_rejects_unknown_names() {
        assert!(parse_flags("equal,bogus").is_err());
    }

    #[test]
    fn manifest_fields_deserialize() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"template": "page.must", "data": "page.json", "flags": ["equal"], "partials": ["assets"]}"#,
        )
        .unwrap();
        assert_eq!(manifest.template, PathBuf::from("page.must"));
        assert_eq!(manifest.data, Some(PathBuf::from("page.json")));
        assert_eq!(manifest.flags, Some(vec!["equal".to_string()]));
        assert_eq!(manifest.partials, vec![PathBuf::from("assets")]);
    }

    #[test]
    fn manifest_defaults_are_optional() {
        let manifest: Manifest = serde_json::from_str(r#"{"template": "t.must"}"#).unwrap();
        assert!(manifest.data.is_none());
        assert!(manifest.flags.is_none());
        assert!(manifest.partials.is_empty());
    }
}
