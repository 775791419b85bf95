//! File-backed partial assets and user lambda bindings.
//!
//! The registry is an explicit value so embedders control its lifetime; the
//! module-level functions operate on a process-default instance guarded by a
//! mutex, mirroring the original init/teardown surface. Payloads are
//! reference counted: a lookup hands out a clone of the `Arc`, so rebinding
//! or staleness detection can detach a stale payload without pulling the
//! bytes out from under a render that is still using them.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::MAX_PARTIAL_SIZE;

/// Cached bytes of one partial file.
#[derive(Debug)]
pub struct PartialPayload {
    text: String,
}

impl PartialPayload {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One registered partial: a path, the mtime last seen on disk, and the
/// lazily loaded payload.
#[derive(Debug)]
struct PartialAsset {
    path: PathBuf,
    mtime: Cell<Option<SystemTime>>,
    cache: RefCell<Option<Arc<PartialPayload>>>,
}

/// Transformer invoked on a lambda section's rendered body.
///
/// Receives the render root (when the render has one) and the capture buffer
/// holding the already-rendered section body, to be mutated in place.
pub type LambdaFn = Box<dyn Fn(Option<&Value>, &mut String) + Send + Sync>;

struct LambdaBinding {
    name: String,
    transformer: LambdaFn,
}

/// Partial assets plus lambda bindings consulted during a render.
#[derive(Default)]
pub struct Registry {
    assets: Vec<PartialAsset>,
    lambdas: Vec<LambdaBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register partial files.
    ///
    /// Directories are walked recursively; regular files over
    /// [`MAX_PARTIAL_SIZE`] bytes are skipped with a notice. Re-binding a
    /// path whose on-disk mtime changed detaches its cached payload so the
    /// next lookup reloads, while readers holding the old payload keep it.
    pub fn bind_partials<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for path in paths {
            let path = path.as_ref();
            let meta = fs::metadata(path)
                .with_context(|| format!("binding partial path {}", path.display()))?;
            if meta.is_dir() {
                self.bind_tree(path)?;
            } else {
                self.register_file(path, &meta);
            }
        }
        Ok(())
    }

    fn bind_tree(&mut self, dir: &Path) -> Result<()> {
        let entries =
            fs::read_dir(dir).with_context(|| format!("listing partials in {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
            let path = entry.path();
            let meta = fs::metadata(&path)
                .with_context(|| format!("inspecting partial {}", path.display()))?;
            if meta.is_dir() {
                self.bind_tree(&path)?;
            } else if meta.is_file() {
                self.register_file(&path, &meta);
            } else {
                tracing::debug!(path = %path.display(), "ignoring non-regular file");
            }
        }
        Ok(())
    }

    fn register_file(&mut self, path: &Path, meta: &fs::Metadata) {
        if meta.len() > MAX_PARTIAL_SIZE as u64 {
            tracing::warn!(
                path = %path.display(),
                size = meta.len(),
                "partial exceeds size cap, skipped"
            );
            return;
        }
        let mtime = meta.modified().ok();
        if let Some(asset) = self.assets.iter().find(|a| a.path == path) {
            if asset.mtime.get() != mtime {
                asset.cache.replace(None);
                asset.mtime.set(mtime);
            }
            return;
        }
        self.assets.push(PartialAsset {
            path: path.to_path_buf(),
            mtime: Cell::new(mtime),
            cache: RefCell::new(None),
        });
    }

    /// Fetch a partial's payload by exact path match.
    ///
    /// `Ok(None)` means the name is not registered (the renderer emits
    /// nothing for it); an `Err` is an IO failure and aborts the render. The
    /// on-disk mtime is compared on every fetch: a change detaches the
    /// cached payload before the reload.
    pub fn partial_lookup(&self, name: &str) -> io::Result<Option<Arc<PartialPayload>>> {
        let Some(asset) = self.assets.iter().find(|a| a.path == Path::new(name)) else {
            return Ok(None);
        };

        let meta = fs::metadata(&asset.path)?;
        let mtime = meta.modified().ok();
        if asset.mtime.get() != mtime {
            asset.cache.replace(None);
            asset.mtime.set(mtime);
        }

        let mut cache = asset.cache.borrow_mut();
        if cache.is_none() {
            if meta.len() > MAX_PARTIAL_SIZE as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "partial exceeds size cap",
                ));
            }
            let text = fs::read_to_string(&asset.path)?;
            *cache = Some(Arc::new(PartialPayload { text }));
        }
        Ok(cache.clone())
    }

    /// Bind lambda transformers; a second binding for a name replaces the
    /// first.
    pub fn bind_lambdas(&mut self, bindings: Vec<(String, LambdaFn)>) {
        for (name, transformer) in bindings {
            match self.lambdas.iter_mut().find(|l| l.name == name) {
                Some(existing) => existing.transformer = transformer,
                None => self.lambdas.push(LambdaBinding { name, transformer }),
            }
        }
    }

    pub fn has_lambda(&self, name: &str) -> bool {
        self.lambdas.iter().any(|l| l.name == name)
    }

    /// Run the named transformer over `buf` in place; unknown names no-op.
    pub fn lambda_invoke(&self, name: &str, root: Option<&Value>, buf: &mut String) {
        if let Some(binding) = self.lambdas.iter().find(|l| l.name == name) {
            (binding.transformer)(root, buf);
        }
    }
}

static DEFAULT: Mutex<Option<Registry>> = Mutex::new(None);

pub(crate) fn default_guard() -> MutexGuard<'static, Option<Registry>> {
    DEFAULT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create (or reset) the process-default registry.
pub fn registry_init() {
    *default_guard() = Some(Registry::new());
}

/// Drop the process-default registry, releasing every registration and
/// payload the registry itself still holds.
pub fn registry_teardown() {
    *default_guard() = None;
}

/// Register partials in the process-default registry.
pub fn bind_partials<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    match default_guard().as_mut() {
        Some(registry) => registry.bind_partials(paths),
        None => bail!("registry_init() has not been run"),
    }
}

/// Bind lambdas in the process-default registry.
pub fn bind_lambdas(bindings: Vec<(String, LambdaFn)>) -> Result<()> {
    match default_guard().as_mut() {
        Some(registry) => {
            registry.bind_lambdas(bindings);
            Ok(())
        }
        None => bail!("registry_init() has not been run"),
    }
}

/// Fetch a partial payload from the process-default registry.
pub fn partial_lookup(name: &str) -> io::Result<Option<Arc<PartialPayload>>> {
    match default_guard().as_ref() {
        Some(registry) => registry.partial_lookup(name),
        None => {
            tracing::warn!("registry_init() has not been run");
            Ok(None)
        }
    }
}

/// Run a lambda from the process-default registry over `buf` in place.
pub fn lambda_invoke(name: &str, root: Option<&Value>, buf: &mut String) {
    match default_guard().as_ref() {
        Some(registry) => registry.lambda_invoke(name, root, buf),
        None => tracing::warn!("registry_init() has not been run"),
    }
}
