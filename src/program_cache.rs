// program_cache.rs - Build kernel programs once per (context, source, options).
//
// A sample asks for a program by kernel name or inline text plus a build
// options string. The first request compiles through the runtime adapter
// and stores the program with its build log; later requests with an equal
// key get the same `Arc<ProgramCacheEntry>` back without touching the
// compiler.
//
// The key's options component is normalized (see `normalize_options`), but
// the adapter always receives the caller's string verbatim.
//
// The cache lock is held for the whole miss path, so two callers racing on
// the same key cannot both compile it. Host orchestration is single-threaded,
// so the lock is uncontended in practice.
//
// Failed builds are not stored. A build failure is fatal to the run.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result, SampleError};
use crate::runtime::{ContextId, ProgramId, RuntimeAdapter};

/// Where kernel source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    /// File name resolved against the cache's kernel root.
    Named(String),
    /// Source text supplied directly; `id` identifies it in the cache key.
    Inline { id: String, text: String },
}

impl KernelSource {
    pub fn named(name: impl Into<String>) -> Self {
        KernelSource::Named(name.into())
    }

    pub fn inline(id: impl Into<String>, text: impl Into<String>) -> Self {
        KernelSource::Inline { id: id.into(), text: text.into() }
    }

    /// Caller-facing identity, as it appears in logs and build errors.
    pub fn id(&self) -> &str {
        match self {
            KernelSource::Named(name) => name,
            KernelSource::Inline { id, .. } => id,
        }
    }

    /// Identity used in the cache key. Inline sources add a hash of their
    /// text, so reusing an id with different text compiles the new text.
    pub fn cache_id(&self) -> String {
        match self {
            KernelSource::Named(name) => name.clone(),
            KernelSource::Inline { id, text } => {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                format!("{id}#{:016x}", hasher.finish())
            }
        }
    }
}

/// Collapse whitespace runs and trim. Flag order is significant, so
/// "-D A=1 -D B=2" and "-D B=2 -D A=1" are different keys.
pub fn normalize_options(options: &str) -> String {
    options.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramCacheKey {
    pub context: ContextId,
    pub source_id: String,
    pub options: String,
}

impl ProgramCacheKey {
    pub fn new(context: ContextId, source_id: &str, options: &str) -> Self {
        ProgramCacheKey {
            context,
            source_id: source_id.to_string(),
            options: normalize_options(options),
        }
    }
}

/// A compiled program and the log its build produced.
#[derive(Debug)]
pub struct ProgramCacheEntry {
    pub program: ProgramId,
    /// Kept on success too; may hold warnings.
    pub build_log: String,
    pub source_id: String,
    pub options: String,
}

pub struct ProgramCache {
    kernel_root: PathBuf,
    entries: Mutex<HashMap<ProgramCacheKey, Arc<ProgramCacheEntry>>>,
    builds: AtomicUsize,
}

impl ProgramCache {
    pub fn new(kernel_root: impl Into<PathBuf>) -> Self {
        ProgramCache {
            kernel_root: kernel_root.into(),
            entries: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Number of compilations performed (hits do not count).
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &ProgramCacheKey) -> Option<Arc<ProgramCacheEntry>> {
        self.entries.lock().get(key).cloned()
    }

    /// Return the cached program for this key, compiling it on a miss.
    ///
    /// # Errors
    /// `SourceNotFound` if a named kernel cannot be read, `Build` with the
    /// full compiler log if compilation fails, `Runtime` if the adapter
    /// itself fails.
    pub fn get_or_build(
        &self,
        runtime: &dyn RuntimeAdapter,
        context: ContextId,
        source: &KernelSource,
        options: &str,
    ) -> Result<Arc<ProgramCacheEntry>> {
        let key = ProgramCacheKey::new(context, &source.cache_id(), options);

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            debug!(source = %source.id(), options = %key.options, "program cache hit");
            return Ok(Arc::clone(entry));
        }

        let text = self.load(source)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        let output = runtime.compile_program(context, &text, options)?;

        let program = match (output.success, output.program) {
            (true, Some(program)) => program,
            _ => {
                return Err(SampleError::Build(BuildError {
                    source_id: source.id().to_string(),
                    options: options.to_string(),
                    log: output.log,
                }));
            }
        };

        if output.log.lines().any(|l| l.starts_with("warning")) {
            warn!(source = %source.id(), "build produced warnings:\n{}", output.log);
        }
        info!(source = %source.id(), options = %key.options, program = %program, "program built");

        let entry = Arc::new(ProgramCacheEntry {
            program,
            build_log: output.log,
            source_id: source.id().to_string(),
            options: options.to_string(),
        });
        entries.insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    fn load(&self, source: &KernelSource) -> Result<String> {
        match source {
            KernelSource::Inline { text, .. } => Ok(text.clone()),
            KernelSource::Named(name) => {
                let path = self.kernel_root.join(name);
                std::fs::read_to_string(&path)
                    .map_err(|error| SampleError::SourceNotFound { path, error })
            }
        }
    }
}
