use std::{
    fmt::Display,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::trace;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::{
    closure::Closure,
    config::{self, EffectiveConfig},
    path::absolutize,
};

/// A temporary, self-contained configuration for one group's compiler
/// invocation.
///
/// The backing file is created with an unpredictable name and restrictive
/// permissions in the system temporary directory, never in the project tree.
/// Dropping this value deletes the file, so cleanup happens on every exit
/// path including panics.
#[derive(Debug)]
pub struct SyntheticConfig {
    file: NamedTempFile,
}

impl SyntheticConfig {
    /// Path to pass to the compiler as `--project`.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for SyntheticConfig {
    fn drop(&mut self) {
        deregister(self.file.path());
    }
}

/// Paths of every synthetic configuration currently alive, so a signal
/// handler can remove them before the process dies without unwinding.
static ACTIVE_CONFIGS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn register(path: &Path) {
    if let Ok(mut active) = ACTIVE_CONFIGS.lock() {
        active.push(path.to_owned());
    }
}

fn deregister(path: &Path) {
    if let Ok(mut active) = ACTIVE_CONFIGS.lock() {
        active.retain(|registered| registered != path);
    }
}

/// Remove every live synthetic configuration from disk. Best-effort, for use
/// from a termination handler; normal cleanup happens on drop.
pub fn remove_registered_files() {
    if let Ok(mut active) = ACTIVE_CONFIGS.lock() {
        for path in active.drain(..) {
            let _ = fs::remove_file(&path);
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub struct SynthesizeError {
    kind: SynthesizeErrorKind,
}

impl Display for SynthesizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SynthesizeErrorKind::Temp(_) => {
                write!(f, "unable to create temporary configuration file")
            }
            SynthesizeErrorKind::Write(_) => {
                write!(f, "unable to write temporary configuration file")
            }
            SynthesizeErrorKind::Serialize(_) => {
                write!(f, "unable to serialize synthetic configuration")
            }
        }
    }
}

impl std::error::Error for SynthesizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SynthesizeErrorKind::Temp(err) => Some(err),
            SynthesizeErrorKind::Write(err) => Some(err),
            SynthesizeErrorKind::Serialize(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum SynthesizeErrorKind {
    #[non_exhaustive]
    Temp(std::io::Error),
    #[non_exhaustive]
    Write(std::io::Error),
    #[non_exhaustive]
    Serialize(serde_json::Error),
}

/// Emit the narrowed configuration for one group.
///
/// Compiler options are inlined rather than referenced through `extends`,
/// because relative references would not resolve from the temporary file's
/// directory. `noEmit` is always forced; nothing else about the original
/// semantics is widened.
///
/// With a discovered closure, `files` is restricted to exactly the closure.
/// On fallback, the original include/exclude patterns are carried over
/// unchanged (rebased to absolute paths) together with the root files, so
/// the check stays correct at the cost of checking more files.
pub fn synthesize(
    config: &EffectiveConfig,
    closure: &Closure,
    roots: &[PathBuf],
    skip_lib_check: bool,
) -> Result<SyntheticConfig, SynthesizeError> {
    let directory = config.directory();

    let mut options = config.compiler_options.clone();
    options.insert("noEmit".to_owned(), Value::Bool(true));
    if skip_lib_check {
        options.insert("skipLibCheck".to_owned(), Value::Bool(true));
    }
    config::absolutize_path_options(&mut options, directory);

    let mut body = Map::new();
    body.insert("compilerOptions".to_owned(), Value::Object(options));

    match closure {
        Closure::Discovered { source_files, .. } => {
            body.insert("files".to_owned(), path_array(source_files));
        }
        Closure::Fallback => {
            let absolute_roots: Vec<PathBuf> = roots
                .iter()
                .map(|root| absolutize(directory, root))
                .collect();
            body.insert("files".to_owned(), path_array(&absolute_roots));

            // An absent include plus an explicit files list would suppress
            // the compiler's implicit whole-directory include, silently
            // narrowing the fallback. Make the default explicit instead.
            let include = config
                .include
                .clone()
                .unwrap_or_else(|| vec!["**/*".to_owned()]);
            body.insert(
                "include".to_owned(),
                pattern_array(&include, directory),
            );
            body.insert(
                "exclude".to_owned(),
                pattern_array(&config.exclude_or_default(), directory),
            );
        }
    }

    let mut file = tempfile::Builder::new()
        .prefix("tsc-scoped-")
        .suffix(".json")
        .tempfile()
        .map_err(|err| SynthesizeError {
            kind: SynthesizeErrorKind::Temp(err),
        })?;

    let rendered =
        serde_json::to_vec_pretty(&Value::Object(body)).map_err(|err| SynthesizeError {
            kind: SynthesizeErrorKind::Serialize(err),
        })?;
    file.write_all(&rendered)
        .and_then(|()| file.flush())
        .map_err(|err| SynthesizeError {
            kind: SynthesizeErrorKind::Write(err),
        })?;

    trace!(
        "synthesized configuration for {:?} at {:?}",
        config.source_path,
        file.path()
    );
    register(file.path());
    Ok(SyntheticConfig { file })
}

fn path_array(paths: &[PathBuf]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|path| Value::String(path.to_string_lossy().into_owned()))
            .collect(),
    )
}

/// Include/exclude patterns resolve relative to the configuration file, and
/// the synthetic file lives in the temp directory, so relative patterns are
/// anchored to the original configuration's directory.
fn pattern_array(patterns: &[String], directory: &Path) -> Value {
    Value::Array(
        patterns
            .iter()
            .map(|pattern| {
                if Path::new(pattern).is_absolute() {
                    Value::String(pattern.clone())
                } else {
                    Value::String(
                        directory.join(pattern).to_string_lossy().into_owned(),
                    )
                }
            })
            .collect(),
    )
}
