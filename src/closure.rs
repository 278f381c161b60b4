use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
    string,
    sync::Mutex,
    time::UNIX_EPOCH,
};

use globwalk::{FileType, GlobWalkerBuilder};
use log::{debug, trace};
use regex::Regex;
use serde_json::{json, Value};

use crate::{
    config::{self, EffectiveConfig},
    extensions,
    io::read_to_string,
    path,
};

/// Extensions of generated or ambient type sources that are never imported
/// and so can only be found by globbing, not by following the import graph.
const AMBIENT_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts", ".gen.ts"];

const SETUP_FILE_CANDIDATES: &[&str] = &[
    "tests/setup.ts",
    "test/setup.ts",
    "__tests__/setup.ts",
    "spec/setup.ts",
    "src/test/setup.ts",
    "src/spec/setup.ts",
    "jest.setup.ts",
    "jest.setup.js",
    "vitest.setup.ts",
];

const TEST_FRAMEWORK_CONFIGS: &[&str] = &[
    "jest.config.js",
    "jest.config.ts",
    "jest.config.cjs",
    "jest.config.mjs",
    "jest.config.json",
    "vitest.config.ts",
    "vitest.config.js",
    "vitest.config.mts",
];

const TEST_PATH_SEGMENTS: &[&str] = &["tests", "__tests__", "test", "spec"];

/// Outcome of closure discovery for one group.
///
/// A tagged result instead of a boolean-plus-nullable pair: every consumer
/// must handle the fallback branch explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Closure {
    /// The compiler enumerated the program. `source_files` is a sorted
    /// superset of the group's root files with nothing under node_modules.
    Discovered {
        source_files: Vec<PathBuf>,
        /// Files added by the test-setup heuristic, reported separately for
        /// user transparency.
        setup_files: Vec<PathBuf>,
    },
    /// Discovery failed; the caller must fall back to the original
    /// include/exclude patterns. Correctness over speed.
    Fallback,
}

#[derive(Clone, Debug)]
struct CacheEntry {
    source_files: Vec<PathBuf>,
    setup_files: Vec<PathBuf>,
    mtime_hash: String,
    ambient_count: usize,
}

/// Process-lifetime cache of discovered closures, keyed by a fingerprint of
/// the configuration content, root files, and include/exclude patterns.
///
/// An explicit object rather than a module-level singleton so tests can
/// construct isolated instances. Safe for concurrent use across group
/// pipelines; a lost insert race recomputes a deterministic value, which is
/// harmless.
#[derive(Debug, Default)]
pub struct ClosureCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ClosureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn insert(&self, key: String, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, entry);
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub struct ListFilesError {
    kind: ListFilesErrorKind,
}

impl Display for ListFilesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ListFilesErrorKind::Command(_) => write!(f, "unable to spawn child process"),
            ListFilesErrorKind::TypescriptCompiler { command, error } => {
                writeln!(
                    f,
                    "tsc exited with non-zero status code for command {:?}:",
                    command
                )?;
                write!(f, "{:?}", error)
            }
            ListFilesErrorKind::InvalidUtf8(_) => {
                write!(f, "command output included invalid UTF-8")
            }
        }
    }
}

impl std::error::Error for ListFilesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ListFilesErrorKind::Command(err) => Some(err),
            ListFilesErrorKind::TypescriptCompiler { .. } => None,
            ListFilesErrorKind::InvalidUtf8(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum ListFilesErrorKind {
    #[non_exhaustive]
    Command(std::io::Error),
    #[non_exhaustive]
    TypescriptCompiler { command: String, error: Vec<u8> },
    #[non_exhaustive]
    InvalidUtf8(string::FromUtf8Error),
}

impl From<ListFilesErrorKind> for ListFilesError {
    fn from(kind: ListFilesErrorKind) -> Self {
        Self { kind }
    }
}

impl From<string::FromUtf8Error> for ListFilesErrorKind {
    fn from(err: string::FromUtf8Error) -> Self {
        Self::InvalidUtf8(err)
    }
}

/// Boundary to the TypeScript front end.
///
/// Faithfully reproducing the compiler's module resolution and type-directed
/// import following risks exactly the subtle incorrectness this tool exists
/// to avoid, so program construction is delegated to a real compiler behind
/// this trait.
pub trait FileLister: Sync {
    /// Enumerate every file the compiler would load for the given project.
    fn list_program_files(&self, project: &Path, cwd: &Path)
        -> Result<Vec<PathBuf>, ListFilesError>;
}

/// Production lister: invoke the TypeScript compiler with the
/// [listFilesOnly] flag as the source of truth for program membership.
///
/// [listfilesonly]: https://www.typescriptlang.org/docs/handbook/compiler-options.html#compiler-options
#[derive(Debug)]
pub struct TscFileLister {
    pub command: String,
}

impl FileLister for TscFileLister {
    fn list_program_files(
        &self,
        project: &Path,
        cwd: &Path,
    ) -> Result<Vec<PathBuf>, ListFilesError> {
        (|| {
            let child = Command::new(&self.command)
                .arg("--listFilesOnly")
                .arg("--project")
                .arg(project)
                .current_dir(cwd)
                .output()
                .map_err(ListFilesErrorKind::Command)?;
            if child.status.code() != Some(0) {
                return Err(ListFilesErrorKind::TypescriptCompiler {
                    command: format!(
                        "{} --listFilesOnly --project {:?}",
                        self.command, project
                    ),
                    error: child.stderr,
                });
            }
            let stdout = String::from_utf8(child.stdout)?;

            Ok(stdout
                .lines()
                // Drop the empty newline at the end of stdout
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect())
        })()
        .map_err(|kind| ListFilesError { kind })
    }
}

/// Determine the set of files the compiler must see to type-check `roots`
/// correctly: the roots, everything they transitively reach, and the ambient
/// declaration files that are never imported at all.
///
/// Never fails: any internal error degrades to [`Closure::Fallback`], logged
/// at debug level only.
pub fn discover(
    config: &EffectiveConfig,
    roots: &[PathBuf],
    include_files: &[PathBuf],
    cwd: &Path,
    cache: &ClosureCache,
    lister: &dyn FileLister,
) -> Closure {
    let key = cache_key(config, roots);
    let ambient_files = ambient_declaration_files(config);

    if let Some(entry) = cache.lookup(&key) {
        // A new file matching an include pattern is invisible to an mtime
        // hash over the previously cached set, hence the second check.
        if entry.ambient_count == ambient_files.len()
            && mtime_hash(&entry.source_files) == entry.mtime_hash
        {
            trace!("closure cache hit for {:?}", config.source_path);
            return Closure::Discovered {
                source_files: entry.source_files,
                setup_files: entry.setup_files,
            };
        }
        debug!("closure cache entry for {:?} is stale", config.source_path);
    }

    match discover_uncached(config, roots, include_files, &ambient_files, cwd, lister) {
        Ok((source_files, setup_files)) => {
            cache.insert(
                key,
                CacheEntry {
                    source_files: source_files.clone(),
                    setup_files: setup_files.clone(),
                    mtime_hash: mtime_hash(&source_files),
                    ambient_count: ambient_files.len(),
                },
            );
            Closure::Discovered {
                source_files,
                setup_files,
            }
        }
        Err(failure) => {
            debug!(
                "closure discovery failed for {:?}, falling back to include patterns: {}",
                config.source_path, failure
            );
            Closure::Fallback
        }
    }
}

#[derive(Debug)]
enum DiscoveryFailure {
    Temp(std::io::Error),
    Serialize(serde_json::Error),
    List(ListFilesError),
}

impl Display for DiscoveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryFailure::Temp(err) => write!(f, "unable to create probe configuration: {}", err),
            DiscoveryFailure::Serialize(err) => {
                write!(f, "unable to serialize probe configuration: {}", err)
            }
            DiscoveryFailure::List(err) => write!(f, "unable to enumerate program files: {}", err),
        }
    }
}

impl From<ListFilesError> for DiscoveryFailure {
    fn from(err: ListFilesError) -> Self {
        Self::List(err)
    }
}

fn discover_uncached(
    config: &EffectiveConfig,
    roots: &[PathBuf],
    include_files: &[PathBuf],
    ambient_files: &[PathBuf],
    cwd: &Path,
    lister: &dyn FileLister,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), DiscoveryFailure> {
    let probe = write_probe_config(config, roots)?;
    let listed = lister.list_program_files(probe.path(), cwd)?;
    trace!("compiler listed {} file(s)", listed.len());

    let include_js = config.include_javascript();
    let scope = [config.directory(), cwd];
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut source_files: Vec<PathBuf> = Vec::new();
    let mut push_unique = |file: PathBuf, source_files: &mut Vec<PathBuf>| {
        if seen.insert(file.clone()) {
            source_files.push(file);
        }
    };

    for file in roots {
        push_unique(path::absolutize(cwd, file), &mut source_files);
    }

    for file in listed {
        let file = path::absolutize(cwd, &file);
        if path::contains_node_modules(&file) {
            continue;
        }
        // Default library declarations shipped next to the compiler binary
        // are resolved by tsc on its own. Anything else outside the project
        // is a real dependency (a cross-package import) and must stay.
        if is_default_library(&file) && !path::is_under_any(&file, &scope) {
            continue;
        }
        if !extensions::matches_source_extension(&file, include_js)
            && !extensions::is_declaration_file(&file)
        {
            continue;
        }
        push_unique(file, &mut source_files);
    }

    for file in include_files {
        push_unique(path::absolutize(cwd, file), &mut source_files);
    }

    let setup_files = if include_files.is_empty() && looks_like_test_run(roots) {
        find_setup_files(config.directory())
    } else {
        Vec::new()
    };
    for file in &setup_files {
        push_unique(file.clone(), &mut source_files);
    }

    for file in ambient_files {
        push_unique(file.clone(), &mut source_files);
    }

    source_files.sort_unstable();
    Ok((source_files, setup_files))
}

/// Write a temporary project rooted at exactly `roots`, with `noEmit` and
/// `skipLibCheck` so the compiler does not crawl unrelated library trees
/// during discovery.
fn write_probe_config(
    config: &EffectiveConfig,
    roots: &[PathBuf],
) -> Result<tempfile::NamedTempFile, DiscoveryFailure> {
    let mut options = config.compiler_options.clone();
    options.insert("noEmit".to_owned(), Value::Bool(true));
    options.insert("skipLibCheck".to_owned(), Value::Bool(true));
    // The probe lives in the temp directory, so relative baseUrl/typeRoots
    // etc. would resolve against the wrong tree and skew the listing.
    config::absolutize_path_options(&mut options, config.directory());

    let body = json!({
        "compilerOptions": Value::Object(options),
        "files": roots
            .iter()
            .map(|root| root.to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
    });

    let mut probe = tempfile::Builder::new()
        .prefix("tsc-scoped-probe-")
        .suffix(".json")
        .tempfile()
        .map_err(DiscoveryFailure::Temp)?;
    let rendered = serde_json::to_vec_pretty(&body).map_err(DiscoveryFailure::Serialize)?;
    probe
        .write_all(&rendered)
        .and_then(|()| probe.flush())
        .map_err(DiscoveryFailure::Temp)?;
    Ok(probe)
}

/// Fingerprint of everything that determines a discovery result for a fixed
/// filesystem state.
fn cache_key(config: &EffectiveConfig, roots: &[PathBuf]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config.source_path.to_string_lossy().as_bytes());
    hasher.update(
        serde_json::to_string(&config.compiler_options)
            .unwrap_or_default()
            .as_bytes(),
    );

    let mut sorted_roots: Vec<&PathBuf> = roots.iter().collect();
    sorted_roots.sort_unstable();
    for root in sorted_roots {
        hasher.update(root.to_string_lossy().as_bytes());
        hasher.update(b"\0");
    }

    for patterns in [&config.include, &config.exclude, &config.files] {
        let mut sorted: Vec<&String> = patterns.iter().flatten().collect();
        sorted.sort_unstable();
        for pattern in sorted {
            hasher.update(pattern.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x01");
    }

    hasher.finalize().to_hex().to_string()
}

/// Hash of (path, mtime) for every file in `files`. Any modification to a
/// previously discovered file changes this value and invalidates the entry.
fn mtime_hash(files: &[PathBuf]) -> String {
    let mut hasher = blake3::Hasher::new();
    for file in files {
        hasher.update(file.to_string_lossy().as_bytes());
        let stamp = fs::metadata(file)
            .and_then(|metadata| metadata.modified())
            .map(|modified| {
                modified
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            })
            .unwrap_or(u128::MAX);
        hasher.update(&stamp.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Glob for ambient declaration and generated type files matching the
/// configuration's own include patterns. These provide global types without
/// ever being imported, so the program walk alone always misses them.
fn ambient_declaration_files(config: &EffectiveConfig) -> Vec<PathBuf> {
    let include = config
        .include
        .clone()
        .unwrap_or_else(|| vec!["**/*".to_owned()]);
    let patterns = ambient_patterns(&include);
    if patterns.is_empty() {
        return Vec::new();
    }

    let base = config.directory();
    let walker = match GlobWalkerBuilder::from_patterns(base, &patterns)
        .file_type(FileType::FILE)
        .min_depth(0)
        .build()
    {
        Ok(walker) => walker,
        Err(err) => {
            debug!("unable to glob ambient declarations: {}", err);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = walker
        .filter_map(|maybe_entry| maybe_entry.ok())
        .map(|entry| entry.into_path())
        .filter(|file| !path::contains_node_modules(file))
        .collect();
    files.sort_unstable();
    files.dedup();
    files
}

/// Transform include patterns into their declaration-file equivalents:
/// `src/**/*` becomes `src/**/*.d.ts`, a bare directory becomes
/// `dir/**/*.d.ts`, and patterns that already name an extension derive
/// nothing.
fn ambient_patterns(include: &[String]) -> Vec<String> {
    let mut patterns = Vec::new();
    for pattern in include {
        let pattern = pattern.trim_end_matches('/');
        if pattern.is_empty() {
            continue;
        }
        if pattern.ends_with('*') {
            let base = if pattern.ends_with("**") {
                format!("{}/*", pattern)
            } else {
                pattern.to_owned()
            };
            for suffix in AMBIENT_SUFFIXES {
                patterns.push(format!("{}{}", base, suffix));
            }
        } else if !path::is_glob_pattern(pattern) && Path::new(pattern).extension().is_none() {
            for suffix in AMBIENT_SUFFIXES {
                patterns.push(format!("{}/**/*{}", pattern, suffix));
            }
        }
    }
    patterns
}

/// Whether `file` looks like one of the compiler's bundled `lib.*.d.ts`
/// default libraries.
fn is_default_library(file: &Path) -> bool {
    match file.file_name().and_then(|name| name.to_str()) {
        Some(name) => name.starts_with("lib.") && name.ends_with(".d.ts"),
        None => false,
    }
}

fn looks_like_test_run(roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| {
        root.components().any(|component| {
            TEST_PATH_SEGMENTS
                .iter()
                .any(|segment| component.as_os_str() == *segment)
        })
    })
}

/// Best-effort search for test-framework global setup files: conventional
/// locations first, then a scan of recognized framework configurations for a
/// `setupFiles`-like key. A convenience, not a contract; `--include` is the
/// explicit escape hatch.
fn find_setup_files(config_directory: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();

    for candidate in SETUP_FILE_CANDIDATES {
        let path = config_directory.join(candidate);
        if path.is_file() {
            found.push(path);
        }
    }

    let setup_key =
        Regex::new(r#"setupFiles\w*["']?\s*:\s*\[([^\]]*)\]"#).expect("setup-file pattern is valid");
    let quoted_entry = Regex::new(r#"["']([^"']+)["']"#).expect("quoted-entry pattern is valid");

    for config_name in TEST_FRAMEWORK_CONFIGS {
        let config_path = config_directory.join(config_name);
        if !config_path.is_file() {
            continue;
        }
        let contents = match read_to_string(&config_path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("unable to scan {:?} for setup files: {}", config_path, err);
                continue;
            }
        };
        for listing in setup_key.captures_iter(&contents) {
            for entry in quoted_entry.captures_iter(&listing[1]) {
                let reference = entry[1].trim_start_matches("<rootDir>/");
                let path = config_directory.join(reference);
                if path.is_file() {
                    found.push(path);
                }
            }
        }
    }

    found.sort_unstable();
    found.dedup();
    found
}
