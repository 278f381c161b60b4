use std::{
    collections::HashSet,
    fmt::Display,
    path::{Path, PathBuf},
};

use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    find_up::find_up,
    io::{read_jsonc_from_file, FromFileError},
    path::absolutize,
};

/// Canonical configuration filename searched for during the ancestor walk.
pub const CONFIG_FILENAME: &str = "tsconfig.json";

/// The exclude patterns the TypeScript compiler applies when a configuration
/// does not specify any.
pub const DEFAULT_EXCLUDE: &[&str] = &["node_modules", "bower_components", "jspm_packages"];

/// A configuration with its extends chain fully flattened: the merged
/// compiler options and file-selection patterns that govern a set of files.
///
/// Constructed fresh per resolution call and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EffectiveConfig {
    /// Absolute path of the configuration file this was resolved from.
    pub source_path: PathBuf,
    /// Merged compiler options, in source order. Opaque beyond the handful
    /// of fields this tool inspects.
    pub compiler_options: Map<String, Value>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub files: Option<Vec<String>>,
}

impl EffectiveConfig {
    /// JavaScript-inclusion policy: `allowJs || checkJs`, both defaulting to
    /// false when absent.
    pub fn include_javascript(&self) -> bool {
        self.option_enabled("allowJs") || self.option_enabled("checkJs")
    }

    fn option_enabled(&self, key: &str) -> bool {
        matches!(self.compiler_options.get(key), Some(Value::Bool(true)))
    }

    /// Directory the configuration's relative patterns resolve against.
    pub fn directory(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn exclude_or_default(&self) -> Vec<String> {
        self.exclude.clone().unwrap_or_else(|| {
            DEFAULT_EXCLUDE
                .iter()
                .map(|pattern| (*pattern).to_owned())
                .collect()
        })
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub struct ResolveError {
    kind: ResolveErrorKind,
}

impl ResolveError {
    pub fn kind(&self) -> &ResolveErrorKind {
        &self.kind
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ResolveErrorKind::NotFound { file } => write!(
                f,
                "no {} found in any ancestor directory of {:?}",
                CONFIG_FILENAME, file
            ),
            ResolveErrorKind::MissingOverride { path } => {
                write!(f, "explicit configuration {:?} does not exist", path)
            }
            ResolveErrorKind::FromFile(_) => write!(f, "unable to load configuration"),
            ResolveErrorKind::ExtendsCycle { path } => write!(
                f,
                "cycle detected while resolving configuration extends: {:?}",
                path
            ),
            ResolveErrorKind::ExtendsTarget { specifier, config } => write!(
                f,
                "unable to resolve extends target {:?} referenced by {:?}",
                specifier, config
            ),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ResolveErrorKind::FromFile(err) => Some(err),
            ResolveErrorKind::NotFound { .. }
            | ResolveErrorKind::MissingOverride { .. }
            | ResolveErrorKind::ExtendsCycle { .. }
            | ResolveErrorKind::ExtendsTarget { .. } => None,
        }
    }
}

impl From<ResolveErrorKind> for ResolveError {
    fn from(kind: ResolveErrorKind) -> Self {
        Self { kind }
    }
}

impl From<FromFileError> for ResolveError {
    fn from(err: FromFileError) -> Self {
        Self {
            kind: ResolveErrorKind::FromFile(err),
        }
    }
}

#[derive(Debug)]
pub enum ResolveErrorKind {
    /// No configuration file exists between the input file and the
    /// filesystem root. Terminal for the affected file's group.
    #[non_exhaustive]
    NotFound { file: PathBuf },
    #[non_exhaustive]
    MissingOverride { path: PathBuf },
    #[non_exhaustive]
    FromFile(FromFileError),
    #[non_exhaustive]
    ExtendsCycle { path: PathBuf },
    #[non_exhaustive]
    ExtendsTarget { specifier: String, config: PathBuf },
}

/// On-disk shape of a single tsconfig file, before extends flattening.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    extends: Option<Extends>,
    #[serde(default)]
    compiler_options: Map<String, Value>,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

impl Extends {
    fn into_specifiers(self) -> Vec<String> {
        match self {
            Extends::One(specifier) => vec![specifier],
            Extends::Many(specifiers) => specifiers,
        }
    }
}

/// Locate the configuration file governing `file` via the ancestor walk.
pub fn find_config_for_file(file: &Path) -> Result<PathBuf, ResolveError> {
    let starting_directory = file.parent().unwrap_or_else(|| Path::new("."));
    find_up(starting_directory, CONFIG_FILENAME).ok_or_else(|| ResolveError {
        kind: ResolveErrorKind::NotFound {
            file: file.to_owned(),
        },
    })
}

/// Parse `config_path` and flatten its extends chain into one
/// [`EffectiveConfig`].
pub fn load_effective_config(config_path: &Path) -> Result<EffectiveConfig, ResolveError> {
    let mut visited = HashSet::new();
    let config_path = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_owned());
    let final_directory = config_path.parent().unwrap_or_else(|| Path::new("."));
    let raw = load_raw_config(&config_path, final_directory, &mut visited)?;
    trace!("flattened configuration for {:?}: {:?}", config_path, raw);
    Ok(EffectiveConfig {
        source_path: config_path.clone(),
        compiler_options: raw.compiler_options,
        include: raw.include,
        exclude: raw.exclude,
        files: raw.files,
    })
}

/// Resolve the configuration governing `file`.
///
/// When `explicit` is supplied it is used unconditionally for every file in
/// the run; otherwise the nearest ancestor configuration wins. Deterministic
/// for a fixed filesystem state.
pub fn resolve_for_file(
    file: &Path,
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<EffectiveConfig, ResolveError> {
    let config_path = match explicit {
        Some(explicit) => {
            let absolute = absolutize(cwd, explicit);
            if !absolute.is_file() {
                return Err(ResolveError {
                    kind: ResolveErrorKind::MissingOverride { path: absolute },
                });
            }
            absolute
        }
        None => find_config_for_file(file)?,
    };
    load_effective_config(&config_path)
}

fn load_raw_config(
    path: &Path,
    final_directory: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<RawConfig, ResolveError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_owned());
    // `visited` is a stack of the chain currently being resolved, so diamond
    // inheritance is legal and only true cycles are rejected.
    if !visited.insert(canonical.clone()) {
        return Err(ResolveError {
            kind: ResolveErrorKind::ExtendsCycle { path: canonical },
        });
    }

    let result = load_raw_config_inner(&canonical, final_directory, visited);
    visited.remove(&canonical);
    result
}

fn load_raw_config_inner(
    canonical: &Path,
    final_directory: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<RawConfig, ResolveError> {
    let mut current: RawConfig = read_jsonc_from_file(canonical)?;
    let config_directory = canonical.parent().unwrap_or_else(|| Path::new("."));
    rebase_raw_config(&mut current, config_directory, final_directory);

    let Some(extends) = current.extends.take() else {
        return Ok(current);
    };

    // Bases merge left to right, with later entries overriding earlier ones
    // and the extending configuration overriding them all.
    let mut merged_base = RawConfig::default();
    for specifier in extends.into_specifiers() {
        let target = resolve_extends_target(config_directory, &specifier).ok_or_else(|| {
            ResolveError {
                kind: ResolveErrorKind::ExtendsTarget {
                    specifier: specifier.clone(),
                    config: canonical.to_owned(),
                },
            }
        })?;
        let base = load_raw_config(&target, final_directory, visited)?;
        merged_base = merge_raw_configs(merged_base, base);
    }

    Ok(merge_raw_configs(merged_base, current))
}

/// Resolve an `extends` specifier the way the compiler's module resolution
/// does: relative and absolute paths directly, bare specifiers through the
/// nearest `node_modules` directory of any ancestor.
fn resolve_extends_target(config_directory: &Path, specifier: &str) -> Option<PathBuf> {
    if specifier.starts_with('.') || Path::new(specifier).is_absolute() {
        let candidate = absolutize(config_directory, Path::new(specifier));
        return resolve_extends_file(&candidate);
    }

    for ancestor in config_directory.ancestors() {
        let candidate = ancestor.join("node_modules").join(specifier);
        if let Some(resolved) = resolve_extends_file(&candidate) {
            return Some(resolved);
        }
    }
    None
}

fn resolve_extends_file(candidate: &Path) -> Option<PathBuf> {
    let mut attempts = vec![candidate.to_owned()];
    if candidate.extension().is_none() {
        attempts.push(candidate.with_extension("json"));
    }
    if candidate.is_dir() {
        attempts.push(candidate.join(CONFIG_FILENAME));
    }

    attempts.into_iter().find(|attempt| attempt.is_file())
}

/// Child `files`/`include`/`exclude` fully replace the parent's; compiler
/// options merge key-by-key with the child winning on conflicts.
fn merge_raw_configs(base: RawConfig, overlay: RawConfig) -> RawConfig {
    let mut compiler_options = base.compiler_options;
    for (key, value) in overlay.compiler_options {
        compiler_options.insert(key, value);
    }
    RawConfig {
        extends: None,
        compiler_options,
        files: overlay.files.or(base.files),
        include: overlay.include.or(base.include),
        exclude: overlay.exclude.or(base.exclude),
    }
}

/// Relative paths inside an extended configuration resolve against the file
/// they appear in, not against the extending file. Rewrite them so the
/// flattened configuration reads correctly from `to` instead.
fn rebase_raw_config(config: &mut RawConfig, from: &Path, to: &Path) {
    if from == to {
        return;
    }
    for list in [&mut config.files, &mut config.include, &mut config.exclude]
        .into_iter()
        .flatten()
    {
        for entry in list.iter_mut() {
            *entry = rebase_pattern(entry, from, to);
        }
    }
    for key in ["baseUrl", "rootDir", "declarationDir"] {
        if let Some(Value::String(value)) = config.compiler_options.get(key) {
            let rebased = rebase_pattern(value, from, to);
            config
                .compiler_options
                .insert(key.to_owned(), Value::String(rebased));
        }
    }
    for key in ["rootDirs", "typeRoots"] {
        if let Some(Value::Array(values)) = config.compiler_options.get_mut(key) {
            for value in values.iter_mut() {
                if let Value::String(entry) = value {
                    *value = Value::String(rebase_pattern(entry, from, to));
                }
            }
        }
    }
}

/// Anchor relative path-valued compiler options to `directory`, so the
/// options stay meaningful when written into a configuration file that lives
/// somewhere else (the temp directory).
pub(crate) fn absolutize_path_options(options: &mut Map<String, Value>, directory: &Path) {
    for key in ["baseUrl", "rootDir", "declarationDir", "outDir"] {
        if let Some(Value::String(value)) = options.get(key) {
            if !Path::new(value).is_absolute() {
                let rebased = directory.join(value).to_string_lossy().into_owned();
                options.insert(key.to_owned(), Value::String(rebased));
            }
        }
    }
    for key in ["rootDirs", "typeRoots"] {
        if let Some(Value::Array(values)) = options.get_mut(key) {
            for value in values.iter_mut() {
                if let Value::String(entry) = value {
                    if !Path::new(entry.as_str()).is_absolute() {
                        *value = Value::String(
                            directory.join(entry.as_str()).to_string_lossy().into_owned(),
                        );
                    }
                }
            }
        }
    }
}

fn rebase_pattern(pattern: &str, from: &Path, to: &Path) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_owned();
    }
    let absolute = absolutize(from, Path::new(pattern));
    match absolute.strip_prefix(to) {
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => absolute.to_string_lossy().into_owned(),
    }
}
