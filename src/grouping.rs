use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    path::{Path, PathBuf},
};

use globwalk::{FileType, GlobWalkerBuilder};
use log::{debug, warn};

use crate::{
    config::{self, EffectiveConfig, ResolveError, ResolveErrorKind},
    extensions, path,
};

/// A partition of the input file set sharing one governing configuration,
/// checked together in one compiler invocation.
#[derive(Debug)]
pub struct FileGroup {
    /// Grouping key: absolute path of the governing configuration file.
    pub config_path: PathBuf,
    pub config: EffectiveConfig,
    /// Absolute input paths, unique, in first-seen input order.
    pub files: Vec<PathBuf>,
    pub include_javascript: bool,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct GroupError {
    kind: GroupErrorKind,
}

impl GroupError {
    pub fn kind(&self) -> &GroupErrorKind {
        &self.kind
    }
}

impl Display for GroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            GroupErrorKind::ConfigNotFound { files } => {
                writeln!(
                    f,
                    "no {} governs {} input file(s):",
                    config::CONFIG_FILENAME,
                    files.len()
                )?;
                for file in files {
                    writeln!(f, "  {:?}", file)?;
                }
                write!(f, "pass --project to supply a configuration explicitly")
            }
            GroupErrorKind::Resolve(_) => write!(f, "unable to resolve configuration"),
        }
    }
}

impl std::error::Error for GroupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            GroupErrorKind::ConfigNotFound { .. } => None,
            GroupErrorKind::Resolve(err) => Some(err),
        }
    }
}

impl From<ResolveError> for GroupError {
    fn from(err: ResolveError) -> Self {
        Self {
            kind: GroupErrorKind::Resolve(err),
        }
    }
}

#[derive(Debug)]
pub enum GroupErrorKind {
    /// One or more input files have no configuration in their ancestry.
    /// Aggregated so a single run reports every affected file at once.
    #[non_exhaustive]
    ConfigNotFound { files: Vec<PathBuf> },
    #[non_exhaustive]
    Resolve(ResolveError),
}

/// Expand raw user input (files, directories, globs) into concrete absolute
/// paths and partition them by governing configuration.
///
/// The union of all group file sets equals the deduplicated, fully-expanded
/// input set: no file is lost, none appears in two groups.
pub fn group_files(
    inputs: &[String],
    cwd: &Path,
    explicit_config: Option<&Path>,
) -> Result<Vec<FileGroup>, GroupError> {
    let expanded = expand_inputs(inputs, cwd);
    debug!("expanded {} input(s) into {} file(s)", inputs.len(), expanded.files.len());

    // One parse per distinct configuration file, reused across inputs.
    let mut configs_by_path: HashMap<PathBuf, EffectiveConfig> = HashMap::new();
    let mut groups: Vec<FileGroup> = Vec::new();
    let mut group_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut missing: Vec<PathBuf> = Vec::new();

    for file in &expanded.files {
        let config_path = match explicit_config {
            // Canonicalized so the grouping key agrees with the loaded
            // configuration's source_path even through a symlink.
            Some(explicit) => {
                let absolute = path::absolutize(cwd, explicit);
                absolute.canonicalize().unwrap_or(absolute)
            }
            None => match config::find_config_for_file(file) {
                Ok(config_path) => config_path,
                Err(err) => match err.kind() {
                    ResolveErrorKind::NotFound { .. } => {
                        missing.push(file.clone());
                        continue;
                    }
                    _ => return Err(err.into()),
                },
            },
        };

        if !configs_by_path.contains_key(&config_path) {
            let loaded = match explicit_config {
                Some(explicit) => config::resolve_for_file(file, Some(explicit), cwd)?,
                None => config::load_effective_config(&config_path)?,
            };
            configs_by_path.insert(config_path.clone(), loaded);
        }
        let config = &configs_by_path[&config_path];

        let index = *group_index.entry(config_path.clone()).or_insert_with(|| {
            groups.push(FileGroup {
                config_path: config_path.clone(),
                config: config.clone(),
                files: Vec::new(),
                include_javascript: config.include_javascript(),
            });
            groups.len() - 1
        });
        groups[index].files.push(file.clone());
    }

    if !missing.is_empty() {
        return Err(GroupError {
            kind: GroupErrorKind::ConfigNotFound { files: missing },
        });
    }

    // Directory and glob expansion ran with a conservative JS-inclusive
    // matcher; reconcile each group against its real policy now that the
    // governing configuration is known.
    for group in &mut groups {
        if group.include_javascript {
            continue;
        }
        group.files.retain(|file| {
            if !extensions::is_javascript_file(file) {
                return true;
            }
            if expanded.direct.contains(file) {
                // Explicit user intent outweighs the configuration policy.
                warn!(
                    "including {:?} although {:?} does not enable allowJs/checkJs",
                    file, group.config_path
                );
                return true;
            }
            debug!(
                "dropping expanded JavaScript file {:?}: {:?} does not enable allowJs/checkJs",
                file, group.config_path
            );
            false
        });
    }
    groups.retain(|group| !group.files.is_empty());

    Ok(groups)
}

struct ExpandedInputs {
    /// All concrete files, absolute, deduplicated, input order preserved.
    files: Vec<PathBuf>,
    /// The subset that was passed as a direct file reference.
    direct: HashSet<PathBuf>,
}

fn expand_inputs(inputs: &[String], cwd: &Path) -> ExpandedInputs {
    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut direct = HashSet::new();
    let mut push_unique = |file: PathBuf, files: &mut Vec<PathBuf>| {
        if seen.insert(file.clone()) {
            files.push(file);
        }
    };

    for input in inputs {
        let absolute = path::absolutize(cwd, Path::new(input));

        // Existing files are used as-is, so special characters in a literal
        // filename are never mis-read as glob metacharacters.
        if absolute.is_file() {
            direct.insert(absolute.clone());
            push_unique(absolute, &mut files);
            continue;
        }

        if absolute.is_dir() {
            for file in expand_directory(&absolute) {
                push_unique(file, &mut files);
            }
            continue;
        }

        if path::is_glob_pattern(input) {
            for file in expand_glob(cwd, input) {
                push_unique(file, &mut files);
            }
            continue;
        }

        warn!("input {:?} does not exist; skipping", input);
    }

    ExpandedInputs { files, direct }
}

/// Expand a directory input to `directory/**/*.<ext>` for every candidate
/// extension. The per-directory JS policy is not known yet, so expansion is
/// JS-inclusive and reconciled later against the governing configuration.
fn expand_directory(directory: &Path) -> Vec<PathBuf> {
    let patterns: Vec<String> = extensions::source_extensions(true)
        .iter()
        .map(|extension| format!("**/*{}", extension))
        .collect();
    walk_patterns(directory, &patterns)
}

fn expand_glob(cwd: &Path, pattern: &str) -> Vec<PathBuf> {
    // An absolute pattern cannot be walked relative to cwd; anchor the walk
    // at its longest literal directory prefix instead.
    let (base, relative) = if Path::new(pattern).is_absolute() {
        split_glob_base(Path::new(pattern))
    } else {
        (cwd.to_owned(), pattern.to_owned())
    };
    let mut matches = walk_patterns(&base, &[relative]);
    matches.retain(|file| extensions::is_candidate_input(file, true));
    if !matches.is_empty() {
        return matches;
    }

    // Expansion produced nothing (possibly because the walker rejected the
    // pattern). Fall back to treating the pattern as a literal path rather
    // than silently dropping the input.
    debug!("glob {:?} matched nothing; trying literal fallback", pattern);
    let literal = path::absolutize(cwd, Path::new(pattern));
    if literal.is_file() && extensions::is_candidate_input(&literal, true) {
        return vec![literal];
    }
    Vec::new()
}

/// Split an absolute glob into its longest glob-free directory prefix and
/// the remaining pattern relative to it.
fn split_glob_base(pattern: &Path) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !path::is_glob_pattern(&text) {
            base.push(component);
        } else {
            rest.push(text.into_owned());
        }
    }
    (base, rest.join("/"))
}

fn walk_patterns(base: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let walker = match GlobWalkerBuilder::from_patterns(base, patterns)
        .file_type(FileType::FILE)
        .min_depth(0)
        .build()
    {
        Ok(walker) => walker,
        Err(err) => {
            debug!("unable to build glob walker for {:?}: {}", patterns, err);
            return Vec::new();
        }
    };

    let mut matches: Vec<PathBuf> = walker
        .filter_map(|maybe_entry| match maybe_entry {
            Ok(entry) => Some(entry.into_path()),
            Err(err) => {
                debug!("glob walk error under {:?}: {}", base, err);
                None
            }
        })
        .filter(|file| !path::contains_node_modules(file))
        .collect();
    matches.sort_unstable();
    matches
}
