use std::path::{Component, Path, PathBuf};

/// Whether `pattern` contains unescaped glob metacharacters.
///
/// Parentheses and dollar signs are legal in filenames and are deliberately
/// not treated as glob syntax, so a literal path like `src/file.(test).ts`
/// is never routed through glob expansion.
pub fn is_glob_pattern(pattern: &str) -> bool {
    let mut escaped = false;
    for character in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match character {
            '\\' => escaped = true,
            '*' | '?' | '{' | '}' | '[' | ']' => return true,
            _ => {}
        }
    }
    false
}

/// Resolve `path` against `cwd` and normalize it lexically, without touching
/// the filesystem (the path may not exist yet).
pub fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_owned()
    } else {
        cwd.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// External dependencies resolve their own types; nothing under a
/// node_modules segment may be force-included in a scoped check.
pub fn contains_node_modules(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == "node_modules")
}

/// Whether `file` lives under any of the given scope roots.
pub(crate) fn is_under_any(file: &Path, roots: &[&Path]) -> bool {
    roots.iter().any(|root| file.starts_with(root))
}
