use std::path::Path;

/// Extensions the TypeScript compiler always treats as checkable sources.
pub const TYPESCRIPT_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];

/// JavaScript extensions, checkable only when `allowJs` or `checkJs` is set.
pub const JAVASCRIPT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs"];

/// Declaration files carry ambient types and are eligible for inclusion
/// regardless of the JavaScript-inclusion policy.
pub const DECLARATION_EXTENSIONS: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

/// The set of extensions to expand a directory input with, given the
/// JavaScript-inclusion policy of the governing configuration.
pub fn source_extensions(include_js: bool) -> Vec<&'static str> {
    let mut extensions: Vec<&'static str> = TYPESCRIPT_EXTENSIONS.to_vec();
    if include_js {
        extensions.extend_from_slice(JAVASCRIPT_EXTENSIONS);
    }
    extensions.extend_from_slice(DECLARATION_EXTENSIONS);
    extensions
}

pub fn is_declaration_file<P: AsRef<Path>>(path: P) -> bool {
    match path.as_ref().file_name().and_then(|name| name.to_str()) {
        Some(name) => DECLARATION_EXTENSIONS
            .iter()
            .any(|extension| name.ends_with(extension)),
        None => false,
    }
}

pub fn is_javascript_file<P: AsRef<Path>>(path: P) -> bool {
    match path.as_ref().file_name().and_then(|name| name.to_str()) {
        Some(name) => JAVASCRIPT_EXTENSIONS
            .iter()
            .any(|extension| name.ends_with(extension)),
        None => false,
    }
}

/// Strict extension membership test used when filtering files the compiler
/// reported as part of a program. Declaration files always match.
///
/// Can't use [`Path::extension`] here because some extensions span more than
/// one dot (like `.d.ts`).
pub fn matches_source_extension<P: AsRef<Path>>(path: P, include_js: bool) -> bool {
    let name = match path.as_ref().file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if DECLARATION_EXTENSIONS
        .iter()
        .any(|extension| name.ends_with(extension))
    {
        return true;
    }
    if TYPESCRIPT_EXTENSIONS
        .iter()
        .any(|extension| name.ends_with(extension))
    {
        return true;
    }
    include_js
        && JAVASCRIPT_EXTENSIONS
            .iter()
            .any(|extension| name.ends_with(extension))
}

/// Lenient membership test for raw user input. A path without any extension
/// is assumed to be a directory awaiting expansion and is never rejected.
pub fn is_candidate_input<P: AsRef<Path>>(path: P, include_js: bool) -> bool {
    let path = path.as_ref();
    if path.extension().is_none() {
        return true;
    }
    matches_source_extension(path, include_js)
}
