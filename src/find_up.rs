use std::path::{Path, PathBuf};

/// Walk upward from `starting_directory` toward the filesystem root, testing
/// each level for `target_filename`. Returns the path to the first match.
///
/// Directory ancestry is acyclic, so a plain loop suffices.
pub(crate) fn find_up(starting_directory: &Path, target_filename: &str) -> Option<PathBuf> {
    let mut path: PathBuf = starting_directory.to_owned();

    loop {
        path.push(target_filename);

        if path.is_file() {
            break Some(path);
        }

        if !(path.pop() && path.pop()) {
            // remove file && remove parent
            break None;
        }
    }
}
