// Utility Functions
// Repository root detection and path containment helpers

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Find the root of a git repository by walking up from `start`.
///
/// Returns `None` when no ancestor contains a `.git` entry.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    start
        .ancestors()
        .find(|ancestor| ancestor.join(".git").exists())
        .map(Path::to_path_buf)
}

/// The repository root containing the current directory, or the current
/// directory itself.
pub fn resolve_working_dir() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_repo_root(&cwd).unwrap_or(cwd)
}

/// Whether `path` resolves to a location inside `root`.
///
/// Both paths are canonicalized, so `..` segments and symlinked parents
/// are followed before comparing. A path that cannot be resolved is never
/// contained.
pub fn is_within(root: &Path, path: &Path) -> bool {
    match (root.canonicalize(), path.canonicalize()) {
        (Ok(root), Ok(path)) => path.starts_with(root),
        _ => false,
    }
}

/// A file name not yet in `taken`, derived from `name` by appending `-2`,
/// `-3`, ... to its stem.
pub fn unique_file_name(name: &Path, taken: &mut HashSet<OsString>) -> OsString {
    let candidate = name.as_os_str().to_os_string();
    if taken.insert(candidate.clone()) {
        return candidate;
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (2..)
        .map(|n| OsString::from(format!("{}-{}{}", stem, n, extension)))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn test_find_repo_root_with_git_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir(root.join(".git")).unwrap();

        let sub = root.join("a").join("b").join("c");
        fs::create_dir_all(&sub).unwrap();

        let found = find_repo_root(&sub).unwrap();
        assert_eq!(found, root.canonicalize().unwrap());
    }

    #[test]
    fn test_find_repo_root_nonexistent_path() {
        assert!(find_repo_root(Path::new("/nonexistent/path/that/does/not/exist")).is_none());
    }

    #[test]
    fn test_is_within() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("repo");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(temp.path().join("outside.yml"), "x").unwrap();

        assert!(is_within(&root, &root.join("sub")));
        assert!(!is_within(&root, &root.join("sub/../../outside.yml")));
        assert!(!is_within(&root, &root.join("missing.yml")));
    }

    #[test]
    fn test_unique_file_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_file_name(Path::new("ci.yml"), &mut taken), "ci.yml");
        assert_eq!(unique_file_name(Path::new("ci.yml"), &mut taken), "ci-2.yml");
        assert_eq!(unique_file_name(Path::new("ci.yml"), &mut taken), "ci-3.yml");
        assert_eq!(unique_file_name(Path::new("lint"), &mut taken), "lint");
    }
}
