//! Path normalization shared by trees, logs and backends.

use std::path::{Component, Path, PathBuf};

/// Normalize a path: root it at `/`, resolve `.` and `..`.
///
/// `..` never climbs above the root. Every component of the crate compares
/// paths only after this step, so `a/b`, `/a/b` and `/a/./b` are one file.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut result = PathBuf::from("/");
    for component in path.as_ref().components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(s) => result.push(s),
        }
    }
    result
}

/// The normalized path relative to the root, for joining onto a directory.
pub fn relative(path: &Path) -> PathBuf {
    let normalized = normalize(path);
    normalized
        .strip_prefix("/")
        .map(Path::to_path_buf)
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_forms() {
        assert_eq!(normalize("a/b.txt"), Path::new("/a/b.txt"));
        assert_eq!(normalize("/a/b.txt"), Path::new("/a/b.txt"));
        assert_eq!(normalize("a/./b.txt"), Path::new("/a/b.txt"));
        assert_eq!(normalize("a/c/../b.txt"), Path::new("/a/b.txt"));
    }

    #[test]
    fn test_parent_dir_stops_at_root() {
        assert_eq!(normalize("../../x"), Path::new("/x"));
        assert_eq!(normalize(""), Path::new("/"));
    }

    #[test]
    fn test_relative() {
        assert_eq!(relative(Path::new("/src/main.rs")), Path::new("src/main.rs"));
        assert_eq!(relative(Path::new("/")), Path::new(""));
    }
}
