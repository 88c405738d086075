use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

/// Returns `true` when `name` is a single, plain path segment.
///
/// Used for file names that come from persisted data (object ids): anything carrying a
/// separator, `.`/`..` or a drive prefix is refused before it ever reaches the resolver.
#[must_use]
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == name
    )
}

/// Lexically collapses `.` and `..`, refusing anything that would climb above the root.
fn normalize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir if out.pop() => {},
            Component::ParentDir => {
                return Err(traversal(path, "Path climbs above the storage root"));
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(path, "Absolute paths are not allowed in sandbox"));
            },
        }
    }

    Ok(out)
}

/// Joins `path` onto `root` and proves the result cannot escape it.
///
/// Existing targets are canonicalized (so symlinks pointing outside are caught);
/// missing ones are validated through their closest existing ancestor.
pub(crate) fn resolve_path(root: &Path, path: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
    let path = path.as_ref();
    let joined = root.join(normalize_relative(path)?);

    match joined.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(canonical),
        Ok(canonical) => Err(traversal(&canonical, "Resolved path leaves the sandbox")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => validate_ancestors(root, joined),
        Err(source) => Err(StorageError::Io {
            source,
            context: Some(format!("Failed to canonicalize {}", joined.display()).into()),
        }),
    }
}

fn validate_ancestors(root: &Path, joined: PathBuf) -> Result<PathBuf, StorageError> {
    if !joined.starts_with(root) {
        return Err(traversal(&joined, "Path is outside sandbox boundaries"));
    }

    for ancestor in joined.ancestors() {
        if ancestor == root {
            return Ok(joined);
        }
        if !ancestor.exists() {
            continue;
        }
        return match ancestor.canonicalize() {
            Ok(canonical) if canonical.starts_with(root) => Ok(joined),
            Ok(canonical) => {
                Err(traversal(&canonical, "Existing parent directory is a symlink outside sandbox"))
            },
            Err(source) => Err(StorageError::Io {
                source,
                context: Some("Failed to verify parent directory".into()),
            }),
        };
    }

    Err(traversal(&joined, "No valid parent directory found within sandbox"))
}

fn traversal(path: &Path, reason: &'static str) -> StorageError {
    StorageError::PathTraversalAttempt {
        message: path.display().to_string().into(),
        context: Some(reason.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file_names() {
        assert!(is_plain_file_name("4f1c2a9e-0000-4000-8000-000000000000"));
        assert!(is_plain_file_name(".wheel-metadata.json"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("a/b"));
        assert!(!is_plain_file_name("../escape"));
        assert!(!is_plain_file_name("/etc/passwd"));
    }

    #[test]
    fn normalization_stays_inside_root() {
        assert_eq!(normalize_relative(Path::new("a/./b/../c")).ok(), Some(PathBuf::from("a/c")));
        assert!(normalize_relative(Path::new("a/../../b")).is_err());
        assert!(normalize_relative(Path::new("/abs")).is_err());
    }
}
