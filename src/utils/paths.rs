use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically (without touching the filesystem).
/// Resolves `.` and `..` components so that `/root/../etc/passwd`
/// correctly normalizes to `/etc/passwd` rather than passing through
/// as if it starts with `/root`.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Pop the last normal component (but never pop past root)
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            Component::CurDir => {} // skip "."
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Resolve a path to its canonical form, falling back to lexical
/// normalization when the path does not exist. Canonicalize resolves
/// symlinks; the lexical fallback still collapses `..` so non-existent
/// paths cannot smuggle traversal components past a containment check.
pub fn resolve_or_normalize(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| lexical_normalize(path))
}

/// Render a path for an error message without leaking locations outside
/// the sandbox root. Paths inside the root are shown in full; anything
/// else is reduced to its final component.
pub fn display_for_error(path: &Path, root: &Path) -> String {
    if path.starts_with(root) {
        return path.display().to_string();
    }
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "<unnamed>".to_string())
}
