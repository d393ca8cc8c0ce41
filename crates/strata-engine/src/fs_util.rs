use std::io;
use std::path::{Component, Path, PathBuf};

/// Seam for everything the engine reads off disk at resolve time. Template
/// and file-parameter reads go through this so tests can inject fixtures
/// without touching the real tree layout.
pub trait FileAccess: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The production implementation: plain filesystem reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFiles;

impl FileAccess for OsFiles {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Collapse `.` and `..` segments without touching the filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            Component::Normal(segment) => out.push(segment),
            Component::RootDir => out.push(component.as_os_str()),
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::normalize_path;

    #[test]
    fn collapses_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/projects/infra/./dashboard/../auto-tag/tags.yaml")),
            PathBuf::from("/projects/infra/auto-tag/tags.yaml")
        );
    }
}
