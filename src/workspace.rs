//! Monitored workspace roots.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A workspace directory under which capture is permitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRoot {
    pub path: PathBuf,

    /// Locator of the root directory, e.g. `file:///home/me/project` or
    /// `vscode-remote://wsl+Ubuntu/home/me/project`.
    pub uri: String,

    /// Remote authority, if the root is not local.
    pub authority: Option<String>,
}

impl WorkspaceRoot {
    /// A local root; its locator is a `file://` URI.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let uri = file_uri(&path.to_string_lossy());
        Self {
            path,
            uri,
            authority: None,
        }
    }

    /// A root reached through a remote authority.
    pub fn remote(
        path: impl Into<PathBuf>,
        uri: impl Into<String>,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            uri: uri.into(),
            authority: Some(authority.into()),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// The ordered set of monitored roots.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceRoots {
    roots: Vec<WorkspaceRoot>,
}

impl WorkspaceRoots {
    pub fn new(roots: Vec<WorkspaceRoot>) -> Self {
        Self { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkspaceRoot> {
        self.roots.iter()
    }

    /// First root (in configuration order) containing `path`.
    ///
    /// Nested roots are not disambiguated; the first match wins.
    pub fn containing(&self, path: &str) -> Option<&WorkspaceRoot> {
        let path = Path::new(path);
        self.roots.iter().find(|root| root.contains(path))
    }

    /// Resource locator for a file path: the containing root's locator with
    /// the relative path appended, or a plain `file://` URI.
    pub fn locator_for(&self, path: &str) -> String {
        let Some(root) = self.containing(path) else {
            return file_uri(path);
        };

        let relative = Path::new(path)
            .strip_prefix(&root.path)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        if relative.is_empty() {
            root.uri.clone()
        } else {
            format!("{}/{}", root.uri.trim_end_matches('/'), relative)
        }
    }

    /// Key the persistence layer hashes into a document name. Includes the
    /// remote authority so identical paths on different hosts stay apart.
    pub fn storage_key(&self, path: &str) -> String {
        let authority = self
            .containing(path)
            .and_then(|root| root.authority.as_deref())
            .unwrap_or("");
        format!("{authority}|{path}")
    }
}

/// `file://` locator for a plain path.
pub fn file_uri(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') {
        format!("file://{normalized}")
    } else {
        format!("file:///{normalized}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> WorkspaceRoots {
        WorkspaceRoots::new(vec![
            WorkspaceRoot::local("/home/me/app"),
            WorkspaceRoot::remote("/srv/api", "vscode-remote://wsl+Ubuntu/srv/api", "wsl+Ubuntu"),
        ])
    }

    #[test]
    fn test_containing_is_component_wise() {
        let roots = roots();
        assert!(roots.containing("/home/me/app/src/main.rs").is_some());
        assert!(roots.containing("/home/me/application/main.rs").is_none());
        assert!(roots.containing("/tmp/x").is_none());
    }

    #[test]
    fn test_locator_for() {
        let roots = roots();
        assert_eq!(
            roots.locator_for("/home/me/app/src/main.rs"),
            "file:///home/me/app/src/main.rs"
        );
        assert_eq!(
            roots.locator_for("/srv/api/handler.rs"),
            "vscode-remote://wsl+Ubuntu/srv/api/handler.rs"
        );
        assert_eq!(roots.locator_for("/tmp/loose.txt"), "file:///tmp/loose.txt");
    }

    #[test]
    fn test_storage_key_includes_authority() {
        let roots = roots();
        assert_eq!(roots.storage_key("/srv/api/a.rs"), "wsl+Ubuntu|/srv/api/a.rs");
        assert_eq!(roots.storage_key("/home/me/app/a.rs"), "|/home/me/app/a.rs");
    }

    #[test]
    fn test_file_uri_windows_path() {
        assert_eq!(file_uri("C:\\work\\a.txt"), "file:///C:/work/a.txt");
    }
}
