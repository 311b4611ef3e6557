//! Include/exclude path filtering.
//!
//! Patterns are glob-shaped but matched loosely:
//! - `**/*`, `**`, `*` match everything
//! - `**/*.ext` matches paths ending in `.ext`
//! - `**/dir/**` matches paths with a `dir` segment
//! - anything else matches if its literal pieces (split on `*`) occur in
//!   the path in order
//!
//! Paths are compared with forward slashes regardless of platform.

use crate::config::HistoryConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pattern {
    Any,
    Extension(String),
    Segment(String),
    Fragments(Vec<String>),
}

impl Pattern {
    fn compile(raw: &str) -> Self {
        let mut p = raw.trim().replace('\\', "/");

        if p.chars().all(|c| c == '*' || c == '/') {
            return Pattern::Any;
        }

        while let Some(rest) = p.strip_prefix("**/") {
            p = rest.to_string();
        }
        let p = p.trim_start_matches('/');

        let dir = p.strip_suffix("/**").or_else(|| p.strip_suffix("/*"));
        if let Some(dir) = dir {
            if !dir.contains('*') {
                return Pattern::Segment(dir.trim_matches('/').to_string());
            }
        }

        if let Some(ext) = p.strip_prefix('*') {
            if ext.starts_with('.') && !ext.contains('*') && !ext.contains('/') {
                return Pattern::Extension(ext.to_string());
            }
        }

        let fragments: Vec<String> = p
            .split('*')
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect();

        if fragments.is_empty() {
            Pattern::Any
        } else {
            Pattern::Fragments(fragments)
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Extension(ext) => path.ends_with(ext.as_str()),
            Pattern::Segment(dir) => {
                let rooted = if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{path}")
                };
                rooted.contains(&format!("/{dir}/"))
            }
            Pattern::Fragments(fragments) => {
                let mut rest = path;
                for fragment in fragments {
                    match rest.find(fragment.as_str()) {
                        Some(pos) => rest = &rest[pos + fragment.len()..],
                        None => return false,
                    }
                }
                true
            }
        }
    }
}

/// Compiled allow/deny lists.
#[derive(Clone, Debug)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: include.into_iter().map(|p| Pattern::compile(p.as_ref())).collect(),
            exclude: exclude.into_iter().map(|p| Pattern::compile(p.as_ref())).collect(),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(&config.include_globs, &config.exclude_globs)
    }

    /// Whether `path` may be captured. Excludes win over includes; an empty
    /// include list allows everything.
    pub fn allows(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");

        if self.exclude.iter().any(|p| p.matches(&normalized)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|p| p.matches(&normalized))
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}
