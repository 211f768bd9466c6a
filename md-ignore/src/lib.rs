//! A glob-pattern exclusion filter sourced from an ignore-file at a tree root.
//!
//! The default is to allow everything; an ignore-file only narrows what's allowed,
//! and a later `!pattern` negation line can re-widen it, exactly like `.gitignore`.

use std::path::{Path, PathBuf};

/// Name of the ignore-file this crate looks for by default.
pub const DEFAULT_IGNORE_FILE_NAME: &str = ".forceignore";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse ignore file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

/// A loaded set of ignore patterns, default-allow.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    matcher: Option<ignore::gitignore::Gitignore>,
}

impl IgnoreMatcher {
    /// An [`IgnoreMatcher`] with no patterns: accepts everything.
    pub fn empty() -> Self {
        IgnoreMatcher { matcher: None }
    }

    /// Walk upward from `start` looking for the nearest `file_name`, and build a
    /// matcher from it. If none is found, returns an empty (default-allow) matcher.
    pub fn discover(start: &Path, file_name: &str) -> Result<Self, Error> {
        let mut current = Some(start);
        while let Some(dir) = current {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "discovered ignore file");
                return Self::from_file(&candidate);
            }
            current = dir.parent();
        }
        Ok(Self::empty())
    }

    /// Build a matcher from a specific ignore-file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let mut builder = ignore::gitignore::GitignoreBuilder::new(root);
        if let Some(source) = builder.add(path) {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                source,
            });
        }
        let gitignore = builder.build().map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(IgnoreMatcher {
            matcher: Some(gitignore),
        })
    }

    /// Returns `true` if `path` is denied by this matcher.
    pub fn denies(&self, path: &Path) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        // We don't reliably know if `path` is a directory from the caller's side, so
        // match twice: a directory-only pattern (trailing `/`) should still apply to
        // directories we're about to descend into.
        matcher
            .matched_path_or_any_parents(path, path.is_dir())
            .is_ignore()
    }

    /// Returns `true` if `path` is accepted (the complement of [`IgnoreMatcher::denies`]).
    pub fn accepts(&self, path: &Path) -> bool {
        !self.denies(path)
    }
}
