use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors raised while building or re-basing a [`PathResolver`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathResolverError {
    #[error("Base directory must be an absolute path: {0}")]
    NotAbsolute(Utf8PathBuf),
}

/// Two-level path: an absolute base directory plus a relative subpath.
///
/// Every document entity that stores a filesystem location holds its own
/// resolver, and [`FsQueue`](crate::services::FsQueue) keeps a private one it
/// re-points at each task's directory while that task runs.
///
/// Cloning produces an independent value; nothing is shared between the copy
/// and the original, so handing a clone to a longer-lived owner isolates it
/// from later mutation by the caller.
///
/// # Example
///
/// ```
/// use cleanroom::models::PathResolver;
///
/// let mut resolver = PathResolver::new("/work/project", "cleanroom").unwrap();
/// assert_eq!(resolver.get_path(true).as_str(), "/work/project/cleanroom");
///
/// resolver.set_path(false, "../compiles/central").unwrap();
/// assert_eq!(resolver.get_path(false).as_str(), "../compiles/central");
/// assert_eq!(resolver.get_path(true).as_str(), "/work/compiles/central");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base: Utf8PathBuf,
    relative: Utf8PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at `base`.
    ///
    /// # Errors
    /// Returns [`PathResolverError::NotAbsolute`] when `base` is relative.
    pub fn new(
        base: impl Into<Utf8PathBuf>,
        relative: impl Into<Utf8PathBuf>,
    ) -> Result<Self, PathResolverError> {
        let base = base.into();
        if !base.is_absolute() {
            return Err(PathResolverError::NotAbsolute(base));
        }

        Ok(Self {
            base: normalize(&base),
            relative: relative.into(),
        })
    }

    /// Resolve the path.
    ///
    /// With `use_absolute` the base and relative segments are joined and
    /// lexically normalised; otherwise the relative segment is returned as
    /// stored.
    pub fn get_path(&self, use_absolute: bool) -> Utf8PathBuf {
        if use_absolute {
            normalize(&self.base.join(&self.relative))
        } else {
            self.relative.clone()
        }
    }

    /// Replace one of the two segments.
    ///
    /// # Errors
    /// Replacing the base (`use_absolute == true`) with a relative path fails
    /// and leaves the resolver untouched. Replacing the relative segment never
    /// fails.
    pub fn set_path(
        &mut self,
        use_absolute: bool,
        value: impl Into<Utf8PathBuf>,
    ) -> Result<(), PathResolverError> {
        let value = value.into();
        if use_absolute {
            if !value.is_absolute() {
                return Err(PathResolverError::NotAbsolute(value));
            }
            self.base = normalize(&value);
        } else {
            self.set_relative(value);
        }
        Ok(())
    }

    /// Replace the relative segment.
    pub fn set_relative(&mut self, relative: impl Into<Utf8PathBuf>) {
        self.relative = relative.into();
    }

    /// The absolute base directory.
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// The relative segment.
    pub fn relative(&self) -> &Utf8Path {
        &self.relative
    }

    /// A resolver based at this one's absolute path, with `relative` as its
    /// relative segment.
    pub fn nested(&self, relative: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base: self.get_path(true),
            relative: relative.into(),
        }
    }
}

/// Lexically normalise `path`: drop `.`, let `..` pop a component but never
/// climb above the root.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();

    for component in path.components() {
        match component {
            Utf8Component::Prefix(_) | Utf8Component::RootDir => {
                normalized.push(component.as_str())
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if normalized.file_name().is_some() {
                    normalized.pop();
                }
            }
            Utf8Component::Normal(part) => normalized.push(part),
        }
    }

    normalized
}
