use camino::Utf8Path;
use std::future::Future;
use std::io;
use std::pin::Pin;

/// Boxed future returned by [`FileSystem`] operations
pub type FsFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// The filesystem mutations queued tasks are allowed to perform.
///
/// Paths are absolute; the queue resolves them before calling in. The
/// returned futures own their arguments so they can outlive the call.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Write `contents` as UTF-8, replacing any existing file.
    fn write_file(&self, path: &Utf8Path, contents: &str) -> FsFuture;

    /// Create `path` and any missing parents.
    fn create_dir_all(&self, path: &Utf8Path) -> FsFuture;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
    fn write_file(&self, path: &Utf8Path, contents: &str) -> FsFuture {
        let path = path.to_path_buf();
        let contents = contents.to_owned();
        Box::pin(async move {
            tokio::fs::write(&path, contents)
                .await
                .inspect(|()| tracing::debug!("Wrote {}", path))
        })
    }

    fn create_dir_all(&self, path: &Utf8Path) -> FsFuture {
        let path = path.to_path_buf();
        Box::pin(async move {
            tokio::fs::create_dir_all(&path)
                .await
                .inspect(|()| tracing::debug!("Created directory {}", path))
        })
    }
}
