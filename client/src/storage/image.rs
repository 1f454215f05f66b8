//! Image file access
//!
//! Images are uploaded raw over HTTP and as base64 over the channel.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::BoxFuture;

/// Source of image bytes
pub trait ImageSource: Send + Sync {
    /// Read the whole file at `path`
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<Vec<u8>>>;

    /// Read the whole file at `path` and encode it as standard base64
    fn read_base64<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<String>> {
        Box::pin(async move {
            let bytes = self.read(path).await?;
            Ok(STANDARD.encode(bytes))
        })
    }
}

/// Reads images from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<Vec<u8>>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(path).await?;
            tracing::debug!(path = %path.display(), size = bytes.len(), "Image read");
            Ok(bytes)
        })
    }
}
