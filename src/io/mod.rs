mod http;
mod local;

pub use http::HttpSource;
pub use local::LocalFileSource;

use anyhow::Result;
use async_trait::async_trait;

/// A place an archive can be loaded from in full.
///
/// The reader works on in-memory buffers only, so a source hands over the
/// complete archive bytes in one go.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Load the complete archive into memory.
    async fn load(&self) -> Result<Vec<u8>>;

    /// Human-readable location, used in messages.
    fn location(&self) -> &str;
}
