//! Local collaborators of the client
//!
//! - `token` - key/value store holding the bearer token
//! - `image` - reads image files to upload
//! - `error` - storage error types

pub mod error;
pub mod image;
pub mod token;

pub use error::{StorageError, StorageResult};
pub use image::{FsImageSource, ImageSource};
pub use token::{JsonFileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY};
