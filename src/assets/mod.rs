//! Uploaded media: routing uploads into buckets and keeping stored files in
//! step with the records that reference them.

use thiserror::Error;

pub mod lifecycle;
pub mod router;
pub mod upload;

pub use lifecycle::{AssetChanges, AssetManager, AssetOwner};
pub use router::Bucket;
pub use upload::{MultipartForm, UploadedFile};

#[derive(Debug, Error)]
pub enum AssetError {
    /// The upload does not fit the field it was sent for.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid asset reference {0:?}")]
    InvalidReference(String),

    #[error("asset store error: {0}")]
    Storage(anyhow::Error),
}
