//! Blob storage connectors.

pub mod mock;
pub mod object;

pub use mock::{BlobOp, MockBlobStore, StoredObject};
pub use object::ObjectStoreBlobStore;
