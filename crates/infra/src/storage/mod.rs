//! Blob storage for staged vector-change batches

pub mod file_blob_store;

pub use file_blob_store::FileBlobStore;
