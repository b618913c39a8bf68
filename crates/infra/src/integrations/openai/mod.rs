//! OpenAI embeddings integration
//!
//! [`OpenAIEmbeddings`] implements the embedding port over the
//! `/v1/embeddings` endpoint. The model defaults to
//! `text-embedding-3-small` and can be overridden with `with_model()`.
//!
//! # Error Handling
//!
//! - **Network errors and 5xx**: retried by `HttpClient`, then surfaced as
//!   `Embedding` errors so the delivery is redelivered
//! - **Client errors (4xx)**: `Embedding` errors carrying the status and body
//! - **Empty or malformed responses**: `Embedding` errors

pub mod embeddings;

pub use embeddings::OpenAIEmbeddings;
