//! HTTP client shared by the provider, embedding, index, and Zoom adapters

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
