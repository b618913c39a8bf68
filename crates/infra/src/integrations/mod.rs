//! External service integrations

pub mod google;
pub mod openai;
pub mod zoom;
