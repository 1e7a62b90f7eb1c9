//! Inference against the external language-model API.

pub mod client;
pub mod openai;

pub use client::InferenceClient;
pub use openai::{InferenceConfig, InferenceTransport, OpenAiTransport};
