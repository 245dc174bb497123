//! Model provider implementations.
//!
//! Concrete implementations of the VisionModel and TextModel traits for
//! the services this system is deployed against.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
