//! Target adapters writing the canonical snapshot into each tool's native layout.

pub mod codex;
pub mod env_vars;
pub mod gemini;
pub mod links;
pub mod markers;
pub mod opencode;
#[cfg(test)]
pub(crate) mod test_support;
pub mod traits;
pub mod utils;

pub use codex::CodexAdapter;
pub use gemini::GeminiAdapter;
pub use opencode::OpenCodeAdapter;
pub use traits::{SyncContext, TargetAdapter};
