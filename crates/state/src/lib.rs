//! Manages hsync environment resolution and persisted sync state.
//!
//! This crate provides utilities for:
//! - Resolving the home, Claude, project and state directories from the environment.
//! - Loading optional user settings (`config.json` under the state root).
//! - Persisting one sync-state document per profile, keyed by `(target, scope)`.
//! - Writing files atomically (temp file + rename).

pub mod atomic;
pub mod env;
pub mod persistence;

pub use atomic::write_atomic;
pub use env::{
    claude_home, env_allow_secrets, env_parallel, env_targets, home_dir, load_settings, profile,
    project_dir_from_env, settings_file, state_root, HsyncSettings,
};
pub use persistence::{
    now_rfc3339, state_key, Fingerprint, StateDocument, StateManager, StateRecovery,
    SyncStateRecord, SyncStatus,
};
