//! Command-line interface for the `hsync` application.
//!
//! This crate serves as the main entry point for the executable, delegating
//! its core functionality to the `hsync-server` crate.

fn main() -> anyhow::Result<()> {
    hsync_server::run()
}
