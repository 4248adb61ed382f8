//! Build metadata embedded by `build.rs`, shown by `wgctl --version`.

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `git describe` output at build time, or `"unknown"` outside a checkout.
pub const GIT_DESCRIBE: &str = env!("WGCTL_GIT_DESCRIBE");

/// `debug` or `release`.
pub const BUILD_PROFILE: &str = env!("WGCTL_BUILD_PROFILE");

/// Target triple the binary was built for.
pub const BUILD_TARGET: &str = env!("WGCTL_BUILD_TARGET");

/// Multi-line version block for `--version` output.
pub fn long_version() -> String {
    format!("{VERSION}\ncommit: {GIT_DESCRIBE}\nprofile: {BUILD_PROFILE}\ntarget: {BUILD_TARGET}")
}
