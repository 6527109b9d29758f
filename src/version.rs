/// Current firmware version - automatically pulled from Cargo.toml
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp - automatically set at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
