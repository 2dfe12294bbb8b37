//! Version information for baps3d.

/// baps3d version from Cargo.toml
pub const BAPS3D_VERSION: &str = env!("CARGO_PKG_VERSION");
