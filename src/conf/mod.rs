//! WireGuard server config model
//!
//! - `document`: ordered parse of the config into interface preamble + peer blocks
//! - `transform`: enable/disable rewrites over a single block

pub mod document;
pub mod transform;

pub use self::document::Document;
