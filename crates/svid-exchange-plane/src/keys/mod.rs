//! Signing key management

mod registry;

pub use registry::KeyRegistry;
