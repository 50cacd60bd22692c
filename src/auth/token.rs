//! Access token models and secret wrappers.

pub mod access;
pub mod secret;
