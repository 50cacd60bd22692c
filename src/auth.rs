//! Auth-domain identifiers, scope sets, identity claims, and token models.

pub mod claims;
pub mod id;
pub mod scope;
pub mod token;

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use token::{access::*, secret::*};
