//! Platform services: identity claims and the persisted session context.

pub mod identity;
pub mod session;

pub use identity::IdentityClaims;
pub use session::{FileSessionStore, MemorySessionStore, SessionContext, SessionStore};
