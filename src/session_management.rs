//! Session management core module.
//!
//! A session is one browser's authenticated context for one remote engine.
//! Sessions live only in memory; their certificate bundles live on disk
//! and are removed together with them.

/// Submodule for session data structures and utilities.
pub mod session;
/// Submodule for the connect / resolve / disconnect lifecycle.
pub mod session_manager;
/// Submodule for the injectable session state.
pub mod session_store;


pub use session::{Session, SessionId, TransportMode};
pub use session_manager::{ConnectRequest, SessionManager};
pub use session_store::{MemorySessionStore, SessionStore};
