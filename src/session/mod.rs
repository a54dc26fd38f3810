//! Session handling: persisted artifacts and the active session

mod manager;
mod store;

pub use manager::{SessionHandle, SessionManager, GUEST_IDENTIFIER};
pub use store::{sanitize, SessionStore, SessionStoreError, SessionStoreResult};
