mod kv_store;
mod session_store;

pub use kv_store::{KvStore, StoreError};
pub use session_store::{SESSION_KEY, SessionStore};
