//! WhatsApp Web session automation: profile locking, login, chat list
//! extraction and message sending over a [`wadriver_browser::PageDriver`].

pub mod auth;
pub mod bridge;
pub mod challenge;
pub mod dispatch;
pub mod engine;
pub mod extract;
pub mod lock;
pub mod selectors;
pub mod session;

#[cfg(test)]
mod testing;

pub use auth::{AuthState, Authenticator};
pub use bridge::{run_blocking, BlockingEngine};
pub use challenge::AuthChallenge;
pub use engine::Engine;
pub use extract::ScanOptions;
pub use lock::{LockGuard, ProfileLock};
pub use session::Session;
