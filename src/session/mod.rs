//! Browser-held session state and the server-side pending handshakes.

pub mod codec;
pub mod cookies;
pub mod pending;

pub use cookies::{SessionCheck, check_session, temporary_id};
pub use pending::{Claim, PendingExchangeStore};
