//! Resumable Chunked Upload Module
//!
//! Implements TUS-style uploads for delivery formats:
//! - Preallocated backing file per session
//! - Strictly sequential offsets with resynchronisation on mismatch
//! - Finalize moves the file to permanent storage
//!
//! Protocol Flow:
//! 1. Client creates a session declaring filename and size
//! 2. Client PATCHes chunks with `Upload-Offset` equal to the bytes received
//! 3. On offset mismatch the server reports its offset and the client resumes from there
//! 4. Once complete, the server finalizes the file; the reaper sweeps abandoned sessions

pub mod reaper;
pub mod session;
pub mod store;
pub mod types;

pub use reaper::Reaper;
pub use session::{SessionManager, MAX_REAP_AGE_HOURS};
pub use store::{FsSessionStore, SessionStore};
pub use types::*;
