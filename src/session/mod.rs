//! Session subsystem: sealing of the directory artifact, the client-side
//! record, and the login/resume/logout bridge.

pub mod codec;
pub mod manager;
pub mod store;

pub use codec::{CodecError, SessionCodec};
pub use manager::{SessionError, SessionManager};
pub use store::{
    clear_session, MemorySessionStore, SessionStore, SignedCookie, SERVER_KEY, SESSION_KEY,
    USERNAME_KEY,
};
