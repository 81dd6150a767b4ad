//! Client-side session record storage.
//!
//! The session manager only needs a string map with three well-known keys;
//! the trait keeps it independent of how the web layer persists that map.
//! The shipped implementation is a signed cookie: base64url JSON plus an
//! HMAC-SHA256 tag. Signing makes the record tamper-evident — the sealed
//! artifact inside is additionally encrypted by the codec, the hostname and
//! username are integrity-protected only.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// The sealed directory session artifact.
pub const SESSION_KEY: &str = "sportello_session";
/// The replica that issued the artifact; artifacts are not portable.
pub const SERVER_KEY: &str = "sportello_directory_server";
/// Convenience copy of the authenticated username. Never used for
/// authorization decisions; those are re-derived from the live handle.
pub const USERNAME_KEY: &str = "sportello_username";

/// String-keyed map capability over the client-side session record.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn insert(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

/// Remove the three session fields together. The record must never keep a
/// username without its sealed artifact and server.
pub fn clear_session(store: &mut dyn SessionStore) {
    store.remove(SESSION_KEY);
    store.remove(SERVER_KEY);
    store.remove(USERNAME_KEY);
}

/// Plain in-memory store, used by tests and as the working copy behind the
/// cookie round trip.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
    values: HashMap<String, String>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Signed cookie codec for the session record.
///
/// `encode` turns the record into `payload.tag`; `decode` verifies the tag
/// and rebuilds the record. A missing, malformed, or tampered cookie decodes
/// to `None` — an anonymous visitor and a forged cookie look the same from
/// here, which is exactly the point.
#[derive(Clone)]
pub struct SignedCookie {
    key: SecretString,
}

impl SignedCookie {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    #[must_use]
    pub fn encode(&self, store: &MemorySessionStore) -> Option<String> {
        let payload = serde_json::to_vec(&store.values).ok()?;
        let payload_b64 = Base64UrlUnpadded::encode_string(&payload);
        let tag = self.tag(payload_b64.as_bytes())?;
        Some(format!("{payload_b64}.{tag}"))
    }

    #[must_use]
    pub fn decode(&self, cookie: &str) -> Option<MemorySessionStore> {
        let mut parts = cookie.split('.');
        let payload_b64 = parts.next()?;
        let tag_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let tag = Base64UrlUnpadded::decode_vec(tag_b64).ok()?;
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).ok()?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&tag).ok()?;

        let payload = Base64UrlUnpadded::decode_vec(payload_b64).ok()?;
        let values: HashMap<String, String> = serde_json::from_slice(&payload).ok()?;
        Some(MemorySessionStore { values })
    }

    fn tag(&self, payload: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).ok()?;
        mac.update(payload);
        Some(Base64UrlUnpadded::encode_string(
            &mac.finalize().into_bytes(),
        ))
    }
}

impl std::fmt::Debug for SignedCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCookie").finish_non_exhaustive()
    }
}
