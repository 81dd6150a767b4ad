//! Portal cookie glue: one signed cookie carries the whole session record.

use crate::session::{MemorySessionStore, SignedCookie};

use super::state::PortalConfig;
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

/// Name of the signed portal cookie.
pub(crate) const STORE_COOKIE_NAME: &str = "sportello";

/// Read the session record out of the request cookies. A missing, malformed,
/// or forged cookie yields an empty record; from here on those are all just
/// anonymous visitors.
pub(crate) fn read_store(headers: &HeaderMap, signer: &SignedCookie) -> MemorySessionStore {
    extract_cookie(headers, STORE_COOKIE_NAME)
        .and_then(|value| signer.decode(&value))
        .unwrap_or_default()
}

/// Serialize the record into a `Set-Cookie` header value.
pub(crate) fn store_cookie(
    portal: &PortalConfig,
    signer: &SignedCookie,
    store: &MemorySessionStore,
) -> Option<HeaderValue> {
    let encoded = signer.encode(store)?;
    let mut cookie = format!("{STORE_COOKIE_NAME}={encoded}; Path=/; HttpOnly; SameSite=Lax");
    if portal.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// A `Set-Cookie` header value that removes the portal cookie.
pub(crate) fn clear_store_cookie(portal: &PortalConfig) -> Option<HeaderValue> {
    let mut cookie = format!("{STORE_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if portal.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStore, USERNAME_KEY};
    use secrecy::SecretString;

    fn signer() -> SignedCookie {
        SignedCookie::new(SecretString::from("portal-cookie-key"))
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn request_to_response_roundtrip() {
        let portal = PortalConfig::new("https://accounts.example.test".to_string());
        let mut store = MemorySessionStore::new();
        store.insert(USERNAME_KEY, "alice".to_string());

        let set_cookie = store_cookie(&portal, &signer(), &store).unwrap();
        let set_cookie = set_cookie.to_str().unwrap();
        assert!(set_cookie.starts_with("sportello="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Secure"));

        // Feed the cookie back as a request header.
        let value = set_cookie
            .trim_start_matches("sportello=")
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("other=1; sportello={value}")).unwrap(),
        );

        let decoded = read_store(&headers, &signer());
        assert_eq!(decoded.get(USERNAME_KEY).as_deref(), Some("alice"));
    }

    #[test]
    fn missing_or_forged_cookie_reads_empty() {
        let headers = HeaderMap::new();
        assert!(read_store(&headers, &signer()).is_empty());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sportello=forged.tag"));
        assert!(read_store(&headers, &signer()).is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn clear_cookie_expires_immediately() {
        let portal = PortalConfig::new("http://localhost:8080".to_string());
        let cleared = clear_store_cookie(&portal).unwrap();
        let cleared = cleared.to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }
}
