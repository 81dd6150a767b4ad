//! Signed, expiring, audience-scoped tokens for out-of-band flows.
//!
//! Password reset, account validation, and the spam-check callback all hand a
//! token to a party that has no session. They share one signing key, so every
//! token carries a mandatory audience claim and verification checks it:
//! a token minted for one flow is never accepted by a handler for another.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The flows a token can be scoped to. Closed on purpose: adding a flow means
/// adding a variant here, which makes every audience check visible at compile
/// time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Audience {
    PasswordReset,
    EmailValidation,
    SpamCheck,
}

impl Audience {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PasswordReset => "password-reset",
            Self::EmailValidation => "email-validation",
            Self::SpamCheck => "spam-check",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Decoded token contents: the audience, an optional absolute expiry, and the
/// flow-specific claims (`sub`, `lpc`, `mail`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl TokenClaims {
    /// Fetch a string claim by name.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// The subject identity, when present.
    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("failed to initialize signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token issued for audience {got:?}, expected {expected:?}")]
    WrongAudience { expected: String, got: String },
}

impl Error {
    /// True for errors the user can fix by requesting a fresh token.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn mac(key: &SecretString, signing_input: &[u8]) -> Result<HmacSha256, Error> {
    // HMAC accepts keys of any length; the error arm is unreachable in
    // practice but propagated rather than unwrapped.
    let mut mac =
        HmacSha256::new_from_slice(key.expose_secret().as_bytes()).map_err(|_| Error::Key)?;
    mac.update(signing_input);
    Ok(mac)
}

/// Create an HS256 signed token for the given claims.
///
/// # Errors
/// Returns an error if the header or claims cannot be encoded as JSON.
pub fn sign_hs256(key: &SecretString, claims: &TokenClaims) -> Result<String, Error> {
    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signature = mac(key, signing_input.as_bytes())?.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an HS256 token and return its decoded claims.
///
/// Checks run in a fixed order so callers get the most useful error first:
/// format, signature, expiry, audience. A wrong-audience token with a valid
/// signature is still rejected — that is the whole point of the claim.
///
/// # Errors
/// Returns a distinguishable error for malformed input, a bad signature, an
/// elapsed `exp`, or an audience mismatch.
pub fn verify_hs256(
    token: &str,
    key: &SecretString,
    expected: Audience,
    now_unix_seconds: i64,
) -> Result<TokenClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    mac(key, signing_input.as_bytes())?
        .verify_slice(&signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: TokenClaims = b64d_json(claims_b64)?;
    if let Some(exp) = claims.exp {
        if exp <= now_unix_seconds {
            return Err(Error::Expired);
        }
    }
    if claims.aud != expected.as_str() {
        return Err(Error::WrongAudience {
            expected: expected.as_str().to_string(),
            got: claims.aud,
        });
    }

    Ok(claims)
}

/// Process-wide token issuer/reader: one signing key, per-audience default
/// lifetimes from configuration.
pub struct TokenSigner {
    key: SecretString,
    activation_ttl_minutes: i64,
    spamcheck_ttl_minutes: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: SecretString, activation_ttl_minutes: i64, spamcheck_ttl_minutes: i64) -> Self {
        Self {
            key,
            activation_ttl_minutes,
            spamcheck_ttl_minutes,
        }
    }

    /// The default lifetime for an audience. Password-reset tokens carry no
    /// expiry: their effective lifetime is bounded by the reset lock and the
    /// embedded last-password-change claim.
    #[must_use]
    pub fn default_ttl_minutes(&self, audience: Audience) -> Option<i64> {
        match audience {
            Audience::PasswordReset => None,
            Audience::EmailValidation => Some(self.activation_ttl_minutes),
            Audience::SpamCheck => Some(self.spamcheck_ttl_minutes),
        }
    }

    /// Mint a token for the audience, applying the default TTL unless the
    /// caller overrides it.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized.
    pub fn issue(
        &self,
        claims: Map<String, Value>,
        audience: Audience,
        ttl_minutes: Option<i64>,
    ) -> Result<String, Error> {
        let ttl = ttl_minutes.or_else(|| self.default_ttl_minutes(audience));
        let exp = ttl.map(|minutes| now_unix() + minutes * 60);
        sign_hs256(
            &self.key,
            &TokenClaims {
                aud: audience.as_str().to_string(),
                exp,
                claims,
            },
        )
    }

    /// Verify a token against the expected audience.
    ///
    /// # Errors
    /// See [`verify_hs256`].
    pub fn read(&self, token: &str, audience: Audience) -> Result<TokenClaims, Error> {
        verify_hs256(token, &self.key, audience, now_unix())
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("activation_ttl_minutes", &self.activation_ttl_minutes)
            .field("spamcheck_ttl_minutes", &self.spamcheck_ttl_minutes)
            .finish_non_exhaustive()
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn test_key() -> SecretString {
        SecretString::from("sportello-test-signing-key")
    }

    fn reset_claims() -> TokenClaims {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("alice"));
        claims.insert("lpc".to_string(), json!("2024-01-01T00:00:00"));
        TokenClaims {
            aud: Audience::PasswordReset.as_str().to_string(),
            exp: Some(NOW + 600),
            claims,
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn sign_and_verify_roundtrip() {
        let key = test_key();
        let token = sign_hs256(&key, &reset_claims()).unwrap();

        let verified = verify_hs256(&token, &key, Audience::PasswordReset, NOW).unwrap();
        assert_eq!(verified.sub(), Some("alice"));
        assert_eq!(verified.get_str("lpc"), Some("2024-01-01T00:00:00"));
        assert_eq!(verified.aud, "password-reset");
        assert_eq!(verified.exp, Some(NOW + 600));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn rejects_wrong_audience() {
        let key = test_key();
        let token = sign_hs256(&key, &reset_claims()).unwrap();

        let result = verify_hs256(&token, &key, Audience::EmailValidation, NOW);
        assert!(matches!(result, Err(Error::WrongAudience { .. })));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn rejects_expired() {
        let key = test_key();
        let mut claims = reset_claims();
        claims.exp = Some(NOW - 1);
        let token = sign_hs256(&key, &claims).unwrap();

        let result = verify_hs256(&token, &key, Audience::PasswordReset, NOW);
        assert!(matches!(result, Err(Error::Expired)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn expiry_checked_before_audience() {
        // An expired token presented to the wrong handler should read as
        // expired, not leak which audience it carried.
        let key = test_key();
        let mut claims = reset_claims();
        claims.exp = Some(NOW - 1);
        let token = sign_hs256(&key, &claims).unwrap();

        let result = verify_hs256(&token, &key, Audience::SpamCheck, NOW);
        assert!(matches!(result, Err(Error::Expired)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn no_exp_means_no_time_bound() {
        let key = test_key();
        let mut claims = reset_claims();
        claims.exp = None;
        let token = sign_hs256(&key, &claims).unwrap();

        let far_future = NOW + 10 * 365 * 24 * 3600;
        assert!(verify_hs256(&token, &key, Audience::PasswordReset, far_future).is_ok());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn rejects_tampered_signature() {
        let key = test_key();
        let token = sign_hs256(&key, &reset_claims()).unwrap();

        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let result = verify_hs256(&tampered, &key, Audience::PasswordReset, NOW);
        assert!(matches!(
            result,
            Err(Error::InvalidSignature) | Err(Error::Base64)
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn rejects_other_key() {
        let token = sign_hs256(&test_key(), &reset_claims()).unwrap();
        let other = SecretString::from("another-key-entirely");

        let result = verify_hs256(&token, &other, Audience::PasswordReset, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn rejects_malformed() {
        let key = test_key();
        assert!(matches!(
            verify_hs256("only-one-part", &key, Audience::PasswordReset, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("a.b.c.d", &key, Audience::PasswordReset, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("!!.!!.!!", &key, Audience::PasswordReset, NOW),
            Err(Error::Base64)
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn signer_applies_default_ttls() {
        let signer = TokenSigner::new(test_key(), 30, 60);

        assert_eq!(signer.default_ttl_minutes(Audience::PasswordReset), None);
        assert_eq!(
            signer.default_ttl_minutes(Audience::EmailValidation),
            Some(30)
        );
        assert_eq!(signer.default_ttl_minutes(Audience::SpamCheck), Some(60));

        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("alice"));
        let token = signer
            .issue(claims, Audience::EmailValidation, None)
            .unwrap();
        let read = signer.read(&token, Audience::EmailValidation).unwrap();
        assert!(read.exp.is_some());

        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("alice"));
        let token = signer.issue(claims, Audience::PasswordReset, None).unwrap();
        let read = signer.read(&token, Audience::PasswordReset).unwrap();
        assert_eq!(read.exp, None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn signer_ttl_override_wins() {
        let signer = TokenSigner::new(test_key(), 30, 60);
        let token = signer
            .issue(Map::new(), Audience::SpamCheck, Some(-1))
            .unwrap();
        assert!(matches!(
            signer.read(&token, Audience::SpamCheck),
            Err(Error::Expired)
        ));
    }
}
