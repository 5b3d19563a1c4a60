use std::fmt;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::key::ObjectKey;

type HmacSha256 = Hmac<Sha256>;

/// HTTP method a signed URL is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedQuery {
    /// Unix timestamp (seconds) after which the URL is rejected.
    pub expires: i64,
    /// Hex-encoded HMAC-SHA256 signature.
    pub signature: String,
    pub content_type: Option<String>,
    pub max_bytes: Option<u64>,
}

/// Why a signed URL was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    Expired,
    Invalid,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str("signed URL has expired"),
            Self::Invalid => f.write_str("signed URL signature is invalid"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Issues and verifies HMAC-signed URLs for the local object store.
///
/// A URL has the form
/// `{base_url}/blobs/{key}?expires=..&signature=..[&content_type=..][&max_bytes=..]`.
/// The signature covers the method, key, expiry and the optional constraints,
/// so none of them can be altered without invalidating the URL.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            secret: secret.as_ref().to_vec(),
            base_url,
        }
    }

    /// Issue a URL valid for `ttl` from now.
    pub fn presign(
        &self,
        method: SignedMethod,
        key: &ObjectKey,
        content_type: Option<&str>,
        max_bytes: Option<u64>,
        ttl: Duration,
    ) -> String {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        self.sign_url(method, key, content_type, max_bytes, expires)
    }

    /// Issue a URL expiring at the given Unix timestamp.
    pub fn sign_url(
        &self,
        method: SignedMethod,
        key: &ObjectKey,
        content_type: Option<&str>,
        max_bytes: Option<u64>,
        expires: i64,
    ) -> String {
        let signature = self.signature(method, key, content_type, max_bytes, expires);
        let mut url = format!(
            "{}/blobs/{}?expires={expires}&signature={signature}",
            self.base_url,
            key.as_str()
        );
        if let Some(ct) = content_type {
            url.push_str("&content_type=");
            url.push_str(&urlencoding::encode(ct));
        }
        if let Some(max) = max_bytes {
            url.push_str(&format!("&max_bytes={max}"));
        }
        url
    }

    /// Check a signed request against the current time.
    pub fn verify(
        &self,
        method: SignedMethod,
        key: &ObjectKey,
        query: &SignedQuery,
    ) -> Result<(), SignatureError> {
        self.verify_at(method, key, query, Utc::now().timestamp())
    }

    /// Check a signed request against an explicit clock.
    pub fn verify_at(
        &self,
        method: SignedMethod,
        key: &ObjectKey,
        query: &SignedQuery,
        now: i64,
    ) -> Result<(), SignatureError> {
        let provided = hex::decode(&query.signature).map_err(|_| SignatureError::Invalid)?;

        let mut mac = self.mac();
        mac.update(
            canonical_payload(
                method,
                key,
                query.content_type.as_deref(),
                query.max_bytes,
                query.expires,
            )
            .as_bytes(),
        );
        mac.verify_slice(&provided).map_err(|_| SignatureError::Invalid)?;

        if now > query.expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn signature(
        &self,
        method: SignedMethod,
        key: &ObjectKey,
        content_type: Option<&str>,
        max_bytes: Option<u64>,
        expires: i64,
    ) -> String {
        let mut mac = self.mac();
        mac.update(canonical_payload(method, key, content_type, max_bytes, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }
}

fn canonical_payload(
    method: SignedMethod,
    key: &ObjectKey,
    content_type: Option<&str>,
    max_bytes: Option<u64>,
    expires: i64,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        key.as_str(),
        expires,
        content_type.unwrap_or(""),
        max_bytes.map(|m| m.to_string()).unwrap_or_default()
    )
}
