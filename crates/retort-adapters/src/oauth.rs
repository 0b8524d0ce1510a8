//! OAuth 1.0a request signing (HMAC-SHA1) using the `ring` crate.
//!
//! Writes to the X API need user-context authentication.  Each request gets
//! a fresh random nonce and the current timestamp; the signature covers the
//! HTTP method, the normalized URL, the query parameters and the `oauth_*`
//! parameters.  JSON request bodies are not part of the signature base.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use url::Url;

use crate::error::{AdapterError, Result};

/// Length of the random nonce in bytes before hex encoding.
const NONCE_LEN: usize = 16;

/// The four secrets of an OAuth 1.0a user-context credential.
#[derive(Clone)]
pub struct OAuth1Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for OAuth1Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth1Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl OAuth1Credentials {
    /// Build the `Authorization` header value for `method` on `url`.
    pub fn authorization_header(&self, method: &str, url: &Url) -> Result<String> {
        let nonce = random_nonce()?;
        let timestamp = Utc::now().timestamp();
        Ok(self.authorization_header_with(method, url, &[], &nonce, timestamp))
    }

    /// Deterministic core of [`authorization_header`](Self::authorization_header).
    ///
    /// `extra` carries form-encoded body parameters, which are signed; JSON
    /// bodies are not and callers pass nothing.
    fn authorization_header_with(
        &self,
        method: &str,
        url: &Url,
        extra: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.extend(
            oauth_params
                .iter()
                .chain(extra)
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned())),
        );

        let base = signature_base_string(method, url, &params);
        let signature = hmac_sha1_signature(
            &base,
            &self.consumer_secret,
            &self.access_token_secret,
        );

        let mut header_params: Vec<(&str, &str)> = oauth_params.to_vec();
        header_params.push(("oauth_signature", signature.as_str()));
        header_params.sort_unstable();

        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Signature primitives
// ---------------------------------------------------------------------------

/// RFC 3986 percent-encoding: everything except `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `scheme://host[:port]/path`, without query or fragment.
fn normalized_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&normalized_url(url)),
        percent_encode(&param_string)
    )
}

fn hmac_sha1_signature(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
    let tag = hmac::sign(&key, base.as_bytes());
    general_purpose::STANDARD.encode(tag.as_ref())
}

fn random_nonce() -> Result<String> {
    let mut bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AdapterError::Internal("failed to generate OAuth nonce".into()))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuth1Credentials {
        OAuth1Credentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: i64 = 1_318_622_958;

    #[test]
    fn percent_encode_follows_rfc3986() {
        assert_eq!(percent_encode("AZaz09-._~"), "AZaz09-._~");
        assert_eq!(
            percent_encode("Ladies + Gentlemen ☃ *"),
            "Ladies%20%2B%20Gentlemen%20%E2%98%83%20%2A"
        );
        assert_eq!(percent_encode("a=b&c"), "a%3Db%26c");
    }

    #[test]
    fn normalized_url_drops_query_and_default_port() {
        let url = Url::parse("HTTPS://API.X.com:443/2/tweets?x=1#frag").unwrap();
        assert_eq!(normalized_url(&url), "https://api.x.com/2/tweets");

        let url = Url::parse("http://localhost:8080/2/tweets").unwrap();
        assert_eq!(normalized_url(&url), "http://localhost:8080/2/tweets");
    }

    #[test]
    fn signs_published_reference_request() {
        let url =
            Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
                .unwrap();
        let header = credentials().authorization_header_with(
            "post",
            &url,
            &[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")],
            NONCE,
            TIMESTAMP,
        );

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_nonce=\"kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\""));
        // Body and query parameters are signed but not sent in the header.
        assert!(!header.contains("status"));
        assert!(!header.contains("include_entities"));
    }

    #[test]
    fn signs_json_post_without_body() {
        let url = Url::parse("https://api.twitter.com/2/tweets").unwrap();
        let header = credentials().authorization_header_with("POST", &url, &[], NONCE, TIMESTAMP);
        assert!(header.contains("oauth_signature=\"KW%2FbTR%2F89oblzvjn7CwP2L8j5qQ%3D\""));
    }

    #[test]
    fn fresh_headers_use_distinct_nonces() {
        let url = Url::parse("https://api.twitter.com/2/tweets").unwrap();
        let creds = credentials();
        let a = creds.authorization_header("POST", &url).unwrap();
        let b = creds.authorization_header("POST", &url).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn debug_redacts_secrets() {
        let shown = format!("{:?}", credentials());
        assert!(!shown.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"));
        assert!(!shown.contains("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"));
        assert!(shown.contains("<redacted>"));
    }
}
