//! AWS Signature Version 4.
//!
//! Implements the SigV4 algorithm as documented at
//! <https://docs.aws.amazon.com/general/latest/gr/sigv4_signing.html>:
//!
//! 1. Create a canonical request
//! 2. Create the string to sign
//! 3. Calculate the signing key
//! 4. Add the signature to the request

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hash of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Everything except the RFC 3986 unreserved characters.
const AWS_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// SigV4 signer bound to one credential set, region and signing name.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

/// A signed request ready to hand to a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Signing name of the service the request is addressed to.
    pub service: String,
    /// HTTP method (GET, POST, PUT, DELETE, ...).
    pub method: String,
    /// Full URL including query string.
    pub url: String,
    /// Headers including the Authorization header.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<String>,
}

impl SignedRequest {
    /// The access key id named in the Authorization header's credential scope.
    pub fn access_key_id(&self) -> Option<&str> {
        let auth = self.headers.get("authorization")?;
        let rest = auth.split("Credential=").nth(1)?;
        rest.split('/').next()
    }
}

impl SigV4Signer {
    pub fn new(credentials: &Credentials, region: &str, service: &str) -> Self {
        Self {
            credentials: credentials.clone(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Sign a request and return it with `authorization`, `x-amz-date`,
    /// `x-amz-content-sha256` and (for temporary credentials)
    /// `x-amz-security-token` headers added.
    ///
    /// `headers` must already contain `host`.
    pub fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> SignedRequest {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let mut signed_headers = headers.clone();
        signed_headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(ref token) = self.credentials.session_token {
            signed_headers.insert("x-amz-security-token".to_string(), token.clone());
        }
        let payload_hash = sha256_hex(body.as_bytes());
        signed_headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let (canonical_uri, canonical_querystring) = self.canonical_url_components(url);

        let canonical_request = self.create_canonical_request(
            method,
            &canonical_uri,
            &canonical_querystring,
            &signed_headers,
            &payload_hash,
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key_id,
            credential_scope,
            signed_header_names(&signed_headers),
            signature
        );
        signed_headers.insert("authorization".to_string(), authorization);

        SignedRequest {
            service: self.service.clone(),
            method: method.to_string(),
            url: url.to_string(),
            headers: signed_headers,
            body: if body.is_empty() {
                None
            } else {
                Some(body.to_string())
            },
        }
    }

    /// CanonicalRequest =
    ///   Method \n CanonicalURI \n CanonicalQueryString \n
    ///   CanonicalHeaders \n SignedHeaders \n HexEncode(Hash(Payload))
    fn create_canonical_request(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_querystring: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
    ) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri,
            canonical_querystring,
            canonical_headers(headers),
            signed_header_names(headers),
            payload_hash
        )
    }

    /// kSecret  = "AWS4" + SecretAccessKey
    /// kDate    = HMAC-SHA256(kSecret, Date)
    /// kRegion  = HMAC-SHA256(kDate, Region)
    /// kService = HMAC-SHA256(kRegion, Service)
    /// kSigning = HMAC-SHA256(kService, "aws4_request")
    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Split a URL into (canonical URI, canonical query string).
    ///
    /// Paths arrive already encoded by [`encode_path`]. S3 signs them as
    /// sent; every other service signs the path encoded a second time.
    fn canonical_url_components(&self, url: &str) -> (String, String) {
        let Ok(parsed) = url::Url::parse(url) else {
            return ("/".to_string(), String::new());
        };
        let raw_path = if parsed.path().is_empty() { "/" } else { parsed.path() };
        let path = if self.service == "s3" {
            raw_path.to_string()
        } else {
            raw_path
                .split('/')
                .map(uri_encode)
                .collect::<Vec<_>>()
                .join("/")
        };

        let mut query_params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
            .collect();
        query_params.sort();
        let query_string = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        (path, query_string)
    }
}

/// Lowercased, trimmed, sorted `name:value\n` lines.
fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    let mut sorted: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect()
}

/// The SignedHeaders string (semicolon-delimited, sorted, lowercased).
fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    let mut names: Vec<String> = headers.keys().map(|k| k.to_lowercase()).collect();
    names.sort();
    names.join(";")
}

// ── Helper functions ────────────────────────────────────────────────────

/// Compute SHA-256 and return it hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode everything except unreserved characters (RFC 3986).
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, AWS_ENCODE_SET).to_string()
}

/// Encode a URL path segment by segment, preserving `/`.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Build a query string from parameters, sorted by key.
pub fn build_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
