//! Invocation input, credentials, region handling and client settings.
//!
//! Mirrors the split used by `aws-config` / `aws-credential-types`:
//! long-lived credentials are owned by the host platform and passed in
//! read-only, while everything specific to one block invocation lives in an
//! [`InvocationConfig`] that is built once and never mutated.

use crate::error::{BlockError, BlockResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ── Regions ─────────────────────────────────────────────────────────────

/// Commercial, GovCloud and China regions known at build time. Regions
/// outside this list are accepted when well-formed.
pub const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ca-central-1",
    "ca-west-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-south-1",
    "eu-south-2",
    "eu-north-1",
    "il-central-1",
    "me-south-1",
    "me-central-1",
    "sa-east-1",
    // GovCloud
    "us-gov-east-1",
    "us-gov-west-1",
    // China
    "cn-north-1",
    "cn-northwest-1",
];

lazy_static::lazy_static! {
    static ref REGION_PATTERN: regex::Regex =
        regex::Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]{1,2}$").expect("static region pattern");
}

/// An AWS region code such as `eu-west-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Parse a region code, rejecting empty or malformed identifiers.
    pub fn parse(name: &str) -> BlockResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BlockError::config("region", "region is required"));
        }
        if !REGION_PATTERN.is_match(name) {
            return Err(BlockError::config(
                "region",
                format!("'{}' is not a region identifier", name),
            ));
        }
        if !AWS_REGIONS.contains(&name) {
            log::warn!("region '{}' is not in the known region list; using it as-is", name);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this region is in [`AWS_REGIONS`].
    pub fn is_known(&self) -> bool {
        AWS_REGIONS.contains(&self.0.as_str())
    }

    /// Return the partition for this region (aws, aws-cn, aws-us-gov).
    pub fn partition(&self) -> &'static str {
        if self.0.starts_with("cn-") {
            "aws-cn"
        } else if self.0.starts_with("us-gov-") {
            "aws-us-gov"
        } else {
            "aws"
        }
    }

    /// DNS suffix of the region's partition.
    pub fn dns_suffix(&self) -> &'static str {
        if self.0.starts_with("cn-") {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Credentials ─────────────────────────────────────────────────────────

/// An access key pair with an optional session token.
///
/// Used both for the platform's long-lived (base) credentials and for the
/// temporary triple minted by STS.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Platform- or tenant-level credentials, treated as read-only input.
pub type BaseCredentials = Credentials;

impl Credentials {
    /// Create long-term credentials.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
        }
    }

    /// Create temporary credentials with a session token.
    pub fn new_temporary(access_key_id: &str, secret_access_key: &str, session_token: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: Some(session_token.to_string()),
        }
    }

    /// Check if credentials are temporary (have a session token).
    pub fn is_temporary(&self) -> bool {
        self.session_token.is_some()
    }

    /// Read credentials from the standard AWS environment variables.
    pub fn from_environment() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let access_key = lookup("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty())?;
        let secret_key = lookup("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty())?;
        Some(Self {
            access_key_id: access_key,
            secret_access_key: secret_key,
            session_token: lookup("AWS_SESSION_TOKEN").filter(|v| !v.is_empty()),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

// ── Invocation input ────────────────────────────────────────────────────

/// Everything one block invocation needs besides the base credentials.
///
/// Core invocation metadata (region, role, endpoint) is kept apart from the
/// operation-specific parameters. Deserializes from the platform's camelCase
/// input:
///
/// ```json
/// {
///   "region": "eu-west-1",
///   "assumeRoleArn": "arn:aws:iam::123456789012:role/Deployer",
///   "endpointOverride": "http://localhost:4566",
///   "operationParameters": { "StackName": "web" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationConfig {
    region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assume_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint_override: Option<String>,
    #[serde(default)]
    operation_parameters: Map<String, Value>,
}

impl InvocationConfig {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            assume_role_arn: None,
            endpoint_override: None,
            operation_parameters: Map::new(),
        }
    }

    pub fn with_assume_role_arn(mut self, arn: &str) -> Self {
        self.assume_role_arn = Some(arn.to_string());
        self
    }

    pub fn with_endpoint_override(mut self, endpoint: &str) -> Self {
        self.endpoint_override = Some(endpoint.to_string());
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.operation_parameters = parameters;
        self
    }

    /// Deserialize from the platform's raw JSON input.
    pub fn from_value(value: Value) -> BlockResult<Self> {
        serde_json::from_value(value).map_err(|e| BlockError::config("config", e.to_string()))
    }

    /// The role to assume, if delegation was requested. Blank values count
    /// as absent.
    pub fn assume_role_arn(&self) -> Option<&str> {
        non_blank(self.assume_role_arn.as_deref())
    }

    /// The endpoint override, if any. Blank values count as absent.
    pub fn endpoint_override(&self) -> Option<&str> {
        non_blank(self.endpoint_override.as_deref())
    }

    pub fn operation_parameters(&self) -> &Map<String, Value> {
        &self.operation_parameters
    }

    /// Validate the metadata and return the parsed region.
    ///
    /// Only structural checks happen here; anything the remote end can judge
    /// (role trust, ARN account, parameter values) is left to it.
    pub fn validate(&self) -> BlockResult<Region> {
        let region = Region::parse(&self.region)?;
        if let Some(arn) = self.assume_role_arn() {
            if !arn.starts_with("arn:") {
                return Err(BlockError::config(
                    "assumeRoleArn",
                    format!("'{}' is not an ARN", arn),
                ));
            }
        }
        if let Some(endpoint) = self.endpoint_override() {
            validate_endpoint(endpoint)?;
        }
        Ok(region)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// An endpoint override must be an absolute http(s) URL.
pub(crate) fn validate_endpoint(endpoint: &str) -> BlockResult<url::Url> {
    let parsed = url::Url::parse(endpoint).map_err(|e| {
        BlockError::config("endpointOverride", format!("'{}' is not a URL: {}", endpoint, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(BlockError::config(
            "endpointOverride",
            format!("'{}' must be an http(s) URL with a host", endpoint),
        ));
    }
    Ok(parsed)
}

// ── Client settings ─────────────────────────────────────────────────────

/// Behavioral settings shared by every client the factory builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Prefix of generated STS role session names.
    pub session_name_prefix: String,
    /// `DurationSeconds` for AssumeRole; STS defaults to one hour when unset.
    pub assume_role_duration_secs: Option<u32>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: concat!("autoblocks-aws/", env!("CARGO_PKG_VERSION")).to_string(),
            session_name_prefix: "autoblocks".to_string(),
            assume_role_duration_secs: None,
        }
    }
}

impl ClientSettings {
    /// Defaults overlaid with `AUTOBLOCKS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(v) = parse_var(&lookup, "AUTOBLOCKS_REQUEST_TIMEOUT_SECS") {
            settings.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "AUTOBLOCKS_CONNECT_TIMEOUT_SECS") {
            settings.connect_timeout_secs = v;
        }
        if let Some(v) = lookup("AUTOBLOCKS_USER_AGENT").filter(|v| !v.is_empty()) {
            settings.user_agent = v;
        }
        if let Some(v) = lookup("AUTOBLOCKS_SESSION_NAME_PREFIX").filter(|v| !v.is_empty()) {
            settings.session_name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "AUTOBLOCKS_ASSUME_ROLE_DURATION_SECS") {
            settings.assume_role_duration_secs = Some(v);
        }
        settings
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {}='{}': not a valid number", key, raw);
            None
        }
    }
}
