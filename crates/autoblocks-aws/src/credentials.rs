//! Credential resolution: direct base credentials or STS role assumption.

use crate::config::{Credentials, Region};
use crate::error::{BlockError, BlockResult};
use crate::factory::ClientFactory;
use crate::service::ServiceId;
use crate::sts::{AssumeRoleInput, StsClient};
use chrono::{DateTime, Utc};

/// Longest role session name STS accepts.
const MAX_SESSION_NAME_LEN: usize = 64;

/// Temporary credentials minted by `AssumeRole` for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AssumedRole {
    pub credentials: Credentials,
    pub role_arn: String,
    pub session_name: String,
    pub expiration: Option<DateTime<Utc>>,
    /// ARN of the assumed-role session principal, when STS reports it.
    pub assumed_role_arn: Option<String>,
}

/// The credential set presented to the target service.
///
/// Lives for exactly one invocation; never cached.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCredentials {
    /// The base credentials, untouched.
    Direct(Credentials),
    /// Credentials obtained by assuming a role.
    Assumed(AssumedRole),
}

impl ResolvedCredentials {
    pub fn credentials(&self) -> &Credentials {
        match self {
            Self::Direct(c) => c,
            Self::Assumed(role) => &role.credentials,
        }
    }

    pub fn is_assumed(&self) -> bool {
        matches!(self, Self::Assumed(_))
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Direct(_) => None,
            Self::Assumed(role) => role.expiration,
        }
    }
}

/// Decides which credentials an invocation uses.
#[derive(Clone)]
pub struct CredentialResolver {
    factory: ClientFactory,
}

impl CredentialResolver {
    /// STS clients are built through `factory`, so they share its transport
    /// and settings.
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory }
    }

    /// Resolve the credentials for one call.
    ///
    /// Without a role ARN (absent or blank) `base` is returned unchanged and
    /// no network call is made. With one, a transient STS client bound to
    /// `region` (and `endpoint_override`) assumes the role once; any failure
    /// becomes [`BlockError::Credential`] and base credentials are never
    /// substituted.
    pub async fn resolve(
        &self,
        region: &Region,
        assume_role_arn: Option<&str>,
        base: &Credentials,
        endpoint_override: Option<&str>,
    ) -> BlockResult<ResolvedCredentials> {
        let role_arn = match assume_role_arn.map(str::trim).filter(|a| !a.is_empty()) {
            Some(arn) => arn,
            None => return Ok(ResolvedCredentials::Direct(base.clone())),
        };

        let settings = self.factory.settings();
        let session_name = session_name(&settings.session_name_prefix, Utc::now());
        let mut input = AssumeRoleInput::new(role_arn, &session_name);
        input.duration_seconds = settings.assume_role_duration_secs;

        let sts = StsClient::new(self.factory.create_client(
            ServiceId::Sts,
            region,
            base,
            endpoint_override,
        )?);

        log::info!(
            "assuming role {} in {} as session {}",
            role_arn,
            region,
            session_name
        );
        let output = sts
            .assume_role(&input)
            .await
            .map_err(|e| {
                log::warn!("AssumeRole for {} failed: {}", role_arn, e);
                BlockError::credential(role_arn, e)
            })?;

        Ok(ResolvedCredentials::Assumed(AssumedRole {
            credentials: output.credentials,
            role_arn: role_arn.to_string(),
            session_name,
            expiration: output.expiration,
            assumed_role_arn: output.assumed_role_user.map(|u| u.arn),
        }))
    }
}

/// Time-based role session name: `{prefix}-{unix millis}`.
///
/// Names are not guaranteed unique across concurrent invocations; STS
/// accepts duplicates. Characters outside `[\w+=,.@-]` in the prefix are
/// replaced with `-`, and the result is capped at 64 characters.
pub fn session_name(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = now.timestamp_millis().to_string();
    let mut clean: String = prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    let max_prefix = MAX_SESSION_NAME_LEN - suffix.len() - 1;
    clean.truncate(max_prefix);
    if clean.is_empty() {
        clean.push_str("session");
    }
    format!("{}-{}", clean, suffix)
}
