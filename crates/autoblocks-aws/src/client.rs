//! Region- and credential-bound client for one AWS service.
//!
//! A [`ServiceClient`] signs every request with SigV4 and hands it to its
//! [`Transport`] exactly once. There is no retry loop: a failed call is
//! reported to the caller as-is.

use crate::config::{Credentials, Region};
use crate::error::{AwsError, AwsResult};
use crate::service::{Protocol, ServiceId};
use crate::signing::{build_query_string, SigV4Signer};
use crate::transport::{HttpResponse, Transport};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Client for a single service, built fresh for each invocation.
#[derive(Clone)]
pub struct ServiceClient {
    service: ServiceId,
    region: Region,
    credentials: Credentials,
    /// Base URL: the service's regional endpoint or the caller's override.
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("region", &self.region)
            .field("credentials", &self.credentials)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ServiceClient {
    pub(crate) fn new(
        service: ServiceId,
        region: Region,
        credentials: Credentials,
        endpoint: String,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            service,
            region,
            credentials,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a signed Query / EC2 query request (form-encoded body, XML
    /// response). `params` must already hold `Action` and `Version`.
    pub async fn query_request(&self, params: &BTreeMap<String, String>) -> AwsResult<HttpResponse> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        );
        self.send("POST", "/", headers, &build_query_string(params)).await
    }

    /// Execute a signed JSON-protocol request.
    pub async fn json_request(&self, operation: &str, json_body: &str) -> AwsResult<HttpResponse> {
        let content_type = match self.service.protocol() {
            Protocol::Json10 => "application/x-amz-json-1.0",
            _ => "application/x-amz-json-1.1",
        };
        let prefix = self.service.target_prefix().ok_or_else(|| {
            AwsError::new(
                self.service.as_str(),
                "ConfigurationError",
                "service does not speak a JSON protocol",
                0,
            )
        })?;
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("x-amz-target".to_string(), format!("{}.{}", prefix, operation));
        self.send("POST", "/", headers, json_body).await
    }

    /// Execute a signed request against `path_and_query` (already encoded)
    /// relative to the endpoint.
    ///
    /// Non-2xx responses are read to completion and decoded into an
    /// [`AwsError`].
    pub async fn send(
        &self,
        method: &str,
        path_and_query: &str,
        mut headers: BTreeMap<String, String>,
        body: &str,
    ) -> AwsResult<HttpResponse> {
        let url = if path_and_query.starts_with('/') {
            format!("{}{}", self.endpoint, path_and_query)
        } else {
            format!("{}/{}", self.endpoint, path_and_query)
        };
        headers.insert("host".to_string(), host_header(&self.endpoint));

        let signer = SigV4Signer::new(
            &self.credentials,
            &self.service.signing_region(&self.region),
            self.service.signing_name(),
        );
        let signed = signer.sign_request(method, &url, &headers, body, Utc::now());

        log::debug!("{} {} {}", self.service, method, url);
        let response = self.transport.send(signed).await?;
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let request_id = response.request_id();
        let error_type = response.headers.get("x-amzn-errortype").cloned();
        let text = response.body.collect_string().await?;
        let mut err = AwsError::from_response(self.service.as_str(), status, &text, error_type.as_deref());
        if err.request_id.is_none() {
            if let Some(id) = request_id {
                err = err.with_request_id(id);
            }
        }
        Err(err)
    }
}

/// `host[:port]` of a URL, as it must appear in the signed Host header.
fn host_header(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            })
        })
        .unwrap_or_else(|| "amazonaws.com".to_string())
}

/// Query API parameters with the common fields filled in.
pub fn build_query_params(action: &str, version: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("Action".to_string(), action.to_string());
    params.insert("Version".to_string(), version.to_string());
    params
}
