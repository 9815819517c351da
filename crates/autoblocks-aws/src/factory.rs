//! Construction of per-invocation service clients.

use crate::client::ServiceClient;
use crate::config::{validate_endpoint, ClientSettings, Credentials, Region};
use crate::error::{BlockError, BlockResult};
use crate::service::ServiceId;
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;

/// Builds [`ServiceClient`]s. Construction never touches the network.
///
/// Without an injected transport every client gets its own freshly built
/// [`HttpTransport`], so clients of different invocations share nothing.
#[derive(Clone)]
pub struct ClientFactory {
    settings: ClientSettings,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientFactory {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            transport: None,
        }
    }

    /// Route every client through `transport` (emulators, tests, hosts that
    /// bring their own HTTP stack).
    pub fn with_transport(settings: ClientSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport: Some(transport),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Create a client for `service` in `region`.
    ///
    /// A non-empty `endpoint_override` replaces the service's regional
    /// endpoint.
    pub fn create_client(
        &self,
        service: ServiceId,
        region: &Region,
        credentials: &Credentials,
        endpoint_override: Option<&str>,
    ) -> BlockResult<ServiceClient> {
        let endpoint = match endpoint_override.map(str::trim).filter(|e| !e.is_empty()) {
            Some(custom) => {
                validate_endpoint(custom)?;
                custom.to_string()
            }
            None => service.default_endpoint(region),
        };

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(HttpTransport::new(&self.settings).map_err(|e| {
                BlockError::config("transport", e.message)
            })?),
        };

        log::debug!("created {} client for {} at {}", service, region, endpoint);
        Ok(ServiceClient::new(
            service,
            region.clone(),
            credentials.clone(),
            endpoint,
            transport,
        ))
    }

    /// Like [`create_client`](Self::create_client) with the service given by
    /// name; unknown names are configuration errors.
    pub fn create_client_by_name(
        &self,
        service: &str,
        region: &Region,
        credentials: &Credentials,
        endpoint_override: Option<&str>,
    ) -> BlockResult<ServiceClient> {
        let id: ServiceId = service.parse()?;
        self.create_client(id, region, credentials, endpoint_override)
    }
}
