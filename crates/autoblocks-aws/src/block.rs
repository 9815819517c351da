//! The block pipeline: validate, resolve credentials, build the client,
//! invoke once, publish once.

use crate::config::{BaseCredentials, ClientSettings, InvocationConfig};
use crate::credentials::CredentialResolver;
use crate::error::BlockResult;
use crate::factory::ClientFactory;
use crate::invoker::OperationInvoker;
use crate::operation::OperationRegistry;
use crate::publish::{EventSink, ResponsePublisher};
use crate::transport::Transport;
use std::sync::Arc;

/// Runs operation blocks end to end.
///
/// A runner holds no per-invocation state: every [`run`](Self::run) resolves
/// its own credentials and builds its own clients, so concurrent runs with
/// different identities never observe each other.
#[derive(Clone)]
pub struct BlockRunner {
    registry: Arc<OperationRegistry>,
    factory: ClientFactory,
    resolver: CredentialResolver,
    invoker: OperationInvoker,
    publisher: ResponsePublisher,
}

impl BlockRunner {
    /// A runner over the built-in operation catalog and real HTTP.
    pub fn new(settings: ClientSettings) -> Self {
        Self::from_parts(Arc::new(OperationRegistry::builtin()), ClientFactory::new(settings))
    }

    /// A runner whose clients (STS included) all send through `transport`.
    pub fn with_transport(settings: ClientSettings, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(
            Arc::new(OperationRegistry::builtin()),
            ClientFactory::with_transport(settings, transport),
        )
    }

    /// Replace the operation catalog.
    pub fn with_registry(self, registry: OperationRegistry) -> Self {
        Self::from_parts(Arc::new(registry), self.factory)
    }

    fn from_parts(registry: Arc<OperationRegistry>, factory: ClientFactory) -> Self {
        Self {
            resolver: CredentialResolver::new(factory.clone()),
            invoker: OperationInvoker::new(Arc::clone(&registry)),
            publisher: ResponsePublisher::new(),
            registry,
            factory,
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Run `operation_id` (`"{service}:{Operation}"`) once.
    ///
    /// On success exactly one payload has been emitted to `sink`. On failure
    /// nothing has been emitted and the error names the stage that failed.
    /// Configuration problems are reported before any network call.
    pub async fn run(
        &self,
        operation_id: &str,
        config: &InvocationConfig,
        base: &BaseCredentials,
        sink: &dyn EventSink,
    ) -> BlockResult<()> {
        let descriptor = self.registry.get(operation_id)?;
        let region = config.validate()?;
        descriptor.check_parameters(config.operation_parameters())?;

        let resolved = self
            .resolver
            .resolve(&region, config.assume_role_arn(), base, config.endpoint_override())
            .await?;
        log::debug!(
            "{} in {} using {} credentials",
            descriptor.id(),
            region,
            if resolved.is_assumed() { "assumed-role" } else { "base" }
        );

        let client = self.factory.create_client(
            descriptor.service,
            &region,
            resolved.credentials(),
            config.endpoint_override(),
        )?;
        let output = self
            .invoker
            .invoke_descriptor(&client, &descriptor, config.operation_parameters())
            .await?;

        self.publisher
            .publish(descriptor.service.as_str(), descriptor.name, output, sink)
            .await?;
        log::info!("{} completed in {}", descriptor.id(), region);
        Ok(())
    }
}
