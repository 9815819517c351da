//! Single-call operation invocation.

use crate::client::{build_query_params, ServiceClient};
use crate::error::{BlockError, BlockResult};
use crate::operation::{OperationDescriptor, OperationRegistry};
use crate::protocol;
use crate::publish::OperationOutput;
use crate::service::Protocol;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Performs exactly one request per invocation. Nothing is retried,
/// paginated or split into several calls.
#[derive(Debug, Clone)]
pub struct OperationInvoker {
    registry: Arc<OperationRegistry>,
}

impl OperationInvoker {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke `operation_name` on the client's service.
    ///
    /// Unsupported operation names are configuration errors raised before
    /// any request is made.
    pub async fn invoke(
        &self,
        client: &ServiceClient,
        operation_name: &str,
        parameters: &Map<String, Value>,
    ) -> BlockResult<OperationOutput> {
        let descriptor = self.registry.lookup(client.service(), operation_name)?;
        self.invoke_descriptor(client, &descriptor, parameters).await
    }

    /// Invoke an already resolved descriptor.
    pub async fn invoke_descriptor(
        &self,
        client: &ServiceClient,
        descriptor: &OperationDescriptor,
        parameters: &Map<String, Value>,
    ) -> BlockResult<OperationOutput> {
        if descriptor.service != client.service() {
            return Err(BlockError::config(
                "operation",
                format!("{} cannot run on a {} client", descriptor.id(), client.service()),
            ));
        }
        descriptor.check_parameters(parameters)?;

        let service = client.service();
        let response = match service.protocol() {
            Protocol::Query | Protocol::Ec2Query => {
                let mut form = build_query_params(descriptor.name, service.api_version());
                form.extend(protocol::flatten_query(
                    parameters,
                    service.protocol() == Protocol::Ec2Query,
                    descriptor.query_maps,
                ));
                client.query_request(&form).await
            }
            Protocol::Json10 | Protocol::Json11 => {
                let body = Value::Object(parameters.clone()).to_string();
                client.json_request(descriptor.name, &body).await
            }
            Protocol::RestXml | Protocol::RestJson => {
                let request = protocol::build_rest_request(descriptor, parameters)?;
                client
                    .send(&request.method, &request.path_and_query, request.headers, &request.body)
                    .await
            }
        }
        .map_err(|e| {
            log::warn!("{} failed: {}", descriptor.id(), e);
            BlockError::operation(service.as_str(), descriptor.name, e)
        })?;

        protocol::decode_response(descriptor, response)
            .await
            .map_err(|e| BlockError::operation(service.as_str(), descriptor.name, e))
    }
}
