//! # autoblocks-aws – generic AWS operation blocks
//!
//! Runs one AWS API operation per invocation: resolve credentials
//! (optionally assuming an IAM role through STS), build a fresh client for
//! the target service, call the operation exactly once and emit the result
//! as a single JSON event.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  BlockRunner  (block.rs)                         │
//! │  └── validate → resolve → build → invoke → emit  │
//! ├──────────────────────────────────────────────────┤
//! │  CredentialResolver  (credentials.rs, sts.rs)    │
//! │  OperationInvoker    (invoker.rs, protocol.rs)   │
//! │  ResponsePublisher   (publish.rs)                │
//! ├──────────────────────────────────────────────────┤
//! │  OperationRegistry   (operation.rs)              │
//! │  ClientFactory / ServiceClient  (factory.rs,     │
//! │                                  client.rs)      │
//! ├──────────────────────────────────────────────────┤
//! │  SigV4Signer  (signing.rs)                       │
//! │  Transport    (transport.rs) ── reqwest          │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## API Protocols
//!
//! | Protocol    | Services                                               |
//! |-------------|--------------------------------------------------------|
//! | Query + XML | IAM, STS, CloudWatch, RDS, SNS, SQS, CloudFormation    |
//! | EC2 Query   | EC2                                                    |
//! | JSON 1.0/1.1| KMS, SSM, Secrets Manager, DynamoDB, ECS, Logs         |
//! | REST + XML  | S3, CloudFront, Route 53                               |
//! | REST + JSON | Lambda                                                 |

// ── Sub-modules ─────────────────────────────────────────────────────────

pub mod error;
pub mod config;
pub mod signing;
pub mod transport;
pub mod service;
pub mod client;
pub mod factory;
pub mod xml;
pub mod sts;
pub mod credentials;

// Operations
pub mod operation;
pub mod protocol;
pub mod invoker;
pub mod publish;
pub mod block;

// ── Re-exports ──────────────────────────────────────────────────────────

pub use block::BlockRunner;
pub use client::ServiceClient;
pub use config::{BaseCredentials, ClientSettings, Credentials, InvocationConfig, Region};
pub use credentials::{AssumedRole, CredentialResolver, ResolvedCredentials};
pub use error::{AwsError, AwsResult, BlockError, BlockResult, Stage};
pub use factory::ClientFactory;
pub use invoker::OperationInvoker;
pub use operation::{HttpBinding, OperationDescriptor, OperationRegistry, Payload, QueryMap};
pub use publish::{ChannelSink, EventSink, OperationOutput, ResponsePublisher, StreamingOutput};
pub use service::{Protocol, ServiceId};
pub use signing::SignedRequest;
pub use transport::{ByteStream, HttpResponse, HttpTransport, Transport};
pub use xml::XmlShape;
