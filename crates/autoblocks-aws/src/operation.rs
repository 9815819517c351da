//! Operation descriptors and the registry that maps operation ids to them.
//!
//! One descriptor replaces one hand-written block: the service it targets,
//! the operation name, and for REST protocols how parameters bind onto the
//! HTTP request.

use crate::error::{BlockError, BlockResult};
use crate::service::{Protocol, ServiceId};
use crate::xml::XmlShape;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Where a REST request body comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// The member's value is sent verbatim (strings as-is, other values as
    /// JSON text).
    Blob(&'static str),
    /// The member is serialized as an XML element of the same name, in the
    /// service's namespace.
    Xml(&'static str),
}

/// HTTP binding of a REST-XML / REST-JSON operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBinding {
    pub method: &'static str,
    /// Path template with `{Label}` / greedy `{Label+}` segments and an
    /// optional static query (`/{Bucket}?list-type=2`).
    pub uri: &'static str,
    /// `(member, query parameter)` pairs.
    pub query: &'static [(&'static str, &'static str)],
    /// `(member, request header)` pairs.
    pub headers: &'static [(&'static str, &'static str)],
    pub payload: Option<Payload>,
    /// `(response header, output member)` pairs.
    pub output_headers: &'static [(&'static str, &'static str)],
}

impl HttpBinding {
    pub fn new(method: &'static str, uri: &'static str) -> Self {
        Self {
            method,
            uri,
            query: &[],
            headers: &[],
            payload: None,
            output_headers: &[],
        }
    }

    pub fn query(mut self, query: &'static [(&'static str, &'static str)]) -> Self {
        self.query = query;
        self
    }

    pub fn headers(mut self, headers: &'static [(&'static str, &'static str)]) -> Self {
        self.headers = headers;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn output_headers(mut self, output_headers: &'static [(&'static str, &'static str)]) -> Self {
        self.output_headers = output_headers;
        self
    }

    /// Names of the `{Label}` segments in the path template.
    pub fn path_labels(&self) -> Vec<&'static str> {
        let path = self.uri.split('?').next().unwrap_or(self.uri);
        path.split('{')
            .skip(1)
            .filter_map(|rest| rest.split('}').next())
            .map(|label| label.trim_end_matches('+'))
            .collect()
    }
}

/// A Query-protocol map member, sent as a numbered list of key/value
/// entries: `{prefix}.N.{key}` and `{prefix}.N.{value}[.field]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMap {
    /// Parameter member holding a JSON object.
    pub member: &'static str,
    /// Wire prefix of the entries (`MessageAttributes.entry`, `MessageAttribute`).
    pub prefix: &'static str,
    pub key: &'static str,
    pub value: &'static str,
}

/// Declaration of one invocable AWS operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    pub service: ServiceId,
    pub name: &'static str,
    /// Members that must be present in the parameters.
    pub required: &'static [&'static str],
    /// Required for REST protocols, ignored otherwise.
    pub http: Option<HttpBinding>,
    /// Output member carried as a byte stream (drained before emission).
    pub streaming_output: Option<&'static str>,
    /// Map members of a Query-protocol request.
    pub query_maps: &'static [QueryMap],
    /// Flattened XML lists (repeated siblings).
    pub xml_lists: &'static [&'static str],
    /// XML list wrappers whose children are the items.
    pub xml_wrappers: &'static [&'static str],
    /// XML leaves decoded as booleans.
    pub xml_booleans: &'static [&'static str],
    /// XML leaves decoded as numbers.
    pub xml_numbers: &'static [&'static str],
}

impl OperationDescriptor {
    pub fn new(service: ServiceId, name: &'static str) -> Self {
        Self {
            service,
            name,
            required: &[],
            http: None,
            streaming_output: None,
            query_maps: &[],
            xml_lists: &[],
            xml_wrappers: &[],
            xml_booleans: &[],
            xml_numbers: &[],
        }
    }

    pub fn required(mut self, members: &'static [&'static str]) -> Self {
        self.required = members;
        self
    }

    pub fn http(mut self, binding: HttpBinding) -> Self {
        self.http = Some(binding);
        self
    }

    pub fn streaming(mut self, member: &'static str) -> Self {
        self.streaming_output = Some(member);
        self
    }

    pub fn query_maps(mut self, maps: &'static [QueryMap]) -> Self {
        self.query_maps = maps;
        self
    }

    pub fn xml_lists(mut self, names: &'static [&'static str]) -> Self {
        self.xml_lists = names;
        self
    }

    pub fn xml_wrappers(mut self, names: &'static [&'static str]) -> Self {
        self.xml_wrappers = names;
        self
    }

    pub fn xml_booleans(mut self, names: &'static [&'static str]) -> Self {
        self.xml_booleans = names;
        self
    }

    pub fn xml_numbers(mut self, names: &'static [&'static str]) -> Self {
        self.xml_numbers = names;
        self
    }

    /// Typing hints for decoding this operation's XML response.
    pub fn xml_shape(&self) -> XmlShape<'static> {
        XmlShape {
            lists: self.xml_lists,
            wrappers: self.xml_wrappers,
            booleans: self.xml_booleans,
            numbers: self.xml_numbers,
        }
    }

    /// `"{service}:{Operation}"`, e.g. `s3:ListObjects`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.service, self.name)
    }

    /// Presence checks on `parameters`: declared required members and, for
    /// REST operations, every path label. Field values are not validated.
    pub fn check_parameters(&self, parameters: &Map<String, Value>) -> BlockResult<()> {
        let is_rest = matches!(self.service.protocol(), Protocol::RestXml | Protocol::RestJson);
        if is_rest && self.http.is_none() {
            return Err(BlockError::config(
                "operation",
                format!("{} has no HTTP binding", self.id()),
            ));
        }

        let labels = self.http.as_ref().map(HttpBinding::path_labels).unwrap_or_default();
        for member in self.required.iter().chain(labels.iter()) {
            match parameters.get(*member) {
                None | Some(Value::Null) => {
                    return Err(BlockError::config(
                        format!("operationParameters.{}", member),
                        format!("required by {}", self.id()),
                    ))
                }
                Some(Value::String(s)) if s.is_empty() && labels.contains(member) => {
                    return Err(BlockError::config(
                        format!("operationParameters.{}", member),
                        "path parameter must not be empty",
                    ))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ── Registry ────────────────────────────────────────────────────────────

/// Lookup table from operation id to descriptor.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<OperationDescriptor>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_catalog() {
            registry.register(descriptor);
        }
        registry
    }

    /// Add or replace a descriptor.
    pub fn register(&mut self, descriptor: OperationDescriptor) {
        self.operations.insert(descriptor.id(), Arc::new(descriptor));
    }

    /// Look up `"{service}:{Operation}"`. The service part is matched
    /// case-insensitively (and accepts aliases); the operation name exactly.
    pub fn get(&self, id: &str) -> BlockResult<Arc<OperationDescriptor>> {
        let (service, operation) = id.split_once(':').ok_or_else(|| {
            BlockError::config("operation", format!("'{}' is not of the form service:Operation", id))
        })?;
        let service: ServiceId = service.parse()?;
        self.lookup(service, operation.trim())
    }

    pub fn lookup(&self, service: ServiceId, operation: &str) -> BlockResult<Arc<OperationDescriptor>> {
        self.operations
            .get(&format!("{}:{}", service, operation))
            .cloned()
            .ok_or_else(|| {
                BlockError::config(
                    "operation",
                    format!("unsupported operation '{}' for service {}", operation, service),
                )
            })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.operations.keys().cloned().collect();
        ids.sort();
        ids
    }
}

const SNS_MESSAGE_ATTRIBUTES: &[QueryMap] = &[QueryMap {
    member: "MessageAttributes",
    prefix: "MessageAttributes.entry",
    key: "Name",
    value: "Value",
}];

const SQS_MESSAGE_ATTRIBUTES: &[QueryMap] = &[
    QueryMap {
        member: "MessageAttributes",
        prefix: "MessageAttribute",
        key: "Name",
        value: "Value",
    },
    QueryMap {
        member: "MessageSystemAttributes",
        prefix: "MessageSystemAttribute",
        key: "Name",
        value: "Value",
    },
];

const S3_LIST_OBJECTS_NUMBERS: &[&str] = &["MaxKeys", "Size", "KeyCount"];

const EC2_INSTANCE_WRAPPERS: &[&str] = &[
    "reservationSet",
    "instancesSet",
    "groupSet",
    "tagSet",
    "blockDeviceMapping",
    "networkInterfaceSet",
    "productCodes",
];

const EC2_INSTANCE_NUMBERS: &[&str] = &["amiLaunchIndex", "code", "coreCount", "threadsPerCore"];

fn builtin_catalog() -> Vec<OperationDescriptor> {
    use ServiceId::*;

    vec![
        // CloudFormation
        OperationDescriptor::new(CloudFormation, "CreateStack").required(&["StackName"]),
        OperationDescriptor::new(CloudFormation, "UpdateStack").required(&["StackName"]),
        OperationDescriptor::new(CloudFormation, "DeleteStack").required(&["StackName"]),
        OperationDescriptor::new(CloudFormation, "DescribeStacks")
            .xml_wrappers(&["Stacks", "Outputs", "Parameters", "Tags", "Capabilities", "NotificationARNs"])
            .xml_booleans(&["DisableRollback", "EnableTerminationProtection"])
            .xml_numbers(&["TimeoutInMinutes"]),
        // CloudFront
        OperationDescriptor::new(CloudFront, "CreateOriginRequestPolicy")
            .required(&["OriginRequestPolicyConfig"])
            .http(
                HttpBinding::new("POST", "/2020-05-31/origin-request-policy")
                    .payload(Payload::Xml("OriginRequestPolicyConfig"))
                    .output_headers(&[("location", "Location"), ("etag", "ETag")]),
            ),
        OperationDescriptor::new(CloudFront, "ListDistributions")
            .http(
                HttpBinding::new("GET", "/2020-05-31/distribution")
                    .query(&[("Marker", "Marker"), ("MaxItems", "MaxItems")]),
            )
            .xml_wrappers(&["Items"])
            .xml_booleans(&["IsTruncated", "Enabled", "IsIPV6Enabled", "Staging"])
            .xml_numbers(&["MaxItems", "Quantity"]),
        OperationDescriptor::new(CloudFront, "GetDistribution")
            .http(
                HttpBinding::new("GET", "/2020-05-31/distribution/{Id}")
                    .output_headers(&[("etag", "ETag")]),
            )
            .xml_wrappers(&["Items"])
            .xml_booleans(&["Enabled", "IsIPV6Enabled", "Staging", "Compress"])
            .xml_numbers(&["Quantity", "InProgressInvalidationBatches", "HTTPPort", "HTTPSPort"]),
        // EC2
        OperationDescriptor::new(Ec2, "DescribeSecurityGroups")
            .xml_wrappers(&[
                "securityGroupInfo",
                "ipPermissions",
                "ipPermissionsEgress",
                "ipRanges",
                "ipv6Ranges",
                "groups",
                "prefixListIds",
                "tagSet",
            ])
            .xml_numbers(&["fromPort", "toPort"]),
        OperationDescriptor::new(Ec2, "DescribeInstances")
            .xml_wrappers(EC2_INSTANCE_WRAPPERS)
            .xml_booleans(&["ebsOptimized", "sourceDestCheck", "enaSupport", "deleteOnTermination"])
            .xml_numbers(EC2_INSTANCE_NUMBERS),
        OperationDescriptor::new(Ec2, "StartInstances")
            .required(&["InstanceId"])
            .xml_wrappers(&["instancesSet"])
            .xml_numbers(&["code"]),
        OperationDescriptor::new(Ec2, "StopInstances")
            .required(&["InstanceId"])
            .xml_wrappers(&["instancesSet"])
            .xml_numbers(&["code"]),
        // S3
        OperationDescriptor::new(S3, "ListBuckets")
            .http(HttpBinding::new("GET", "/"))
            .xml_wrappers(&["Buckets"]),
        OperationDescriptor::new(S3, "ListObjects")
            .http(HttpBinding::new("GET", "/{Bucket}").query(&[
                ("Prefix", "prefix"),
                ("Delimiter", "delimiter"),
                ("Marker", "marker"),
                ("MaxKeys", "max-keys"),
                ("EncodingType", "encoding-type"),
            ]))
            .xml_lists(&["Contents", "CommonPrefixes"])
            .xml_booleans(&["IsTruncated"])
            .xml_numbers(S3_LIST_OBJECTS_NUMBERS),
        OperationDescriptor::new(S3, "ListObjectsV2")
            .http(HttpBinding::new("GET", "/{Bucket}?list-type=2").query(&[
                ("Prefix", "prefix"),
                ("Delimiter", "delimiter"),
                ("MaxKeys", "max-keys"),
                ("ContinuationToken", "continuation-token"),
                ("StartAfter", "start-after"),
                ("FetchOwner", "fetch-owner"),
            ]))
            .xml_lists(&["Contents", "CommonPrefixes"])
            .xml_booleans(&["IsTruncated"])
            .xml_numbers(S3_LIST_OBJECTS_NUMBERS),
        OperationDescriptor::new(S3, "GetObject")
            .http(
                HttpBinding::new("GET", "/{Bucket}/{Key+}")
                    .query(&[("VersionId", "versionId")])
                    .headers(&[("Range", "range"), ("IfMatch", "if-match")])
                    .output_headers(&[
                        ("content-type", "ContentType"),
                        ("content-length", "ContentLength"),
                        ("etag", "ETag"),
                        ("last-modified", "LastModified"),
                        ("x-amz-version-id", "VersionId"),
                    ]),
            )
            .streaming("Body"),
        OperationDescriptor::new(S3, "PutObject").http(
            HttpBinding::new("PUT", "/{Bucket}/{Key+}")
                .headers(&[
                    ("ContentType", "content-type"),
                    ("CacheControl", "cache-control"),
                    ("StorageClass", "x-amz-storage-class"),
                ])
                .payload(Payload::Blob("Body"))
                .output_headers(&[("etag", "ETag"), ("x-amz-version-id", "VersionId")]),
        ),
        OperationDescriptor::new(S3, "DeleteObject").http(
            HttpBinding::new("DELETE", "/{Bucket}/{Key+}")
                .query(&[("VersionId", "versionId")])
                .output_headers(&[
                    ("x-amz-delete-marker", "DeleteMarker"),
                    ("x-amz-version-id", "VersionId"),
                ]),
        ),
        // KMS
        OperationDescriptor::new(Kms, "ListKeys"),
        OperationDescriptor::new(Kms, "DescribeKey").required(&["KeyId"]),
        OperationDescriptor::new(Kms, "Encrypt").required(&["KeyId", "Plaintext"]),
        OperationDescriptor::new(Kms, "Decrypt").required(&["CiphertextBlob"]),
        // STS / IAM
        OperationDescriptor::new(Sts, "GetCallerIdentity"),
        OperationDescriptor::new(Iam, "ListRoles")
            .xml_wrappers(&["Roles", "Tags"])
            .xml_booleans(&["IsTruncated"])
            .xml_numbers(&["MaxSessionDuration"]),
        // Lambda
        OperationDescriptor::new(Lambda, "ListFunctions").http(
            HttpBinding::new("GET", "/2015-03-31/functions/")
                .query(&[("Marker", "Marker"), ("MaxItems", "MaxItems")]),
        ),
        OperationDescriptor::new(Lambda, "Invoke")
            .http(
                HttpBinding::new("POST", "/2015-03-31/functions/{FunctionName}/invocations")
                    .query(&[("Qualifier", "Qualifier")])
                    .headers(&[
                        ("InvocationType", "x-amz-invocation-type"),
                        ("LogType", "x-amz-log-type"),
                    ])
                    .payload(Payload::Blob("Payload"))
                    .output_headers(&[
                        ("x-amz-function-error", "FunctionError"),
                        ("x-amz-log-result", "LogResult"),
                        ("x-amz-executed-version", "ExecutedVersion"),
                    ]),
            )
            .streaming("Payload"),
        // Messaging
        OperationDescriptor::new(Sns, "Publish")
            .required(&["Message"])
            .query_maps(SNS_MESSAGE_ATTRIBUTES),
        OperationDescriptor::new(Sqs, "SendMessage")
            .required(&["QueueUrl", "MessageBody"])
            .query_maps(SQS_MESSAGE_ATTRIBUTES),
        // Parameters and secrets
        OperationDescriptor::new(Ssm, "GetParameter").required(&["Name"]),
        OperationDescriptor::new(SecretsManager, "GetSecretValue").required(&["SecretId"]),
        // DynamoDB
        OperationDescriptor::new(DynamoDb, "GetItem").required(&["TableName", "Key"]),
        OperationDescriptor::new(DynamoDb, "PutItem").required(&["TableName", "Item"]),
        // Containers, databases, monitoring, DNS
        OperationDescriptor::new(Ecs, "ListClusters"),
        OperationDescriptor::new(Rds, "DescribeDBInstances")
            .xml_wrappers(&["DBInstances", "VpcSecurityGroups", "DBParameterGroups", "TagList"])
            .xml_booleans(&["MultiAZ", "PubliclyAccessible", "StorageEncrypted", "DeletionProtection"])
            .xml_numbers(&["AllocatedStorage", "Port", "BackupRetentionPeriod", "Iops"]),
        OperationDescriptor::new(CloudWatch, "ListMetrics").xml_wrappers(&["Metrics", "Dimensions"]),
        OperationDescriptor::new(Logs, "DescribeLogGroups"),
        OperationDescriptor::new(Route53, "ListHostedZones")
            .http(
                HttpBinding::new("GET", "/2013-04-01/hostedzone")
                    .query(&[("Marker", "marker"), ("MaxItems", "maxitems")]),
            )
            .xml_wrappers(&["HostedZones"])
            .xml_booleans(&["IsTruncated", "PrivateZone"])
            .xml_numbers(&["MaxItems", "ResourceRecordSetCount"]),
    ]
}
