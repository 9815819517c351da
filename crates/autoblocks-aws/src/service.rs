//! Service identifiers, wire protocols and default endpoint resolution.
//!
//! | Protocol    | Services                                                  |
//! |-------------|-----------------------------------------------------------|
//! | Query + XML | STS, IAM, CloudFormation, SNS, SQS, RDS, CloudWatch       |
//! | EC2 query   | EC2                                                       |
//! | JSON 1.0    | DynamoDB                                                  |
//! | JSON 1.1    | KMS, SSM, Secrets Manager, ECS, CloudWatch Logs           |
//! | REST + XML  | S3, CloudFront, Route 53                                  |
//! | REST + JSON | Lambda                                                    |

use crate::config::Region;
use crate::error::BlockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How requests to a service are serialized and responses decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Form-encoded `Action`/`Version` request, XML response.
    Query,
    /// Query variant with `Name.N` list flattening and no result wrapper.
    Ec2Query,
    /// `application/x-amz-json-1.0` with `X-Amz-Target`.
    Json10,
    /// `application/x-amz-json-1.1` with `X-Amz-Target`.
    Json11,
    /// HTTP-bound operations with XML payloads.
    RestXml,
    /// HTTP-bound operations with JSON payloads.
    RestJson,
}

/// An AWS service that blocks can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    S3,
    Ec2,
    Sts,
    Iam,
    Kms,
    CloudFormation,
    CloudFront,
    Lambda,
    Sns,
    Sqs,
    Ssm,
    SecretsManager,
    DynamoDb,
    Ecs,
    Rds,
    CloudWatch,
    Logs,
    Route53,
}

impl ServiceId {
    pub const ALL: &'static [ServiceId] = &[
        ServiceId::S3,
        ServiceId::Ec2,
        ServiceId::Sts,
        ServiceId::Iam,
        ServiceId::Kms,
        ServiceId::CloudFormation,
        ServiceId::CloudFront,
        ServiceId::Lambda,
        ServiceId::Sns,
        ServiceId::Sqs,
        ServiceId::Ssm,
        ServiceId::SecretsManager,
        ServiceId::DynamoDb,
        ServiceId::Ecs,
        ServiceId::Rds,
        ServiceId::CloudWatch,
        ServiceId::Logs,
        ServiceId::Route53,
    ];

    /// The identifier used in operation ids and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceId::S3 => "s3",
            ServiceId::Ec2 => "ec2",
            ServiceId::Sts => "sts",
            ServiceId::Iam => "iam",
            ServiceId::Kms => "kms",
            ServiceId::CloudFormation => "cloudformation",
            ServiceId::CloudFront => "cloudfront",
            ServiceId::Lambda => "lambda",
            ServiceId::Sns => "sns",
            ServiceId::Sqs => "sqs",
            ServiceId::Ssm => "ssm",
            ServiceId::SecretsManager => "secretsmanager",
            ServiceId::DynamoDb => "dynamodb",
            ServiceId::Ecs => "ecs",
            ServiceId::Rds => "rds",
            ServiceId::CloudWatch => "cloudwatch",
            ServiceId::Logs => "logs",
            ServiceId::Route53 => "route53",
        }
    }

    /// The SigV4 signing name.
    pub fn signing_name(self) -> &'static str {
        match self {
            ServiceId::CloudWatch => "monitoring",
            other => other.as_str(),
        }
    }

    /// First DNS label of the regional endpoint.
    pub fn endpoint_prefix(self) -> &'static str {
        match self {
            ServiceId::CloudWatch => "monitoring",
            other => other.as_str(),
        }
    }

    pub fn protocol(self) -> Protocol {
        match self {
            ServiceId::Ec2 => Protocol::Ec2Query,
            ServiceId::Sts
            | ServiceId::Iam
            | ServiceId::CloudFormation
            | ServiceId::Sns
            | ServiceId::Sqs
            | ServiceId::Rds
            | ServiceId::CloudWatch => Protocol::Query,
            ServiceId::DynamoDb => Protocol::Json10,
            ServiceId::Kms
            | ServiceId::Ssm
            | ServiceId::SecretsManager
            | ServiceId::Ecs
            | ServiceId::Logs => Protocol::Json11,
            ServiceId::S3 | ServiceId::CloudFront | ServiceId::Route53 => Protocol::RestXml,
            ServiceId::Lambda => Protocol::RestJson,
        }
    }

    /// API version sent with query-protocol requests.
    pub fn api_version(self) -> &'static str {
        match self {
            ServiceId::S3 => "2006-03-01",
            ServiceId::Ec2 => "2016-11-15",
            ServiceId::Sts => "2011-06-15",
            ServiceId::Iam => "2010-05-08",
            ServiceId::Kms => "2014-11-01",
            ServiceId::CloudFormation => "2010-05-15",
            ServiceId::CloudFront => "2020-05-31",
            ServiceId::Lambda => "2015-03-31",
            ServiceId::Sns => "2010-03-31",
            ServiceId::Sqs => "2012-11-05",
            ServiceId::Ssm => "2014-11-06",
            ServiceId::SecretsManager => "2017-10-17",
            ServiceId::DynamoDb => "2012-08-10",
            ServiceId::Ecs => "2014-11-13",
            ServiceId::Rds => "2014-10-31",
            ServiceId::CloudWatch => "2010-08-01",
            ServiceId::Logs => "2014-03-28",
            ServiceId::Route53 => "2013-04-01",
        }
    }

    /// `X-Amz-Target` prefix for JSON-protocol services.
    pub fn target_prefix(self) -> Option<&'static str> {
        match self {
            ServiceId::Kms => Some("TrentService"),
            ServiceId::Ssm => Some("AmazonSSM"),
            ServiceId::SecretsManager => Some("secretsmanager"),
            ServiceId::DynamoDb => Some("DynamoDB_20120810"),
            ServiceId::Ecs => Some("AmazonEC2ContainerServiceV20141113"),
            ServiceId::Logs => Some("Logs_20140328"),
            _ => None,
        }
    }

    /// XML namespace of REST-XML request payloads.
    pub fn xml_namespace(self) -> Option<&'static str> {
        match self {
            ServiceId::S3 => Some("http://s3.amazonaws.com/doc/2006-03-01/"),
            ServiceId::CloudFront => Some("http://cloudfront.amazonaws.com/doc/2020-05-31/"),
            ServiceId::Route53 => Some("https://route53.amazonaws.com/doc/2013-04-01/"),
            _ => None,
        }
    }

    /// The signing region. Global services sign with their home region.
    pub fn signing_region(self, region: &Region) -> String {
        match self {
            ServiceId::Iam | ServiceId::Route53 | ServiceId::CloudFront => match region.partition() {
                "aws-cn" => "cn-north-1".to_string(),
                "aws-us-gov" => "us-gov-west-1".to_string(),
                _ => "us-east-1".to_string(),
            },
            _ => region.as_str().to_string(),
        }
    }

    /// The standard endpoint of this service in `region`.
    /// Follows `https://{prefix}.{region}.{dns suffix}` except for the
    /// global services.
    pub fn default_endpoint(self, region: &Region) -> String {
        let suffix = region.dns_suffix();
        match self {
            ServiceId::Iam if region.partition() == "aws" => "https://iam.amazonaws.com".to_string(),
            ServiceId::Route53 if region.partition() == "aws" => {
                "https://route53.amazonaws.com".to_string()
            }
            ServiceId::CloudFront if region.partition() == "aws" => {
                "https://cloudfront.amazonaws.com".to_string()
            }
            ServiceId::Sts if region.as_str() == "us-east-1" => "https://sts.amazonaws.com".to_string(),
            _ => format!("https://{}.{}.{}", self.endpoint_prefix(), region, suffix),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = BlockError;

    /// Unknown identifiers fail instead of defaulting to another service.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let alias = match wanted.as_str() {
            "monitoring" => "cloudwatch",
            "cloudwatchlogs" | "cloudwatch-logs" => "logs",
            "secrets-manager" => "secretsmanager",
            other => other,
        };
        ServiceId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == alias)
            .ok_or_else(|| BlockError::config("service", format!("unsupported service '{}'", s)))
    }
}
