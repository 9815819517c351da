use autoblocks_aws::*;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/X";

const ASSUME_ROLE_OK: &str = r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleResult>
    <AssumedRoleUser>
      <Arn>arn:aws:sts::123456789012:assumed-role/X/autoblocks-1</Arn>
      <AssumedRoleId>AROEXAMPLE:autoblocks-1</AssumedRoleId>
    </AssumedRoleUser>
    <Credentials>
      <AccessKeyId>ASIATEMP</AccessKeyId>
      <SecretAccessKey>tempsecret</SecretAccessKey>
      <SessionToken>temptoken</SessionToken>
      <Expiration>2030-01-01T00:00:00Z</Expiration>
    </Credentials>
  </AssumeRoleResult>
  <ResponseMetadata><RequestId>sts-req</RequestId></ResponseMetadata>
</AssumeRoleResponse>"#;

const ASSUME_ROLE_DENIED: &str = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>User is not authorized to perform: sts:AssumeRole</Message>
  </Error>
  <RequestId>denied-req</RequestId>
</ErrorResponse>"#;

const LIST_OBJECTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>my-bucket</Name>
  <Prefix></Prefix>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.txt</Key><Size>3</Size></Contents>
  <Contents><Key>b.txt</Key><Size>5</Size></Contents>
</ListBucketResult>"#;

// ── Test doubles ────────────────────────────────────────────────────────

type Responder = Box<dyn Fn() -> HttpResponse + Send + Sync>;

/// Records every signed request and answers per signing service.
#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<SignedRequest>>,
    responders: HashMap<&'static str, Responder>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self::default()
    }

    fn respond(mut self, service: &'static str, responder: impl Fn() -> HttpResponse + Send + Sync + 'static) -> Self {
        self.responders.insert(service, Box::new(responder));
        self
    }

    fn requests_for(&self, service: &str) -> Vec<SignedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.service == service)
            .cloned()
            .collect()
    }

    fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: SignedRequest) -> AwsResult<HttpResponse> {
        let response = match self.responders.get(request.service.as_str()) {
            Some(responder) => responder(),
            None => HttpResponse::new(200, ByteStream::empty()),
        };
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

#[derive(Default)]
struct VecSink(Mutex<Vec<Value>>);

impl VecSink {
    fn events(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for VecSink {
    fn emit(&self, payload: Value) {
        self.0.lock().unwrap().push(payload);
    }
}

fn ok(body: &'static str) -> impl Fn() -> HttpResponse + Send + Sync + 'static {
    move || HttpResponse::new(200, ByteStream::from_bytes(body))
}

fn runner(transport: &Arc<RecordingTransport>) -> BlockRunner {
    BlockRunner::with_transport(ClientSettings::default(), transport.clone())
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn form_field(request: &SignedRequest, name: &str) -> Option<String> {
    let body = request.body.clone().unwrap_or_default();
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn base() -> Credentials {
    Credentials::new("A", "S")
}

// ── Credential resolution ───────────────────────────────────────────────

#[tokio::test]
async fn test_no_role_uses_base_credentials_without_sts() {
    let transport = Arc::new(RecordingTransport::new().respond("s3", ok(LIST_OBJECTS)));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({"Bucket": "my-bucket"})));

    runner(&transport)
        .run("s3:ListObjects", &config, &base(), &sink)
        .await
        .unwrap();

    assert!(transport.requests_for("sts").is_empty());
    let s3 = transport.requests_for("s3");
    assert_eq!(s3.len(), 1);
    assert_eq!(s3[0].access_key_id(), Some("A"));
    assert!(!s3[0].headers.contains_key("x-amz-security-token"));
}

#[tokio::test]
async fn test_blank_role_is_treated_as_absent() {
    let transport = Arc::new(RecordingTransport::new());
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_assume_role_arn("  ");

    runner(&transport)
        .run("sts:GetCallerIdentity", &config, &base(), &sink)
        .await
        .unwrap();

    let sts = transport.requests_for("sts");
    assert_eq!(sts.len(), 1);
    assert_eq!(form_field(&sts[0], "Action").as_deref(), Some("GetCallerIdentity"));
    assert_eq!(sink.events(), vec![json!({})]);
}

#[tokio::test]
async fn test_role_is_assumed_once_and_target_uses_temporary_credentials() {
    let transport = Arc::new(
        RecordingTransport::new()
            .respond("sts", ok(ASSUME_ROLE_OK))
            .respond("s3", ok(LIST_OBJECTS)),
    );
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1")
        .with_assume_role_arn(ROLE_ARN)
        .with_parameters(params(json!({"Bucket": "my-bucket"})));

    runner(&transport)
        .run("s3:ListObjects", &config, &base(), &sink)
        .await
        .unwrap();

    let sts = transport.requests_for("sts");
    assert_eq!(sts.len(), 1);
    assert_eq!(sts[0].access_key_id(), Some("A"));
    assert_eq!(form_field(&sts[0], "Action").as_deref(), Some("AssumeRole"));
    assert_eq!(form_field(&sts[0], "RoleArn").as_deref(), Some(ROLE_ARN));
    let session = form_field(&sts[0], "RoleSessionName").unwrap();
    assert!(session.starts_with("autoblocks-"), "{}", session);

    let s3 = transport.requests_for("s3");
    assert_eq!(s3.len(), 1);
    assert_eq!(s3[0].access_key_id(), Some("ASIATEMP"));
    assert_eq!(s3[0].headers["x-amz-security-token"], "temptoken");
}

#[tokio::test]
async fn test_sts_rejection_stops_before_target_call() {
    let transport = Arc::new(
        RecordingTransport::new()
            .respond("sts", || HttpResponse::new(403, ByteStream::from_bytes(ASSUME_ROLE_DENIED)))
            .respond("s3", ok(LIST_OBJECTS)),
    );
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1")
        .with_assume_role_arn(ROLE_ARN)
        .with_parameters(params(json!({"Bucket": "my-bucket"})));

    let err = runner(&transport)
        .run("s3:ListObjects", &config, &base(), &sink)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Credential);
    assert!(err.to_string().contains(ROLE_ARN));
    assert_eq!(err.aws_error().unwrap().code, "AccessDenied");
    assert!(transport.requests_for("s3").is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_keep_their_own_identity() {
    let transport = Arc::new(RecordingTransport::new().respond("s3", ok(LIST_OBJECTS)));
    let runner = runner(&transport);
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({"Bucket": "my-bucket"})));
    let (sink_a, sink_b) = (VecSink::default(), VecSink::default());
    let (cred_a, cred_b) = (Credentials::new("KEY_A", "S1"), Credentials::new("KEY_B", "S2"));

    let (a, b) = tokio::join!(
        runner.run("s3:ListObjects", &config, &cred_a, &sink_a),
        runner.run("s3:ListObjects", &config, &cred_b, &sink_b),
    );
    a.unwrap();
    b.unwrap();

    let mut keys: Vec<String> = transport
        .requests_for("s3")
        .iter()
        .filter_map(|r| r.access_key_id().map(str::to_string))
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["KEY_A".to_string(), "KEY_B".to_string()]);
    assert_eq!(sink_a.events().len(), 1);
    assert_eq!(sink_b.events().len(), 1);
}

// ── Endpoints and regions ───────────────────────────────────────────────

#[tokio::test]
async fn test_endpoint_override_applies_to_sts_and_target() {
    let transport = Arc::new(
        RecordingTransport::new()
            .respond("sts", ok(ASSUME_ROLE_OK))
            .respond("kms", ok(r#"{"Keys":[{"KeyId":"k1"}]}"#)),
    );
    let sink = VecSink::default();
    let config = InvocationConfig::new("eu-west-1")
        .with_assume_role_arn(ROLE_ARN)
        .with_endpoint_override("http://localhost:4566");

    runner(&transport)
        .run("kms:ListKeys", &config, &base(), &sink)
        .await
        .unwrap();

    let sts = transport.requests_for("sts");
    let kms = transport.requests_for("kms");
    assert_eq!(sts.len(), 1);
    assert_eq!(kms.len(), 1);
    assert!(sts[0].url.starts_with("http://localhost:4566"));
    assert!(kms[0].url.starts_with("http://localhost:4566"));
    assert_eq!(kms[0].headers["host"], "localhost:4566");
    assert_eq!(sink.events(), vec![json!({"Keys": [{"KeyId": "k1"}]})]);
}

#[tokio::test]
async fn test_delegation_in_eu_west_1_binds_sts_and_target_to_region() {
    let transport = Arc::new(
        RecordingTransport::new()
            .respond("sts", ok(ASSUME_ROLE_OK))
            .respond("cloudformation", ok("<DescribeStacksResponse><DescribeStacksResult><Stacks/></DescribeStacksResult></DescribeStacksResponse>")),
    );
    let sink = VecSink::default();
    let config = InvocationConfig::new("eu-west-1").with_assume_role_arn(ROLE_ARN);

    runner(&transport)
        .run("cloudformation:DescribeStacks", &config, &base(), &sink)
        .await
        .unwrap();

    let sts = transport.requests_for("sts");
    assert_eq!(sts.len(), 1);
    assert_eq!(sts[0].url, "https://sts.eu-west-1.amazonaws.com/");
    assert!(sts[0].headers["authorization"].contains("/eu-west-1/sts/aws4_request"));

    let cfn = transport.requests_for("cloudformation");
    assert_eq!(cfn.len(), 1);
    assert_eq!(cfn[0].url, "https://cloudformation.eu-west-1.amazonaws.com/");
    assert!(cfn[0].headers["authorization"].contains("Credential=ASIATEMP/"));
    assert!(cfn[0].headers["authorization"].contains("/eu-west-1/cloudformation/aws4_request"));
    assert_eq!(sink.events(), vec![json!({"Stacks": []})]);
}

// ── Invocation and publishing ───────────────────────────────────────────

#[tokio::test]
async fn test_list_objects_scenario() {
    let transport = Arc::new(RecordingTransport::new().respond("s3", ok(LIST_OBJECTS)));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({"Bucket": "my-bucket"})));

    runner(&transport)
        .run("s3:ListObjects", &config, &base(), &sink)
        .await
        .unwrap();

    assert_eq!(transport.total(), 1);
    let s3 = transport.requests_for("s3");
    assert_eq!(s3[0].method, "GET");
    assert_eq!(s3[0].url, "https://s3.us-east-1.amazonaws.com/my-bucket");
    assert_eq!(
        sink.events(),
        vec![json!({
            "Name": "my-bucket",
            "Prefix": "",
            "IsTruncated": false,
            "Contents": [
                {"Key": "a.txt", "Size": 3},
                {"Key": "b.txt", "Size": 5}
            ]
        })]
    );
}

#[tokio::test]
async fn test_service_failure_is_single_call_and_no_emit() {
    let transport = Arc::new(RecordingTransport::new().respond("cloudformation", || {
        HttpResponse::new(
            503,
            ByteStream::from_bytes(
                "<ErrorResponse><Error><Code>Throttling</Code><Message>Rate exceeded</Message></Error></ErrorResponse>",
            ),
        )
    }));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({
        "StackName": "web",
        "TemplateURL": "https://example.com/t.yaml"
    })));

    let err = runner(&transport)
        .run("cloudformation:UpdateStack", &config, &base(), &sink)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Operation);
    let aws = err.aws_error().unwrap();
    assert_eq!(aws.code, "Throttling");
    assert!(aws.retryable);
    assert_eq!(transport.total(), 1);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_sns_publish_sends_message_attributes_as_entries() {
    let transport = Arc::new(RecordingTransport::new().respond(
        "sns",
        ok("<PublishResponse><PublishResult><MessageId>m-1</MessageId></PublishResult><ResponseMetadata><RequestId>r</RequestId></ResponseMetadata></PublishResponse>"),
    ));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({
        "TopicArn": "arn:aws:sns:us-east-1:123456789012:alerts",
        "Message": "hello",
        "MessageAttributes": {"color": {"DataType": "String", "StringValue": "red"}}
    })));

    runner(&transport)
        .run("sns:Publish", &config, &base(), &sink)
        .await
        .unwrap();

    let sns = transport.requests_for("sns");
    assert_eq!(sns.len(), 1);
    assert_eq!(form_field(&sns[0], "Action").as_deref(), Some("Publish"));
    assert_eq!(form_field(&sns[0], "MessageAttributes.entry.1.Name").as_deref(), Some("color"));
    assert_eq!(
        form_field(&sns[0], "MessageAttributes.entry.1.Value.StringValue").as_deref(),
        Some("red")
    );
    assert!(form_field(&sns[0], "MessageAttributes.color.DataType").is_none());
    assert_eq!(sink.events(), vec![json!({"MessageId": "m-1"})]);
}

#[tokio::test]
async fn test_empty_result_emits_empty_object() {
    let transport = Arc::new(RecordingTransport::new().respond("dynamodb", || {
        HttpResponse::new(200, ByteStream::from_bytes("{}"))
    }));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1").with_parameters(params(json!({
        "TableName": "t",
        "Item": {"pk": {"S": "1"}}
    })));

    runner(&transport)
        .run("dynamodb:PutItem", &config, &base(), &sink)
        .await
        .unwrap();

    let ddb = transport.requests_for("dynamodb");
    assert_eq!(ddb[0].headers["x-amz-target"], "DynamoDB_20120810.PutItem");
    assert_eq!(sink.events(), vec![json!({})]);
}

#[tokio::test]
async fn test_get_object_body_is_materialized() {
    let transport = Arc::new(RecordingTransport::new().respond("s3", || {
        HttpResponse::new(
            200,
            ByteStream::from_chunks(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))]),
        )
        .with_header("content-type", "text/plain")
        .with_header("etag", "\"abc\"")
    }));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1")
        .with_parameters(params(json!({"Bucket": "my-bucket", "Key": "docs/readme.txt"})));

    runner(&transport)
        .run("s3:GetObject", &config, &base(), &sink)
        .await
        .unwrap();

    assert_eq!(
        transport.requests_for("s3")[0].url,
        "https://s3.us-east-1.amazonaws.com/my-bucket/docs/readme.txt"
    );
    assert_eq!(
        sink.events(),
        vec![json!({"ContentType": "text/plain", "ETag": "\"abc\"", "Body": "hello world"})]
    );
}

#[tokio::test]
async fn test_broken_stream_is_serialization_error_without_emit() {
    let transport = Arc::new(RecordingTransport::new().respond("s3", || {
        HttpResponse::new(
            200,
            ByteStream::from_chunks(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(AwsError::transport("s3", "connection reset by peer", false)),
            ]),
        )
    }));
    let sink = VecSink::default();
    let config = InvocationConfig::new("us-east-1")
        .with_parameters(params(json!({"Bucket": "my-bucket", "Key": "big.bin"})));

    let err = runner(&transport)
        .run("s3:GetObject", &config, &base(), &sink)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Serialization);
    match &err {
        BlockError::Serialization { service, operation, .. } => {
            assert_eq!(service, "s3");
            assert_eq!(operation, "GetObject");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(transport.total(), 1);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_invalid_configuration_makes_no_calls() {
    let transport = Arc::new(RecordingTransport::new());
    let sink = VecSink::default();

    let missing_label = InvocationConfig::new("us-east-1")
        .with_assume_role_arn(ROLE_ARN)
        .with_parameters(params(json!({"Bucket": "b"})));
    let err = runner(&transport)
        .run("s3:GetObject", &missing_label, &base(), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Config);

    let bad_region = InvocationConfig::new("moon-1");
    let err = runner(&transport)
        .run("s3:ListBuckets", &bad_region, &base(), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Config);

    assert_eq!(transport.total(), 0);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_config_from_json_input() {
    let transport = Arc::new(RecordingTransport::new().respond("ssm", ok(r#"{"Parameter":{"Name":"/app/db","Value":"secret"}}"#)));
    let (sink, mut rx) = ChannelSink::channel();
    let config = InvocationConfig::from_value(json!({
        "region": "ap-southeast-2",
        "assumeRoleArn": "",
        "operationParameters": {"Name": "/app/db", "WithDecryption": true}
    }))
    .unwrap();

    runner(&transport)
        .run("ssm:GetParameter", &config, &base(), &sink)
        .await
        .unwrap();

    assert_eq!(
        rx.recv().await,
        Some(json!({"Parameter": {"Name": "/app/db", "Value": "secret"}}))
    );
    let ssm = transport.requests_for("ssm");
    assert_eq!(ssm[0].url, "https://ssm.ap-southeast-2.amazonaws.com/");
}
