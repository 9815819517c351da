//! Request serialization and response decoding per wire protocol.
//!
//! Parameters arrive as a JSON object whose keys are the operation's wire
//! member names (`StackName`, `Bucket`, `Filters`); nothing here validates
//! field values, AWS does that.

use crate::error::{AwsError, AwsResult, BlockError, BlockResult};
use crate::operation::{OperationDescriptor, Payload, QueryMap};
use crate::publish::{OperationOutput, StreamingOutput};
use crate::service::Protocol;
use crate::signing::{encode_path, uri_encode};
use crate::transport::HttpResponse;
use crate::xml;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

// ── Query / EC2 ─────────────────────────────────────────────────────────

/// Flatten JSON parameters into Query-protocol form fields.
///
/// Nested objects join with `.` (`Tags.Key`). Lists become
/// `Name.member.N` for the Query protocol and `Name.N` for EC2, 1-based.
/// `null` members are omitted. An empty Query list is sent as `Name=`.
/// Members named in `maps` are sent as numbered key/value entries.
pub fn flatten_query(
    params: &Map<String, Value>,
    ec2: bool,
    maps: &[QueryMap],
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in params {
        match (maps.iter().find(|m| m.member == key.as_str()), value) {
            (Some(map), Value::Object(entries)) => {
                for (i, (name, v)) in entries.iter().enumerate() {
                    let entry = format!("{}.{}", map.prefix, i + 1);
                    out.insert(format!("{}.{}", entry, map.key), name.clone());
                    flatten_into(&mut out, &format!("{}.{}", entry, map.value), v, ec2);
                }
            }
            _ => flatten_into(&mut out, key, value, ec2),
        }
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &Value, ec2: bool) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, v) in map {
                flatten_into(out, &format!("{}.{}", prefix, key), v, ec2);
            }
        }
        Value::Array(items) if items.is_empty() => {
            if !ec2 {
                out.insert(prefix.to_string(), String::new());
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let key = if ec2 {
                    format!("{}.{}", prefix, i + 1)
                } else {
                    format!("{}.member.{}", prefix, i + 1)
                };
                flatten_into(out, &key, item, ec2);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar_text(scalar));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── REST ────────────────────────────────────────────────────────────────

/// A REST request ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    pub method: String,
    /// Encoded path plus query string.
    pub path_and_query: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Bind parameters onto a REST-XML / REST-JSON operation's HTTP request.
///
/// Path labels are substituted (greedy `{Label+}` keeps `/`), query and
/// header members are bound by name, and the payload member becomes the
/// body. Remaining members form the JSON body for REST-JSON; for REST-XML
/// they are ignored with a warning.
pub fn build_rest_request(
    descriptor: &OperationDescriptor,
    params: &Map<String, Value>,
) -> BlockResult<RestRequest> {
    let binding = descriptor.http.as_ref().ok_or_else(|| {
        BlockError::config("operation", format!("{} has no HTTP binding", descriptor.id()))
    })?;
    let mut used: HashSet<&str> = HashSet::new();

    let (template, static_query) = match binding.uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (binding.uri, None),
    };

    // Path
    let mut path = String::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        path.push_str(&rest[..start]);
        let end = rest[start..].find('}').map(|e| start + e).ok_or_else(|| {
            BlockError::config("operation", format!("malformed URI template {}", binding.uri))
        })?;
        let label = &rest[start + 1..end];
        let (name, greedy) = match label.strip_suffix('+') {
            Some(name) => (name, true),
            None => (label, false),
        };
        let value = match params.get(name) {
            Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => scalar_text(v),
            _ => String::new(),
        };
        if value.is_empty() {
            return Err(BlockError::config(
                format!("operationParameters.{}", name),
                format!("path parameter required by {}", descriptor.id()),
            ));
        }
        path.push_str(&if greedy { encode_path(&value) } else { uri_encode(&value) });
        used.insert(name);
        rest = &rest[end + 1..];
    }
    path.push_str(rest);

    // Query
    let mut query: Vec<(String, String)> = Vec::new();
    if let Some(q) = static_query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            query.push((k.to_string(), v.to_string()));
        }
    }
    for (member, name) in binding.query {
        match params.get(*member) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    query.push((name.to_string(), scalar_text(item)));
                }
            }
            Some(v) => query.push((name.to_string(), scalar_text(v))),
        }
        used.insert(*member);
    }

    // Headers
    let mut headers = BTreeMap::new();
    for (member, name) in binding.headers {
        if let Some(v) = params.get(*member).filter(|v| !v.is_null()) {
            headers.insert(name.to_lowercase(), scalar_text(v));
        }
        used.insert(*member);
    }

    // Body
    let protocol = descriptor.service.protocol();
    let mut body = String::new();
    match binding.payload {
        Some(Payload::Blob(member)) => {
            if let Some(v) = params.get(member).filter(|v| !v.is_null()) {
                body = scalar_text(v);
            }
            used.insert(member);
        }
        Some(Payload::Xml(member)) => {
            if let Some(v) = params.get(member).filter(|v| !v.is_null()) {
                body = xml::value_to_xml(member, v, descriptor.service.xml_namespace());
                headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| "application/xml".to_string());
            }
            used.insert(member);
        }
        None => {}
    }

    let unbound: Map<String, Value> = params
        .iter()
        .filter(|(k, _)| !used.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !unbound.is_empty() {
        if protocol == Protocol::RestJson && binding.payload.is_none() {
            body = Value::Object(unbound).to_string();
            headers.insert("content-type".to_string(), "application/json".to_string());
        } else {
            let names: Vec<&String> = unbound.keys().collect();
            log::warn!("{}: ignoring unbound parameters {:?}", descriptor.id(), names);
        }
    }

    let path_and_query = if query.is_empty() {
        path
    } else {
        let qs = query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", path, qs)
    };

    Ok(RestRequest {
        method: binding.method.to_string(),
        path_and_query,
        headers,
        body,
    })
}

// ── Responses ───────────────────────────────────────────────────────────

/// Decode a successful response into an [`OperationOutput`].
///
/// Streaming operations keep their body unread. Everything else is read,
/// decoded by protocol and merged with header-bound output members.
pub async fn decode_response(
    descriptor: &OperationDescriptor,
    response: HttpResponse,
) -> AwsResult<OperationOutput> {
    let metadata = header_members(descriptor, &response.headers);

    if let Some(member) = descriptor.streaming_output {
        return Ok(OperationOutput::StreamBearing(StreamingOutput {
            member: member.to_string(),
            metadata,
            body: response.body,
        }));
    }

    let text = response.body.collect_string().await?;
    let body = if text.trim().is_empty() {
        None
    } else {
        Some(decode_body(descriptor, &text)?)
    };

    Ok(match body {
        None if metadata.is_empty() => OperationOutput::Empty,
        None => OperationOutput::Materialized(Value::Object(metadata)),
        Some(Value::Object(mut map)) => {
            map.extend(metadata);
            OperationOutput::Materialized(Value::Object(map))
        }
        Some(other) if metadata.is_empty() => OperationOutput::Materialized(other),
        Some(other) => {
            let mut map = metadata;
            map.insert("Body".to_string(), other);
            OperationOutput::Materialized(Value::Object(map))
        }
    })
}

fn header_members(descriptor: &OperationDescriptor, headers: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(binding) = &descriptor.http {
        for (header, member) in binding.output_headers {
            if let Some(v) = headers.get(&header.to_lowercase()) {
                out.insert(member.to_string(), Value::String(v.clone()));
            }
        }
    }
    out
}

fn decode_body(descriptor: &OperationDescriptor, text: &str) -> AwsResult<Value> {
    let service = descriptor.service.as_str();
    match descriptor.service.protocol() {
        Protocol::Json10 | Protocol::Json11 | Protocol::RestJson => serde_json::from_str(text)
            .map_err(|e| AwsError::parse(service, &format!("invalid JSON response: {}", e))),
        Protocol::Query => {
            let (_, root) = parse_xml(descriptor, text)?;
            let result_name = format!("{}Result", descriptor.name);
            let mut result = match root {
                Value::Object(mut map) => match map.remove(&result_name) {
                    Some(result) => result,
                    None => Value::Object(map),
                },
                other => other,
            };
            Ok(strip(&mut result, "ResponseMetadata"))
        }
        Protocol::Ec2Query => {
            let (_, mut root) = parse_xml(descriptor, text)?;
            Ok(strip(&mut root, "requestId"))
        }
        Protocol::RestXml => {
            let (name, root) = parse_xml(descriptor, text)?;
            Ok(match root {
                Value::Object(map) => Value::Object(map),
                Value::String(s) if s.trim().is_empty() => Value::Object(Map::new()),
                other => {
                    let mut map = Map::new();
                    map.insert(name, other);
                    Value::Object(map)
                }
            })
        }
    }
}

fn parse_xml(descriptor: &OperationDescriptor, text: &str) -> AwsResult<(String, Value)> {
    xml::xml_to_value(text, &descriptor.xml_shape())
        .map_err(|e| AwsError::parse(descriptor.service.as_str(), &e))
}

/// Drop `key` from an object; a blank leaf (`<FooResult/>`) becomes `{}`.
fn strip(value: &mut Value, key: &str) -> Value {
    match value {
        Value::Object(map) => {
            map.remove(key);
            Value::Object(std::mem::take(map))
        }
        Value::String(s) if s.trim().is_empty() => Value::Object(Map::new()),
        other => other.take(),
    }
}
