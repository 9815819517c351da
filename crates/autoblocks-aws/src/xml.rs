//! XML ⇄ JSON value conversion for the XML-speaking protocols.
//!
//! Decoding rules:
//! - an element with child elements becomes an object keyed by child name;
//! - a repeated child name becomes an array;
//! - an element whose children are all `<member>` (query) or all `<item>`
//!   (EC2) becomes an array of those children;
//! - a leaf element becomes a string, unless the [`XmlShape`] types it as a
//!   list, boolean or number;
//! - attributes and namespace prefixes are dropped.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

/// Typing hints for element names, taken from an operation's output shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmlShape<'a> {
    /// Flattened lists: repeated sibling elements such as S3's `<Contents>`
    /// that decode to an array even when only one is present.
    pub lists: &'a [&'a str],
    /// List wrappers such as `<Stacks>` or `<Buckets>`: their children are
    /// the items, whatever the item element is called. An empty wrapper
    /// decodes to `[]`.
    pub wrappers: &'a [&'a str],
    /// Leaves holding `true` / `false`.
    pub booleans: &'a [&'a str],
    /// Leaves holding integers or decimals.
    pub numbers: &'a [&'a str],
}

impl<'a> XmlShape<'a> {
    pub fn lists(lists: &'a [&'a str]) -> Self {
        Self {
            lists,
            ..Self::default()
        }
    }

    pub fn wrappers(wrappers: &'a [&'a str]) -> Self {
        Self {
            wrappers,
            ..Self::default()
        }
    }

    fn is_list(&self, name: &str) -> bool {
        self.lists.contains(&name)
    }

    fn is_wrapper(&self, name: &str) -> bool {
        self.wrappers.contains(&name)
    }

    fn leaf(&self, name: &str, text: String) -> Value {
        if self.is_wrapper(name) && text.trim().is_empty() {
            return Value::Array(Vec::new());
        }
        if self.booleans.contains(&name) {
            match text.trim() {
                "true" => return Value::Bool(true),
                "false" => return Value::Bool(false),
                _ => {}
            }
        }
        if self.numbers.contains(&name) {
            let trimmed = text.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Value::Number(n.into());
            }
            if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
        Value::String(text)
    }
}

struct Frame {
    name: String,
    children: Vec<(String, Value)>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn finish(self, shape: &XmlShape<'_>) -> (String, Value) {
        if self.children.is_empty() {
            let value = shape.leaf(&self.name, self.text);
            return (self.name, value);
        }
        // Text between child elements is layout, not data.
        let wrapper = &self.children[0].0;
        let unwrap = shape.is_wrapper(&self.name) || wrapper == "member" || wrapper == "item";
        if unwrap && self.children.iter().all(|(n, _)| n == wrapper) {
            let items = self.children.into_iter().map(|(_, v)| v).collect();
            return (self.name, Value::Array(items));
        }

        // Group by name, keeping first-seen order.
        let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
        for (name, value) in self.children {
            match grouped.iter_mut().find(|(n, _)| *n == name) {
                Some((_, values)) => values.push(value),
                None => grouped.push((name, vec![value])),
            }
        }

        let mut obj = Map::new();
        for (name, mut values) in grouped {
            let value = if values.len() > 1 || shape.is_list(&name) {
                Value::Array(values)
            } else {
                values.remove(0)
            };
            obj.insert(name, value);
        }
        (self.name, Value::Object(obj))
    }
}

/// Parse an XML document into `(root element name, value)`.
///
/// Leaf text is kept verbatim, including leading and trailing whitespace.
pub fn xml_to_value(xml: &str, shape: &XmlShape<'_>) -> Result<(String, Value), String> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Frame::new(name));
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let done = Frame::new(name).finish(shape);
                attach(&mut stack, &mut root, done);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                let done = frame.finish(shape);
                attach(&mut stack, &mut root, done);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of XML document".to_string());
    }
    root.ok_or_else(|| "XML document has no root element".to_string())
}

fn attach(stack: &mut [Frame], root: &mut Option<(String, Value)>, done: (String, Value)) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(done),
        None => *root = Some(done),
    }
}

/// Serialize a JSON value as an XML element named `name`.
///
/// Objects become child elements, arrays repeat the element (flattened
/// list), scalars become text and `null` an empty element. `namespace`
/// is written as `xmlns` on the outermost element only.
pub fn value_to_xml(name: &str, value: &Value, namespace: Option<&str>) -> String {
    let mut out = String::new();
    write_element(&mut out, name, value, namespace);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value, namespace: Option<&str>) {
    let open = match namespace {
        Some(ns) => format!("<{} xmlns=\"{}\">", name, quick_xml::escape::escape(ns)),
        None => format!("<{}>", name),
    };
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item, namespace);
            }
        }
        Value::Object(map) => {
            out.push_str(&open);
            for (child, v) in map {
                write_element(out, child, v, None);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::Null => out.push_str(&format!("<{}/>", name)),
        Value::String(s) => {
            out.push_str(&open);
            out.push_str(&quick_xml::escape::escape(s.as_str()));
            out.push_str(&format!("</{}>", name));
        }
        other => {
            out.push_str(&open);
            out.push_str(&other.to_string());
            out.push_str(&format!("</{}>", name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_elements_and_text() {
        let (root, v) = xml_to_value(
            "<?xml version=\"1.0\"?>\n<Root xmlns=\"x\">\n  <A>1</A>\n  <B><C>two &amp; three</C></B>\n</Root>",
            &XmlShape::default(),
        )
        .unwrap();
        assert_eq!(root, "Root");
        assert_eq!(v, json!({"A": "1", "B": {"C": "two & three"}}));
    }

    #[test]
    fn member_and_item_wrappers_become_arrays() {
        let (_, v) = xml_to_value(
            "<R><Stacks><member><StackName>a</StackName></member></Stacks><groupSet><item>x</item><item>y</item></groupSet></R>",
            &XmlShape::default(),
        )
        .unwrap();
        assert_eq!(v, json!({"Stacks": [{"StackName": "a"}], "groupSet": ["x", "y"]}));
    }

    #[test]
    fn repeated_elements_collapse_into_array() {
        let (_, v) = xml_to_value("<R><Contents>a</Contents><Contents>b</Contents><Contents>c</Contents></R>", &XmlShape::default())
            .unwrap();
        assert_eq!(v, json!({"Contents": ["a", "b", "c"]}));
    }

    #[test]
    fn forced_lists_with_single_entry() {
        let (_, v) = xml_to_value(
            "<ListBucketResult><Name>b</Name><Contents><Key>k</Key></Contents></ListBucketResult>",
            &XmlShape::lists(&["Contents"]),
        )
        .unwrap();
        assert_eq!(v, json!({"Name": "b", "Contents": [{"Key": "k"}]}));
    }

    #[test]
    fn empty_and_cdata_elements() {
        let (_, v) = xml_to_value("<R><Empty/><Data><![CDATA[<raw>]]></Data></R>", &XmlShape::default()).unwrap();
        assert_eq!(v, json!({"Empty": "", "Data": "<raw>"}));
    }

    #[test]
    fn leaf_whitespace_is_preserved() {
        let (_, v) = xml_to_value(
            "<ListBucketResult>\n  <Prefix> logs/ </Prefix>\n  <Contents>\n    <Key>a b </Key>\n  </Contents>\n</ListBucketResult>",
            &XmlShape::lists(&["Contents"]),
        )
        .unwrap();
        assert_eq!(v, json!({"Prefix": " logs/ ", "Contents": [{"Key": "a b "}]}));
    }

    #[test]
    fn empty_wrappers_decode_to_empty_arrays() {
        let shape = XmlShape::wrappers(&["Stacks", "groupSet"]);
        let (_, v) = xml_to_value(
            "<R><Stacks/><groupSet>\n</groupSet><Other/></R>",
            &shape,
        )
        .unwrap();
        assert_eq!(v, json!({"Stacks": [], "groupSet": [], "Other": ""}));

        let (_, v) = xml_to_value("<R><Stacks><member><A>1</A></member></Stacks></R>", &shape).unwrap();
        assert_eq!(v, json!({"Stacks": [{"A": "1"}]}));
    }

    #[test]
    fn named_wrappers_unwrap_their_items() {
        let (_, v) = xml_to_value(
            "<ListAllMyBucketsResult><Buckets><Bucket><Name>a</Name></Bucket></Buckets></ListAllMyBucketsResult>",
            &XmlShape::wrappers(&["Buckets"]),
        )
        .unwrap();
        assert_eq!(v, json!({"Buckets": [{"Name": "a"}]}));
    }

    #[test]
    fn typed_leaves() {
        let shape = XmlShape {
            lists: &[],
            wrappers: &[],
            booleans: &["IsTruncated", "Enabled"],
            numbers: &["MaxKeys", "Size", "Ratio"],
        };
        let (_, v) = xml_to_value(
            "<R><IsTruncated>false</IsTruncated><Enabled>maybe</Enabled><MaxKeys>1000</MaxKeys><Size>3</Size><Ratio>0.5</Ratio><Name>7</Name></R>",
            &shape,
        )
        .unwrap();
        assert_eq!(
            v,
            json!({"IsTruncated": false, "Enabled": "maybe", "MaxKeys": 1000, "Size": 3, "Ratio": 0.5, "Name": "7"})
        );
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(xml_to_value("<R><A></R>", &XmlShape::default()).is_err());
        assert!(xml_to_value("", &XmlShape::default()).is_err());
        assert!(xml_to_value("<R><A>", &XmlShape::default()).is_err());
    }

    #[test]
    fn value_to_xml_structure() {
        let xml = value_to_xml(
            "OriginRequestPolicyConfig",
            &json!({"Name": "p&q", "Comment": null, "HeadersConfig": {"HeaderBehavior": "none"}, "Tag": ["a", "b"], "Quantity": 2}),
            Some("http://cloudfront.amazonaws.com/doc/2020-05-31/"),
        );
        assert!(xml.starts_with(
            "<OriginRequestPolicyConfig xmlns=\"http://cloudfront.amazonaws.com/doc/2020-05-31/\">"
        ));
        assert!(xml.contains("<Name>p&amp;q</Name>"));
        assert!(xml.contains("<Comment/>"));
        assert!(xml.contains("<HeadersConfig><HeaderBehavior>none</HeaderBehavior></HeadersConfig>"));
        assert!(xml.contains("<Tag>a</Tag><Tag>b</Tag>"));
        assert!(xml.contains("<Quantity>2</Quantity>"));
        assert!(xml.ends_with("</OriginRequestPolicyConfig>"));
    }

    #[test]
    fn xml_round_trip_through_value() {
        let xml = value_to_xml("Root", &json!({"A": {"B": "c"}}), None);
        let (_, v) = xml_to_value(&xml, &XmlShape::default()).unwrap();
        assert_eq!(v, json!({"A": {"B": "c"}}));
    }
}
