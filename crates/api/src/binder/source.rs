//! The layered value every bind is built on.
//!
//! The bottom layer is the json form of the argument's zero value, every pass writes on top of
//! it. A field keeps the value of the last pass that mentioned it; json objects are merged member
//! by member, any other value replaces what was there before. A json `null` member only clears
//! optional fields, other fields read the layer below it.

use crate::error::DecodeError;
use serde::de::Error as _;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    /// untouched json, from the zero value or the body
    Json(Value),
    /// raw values of one query, form or path key
    Text(Vec<String>),
    /// an object some text value was written into
    Object(BTreeMap<String, Node>),
    /// a json `null` member over the value it was written on
    Null(Box<Node>),
    /// a field nothing was written to, read as the zero value of its type
    Zero,
}

impl Node {
    fn is_object(&self) -> bool {
        matches!(self, Node::Object(_) | Node::Json(Value::Object(_)))
    }

    /// Open a json object for member-wise writes.
    fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        if let Node::Json(Value::Object(members)) = self {
            let members = std::mem::take(members);
            *self = Node::Object(members.into_iter().map(|(key, value)| (key, Node::Json(value))).collect());
        }

        match self {
            Node::Object(entries) => Some(entries),
            _ => None,
        }
    }

    fn json_kind(&self) -> &'static str {
        match self {
            Node::Json(Value::Null) | Node::Zero => "null",
            Node::Null(prior) => prior.json_kind(),
            Node::Json(Value::Bool(_)) => "bool",
            Node::Json(Value::Number(_)) => "number",
            Node::Json(Value::String(_)) | Node::Text(_) => "string",
            Node::Json(Value::Array(_)) => "array",
            Node::Json(Value::Object(_)) | Node::Object(_) => "object",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Source {
    root: Node,
    ignore_unknown_keys: bool,
}

impl Source {
    pub(crate) fn new(template: Value, ignore_unknown_keys: bool) -> Self {
        Self { root: Node::Json(template), ignore_unknown_keys }
    }

    /// Write the values of one form key, `a.b` addresses the member `b` of the field `a`.
    pub(crate) fn write_text(&mut self, key: &str, values: Vec<String>) -> Result<(), DecodeError> {
        let segments = key.split('.').collect::<Vec<_>>();
        if write_text(&mut self.root, &segments, values) || self.ignore_unknown_keys {
            Ok(())
        } else {
            Err(DecodeError::unknown_key(key))
        }
    }

    /// Write a decoded json body on top of the current value.
    pub(crate) fn write_json(&mut self, value: Value) -> Result<(), DecodeError> {
        if value.is_null() {
            return Ok(());
        }

        if value.is_object() && self.root.is_object() {
            merge_json(&mut self.root, value);
            return Ok(());
        }

        if value.is_array() && matches!(self.root, Node::Json(Value::Array(_))) {
            self.root = Node::Json(value);
            return Ok(());
        }

        Err(DecodeError::custom(format_args!(
            "expect a json {}, but found {}",
            self.root.json_kind(),
            Node::Json(value).json_kind()
        )))
    }

    pub(crate) fn into_root(self) -> Node {
        self.root
    }
}

fn write_text(node: &mut Node, segments: &[&str], values: Vec<String>) -> bool {
    // a dotted key into a `null` record allocates the record
    if matches!(node, Node::Json(Value::Null)) && !segments.is_empty() {
        *node = Node::Object(BTreeMap::new());
    }

    let Some(entries) = node.as_object_mut() else {
        return false;
    };

    match segments {
        [] => false,
        [last] => {
            entries.insert((*last).to_string(), Node::Text(values));
            true
        }
        [first, rest @ ..] => {
            let child = entries.entry((*first).to_string()).or_insert_with(|| Node::Object(BTreeMap::new()));
            write_text(child, rest, values)
        }
    }
}

fn merge_json(node: &mut Node, value: Value) {
    if value.is_null() {
        let prior = std::mem::replace(node, Node::Zero);
        *node = Node::Null(Box::new(prior));
        return;
    }

    let Value::Object(members) = value else {
        *node = Node::Json(value);
        return;
    };

    if !node.is_object() {
        *node = Node::Json(Value::Object(members));
        return;
    }

    if let Some(entries) = node.as_object_mut() {
        for (key, value) in members {
            match entries.get_mut(&key) {
                Some(child) => merge_json(child, value),
                None => {
                    entries.insert(key, Node::Json(value));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, Source};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn text(value: &str) -> Node {
        Node::Text(vec![value.to_string()])
    }

    fn object(entries: Vec<(&str, Node)>) -> Node {
        Node::Object(entries.into_iter().map(|(key, node)| (key.to_string(), node)).collect::<BTreeMap<_, _>>())
    }

    #[test]
    fn test_text_overrides_template() {
        let mut source = Source::new(json!({"name": "", "age": 0}), true);
        source.write_text("age", vec!["18".into()]).unwrap();

        assert_eq!(source.into_root(), object(vec![("age", text("18")), ("name", Node::Json(json!("")))]));
    }

    #[test]
    fn test_json_overrides_text_per_field() {
        let mut source = Source::new(json!({"name": "", "age": 0}), true);
        source.write_text("name", vec!["query".into()]).unwrap();
        source.write_text("age", vec!["1".into()]).unwrap();
        source.write_json(json!({"name": "body"})).unwrap();

        assert_eq!(source.into_root(), object(vec![("age", text("1")), ("name", Node::Json(json!("body")))]));
    }

    #[test]
    fn test_json_merges_nested_objects() {
        let mut source = Source::new(json!({"inner": {"a": 1, "b": 2}}), true);
        source.write_json(json!({"inner": {"b": 3}})).unwrap();

        let expect = object(vec![("inner", object(vec![("a", Node::Json(json!(1))), ("b", Node::Json(json!(3)))]))]);
        assert_eq!(source.into_root(), expect);
    }

    #[test]
    fn test_dotted_key() {
        let mut source = Source::new(json!({"inner": {"a": 1}}), true);
        source.write_text("inner.a", vec!["5".into()]).unwrap();

        assert_eq!(source.into_root(), object(vec![("inner", object(vec![("a", text("5"))]))]));
    }

    #[test]
    fn test_dotted_key_through_scalar_is_unknown() {
        let mut source = Source::new(json!({"name": ""}), false);
        assert!(source.write_text("name.first", vec!["x".into()]).is_err());

        let mut source = Source::new(json!({"name": ""}), true);
        source.write_text("name.first", vec!["x".into()]).unwrap();
        assert_eq!(source.into_root(), object(vec![("name", Node::Json(json!("")))]));
    }

    #[test]
    fn test_sequence_ignores_text() {
        let mut source = Source::new(json!([]), true);
        source.write_text("id", vec!["1".into()]).unwrap();
        assert_eq!(source.into_root(), Node::Json(json!([])));

        let mut source = Source::new(json!([]), false);
        assert!(source.write_text("id", vec!["1".into()]).is_err());
    }

    #[test]
    fn test_sequence_replaced_by_json() {
        let mut source = Source::new(json!([]), true);
        source.write_json(json!([1, 2])).unwrap();
        assert_eq!(source.into_root(), Node::Json(json!([1, 2])));
    }

    #[test]
    fn test_json_null_is_ignored() {
        let mut source = Source::new(json!({"name": ""}), true);
        source.write_json(json!(null)).unwrap();
        assert_eq!(source.into_root(), Node::Json(json!({"name": ""})));
    }

    #[test]
    fn test_json_null_member_keeps_prior() {
        let mut source = Source::new(json!({"name": "", "nick": null}), true);
        source.write_text("name", vec!["query".into()]).unwrap();
        source.write_json(json!({"name": null, "nick": null})).unwrap();

        let expect = object(vec![
            ("name", Node::Null(Box::new(text("query")))),
            ("nick", Node::Null(Box::new(Node::Json(json!(null))))),
        ]);
        assert_eq!(source.into_root(), expect);
    }

    #[test]
    fn test_dotted_key_allocates_null_record() {
        let mut source = Source::new(json!({"address": null}), false);
        source.write_text("address.city", vec!["sh".into()]).unwrap();

        assert_eq!(source.into_root(), object(vec![("address", object(vec![("city", text("sh"))]))]));
    }

    #[test]
    fn test_json_kind_mismatch() {
        let mut source = Source::new(json!({"name": ""}), true);
        let error = source.write_json(json!([1])).unwrap_err();
        assert_eq!(error.to_string(), "expect a json object, but found array");

        let mut source = Source::new(json!([]), true);
        assert!(source.write_json(json!({"a": 1})).is_err());
    }
}
