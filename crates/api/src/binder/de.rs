//! Deserializes the merged [`Node`] tree into the argument type.
//!
//! Json leaves are handed to `serde_json`, text leaves are parsed on demand the way
//! `application/x-www-form-urlencoded` values are: the type asked for decides how the string is
//! read, the last value of a repeated key wins unless a sequence is asked for.

use crate::binder::source::Node;
use crate::error::DecodeError;
use serde::de::value::{SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeSeed, Deserializer, Error as _, IntoDeserializer, MapAccess, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use std::collections::{btree_map, BTreeMap};

pub(crate) struct NodeDeserializer {
    node: Node,
    ignore_unknown_keys: bool,
}

impl NodeDeserializer {
    pub(crate) fn new(node: Node, ignore_unknown_keys: bool) -> Self {
        Self { node, ignore_unknown_keys }
    }
}

macro_rules! forward_to_node {
    ($($method:ident($($arg:ident: $ty:ty),*))*) => {$(
        fn $method<V: Visitor<'de>>(self, $($arg: $ty,)* visitor: V) -> Result<V::Value, Self::Error> {
            match self.node {
                Node::Json(value) => value.$method($($arg,)* visitor).map_err(DecodeError::json),
                Node::Text(values) => TextDeserializer::new(values).$method($($arg,)* visitor),
                Node::Object(entries) => ObjectDeserializer::new(entries, self.ignore_unknown_keys).$method($($arg,)* visitor),
                Node::Null(prior) => NodeDeserializer::new(*prior, self.ignore_unknown_keys).$method($($arg,)* visitor),
                Node::Zero => ZeroDeserializer.$method($($arg,)* visitor),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for NodeDeserializer {
    type Error = DecodeError;

    forward_to_node! {
        deserialize_any() deserialize_bool()
        deserialize_i8() deserialize_i16() deserialize_i32() deserialize_i64() deserialize_i128()
        deserialize_u8() deserialize_u16() deserialize_u32() deserialize_u64() deserialize_u128()
        deserialize_f32() deserialize_f64() deserialize_char() deserialize_str() deserialize_string()
        deserialize_bytes() deserialize_byte_buf() deserialize_unit()
        deserialize_seq() deserialize_map() deserialize_identifier() deserialize_ignored_any()
        deserialize_unit_struct(name: &'static str)
        deserialize_tuple(len: usize)
        deserialize_tuple_struct(name: &'static str, len: usize)
        deserialize_struct(name: &'static str, fields: &'static [&'static str])
        deserialize_enum(name: &'static str, variants: &'static [&'static str])
    }

    /// A json `null` member clears an optional field, any other field keeps what was below it.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.node {
            Node::Null(_) | Node::Zero => visitor.visit_none(),
            Node::Json(value) => value.deserialize_option(visitor).map_err(DecodeError::json),
            Node::Text(values) => TextDeserializer::new(values).deserialize_option(visitor),
            Node::Object(entries) => ObjectDeserializer::new(entries, self.ignore_unknown_keys).deserialize_option(visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }
}

struct ObjectDeserializer {
    entries: BTreeMap<String, Node>,
    ignore_unknown_keys: bool,
}

impl ObjectDeserializer {
    fn new(entries: BTreeMap<String, Node>, ignore_unknown_keys: bool) -> Self {
        Self { entries, ignore_unknown_keys }
    }
}

impl<'de> Deserializer<'de> for ObjectDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(NodeMapAccess::new(self.entries, self.ignore_unknown_keys))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        mut self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        if self.ignore_unknown_keys {
            self.entries.retain(|key, _| fields.contains(&key.as_str()));
        } else if let Some(key) = self.entries.keys().find(|key| !fields.contains(&key.as_str())) {
            return Err(DecodeError::unknown_key(key));
        }

        for field in fields {
            self.entries.entry((*field).to_string()).or_insert(Node::Zero);
        }
        self.deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map enum identifier ignored_any
    }
}

struct NodeMapAccess {
    entries: btree_map::IntoIter<String, Node>,
    pending: Option<(String, Node)>,
    ignore_unknown_keys: bool,
}

impl NodeMapAccess {
    fn new(entries: BTreeMap<String, Node>, ignore_unknown_keys: bool) -> Self {
        Self { entries: entries.into_iter(), pending: None, ignore_unknown_keys }
    }
}

impl<'de> MapAccess<'de> for NodeMapAccess {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error> {
        let Some((key, node)) = self.entries.next() else {
            return Ok(None);
        };

        let value = seed.deserialize(TextDeserializer::single(key.clone())).map_err(|e| e.at(&key))?;
        self.pending = Some((key, node));
        Ok(Some(value))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let (key, node) = self.pending.take().ok_or_else(|| DecodeError::custom("value is missing"))?;
        seed.deserialize(NodeDeserializer::new(node, self.ignore_unknown_keys)).map_err(|e| e.at(&key))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// Reads one or more raw string values as the requested type.
struct TextDeserializer {
    values: Vec<String>,
}

impl TextDeserializer {
    fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    fn single(value: String) -> Self {
        Self { values: vec![value] }
    }

    fn last(&self) -> &str {
        self.values.last().map_or("", String::as_str)
    }

    fn into_last(mut self) -> String {
        self.values.pop().unwrap_or_default()
    }
}

/// The values accepted by Go's `strconv.ParseBool`, which form clients tend to send.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident: $ty:ty,)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            let text = self.into_last();
            match text.parse::<$ty>() {
                Ok(value) => visitor.$visit(value),
                Err(_) => Err(DecodeError::invalid_text(&text, stringify!($ty))),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for TextDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.values.len() > 1 { self.deserialize_seq(visitor) } else { visitor.visit_string(self.into_last()) }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let text = self.into_last();
        match parse_bool(&text) {
            Some(value) => visitor.visit_bool(value),
            None => Err(DecodeError::invalid_text(&text, "bool")),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
        deserialize_char => visit_char: char,
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.into_last())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.into_last())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.into_last())
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(self.into_last().into_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(self.into_last().into_bytes())
    }

    /// An empty value means the field was sent without content.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.last().is_empty() { visitor.visit_none() } else { visitor.visit_some(self) }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        SeqDeserializer::new(self.values.into_iter().map(TextDeserializer::single)).deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        Err(de::Error::invalid_type(Unexpected::Str(self.last()), &visitor))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let variant: StringDeserializer<DecodeError> = self.into_last().into_deserializer();
        variant.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

impl IntoDeserializer<'_, DecodeError> for TextDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

/// Reads the zero value of whatever type is asked for: `0`, `false`, `""`, empty sequences and
/// maps, `None`, and records made of zero values.
struct ZeroDeserializer;

macro_rules! deserialize_zero {
    ($($method:ident => $visit:ident($zero:expr),)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            visitor.$visit($zero)
        }
    )*};
}

impl<'de> Deserializer<'de> for ZeroDeserializer {
    type Error = DecodeError;

    deserialize_zero! {
        deserialize_bool => visit_bool(false),
        deserialize_i8 => visit_i8(0),
        deserialize_i16 => visit_i16(0),
        deserialize_i32 => visit_i32(0),
        deserialize_i64 => visit_i64(0),
        deserialize_i128 => visit_i128(0),
        deserialize_u8 => visit_u8(0),
        deserialize_u16 => visit_u16(0),
        deserialize_u32 => visit_u32(0),
        deserialize_u64 => visit_u64(0),
        deserialize_u128 => visit_u128(0),
        deserialize_f32 => visit_f32(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char('\0'),
        deserialize_str => visit_str(""),
        deserialize_string => visit_str(""),
        deserialize_identifier => visit_str(""),
        deserialize_bytes => visit_bytes(&[]),
        deserialize_byte_buf => visit_bytes(&[]),
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        SeqDeserializer::new(std::iter::empty::<ZeroDeserializer>()).deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        SeqDeserializer::new(std::iter::repeat_with(|| ZeroDeserializer).take(len)).deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(NodeMapAccess::new(BTreeMap::new(), true))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        ObjectDeserializer::new(BTreeMap::new(), true).deserialize_struct(name, fields, visitor)
    }

    /// The first variant stands for the zero value of an enum.
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let first = variants.first().copied().unwrap_or_default();
        let variant: StringDeserializer<DecodeError> = first.to_string().into_deserializer();
        variant.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

impl IntoDeserializer<'_, DecodeError> for ZeroDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::NodeDeserializer;
    use crate::binder::source::Source;
    use crate::error::DecodeError;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct Inner {
        x: i32,
        y: i32,
    }

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    #[serde(rename_all = "lowercase")]
    enum Color {
        #[default]
        Red,
        Blue,
    }

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct Query {
        name: String,
        age: u32,
        score: f64,
        admin: bool,
        tags: Vec<String>,
        ids: Vec<u64>,
        nick: Option<String>,
        limit: Option<u32>,
        color: Color,
        inner: Inner,
    }

    fn decode<A: Serialize + DeserializeOwned + Default>(
        pairs: &[(&str, &[&str])],
        ignore_unknown_keys: bool,
    ) -> Result<A, DecodeError> {
        let template = serde_json::to_value(A::default()).unwrap();
        let mut source = Source::new(template, ignore_unknown_keys);
        for (key, values) in pairs {
            source.write_text(key, values.iter().map(ToString::to_string).collect())?;
        }
        A::deserialize(NodeDeserializer::new(source.into_root(), ignore_unknown_keys))
    }

    #[test]
    fn test_text_values_parsed_by_field_type() {
        let query: Query = decode(
            &[
                ("name", &["zava"]),
                ("age", &["18"]),
                ("score", &["9.5"]),
                ("admin", &["t"]),
                ("tags", &["a", "b"]),
                ("ids", &["1", "2", "3"]),
                ("nick", &["z"]),
                ("color", &["blue"]),
                ("inner.y", &["7"]),
            ],
            true,
        )
        .unwrap();

        assert_eq!(
            query,
            Query {
                name: "zava".into(),
                age: 18,
                score: 9.5,
                admin: true,
                tags: vec!["a".into(), "b".into()],
                ids: vec![1, 2, 3],
                nick: Some("z".into()),
                limit: None,
                color: Color::Blue,
                inner: Inner { x: 0, y: 7 },
            }
        );
    }

    #[test]
    fn test_last_value_wins_for_scalars() {
        let query: Query = decode(&[("age", &["1", "2"])], true).unwrap();
        assert_eq!(query.age, 2);
    }

    #[test]
    fn test_empty_value_is_none() {
        let query: Query = decode(&[("limit", &[""])], true).unwrap();
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_type_mismatch_names_field() {
        let error = decode::<Query>(&[("age", &["old"])], true).unwrap_err();
        assert_eq!(error.to_string(), "field `age`: invalid u32 value `old`");

        let error = decode::<Query>(&[("inner.x", &["?"])], true).unwrap_err();
        assert_eq!(error.field(), Some("inner.x"));
    }

    #[test]
    fn test_unknown_keys() {
        let query: Query = decode(&[("unknown", &["1"]), ("age", &["3"])], true).unwrap();
        assert_eq!(query.age, 3);

        let error = decode::<Query>(&[("unknown", &["1"])], false).unwrap_err();
        assert_eq!(error.to_string(), "unknown key `unknown`");
    }

    #[test]
    fn test_string_keyed_map() {
        let map: HashMap<String, Value> = decode(&[("a", &["1"]), ("b", &["x", "y"])], false).unwrap();
        assert_eq!(map["a"], json!("1"));
        assert_eq!(map["b"], json!(["x", "y"]));
    }

    #[test]
    fn test_json_leaves_keep_their_types() {
        let mut source = Source::new(serde_json::to_value(Query::default()).unwrap(), true);
        source.write_text("age", vec!["5".into()]).unwrap();
        source.write_json(json!({"name": "json", "inner": {"x": 3}})).unwrap();

        let query = Query::deserialize(NodeDeserializer::new(source.into_root(), true)).unwrap();
        assert_eq!(query.name, "json");
        assert_eq!(query.age, 5);
        assert_eq!(query.inner, Inner { x: 3, y: 0 });
    }

    #[test]
    fn test_json_type_mismatch() {
        let mut source = Source::new(serde_json::to_value(Query::default()).unwrap(), true);
        source.write_json(json!({"age": "old"})).unwrap();

        let error = Query::deserialize(NodeDeserializer::new(source.into_root(), true)).unwrap_err();
        assert_eq!(error.field(), Some("age"));
    }

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct Nested {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        point: Option<Inner>,
        pair: (u8, String),
        color: Color,
        scores: Vec<u32>,
        on: bool,
    }

    #[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
    struct Wrapper {
        nested: Option<Nested>,
    }

    #[test]
    fn test_json_null_member() {
        let mut source = Source::new(serde_json::to_value(Query::default()).unwrap(), true);
        source.write_text("name", vec!["query".into()]).unwrap();
        source.write_text("nick", vec!["z".into()]).unwrap();
        source.write_json(json!({"name": null, "nick": null, "inner": null})).unwrap();

        let query = Query::deserialize(NodeDeserializer::new(source.into_root(), true)).unwrap();
        assert_eq!(query.name, "query");
        assert_eq!(query.nick, None);
        assert_eq!(query.inner, Inner::default());
    }

    #[test]
    fn test_optional_record_gets_zero_fields() {
        let wrapper: Wrapper = decode(&[("nested.on", &["true"])], false).unwrap();
        assert_eq!(
            wrapper.nested,
            Some(Nested { point: None, pair: (0, String::new()), color: Color::Red, scores: vec![], on: true })
        );
    }
}
