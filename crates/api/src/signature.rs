//! Registration time checks of service method signatures.
//!
//! A service method always looks like `async fn(MethodContext, A) -> Result<(), E>` or
//! `async fn(MethodContext, A) -> Result<Option<R>, E>`. The arity, the first argument and the
//! return shape are enforced by [`ServiceMethod`](crate::ServiceMethod) and
//! [`MethodReturn`](crate::MethodReturn), so a method breaking them can't be registered at all.
//! What the compiler can't see is the *shape* of `A`: it must be a struct, a map or a sequence,
//! because the query, form, json and path sources are all merged into it field by field.
//! [`ArgShape::of`] serializes the zero value of `A` once, when the route is built.

use crate::error::SignatureError;
use serde::de::DeserializeOwned;
use serde::ser::{
    self, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant, SerializeTuple, SerializeTupleStruct,
    SerializeTupleVariant,
};
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Types usable as the second argument of a service method.
///
/// `Default` provides the zero value fields fall back to when no source mentions them,
/// `Serialize` is used to read the shape and to write access logs.
pub trait Argument: Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> Argument for T where T: Serialize + DeserializeOwned + Default + Send + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// a struct with named fields
    Record,
    /// a string-keyed map
    Mapping,
    /// a sequence, only the json body can fill it
    Sequence,
}

/// The validated shape of a service method argument.
///
/// It is computed once per route and reused by every request, together with the json form of
/// the zero value which is the bottom layer of every bind.
#[derive(Debug)]
pub struct ArgShape<A> {
    kind: ArgKind,
    template: Value,
    _phantom: PhantomData<fn() -> A>,
}

impl<A: Argument> ArgShape<A> {
    pub fn of() -> Result<Self, SignatureError> {
        let type_name = std::any::type_name::<A>();
        let zero = A::default();

        let template = serde_json::to_value(&zero).map_err(|source| SignatureError::Template { type_name, source })?;
        let kind = match zero.serialize(ShapeSerializer).map_err(|source| SignatureError::Template { type_name, source })? {
            Shape::Record => ArgKind::Record,
            Shape::Mapping => ArgKind::Mapping,
            Shape::Sequence => ArgKind::Sequence,
            Shape::Other(found) => return Err(SignatureError::second_argument(type_name, found)),
        };

        Ok(Self { kind, template, _phantom: PhantomData })
    }
}

impl<A> ArgShape<A> {
    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    pub(crate) fn template(&self) -> &Value {
        &self.template
    }
}

enum Shape {
    Record,
    Mapping,
    Sequence,
    Other(&'static str),
}

/// Reports which serializer entry point a value calls first, without looking deeper.
struct ShapeSerializer;

struct Compound(Shape);

type ShapeResult = Result<Shape, serde_json::Error>;

macro_rules! scalar_shape {
    ($($method:ident: $ty:ty => $found:literal,)*) => {$(
        fn $method(self, _v: $ty) -> ShapeResult {
            Ok(Shape::Other($found))
        }
    )*};
}

impl ser::Serializer for ShapeSerializer {
    type Ok = Shape;
    type Error = serde_json::Error;

    type SerializeSeq = Compound;
    type SerializeTuple = Compound;
    type SerializeTupleStruct = Compound;
    type SerializeTupleVariant = Compound;
    type SerializeMap = Compound;
    type SerializeStruct = Compound;
    type SerializeStructVariant = Compound;

    scalar_shape! {
        serialize_bool: bool => "bool",
        serialize_i8: i8 => "number",
        serialize_i16: i16 => "number",
        serialize_i32: i32 => "number",
        serialize_i64: i64 => "number",
        serialize_i128: i128 => "number",
        serialize_u8: u8 => "number",
        serialize_u16: u16 => "number",
        serialize_u32: u32 => "number",
        serialize_u64: u64 => "number",
        serialize_u128: u128 => "number",
        serialize_f32: f32 => "number",
        serialize_f64: f64 => "number",
        serialize_char: char => "string",
        serialize_str: &str => "string",
        serialize_bytes: &[u8] => "byte string",
        serialize_unit_struct: &'static str => "unit struct",
    }

    fn serialize_none(self) -> ShapeResult {
        Ok(Shape::Other("option"))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> ShapeResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> ShapeResult {
        Ok(Shape::Other("unit"))
    }

    fn serialize_unit_variant(self, _name: &'static str, _index: u32, _variant: &'static str) -> ShapeResult {
        Ok(Shape::Other("enum"))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> ShapeResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> ShapeResult {
        Ok(Shape::Other("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Sequence))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Sequence))
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Sequence))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Other("enum")))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Mapping))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Record))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Compound, serde_json::Error> {
        Ok(Compound(Shape::Other("enum")))
    }
}

macro_rules! compound_ignoring_elements {
    ($($trait:ident::$method:ident),*) => {$(
        impl $trait for Compound {
            type Ok = Shape;
            type Error = serde_json::Error;

            fn $method<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), serde_json::Error> {
                Ok(())
            }

            fn end(self) -> ShapeResult {
                Ok(self.0)
            }
        }
    )*};
}

compound_ignoring_elements!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field
);

impl SerializeMap for Compound {
    type Ok = Shape;
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, _key: &T) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn end(self) -> ShapeResult {
        Ok(self.0)
    }
}

impl SerializeStruct for Compound {
    type Ok = Shape;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, _value: &T) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn end(self) -> ShapeResult {
        Ok(self.0)
    }
}

impl SerializeStructVariant for Compound {
    type Ok = Shape;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, _value: &T) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn end(self) -> ShapeResult {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgKind, ArgShape};
    use crate::error::SignatureError;
    use serde::{Deserialize, Serialize};
    use std::collections::{BTreeMap, HashMap};

    #[derive(Serialize, Deserialize, Default)]
    struct User {
        name: String,
        age: u32,
    }

    #[derive(Serialize, Deserialize, Default)]
    struct Wrapper(User);

    #[derive(Serialize, Deserialize, Default)]
    enum Mode {
        #[default]
        Fast,
    }

    fn rejected<A: crate::Argument>() -> &'static str {
        match ArgShape::<A>::of() {
            Err(SignatureError::SecondArgument { found, .. }) => found,
            other => panic!("expect SecondArgument error, but got kind {:?}", other.map(|shape| shape.kind())),
        }
    }

    #[test]
    fn test_accepted_shapes() {
        assert_eq!(ArgShape::<User>::of().unwrap().kind(), ArgKind::Record);
        assert_eq!(ArgShape::<Wrapper>::of().unwrap().kind(), ArgKind::Record);
        assert_eq!(ArgShape::<HashMap<String, serde_json::Value>>::of().unwrap().kind(), ArgKind::Mapping);
        assert_eq!(ArgShape::<BTreeMap<String, String>>::of().unwrap().kind(), ArgKind::Mapping);
        assert_eq!(ArgShape::<Vec<User>>::of().unwrap().kind(), ArgKind::Sequence);
        assert_eq!(ArgShape::<Vec<i64>>::of().unwrap().kind(), ArgKind::Sequence);
    }

    #[test]
    fn test_rejected_shapes() {
        assert_eq!(rejected::<i32>(), "number");
        assert_eq!(rejected::<String>(), "string");
        assert_eq!(rejected::<bool>(), "bool");
        assert_eq!(rejected::<()>(), "unit");
        assert_eq!(rejected::<Option<User>>(), "option");
        assert_eq!(rejected::<Mode>(), "enum");
    }

    #[test]
    fn test_template_is_zero_value() {
        let shape = ArgShape::<User>::of().unwrap();
        assert_eq!(shape.template(), &serde_json::json!({"name": "", "age": 0}));
    }

    #[test]
    fn test_error_message_names_the_rule() {
        let error = ArgShape::<u64>::of().unwrap_err();
        assert_eq!(error.to_string(), "the second argument should be a struct, sequence or string-keyed map, but `u64` is a number");
    }
}
