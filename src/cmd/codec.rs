//! Byte-level codecs between fuzzer buffers and schema instances.

use serde_json::{Map, Number, Value as Json};

use crate::{FieldDescriptor, FieldType, Message, ProtomutError, ProtomutResult, SchemaRef, Slot, Value};

/// Converts between raw fuzzer input and instances of one root type.
pub trait MessageCodec {
    fn decode(&self, data: &[u8]) -> ProtomutResult<Message>;
    fn encode(&self, msg: &Message) -> ProtomutResult<Vec<u8>>;
    /// Starting point when the input does not decode.
    fn default_message(&self) -> Message;
}

/// JSON object encoding keyed by field name.
///
/// Repeated fields are arrays, enums are value names (or plain integers
/// past the declared values), bytes are hex strings, and non-finite floats
/// are the strings `"NaN"`, `"inf"` and `"-inf"`.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    schema: SchemaRef,
    pretty: bool,
}

impl JsonCodec {
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema, pretty: false }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn to_json(msg: &Message) -> Json {
        let mut out = Map::new();
        for (field, slot) in msg.descriptor().fields.iter().zip(msg.slots()) {
            match slot {
                Slot::Empty => {}
                Slot::Single(v) => {
                    out.insert(field.name.clone(), value_to_json(field, v));
                }
                Slot::Repeated(values) => {
                    if !values.is_empty() {
                        let items = values.iter().map(|v| value_to_json(field, v)).collect();
                        out.insert(field.name.clone(), Json::Array(items));
                    }
                }
            }
        }
        Json::Object(out)
    }

    pub fn from_json(schema: &SchemaRef, json: &Json) -> ProtomutResult<Message> {
        let Json::Object(obj) = json else {
            return Err(codec_err(schema.name(), "expected an object"));
        };
        let mut msg = Message::new(schema.clone());
        for (key, raw) in obj {
            let idx = msg
                .descriptor()
                .field_index(key)
                .ok_or_else(|| codec_err(schema.name(), &format!("unknown field {key:?}")))?;
            let field = msg.descriptor().fields[idx].clone();
            let at = format!("{}.{}", schema.name(), field.name);
            if field.is_repeated() {
                let Json::Array(items) = raw else {
                    return Err(codec_err(&at, "expected an array"));
                };
                for item in items {
                    let v = json_to_value(&msg, idx, &field, item, &at)?;
                    msg.push(&field.name, v)?;
                }
            } else {
                if let Some(group) = field.oneof {
                    if msg.active_oneof(group).is_some() {
                        return Err(codec_err(&at, "more than one oneof member present"));
                    }
                }
                let v = json_to_value(&msg, idx, &field, raw, &at)?;
                msg.set_index(idx, v)?;
            }
        }
        Ok(msg)
    }
}

impl MessageCodec for JsonCodec {
    fn decode(&self, data: &[u8]) -> ProtomutResult<Message> {
        let json: Json = serde_json::from_slice(data)?;
        Self::from_json(&self.schema, &json)
    }

    fn encode(&self, msg: &Message) -> ProtomutResult<Vec<u8>> {
        let json = Self::to_json(msg);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };
        Ok(bytes)
    }

    fn default_message(&self) -> Message {
        Message::new(self.schema.clone())
    }
}

fn codec_err(at: &str, what: &str) -> ProtomutError {
    ProtomutError::Codec(format!("{at}: {what}"))
}

fn value_to_json(field: &FieldDescriptor, value: &Value) -> Json {
    match value {
        Value::Int32(v) => Json::from(*v),
        Value::Int64(v) => Json::from(*v),
        Value::UInt32(v) => Json::from(*v),
        Value::UInt64(v) => Json::from(*v),
        Value::Float(v) => float_to_json(f64::from(*v)),
        Value::Double(v) => float_to_json(*v),
        Value::Bool(v) => Json::Bool(*v),
        Value::Enum(i) => match &field.ty {
            FieldType::Enum { values } => match values.get(*i as usize) {
                Some(name) => Json::String(name.clone()),
                None => Json::from(*i),
            },
            _ => Json::from(*i),
        },
        Value::Bytes(b) => Json::String(hex::encode(b)),
        Value::String(s) => Json::String(s.clone()),
        Value::Message(m) => JsonCodec::to_json(m),
    }
}

fn float_to_json(v: f64) -> Json {
    match Number::from_f64(v) {
        Some(n) => Json::Number(n),
        None if v.is_nan() => Json::String("NaN".to_string()),
        None if v > 0.0 => Json::String("inf".to_string()),
        None => Json::String("-inf".to_string()),
    }
}

fn json_to_float(raw: &Json, at: &str) -> ProtomutResult<f64> {
    match raw {
        Json::Number(n) => n.as_f64().ok_or_else(|| codec_err(at, "number out of range")),
        Json::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            _ => Err(codec_err(at, "expected a number")),
        },
        _ => Err(codec_err(at, "expected a number")),
    }
}

fn json_to_int<T: TryFrom<i128>>(raw: &Json, at: &str) -> ProtomutResult<T> {
    let Json::Number(n) = raw else {
        return Err(codec_err(at, "expected an integer"));
    };
    let wide = n
        .as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
        .ok_or_else(|| codec_err(at, "expected an integer"))?;
    T::try_from(wide).map_err(|_| codec_err(at, &format!("{wide} out of range")))
}

fn json_to_value(msg: &Message, idx: usize, field: &FieldDescriptor, raw: &Json, at: &str) -> ProtomutResult<Value> {
    let value = match &field.ty {
        FieldType::Int32 => Value::Int32(json_to_int(raw, at)?),
        FieldType::Int64 => Value::Int64(json_to_int(raw, at)?),
        FieldType::UInt32 => Value::UInt32(json_to_int(raw, at)?),
        FieldType::UInt64 => Value::UInt64(json_to_int(raw, at)?),
        FieldType::Float => Value::Float(json_to_float(raw, at)? as f32),
        FieldType::Double => Value::Double(json_to_float(raw, at)?),
        FieldType::Bool => match raw {
            Json::Bool(b) => Value::Bool(*b),
            _ => return Err(codec_err(at, "expected a bool")),
        },
        FieldType::Enum { values } => match raw {
            Json::String(name) => {
                let pos = values
                    .iter()
                    .position(|v| v == name)
                    .ok_or_else(|| codec_err(at, &format!("unknown enum value {name:?}")))?;
                Value::Enum(pos as u32)
            }
            _ => Value::Enum(json_to_int(raw, at)?),
        },
        FieldType::Bytes => match raw {
            Json::String(s) => Value::Bytes(hex::decode(s).map_err(|e| codec_err(at, &e.to_string()))?),
            _ => return Err(codec_err(at, "expected a hex string")),
        },
        FieldType::String => match raw {
            Json::String(s) => Value::String(s.clone()),
            _ => return Err(codec_err(at, "expected a string")),
        },
        FieldType::Message(_) => {
            let schema = msg
                .child_schema(idx)
                .ok_or_else(|| codec_err(at, "unresolved message type"))?;
            Value::Message(Box::new(JsonCodec::from_json(&schema, raw)?))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, FieldType, SchemaBuilder};

    fn schema() -> SchemaRef {
        let mut b = SchemaBuilder::new();
        let m = b.declare("Rec");
        b.field(m, FieldDescriptor::required("id", 1, FieldType::UInt64))
            .field(m, FieldDescriptor::optional("ratio", 2, FieldType::Double))
            .field(m, FieldDescriptor::optional("mode", 3, FieldType::enumeration(["OFF", "ON"])))
            .field(m, FieldDescriptor::repeated("blobs", 4, FieldType::Bytes))
            .field(m, FieldDescriptor::optional("child", 5, FieldType::Message(m)))
            .oneof(
                m,
                "body",
                false,
                vec![
                    FieldDescriptor::optional("text", 6, FieldType::String),
                    FieldDescriptor::optional("n", 7, FieldType::Int32),
                ],
            );
        b.build().expect("build").schema_ref("Rec").expect("Rec")
    }

    #[test]
    fn encodes_names_hex_and_special_floats() {
        let s = schema();
        let mut child = Message::new(s.clone());
        child.set("id", Value::UInt64(u64::MAX)).expect("id");
        let mut msg = Message::new(s.clone());
        msg.set("id", Value::UInt64(1)).expect("id");
        msg.set("ratio", Value::Double(f64::NEG_INFINITY)).expect("ratio");
        msg.set("mode", Value::Enum(1)).expect("mode");
        msg.push("blobs", Value::Bytes(vec![0xde, 0xad])).expect("blob");
        msg.set("child", Value::Message(Box::new(child))).expect("child");

        let json = JsonCodec::to_json(&msg);
        assert_eq!(json["ratio"], "-inf");
        assert_eq!(json["mode"], "ON");
        assert_eq!(json["blobs"][0], "dead");
        assert_eq!(json["child"]["id"], u64::MAX);

        let codec = JsonCodec::new(s);
        let bytes = codec.encode(&msg).expect("encode");
        assert_eq!(codec.decode(&bytes).expect("decode"), msg);
    }

    #[test]
    fn out_of_range_enum_is_an_integer() {
        let s = schema();
        let mut msg = Message::new(s.clone());
        msg.set("mode", Value::Enum(9)).expect("mode");
        let json = JsonCodec::to_json(&msg);
        assert_eq!(json["mode"], 9);
        let back = JsonCodec::from_json(&s, &json).expect("decode");
        assert_eq!(back.get("mode"), Some(&Value::Enum(9)));
    }

    #[test]
    fn rejects_malformed_input() {
        let codec = JsonCodec::new(schema());
        assert!(codec.decode(b"not json").is_err());
        let err = codec.decode(br#"{"bogus": 1}"#).expect_err("unknown");
        assert!(matches!(err, ProtomutError::Codec(_)));
        let err = codec.decode(br#"{"text": "a", "n": 1}"#).expect_err("two members");
        assert!(err.to_string().contains("oneof"));
        assert!(codec.decode(br#"{"id": -1}"#).is_err());
    }
}
