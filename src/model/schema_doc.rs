//! JSON schema documents.
//!
//! A document names its message types and refers to nested types by name:
//!
//! ```json
//! {
//!   "root": "Node",
//!   "messages": [{
//!     "name": "Node",
//!     "fields": [
//!       { "name": "id", "number": 1, "type": "uint32", "label": "required", "min": 1, "max": 99 },
//!       { "name": "next", "number": 2, "type": "message", "message": "Node" }
//!     ],
//!     "oneofs": [{ "name": "body", "required": false, "fields": [
//!       { "name": "text", "number": 3, "type": "string" }
//!     ]}]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::sync::Arc;

use crate::{
    Cardinality, FieldDescriptor, FieldType, MessageId, ProtomutError, ProtomutResult, SchemaBuilder,
    SchemaRef, SchemaRegistry,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SchemaDoc {
    /// Default root type; the first message when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub messages: Vec<MessageDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MessageDoc {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDoc>,
    #[serde(default)]
    pub oneofs: Vec<OneofDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldDoc {
    pub name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default = "default_label")]
    pub label: Cardinality,
    /// Referenced type name for `"type": "message"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Declared value names for `"type": "enum"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Number>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OneofDoc {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub fields: Vec<FieldDoc>,
}

fn default_label() -> Cardinality {
    Cardinality::Optional
}

impl SchemaDoc {
    pub fn load(path: &Path) -> ProtomutResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ProtomutResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Builds the registry described by this document.
    pub fn build(&self) -> ProtomutResult<Arc<SchemaRegistry>> {
        if has_duplicate(&self.messages) {
            return Err(ProtomutError::Schema("duplicate message names".to_string()));
        }
        let mut builder = SchemaBuilder::new();
        let ids: Vec<MessageId> = self.messages.iter().map(|m| builder.declare(m.name.as_str())).collect();
        for (doc, id) in self.messages.iter().zip(&ids) {
            for field in &doc.fields {
                let fd = field.to_descriptor(&builder, &doc.name)?;
                builder.field(*id, fd);
            }
            for group in &doc.oneofs {
                let members = group
                    .fields
                    .iter()
                    .map(|f| f.to_descriptor(&builder, &doc.name))
                    .collect::<ProtomutResult<Vec<_>>>()?;
                builder.oneof(*id, group.name.as_str(), group.required, members);
            }
        }
        builder.build()
    }

    /// Builds the registry and resolves the root type: `root` when given,
    /// else the document's `root`, else its first message.
    pub fn root_ref(&self, root: Option<&str>) -> ProtomutResult<SchemaRef> {
        let registry = self.build()?;
        let name = root
            .or(self.root.as_deref())
            .or_else(|| self.messages.first().map(|m| m.name.as_str()))
            .ok_or_else(|| ProtomutError::Schema("schema document declares no messages".to_string()))?;
        registry.schema_ref(name)
    }
}

fn has_duplicate(messages: &[MessageDoc]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    messages.iter().any(|m| !seen.insert(m.name.as_str()))
}

impl FieldDoc {
    fn to_descriptor(&self, builder: &SchemaBuilder, owner: &str) -> ProtomutResult<FieldDescriptor> {
        let at = || format!("{owner}.{}", self.name);
        let ty = match self.ty.as_str() {
            "int32" => FieldType::Int32,
            "int64" => FieldType::Int64,
            "uint32" => FieldType::UInt32,
            "uint64" => FieldType::UInt64,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "bool" => FieldType::Bool,
            "bytes" => FieldType::Bytes,
            "string" => FieldType::String,
            "enum" => FieldType::enumeration(self.values.iter().cloned()),
            "message" => {
                let name = self.message.as_deref().ok_or_else(|| {
                    ProtomutError::Schema(format!("{}: message field needs \"message\"", at()))
                })?;
                let id = builder.declared(name).ok_or_else(|| {
                    ProtomutError::Schema(format!("{}: unknown message type {name:?}", at()))
                })?;
                FieldType::Message(id)
            }
            other => {
                return Err(ProtomutError::Schema(format!("{}: unknown type {other:?}", at())));
            }
        };
        let mut fd = FieldDescriptor::new(self.name.as_str(), self.number, ty, self.label);
        match (&self.min, &self.max) {
            (None, None) => {}
            (min, max) => {
                let width = fd.ty.width_range().ok_or_else(|| {
                    ProtomutError::Schema(format!("{}: range on non-integer field", at()))
                })?;
                let lo = match min {
                    Some(n) => number_to_i128(n).ok_or_else(|| bad_bound(&at()))?,
                    None => width.min,
                };
                let hi = match max {
                    Some(n) => number_to_i128(n).ok_or_else(|| bad_bound(&at()))?,
                    None => width.max,
                };
                fd = fd.with_range(lo, hi);
            }
        }
        Ok(fd)
    }
}

fn number_to_i128(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn bad_bound(at: &str) -> ProtomutError {
    ProtomutError::Schema(format!("{at}: range bounds must be integers"))
}
