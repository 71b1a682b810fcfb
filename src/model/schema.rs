//! Schema model: immutable per-type field metadata, computed once and shared.
//!
//! Message types refer to each other by [`MessageId`], so self-referential and
//! mutually recursive schemas need no reference cycles. A built
//! [`SchemaRegistry`] is never mutated; instances hold a cheap [`SchemaRef`]
//! (an `Arc` plus an id) into it.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::{ProtomutError, ProtomutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Required,
    Optional,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Enum { values: Vec<String> },
    Bytes,
    String,
    Message(MessageId),
}

impl FieldType {
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Enum { .. } => "enum",
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::Message(_) => "message",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::UInt32 | Self::UInt64)
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Message(id) => Some(*id),
            _ => None,
        }
    }

    /// Number of declared enum values; zero for non-enum types.
    pub fn enum_len(&self) -> usize {
        match self {
            Self::Enum { values } => values.len(),
            _ => 0,
        }
    }

    /// Full representable range of an integer type.
    pub fn width_range(&self) -> Option<IntRange> {
        let (min, max) = match self {
            Self::Int32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            Self::Int64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            Self::UInt32 => (0, i128::from(u32::MAX)),
            Self::UInt64 => (0, i128::from(u64::MAX)),
            _ => return None,
        };
        Some(IntRange { min, max })
    }
}

/// Inclusive declared range of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i128,
    pub max: i128,
}

impl IntRange {
    pub fn new(min: i128, max: i128) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: i128) -> bool {
        self.min <= v && v <= self.max
    }

    /// Maps `v` back into the range by wrapping around its span.
    pub fn wrap(&self, v: i128) -> i128 {
        if self.contains(v) {
            return v;
        }
        let span = self.max - self.min + 1;
        self.min + (v - self.min).rem_euclid(span)
    }

    pub fn clamp(&self, v: i128) -> i128 {
        v.clamp(self.min, self.max)
    }

    fn within(&self, outer: &IntRange) -> bool {
        outer.min <= self.min && self.max <= outer.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub ty: FieldType,
    pub cardinality: Cardinality,
    /// Index into the owning message's `oneofs`, set by the builder.
    pub oneof: Option<usize>,
    pub range: Option<IntRange>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, number: u32, ty: FieldType, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            number,
            ty,
            cardinality,
            oneof: None,
            range: None,
        }
    }

    pub fn required(name: impl Into<String>, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Cardinality::Required)
    }

    pub fn optional(name: impl Into<String>, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Cardinality::Optional)
    }

    pub fn repeated(name: impl Into<String>, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Cardinality::Repeated)
    }

    pub fn with_range(mut self, min: i128, max: i128) -> Self {
        self.range = Some(IntRange::new(min, max));
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.cardinality == Cardinality::Required
    }

    /// Declared range, or the full width of the integer type.
    pub fn effective_range(&self) -> Option<IntRange> {
        self.range.or_else(|| self.ty.width_range())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneofDescriptor {
    pub name: String,
    /// Indices of member fields in the owning message.
    pub fields: Vec<usize>,
    /// When false the group may have no active member.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
}

impl MessageSchema {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, idx: usize) -> Option<&FieldDescriptor> {
        self.fields.get(idx)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SchemaRegistry {
    messages: Vec<MessageSchema>,
    by_name: BTreeMap<String, MessageId>,
}

impl SchemaRegistry {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&MessageSchema> {
        self.messages.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<MessageId> {
        self.by_name.get(name).copied()
    }

    pub fn messages(&self) -> impl Iterator<Item = (MessageId, &MessageSchema)> {
        self.messages.iter().enumerate().map(|(i, m)| (MessageId(i), m))
    }

    pub fn schema_ref(self: &Arc<Self>, name: &str) -> ProtomutResult<SchemaRef> {
        let id = self
            .id_of(name)
            .ok_or_else(|| ProtomutError::InvalidArgument(format!("unknown message type {name:?}")))?;
        Ok(SchemaRef {
            registry: Arc::clone(self),
            id,
        })
    }

    pub fn schema_ref_by_id(self: &Arc<Self>, id: MessageId) -> ProtomutResult<SchemaRef> {
        if id.0 >= self.messages.len() {
            return Err(ProtomutError::InvalidArgument(format!(
                "message id {} out of range",
                id.0
            )));
        }
        Ok(SchemaRef {
            registry: Arc::clone(self),
            id,
        })
    }
}

/// Handle to one message type inside a registry.
#[derive(Clone)]
pub struct SchemaRef {
    registry: Arc<SchemaRegistry>,
    id: MessageId,
}

impl SchemaRef {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn descriptor(&self) -> &MessageSchema {
        // Ids are checked when the ref is created and registries are immutable.
        &self.registry.messages[self.id.0]
    }

    pub fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Ref to another type in the same registry. Ids embedded in field
    /// descriptors were validated by the builder.
    pub(crate) fn sibling(&self, id: MessageId) -> SchemaRef {
        SchemaRef {
            registry: Arc::clone(&self.registry),
            id,
        }
    }

    pub fn same_schema(&self, other: &SchemaRef) -> bool {
        self.id == other.id
            && (Arc::ptr_eq(&self.registry, &other.registry) || *self.registry == *other.registry)
    }
}

impl PartialEq for SchemaRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_schema(other)
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaRef({})", self.name())
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    messages: Vec<MessageSchema>,
    by_name: BTreeMap<String, MessageId>,
    errors: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a message type, returning the existing id if already declared.
    /// Declaring before adding fields allows forward and self references.
    pub fn declare(&mut self, name: impl Into<String>) -> MessageId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = MessageId(self.messages.len());
        self.messages.push(MessageSchema {
            name: name.clone(),
            fields: Vec::new(),
            oneofs: Vec::new(),
        });
        self.by_name.insert(name, id);
        id
    }

    /// Id of an already declared type.
    pub fn declared(&self, name: &str) -> Option<MessageId> {
        self.by_name.get(name).copied()
    }

    pub fn field(&mut self, msg: MessageId, mut field: FieldDescriptor) -> &mut Self {
        let Some(schema) = self.messages.get_mut(msg.0) else {
            self.errors.push(format!("field {:?} added to undeclared message id {}", field.name, msg.0));
            return self;
        };
        if field.oneof.is_some() {
            self.errors.push(format!(
                "field {}.{} sets oneof directly; use SchemaBuilder::oneof",
                schema.name, field.name
            ));
        }
        field.oneof = None;
        schema.fields.push(field);
        self
    }

    pub fn oneof(
        &mut self,
        msg: MessageId,
        name: impl Into<String>,
        required: bool,
        fields: Vec<FieldDescriptor>,
    ) -> &mut Self {
        let name = name.into();
        let Some(schema) = self.messages.get_mut(msg.0) else {
            self.errors.push(format!("oneof {name:?} added to undeclared message id {}", msg.0));
            return self;
        };
        let group = schema.oneofs.len();
        let mut members = Vec::with_capacity(fields.len());
        for mut field in fields {
            field.oneof = Some(group);
            members.push(schema.fields.len());
            schema.fields.push(field);
        }
        schema.oneofs.push(OneofDescriptor {
            name,
            fields: members,
            required,
        });
        self
    }

    pub fn build(self) -> ProtomutResult<Arc<SchemaRegistry>> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(ProtomutError::Schema(err));
        }
        let count = self.messages.len();
        for msg in &self.messages {
            check_message(msg, count)?;
        }
        Ok(Arc::new(SchemaRegistry {
            messages: self.messages,
            by_name: self.by_name,
        }))
    }
}

fn check_message(msg: &MessageSchema, message_count: usize) -> ProtomutResult<()> {
    if msg.name.is_empty() {
        return Err(ProtomutError::Schema("message type with empty name".to_string()));
    }
    let mut names = BTreeSet::new();
    let mut numbers = BTreeSet::new();
    for field in &msg.fields {
        let at = format!("{}.{}", msg.name, field.name);
        if field.name.is_empty() {
            return Err(ProtomutError::Schema(format!("{}: field with empty name", msg.name)));
        }
        if !names.insert(field.name.as_str()) {
            return Err(ProtomutError::Schema(format!("{at}: duplicate field name")));
        }
        if field.number == 0 {
            return Err(ProtomutError::Schema(format!("{at}: field number must be non-zero")));
        }
        if !numbers.insert(field.number) {
            return Err(ProtomutError::Schema(format!(
                "{at}: duplicate field number {}",
                field.number
            )));
        }
        if let Some(id) = field.ty.message_id() {
            if id.0 >= message_count {
                return Err(ProtomutError::Schema(format!(
                    "{at}: references undeclared message id {}",
                    id.0
                )));
            }
        }
        if let Some(range) = field.range {
            let Some(width) = field.ty.width_range() else {
                return Err(ProtomutError::Schema(format!(
                    "{at}: range declared on non-integer type {}",
                    field.ty.name()
                )));
            };
            if range.min > range.max {
                return Err(ProtomutError::Schema(format!(
                    "{at}: range min {} exceeds max {}",
                    range.min, range.max
                )));
            }
            if !range.within(&width) {
                return Err(ProtomutError::Schema(format!(
                    "{at}: range {}..={} does not fit {}",
                    range.min,
                    range.max,
                    field.ty.name()
                )));
            }
        }
        if field.oneof.is_some() && field.cardinality != Cardinality::Optional {
            return Err(ProtomutError::Schema(format!(
                "{at}: oneof members must be singular optional fields"
            )));
        }
    }
    for group in &msg.oneofs {
        if group.fields.is_empty() {
            return Err(ProtomutError::Schema(format!(
                "{}.{}: oneof group has no alternatives",
                msg.name, group.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_referential_schema_builds() {
        let mut b = SchemaBuilder::new();
        let node = b.declare("Node");
        b.field(node, FieldDescriptor::optional("value", 1, FieldType::Int32))
            .field(node, FieldDescriptor::optional("next", 2, FieldType::Message(node)));
        let reg = b.build().expect("build");
        let node_ref = reg.schema_ref("Node").expect("node");
        assert_eq!(node_ref.descriptor().fields[1].ty.message_id(), Some(node));
        assert_eq!(node_ref.name(), "Node");
    }

    #[test]
    fn oneof_members_get_group_index() {
        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.field(m, FieldDescriptor::required("id", 1, FieldType::UInt32)).oneof(
            m,
            "choice",
            false,
            vec![
                FieldDescriptor::optional("a", 2, FieldType::String),
                FieldDescriptor::optional("b", 3, FieldType::Bool),
            ],
        );
        let reg = b.build().expect("build");
        let schema = reg.get(m).expect("m");
        assert_eq!(schema.oneofs[0].fields, vec![1, 2]);
        assert_eq!(schema.fields[2].oneof, Some(0));
        assert_eq!(schema.fields[0].oneof, None);
    }

    #[test]
    fn build_rejects_duplicate_numbers_and_bad_ranges() {
        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.field(m, FieldDescriptor::optional("a", 1, FieldType::Int32))
            .field(m, FieldDescriptor::optional("b", 1, FieldType::Int32));
        let err = b.build().expect_err("duplicate number");
        assert!(err.to_string().contains("duplicate field number"));

        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.field(m, FieldDescriptor::optional("a", 1, FieldType::UInt32).with_range(-1, 5));
        let err = b.build().expect_err("range outside width");
        assert!(err.to_string().contains("does not fit"));

        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.field(m, FieldDescriptor::optional("s", 1, FieldType::String).with_range(0, 5));
        assert!(b.build().is_err());
    }

    #[test]
    fn oneof_member_cannot_be_required() {
        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.oneof(
            m,
            "g",
            true,
            vec![FieldDescriptor::required("a", 1, FieldType::Int64)],
        );
        let err = b.build().expect_err("required member");
        assert!(err.to_string().contains("singular optional"));
    }

    #[test]
    fn range_wraps_into_span() {
        let r = IntRange::new(-3, 4);
        assert_eq!(r.wrap(5), -3);
        assert_eq!(r.wrap(-4), 4);
        assert_eq!(r.wrap(0), 0);
        assert!(r.contains(r.wrap(1_000_003)));
    }

    #[test]
    fn schema_refs_compare_structurally_across_registries() {
        let build = || {
            let mut b = SchemaBuilder::new();
            let m = b.declare("M");
            b.field(m, FieldDescriptor::optional("a", 1, FieldType::Bool));
            b.build().expect("build")
        };
        let a = build().schema_ref("M").expect("a");
        let b = build().schema_ref("M").expect("b");
        assert!(a.same_schema(&b));
    }
}
