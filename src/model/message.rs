//! Live instances conforming to a schema.
//!
//! A [`Message`] keeps one [`Slot`] per field of its type. Sizes are
//! estimated with protobuf-style wire lengths so the engine can account
//! growth against a size budget without a concrete encoder.

use std::fmt;

use crate::{FieldDescriptor, FieldType, MessageSchema, ProtomutError, ProtomutResult, SchemaRef};

#[derive(Clone)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    /// Index into the field's declared enum values.
    Enum(u32),
    Bytes(Vec<u8>),
    String(String),
    Message(Box<Message>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::UInt32(_) => "uint32",
            Self::UInt64(_) => "uint64",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::Enum(_) => "enum",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Message(_) => "message",
        }
    }

    /// Default value of a scalar field, clamped into its declared range.
    /// `None` for message-typed fields.
    pub fn default_scalar(field: &FieldDescriptor) -> Option<Value> {
        let zero = field.effective_range().map(|r| r.clamp(0)).unwrap_or(0);
        let value = match &field.ty {
            FieldType::Int32 => Value::Int32(zero as i32),
            FieldType::Int64 => Value::Int64(zero as i64),
            FieldType::UInt32 => Value::UInt32(zero as u32),
            FieldType::UInt64 => Value::UInt64(zero as u64),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Enum { .. } => Value::Enum(0),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::String => Value::String(String::new()),
            FieldType::Message(_) => return None,
        };
        Some(value)
    }

    /// Integer payload widened to i128.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int32(v) => Some(i128::from(*v)),
            Self::Int64(v) => Some(i128::from(*v)),
            Self::UInt32(v) => Some(i128::from(*v)),
            Self::UInt64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Rebuilds an integer value of the same kind from an in-range i128.
    pub(crate) fn with_i128(&self, v: i128) -> Option<Value> {
        match self {
            Self::Int32(_) => i32::try_from(v).ok().map(Self::Int32),
            Self::Int64(_) => i64::try_from(v).ok().map(Self::Int64),
            Self::UInt32(_) => u32::try_from(v).ok().map(Self::UInt32),
            Self::UInt64(_) => u64::try_from(v).ok().map(Self::UInt64),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    fn matches(&self, ty: &FieldType, owner: &SchemaRef) -> bool {
        match (self, ty) {
            (Self::Int32(_), FieldType::Int32)
            | (Self::Int64(_), FieldType::Int64)
            | (Self::UInt32(_), FieldType::UInt32)
            | (Self::UInt64(_), FieldType::UInt64)
            | (Self::Float(_), FieldType::Float)
            | (Self::Double(_), FieldType::Double)
            | (Self::Bool(_), FieldType::Bool)
            | (Self::Enum(_), FieldType::Enum { .. })
            | (Self::Bytes(_), FieldType::Bytes)
            | (Self::String(_), FieldType::String) => true,
            (Self::Message(m), FieldType::Message(id)) => m.schema().same_schema(&owner.sibling(*id)),
            _ => false,
        }
    }

    /// Wire length of the value without its tag.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Int32(v) if *v < 0 => 10,
            Self::Int64(v) if *v < 0 => 10,
            Self::Int32(v) => varint_len(*v as u64),
            Self::Int64(v) => varint_len(*v as u64),
            Self::UInt32(v) => varint_len(u64::from(*v)),
            Self::UInt64(v) => varint_len(*v),
            Self::Float(_) => 4,
            Self::Double(_) => 8,
            Self::Bool(_) => 1,
            Self::Enum(v) => varint_len(u64::from(*v)),
            Self::Bytes(b) => varint_len(b.len() as u64) + b.len(),
            Self::String(s) => varint_len(s.len() as u64) + s.len(),
            Self::Message(m) => {
                let len = m.encoded_len();
                varint_len(len as u64) + len
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::UInt32(a), Self::UInt32(b)) => a == b,
            (Self::UInt64(a), Self::UInt64(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Message(a), Self::Message(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}i32"),
            Self::Int64(v) => write!(f, "{v}i64"),
            Self::UInt32(v) => write!(f, "{v}u32"),
            Self::UInt64(v) => write!(f, "{v}u64"),
            Self::Float(v) => write!(f, "{v:?}f32"),
            Self::Double(v) => write!(f, "{v:?}f64"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "enum#{v}"),
            Self::Bytes(b) => write!(f, "b\"{}\"", hex::encode(b)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Message(m) => m.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Empty,
    Single(Value),
    Repeated(Vec<Value>),
}

impl Slot {
    pub fn single(&self) -> Option<&Value> {
        match self {
            Self::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Single(_))
    }
}

#[derive(Clone, PartialEq)]
pub struct Message {
    schema: SchemaRef,
    slots: Vec<Slot>,
}

impl Message {
    pub fn new(schema: SchemaRef) -> Self {
        let slots = schema
            .descriptor()
            .fields
            .iter()
            .map(|f| if f.is_repeated() { Slot::Repeated(Vec::new()) } else { Slot::Empty })
            .collect();
        Self { schema, slots }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn descriptor(&self) -> &MessageSchema {
        self.schema.descriptor()
    }

    pub fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx)
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot> {
        self.slots.get_mut(idx)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// A fresh, empty instance of the type referenced by field `idx`.
    pub(crate) fn child_schema(&self, idx: usize) -> Option<SchemaRef> {
        let id = self.descriptor().fields.get(idx)?.ty.message_id()?;
        Some(self.schema.sibling(id))
    }

    fn index_of(&self, name: &str) -> ProtomutResult<usize> {
        self.descriptor().field_index(name).ok_or_else(|| {
            ProtomutError::InvalidArgument(format!("{} has no field {name:?}", self.schema.name()))
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.descriptor().field_index(name)?;
        self.slots.get(idx)?.single()
    }

    pub fn repeated(&self, name: &str) -> &[Value] {
        let Some(idx) = self.descriptor().field_index(name) else {
            return &[];
        };
        match self.slots.get(idx) {
            Some(Slot::Repeated(values)) => values,
            _ => &[],
        }
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: Value) -> ProtomutResult<()> {
        let idx = self.index_of(name)?;
        self.set_index(idx, value)
    }

    pub fn push(&mut self, name: &str, value: Value) -> ProtomutResult<()> {
        let idx = self.index_of(name)?;
        self.check_value(idx, &value)?;
        match self.slots.get_mut(idx) {
            Some(Slot::Repeated(values)) => {
                values.push(value);
                Ok(())
            }
            _ => Err(ProtomutError::InvalidArgument(format!(
                "{}.{name} is not repeated",
                self.schema.name()
            ))),
        }
    }

    pub fn clear(&mut self, name: &str) -> ProtomutResult<()> {
        let idx = self.index_of(name)?;
        self.clear_index(idx);
        Ok(())
    }

    /// Sets a singular field; setting a oneof member deactivates its siblings.
    pub fn set_index(&mut self, idx: usize, value: Value) -> ProtomutResult<()> {
        self.check_value(idx, &value)?;
        let schema = self.schema.clone();
        let field = &schema.descriptor().fields[idx];
        if field.is_repeated() {
            return Err(ProtomutError::InvalidArgument(format!(
                "{}.{} is repeated",
                schema.name(),
                field.name
            )));
        }
        if let Some(group) = field.oneof {
            for member in &schema.descriptor().oneofs[group].fields {
                self.slots[*member] = Slot::Empty;
            }
        }
        self.slots[idx] = Slot::Single(value);
        Ok(())
    }

    pub(crate) fn clear_index(&mut self, idx: usize) {
        let repeated = self.descriptor().fields.get(idx).is_some_and(|f| f.is_repeated());
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = if repeated { Slot::Repeated(Vec::new()) } else { Slot::Empty };
        }
    }

    fn check_value(&self, idx: usize, value: &Value) -> ProtomutResult<()> {
        let Some(field) = self.descriptor().fields.get(idx) else {
            return Err(ProtomutError::InvalidArgument(format!(
                "{} has no field #{idx}",
                self.schema.name()
            )));
        };
        if !value.matches(&field.ty, &self.schema) {
            return Err(ProtomutError::InvalidArgument(format!(
                "{}.{} expects {}, got {}",
                self.schema.name(),
                field.name,
                field.ty.name(),
                value.kind_name()
            )));
        }
        Ok(())
    }

    /// Index of the active member of oneof `group`, if any.
    pub fn active_oneof(&self, group: usize) -> Option<usize> {
        let oneof = self.descriptor().oneofs.get(group)?;
        oneof
            .fields
            .iter()
            .copied()
            .find(|idx| self.slots.get(*idx).is_some_and(Slot::is_set))
    }

    /// Estimated serialized size of the whole message.
    pub fn encoded_len(&self) -> usize {
        (0..self.slots.len()).map(|idx| self.field_len(idx)).sum()
    }

    /// Estimated serialized size contributed by field `idx`.
    pub fn field_len(&self, idx: usize) -> usize {
        let Some(field) = self.descriptor().fields.get(idx) else {
            return 0;
        };
        match &self.slots[idx] {
            Slot::Empty => 0,
            Slot::Single(v) => value_field_len(field.number, v),
            Slot::Repeated(values) => values.iter().map(|v| value_field_len(field.number, v)).sum(),
        }
    }

    /// Nesting depth in edges; a message without sub-messages has depth 0.
    pub fn depth(&self) -> usize {
        let mut deepest = 0usize;
        for slot in &self.slots {
            let values: &[Value] = match slot {
                Slot::Empty => &[],
                Slot::Single(v) => std::slice::from_ref(v),
                Slot::Repeated(values) => values,
            };
            for v in values {
                if let Value::Message(m) = v {
                    deepest = deepest.max(1 + m.depth());
                }
            }
        }
        deepest
    }

    /// Checks structural validity down to `max_depth`.
    pub fn validate(&self, max_depth: usize, allow_out_of_range_enums: bool) -> ProtomutResult<()> {
        let path = self.schema.name().to_string();
        self.check(&path, 0, max_depth, allow_out_of_range_enums)
    }

    fn check(&self, path: &str, depth: usize, max_depth: usize, allow_enums: bool) -> ProtomutResult<()> {
        let schema = self.descriptor();
        if self.slots.len() != schema.fields.len() {
            return Err(ProtomutError::SchemaViolation(format!(
                "{path}: slot count {} does not match {} fields",
                self.slots.len(),
                schema.fields.len()
            )));
        }
        for (idx, field) in schema.fields.iter().enumerate() {
            let at = format!("{path}.{}", field.name);
            match (&self.slots[idx], field.is_repeated()) {
                (Slot::Repeated(values), true) => {
                    for (i, v) in values.iter().enumerate() {
                        self.check_field_value(&format!("{at}[{i}]"), field, v, depth, max_depth, allow_enums)?;
                    }
                }
                (Slot::Single(v), false) => {
                    self.check_field_value(&at, field, v, depth, max_depth, allow_enums)?;
                }
                (Slot::Empty, false) => {
                    if field.is_required() && required_here(field, depth, max_depth) {
                        return Err(ProtomutError::SchemaViolation(format!(
                            "{at}: required field missing"
                        )));
                    }
                }
                _ => {
                    return Err(ProtomutError::SchemaViolation(format!(
                        "{at}: slot shape does not match cardinality"
                    )));
                }
            }
        }
        for (group_idx, group) in schema.oneofs.iter().enumerate() {
            let active = group
                .fields
                .iter()
                .filter(|idx| self.slots[**idx].is_set())
                .count();
            if active > 1 {
                return Err(ProtomutError::SchemaViolation(format!(
                    "{path}.{}: {active} alternatives active",
                    group.name
                )));
            }
            if active == 0 && group.required && self.oneof_required_here(group_idx, depth, max_depth) {
                return Err(ProtomutError::SchemaViolation(format!(
                    "{path}.{}: required oneof has no active alternative",
                    group.name
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn oneof_required_here(&self, group: usize, depth: usize, max_depth: usize) -> bool {
        if depth > max_depth {
            return false;
        }
        if depth < max_depth {
            return true;
        }
        let schema = self.descriptor();
        schema.oneofs[group]
            .fields
            .iter()
            .any(|idx| schema.fields[*idx].ty.message_id().is_none())
    }

    fn check_field_value(
        &self,
        at: &str,
        field: &FieldDescriptor,
        value: &Value,
        depth: usize,
        max_depth: usize,
        allow_enums: bool,
    ) -> ProtomutResult<()> {
        if !value.matches(&field.ty, &self.schema) {
            return Err(ProtomutError::SchemaViolation(format!(
                "{at}: expected {}, found {}",
                field.ty.name(),
                value.kind_name()
            )));
        }
        if let (Some(v), Some(range)) = (value.as_i128(), field.range) {
            if !range.contains(v) {
                return Err(ProtomutError::SchemaViolation(format!(
                    "{at}: {v} outside {}..={}",
                    range.min, range.max
                )));
            }
        }
        if let Value::Enum(index) = value {
            if !allow_enums && *index as usize >= field.ty.enum_len() {
                return Err(ProtomutError::SchemaViolation(format!(
                    "{at}: enum index {index} out of range"
                )));
            }
        }
        if let Value::Message(m) = value {
            m.check(at, depth + 1, max_depth, allow_enums)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.schema.name());
        for (field, slot) in self.descriptor().fields.iter().zip(&self.slots) {
            match slot {
                Slot::Empty => {}
                Slot::Single(v) => {
                    s.field(&field.name, v);
                }
                Slot::Repeated(values) => {
                    s.field(&field.name, values);
                }
            }
        }
        s.finish()
    }
}

/// Whether a missing required field at `depth` breaks validity.
pub(crate) fn required_here(field: &FieldDescriptor, depth: usize, max_depth: usize) -> bool {
    match field.ty {
        FieldType::Message(_) => depth < max_depth,
        _ => depth <= max_depth,
    }
}

pub fn varint_len(v: u64) -> usize {
    if v == 0 {
        return 1;
    }
    let bits = 64 - v.leading_zeros() as usize;
    bits.div_ceil(7)
}

pub fn tag_len(number: u32) -> usize {
    varint_len(u64::from(number) << 3)
}

/// Size of one occurrence of a field: tag plus payload.
pub fn value_field_len(number: u32, value: &Value) -> usize {
    tag_len(number) + value.payload_len()
}
