//! Fills required-but-absent sub-structures, bounded by a maximum depth.
//!
//! The root sits at depth 0. A message at depth `d < max_depth` gets its
//! required nested fields built recursively; a child created at
//! `max_depth` is a terminal default whose required scalars are filled but
//! whose required message fields stay absent. Self-referential schemas
//! therefore terminate without relying on the call stack.

use crate::{Message, ProtomutError, ProtomutResult, Slot, Value};

/// Initializes `msg` in place. On error the instance is left untouched.
pub fn initialize_message(msg: &mut Message, max_depth: usize) -> ProtomutResult<()> {
    let mut scratch = msg.clone();
    fill(&mut scratch, 0, max_depth)?;
    *msg = scratch;
    Ok(())
}

/// Builds a fresh instance of `msg`'s field `idx` type, initialized as if it
/// were placed at `depth`.
pub(crate) fn build_child(msg: &Message, idx: usize, depth: usize, max_depth: usize) -> ProtomutResult<Message> {
    let Some(schema) = msg.child_schema(idx) else {
        return Err(ProtomutError::InvalidArgument(format!(
            "{} field #{idx} is not a message",
            msg.schema().name()
        )));
    };
    let mut child = Message::new(schema);
    fill(&mut child, depth, max_depth)?;
    Ok(child)
}

/// Default value for field `idx` of `msg` when placed in a message at
/// `depth`; message-typed fields are built at `depth + 1`.
pub(crate) fn default_value(msg: &Message, idx: usize, depth: usize, max_depth: usize) -> ProtomutResult<Value> {
    let schema = msg.schema().clone();
    let field = &schema.descriptor().fields[idx];
    if field.ty.message_id().is_some() {
        return Ok(Value::Message(Box::new(build_child(msg, idx, depth + 1, max_depth)?)));
    }
    let value = Value::default_scalar(field).ok_or_else(|| {
        ProtomutError::SchemaViolation(format!("{}.{}: no default value", schema.name(), field.name))
    })?;
    if matches!(value, Value::Enum(_)) && field.ty.enum_len() == 0 {
        return Err(ProtomutError::SchemaViolation(format!(
            "{}.{}: enum declares no values",
            schema.name(),
            field.name
        )));
    }
    Ok(value)
}

pub(crate) fn fill(msg: &mut Message, depth: usize, max_depth: usize) -> ProtomutResult<()> {
    if depth > max_depth {
        return Ok(());
    }
    let schema = msg.schema().clone();
    let desc = schema.descriptor();

    // Existing sub-trees first, so bottom-up filling also repairs decoded input.
    for idx in 0..desc.fields.len() {
        if desc.fields[idx].ty.message_id().is_none() {
            continue;
        }
        match msg.slot_mut(idx) {
            Some(Slot::Single(Value::Message(child))) => fill(child, depth + 1, max_depth)?,
            Some(Slot::Repeated(values)) => {
                for v in values.iter_mut() {
                    if let Value::Message(child) = v {
                        fill(child, depth + 1, max_depth)?;
                    }
                }
            }
            _ => {}
        }
    }

    for (idx, field) in desc.fields.iter().enumerate() {
        if !field.is_required() || msg.slot(idx).is_some_and(Slot::is_set) {
            continue;
        }
        if field.ty.message_id().is_some() && depth >= max_depth {
            continue;
        }
        let value = default_value(msg, idx, depth, max_depth)?;
        msg.set_index(idx, value)?;
    }

    for (group_idx, group) in desc.oneofs.iter().enumerate() {
        if !group.required || msg.active_oneof(group_idx).is_some() {
            continue;
        }
        if !msg.oneof_required_here(group_idx, depth, max_depth) {
            continue;
        }
        let choice = group
            .fields
            .iter()
            .copied()
            .find(|idx| depth < max_depth || desc.fields[*idx].ty.message_id().is_none());
        let Some(idx) = choice else {
            return Err(ProtomutError::SchemaViolation(format!(
                "{}.{}: required oneof has no alternative legal at depth {depth}",
                desc.name, group.name
            )));
        };
        let value = default_value(msg, idx, depth, max_depth)?;
        msg.set_index(idx, value)?;
    }
    Ok(())
}
