//! Structural edits on repeated fields and oneof groups.

use crate::message::value_field_len;
use crate::walker::{legalize, skip, MutationPass};
use crate::{FieldDescriptor, FieldType, Message, MutationOp, ProtomutResult, Slot, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepeatedOp {
    Append,
    Remove,
    Duplicate,
    Swap,
}

/// Applies one of append / remove / duplicate / swap to repeated field
/// `idx`, chosen uniformly among the operations that currently apply.
pub(crate) fn mutate_repeated(
    pass: &mut MutationPass<'_>,
    msg: &mut Message,
    idx: usize,
    path: &str,
) -> ProtomutResult<()> {
    let schema = msg.schema().clone();
    let field = &schema.descriptor().fields[idx];
    let len = msg.repeated(&field.name).len();
    let max_len = pass.config.max_repeated_len;

    // The appended element is built before choosing so its cost is known.
    let fresh = if len < max_len && constructible(pass, field) {
        Some(new_element(pass, msg, idx)?)
    } else {
        None
    };
    let fresh = fresh.filter(|v| pass.ctx.budget.allows(value_field_len(field.number, v)));

    let mut ops = Vec::with_capacity(4);
    if fresh.is_some() {
        ops.push(RepeatedOp::Append);
    }
    if len > 0 {
        ops.push(RepeatedOp::Remove);
    }
    if len > 0 && len < max_len {
        ops.push(RepeatedOp::Duplicate);
    }
    if len > 1 {
        ops.push(RepeatedOp::Swap);
    }
    if ops.is_empty() {
        skip(pass, path, "no applicable container operation");
        return Ok(());
    }
    let op = ops[pass.ctx.rng.below(ops.len())];

    let Some(Slot::Repeated(values)) = msg.slot_mut(idx) else {
        return Ok(());
    };
    match (op, fresh) {
        (RepeatedOp::Append, Some(value)) => {
            pass.ctx.budget.try_consume(value_field_len(field.number, &value));
            let at = pass.ctx.rng.in_range(0, values.len());
            values.insert(at, value);
            pass.log.push(format!("{path}[{at}]"), MutationOp::RepeatedAppend);
        }
        (RepeatedOp::Remove, _) => {
            let at = pass.ctx.rng.below(values.len());
            let removed = values.remove(at);
            pass.ctx.budget.credit(value_field_len(field.number, &removed));
            pass.log.push(path, MutationOp::RepeatedRemove { index: at });
        }
        (RepeatedOp::Duplicate, _) => {
            let from = pass.ctx.rng.below(values.len());
            let copy = values[from].clone();
            if pass.ctx.budget.try_consume(value_field_len(field.number, &copy)) {
                let to = pass.ctx.rng.in_range(0, values.len());
                values.insert(to, copy);
                pass.log.push(path, MutationOp::RepeatedDuplicate { from, to });
            } else if values.len() > 1 {
                let (a, b) = distinct_pair(pass, values.len());
                values.swap(a, b);
                pass.log.push(path, MutationOp::RepeatedSwap { a, b });
            } else {
                skip(pass, path, "budget");
            }
        }
        (RepeatedOp::Swap, _) => {
            let (a, b) = distinct_pair(pass, values.len());
            values.swap(a, b);
            pass.log.push(path, MutationOp::RepeatedSwap { a, b });
        }
        (RepeatedOp::Append, None) => {}
    }
    Ok(())
}

/// A new element for repeated field `idx`: a terminal-initialized message
/// one level down, or a default scalar run once through the policy.
fn new_element(pass: &mut MutationPass<'_>, msg: &Message, idx: usize) -> ProtomutResult<Value> {
    let base = crate::initializer::default_value(msg, idx, pass.ctx.depth, pass.ctx.max_depth)?;
    if matches!(base, Value::Message(_)) {
        return Ok(base);
    }
    let field = &msg.descriptor().fields[idx];
    let allowed = pass
        .ctx
        .budget
        .remaining()
        .saturating_sub(value_field_len(field.number, &base));
    let allow_enums = pass.policy.allow_out_of_range_enums();
    let mutated = crate::policy::mutate_scalar(pass.policy, pass.ctx.rng, field, &base, allowed);
    let value = legalize(field, mutated, allow_enums).unwrap_or_else(|| base.clone());
    if pass.ctx.budget.allows(value_field_len(field.number, &value)) {
        Ok(value)
    } else {
        Ok(base)
    }
}

/// Whether a fresh value of `field` can be built at the current depth.
fn constructible(pass: &MutationPass<'_>, field: &FieldDescriptor) -> bool {
    match field.ty {
        FieldType::Message(_) => pass.ctx.can_descend(),
        FieldType::Enum { .. } => field.ty.enum_len() > 0,
        _ => true,
    }
}

fn distinct_pair(pass: &mut MutationPass<'_>, len: usize) -> (usize, usize) {
    let a = pass.ctx.rng.below(len);
    let mut b = pass.ctx.rng.below(len - 1);
    if b >= a {
        b += 1;
    }
    (a, b)
}

/// Switches oneof `group` to another alternative with a default value, or
/// clears it when the group is not required.
pub(crate) fn mutate_oneof(
    pass: &mut MutationPass<'_>,
    msg: &mut Message,
    group: usize,
    path: &str,
) -> ProtomutResult<()> {
    let schema = msg.schema().clone();
    let desc = schema.descriptor();
    let oneof = &desc.oneofs[group];
    let active = msg.active_oneof(group);
    let current_len = active.map(|idx| msg.field_len(idx)).unwrap_or(0);

    let mut alternatives = Vec::new();
    for &idx in &oneof.fields {
        if Some(idx) == active {
            continue;
        }
        let field = &desc.fields[idx];
        if !constructible(pass, field) {
            continue;
        }
        let value = crate::initializer::default_value(msg, idx, pass.ctx.depth, pass.ctx.max_depth)?;
        let len = value_field_len(field.number, &value);
        if len <= current_len || pass.ctx.budget.allows(len - current_len) {
            alternatives.push((idx, value, len));
        }
    }
    let can_clear = active.is_some() && !oneof.required;

    let total = alternatives.len() + usize::from(can_clear);
    if total == 0 {
        skip(pass, path, "no alternative fits");
        return Ok(());
    }
    let pick = pass.ctx.rng.below(total);
    let from = active.map(|idx| desc.fields[idx].name.clone());
    if pick == alternatives.len() {
        if let Some(idx) = active {
            msg.clear_index(idx);
            pass.ctx.budget.credit(current_len);
            pass.log.push(
                path,
                MutationOp::OneofClear {
                    from: desc.fields[idx].name.clone(),
                },
            );
        }
        return Ok(());
    }
    let (idx, value, len) = alternatives.swap_remove(pick);
    pass.ctx.budget.apply_delta(current_len, len);
    msg.set_index(idx, value)?;
    pass.log.push(
        path,
        MutationOp::OneofSwitch {
            from,
            to: desc.fields[idx].name.clone(),
        },
    );
    Ok(())
}
