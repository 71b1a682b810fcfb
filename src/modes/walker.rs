//! One mutation pass: site selection and dispatch.
//!
//! At each level the walker enumerates candidate sites (scalar fields,
//! absent or present sub-messages, repeated containers and their elements,
//! oneof groups) and picks one by weight. Leaf sites weigh `max_depth`;
//! descending into an existing sub-message weighs `max_depth - depth`, so
//! descent gets rarer near the bottom and stops at `max_depth`.

use crate::budget::MutationContext;
use crate::message::value_field_len;
use crate::policy::{mutate_scalar, size_neutral};
use crate::{Config, FieldDescriptor, Message, MutationLog, MutationOp, MutationPolicy, ProtomutResult, Slot, Value};

/// Everything one `mutate` call threads through its recursion.
pub(crate) struct MutationPass<'a> {
    pub ctx: MutationContext<'a>,
    pub policy: &'a mut dyn MutationPolicy,
    pub config: &'a Config,
    pub log: &'a mut MutationLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    /// Singular scalar field, set or not (or the active member of a oneof).
    Scalar(usize),
    /// Singular message field that is absent.
    Absent(usize),
    /// Singular message field that is present.
    Nested(usize),
    Repeated(usize),
    /// One element of a non-empty repeated field.
    Element(usize),
    Oneof(usize),
}

/// Runs the elementary mutations of one `mutate` call on `msg`.
pub(crate) fn run(pass: &mut MutationPass<'_>, msg: &mut Message) -> ProtomutResult<()> {
    let count = mutation_count(pass, msg.encoded_len());
    for _ in 0..count {
        step(pass, msg, "")?;
    }
    Ok(())
}

/// `1 + k` where `k` counts fair-coin successes, capped by the input size so
/// inputs under 64 bytes always get exactly one elementary mutation.
fn mutation_count(pass: &mut MutationPass<'_>, encoded_len: usize) -> usize {
    let cap = pass.config.max_mutations.saturating_sub(1).min(encoded_len / 64);
    let mut extra = 0usize;
    while extra < cap && pass.ctx.rng.coin() {
        extra += 1;
    }
    1 + extra
}

pub(crate) fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn sites(msg: &Message, ctx: &MutationContext<'_>) -> Vec<(Site, u64)> {
    let leaf = ctx.max_depth.max(1) as u64;
    let descend = ctx.depth_remaining() as u64;
    let desc = msg.descriptor();
    let mut out = Vec::new();

    for (idx, field) in desc.fields.iter().enumerate() {
        let is_message = field.ty.message_id().is_some();
        let slot = msg.slot(idx);
        if let Some(group) = field.oneof {
            if msg.active_oneof(group) == Some(idx) {
                if is_message {
                    if descend > 0 && has_fields(msg, idx) {
                        out.push((Site::Nested(idx), descend));
                    }
                } else {
                    out.push((Site::Scalar(idx), leaf));
                }
            }
            continue;
        }
        match slot {
            Some(Slot::Repeated(values)) => {
                out.push((Site::Repeated(idx), leaf));
                if !values.is_empty() {
                    if !is_message {
                        out.push((Site::Element(idx), leaf));
                    } else if descend > 0 && has_fields(msg, idx) {
                        out.push((Site::Element(idx), descend));
                    }
                }
            }
            Some(Slot::Single(_)) if is_message => {
                if descend > 0 && has_fields(msg, idx) {
                    out.push((Site::Nested(idx), descend));
                } else if !field.is_required() {
                    // Too deep to descend, but it can still be cleared.
                    out.push((Site::Nested(idx), leaf));
                }
            }
            Some(_) if is_message => {
                if ctx.can_descend() {
                    out.push((Site::Absent(idx), leaf));
                }
            }
            Some(_) => out.push((Site::Scalar(idx), leaf)),
            None => {}
        }
    }
    for group in 0..desc.oneofs.len() {
        out.push((Site::Oneof(group), leaf));
    }
    out
}

fn has_fields(msg: &Message, idx: usize) -> bool {
    msg.child_schema(idx)
        .is_some_and(|s| !s.descriptor().fields.is_empty())
}

fn step(pass: &mut MutationPass<'_>, msg: &mut Message, path: &str) -> ProtomutResult<()> {
    let candidates = sites(msg, &pass.ctx);
    let weights: Vec<u64> = candidates.iter().map(|(_, w)| *w).collect();
    let Some(pick) = pass.ctx.rng.weighted_index(&weights) else {
        return Ok(());
    };
    let schema = msg.schema().clone();
    let desc = schema.descriptor();
    match candidates[pick].0 {
        Site::Scalar(idx) => mutate_singular_scalar(pass, msg, idx, &join(path, &desc.fields[idx].name)),
        Site::Absent(idx) => create_message(pass, msg, idx, &join(path, &desc.fields[idx].name)),
        Site::Nested(idx) => nested(pass, msg, idx, &join(path, &desc.fields[idx].name)),
        Site::Repeated(idx) => {
            crate::container::mutate_repeated(pass, msg, idx, &join(path, &desc.fields[idx].name))
        }
        Site::Element(idx) => element(pass, msg, idx, &join(path, &desc.fields[idx].name)),
        Site::Oneof(group) => {
            crate::container::mutate_oneof(pass, msg, group, &join(path, &desc.oneofs[group].name))
        }
    }
}

fn mutate_singular_scalar(
    pass: &mut MutationPass<'_>,
    msg: &mut Message,
    idx: usize,
    path: &str,
) -> ProtomutResult<()> {
    let schema = msg.schema().clone();
    let field = &schema.descriptor().fields[idx];
    let current = msg.slot(idx).and_then(Slot::single).cloned();
    let Some(old) = current else {
        return set_absent_scalar(pass, msg, field, idx, path);
    };
    if !field.is_required() && field.oneof.is_none() && pass.ctx.rng.chance(1, 8) {
        let before = msg.field_len(idx);
        msg.clear_index(idx);
        pass.ctx.budget.credit(before);
        pass.log.push(path, MutationOp::FieldClear);
        return Ok(());
    }
    match mutate_value(pass, field, &old) {
        Some((value, op)) => {
            msg.set_index(idx, value)?;
            pass.log.push(path, op);
        }
        None => skip(pass, path, "budget"),
    }
    Ok(())
}

fn set_absent_scalar(
    pass: &mut MutationPass<'_>,
    msg: &mut Message,
    field: &FieldDescriptor,
    idx: usize,
    path: &str,
) -> ProtomutResult<()> {
    let Some(base) = Value::default_scalar(field) else {
        return Ok(());
    };
    if matches!(base, Value::Enum(_)) && field.ty.enum_len() == 0 {
        skip(pass, path, "enum declares no values");
        return Ok(());
    }
    let base_len = value_field_len(field.number, &base);
    let allowed = pass.ctx.budget.remaining().saturating_sub(base_len);
    let allow_enums = pass.policy.allow_out_of_range_enums();
    let mutated = mutate_scalar(pass.policy, pass.ctx.rng, field, &base, allowed);
    let fresh = legalize(field, mutated, allow_enums).unwrap_or_else(|| base.clone());
    for candidate in [fresh, base] {
        let cost = value_field_len(field.number, &candidate);
        if pass.ctx.budget.try_consume(cost) {
            msg.set_index(idx, candidate)?;
            pass.log.push(path, MutationOp::FieldSet);
            return Ok(());
        }
    }
    skip(pass, path, "budget");
    Ok(())
}

fn create_message(pass: &mut MutationPass<'_>, msg: &mut Message, idx: usize, path: &str) -> ProtomutResult<()> {
    let value = crate::initializer::default_value(msg, idx, pass.ctx.depth, pass.ctx.max_depth)?;
    let number = msg.descriptor().fields[idx].number;
    if !pass.ctx.budget.try_consume(value_field_len(number, &value)) {
        skip(pass, path, "budget");
        return Ok(());
    }
    msg.set_index(idx, value)?;
    pass.log.push(path, MutationOp::MessageCreate);
    Ok(())
}

fn nested(pass: &mut MutationPass<'_>, msg: &mut Message, idx: usize, path: &str) -> ProtomutResult<()> {
    let field = &msg.descriptor().fields[idx];
    let clearable = !field.is_required() && field.oneof.is_none();
    if clearable && (!pass.ctx.can_descend() || pass.ctx.rng.chance(1, 8)) {
        let before = msg.field_len(idx);
        msg.clear_index(idx);
        pass.ctx.budget.credit(before);
        pass.log.push(path, MutationOp::FieldClear);
        return Ok(());
    }
    if let Some(Slot::Single(Value::Message(child))) = msg.slot_mut(idx) {
        descend_into(pass, child, path)?;
    }
    Ok(())
}

fn element(pass: &mut MutationPass<'_>, msg: &mut Message, idx: usize, path: &str) -> ProtomutResult<()> {
    let schema = msg.schema().clone();
    let field = &schema.descriptor().fields[idx];
    let Some(Slot::Repeated(values)) = msg.slot_mut(idx) else {
        return Ok(());
    };
    if values.is_empty() {
        return Ok(());
    }
    let at = pass.ctx.rng.below(values.len());
    let elem_path = format!("{path}[{at}]");
    if let Value::Message(child) = &mut values[at] {
        return descend_into(pass, child, &elem_path);
    }
    let old = values[at].clone();
    match mutate_value(pass, field, &old) {
        Some((value, op)) => {
            values[at] = value;
            pass.log.push(elem_path, op);
        }
        None => skip(pass, &elem_path, "budget"),
    }
    Ok(())
}

fn descend_into(pass: &mut MutationPass<'_>, child: &mut Message, path: &str) -> ProtomutResult<()> {
    pass.ctx.depth += 1;
    let out = step(pass, child, path);
    pass.ctx.depth -= 1;
    out
}

/// Mutates one scalar through the policy, keeping the result legal and the
/// growth within budget. Falls back to a size-neutral flip when the policy
/// result does not fit; `None` when nothing fits.
pub(crate) fn mutate_value(
    pass: &mut MutationPass<'_>,
    field: &FieldDescriptor,
    old: &Value,
) -> Option<(Value, MutationOp)> {
    let before = value_field_len(field.number, old);
    let allowed = pass.ctx.budget.remaining();
    let allow_enums = pass.policy.allow_out_of_range_enums();
    let raw = mutate_scalar(pass.policy, pass.ctx.rng, field, old, allowed);
    if let Some(candidate) = legalize(field, raw, allow_enums) {
        let after = value_field_len(field.number, &candidate);
        if after <= before || pass.ctx.budget.allows(after - before) {
            pass.ctx.budget.apply_delta(before, after);
            return Some((candidate, MutationOp::ScalarMutate));
        }
    }
    let neutral = size_neutral(pass.ctx.rng, old).and_then(|v| legalize(field, v, allow_enums))?;
    let after = value_field_len(field.number, &neutral);
    if pass.ctx.budget.apply_delta(before, after) {
        return Some((neutral, MutationOp::ScalarNeutral));
    }
    None
}

/// Maps a mutated scalar back into its field's declared domain.
pub(crate) fn legalize(field: &FieldDescriptor, value: Value, allow_enums: bool) -> Option<Value> {
    if let (Some(v), Some(range)) = (value.as_i128(), field.range) {
        return value.with_i128(range.wrap(v));
    }
    if let Value::Enum(index) = value {
        let count = field.ty.enum_len();
        if !allow_enums && index as usize >= count {
            if count == 0 {
                return None;
            }
            return Some(Value::Enum((index as usize % count) as u32));
        }
    }
    Some(value)
}

pub(crate) fn skip(pass: &mut MutationPass<'_>, path: &str, reason: &str) {
    pass.log.push(
        path,
        MutationOp::Skipped {
            reason: reason.to_string(),
        },
    );
}
