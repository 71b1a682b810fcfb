//! Recombination of two instances of the same message type.
//!
//! Singular fields come from either parent; when both parents carry the
//! same sub-message it is recombined recursively (bounded by `max_depth`).
//! Repeated fields take a prefix of one parent and a suffix of the other.
//! Oneof groups keep a single active member taken from one parent.

use crate::{Message, RandomSource, Slot, Value};

/// Call-scoped limits for one recombination.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CrossLimits {
    pub max_depth: usize,
    pub max_repeated_len: usize,
}

/// Builds a child of `receiver` and `donor`. Neither parent is modified.
pub(crate) fn recombine(
    rng: &mut RandomSource,
    receiver: &Message,
    donor: &Message,
    depth: usize,
    limits: CrossLimits,
) -> Message {
    let mut child = receiver.clone();
    let desc = receiver.descriptor();

    for (idx, field) in desc.fields.iter().enumerate() {
        if field.oneof.is_some() {
            continue;
        }
        let (Some(a), Some(b)) = (receiver.slot(idx), donor.slot(idx)) else {
            continue;
        };
        let merged = match (a, b) {
            (Slot::Repeated(xs), Slot::Repeated(ys)) => Slot::Repeated(splice(rng, xs, ys, limits)),
            (Slot::Single(x), Slot::Single(y)) => Slot::Single(pick_or_merge(rng, x, y, depth, limits)),
            _ => {
                if rng.coin() {
                    a.clone()
                } else {
                    b.clone()
                }
            }
        };
        if let Some(slot) = child.slot_mut(idx) {
            *slot = merged;
        }
    }

    for (group_idx, group) in desc.oneofs.iter().enumerate() {
        let from_receiver = receiver.active_oneof(group_idx);
        let from_donor = donor.active_oneof(group_idx);
        let chosen = match (from_receiver, from_donor) {
            (Some(x), Some(y)) if x == y => {
                let (Some(a), Some(b)) = (receiver.slot(x), donor.slot(y)) else {
                    continue;
                };
                match (a.single(), b.single()) {
                    (Some(va), Some(vb)) => Some((x, pick_or_merge(rng, va, vb, depth, limits))),
                    _ => continue,
                }
            }
            _ => {
                let (parent, active) = if rng.coin() {
                    (receiver, from_receiver)
                } else {
                    (donor, from_donor)
                };
                active.and_then(|idx| Some((idx, parent.slot(idx)?.single()?.clone())))
            }
        };
        for member in &group.fields {
            if let Some(slot) = child.slot_mut(*member) {
                *slot = Slot::Empty;
            }
        }
        if let Some((idx, value)) = chosen {
            if let Some(slot) = child.slot_mut(idx) {
                *slot = Slot::Single(value);
            }
        }
    }
    child
}

fn pick_or_merge(rng: &mut RandomSource, a: &Value, b: &Value, depth: usize, limits: CrossLimits) -> Value {
    if let (Value::Message(x), Value::Message(y)) = (a, b) {
        if depth < limits.max_depth {
            return Value::Message(Box::new(recombine(rng, x, y, depth + 1, limits)));
        }
    }
    if rng.coin() {
        a.clone()
    } else {
        b.clone()
    }
}

/// Prefix of one parent followed by a suffix of the other, truncated to the
/// configured maximum length.
fn splice(rng: &mut RandomSource, xs: &[Value], ys: &[Value], limits: CrossLimits) -> Vec<Value> {
    let (head, tail) = if rng.coin() { (xs, ys) } else { (ys, xs) };
    let cut = rng.in_range(0, head.len());
    let from = rng.in_range(0, tail.len());
    let mut out: Vec<Value> = head[..cut].iter().chain(&tail[from..]).cloned().collect();
    out.truncate(limits.max_repeated_len);
    out
}
