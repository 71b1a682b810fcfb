//! Per-scalar-kind mutation operators.
//!
//! [`MutationPolicy`] has one method per scalar kind, each with a default
//! implementation. Callers customize behavior by implementing the trait on
//! their own type and overriding only the kinds they care about; the free
//! functions in this module stay available for reuse inside overrides.

use crate::{FieldDescriptor, RandomSource, Value};

/// Largest add/subtract step for integer mutation.
pub const MAX_INT_DELTA: usize = 16;

/// Largest run inserted or substituted by one sequence mutation.
pub const MAX_SEQUENCE_RUN: usize = 8;

const SPECIAL_F32: [f32; 8] = [
    0.0,
    -0.0,
    f32::MIN,
    f32::MAX,
    f32::MIN_POSITIVE,
    f32::NAN,
    f32::INFINITY,
    f32::NEG_INFINITY,
];

const SPECIAL_F64: [f64; 8] = [
    0.0,
    -0.0,
    f64::MIN,
    f64::MAX,
    f64::MIN_POSITIVE,
    f64::NAN,
    f64::INFINITY,
    f64::NEG_INFINITY,
];

pub trait MutationPolicy: Send {
    /// Gate for enum indices past the declared values.
    fn allow_out_of_range_enums(&self) -> bool {
        false
    }

    /// Float mutation substitutes a special value once in this many draws.
    fn special_float_one_in(&self) -> u32 {
        16
    }

    fn mutate_i32(&mut self, rng: &mut RandomSource, value: i32) -> i32 {
        flip_or_nudge_i32(rng, value)
    }

    fn mutate_i64(&mut self, rng: &mut RandomSource, value: i64) -> i64 {
        flip_or_nudge_i64(rng, value)
    }

    fn mutate_u32(&mut self, rng: &mut RandomSource, value: u32) -> u32 {
        flip_or_nudge_u32(rng, value)
    }

    fn mutate_u64(&mut self, rng: &mut RandomSource, value: u64) -> u64 {
        flip_or_nudge_u64(rng, value)
    }

    fn mutate_f32(&mut self, rng: &mut RandomSource, value: f32) -> f32 {
        let one_in = self.special_float_one_in();
        mutate_float32(rng, value, one_in)
    }

    fn mutate_f64(&mut self, rng: &mut RandomSource, value: f64) -> f64 {
        let one_in = self.special_float_one_in();
        mutate_float64(rng, value, one_in)
    }

    fn mutate_bool(&mut self, _rng: &mut RandomSource, value: bool) -> bool {
        !value
    }

    /// `count` is the number of declared values.
    fn mutate_enum(&mut self, rng: &mut RandomSource, index: u32, count: u32) -> u32 {
        let allow = self.allow_out_of_range_enums();
        resample_enum(rng, index, count, allow)
    }

    /// `allowed_growth` bounds how many bytes the result may add.
    fn mutate_bytes(&mut self, rng: &mut RandomSource, value: &[u8], allowed_growth: usize) -> Vec<u8> {
        let mut out = value.to_vec();
        mutate_sequence(rng, &mut out, allowed_growth, |r| r.byte(), |r, b| *b ^= 1u8 << r.below(8));
        out
    }

    fn mutate_string(&mut self, rng: &mut RandomSource, value: &str, allowed_growth: usize) -> String {
        let mut chars: Vec<char> = value.chars().collect();
        mutate_sequence(rng, &mut chars, allowed_growth, random_ascii, flip_char);
        chars.into_iter().collect()
    }
}

/// Policy configured from [`crate::Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub allow_out_of_range_enums: bool,
    pub special_float_one_in: u32,
}

impl DefaultPolicy {
    pub fn from_config(config: &crate::Config) -> Self {
        Self {
            allow_out_of_range_enums: config.allow_out_of_range_enums,
            special_float_one_in: config.special_float_one_in.max(1),
        }
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::from_config(&crate::Config::default())
    }
}

impl MutationPolicy for DefaultPolicy {
    fn allow_out_of_range_enums(&self) -> bool {
        self.allow_out_of_range_enums
    }

    fn special_float_one_in(&self) -> u32 {
        self.special_float_one_in
    }
}

macro_rules! flip_or_nudge {
    ($name:ident, $ty:ty) => {
        /// Flips one bit or adds/subtracts a small delta, with equal probability.
        pub fn $name(rng: &mut RandomSource, value: $ty) -> $ty {
            if rng.coin() {
                value ^ ((1 as $ty) << rng.below(<$ty>::BITS as usize))
            } else {
                let delta = (1 + rng.below(MAX_INT_DELTA)) as $ty;
                if rng.coin() {
                    value.wrapping_add(delta)
                } else {
                    value.wrapping_sub(delta)
                }
            }
        }
    };
}

flip_or_nudge!(flip_or_nudge_i32, i32);
flip_or_nudge!(flip_or_nudge_i64, i64);
flip_or_nudge!(flip_or_nudge_u32, u32);
flip_or_nudge!(flip_or_nudge_u64, u64);

pub fn mutate_float32(rng: &mut RandomSource, value: f32, special_one_in: u32) -> f32 {
    if rng.chance(1, u64::from(special_one_in.max(1))) {
        return SPECIAL_F32[rng.below(SPECIAL_F32.len())];
    }
    f32::from_bits(value.to_bits() ^ (1u32 << rng.below(32)))
}

pub fn mutate_float64(rng: &mut RandomSource, value: f64, special_one_in: u32) -> f64 {
    if rng.chance(1, u64::from(special_one_in.max(1))) {
        return SPECIAL_F64[rng.below(SPECIAL_F64.len())];
    }
    f64::from_bits(value.to_bits() ^ (1u64 << rng.below(64)))
}

/// Uniform resample over `0..count`; with `allow_out_of_range`, one draw in
/// sixteen lands just past the declared values instead.
pub fn resample_enum(rng: &mut RandomSource, index: u32, count: u32, allow_out_of_range: bool) -> u32 {
    if allow_out_of_range && rng.chance(1, 16) {
        return count.saturating_add(rng.below(4) as u32);
    }
    if count == 0 {
        return index;
    }
    rng.below(count as usize) as u32
}

/// One of insert / remove / substitute-run / flip-in-place, chosen uniformly.
/// Inserts never add more than `allowed_growth` elements; with no allowance
/// an insert degrades to an in-place flip.
pub fn mutate_sequence<T>(
    rng: &mut RandomSource,
    items: &mut Vec<T>,
    allowed_growth: usize,
    mut fresh: impl FnMut(&mut RandomSource) -> T,
    mut flip: impl FnMut(&mut RandomSource, &mut T),
) {
    let mut choice = rng.below(4);
    if items.is_empty() {
        // Nothing to remove, substitute or flip.
        choice = 0;
    }
    if choice == 0 && allowed_growth == 0 {
        choice = 3;
    }
    match choice {
        0 => {
            let n = rng.in_range(1, allowed_growth.min(MAX_SEQUENCE_RUN));
            let at = rng.in_range(0, items.len());
            for k in 0..n {
                items.insert(at + k, fresh(rng));
            }
        }
        1 => {
            let at = rng.below(items.len());
            items.remove(at);
        }
        2 => {
            let start = rng.below(items.len());
            let run = rng.in_range(1, (items.len() - start).min(MAX_SEQUENCE_RUN));
            for item in &mut items[start..start + run] {
                *item = fresh(rng);
            }
        }
        _ => {
            if items.is_empty() {
                return;
            }
            let at = rng.below(items.len());
            flip(rng, &mut items[at]);
        }
    }
}

/// Printable ASCII, one byte when encoded.
pub fn random_ascii(rng: &mut RandomSource) -> char {
    char::from(0x20 + (rng.below(95) as u8))
}

/// Flips a low bit of an ASCII char; other chars become random ASCII.
pub fn flip_char(rng: &mut RandomSource, c: &mut char) {
    if c.is_ascii() {
        *c = char::from((*c as u8) ^ (1u8 << rng.below(7)));
    } else {
        *c = random_ascii(rng);
    }
}

/// Dispatches a scalar value to the policy operator for its kind.
/// Message values are returned unchanged.
pub(crate) fn mutate_scalar(
    policy: &mut dyn MutationPolicy,
    rng: &mut RandomSource,
    field: &FieldDescriptor,
    value: &Value,
    allowed_growth: usize,
) -> Value {
    match value {
        Value::Int32(v) => Value::Int32(policy.mutate_i32(rng, *v)),
        Value::Int64(v) => Value::Int64(policy.mutate_i64(rng, *v)),
        Value::UInt32(v) => Value::UInt32(policy.mutate_u32(rng, *v)),
        Value::UInt64(v) => Value::UInt64(policy.mutate_u64(rng, *v)),
        Value::Float(v) => Value::Float(policy.mutate_f32(rng, *v)),
        Value::Double(v) => Value::Double(policy.mutate_f64(rng, *v)),
        Value::Bool(v) => Value::Bool(policy.mutate_bool(rng, *v)),
        Value::Enum(v) => {
            let count = u32::try_from(field.ty.enum_len()).unwrap_or(u32::MAX);
            Value::Enum(policy.mutate_enum(rng, *v, count))
        }
        Value::Bytes(b) => Value::Bytes(policy.mutate_bytes(rng, b, allowed_growth)),
        Value::String(s) => Value::String(policy.mutate_string(rng, s, allowed_growth)),
        Value::Message(_) => value.clone(),
    }
}

/// A change to `value` that cannot grow its encoding. `None` when no such
/// change exists (zero integers, empty sequences).
pub(crate) fn size_neutral(rng: &mut RandomSource, value: &Value) -> Option<Value> {
    fn low_bit_flip(rng: &mut RandomSource, v: u64) -> Option<u64> {
        if v == 0 {
            return None;
        }
        let used = 64 - v.leading_zeros() as usize;
        Some(v ^ (1u64 << rng.below(used)))
    }
    let out = match value {
        Value::Int32(v) if *v < 0 => Value::Int32(v ^ (1i32 << rng.below(32))),
        Value::Int64(v) if *v < 0 => Value::Int64(v ^ (1i64 << rng.below(64))),
        Value::Int32(v) => Value::Int32(low_bit_flip(rng, *v as u64)? as i32),
        Value::Int64(v) => Value::Int64(low_bit_flip(rng, *v as u64)? as i64),
        Value::UInt32(v) => Value::UInt32(low_bit_flip(rng, u64::from(*v))? as u32),
        Value::UInt64(v) => Value::UInt64(low_bit_flip(rng, *v)?),
        Value::Enum(v) => Value::Enum(low_bit_flip(rng, u64::from(*v))? as u32),
        Value::Float(v) => Value::Float(f32::from_bits(v.to_bits() ^ (1u32 << rng.below(32)))),
        Value::Double(v) => Value::Double(f64::from_bits(v.to_bits() ^ (1u64 << rng.below(64)))),
        Value::Bool(v) => Value::Bool(!v),
        Value::Bytes(b) => {
            if b.is_empty() {
                return None;
            }
            let mut out = b.clone();
            let at = rng.below(out.len());
            out[at] ^= 1u8 << rng.below(8);
            Value::Bytes(out)
        }
        Value::String(s) => {
            if s.is_empty() {
                return None;
            }
            let mut chars: Vec<char> = s.chars().collect();
            let at = rng.below(chars.len());
            flip_char(rng, &mut chars[at]);
            Value::String(chars.into_iter().collect())
        }
        Value::Message(_) => return None,
    };
    Some(out)
}
