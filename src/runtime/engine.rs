//! Top-level mutation engine: one seeded random stream, one policy, one
//! configuration, and the log of the last call.

use std::fmt;

use crate::budget::MutationContext;
use crate::crossover::{recombine, CrossLimits};
use crate::walker::MutationPass;
use crate::{
    Config, DefaultPolicy, Message, MutationLog, MutationPolicy, MutationRecord, ProtomutError,
    ProtomutResult, RandomSource,
};

/// Structure-aware mutator for schema-typed instances.
///
/// Every call draws from the same owned random stream, so two engines built
/// from the same seed and driven through the same call sequence on equal
/// inputs produce identical outputs. An engine is not meant to be shared
/// across threads; give each fuzzing worker its own.
pub struct Mutator {
    rng: RandomSource,
    config: Config,
    policy: Box<dyn MutationPolicy>,
    log: MutationLog,
}

impl Mutator {
    pub fn new(seed: u32) -> Self {
        Self::with_config(seed, Config::default())
    }

    pub fn with_config(seed: u32, config: Config) -> Self {
        let policy = DefaultPolicy::from_config(&config);
        Self {
            rng: RandomSource::from_seed(seed),
            config,
            policy: Box::new(policy),
            log: MutationLog::default(),
        }
    }

    /// Replaces the scalar mutation policy.
    pub fn with_policy(mut self, policy: impl MutationPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Random draws taken so far.
    pub fn rng_draws(&self) -> u64 {
        self.rng.draws()
    }

    /// Elementary mutations applied by the last `mutate` call.
    pub fn last_mutations(&self) -> &[MutationRecord] {
        &self.log.records
    }

    pub fn last_log(&self) -> &MutationLog {
        &self.log
    }

    /// Performs one mutation pass on `msg`.
    ///
    /// `size_increase_hint` bounds how many bytes the pass may add to the
    /// estimated encoding; it is advisory. On error `msg` is left exactly as
    /// it was.
    pub fn mutate(&mut self, msg: &mut Message, size_increase_hint: usize) -> ProtomutResult<()> {
        self.log.clear();
        let before_len = msg.encoded_len();
        let mut work = msg.clone();
        if self.config.keep_initialized {
            crate::initializer::fill(&mut work, 0, self.config.max_depth)?;
        }

        let mut pass = MutationPass {
            ctx: MutationContext::new(&mut self.rng, size_increase_hint, self.config.max_depth),
            policy: &mut *self.policy,
            config: &self.config,
            log: &mut self.log,
        };
        crate::walker::run(&mut pass, &mut work)?;
        let budget = pass.ctx.budget;

        tracing::debug!(
            schema = %msg.schema().name(),
            hint = size_increase_hint,
            before = before_len,
            after = work.encoded_len(),
            consumed = budget.consumed(),
            refused = budget.refused(),
            exhausted = budget.is_exhausted(),
            mutations = self.log.len(),
            growth_ops = self.log.iter().filter(|r| r.op.is_growth()).count(),
            "mutate"
        );
        *msg = work;
        Ok(())
    }

    /// Replaces `msg` with a recombination of `msg` and `with`.
    ///
    /// Fails with [`ProtomutError::CrossOverMismatch`] when the two instances
    /// have different schemas; on any failure `msg` is unchanged.
    pub fn cross_over(&mut self, with: &Message, msg: &mut Message) -> ProtomutResult<()> {
        if !msg.schema().same_schema(with.schema()) {
            return Err(ProtomutError::CrossOverMismatch(format!(
                "{} vs {}",
                msg.schema().name(),
                with.schema().name()
            )));
        }
        let limits = CrossLimits {
            max_depth: self.config.max_depth,
            max_repeated_len: self.config.max_repeated_len,
        };
        let child = recombine(&mut self.rng, msg, with, 0, limits);
        child.validate(self.config.max_depth, self.policy.allow_out_of_range_enums())?;
        tracing::debug!(
            schema = %msg.schema().name(),
            before = msg.encoded_len(),
            after = child.encoded_len(),
            "cross_over"
        );
        *msg = child;
        Ok(())
    }

    /// Returns a fresh recombination of `a` and `b`, leaving both untouched.
    pub fn cross_over_into(&mut self, a: &Message, b: &Message) -> ProtomutResult<Message> {
        let mut out = a.clone();
        self.cross_over(b, &mut out)?;
        Ok(out)
    }

    /// Fills required fields of `msg`, never building past `max_depth`.
    ///
    /// Draws no randomness and leaves the engine untouched; it sits here next
    /// to `mutate` for API symmetry and forwards to [`crate::initialize_message`].
    pub fn initialize_message(&self, msg: &mut Message, max_depth: usize) -> ProtomutResult<()> {
        crate::initializer::initialize_message(msg, max_depth)
    }
}

impl fmt::Debug for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutator")
            .field("config", &self.config)
            .field("rng_draws", &self.rng.draws())
            .field("last_mutations", &self.log.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldDescriptor, FieldType, SchemaBuilder, SchemaRef, Value};

    fn schema() -> SchemaRef {
        let mut b = SchemaBuilder::new();
        let m = b.declare("Packet");
        b.field(m, FieldDescriptor::required("id", 1, FieldType::UInt32))
            .field(m, FieldDescriptor::optional("level", 2, FieldType::Int32).with_range(-5, 5))
            .field(m, FieldDescriptor::repeated("payload", 3, FieldType::Bytes))
            .field(m, FieldDescriptor::optional("inner", 4, FieldType::Message(m)));
        b.build().expect("build").schema_ref("Packet").expect("Packet")
    }

    #[test]
    fn mutate_fills_required_and_logs() {
        let mut engine = Mutator::new(7);
        let mut msg = Message::new(schema());
        engine.mutate(&mut msg, 32).expect("mutate");
        assert!(msg.is_set("id"));
        assert!(!engine.last_mutations().is_empty());
        msg.validate(engine.config().max_depth, false).expect("valid");
    }

    #[test]
    fn failing_mutate_leaves_instance_untouched() {
        let mut b = SchemaBuilder::new();
        let m = b.declare("M");
        b.field(m, FieldDescriptor::required("mode", 1, FieldType::enumeration(Vec::<String>::new())));
        let schema = b.build().expect("build").schema_ref("M").expect("M");
        let mut msg = Message::new(schema);
        let before = msg.clone();
        let mut engine = Mutator::new(1);
        let err = engine.mutate(&mut msg, 8).expect_err("unsatisfiable");
        assert!(matches!(err, ProtomutError::SchemaViolation(_)));
        assert_eq!(msg, before);
    }

    #[test]
    fn cross_over_rejects_other_schema() {
        let mut b = SchemaBuilder::new();
        let other = b.declare("Other");
        b.field(other, FieldDescriptor::optional("x", 1, FieldType::Bool));
        let other = b.build().expect("build").schema_ref("Other").expect("Other");

        let mut engine = Mutator::new(3);
        let mut msg = Message::new(schema());
        msg.set("id", Value::UInt32(4)).expect("id");
        let before = msg.clone();
        let with = Message::new(other);
        let err = engine.cross_over(&with, &mut msg).expect_err("mismatch");
        assert!(matches!(err, ProtomutError::CrossOverMismatch(_)));
        assert_eq!(msg, before);
    }

    #[test]
    fn cross_over_accepts_enums_the_policy_allows() {
        struct Wide;
        impl MutationPolicy for Wide {
            fn allow_out_of_range_enums(&self) -> bool {
                true
            }

            fn mutate_enum(&mut self, _rng: &mut RandomSource, _index: u32, count: u32) -> u32 {
                count + 1
            }
        }

        let mut b = SchemaBuilder::new();
        let m = b.declare("E");
        b.field(m, FieldDescriptor::required("e", 1, FieldType::enumeration(["A", "B"])));
        let schema = b.build().expect("build").schema_ref("E").expect("E");

        let mut engine = Mutator::new(1).with_policy(Wide);
        let mut msg = Message::new(schema);
        engine.mutate(&mut msg, 8).expect("mutate");
        assert_eq!(msg.get("e"), Some(&Value::Enum(3)));

        let copy = msg.clone();
        engine.cross_over(&copy, &mut msg).expect("same instance crosses over");
        assert_eq!(msg.get("e"), Some(&Value::Enum(3)));
    }

    #[test]
    fn rng_only_advances() {
        let mut engine = Mutator::new(11);
        let mut msg = Message::new(schema());
        let mut last = engine.rng_draws();
        for _ in 0..8 {
            engine.mutate(&mut msg, 16).expect("mutate");
            assert!(engine.rng_draws() >= last);
            last = engine.rng_draws();
        }
        assert!(last > 0);
    }
}
