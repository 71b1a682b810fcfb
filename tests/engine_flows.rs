use std::path::PathBuf;

use proptest::prelude::*;
use protomut::{
    Config, FieldDescriptor, FieldType, JsonCodec, Message, MessageCodec, MutationOp, MutationPolicy,
    Mutator, ProtomutError, RandomSource, SchemaBuilder, SchemaDoc, SchemaRef, Value,
};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

fn tree_schema() -> SchemaRef {
    SchemaDoc::load(&fixture_path("tree.schema.json"))
        .expect("load schema")
        .root_ref(None)
        .expect("root")
}

fn tree_sample() -> Message {
    let codec = JsonCodec::new(tree_schema());
    let bytes = std::fs::read(fixture_path("tree.sample.json")).expect("read sample");
    codec.decode(&bytes).expect("decode sample")
}

fn small_config() -> Config {
    Config {
        max_depth: 4,
        max_repeated_len: 8,
        ..Config::default()
    }
}

/// No nested messages, so field-level size accounting is exact.
fn flat_schema() -> SchemaRef {
    let mut b = SchemaBuilder::new();
    let m = b.declare("Flat");
    b.field(m, FieldDescriptor::required("id", 1, FieldType::UInt64))
        .field(m, FieldDescriptor::optional("delta", 2, FieldType::Int32))
        .field(m, FieldDescriptor::optional("ratio", 3, FieldType::Float))
        .field(m, FieldDescriptor::repeated("names", 4, FieldType::String))
        .field(m, FieldDescriptor::repeated("blobs", 5, FieldType::Bytes))
        .field(m, FieldDescriptor::repeated("levels", 6, FieldType::Int64).with_range(-3, 300))
        .oneof(
            m,
            "choice",
            false,
            vec![
                FieldDescriptor::optional("flag", 7, FieldType::Bool),
                FieldDescriptor::optional("note", 8, FieldType::String),
            ],
        );
    b.build().expect("build").schema_ref("Flat").expect("Flat")
}

fn initialized(schema: SchemaRef, max_depth: usize) -> Message {
    let mut msg = Message::new(schema);
    protomut::initialize_message(&mut msg, max_depth).expect("init");
    msg
}

#[test]
fn unset_optional_integer_stays_unset_or_in_range() {
    let mut b = SchemaBuilder::new();
    let m = b.declare("Knob");
    b.field(m, FieldDescriptor::optional("level", 1, FieldType::Int32).with_range(10, 20));
    let schema = b.build().expect("build").schema_ref("Knob").expect("Knob");

    let mut engine = Mutator::new(1);
    let mut msg = Message::new(schema.clone());
    engine.mutate(&mut msg, 0).expect("mutate");
    if let Some(v) = msg.get("level") {
        let Value::Int32(v) = v else {
            panic!("unexpected kind {v:?}");
        };
        assert!((10..=20).contains(v));
    }

    for seed in 0..200 {
        let mut engine = Mutator::new(seed);
        let mut msg = Message::new(schema.clone());
        for _ in 0..10 {
            engine.mutate(&mut msg, 16).expect("mutate");
            if let Some(Value::Int32(v)) = msg.get("level") {
                assert!((10..=20).contains(v), "seed {seed}: {v}");
            }
        }
    }
}

#[test]
fn self_referential_initialization_stops_at_max_depth() {
    let mut b = SchemaBuilder::new();
    let node = b.declare("Node");
    b.field(node, FieldDescriptor::required("value", 1, FieldType::Int32))
        .field(node, FieldDescriptor::required("next", 2, FieldType::Message(node)));
    let schema = b.build().expect("build").schema_ref("Node").expect("Node");

    let engine = Mutator::new(2);
    let mut msg = Message::new(schema);
    engine.initialize_message(&mut msg, 4).expect("init");
    assert_eq!(msg.depth(), 4);
    msg.validate(4, false).expect("valid");
}

#[test]
fn cross_over_keeps_exactly_one_parent_alternative() {
    let schema = flat_schema();
    let mut a = initialized(schema.clone(), 4);
    let mut b = a.clone();
    a.set("flag", Value::Bool(true)).expect("flag");
    b.set("note", Value::String("n".into())).expect("note");

    let mut seen = (false, false);
    for seed in 0..64 {
        let mut engine = Mutator::new(seed);
        let child = engine.cross_over_into(&a, &b).expect("cross over");
        let flag = child.get("flag");
        let note = child.get("note");
        match (flag, note) {
            (Some(v), None) => {
                assert_eq!(v, &Value::Bool(true));
                seen.0 = true;
            }
            (None, Some(v)) => {
                assert_eq!(v, &Value::String("n".into()));
                seen.1 = true;
            }
            other => panic!("seed {seed}: {other:?}"),
        }
    }
    assert_eq!(seen, (true, true));
}

#[test]
fn repeated_container_grows_and_shrinks() {
    let mut b = SchemaBuilder::new();
    let m = b.declare("Bag");
    b.field(m, FieldDescriptor::repeated("items", 1, FieldType::Int32));
    let schema = b.build().expect("build").schema_ref("Bag").expect("Bag");

    let mut engine = Mutator::new(4);
    let mut msg = Message::new(schema);
    let (mut appends, mut removes) = (0, 0);
    for _ in 0..100 {
        engine.mutate(&mut msg, 1024).expect("mutate");
        for record in engine.last_mutations() {
            match record.op {
                MutationOp::RepeatedAppend => appends += 1,
                MutationOp::RepeatedRemove { .. } => removes += 1,
                _ => {}
            }
        }
        assert!(msg.repeated("items").len() <= Config::default().max_repeated_len);
    }
    assert!(appends > 0, "no appends observed");
    assert!(removes > 0, "no removes observed");
}

#[test]
fn same_seed_same_outputs() {
    let start = tree_sample();
    let mut a = Mutator::with_config(42, small_config());
    let mut b = Mutator::with_config(42, small_config());
    let (mut x, mut y) = (start.clone(), start);
    for _ in 0..50 {
        a.mutate(&mut x, 64).expect("mutate a");
        b.mutate(&mut y, 64).expect("mutate b");
        assert_eq!(x, y);
        assert_eq!(a.last_mutations(), b.last_mutations());
    }
    assert_eq!(a.rng_draws(), b.rng_draws());
}

#[test]
fn empty_schema_is_a_noop() {
    let mut b = SchemaBuilder::new();
    b.declare("Empty");
    let schema = b.build().expect("build").schema_ref("Empty").expect("Empty");
    let mut engine = Mutator::new(9);
    let mut msg = Message::new(schema);
    let before = msg.clone();
    engine.mutate(&mut msg, 100).expect("mutate");
    assert_eq!(msg, before);
    assert!(engine.last_mutations().is_empty());
}

#[test]
fn custom_policy_overrides_one_kind() {
    struct Sevens;
    impl MutationPolicy for Sevens {
        fn mutate_i32(&mut self, _rng: &mut RandomSource, _value: i32) -> i32 {
            7
        }
    }

    let mut b = SchemaBuilder::new();
    let m = b.declare("One");
    b.field(m, FieldDescriptor::required("n", 1, FieldType::Int32));
    let schema = b.build().expect("build").schema_ref("One").expect("One");

    let mut engine = Mutator::new(3).with_policy(Sevens);
    let mut msg = initialized(schema, 1);
    engine.mutate(&mut msg, 8).expect("mutate");
    assert_eq!(msg.get("n"), Some(&Value::Int32(7)));
}

#[test]
fn cross_over_of_unrelated_registries_with_equal_shape_succeeds() {
    let a = initialized(flat_schema(), 4);
    let b = initialized(flat_schema(), 4);
    let mut engine = Mutator::new(5);
    let child = engine.cross_over_into(&a, &b).expect("structurally equal schemas");
    child.validate(4, false).expect("valid");
}

#[test]
fn cross_over_failure_reports_mismatch() {
    let a = initialized(flat_schema(), 4);
    let b = tree_sample();
    let mut target = a.clone();
    let mut engine = Mutator::new(5);
    let err = engine.cross_over(&b, &mut target).expect_err("mismatch");
    assert!(matches!(err, ProtomutError::CrossOverMismatch(_)));
    assert_eq!(target, a);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn mutation_preserves_validity(seed in any::<u32>(), hint in 0usize..512, runs in 1usize..24) {
        let config = small_config();
        let mut engine = Mutator::with_config(seed, config.clone());
        let mut msg = tree_sample();
        for _ in 0..runs {
            engine.mutate(&mut msg, hint).expect("mutate");
            msg.validate(config.max_depth, config.allow_out_of_range_enums).expect("still valid");
            prop_assert!(msg.depth() <= config.max_depth);
        }
    }

    #[test]
    fn growth_stays_within_hint(seed in any::<u32>(), hint in 0usize..128, runs in 1usize..16) {
        let mut engine = Mutator::new(seed);
        let mut msg = initialized(flat_schema(), 4);
        for _ in 0..runs {
            let before = msg.encoded_len();
            engine.mutate(&mut msg, hint).expect("mutate");
            prop_assert!(msg.encoded_len() <= before + hint, "{} > {} + {}", msg.encoded_len(), before, hint);
        }
    }

    #[test]
    fn zero_hint_never_grows_flat_messages(seed in any::<u32>()) {
        let mut engine = Mutator::new(seed);
        let mut msg = initialized(flat_schema(), 4);
        for _ in 0..16 {
            let before = msg.encoded_len();
            engine.mutate(&mut msg, 0).expect("mutate");
            prop_assert!(msg.encoded_len() <= before);
        }
    }

    #[test]
    fn cross_over_never_touches_parents(seed_a in any::<u32>(), seed_b in any::<u32>(), seed in any::<u32>()) {
        let config = small_config();
        let mut a = tree_sample();
        let mut b = tree_sample();
        Mutator::with_config(seed_a, config.clone()).mutate(&mut a, 64).expect("mutate a");
        Mutator::with_config(seed_b, config.clone()).mutate(&mut b, 64).expect("mutate b");
        let (a0, b0) = (a.clone(), b.clone());

        let mut engine = Mutator::with_config(seed, config.clone());
        let child = engine.cross_over_into(&a, &b).expect("cross over");
        child.validate(config.max_depth, false).expect("valid child");
        prop_assert_eq!(&a, &a0);
        prop_assert_eq!(&b, &b0);
    }
}
