//! Property tests over randomly generated graphs.

use chrono::{DateTime, Utc};
use graph_serde::{validate_references, ClassRegistry, Decoder, Encoder, Record, Value};
use proptest::prelude::*;

const CLASSES: [&str; 3] = ["Alpha", "Beta", "Gamma"];

fn registry() -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    registry.register_all(CLASSES);
    registry
}

// -- Strategy helpers --

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::Number),
        "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::from),
        (0i64..4_102_444_800_000)
            .prop_filter_map("valid timestamp", DateTime::<Utc>::from_timestamp_millis)
            .prop_map(Value::Date),
    ]
}

fn arb_record(inner: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    (
        prop::option::of(prop::sample::select(CLASSES.to_vec())),
        prop::collection::btree_map("[a-z]{1,6}", inner, 0..5),
    )
        .prop_map(|(class, fields)| {
            let mut record = class.map_or_else(Record::untyped, Record::new);
            for (name, value) in fields {
                record.insert(name, value);
            }
            Value::record(record)
        })
}

/// Acyclic graphs without sharing: every composite is freshly allocated.
fn arb_tree() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::array),
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::set),
            prop::collection::vec((inner.clone(), inner.clone()), 0..4).prop_map(Value::map),
            arb_record(inner),
        ]
    })
}

fn round_trip(registry: &ClassRegistry, value: &Value) -> (serde_json::Value, Value) {
    let wire = Encoder::new(registry).encode(value).expect("encode");
    let decoded = Decoder::new(registry).decode(&wire).expect("decode");
    (wire, decoded)
}

proptest! {
    #[test]
    fn trees_round_trip(value in arb_tree()) {
        let registry = registry();
        let (wire, decoded) = round_trip(&registry, &value);
        prop_assert!(wire.get("_map").is_none());
        prop_assert!(decoded.deep_eq(&value));
    }

    #[test]
    fn json_text_round_trip(value in arb_tree()) {
        let registry = registry();
        let text = Encoder::new(&registry).encode_to_string(&value).expect("encode");
        let decoded = Decoder::new(&registry).decode_str(&text).expect("decode");
        prop_assert!(decoded.deep_eq(&value));
    }

    /// Each composite reached twice gets exactly one side-table entry, and
    /// both occurrences decode to one instance.
    #[test]
    fn sharing_is_closed_and_preserved(first in arb_tree(), second in arb_tree()) {
        let registry = registry();
        let root = Value::array(vec![
            first.clone(),
            second.clone(),
            first.clone(),
            Value::record(Record::untyped().with_field("again", second.clone())),
        ]);

        let (wire, decoded) = round_trip(&registry, &root);
        let stats = validate_references(&wire).expect("closed reference table");
        let expected = usize::from(first.is_composite()) + usize::from(second.is_composite());
        prop_assert_eq!(stats.side_table_entries, expected);
        prop_assert_eq!(stats.references, expected * 2);
        prop_assert!(decoded.deep_eq(&root));

        let items = decoded.as_array().expect("array").borrow().clone();
        let again = items[3].field("again").expect("field");
        if first.is_composite() {
            prop_assert!(items[0].same_value(&items[2]));
        }
        if second.is_composite() {
            prop_assert!(items[1].same_value(&again));
        }
    }

    #[test]
    fn self_cycles_terminate(value in arb_record(arb_tree())) {
        let registry = registry();
        value.set_field("loop", value.clone());

        let (wire, decoded) = round_trip(&registry, &value);
        let stats = validate_references(&wire).expect("closed reference table");
        prop_assert_eq!(stats.side_table_entries, 1);
        prop_assert!(decoded.field("loop").expect("field").same_value(&decoded));
        prop_assert!(decoded.deep_eq(&value));
    }

    #[test]
    fn encoding_is_deterministic(value in arb_tree()) {
        let registry = registry();
        let encoder = Encoder::new(&registry);
        prop_assert_eq!(encoder.encode(&value).expect("encode"), encoder.encode(&value).expect("encode"));
    }
}
