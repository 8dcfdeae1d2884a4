//! Property-based tests for round-trip fidelity and filter matching

mod common;

use common::save_to_vec;
use cpix::{BitrateFilter, ContentKey, ContentKeyContext, Document, Error, UsageRule};
use proptest::prelude::*;
use uuid::Uuid;

fn key_value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 16),
        proptest::collection::vec(any::<u8>(), 32),
    ]
}

proptest! {
    #[test]
    fn prop_content_key_values_round_trip(value in key_value_strategy(), kid_bytes in any::<[u8; 16]>()) {
        let kid = Uuid::from_bytes(kid_bytes);
        let mut document = Document::new();
        document.add_content_key(ContentKey::with_value(kid, value.clone())).unwrap();
        let buffer = save_to_vec(&mut document);

        let reloaded = Document::load(buffer.as_slice(), &[]).unwrap();
        prop_assert_eq!(reloaded.content_keys().len(), 1);
        let key = reloaded.content_keys().get(0).unwrap();
        prop_assert_eq!(key.kid, kid);
        prop_assert_eq!(key.value.as_ref().unwrap(), &value);
    }

    #[test]
    fn prop_invalid_value_lengths_rejected(len in 0usize..64) {
        prop_assume!(len != 16 && len != 32);
        let mut document = Document::new();
        let result = document.add_content_key(ContentKey::with_value(Uuid::new_v4(), vec![0u8; len]));
        prop_assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn prop_bitrate_filter_matches_exactly_its_range(
        min in 0u64..1_000_000,
        span in 0u64..1_000_000,
        probe in 0u64..2_000_000,
    ) {
        let max = min + span;
        let kid = Uuid::new_v4();
        let mut document = Document::new();
        document.add_content_key(ContentKey::with_value(kid, vec![0u8; 16])).unwrap();
        let mut rule = UsageRule::new(kid);
        rule.bitrate_filters.push(BitrateFilter {
            min_bitrate: Some(min),
            max_bitrate: Some(max),
        });
        document.add_usage_rule(rule).unwrap();

        let context = ContentKeyContext {
            bitrate: Some(probe),
            ..ContentKeyContext::new()
        };
        let outcome = document.resolve_content_key(&context);
        if probe >= min && probe <= max {
            prop_assert_eq!(outcome.unwrap().kid, kid);
        } else {
            prop_assert!(matches!(outcome, Err(Error::ResolutionImpossible(_))));
        }
    }

    #[test]
    fn prop_labels_round_trip(labels in proptest::collection::vec("[a-z]{1,12}", 0..4)) {
        let kid = Uuid::new_v4();
        let mut document = Document::new();
        document.add_content_key(ContentKey::with_value(kid, vec![0u8; 16])).unwrap();
        let mut rule = UsageRule::new(kid);
        for label in &labels {
            rule.label_filters.push(cpix::LabelFilter { label: label.clone() });
        }
        document.add_usage_rule(rule.clone()).unwrap();
        let buffer = save_to_vec(&mut document);

        let reloaded = Document::load(buffer.as_slice(), &[]).unwrap();
        prop_assert_eq!(reloaded.usage_rules().get(0).unwrap(), &rule);
    }
}
