#![forbid(unsafe_code)]

//! Property tests over random invalidation batches.

use debtbook_harness::{Event, Harness};
use debtbook_runtime::{ViewKey, ViewKeySet};
use proptest::prelude::*;

fn any_key() -> impl Strategy<Value = ViewKey> {
    (0..ViewKey::COUNT).prop_map(|i| ViewKey::ALL[i])
}

fn batches() -> impl Strategy<Value = Vec<Vec<ViewKey>>> {
    prop::collection::vec(prop::collection::vec(any_key(), 0..8), 1..6)
}

proptest! {
    #[test]
    fn one_turn_is_one_flush_in_canonical_order(batches in batches()) {
        let h = Harness::builder().enabled(true).build();
        h.register_all();

        let mut expected = ViewKeySet::empty();
        for batch in &batches {
            expected |= h.scheduler.invalidate(batch.iter().copied());
        }
        prop_assert!(h.pending_flushes() <= 1);
        prop_assert_eq!(h.pending_flushes() == 1, !expected.is_empty());
        h.run();

        let want: Vec<Event> = expected
            .iter_keys()
            .map(|key| if key.is_derived() { Event::Derived } else { Event::Render(key) })
            .collect();
        prop_assert_eq!(h.journal.events(), want);
        prop_assert!(h.scheduler.dirty().is_empty());
        prop_assert!(!h.scheduler.is_armed());
    }

    #[test]
    fn unregistered_keys_never_become_dirty(
        registered in prop::collection::vec(any_key(), 0..6),
        submitted in prop::collection::vec(any_key(), 0..12),
    ) {
        let h = Harness::builder().enabled(true).build();
        h.register_recording(registered.iter().copied().filter(|k| !k.is_derived()));
        let allowed = h.scheduler.registered() | ViewKeySet::DERIVED;

        let accepted = h.scheduler.invalidate(submitted.iter().copied());

        prop_assert!(allowed.contains(accepted));
        prop_assert_eq!(h.scheduler.dirty(), accepted);
        prop_assert_eq!(h.scheduler.is_armed(), !accepted.is_empty());
    }

    #[test]
    fn passive_flush_never_runs_anything(batch in prop::collection::vec(any_key(), 1..10)) {
        let h = Harness::builder().enabled(false).build();
        h.register_all();
        h.scheduler.invalidate(batch.iter().copied());
        h.run();
        prop_assert!(h.journal.events().is_empty());
        prop_assert!(h.scheduler.dirty().is_empty());
    }
}
