#![no_main]

//! Random register/invalidate/toggle/turn sequences against the scheduler.
//!
//! After every operation: the dirty set only holds keys that can be drained,
//! the arm flag matches a pending host task, and a fully driven loop leaves
//! the scheduler idle.

use arbitrary::Arbitrary;
use debtbook_harness::Harness;
use debtbook_runtime::{ViewKey, ViewKeySet};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Register(u8),
    Unregister(u8),
    Invalidate(Vec<u8>),
    InvalidateNamed(String),
    Enable,
    Disable,
    Step,
    Run,
}

fn key(raw: u8) -> ViewKey {
    ViewKey::ALL[usize::from(raw) % ViewKey::COUNT]
}

fuzz_target!(|ops: Vec<Op>| {
    let h = Harness::builder().build();
    for op in ops.into_iter().take(256) {
        match op {
            Op::Register(k) => {
                let k = key(k);
                let _ = h.scheduler.register(k, h.journal.recorder(k));
            }
            Op::Unregister(k) => {
                h.scheduler.unregister(key(k));
            }
            Op::Invalidate(keys) => {
                h.scheduler.invalidate(keys.into_iter().map(key));
            }
            Op::InvalidateNamed(name) => {
                h.scheduler.invalidate_named(name.split(','));
            }
            Op::Enable => h.scheduler.enable(),
            Op::Disable => h.scheduler.disable(),
            Op::Step => {
                h.step();
            }
            Op::Run => {
                h.run();
            }
        }

        let dirty = h.scheduler.dirty();
        assert_eq!(h.scheduler.is_armed(), h.pending_flushes() == 1);
        assert!(h.pending_flushes() <= 1);
        if !dirty.is_empty() {
            assert!(h.scheduler.is_armed());
        }
        assert!(!h.scheduler.registered().contains(ViewKeySet::DERIVED));
    }

    h.run();
    assert!(h.scheduler.dirty().is_empty());
    assert!(!h.scheduler.is_armed());

    assert!(h.journal.rendered().iter().all(|k| !k.is_derived()));
});
