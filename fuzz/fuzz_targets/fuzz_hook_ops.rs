#![no_main]

//! Structured fuzzing of hook operations.
//!
//! Drives a small pool of hooks and one validating owner through arbitrary
//! connect, disconnect, bulk-connect and submit operations and checks after
//! every step that connected hooks agree and that refused submissions left
//! every value untouched.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_core::{
    Hook, NexusManager, Owner, OwnerCallbacks, SubmitOptions, Submission, SyncMode,
    typed_value, value_map,
};

const POOL: usize = 8;

#[derive(Debug, Arbitrary)]
enum Op {
    Connect { a: u8, b: u8, use_caller: bool },
    Disconnect { hook: u8 },
    ConnectPairs { pairs: Vec<(u8, u8)> },
    Submit { entries: Vec<(u8, i16)> },
    SubmitOwner { low: i16, high: i16 },
    Drop { hook: u8 },
}

fn snapshot(hooks: &[Option<Hook<i16>>]) -> Vec<Option<(i16, i16)>> {
    hooks
        .iter()
        .map(|h| h.as_ref().map(|h| (h.value(), h.previous_value())))
        .collect()
}

fuzz_target!(|ops: Vec<Op>| {
    let manager = NexusManager::default();
    let mut hooks: Vec<Option<Hook<i16>>> = (0..POOL)
        .map(|i| Some(Hook::new_in(&manager, i as i16)))
        .collect();

    // Owner whose two hooks must stay ordered; its hooks join the pool.
    let owner = Owner::builder_in(&manager)
        .hook("low", 0_i16)
        .hook("high", 0_i16)
        .behavior(OwnerCallbacks::new().on_validate(|values| {
            match (
                typed_value::<i16>(values, "low"),
                typed_value::<i16>(values, "high"),
            ) {
                (Some(low), Some(high)) if low <= high => Ok(()),
                _ => Err("low > high".into()),
            }
        }))
        .build()
        .expect("0 <= 0");
    hooks.push(owner.hook::<i16>("low").ok());
    hooks.push(owner.hook::<i16>("high").ok());

    let len = hooks.len();
    let pick = move |i: u8| usize::from(i) % len;

    for op in ops.into_iter().take(64) {
        let before = snapshot(&hooks);
        let refused = match op {
            Op::Connect { a, b, use_caller } => {
                let (a, b) = (pick(a), pick(b));
                let mode = if use_caller {
                    SyncMode::UseCallerValue
                } else {
                    SyncMode::UseTargetValue
                };
                match (&hooks[a], &hooks[b]) {
                    (Some(x), Some(y)) => x.connect(y, mode).is_err(),
                    _ => false,
                }
            }
            Op::Disconnect { hook } => {
                if let Some(h) = &hooks[pick(hook)] {
                    h.disconnect();
                }
                false
            }
            Op::ConnectPairs { pairs } => {
                let erased: Vec<_> = pairs
                    .iter()
                    .take(8)
                    .filter_map(|&(a, b)| match (&hooks[pick(a)], &hooks[pick(b)]) {
                        (Some(x), Some(y)) => Some((x.erase(), y.erase())),
                        _ => None,
                    })
                    .collect();
                manager.connect_pairs(&erased).is_err()
            }
            Op::Submit { entries } => {
                let mut submission = Submission::new();
                for (i, v) in entries.into_iter().take(8) {
                    if let Some(h) = &hooks[pick(i)] {
                        submission.insert(h, v);
                    }
                }
                manager.submit(submission, &SubmitOptions::default()).is_err()
            }
            Op::SubmitOwner { low, high } => owner
                .submit_values(value_map! { "low" => low, "high" => high })
                .is_err(),
            Op::Drop { hook } => {
                let i = pick(hook);
                if i < POOL {
                    hooks[i] = None;
                }
                false
            }
        };

        if refused {
            assert_eq!(snapshot(&hooks), before, "refused operation mutated state");
        }
        for a in hooks.iter().flatten() {
            for b in hooks.iter().flatten() {
                if a.is_connected_to(b) {
                    assert_eq!(a.value(), b.value(), "connected hooks disagree");
                }
            }
        }
        let low = owner.value::<i16>("low").expect("owned");
        let high = owner.value::<i16>("high").expect("owned");
        assert!(low <= high, "owner invariant broken: {low} > {high}");
    }
});
