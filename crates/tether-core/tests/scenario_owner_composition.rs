//! Owners composed through shared hooks: multi-pass completion, pass
//! limits, conflicting derivations, nested submissions and listener
//! lifetimes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_core::{
    AnyValue, Hook, Listenable, ListenerScope, ManagerConfig, NexusManager, Owner,
    OwnerCallbacks, OwnerError, SubmitError, SubmitOptions, SyncMode, ValueMap, typed_value,
    value_map,
};

/// Owner with `{input, output}` where `output = f(input)`.
fn derived_owner(
    manager: &NexusManager,
    input: i64,
    f: fn(i64) -> i64,
    connect_input_to: Option<&Hook<i64>>,
) -> Owner {
    let builder = Owner::builder_in(manager).hook("output", f(input));
    let builder = match connect_input_to {
        Some(external) => builder.connected("input", &external.erase()),
        None => builder.hook("input", input),
    };
    builder
        .behavior(OwnerCallbacks::new().on_complete(move |submitted, _| {
            let mut extra = ValueMap::new();
            if let Some(input) = typed_value::<i64>(submitted, "input") {
                extra.insert("output".into(), AnyValue::new(f(*input)));
            }
            Ok(extra)
        }))
        .build()
        .expect("initial state is derived")
}

fn plus_one(x: i64) -> i64 {
    x + 1
}

fn double(x: i64) -> i64 {
    x * 2
}

fn counter(target: &impl Listenable) -> Rc<Cell<u32>> {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    target.listeners().add_listener(move || c.set(c.get() + 1));
    count
}

// ═════════════════════════════════════════════════════════════════════════
// Multi-pass completion across owners
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn completion_propagates_through_chained_owners() {
    let manager = NexusManager::default();
    let first = derived_owner(&manager, 0, plus_one, None);
    let first_output = first.hook::<i64>("output").unwrap();
    let second = derived_owner(&manager, 1, double, Some(&first_output));

    let report = first.submit_value("input", 5_i64).unwrap();

    assert_eq!(report.passes, 3);
    assert_eq!(report.derived, 2);
    assert_eq!(first.value::<i64>("output").unwrap(), 6);
    assert_eq!(second.value::<i64>("input").unwrap(), 6);
    assert_eq!(second.value::<i64>("output").unwrap(), 12);
}

#[test]
fn completion_limit_reports_non_convergence() {
    let manager = NexusManager::new(ManagerConfig::new().with_completion_limit(2));
    let first = derived_owner(&manager, 0, plus_one, None);
    let first_output = first.hook::<i64>("output").unwrap();
    let second = derived_owner(&manager, 1, double, Some(&first_output));

    let err = first.submit_value("input", 5_i64).unwrap_err();

    assert_eq!(err, OwnerError::Submit(SubmitError::NotConverged { passes: 2 }));
    assert_eq!(first.value::<i64>("input").unwrap(), 0);
    assert_eq!(second.value::<i64>("output").unwrap(), 2);
}

#[test]
fn completion_limit_counts_the_confirming_pass() {
    let manager = NexusManager::new(ManagerConfig::new().with_completion_limit(3));
    let first = derived_owner(&manager, 0, plus_one, None);
    let first_output = first.hook::<i64>("output").unwrap();
    let _second = derived_owner(&manager, 1, double, Some(&first_output));

    assert!(first.submit_value("input", 5_i64).is_ok());
}

#[test]
fn conflicting_derivations_fail_without_side_effects() {
    let manager = NexusManager::default();
    // 1 + 1 == 1 * 2, so both owners start consistent.
    let a = derived_owner(&manager, 1, plus_one, None);
    let b = derived_owner(&manager, 1, double, None);
    a.connect_hook("output", &b.any_hook("output").unwrap(), SyncMode::UseCallerValue)
        .unwrap();
    a.connect_hook("input", &b.any_hook("input").unwrap(), SyncMode::UseCallerValue)
        .unwrap();

    let err = a.submit_value("input", 3_i64).unwrap_err();

    assert!(matches!(err, OwnerError::Submit(SubmitError::Conflict { .. })));
    assert_eq!(a.value::<i64>("input").unwrap(), 1);
    assert_eq!(b.value::<i64>("output").unwrap(), 2);
}

// ═════════════════════════════════════════════════════════════════════════
// Invalidation and nested submissions
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn invalidate_may_submit_elsewhere() {
    let manager = NexusManager::default();
    let mirror = Hook::new_in(&manager, String::new());
    let sink = mirror.clone();
    let source = Rc::new(RefCell::new(None::<Hook<i32>>));
    let reader = Rc::clone(&source);
    let owner = Owner::builder_in(&manager)
        .hook("count", 0_i32)
        .behavior(OwnerCallbacks::new().on_invalidate(move || {
            if let Some(count) = reader.borrow().as_ref() {
                sink.submit(format!("count={}", count.value())).unwrap();
            }
        }))
        .build()
        .unwrap();
    *source.borrow_mut() = Some(owner.hook::<i32>("count").unwrap());

    owner.submit_value("count", 7_i32).unwrap();

    assert_eq!(mirror.value(), "count=7");
    assert_eq!(manager.phase(), None);
}

#[test]
fn suppressed_owner_is_not_notified() {
    let manager = NexusManager::default();
    let owner = Owner::builder_in(&manager).hook("x", 0_u8).build().unwrap();
    let count = counter(&owner);

    owner
        .submit_values_with(
            value_map! { "x" => 1_u8 },
            &SubmitOptions::new().suppress_owner(owner.id()),
        )
        .unwrap();

    assert_eq!(count.get(), 0);
    assert_eq!(owner.value::<u8>("x").unwrap(), 1);
}

#[test]
fn invalidation_clamp_is_the_value_reactions_see() {
    let manager = NexusManager::default();
    let mirror = Rc::new(Cell::new(0));
    let m = Rc::clone(&mirror);
    let external = Hook::builder(0_i32)
        .manager(&manager)
        .reaction(move |v| m.set(*v))
        .build()
        .unwrap();
    let slot = Rc::new(RefCell::new(None::<Hook<i32>>));
    let reader = Rc::clone(&slot);
    let owner = Owner::builder_in(&manager)
        .connected("a", &external.erase())
        .behavior(OwnerCallbacks::new().on_invalidate(move || {
            if let Some(a) = reader.borrow().as_ref()
                && a.value() > 10
            {
                a.submit(10).unwrap();
            }
        }))
        .build()
        .unwrap();
    *slot.borrow_mut() = Some(owner.hook::<i32>("a").unwrap());

    external.submit(50).unwrap();

    assert_eq!(external.value(), 10);
    assert_eq!(external.previous_value(), 50);
    assert_eq!(owner.value::<i32>("a").unwrap(), 10);
    assert_eq!(mirror.get(), 10);
}

// ═════════════════════════════════════════════════════════════════════════
// Listener writes while connecting
// ═════════════════════════════════════════════════════════════════════════

/// Listener on `hook` that records what it sees and overwrites `1` with `7`.
fn overwrite_one_with_seven(hook: &Hook<i32>) -> Rc<RefCell<Vec<i32>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (writer, log) = (hook.clone(), Rc::clone(&seen));
    hook.add_listener(move || {
        let value = writer.value();
        log.borrow_mut().push(value);
        if value == 1 {
            writer.submit(7).unwrap();
        }
    });
    seen
}

#[test]
fn listener_write_during_connect_reaches_the_merged_group() {
    let manager = NexusManager::default();
    let a = Hook::new_in(&manager, 1_i32);
    let b = Hook::new_in(&manager, 2_i32);
    let seen = overwrite_one_with_seven(&b);

    a.connect(&b, SyncMode::UseCallerValue).unwrap();

    assert_eq!(*seen.borrow(), vec![1, 7]);
    assert!(a.is_connected_to(&b));
    assert_eq!((a.value(), b.value()), (7, 7));
    assert_eq!(b.previous_value(), 1);
}

#[test]
fn listener_write_during_connect_pairs_reaches_the_merged_group() {
    let manager = NexusManager::default();
    let h1 = Hook::new_in(&manager, 1_i32);
    let h2 = Hook::new_in(&manager, 2_i32);
    let seen = overwrite_one_with_seven(&h2);

    assert_eq!(manager.connect_pairs(&[(h1.erase(), h2.erase())]), Ok(1));

    assert_eq!(*seen.borrow(), vec![1, 7]);
    assert!(h1.is_connected_to(&h2));
    assert_eq!((h1.value(), h2.value()), (7, 7));
    assert_eq!(h2.previous_value(), 1);
}

// ═════════════════════════════════════════════════════════════════════════
// Listener lifetimes and owner teardown
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn listener_scope_releases_owner_and_hook_subscriptions() {
    let manager = NexusManager::default();
    let owner = Owner::builder_in(&manager).hook("x", 0_i32).build().unwrap();
    let plain = Hook::new_in(&manager, 0_i32);
    owner
        .connect_hook("x", &plain.erase(), SyncMode::UseCallerValue)
        .unwrap();

    let hits = Rc::new(Cell::new(0));
    let mut scope = ListenerScope::new();
    let (h1, h2) = (Rc::clone(&hits), Rc::clone(&hits));
    scope
        .subscribe(&owner, move || h1.set(h1.get() + 1))
        .subscribe(&plain, move || h2.set(h2.get() + 1));

    plain.submit(1).unwrap();
    assert_eq!(hits.get(), 2);

    drop(scope);
    plain.submit(2).unwrap();
    assert_eq!(hits.get(), 2);
    assert!(owner.listeners().is_empty());
}

#[test]
fn destroy_leaves_external_group_working() {
    let manager = NexusManager::default();
    let left = Hook::new_in(&manager, 1_i32);
    let right = Hook::new_in(&manager, 1_i32);
    left.connect(&right, SyncMode::UseCallerValue).unwrap();
    let owner = Owner::builder_in(&manager)
        .connected("x", &left.erase())
        .build()
        .unwrap();
    assert_eq!(left.nexus().member_count(), 3);

    owner.destroy();

    assert_eq!(left.nexus().member_count(), 2);
    right.submit(9).unwrap();
    assert_eq!(left.value(), 9);
}

#[test]
fn dropping_an_owner_releases_its_hooks() {
    let manager = NexusManager::default();
    let external = Hook::new_in(&manager, 4_i32);
    let owner = Owner::builder_in(&manager)
        .connected("x", &external.erase())
        .build()
        .unwrap();
    assert_eq!(external.nexus().member_count(), 2);

    drop(owner);

    assert_eq!(external.nexus().member_count(), 1);
    assert_eq!(external.submit(5).unwrap().notified, 0);
}

#[test]
fn owner_key_lookup_errors_are_typed() {
    let manager = NexusManager::default();
    let owner = Owner::builder_in(&manager).hook("x", 0_i32).build().unwrap();
    let stranger = Hook::new_in(&manager, 0_i32);

    assert_eq!(
        owner.disconnect_hook("nope").unwrap_err(),
        OwnerError::UnknownKey { key: "nope".into() }
    );
    assert_eq!(owner.key_of(&stranger.erase()), None);
    assert!(matches!(
        owner.submit_values(value_map! { "nope" => 1_i32 }),
        Err(OwnerError::UnknownKey { .. })
    ));
}
