//! Collection over live, suspended, and host-owned structures.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use reel::{word, Atom, Machine, Value};

fn assert_int(atom: &Atom, expected: i64) {
    match atom {
        Atom::Value(Value::Int(v)) => assert_eq!(*v, expected),
        other => panic!("expected {}, got {:?}", expected, other),
    }
}

//===----------------------------------------------------------------------===//
// Suspended generators
//===----------------------------------------------------------------------===//

#[test]
fn collection_preserves_suspended_fragments() {
    let mut m = Machine::new();
    let body = m.make_block(vec![
        word("yield"),
        Value::Int(1),
        word("yield"),
        Value::Int(2),
        word("yield"),
        Value::Int(3),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);
    // Full cycles while the fragment sits in the action's details: the
    // suspended levels, their feeds, and the frame must all survive.
    m.collect_garbage();
    m.collect_garbage();
    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);
    m.collect_garbage();
    assert_int(&m.eval(vec![word("g")]).unwrap(), 3);
    assert!(matches!(m.eval(vec![word("g")]).unwrap(), Atom::Null));
}

#[test]
fn repeated_resume_cycles_stay_bounded() {
    let mut m = Machine::new();
    let body = m.make_block(vec![
        word("yield"),
        Value::Int(1),
        word("yield"),
        Value::Int(2),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));
    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);

    m.collect_garbage();
    let live_after_first = m.heap.live_count();

    // Idle evaluations plus collections must not grow the live set.
    for _ in 0..10 {
        m.eval(vec![Value::Int(0)]).unwrap();
        m.collect_garbage();
    }
    assert_eq!(m.heap.live_count(), live_after_first);

    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);
}

//===----------------------------------------------------------------------===//
// Roots and reachability
//===----------------------------------------------------------------------===//

#[test]
fn guarded_values_survive_unguarded_die() {
    let mut m = Machine::new();
    let block = m.make_block(vec![Value::Int(1), Value::Int(2)]);
    let value = Value::Block(block);
    m.guard(value);
    m.collect_garbage();
    assert_eq!(m.heap.array(block).values.len(), 2);

    m.unguard(value);
    m.collect_garbage();
    let result = catch_unwind(AssertUnwindSafe(|| {
        m.heap.array(block).values.len()
    }));
    assert!(result.is_err(), "unreferenced managed array should be collected");
}

#[test]
fn unmanaged_arrays_root_their_contents() {
    let mut m = Machine::new();
    let inner = m.make_block(vec![Value::Int(7)]);
    let outer = m.heap.alloc_array(vec![Value::Block(inner)], false);

    // No guards: the unmanaged array is sweep-exempt and roots the managed
    // inner block.
    m.collect_garbage();
    assert_eq!(m.heap.array(inner).values.len(), 1);

    // Handing it to the collector makes both collectable.
    m.heap.manage_array(outer);
    m.collect_garbage();
    let result = catch_unwind(AssertUnwindSafe(|| m.heap.array(outer).values.len()));
    assert!(result.is_err());
}

#[test]
fn lib_bindings_are_roots() {
    let mut m = Machine::new();
    let block = m.make_block(vec![Value::Int(9)]);
    m.bind("kept", Value::Block(block));
    m.collect_garbage();
    assert_eq!(m.heap.array(block).values.len(), 1);
}

//===----------------------------------------------------------------------===//
// Handles
//===----------------------------------------------------------------------===//

static CLEANED: AtomicUsize = AtomicUsize::new(0);

fn count_cleanup(_data: usize) {
    CLEANED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn handle_cleanup_runs_exactly_once_at_sweep() {
    let mut m = Machine::new();
    let handle = m.heap.alloc_handle(123, Some(count_cleanup));
    let value = Value::Handle(handle);
    m.guard(value);

    m.collect_garbage();
    assert_eq!(CLEANED.load(Ordering::SeqCst), 0);

    m.unguard(value);
    m.collect_garbage();
    assert_eq!(CLEANED.load(Ordering::SeqCst), 1);
    m.collect_garbage();
    assert_eq!(CLEANED.load(Ordering::SeqCst), 1);
}
