//! Generator behavior: suspend/resume fidelity, re-entrancy, argument
//! refresh across resumes, null-yield, terminality, chains.

use std::sync::Once;

use reel::{word, Atom, Failure, Machine, Value};

static INIT: Once = Once::new();

fn setup() -> Machine {
    INIT.call_once(|| {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Warn)
            .env()
            .init();
    });
    Machine::new()
}

fn assert_int(atom: &Atom, expected: i64) {
    match atom {
        Atom::Value(Value::Int(v)) => assert_eq!(*v, expected),
        other => panic!("expected {}, got {:?}", expected, other),
    }
}

fn assert_null(atom: &Atom) {
    assert!(matches!(atom, Atom::Null), "expected null, got {:?}", atom);
}

//===----------------------------------------------------------------------===//
// Suspend / resume fidelity
//===----------------------------------------------------------------------===//

#[test]
fn yields_in_order_then_exhausts_idempotently() {
    let mut m = setup();
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

    for expected in [1, 2, 3] {
        assert_int(&m.eval(vec![word("g")]).unwrap(), expected);
    }
    assert_null(&m.eval(vec![word("g")]).unwrap());
    // Idempotent after completion.
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

#[test]
fn body_state_survives_between_calls() {
    let mut m = setup();
    // n: 0, then yield successive increments: state held in the frame.
    let body = m.make_block(vec![
        reel::set_word("n"),
        Value::Int(0),
        word("yield"),
        reel::set_word("n"),
        word("add"),
        word("n"),
        Value::Int(1),
        word("yield"),
        reel::set_word("n"),
        word("add"),
        word("n"),
        Value::Int(1),
    ]);
    let g = m.make_generator(Some("counter"), &[], body);
    m.bind("counter", Value::Action(g));

    assert_int(&m.eval(vec![word("counter")]).unwrap(), 1);
    assert_int(&m.eval(vec![word("counter")]).unwrap(), 2);
    assert_null(&m.eval(vec![word("counter")]).unwrap());
}

//===----------------------------------------------------------------------===//
// Re-entrancy guard
//===----------------------------------------------------------------------===//

#[test]
fn reentrant_call_fails_without_corrupting_state() {
    let mut m = setup();
    let attempt_body = m.make_block(vec![word("g")]);
    let body = m.make_block(vec![
        word("yield"),
        Value::Int(1),
        word("attempt"),
        Value::Block(attempt_body),
        word("yield"),
        Value::Int(2),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);
    // The resume runs the re-entrant call, which fails; attempt swallows the
    // failure and the body continues to the next yield.
    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

#[test]
fn unhandled_reentry_surfaces_and_poisons() {
    let mut m = setup();
    let body = m.make_block(vec![word("yield"), Value::Int(1), word("g2")]);
    let g = m.make_generator(Some("g2"), &[], body);
    m.bind("g2", Value::Action(g));

    assert_int(&m.eval(vec![word("g2")]).unwrap(), 1);
    match m.eval(vec![word("g2")]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::YielderReentered)),
        other => panic!("expected re-entry failure, got {:?}", other),
    }
    // The failure propagated out of the body uncaught, so the yielder is
    // permanently errored.
    match m.eval(vec![word("g2")]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::YielderErrored)),
        other => panic!("expected errored condition, got {:?}", other),
    }
}

//===----------------------------------------------------------------------===//
// Argument refresh
//===----------------------------------------------------------------------===//

#[test]
fn each_resume_sees_that_calls_arguments() {
    let mut m = setup();
    let body = m.make_block(vec![word("yield"), word("x"), word("yield"), word("x")]);
    let g = m.make_generator(Some("echo"), &["x"], body);
    m.bind("echo", Value::Action(g));

    assert_int(&m.eval(vec![word("echo"), Value::Int(10)]).unwrap(), 10);
    assert_int(&m.eval(vec![word("echo"), Value::Int(20)]).unwrap(), 20);
    assert_null(&m.eval(vec![word("echo"), Value::Int(99)]).unwrap());
}

//===----------------------------------------------------------------------===//
// Null yield
//===----------------------------------------------------------------------===//

#[test]
fn yielding_null_is_a_no_op() {
    let mut m = setup();
    let body = m.make_block(vec![
        word("yield"),
        word("null"),
        word("yield"),
        Value::Int(7),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    // The null yield neither suspends nor produces; the first call runs
    // straight through to the yield of 7.
    assert_int(&m.eval(vec![word("g")]).unwrap(), 7);
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

//===----------------------------------------------------------------------===//
// Error terminality
//===----------------------------------------------------------------------===//

#[test]
fn body_error_surfaces_once_then_reports_errored() {
    let mut m = setup();
    let text = m.make_text("not a number");
    let body = m.make_block(vec![
        word("yield"),
        Value::Int(1),
        word("add"),
        Value::Int(1),
        text,
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);
    match m.eval(vec![word("g")]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::WrongType { .. })),
        other => panic!("expected type failure, got {:?}", other),
    }
    match m.eval(vec![word("g")]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::YielderErrored)),
        other => panic!("expected errored condition, got {:?}", other),
    }
}

//===----------------------------------------------------------------------===//
// Throw-as-clean-exit
//===----------------------------------------------------------------------===//

#[test]
fn throw_through_finishes_cleanly() {
    let mut m = setup();
    let body = m.make_block(vec![word("yield"), Value::Int(1), word("throw"), Value::Int(99)]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    let call = m.make_block(vec![word("g")]);
    assert_int(&m.eval(vec![word("catch"), Value::Block(call)]).unwrap(), 1);

    // Second call: the body throws; the transfer passes through the
    // generator (finishing it) and reaches the catch.
    let call = m.make_block(vec![word("g")]);
    assert_int(&m.eval(vec![word("catch"), Value::Block(call)]).unwrap(), 99);

    // Finished ok, not errored.
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

//===----------------------------------------------------------------------===//
// Chains
//===----------------------------------------------------------------------===//

#[test]
fn chained_transform_applies_from_first_call() {
    let mut m = setup();
    let body = m.make_block(vec![
        word("yield"),
        Value::Int(1),
        word("yield"),
        Value::Int(2),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    let double_body = m.make_block(vec![word("add"), word("v"), word("v")]);
    let double = m.make_function(Some("double"), &["v"], double_body);
    m.chain_generator(g, double);

    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);
    assert_int(&m.eval(vec![word("g")]).unwrap(), 4);
    // The exhausted signal is not transformed.
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

#[test]
fn stacked_chains_apply_in_order() {
    let mut m = setup();
    let body = m.make_block(vec![word("yield"), Value::Int(3)]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    let double_body = m.make_block(vec![word("add"), word("v"), word("v")]);
    let double = m.make_function(Some("double"), &["v"], double_body);
    let inc_body = m.make_block(vec![word("add"), word("v"), Value::Int(1)]);
    let inc = m.make_function(Some("inc"), &["v"], inc_body);
    m.chain_generator(g, double);
    m.chain_generator(g, inc);

    // (3 * 2) + 1
    assert_int(&m.eval(vec![word("g")]).unwrap(), 7);
}

//===----------------------------------------------------------------------===//
// Data stack capture
//===----------------------------------------------------------------------===//

#[test]
fn reduce_partials_survive_suspension() {
    let mut m = setup();
    let inner = m.make_block(vec![
        Value::Int(1),
        word("yield"),
        Value::Int(2),
        Value::Int(3),
    ]);
    let body = m.make_block(vec![word("yield"), word("reduce"), Value::Block(inner)]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    // The inner yield fires while reduce holds a partial result on the data
    // stack; that partial rides the plug across the suspension.
    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);

    match m.eval(vec![word("g")]).unwrap() {
        Atom::Value(block @ Value::Block(_)) => {
            assert_eq!(reel::mold::mold(&m.heap, &block), "[1 2 3]");
        }
        other => panic!("expected reduced block, got {:?}", other),
    }
    assert_null(&m.eval(vec![word("g")]).unwrap());
}

//===----------------------------------------------------------------------===//
// Yield escaping its activation
//===----------------------------------------------------------------------===//

#[test]
fn escaped_yield_cannot_target_suspended_or_finished_owner() {
    let mut m = setup();
    m.bind("stash", Value::Blank);
    let body = m.make_block(vec![
        reel::set_word("stash"),
        reel::get_word("yield"),
        word("yield"),
        Value::Int(1),
        word("yield"),
        Value::Int(2),
    ]);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);

    // Suspended, but no activation on the stack: nothing to yield to.
    match m.eval(vec![word("stash"), Value::Int(5)]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::YieldNoBinding)),
        other => panic!("expected no-binding failure, got {:?}", other),
    }

    // Drain to completion, then the stashed yield reports expiry.
    assert_int(&m.eval(vec![word("g")]).unwrap(), 2);
    assert_null(&m.eval(vec![word("g")]).unwrap());
    match m.eval(vec![word("stash"), Value::Int(5)]).unwrap() {
        Atom::Failure(f) => assert!(matches!(*f, Failure::YieldExpired)),
        other => panic!("expected expired failure, got {:?}", other),
    }
}
