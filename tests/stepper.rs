//! Trampoline and evaluator behavior: expression stepping, set-words,
//! groups, throw/catch, return, and interpreted recursion depth that no
//! native stack could survive recursively.

use reel::{get_word, set_word, word, Atom, Failure, HostError, Machine, Value};

fn assert_int(atom: &Atom, expected: i64) {
    match atom {
        Atom::Value(Value::Int(v)) => assert_eq!(*v, expected),
        other => panic!("expected {}, got {:?}", expected, other),
    }
}

fn assert_failure(atom: &Atom, check: impl Fn(&Failure) -> bool) {
    match atom {
        Atom::Failure(f) => assert!(check(f), "unexpected failure: {}", f),
        other => panic!("expected failure, got {:?}", other),
    }
}

//===----------------------------------------------------------------------===//
// Expression stepping
//===----------------------------------------------------------------------===//

#[test]
fn literals_are_inert() {
    let mut m = Machine::new();
    assert_int(&m.eval(vec![Value::Int(42)]).unwrap(), 42);
    let result = m.eval(vec![Value::Logic(true)]).unwrap();
    assert!(matches!(result, Atom::Value(Value::Logic(true))));
}

#[test]
fn empty_block_is_void() {
    let mut m = Machine::new();
    assert!(matches!(m.eval(vec![]).unwrap(), Atom::Void));
}

#[test]
fn block_result_is_last_expression() {
    let mut m = Machine::new();
    let result = m
        .eval(vec![Value::Int(1), Value::Int(2), word("add"), Value::Int(3), Value::Int(4)])
        .unwrap();
    assert_int(&result, 7);
}

#[test]
fn set_words_assign_and_chain() {
    let mut m = Machine::new();
    let result = m
        .eval(vec![
            set_word("x"),
            Value::Int(10),
            set_word("y"),
            word("add"),
            word("x"),
            Value::Int(5),
            word("y"),
        ])
        .unwrap();
    assert_int(&result, 15);

    // Chained set-words land the same value in both slots.
    let result = m
        .eval(vec![
            set_word("a"),
            set_word("b"),
            Value::Int(3),
            word("add"),
            word("a"),
            word("b"),
        ])
        .unwrap();
    assert_int(&result, 6);
}

#[test]
fn groups_evaluate_inline() {
    let mut m = Machine::new();
    let inner = m.make_block(vec![word("add"), Value::Int(1), Value::Int(2)]);
    let result = m
        .eval(vec![word("add"), Value::Group(inner), Value::Int(3)])
        .unwrap();
    assert_int(&result, 6);
}

#[test]
fn get_word_fetches_without_invoking() {
    let mut m = Machine::new();
    let result = m
        .eval(vec![set_word("f"), get_word("add"), word("f"), Value::Int(2), Value::Int(3)])
        .unwrap();
    assert_int(&result, 5);
}

#[test]
fn unbound_word_fails() {
    let mut m = Machine::new();
    let atom = m.eval(vec![word("no-such-word")]).unwrap();
    assert_failure(&atom, |f| matches!(f, Failure::UnboundWord(_)));
}

#[test]
fn antiforms_cannot_be_assigned() {
    let mut m = Machine::new();
    let atom = m.eval(vec![set_word("x"), word("null")]).unwrap();
    assert_failure(&atom, |f| matches!(f, Failure::AntiformStore(_)));
}

#[test]
fn reduce_collects_products() {
    let mut m = Machine::new();
    let inner = m.make_block(vec![
        Value::Int(1),
        word("add"),
        Value::Int(1),
        Value::Int(1),
        Value::Int(3),
    ]);
    match m.eval(vec![word("reduce"), Value::Block(inner)]).unwrap() {
        Atom::Value(block @ Value::Block(_)) => {
            assert_eq!(reel::mold::mold(&m.heap, &block), "[1 2 3]");
        }
        other => panic!("expected block, got {:?}", other),
    }
}

//===----------------------------------------------------------------------===//
// Throw / catch / return
//===----------------------------------------------------------------------===//

#[test]
fn catch_intercepts_throw() {
    let mut m = Machine::new();
    let body = m.make_block(vec![word("throw"), Value::Int(42), Value::Int(0)]);
    let result = m.eval(vec![word("catch"), Value::Block(body)]).unwrap();
    assert_int(&result, 42);
}

#[test]
fn uncaught_throw_reaches_the_host() {
    let mut m = Machine::new();
    match m.eval(vec![word("throw"), Value::Int(1)]) {
        Err(HostError::UncaughtThrow(_)) => {}
        other => panic!("expected uncaught throw, got {:?}", other),
    }
}

#[test]
fn return_exits_the_function() {
    let mut m = Machine::new();
    let body = m.make_block(vec![
        word("return"),
        Value::Int(7),
        word("add"),
        Value::Int(1),
        Value::Int(1),
    ]);
    let f = m.make_function(Some("f"), &[], body);
    m.bind("f", Value::Action(f));
    assert_int(&m.eval(vec![word("f")]).unwrap(), 7);
}

#[test]
fn return_crosses_intervening_levels() {
    let mut m = Machine::new();
    let inner = m.make_block(vec![word("return"), Value::Int(5)]);
    let body = m.make_block(vec![word("do"), Value::Block(inner), Value::Int(0)]);
    let f = m.make_function(Some("f"), &[], body);
    m.bind("f", Value::Action(f));
    assert_int(&m.eval(vec![word("f")]).unwrap(), 5);
}

#[test]
fn attempt_swallows_failures() {
    let mut m = Machine::new();
    let body = m.make_block(vec![word("no-such-word")]);
    let result = m.eval(vec![word("attempt"), Value::Block(body)]).unwrap();
    assert!(matches!(result, Atom::Null));
}

//===----------------------------------------------------------------------===//
// Interpreted depth vs. native stack
//===----------------------------------------------------------------------===//

#[test]
fn interpreted_recursion_does_not_consume_native_stack() {
    let mut m = Machine::new();
    // countdown: func [n] [if lesser? 0 n [countdown subtract n 1]]
    let branch = m.make_block(vec![
        word("countdown"),
        word("subtract"),
        word("n"),
        Value::Int(1),
    ]);
    let body = m.make_block(vec![
        word("if"),
        word("lesser?"),
        Value::Int(0),
        word("n"),
        Value::Block(branch),
    ]);
    let f = m.make_function(Some("countdown"), &["n"], body);
    m.bind("countdown", Value::Action(f));

    // Deep enough that a recursive evaluator would blow the native stack;
    // here every frame is a heap level, so it just takes memory.
    let result = m.eval(vec![word("countdown"), Value::Int(30_000)]).unwrap();
    assert!(matches!(result, Atom::Null), "bottomed out with {:?}", result);
}

#[test]
fn deep_generator_yield_unwinds_in_one_bounce() {
    let mut m = Machine::new();
    // The yield sits under a stack of nested groups; the whole run of
    // levels between it and the generator is captured in one unplug.
    let mut expr = vec![word("yield"), Value::Int(1)];
    for _ in 0..200 {
        let inner = m.make_block(expr);
        expr = vec![Value::Group(inner)];
    }
    let body = m.make_block(expr);
    let g = m.make_generator(Some("g"), &[], body);
    m.bind("g", Value::Action(g));

    assert_int(&m.eval(vec![word("g")]).unwrap(), 1);
    assert!(matches!(m.eval(vec![word("g")]).unwrap(), Atom::Null));
}
