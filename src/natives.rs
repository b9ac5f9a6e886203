//! Control-flow and arithmetic natives.
//!
//! Every native is a resumable state machine with the dispatcher signature;
//! the ones that run sub-evaluations (`do`, `if`, `catch`, `attempt`,
//! `reduce`) push a child level and deliver on the completion arrival.  The
//! arithmetic ones finish in one entry.

use std::sync::Arc;

use crate::error::{Failure, ThrowLabel, Thrown};
use crate::heap::{LevelId, ParamClass};
use crate::action::Dispatcher;
use crate::level::{LevelKind, LevelState};
use crate::trampoline::{Arrival, Bounce, Machine};
use crate::value::{Atom, Value};

pub(crate) fn install(m: &mut Machine) {
    m.add_native("do", &[("block", ParamClass::Normal)], native_do);
    m.add_native(
        "if",
        &[("condition", ParamClass::Normal), ("branch", ParamClass::Normal)],
        native_if,
    );
    m.add_native("catch", &[("block", ParamClass::Normal)], native_catch);
    m.add_native("throw", &[("value", ParamClass::Normal)], native_throw);
    m.add_native("return", &[("value", ParamClass::Meta)], native_return);
    m.add_native("attempt", &[("block", ParamClass::Normal)], native_attempt);
    m.add_native("null", &[], native_null);
    m.add_native(
        "add",
        &[("a", ParamClass::Normal), ("b", ParamClass::Normal)],
        native_add,
    );
    m.add_native(
        "subtract",
        &[("a", ParamClass::Normal), ("b", ParamClass::Normal)],
        native_subtract,
    );
    m.add_native(
        "lesser?",
        &[("a", ParamClass::Normal), ("b", ParamClass::Normal)],
        native_lesser_q,
    );
    m.add_native("reduce", &[("block", ParamClass::Normal)], native_reduce);
}

fn fail(failure: Failure) -> Bounce {
    Bounce::Done(Atom::Failure(Arc::new(failure)))
}

fn arg(m: &Machine, lv: LevelId, index: usize) -> Value {
    let varlist = m.heap.level(lv).varlist.expect("native invoked without frame");
    m.heap.slot(varlist, index)
}

/// Start a stepper over a block argument, reading words through the caller's
/// binding.
fn push_body(m: &mut Machine, lv: LevelId, block: Value) -> Result<LevelId, Failure> {
    let block = match block {
        Value::Block(b) => b,
        other => {
            return Err(Failure::WrongType { expected: "block", actual: other.kind_name() })
        }
    };
    let binding = {
        let feed = m.heap.level(lv).feed;
        m.heap.feed(feed).binding
    };
    let feed = m.feed_over(block, binding);
    Ok(m.push_level(LevelKind::Stepper, feed, Some(lv)))
}

//===----------------------------------------------------------------------===//
// do / if / attempt
//===----------------------------------------------------------------------===//

fn native_do(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    match (m.heap.level(lv).state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            match push_body(m, lv, arg(m, lv, 0)) {
                Err(f) => fail(f),
                Ok(child) => {
                    m.heap.level_mut(lv).state = LevelState::AwaitBody;
                    Bounce::Continue(child)
                }
            }
        }
        (LevelState::AwaitBody, Arrival::Completion(atom)) => Bounce::Done(atom),
        (state, arrival) => panic!("do re-entered with {:?} / {:?}", state, arrival),
    }
}

fn native_if(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    match (m.heap.level(lv).state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let condition = Atom::Value(arg(m, lv, 0));
            match condition.truthy() {
                Err(f) => Bounce::Done(Atom::Failure(f)),
                Ok(false) => Bounce::Done(Atom::Null),
                Ok(true) => match push_body(m, lv, arg(m, lv, 1)) {
                    Err(f) => fail(f),
                    Ok(child) => {
                        m.heap.level_mut(lv).state = LevelState::AwaitBody;
                        Bounce::Continue(child)
                    }
                },
            }
        }
        (LevelState::AwaitBody, Arrival::Completion(atom)) => Bounce::Done(atom),
        (state, arrival) => panic!("if re-entered with {:?} / {:?}", state, arrival),
    }
}

/// Run a block, turning a cooperative failure into null instead of letting
/// it propagate.
fn native_attempt(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    match (m.heap.level(lv).state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            match push_body(m, lv, arg(m, lv, 0)) {
                Err(f) => fail(f),
                Ok(child) => {
                    m.heap.level_mut(lv).state = LevelState::AwaitBody;
                    Bounce::Continue(child)
                }
            }
        }
        (LevelState::AwaitBody, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                Bounce::Done(Atom::Null)
            } else {
                Bounce::Done(atom)
            }
        }
        (state, arrival) => panic!("attempt re-entered with {:?} / {:?}", state, arrival),
    }
}

//===----------------------------------------------------------------------===//
// catch / throw / return
//===----------------------------------------------------------------------===//

fn native_catch(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    match (m.heap.level(lv).state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            match push_body(m, lv, arg(m, lv, 0)) {
                Err(f) => fail(f),
                Ok(child) => {
                    m.heap.level_mut(lv).catches = true;
                    m.heap.level_mut(lv).state = LevelState::AwaitBody;
                    Bounce::Continue(child)
                }
            }
        }
        (LevelState::AwaitBody, Arrival::Completion(atom)) => Bounce::Done(atom),
        (LevelState::AwaitBody, Arrival::Caught(thrown)) => match thrown.label {
            ThrowLabel::Throw => Bounce::Done(thrown.atom),
            _ => Bounce::Throw(thrown),
        },
        (state, arrival) => panic!("catch re-entered with {:?} / {:?}", state, arrival),
    }
}

fn native_throw(m: &mut Machine, lv: LevelId, _arrival: Arrival) -> Bounce {
    let value = arg(m, lv, 0);
    Bounce::Throw(Thrown { label: ThrowLabel::Throw, atom: Atom::Value(value) })
}

/// Return from the nearest enclosing interpreted function.
fn native_return(m: &mut Machine, lv: LevelId, _arrival: Arrival) -> Bounce {
    let value = Atom::unreify(arg(m, lv, 0));
    let mut cursor = m.heap.level(lv).prior;
    while let Some(l) = cursor {
        if let Some(action) = m.heap.level(l).action {
            if matches!(m.heap.action(action).dispatcher, Dispatcher::Block) {
                if let Some(varlist) = m.heap.level(l).varlist {
                    return Bounce::Throw(Thrown {
                        label: ThrowLabel::Return(varlist),
                        atom: value,
                    });
                }
            }
        }
        cursor = m.heap.level(l).prior;
    }
    fail(Failure::Script("return used outside any function".to_string()))
}

//===----------------------------------------------------------------------===//
// Values
//===----------------------------------------------------------------------===//

fn native_null(_m: &mut Machine, _lv: LevelId, _arrival: Arrival) -> Bounce {
    Bounce::Done(Atom::Null)
}

fn numeric_pair(a: Value, b: Value) -> Result<(f64, f64), Failure> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok((x as f64, y as f64)),
        (Value::Int(x), Value::Decimal(y)) => Ok((x as f64, y)),
        (Value::Decimal(x), Value::Int(y)) => Ok((x, y as f64)),
        (Value::Decimal(x), Value::Decimal(y)) => Ok((x, y)),
        (Value::Int(_), other) | (Value::Decimal(_), other) => {
            Err(Failure::WrongType { expected: "number", actual: other.kind_name() })
        }
        (other, _) => {
            Err(Failure::WrongType { expected: "number", actual: other.kind_name() })
        }
    }
}

fn native_add(m: &mut Machine, lv: LevelId, _arrival: Arrival) -> Bounce {
    match (arg(m, lv, 0), arg(m, lv, 1)) {
        (Value::Int(a), Value::Int(b)) => {
            Bounce::Done(Atom::Value(Value::Int(a.wrapping_add(b))))
        }
        (a, b) => match numeric_pair(a, b) {
            Ok((x, y)) => Bounce::Done(Atom::Value(Value::Decimal(x + y))),
            Err(f) => fail(f),
        },
    }
}

fn native_subtract(m: &mut Machine, lv: LevelId, _arrival: Arrival) -> Bounce {
    match (arg(m, lv, 0), arg(m, lv, 1)) {
        (Value::Int(a), Value::Int(b)) => {
            Bounce::Done(Atom::Value(Value::Int(a.wrapping_sub(b))))
        }
        (a, b) => match numeric_pair(a, b) {
            Ok((x, y)) => Bounce::Done(Atom::Value(Value::Decimal(x - y))),
            Err(f) => fail(f),
        },
    }
}

fn native_lesser_q(m: &mut Machine, lv: LevelId, _arrival: Arrival) -> Bounce {
    match numeric_pair(arg(m, lv, 0), arg(m, lv, 1)) {
        Ok((x, y)) => Bounce::Done(Atom::Value(Value::Logic(x < y))),
        Err(f) => fail(f),
    }
}

//===----------------------------------------------------------------------===//
// reduce
//===----------------------------------------------------------------------===//

/// Evaluate each expression of a block, accumulating products on the data
/// stack, and finish with a new block of the results.  The accumulation
/// rides the data stack deliberately: a yield inside the block captures and
/// restores the partial results through the plug.
fn native_reduce(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    match (m.heap.level(lv).state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let block = match arg(m, lv, 0) {
                Value::Block(b) => b,
                other => {
                    return fail(Failure::WrongType {
                        expected: "block",
                        actual: other.kind_name(),
                    })
                }
            };
            let binding = {
                let feed = m.heap.level(lv).feed;
                m.heap.feed(feed).binding
            };
            let feed = m.feed_over(block, binding);
            // The callsite feed is consumed; repoint at the block being
            // reduced so stepping reads from it.
            m.heap.level_mut(lv).feed = feed;
            reduce_step(m, lv)
        }
        (LevelState::Reducing, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                return Bounce::Done(atom);
            }
            let value = match atom.to_value() {
                Ok(v) => v,
                Err(f) => return Bounce::Done(Atom::Failure(f)),
            };
            m.data_stack.push(value);
            reduce_step(m, lv)
        }
        (state, arrival) => panic!("reduce re-entered with {:?} / {:?}", state, arrival),
    }
}

fn reduce_step(m: &mut Machine, lv: LevelId) -> Bounce {
    let feed = m.heap.level(lv).feed;
    if m.heap.feed_at_end(feed) {
        let baseline = m.heap.level(lv).baseline;
        let values = m.data_stack.split_off(baseline);
        let block = m.heap.alloc_array(values, true);
        return Bounce::Done(Atom::Value(Value::Block(block)));
    }
    m.heap.level_mut(lv).state = LevelState::Reducing;
    let child = m.push_level(LevelKind::OneStep, feed, Some(lv));
    Bounce::Continue(child)
}
