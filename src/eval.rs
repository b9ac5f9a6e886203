//! The evaluator dispatchers.
//!
//! Three level kinds cooperate to evaluate source arrays:
//!
//! - `stepper` walks a feed expression by expression; its product is the
//!   last expression's product.
//! - `one_step` evaluates exactly one expression from a feed shared with
//!   its parent, so consuming arguments advances the caller's cursor.
//! - `invoke` fills an action's argument frame and then hands every
//!   subsequent arrival to the action's dispatcher.
//!
//! All three follow the continuation discipline: work that needs a
//! sub-evaluation pushes a child level and returns, it never recurses.

use std::sync::Arc;

use crate::action::{Dispatcher, IDX_BODY};
use crate::error::{Failure, ThrowLabel};
use crate::heap::{ContextKind, KeyFlags, ParamClass};
use crate::heap::LevelId;
use crate::level::{LevelKind, LevelState};
use crate::trampoline::{Arrival, Bounce, Machine};
use crate::value::{Atom, Value};

fn fail(failure: Failure) -> Bounce {
    Bounce::Done(Atom::Failure(Arc::new(failure)))
}

//===----------------------------------------------------------------------===//
// Stepper
//===----------------------------------------------------------------------===//

pub(crate) fn stepper(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            if m.heap.feed_at_end(m.heap.level(lv).feed) {
                return Bounce::Done(Atom::Void);
            }
            step_next(m, lv)
        }
        (LevelState::SteppingAwait, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                return Bounce::Done(atom);
            }
            m.heap.level_mut(lv).out = atom;
            if m.heap.feed_at_end(m.heap.level(lv).feed) {
                let out = m.heap.level(lv).out.clone();
                return Bounce::Done(out);
            }
            step_next(m, lv)
        }
        (state, arrival) => {
            panic!("stepper re-entered with {:?} / {:?}", state, arrival)
        }
    }
}

fn step_next(m: &mut Machine, lv: LevelId) -> Bounce {
    let feed = m.heap.level(lv).feed;
    m.heap.level_mut(lv).state = LevelState::SteppingAwait;
    let child = m.push_level(LevelKind::OneStep, feed, Some(lv));
    Bounce::Continue(child)
}

//===----------------------------------------------------------------------===//
// OneStep
//===----------------------------------------------------------------------===//

pub(crate) fn one_step(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let feed = m.heap.level(lv).feed;
            let Some(value) = m.heap.feed_next(feed) else {
                return fail(Failure::Script("expression expected".to_string()));
            };
            match value {
                Value::Word(sym) => {
                    let binding = m.heap.feed(feed).binding;
                    match m.lookup_word(binding, sym) {
                        Ok(Value::Action(action)) => {
                            m.heap.level_mut(lv).state = LevelState::AwaitProduct;
                            let child = m.push_invoke(action, feed, Some(lv));
                            Bounce::Continue(child)
                        }
                        Ok(v) => Bounce::Done(Atom::Value(v)),
                        Err(f) => Bounce::Done(Atom::Failure(f)),
                    }
                }
                Value::GetWord(sym) => {
                    let binding = m.heap.feed(feed).binding;
                    match m.lookup_word(binding, sym) {
                        Ok(v) => Bounce::Done(Atom::Value(v)),
                        Err(f) => Bounce::Done(Atom::Failure(f)),
                    }
                }
                Value::SetWord(sym) => {
                    m.heap.level_mut(lv).state = LevelState::AwaitSet(sym);
                    let child = m.push_level(LevelKind::OneStep, feed, Some(lv));
                    Bounce::Continue(child)
                }
                Value::Group(block) => {
                    let binding = m.heap.feed(feed).binding;
                    let inner = m.feed_over(block, binding);
                    m.heap.level_mut(lv).state = LevelState::AwaitProduct;
                    let child = m.push_level(LevelKind::Stepper, inner, Some(lv));
                    Bounce::Continue(child)
                }
                // Everything else is inert: it evaluates to itself.
                other => Bounce::Done(Atom::Value(other)),
            }
        }
        (LevelState::AwaitProduct, Arrival::Completion(atom)) => Bounce::Done(atom),
        (LevelState::AwaitSet(sym), Arrival::Completion(atom)) => {
            if atom.is_failure() {
                return Bounce::Done(atom);
            }
            let value = match atom.to_value() {
                Ok(v) => v,
                Err(f) => return Bounce::Done(Atom::Failure(f)),
            };
            let binding = {
                let feed = m.heap.level(lv).feed;
                m.heap.feed(feed).binding
            };
            match m.assign_word(binding, sym, value) {
                Ok(()) => Bounce::Done(atom),
                Err(f) => Bounce::Done(Atom::Failure(f)),
            }
        }
        (state, arrival) => {
            panic!("one-step re-entered with {:?} / {:?}", state, arrival)
        }
    }
}

//===----------------------------------------------------------------------===//
// Invoke
//===----------------------------------------------------------------------===//

pub(crate) fn invoke(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    if m.heap.level(lv).dispatching {
        return dispatch_action(m, lv, arrival);
    }
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let action = m.heap.level(lv).action.expect("invoke without action");
            let params = m.heap.action(action).params;
            let varlist = m.heap.alloc_context(
                params,
                ContextKind::Frame { action, level: Some(lv) },
                Some(m.lib),
            );
            m.heap.level_mut(lv).varlist = Some(varlist);
            gather(m, lv, 0)
        }
        (LevelState::Gathering { next }, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                return Bounce::Done(atom);
            }
            let action = m.heap.level(lv).action.expect("invoke without action");
            let params = m.heap.action(action).params;
            let key = m.heap.keylist(params).keys[next];
            let stored = match key.class {
                ParamClass::Meta => atom.reify(),
                _ => atom.to_value(),
            };
            let value = match stored {
                Ok(v) => v,
                Err(f) => return Bounce::Done(Atom::Failure(f)),
            };
            let varlist = m.heap.level(lv).varlist.expect("gathering without frame");
            m.heap.set_slot(varlist, next, value);
            gather(m, lv, next + 1)
        }
        (state, arrival) => {
            panic!("invoke re-entered with {:?} / {:?}", state, arrival)
        }
    }
}

/// Fill argument slots starting at `next`.  Quoted parameters consume the
/// feed directly; evaluated ones push a OneStep child and come back through
/// the `Gathering` arrival above.
fn gather(m: &mut Machine, lv: LevelId, mut next: usize) -> Bounce {
    let action = m.heap.level(lv).action.expect("invoke without action");
    let varlist = m.heap.level(lv).varlist.expect("gathering without frame");
    loop {
        let params = m.heap.action(action).params;
        let key_count = m.heap.keylist(params).keys.len();
        if next >= key_count {
            m.heap.level_mut(lv).dispatching = true;
            m.heap.level_mut(lv).state = LevelState::Initial;
            return dispatch_action(m, lv, Arrival::First);
        }
        let key = m.heap.keylist(params).keys[next];
        if key.flags.has(KeyFlags::LOCAL) {
            next += 1;
            continue;
        }
        match key.class {
            ParamClass::Quoted => {
                let feed = m.heap.level(lv).feed;
                match m.heap.feed_next(feed) {
                    None => return fail(Failure::NeedsValue(key.sym)),
                    Some(v) => {
                        m.heap.set_slot(varlist, next, v);
                        next += 1;
                    }
                }
            }
            ParamClass::Normal | ParamClass::Meta => {
                let feed = m.heap.level(lv).feed;
                if m.heap.feed_at_end(feed) {
                    return fail(Failure::NeedsValue(key.sym));
                }
                m.heap.level_mut(lv).state = LevelState::Gathering { next };
                let child = m.push_level(LevelKind::OneStep, feed, Some(lv));
                return Bounce::Continue(child);
            }
        }
    }
}

/// Route an arrival to the action's dispatcher.
pub(crate) fn dispatch_action(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let action = m.heap.level(lv).action.expect("dispatch without action");
    match m.heap.action(action).dispatcher {
        Dispatcher::Block => block_action(m, lv, arrival),
        Dispatcher::Native(f) => f(m, lv, arrival),
        Dispatcher::Generator => crate::generator::generator_dispatch(m, lv, arrival),
        Dispatcher::Yield => crate::generator::yield_dispatch(m, lv, arrival),
    }
}

/// Dispatcher for interpreted functions: run the body block with the frame
/// as binding, intercepting `return` throws aimed at this frame.
fn block_action(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let action = m.heap.level(lv).action.expect("block action missing");
            let details = m.heap.action(action).details;
            let body = match m.heap.array(details).values[IDX_BODY] {
                Value::Block(b) => b,
                other => {
                    return fail(Failure::WrongType {
                        expected: "block",
                        actual: other.kind_name(),
                    })
                }
            };
            let varlist = m.heap.level(lv).varlist;
            let feed = m.feed_over(body, varlist);
            m.heap.level_mut(lv).catches = true;
            m.heap.level_mut(lv).state = LevelState::AwaitBody;
            let child = m.push_level(LevelKind::Stepper, feed, Some(lv));
            Bounce::Continue(child)
        }
        (LevelState::AwaitBody, Arrival::Completion(atom)) => Bounce::Done(atom),
        (LevelState::AwaitBody, Arrival::Caught(thrown)) => {
            if let ThrowLabel::Return(ctx) = thrown.label {
                if Some(ctx) == m.heap.level(lv).varlist {
                    return Bounce::Done(thrown.atom);
                }
            }
            Bounce::Throw(thrown)
        }
        (state, arrival) => {
            panic!("block action re-entered with {:?} / {:?}", state, arrival)
        }
    }
}
