//! Generators: suspendable actions built on unplug/replug.
//!
//! A generator's persistent state lives in its action's details array —
//! the action itself is the single activation record.  The lifecycle:
//!
//! ```text
//! Fresh -> Running -> { Suspended <-> Running } -> Finished(ok) | Finished(err)
//! ```
//!
//! encoded in the STATE slot as Blank, a running-sentinel word, a captured
//! `Frame` context, or a terminal `Logic`.  Suspension detaches the levels
//! between the `yield` call and the generator's own level into a plug;
//! resumption splices them back under the *new* invocation after swapping
//! the fresh argument frame's contents into the captured context, so the
//! frame identity user code may hold keeps working while its argument slots
//! are refreshed from the new call site.

use std::sync::Arc;

use crate::action::{seal_details, Action, Dispatcher, IDX_BODY};
use crate::error::Failure;
use crate::heap::{
    ActionId, ArrayId, ContextId, ContextKind, Key, KeyFlags, LevelId, ParamClass,
};
use crate::interner::{self, SymId};
use crate::level::{LevelKind, LevelState};
use crate::trampoline::{Arrival, Bounce, Machine};
use crate::value::{Atom, Quasiform, Value};

//===----------------------------------------------------------------------===//
// Details layout
//===----------------------------------------------------------------------===//

/// Lifecycle state: Blank, running sentinel, `Frame(ctx)`, or `Logic(bool)`.
pub const IDX_STATE: usize = 2;
/// Context identity to reattach on resume.
pub const IDX_LAST_CTX: usize = 3;
/// The value the replugged `yield` reports as its own result.
pub const IDX_LAST_RESULT: usize = 4;
/// The captured stack fragment while suspended.
pub const IDX_PLUG: usize = 5;
/// Block of actions applied to every yielded value.
pub const IDX_CHAINS: usize = 6;
/// The per-instance yield action handed to the body.
pub const IDX_YIELD: usize = 7;
pub const DETAILS_LEN: usize = 8;

/// Yield-action details: slot 1 points back at the owning generator.
pub const IDX_OWNER: usize = 1;

/// The spelling is unreachable from evaluation, so a word with it can only
/// mean "activation in progress".
fn running_sentinel() -> Value {
    Value::Word(interner::intern("~yielder-running~"))
}

fn yield_sym() -> SymId {
    interner::intern("yield")
}

fn fail(failure: Failure) -> Bounce {
    Bounce::Done(Atom::Failure(Arc::new(failure)))
}

fn details_slot(m: &Machine, details: ArrayId, index: usize) -> Value {
    m.heap.array(details).values[index]
}

fn set_details_slot(m: &mut Machine, details: ArrayId, index: usize, value: Value) {
    m.heap.array_mut(details).values[index] = value;
}

//===----------------------------------------------------------------------===//
// Construction
//===----------------------------------------------------------------------===//

/// Build a generator action.  The parameter frame gets one extra LOCAL slot
/// holding the per-instance yield action, which the body resolves the word
/// `yield` to.
pub(crate) fn make_generator(
    m: &mut Machine,
    params: &[(SymId, ParamClass)],
    body: ArrayId,
    label: Option<SymId>,
) -> ActionId {
    let mut keys: Vec<Key> = params
        .iter()
        .map(|&(sym, class)| Key { sym, class, flags: KeyFlags::NONE })
        .collect();
    keys.push(Key {
        sym: yield_sym(),
        class: ParamClass::Normal,
        flags: KeyFlags::LOCAL,
    });
    let keylist = m.heap.alloc_keylist(keys);

    let mut details_values = vec![Value::Blank; DETAILS_LEN];
    details_values[IDX_BODY] = Value::Block(body);
    let chains = m.heap.alloc_array(Vec::new(), true);
    details_values[IDX_CHAINS] = Value::Block(chains);
    let details = m.heap.alloc_array(details_values, true);

    let generator = m.heap.alloc_action(Action {
        params: keylist,
        dispatcher: Dispatcher::Generator,
        details,
        label,
    });
    seal_details(&mut m.heap, generator);

    // The yield instance: one meta parameter (so null arguments arrive
    // reified rather than being rejected), owner backlink in details.
    let yield_keys = m.heap.alloc_keylist(vec![Key {
        sym: interner::intern("value"),
        class: ParamClass::Meta,
        flags: KeyFlags::NONE,
    }]);
    let yield_details =
        m.heap.alloc_array(vec![Value::Blank, Value::Action(generator)], true);
    let yielder = m.heap.alloc_action(Action {
        params: yield_keys,
        dispatcher: Dispatcher::Yield,
        details: yield_details,
        label: Some(yield_sym()),
    });
    seal_details(&mut m.heap, yielder);

    set_details_slot(m, details, IDX_YIELD, Value::Action(yielder));
    generator
}

/// Append a post-processing action applied to every yielded value.
pub(crate) fn add_chain(m: &mut Machine, generator: ActionId, transform: ActionId) {
    let details = m.heap.action(generator).details;
    let chains = match details_slot(m, details, IDX_CHAINS) {
        Value::Block(b) => b,
        other => panic!("corrupt chain block in yielder details: {:?}", other),
    };
    m.heap
        .array_append(chains, Value::Action(transform))
        .expect("chain block is frozen");
}

//===----------------------------------------------------------------------===//
// Generator dispatcher
//===----------------------------------------------------------------------===//

pub(crate) fn generator_dispatch(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let action = m.heap.level(lv).action.expect("generator without action");
    let details = m.heap.action(action).details;
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let status = details_slot(m, details, IDX_STATE);
            if status == running_sentinel() {
                return fail(Failure::YielderReentered);
            }
            match status {
                Value::Blank => start_fresh(m, lv, details),
                Value::Logic(true) => Bounce::Done(Atom::Null),
                Value::Logic(false) => fail(Failure::YielderErrored),
                Value::Frame(old_ctx) => resume(m, lv, action, details, old_ctx),
                other => panic!("corrupt yielder state slot: {:?}", other),
            }
        }

        (LevelState::BodyRunning, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                // The error surfaces to this caller; afterwards the yielder
                // is permanently errored.
                set_details_slot(m, details, IDX_STATE, Value::Logic(false));
                Bounce::Done(atom)
            } else {
                // No more yields: exhausted, idempotently, from here on.
                set_details_slot(m, details, IDX_STATE, Value::Logic(true));
                Bounce::Done(Atom::Null)
            }
        }

        (LevelState::BodyRunning, Arrival::Caught(thrown)) => {
            // Unwound from outside: a clean exit, not an error.  Let the
            // transfer keep going.
            set_details_slot(m, details, IDX_STATE, Value::Logic(true));
            Bounce::Throw(thrown)
        }

        (LevelState::Yielded(value), Arrival::Rewound) => {
            apply_chains_from(m, lv, details, 0, Atom::Value(value))
        }

        (LevelState::ApplyingChain { next }, Arrival::Completion(atom)) => {
            if atom.is_failure() {
                return Bounce::Done(atom);
            }
            apply_chains_from(m, lv, details, next, atom)
        }

        (LevelState::ApplyingChain { .. }, Arrival::Caught(thrown)) => {
            // Thrown through while delivering: finished, not errored.
            set_details_slot(m, details, IDX_STATE, Value::Logic(true));
            Bounce::Throw(thrown)
        }

        (state, arrival) => {
            panic!("yielder re-entered with {:?} / {:?}", state, arrival)
        }
    }
}

fn start_fresh(m: &mut Machine, lv: LevelId, details: ArrayId) -> Bounce {
    set_details_slot(m, details, IDX_STATE, running_sentinel());

    let varlist = m.heap.level(lv).varlist.expect("generator without frame");
    let yield_slot = m
        .heap
        .find_key(varlist, yield_sym())
        .expect("generator frame lost its yield slot");
    let yielder = details_slot(m, details, IDX_YIELD);
    m.heap.set_slot(varlist, yield_slot, yielder);

    let body = match details_slot(m, details, IDX_BODY) {
        Value::Block(b) => b,
        other => panic!("corrupt yielder body slot: {:?}", other),
    };
    let feed = m.feed_over(body, Some(varlist));
    m.heap.level_mut(lv).catches = true;
    m.heap.level_mut(lv).state = LevelState::BodyRunning;
    let child = m.push_level(LevelKind::Stepper, feed, Some(lv));
    Bounce::Continue(child)
}

/// Resume a suspended activation under this fresh invocation.
///
/// Identity rule: the context captured at suspension survives — external
/// FRAME! references keep working — while its non-local argument slots are
/// refreshed from this call's arguments.  The fresh frame built by argument
/// gathering is then reclaimed, leaving an inaccessible stub any dangling
/// reference (and the tracer) must tolerate.
fn resume(
    m: &mut Machine,
    lv: LevelId,
    action: ActionId,
    details: ArrayId,
    old_ctx: ContextId,
) -> Bounce {
    set_details_slot(m, details, IDX_STATE, running_sentinel());

    let new_ctx = m.heap.level(lv).varlist.expect("generator without frame");
    let params = m.heap.action(action).params;
    let key_count = m.heap.keylist(params).keys.len();
    for i in 0..key_count {
        let key = m.heap.keylist(params).keys[i];
        if key.flags.has(KeyFlags::LOCAL) {
            continue;
        }
        let refreshed = m.heap.slot(new_ctx, i);
        m.heap.set_slot(old_ctx, i, refreshed);
    }
    m.heap.reclaim_context(new_ctx);

    m.heap.level_mut(lv).varlist = Some(old_ctx);
    m.heap.context_mut(old_ctx).kind =
        ContextKind::Frame { action, level: Some(lv) };

    let plug = match details_slot(m, details, IDX_PLUG) {
        Value::Plug(p) => p,
        other => panic!("corrupt yielder plug slot: {:?}", other),
    };
    set_details_slot(m, details, IDX_PLUG, Value::Blank);

    // Splice the fragment back in; the innermost level is the suspended
    // yield call, primed to report the value cached at suspension.
    let innermost = m.replug(plug, lv);
    m.heap.level_mut(lv).catches = true;
    m.heap.level_mut(lv).state = LevelState::BodyRunning;
    Bounce::Continue(innermost)
}

/// Deliver a yielded value, running it through the chain block first.
fn apply_chains_from(
    m: &mut Machine,
    lv: LevelId,
    details: ArrayId,
    next: usize,
    atom: Atom,
) -> Bounce {
    let chains = match details_slot(m, details, IDX_CHAINS) {
        Value::Block(b) => b,
        other => panic!("corrupt chain block in yielder details: {:?}", other),
    };
    let count = m.heap.array(chains).values.len();
    if next >= count {
        return Bounce::Done(atom);
    }
    let transform = match m.heap.array(chains).values[next] {
        Value::Action(a) => a,
        other => panic!("non-action in yielder chain block: {:?}", other),
    };
    let value = match atom.to_value() {
        Ok(v) => v,
        Err(f) => return Bounce::Done(Atom::Failure(f)),
    };
    m.heap.level_mut(lv).state = LevelState::ApplyingChain { next: next + 1 };
    let child = m.push_apply(transform, &[value], Some(lv));
    Bounce::Continue(child)
}

//===----------------------------------------------------------------------===//
// Yield dispatcher
//===----------------------------------------------------------------------===//

pub(crate) fn yield_dispatch(m: &mut Machine, lv: LevelId, arrival: Arrival) -> Bounce {
    let state = m.heap.level(lv).state;
    match (state, arrival) {
        (LevelState::Initial, Arrival::First) => {
            let varlist = m.heap.level(lv).varlist.expect("yield without frame");
            let argument = m.heap.slot(varlist, 0);

            // Yielding null is a no-op: null from the generator itself means
            // "exhausted", so it is inexpressible as a yielded value.
            if argument == Value::Quasi(Quasiform::Null) {
                return Bounce::Done(Atom::Null);
            }

            let my_action = m.heap.level(lv).action.expect("yield without action");
            let my_details = m.heap.action(my_action).details;
            let owner = match details_slot(m, my_details, IDX_OWNER) {
                Value::Action(a) => a,
                other => panic!("corrupt yield owner slot: {:?}", other),
            };

            let owner_details = m.heap.action(owner).details;
            if let Value::Logic(_) = details_slot(m, owner_details, IDX_STATE) {
                return fail(Failure::YieldExpired);
            }

            // The owning activation must be somewhere below us.
            let mut cursor = m.heap.level(lv).prior;
            let gen_lv = loop {
                match cursor {
                    None => return fail(Failure::YieldNoBinding),
                    Some(l) => {
                        if m.heap.level(l).action == Some(owner) {
                            break l;
                        }
                        cursor = m.heap.level(l).prior;
                    }
                }
            };

            suspend(m, lv, gen_lv, owner_details, argument)
        }
        (state, arrival) => {
            panic!("yield re-entered with {:?} / {:?}", state, arrival)
        }
    }
}

fn suspend(
    m: &mut Machine,
    yield_lv: LevelId,
    gen_lv: LevelId,
    owner_details: ArrayId,
    value: Value,
) -> Bounce {
    let gen_ctx = m.heap.level(gen_lv).varlist.expect("generator without frame");

    // When the fragment is replugged, this level reports the yielded value
    // as yield's own result — fixed now, not at resume time.
    m.heap.level_mut(yield_lv).state = LevelState::Returning(value);

    let saved_out = m.heap.level(gen_lv).out.clone();
    let plug = m.unplug(gen_lv, saved_out);

    set_details_slot(m, owner_details, IDX_STATE, Value::Frame(gen_ctx));
    set_details_slot(m, owner_details, IDX_LAST_CTX, Value::Frame(gen_ctx));
    set_details_slot(m, owner_details, IDX_LAST_RESULT, value);
    set_details_slot(m, owner_details, IDX_PLUG, Value::Plug(plug));

    m.heap.level_mut(gen_lv).state = LevelState::Yielded(value);
    Bounce::Rewind(gen_lv)
}
