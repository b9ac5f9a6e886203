//! Levels: heap-resident call frames.
//!
//! A level is one in-progress evaluation — the stackless analog of a native
//! stack frame.  It records where it is reading from (a shared feed), where
//! its result goes (`out`), a scratch cell, the action being invoked (if
//! any) with its argument frame, and a typed resume state.  Levels link
//! through `prior` to form the logical call stack; the trampoline only ever
//! looks at the top one.

use crate::heap::{ActionId, ContextId, FeedId, LevelId};
use crate::interner::SymId;
use crate::value::{Atom, Value};

/// Which machinery drives this level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LevelKind {
    /// Evaluate every expression of a feed; result is the last product.
    Stepper,
    /// Evaluate exactly one expression from a shared feed.
    OneStep,
    /// Invoke an action: gather arguments, then run its dispatcher.
    Invoke,
}

/// Typed resume points.  A dispatcher is re-entered from the top on every
/// bounce and matches on `(state, arrival)`; nothing survives across
/// re-entry except what is stored here or in the level/details.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LevelState {
    Initial,

    // Stepper
    /// Waiting for the current expression's product.
    SteppingAwait,

    // OneStep
    /// Waiting for a sub-product (group or action result).
    AwaitProduct,
    /// Waiting for the value to assign to a set-word.
    AwaitSet(SymId),

    // Invoke argument gathering
    /// Filling the argument slot at this key index.
    Gathering { next: usize },

    // Common dispatcher states
    /// A body/branch stepper was pushed; deliver its completion.
    AwaitBody,
    /// Deliver this value immediately on next entry (set when a suspended
    /// yield is replugged: its apparent return was fixed at suspension).
    Returning(Value),

    // Generator dispatcher
    /// The generator body is executing above this level.
    BodyRunning,
    /// A yield rewound to here carrying this value.
    Yielded(Value),
    /// Post-processing chain actions are being applied to a delivery.
    ApplyingChain { next: usize },

    // Reduce native
    /// Accumulating reduced values onto the data stack.
    Reducing,
}

pub struct Level {
    pub prior: Option<LevelId>,
    pub feed: FeedId,
    /// The step's result cell.  Reused across steps; a suspension must save
    /// and restore it.
    pub out: Atom,
    /// Scratch cell for dispatcher-internal intermediates.
    pub spare: Atom,
    pub kind: LevelKind,
    pub action: Option<ActionId>,
    /// Argument frame of an invocation, once built.  Exposed to user code as
    /// a FRAME! value, so its identity must survive suspend/resume.
    pub varlist: Option<ContextId>,
    pub state: LevelState,
    /// Argument gathering is done; arrivals go to the action's dispatcher.
    pub dispatching: bool,
    /// Throws from children are delivered to this dispatcher instead of
    /// propagating past it.
    pub catches: bool,
    /// Data-stack length when this level was pushed; restored on pop,
    /// shifted on replug.
    pub baseline: usize,
}

impl Level {
    pub fn new(kind: LevelKind, feed: FeedId, baseline: usize) -> Level {
        Level {
            prior: None,
            feed,
            out: Atom::Void,
            spare: Atom::Void,
            kind,
            action: None,
            varlist: None,
            state: LevelState::Initial,
            dispatching: false,
            catches: false,
            baseline,
        }
    }
}
