//! Actions: a callable's persistent identity.
//!
//! An action is a parameter schema (a keylist, shared with every invocation
//! frame it spawns), a dispatcher, and a private `details` array — fixed
//! layout auxiliary storage that survives across calls.  For most actions
//! details is inert configuration (a body block); for generators it is the
//! live suspension record, mutated on every call.
//!
//! Slot 0 of every details array is the archetype: an `Action` value
//! pointing back at the owner.  The collector verifies this backlink after
//! marking.

use crate::heap::{ArrayId, Heap, KeyListId, LevelId};
use crate::interner::SymId;
use crate::trampoline::{Arrival, Bounce, Machine};
use crate::value::Value;

/// Dispatcher signature shared by every native: never recurse into the
/// evaluator — describe the next move with the returned `Bounce`.
pub type NativeFn = fn(&mut Machine, LevelId, Arrival) -> Bounce;

/// The closed set of dispatcher identities.
#[derive(Copy, Clone)]
pub enum Dispatcher {
    /// Run the body block in details with the frame as binding.
    Block,
    /// Built-in behavior.
    Native(NativeFn),
    /// Suspendable generator (see `generator`).
    Generator,
    /// The per-instance yield action of a generator.
    Yield,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Block => write!(f, "Block"),
            Dispatcher::Native(_) => write!(f, "Native"),
            Dispatcher::Generator => write!(f, "Generator"),
            Dispatcher::Yield => write!(f, "Yield"),
        }
    }
}

pub struct Action {
    pub params: KeyListId,
    pub dispatcher: Dispatcher,
    pub details: ArrayId,
    pub label: Option<SymId>,
}

/// Details slot 0: the archetype backlink.
pub const IDX_ARCHETYPE: usize = 0;
/// Details slot 1 of `Block` actions: the body block.
pub const IDX_BODY: usize = 1;

/// Write the archetype backlink once the action id exists.
pub fn seal_details(heap: &mut Heap, action: crate::heap::ActionId) {
    let details = heap.action(action).details;
    heap.array_mut(details).values[IDX_ARCHETYPE] = Value::Action(action);
}
