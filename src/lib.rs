//! A stackless evaluator core for a Rebol-family runtime.
//!
//! Call frames are heap data (`Level`), the call stack is a handle chain,
//! and one trampoline loop drives everything by interpreting the `Bounce`
//! each dispatcher returns.  Because no dispatcher recurses into the
//! evaluator, any run of frames can be detached mid-expression (`unplug`),
//! stored as an ordinary traced value, and spliced back in later
//! (`replug`) — which is all a generator's `yield` is.
//!
//! The crate has no parser: source arrives as arrays of values, built
//! programmatically through the host API on [`Machine`].

pub mod action;
pub mod crash;
pub mod error;
pub mod heap;
pub mod interner;
pub mod level;
pub mod mold;
pub mod trampoline;
pub mod value;

mod eval;
mod gc;
mod generator;
mod host;
mod natives;
mod plug;

pub use error::{Failure, HostError, ThrowLabel, Thrown};
pub use heap::{
    ActionId, ArrayId, ContextId, FeedId, HandleId, KeyListId, LevelId, ParamClass,
    PlugId, TextId,
};
pub use host::{get_word, set_word, word};
pub use trampoline::{Arrival, Bounce, Machine};
pub use value::{Atom, Quasiform, Value};
