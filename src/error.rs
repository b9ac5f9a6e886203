//! Error channels of the core.
//!
//! Three disjoint paths, escalating in severity:
//!
//! - `Failure`: cooperative errors.  Carried as an ordinary evaluation
//!   product (`Atom::Failure`) through normal completion paths; always
//!   visible to the immediate caller, recoverable by anything that chooses
//!   to inspect it (e.g. `attempt`).
//! - `Thrown`: non-local control transfers (throw, function return).  Not
//!   errors; unwound level by level, interceptable by levels that enable
//!   throw catching.
//! - invariant violations: `panic!` through `crash` with a diagnostic dump.
//!   Never recoverable by interpreted code.

use std::fmt;

use crate::heap::ContextId;
use crate::interner::{self, SymId};
use crate::value::Atom;

//===----------------------------------------------------------------------===//
// Failure
//===----------------------------------------------------------------------===//

#[derive(Debug, Clone)]
pub enum Failure {
    /// Generic script error with a message.
    Script(String),
    /// A word resolved to no binding at all.
    UnboundWord(SymId),
    /// A word's slot exists but holds the unset marker.
    UnsetWord(SymId),
    /// A value of the wrong datatype reached an operation.
    WrongType { expected: &'static str, actual: &'static str },
    /// An argument or expression was required but the feed ran out.
    NeedsValue(SymId),
    /// Attempted mutation of a protected slot or frozen array.
    Protected,
    /// An antiform reached a storage position.
    AntiformStore(&'static str),

    // Generator family.
    /// A generator was invoked while an activation was already running.
    YielderReentered,
    /// A generator whose last activation errored was invoked again.
    YielderErrored,
    /// `yield` ran with no enclosing generator activation on the stack.
    YieldNoBinding,
    /// `yield` ran for a generator that already finished.
    YieldExpired,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Failure::Script(msg) => write!(f, "Script error: {}", msg),
            Failure::UnboundWord(sym) => {
                write!(f, "Unbound word: {}", interner::spelling(*sym))
            }
            Failure::UnsetWord(sym) => {
                write!(f, "Word has no value: {}", interner::spelling(*sym))
            }
            Failure::WrongType { expected, actual } => {
                write!(f, "Type error: expected {}, got {}", expected, actual)
            }
            Failure::NeedsValue(sym) => {
                write!(f, "Missing value for: {}", interner::spelling(*sym))
            }
            Failure::Protected => write!(f, "Attempt to modify protected data"),
            Failure::AntiformStore(kind) => {
                write!(f, "Cannot store {} antiform in a slot", kind)
            }
            Failure::YielderReentered => {
                write!(f, "Yielder was re-entered while running")
            }
            Failure::YielderErrored => {
                write!(f, "Yielder cannot resume after error")
            }
            Failure::YieldNoBinding => {
                write!(f, "No running yielder to yield to")
            }
            Failure::YieldExpired => {
                write!(f, "Cannot yield to a finished yielder")
            }
        }
    }
}

//===----------------------------------------------------------------------===//
// Thrown
//===----------------------------------------------------------------------===//

/// Identifies what a thrown value is aimed at.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ThrowLabel {
    /// A plain `throw`, caught by the nearest `catch`.
    Throw,
    /// A function `return`, caught by the frame whose varlist this is.
    Return(ContextId),
}

/// A non-local control transfer in flight.
#[derive(Clone, Debug)]
pub struct Thrown {
    pub label: ThrowLabel,
    pub atom: Atom,
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.label {
            ThrowLabel::Throw => write!(f, "throw"),
            ThrowLabel::Return(_) => write!(f, "return"),
        }
    }
}

//===----------------------------------------------------------------------===//
// HostError
//===----------------------------------------------------------------------===//

/// What the embedding API reports when a run cannot produce a result.
#[derive(Debug)]
pub enum HostError {
    /// A throw unwound past the root level without being intercepted.
    UncaughtThrow(Thrown),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostError::UncaughtThrow(t) => write!(f, "Uncaught {}", t),
        }
    }
}
