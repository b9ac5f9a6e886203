//! The trampoline: the single loop that drives all evaluation.
//!
//! No dispatcher ever calls the evaluator recursively.  Each one is handed
//! the top level and an `Arrival` saying why it is being entered, and
//! answers with a `Bounce` saying what the machine should do next.  The
//! native call stack therefore stays flat no matter how deep the
//! interpreted call stack grows, and any run of levels can be detached,
//! stored, and reattached later.

use std::sync::Arc;

use log::trace;

use crate::error::{Failure, HostError, Thrown};
use crate::eval;
use crate::heap::{
    ActionId, ContextId, ContextKind, Feed, FeedId, Heap, Key, KeyFlags, LevelId, Ref,
};
use crate::interner::SymId;
use crate::level::{Level, LevelKind, LevelState};
use crate::value::{Atom, Quasiform, Value};

//===----------------------------------------------------------------------===//
// Bounce / Arrival
//===----------------------------------------------------------------------===//

/// What a dispatcher wants the trampoline to do next.
#[derive(Debug)]
pub enum Bounce {
    /// The level finished with this product: pop it and deliver upward.
    Done(Atom),
    /// Make this level the new top.  Its prior chain must already link into
    /// the stack — this covers both pushing one child and splicing a
    /// replugged fragment whose bottom was relinked beforehand.
    Continue(LevelId),
    /// Make an existing lower level the top and re-enter it.  Any levels
    /// still linked above it are discarded; a yield detaches them first.
    Rewind(LevelId),
    /// Unwind a non-local control transfer toward a catching level.
    Throw(Thrown),
}

/// Why a dispatcher is being entered.
#[derive(Debug)]
pub enum Arrival {
    /// The level was just pushed.
    First,
    /// A child level completed with this product.
    Completion(Atom),
    /// A child threw and this level catches throws.
    Caught(Thrown),
    /// A `Rewind` landed here.
    Rewound,
}

//===----------------------------------------------------------------------===//
// Machine
//===----------------------------------------------------------------------===//

pub struct Machine {
    pub heap: Heap,
    /// Top of the live level stack; `None` whenever the machine is idle.
    pub(crate) top: Option<LevelId>,
    /// Auxiliary value stack dispatchers accumulate intermediate results on.
    pub(crate) data_stack: Vec<Value>,
    /// Host-registered root values.
    pub(crate) guards: Vec<Value>,
    /// The global variable context words fall back to.
    pub lib: ContextId,
    /// Shared empty source array for frames that read no source.
    pub(crate) empty_block: crate::heap::ArrayId,
    pub(crate) gc_threshold: usize,
}

impl Machine {
    //===------------------------------------------------------------------===//
    // Level stack plumbing
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub(crate) fn push_level(
        &mut self,
        kind: LevelKind,
        feed: FeedId,
        prior: Option<LevelId>,
    ) -> LevelId {
        let mut level = Level::new(kind, feed, self.data_stack.len());
        level.prior = prior;
        self.heap.alloc_level(level)
    }

    #[track_caller]
    pub(crate) fn push_invoke(
        &mut self,
        action: ActionId,
        feed: FeedId,
        prior: Option<LevelId>,
    ) -> LevelId {
        let lv = self.push_level(LevelKind::Invoke, feed, prior);
        self.heap.level_mut(lv).action = Some(action);
        lv
    }

    /// Pop a level: restore the data stack to its baseline, detach any frame
    /// context's backlink (the context may outlive the level), free the slot.
    pub(crate) fn drop_level(&mut self, id: LevelId) {
        let baseline = self.heap.level(id).baseline;
        let varlist = self.heap.level(id).varlist;
        self.data_stack.truncate(baseline);
        if let Some(ctx) = varlist {
            if matches!(self.heap.try_context(ctx), Ref::Live(_)) {
                if let ContextKind::Frame { level, .. } =
                    &mut self.heap.context_mut(ctx).kind
                {
                    if *level == Some(id) {
                        *level = None;
                    }
                }
            }
        }
        self.heap.free_level(id);
    }

    //===------------------------------------------------------------------===//
    // Word access
    //===------------------------------------------------------------------===//

    /// Resolve a word through the binding chain, falling back to lib.
    pub(crate) fn lookup_word(
        &self,
        binding: Option<ContextId>,
        sym: SymId,
    ) -> Result<Value, Arc<Failure>> {
        let found = self
            .heap
            .lookup(binding, sym)
            .or_else(|| self.heap.lookup(Some(self.lib), sym));
        match found {
            None => Err(Arc::new(Failure::UnboundWord(sym))),
            Some((ctx, slot)) => {
                let value = self.heap.slot(ctx, slot);
                if value == Value::Quasi(Quasiform::Tripwire) {
                    Err(Arc::new(Failure::UnsetWord(sym)))
                } else {
                    Ok(value)
                }
            }
        }
    }

    /// Assign through a set-word.  An existing slot is overwritten in place;
    /// otherwise a key is appended to the binding context (or lib).
    pub(crate) fn assign_word(
        &mut self,
        binding: Option<ContextId>,
        sym: SymId,
        value: Value,
    ) -> Result<(), Arc<Failure>> {
        let found = self
            .heap
            .lookup(binding, sym)
            .or_else(|| self.heap.lookup(Some(self.lib), sym));
        if let Some((ctx, slot)) = found {
            let keylist = self.heap.context(ctx).keylist;
            if self.heap.keylist(keylist).keys[slot].flags.has(KeyFlags::PROTECTED) {
                return Err(Arc::new(Failure::Protected));
            }
            self.heap.set_slot(ctx, slot, value);
            return Ok(());
        }
        let target = binding.unwrap_or(self.lib);
        let index = self.heap.append_key(target, Key::normal(sym));
        self.heap.set_slot(target, index, value);
        Ok(())
    }

    /// A fresh feed over an array.
    #[track_caller]
    pub(crate) fn feed_over(
        &mut self,
        block: crate::heap::ArrayId,
        binding: Option<ContextId>,
    ) -> FeedId {
        self.heap.alloc_feed(Feed { block, index: 0, binding })
    }

    /// A feed that reads nothing, for frames invoked on preloaded arguments.
    #[track_caller]
    pub(crate) fn empty_feed(&mut self) -> FeedId {
        let block = self.empty_block;
        self.feed_over(block, None)
    }

    //===------------------------------------------------------------------===//
    // The loop
    //===------------------------------------------------------------------===//

    /// Drive the trampoline until `root` completes.  The only place in the
    /// crate that loops over dispatch; the host entry points wrap it.
    pub(crate) fn run(&mut self, root: LevelId) -> Result<Atom, HostError> {
        self.top = Some(root);
        let mut arrival = Arrival::First;
        loop {
            let top = self.top.expect("trampoline ran dry without completing root");
            let bounce = self.dispatch(top, arrival);
            trace!(
                "bounce {:?} from {:?} ({:?})",
                bounce_name(&bounce),
                top,
                self.heap.level(top).kind
            );
            match bounce {
                Bounce::Done(atom) => {
                    let prior = self.heap.level(top).prior;
                    self.drop_level(top);
                    if top == root {
                        self.top = None;
                        return Ok(atom);
                    }
                    let parent = prior.expect("completed level had no parent");
                    self.top = Some(parent);
                    arrival = Arrival::Completion(atom);
                }
                Bounce::Continue(child) => {
                    self.top = Some(child);
                    arrival = Arrival::First;
                }
                Bounce::Rewind(target) => {
                    while self.top != Some(target) {
                        let t = self.top.expect("rewind target not on the stack");
                        let prior = self.heap.level(t).prior;
                        self.drop_level(t);
                        self.top = prior;
                    }
                    arrival = Arrival::Rewound;
                }
                Bounce::Throw(thrown) => {
                    let mut t = top;
                    loop {
                        let prior = self.heap.level(t).prior;
                        self.drop_level(t);
                        if t == root {
                            self.top = None;
                            return Err(HostError::UncaughtThrow(thrown));
                        }
                        let parent = prior.expect("throw unwound past level chain");
                        self.top = Some(parent);
                        if self.heap.level(parent).catches {
                            arrival = Arrival::Caught(thrown);
                            break;
                        }
                        t = parent;
                    }
                }
            }
        }
    }

    /// Enter the top level's machinery once.
    fn dispatch(&mut self, lv: LevelId, arrival: Arrival) -> Bounce {
        // A replugged suspension point delivers its fixed result without
        // re-entering the dispatcher that suspended.
        if let LevelState::Returning(value) = self.heap.level(lv).state {
            return Bounce::Done(Atom::Value(value));
        }
        match self.heap.level(lv).kind {
            LevelKind::Stepper => eval::stepper(self, lv, arrival),
            LevelKind::OneStep => eval::one_step(self, lv, arrival),
            LevelKind::Invoke => eval::invoke(self, lv, arrival),
        }
    }

    //===------------------------------------------------------------------===//
    // Collection hooks
    //===------------------------------------------------------------------===//

    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold.max(1);
    }

    pub fn should_collect(&self) -> bool {
        self.heap.live_count() >= self.gc_threshold
    }
}

fn bounce_name(bounce: &Bounce) -> &'static str {
    match bounce {
        Bounce::Done(_) => "done",
        Bounce::Continue(_) => "continue",
        Bounce::Rewind(_) => "rewind",
        Bounce::Throw(_) => "throw",
    }
}
