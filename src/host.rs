//! The embedding boundary.
//!
//! Everything here is a synchronous wrapper: build values, bind words,
//! construct actions, then run a block or apply an action to completion.
//! These entry points are the only places the trampoline loop is driven;
//! native extension code re-enters evaluation exclusively through them.

use crate::action::{seal_details, Action, Dispatcher, NativeFn, IDX_BODY};
use crate::error::HostError;
use crate::gc;
use crate::generator;
use crate::heap::{
    ActionId, ArrayId, ContextId, ContextKind, Heap, Key, KeyFlags, LevelId,
    ParamClass,
};
use crate::interner::{self, SymId};
use crate::level::LevelKind;
use crate::natives;
use crate::trampoline::Machine;
use crate::value::{Atom, Value};

/// Convenience constructors for building source arrays programmatically
/// (this core has no parser; source arrives as data).
pub fn word(name: &str) -> Value {
    Value::Word(interner::intern(name))
}

pub fn set_word(name: &str) -> Value {
    Value::SetWord(interner::intern(name))
}

pub fn get_word(name: &str) -> Value {
    Value::GetWord(interner::intern(name))
}

impl Machine {
    pub fn new() -> Machine {
        let mut heap = Heap::new();
        let lib_keys = heap.alloc_keylist(Vec::new());
        let lib = heap.alloc_context(lib_keys, ContextKind::Object, None);
        let empty_block = heap.alloc_array(Vec::new(), false);
        heap.freeze_array(empty_block);
        let mut machine = Machine {
            heap,
            top: None,
            data_stack: Vec::new(),
            guards: Vec::new(),
            lib,
            empty_block,
            gc_threshold: 65_536,
        };
        natives::install(&mut machine);
        machine
    }

    //===------------------------------------------------------------------===//
    // Running
    //===------------------------------------------------------------------===//

    /// Evaluate a source array to completion and hand back the product.
    pub fn eval_block(
        &mut self,
        block: ArrayId,
        binding: Option<ContextId>,
    ) -> Result<Atom, HostError> {
        let feed = self.feed_over(block, binding);
        let root = self.push_level(LevelKind::Stepper, feed, None);
        self.run(root)
    }

    /// Build a managed block from these values and evaluate it.
    pub fn eval(&mut self, values: Vec<Value>) -> Result<Atom, HostError> {
        let block = self.heap.alloc_array(values, true);
        self.eval_block(block, None)
    }

    /// Invoke an action on pre-evaluated arguments.
    pub fn apply(
        &mut self,
        action: ActionId,
        args: &[Value],
    ) -> Result<Atom, HostError> {
        let root = self.push_apply(action, args, None);
        self.run(root)
    }

    /// Push an invocation whose frame is already filled — no argument
    /// gathering, no feed consumption.  Used for applying chain transforms
    /// and by `apply`.
    pub(crate) fn push_apply(
        &mut self,
        action: ActionId,
        args: &[Value],
        prior: Option<LevelId>,
    ) -> LevelId {
        let feed = self.empty_feed();
        let lv = self.push_invoke(action, feed, prior);
        let params = self.heap.action(action).params;
        let varlist = self.heap.alloc_context(
            params,
            ContextKind::Frame { action, level: Some(lv) },
            Some(self.lib),
        );
        let key_count = self.heap.keylist(params).keys.len();
        let mut supplied = args.iter();
        for i in 0..key_count {
            let key = self.heap.keylist(params).keys[i];
            if key.flags.has(KeyFlags::LOCAL) {
                continue;
            }
            let value = *supplied.next().expect("not enough arguments for apply");
            self.heap.set_slot(varlist, i, value);
        }
        assert!(supplied.next().is_none(), "too many arguments for apply");
        let level = self.heap.level_mut(lv);
        level.varlist = Some(varlist);
        level.dispatching = true;
        lv
    }

    /// Run a full collection cycle now.
    pub fn collect_garbage(&mut self) {
        gc::collect(self);
    }

    //===------------------------------------------------------------------===//
    // Roots
    //===------------------------------------------------------------------===//

    /// Register a value as a GC root until released.
    pub fn guard(&mut self, value: Value) {
        self.guards.push(value);
    }

    /// Release a previously guarded value (first match).
    pub fn unguard(&mut self, value: Value) {
        if let Some(pos) = self.guards.iter().position(|v| *v == value) {
            self.guards.remove(pos);
        }
    }

    //===------------------------------------------------------------------===//
    // Builders
    //===------------------------------------------------------------------===//

    pub fn make_block(&mut self, values: Vec<Value>) -> ArrayId {
        self.heap.alloc_array(values, true)
    }

    pub fn make_text(&mut self, s: &str) -> Value {
        Value::Text(self.heap.alloc_text(s))
    }

    /// Bind a word in lib.
    pub fn bind(&mut self, name: &str, value: Value) {
        let sym = interner::intern(name);
        self.assign_word(None, sym, value).expect("lib binding failed");
    }

    /// Read a word's lib binding back, if set.
    pub fn binding_of(&self, name: &str) -> Option<Value> {
        let sym = interner::intern(name);
        self.lookup_word(None, sym).ok()
    }

    pub fn make_native(
        &mut self,
        name: &str,
        params: &[(&str, ParamClass)],
        f: NativeFn,
    ) -> ActionId {
        let keys = params
            .iter()
            .map(|&(n, class)| Key {
                sym: interner::intern(n),
                class,
                flags: KeyFlags::NONE,
            })
            .collect();
        let keylist = self.heap.alloc_keylist(keys);
        let details = self.heap.alloc_array(vec![Value::Blank], true);
        let action = self.heap.alloc_action(Action {
            params: keylist,
            dispatcher: Dispatcher::Native(f),
            details,
            label: Some(interner::intern(name)),
        });
        seal_details(&mut self.heap, action);
        action
    }

    pub(crate) fn add_native(
        &mut self,
        name: &str,
        params: &[(&str, ParamClass)],
        f: NativeFn,
    ) {
        let action = self.make_native(name, params, f);
        self.bind(name, Value::Action(action));
    }

    /// An interpreted function: normal parameters, block body.
    pub fn make_function(
        &mut self,
        name: Option<&str>,
        params: &[&str],
        body: ArrayId,
    ) -> ActionId {
        let keys = params.iter().map(|n| Key::normal(interner::intern(n))).collect();
        let keylist = self.heap.alloc_keylist(keys);
        let mut details_values = vec![Value::Blank; IDX_BODY + 1];
        details_values[IDX_BODY] = Value::Block(body);
        let details = self.heap.alloc_array(details_values, true);
        let action = self.heap.alloc_action(Action {
            params: keylist,
            dispatcher: Dispatcher::Block,
            details,
            label: name.map(interner::intern),
        });
        seal_details(&mut self.heap, action);
        action
    }

    /// A generator (or parameterized yielder): suspendable via `yield`.
    pub fn make_generator(
        &mut self,
        name: Option<&str>,
        params: &[&str],
        body: ArrayId,
    ) -> ActionId {
        let params: Vec<(SymId, ParamClass)> = params
            .iter()
            .map(|n| (interner::intern(n), ParamClass::Normal))
            .collect();
        generator::make_generator(self, &params, body, name.map(interner::intern))
    }

    /// Compose a transform over every value the generator delivers.
    pub fn chain_generator(&mut self, gen: ActionId, transform: ActionId) {
        generator::add_chain(self, gen, transform);
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}
