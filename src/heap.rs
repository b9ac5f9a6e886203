//! The managed heap: typed arenas for every heap-resident structure.
//!
//! Everything an evaluation can reference — arrays, contexts, keylists,
//! actions, levels, feeds, plugs, texts, handles — lives in an arena and is
//! addressed by a copyable `{index, gen}` handle.  The generation counter
//! detects use-after-free: checked accessors panic on a stale handle instead
//! of returning another object's data.
//!
//! A slot is in one of three states: free, live, or *reclaimed* — storage
//! withdrawn while structural references may still exist (e.g. a varlist
//! whose arguments were stolen during a generator resume).  Checked access
//! to a reclaimed slot panics; the collector goes through `try_*` accessors,
//! which report the tri-state so tracing can skip the stub without touching
//! its former contents.

use std::panic::Location;

use crate::action::Action;
use crate::interner::SymId;
use crate::level::Level;
use crate::value::{Atom, Quasiform, Value};

//===----------------------------------------------------------------------===//
// Handles
//===----------------------------------------------------------------------===//

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) index: u32,
            pub(crate) gen: u32,
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({}/{})"), self.index, self.gen)
            }
        }
    };
}

define_handle!(ArrayId);
define_handle!(TextId);
define_handle!(ContextId);
define_handle!(KeyListId);
define_handle!(ActionId);
define_handle!(LevelId);
define_handle!(FeedId);
define_handle!(PlugId);
define_handle!(HandleId);

/// What a structural reference currently points at.
pub enum Ref<'a, T> {
    /// No such slot (stale generation or freed).
    Absent,
    /// Alive; must be traced.
    Live(&'a T),
    /// Identity still reserved but storage withdrawn; must not be traced.
    Reclaimed,
}

//===----------------------------------------------------------------------===//
// Arena
//===----------------------------------------------------------------------===//

enum SlotBody<T> {
    Free,
    Live(T),
    Reclaimed,
}

struct Slot<T> {
    gen: u32,
    body: SlotBody<T>,
    origin: &'static Location<'static>,
}

pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), live: 0 }
    }

    #[track_caller]
    fn alloc(&mut self, body: T) -> (u32, u32) {
        let origin = Location::caller();
        self.live += 1;
        if let Some(i) = self.free.pop() {
            let slot = &mut self.slots[i as usize];
            slot.body = SlotBody::Live(body);
            slot.origin = origin;
            (i, slot.gen)
        } else {
            let i = self.slots.len() as u32;
            self.slots.push(Slot { gen: 0, body: SlotBody::Live(body), origin });
            (i, 0)
        }
    }

    fn get(&self, index: u32, gen: u32, what: &'static str) -> &T {
        let slot = self.slots.get(index as usize).unwrap_or_else(|| {
            panic!("{} handle {}/{} out of range", what, index, gen)
        });
        if slot.gen != gen {
            panic!(
                "stale {} handle {}/{} (current gen {}, allocated at {})",
                what, index, gen, slot.gen, slot.origin
            );
        }
        match &slot.body {
            SlotBody::Live(t) => t,
            SlotBody::Reclaimed => panic!(
                "{} {}/{} accessed after reclaim (allocated at {})",
                what, index, gen, slot.origin
            ),
            SlotBody::Free => {
                panic!("{} {}/{} accessed after free", what, index, gen)
            }
        }
    }

    fn get_mut(&mut self, index: u32, gen: u32, what: &'static str) -> &mut T {
        let slot = self.slots.get_mut(index as usize).unwrap_or_else(|| {
            panic!("{} handle {}/{} out of range", what, index, gen)
        });
        if slot.gen != gen {
            panic!("stale {} handle {}/{} (current gen {})", what, index, gen, slot.gen);
        }
        match &mut slot.body {
            SlotBody::Live(t) => t,
            SlotBody::Reclaimed => {
                panic!("{} {}/{} accessed after reclaim", what, index, gen)
            }
            SlotBody::Free => {
                panic!("{} {}/{} accessed after free", what, index, gen)
            }
        }
    }

    pub(crate) fn try_get(&self, index: u32, gen: u32) -> Ref<'_, T> {
        match self.slots.get(index as usize) {
            None => Ref::Absent,
            Some(slot) if slot.gen != gen => Ref::Absent,
            Some(slot) => match &slot.body {
                SlotBody::Live(t) => Ref::Live(t),
                SlotBody::Reclaimed => Ref::Reclaimed,
                SlotBody::Free => Ref::Absent,
            },
        }
    }

    /// Withdraw storage but keep the slot's identity reserved.  Structural
    /// references become "present but inaccessible" until the next sweep
    /// finds them unreferenced.
    fn reclaim(&mut self, index: u32, gen: u32, what: &'static str) {
        let slot = &mut self.slots[index as usize];
        assert_eq!(slot.gen, gen, "reclaim of stale {} handle", what);
        if matches!(slot.body, SlotBody::Live(_)) {
            self.live -= 1;
        }
        slot.body = SlotBody::Reclaimed;
    }

    /// Return the slot to the free list, bumping the generation so every
    /// outstanding handle goes stale.
    fn release(&mut self, index: u32) -> Option<T> {
        let slot = &mut self.slots[index as usize];
        let prior = std::mem::replace(&mut slot.body, SlotBody::Free);
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(index);
        match prior {
            SlotBody::Live(t) => {
                self.live -= 1;
                Some(t)
            }
            _ => None,
        }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    pub(crate) fn origin_of(&self, index: u32) -> &'static Location<'static> {
        self.slots[index as usize].origin
    }

    pub(crate) fn is_live(&self, index: u32) -> bool {
        matches!(self.slots[index as usize].body, SlotBody::Live(_))
    }

    pub(crate) fn is_free(&self, index: u32) -> bool {
        matches!(self.slots[index as usize].body, SlotBody::Free)
    }

    pub(crate) fn gen_of(&self, index: u32) -> u32 {
        self.slots[index as usize].gen
    }
}

//===----------------------------------------------------------------------===//
// Node payloads
//===----------------------------------------------------------------------===//

/// Ordered sequence of values.
pub struct Array {
    pub values: Vec<Value>,
    /// Managed arrays belong to the collector and are never explicitly
    /// freed; unmanaged arrays are sweep-exempt and must be freed or handed
    /// over via `manage_array`.
    pub managed: bool,
    pub frozen: bool,
}

/// Parameter/variable class of a key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamClass {
    /// Argument is evaluated.
    Normal,
    /// Argument is taken literally from the feed.
    Quoted,
    /// Argument is evaluated; antiform products arrive reified.
    Meta,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyFlags(u8);

impl KeyFlags {
    pub const NONE: KeyFlags = KeyFlags(0);
    /// Not an argument slot: skipped by gathering and by the resume-time
    /// argument copy.
    pub const LOCAL: KeyFlags = KeyFlags(1);
    /// Invisible to word lookup.
    pub const HIDDEN: KeyFlags = KeyFlags(1 << 1);
    /// Assignment through a word is refused.
    pub const PROTECTED: KeyFlags = KeyFlags(1 << 2);

    pub fn has(self, other: KeyFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn with(self, other: KeyFlags) -> KeyFlags {
        KeyFlags(self.0 | other.0)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Key {
    pub sym: SymId,
    pub class: ParamClass,
    pub flags: KeyFlags,
}

impl Key {
    pub fn normal(sym: SymId) -> Key {
        Key { sym, class: ParamClass::Normal, flags: KeyFlags::NONE }
    }
}

/// Schema shared by contexts of identical shape.  Once a key is appended at
/// an index, that index is permanent; words cache it.
pub struct KeyList {
    pub keys: Vec<Key>,
    /// How many contexts/actions currently use this schema; mutation while
    /// shared must copy first.
    pub(crate) users: u32,
}

/// Archetype of a context: what it is a variable frame *for*.
#[derive(Copy, Clone, Debug)]
pub enum ContextKind {
    Object,
    Frame { action: ActionId, level: Option<LevelId> },
}

/// Symbol-indexed variable storage: object instances and call frames.
pub struct Context {
    pub keylist: KeyListId,
    pub slots: Vec<Value>,
    pub kind: ContextKind,
    pub parent: Option<ContextId>,
}

/// Shared instruction pointer: a read position in a source array plus the
/// lexical binding for words read from it.  Parent and child levels share
/// one feed so a child's consumption advances the parent's cursor.
pub struct Feed {
    pub block: ArrayId,
    pub index: usize,
    pub binding: Option<ContextId>,
}

/// A detached run of levels plus the data-stack entries they had pushed.
/// Inert heap data; traced like anything else.
pub struct Plug {
    /// Innermost (former top) first.
    pub levels: Vec<LevelId>,
    pub data_tail: Vec<Value>,
    /// Data-stack length at the reattachment level when captured; replug
    /// shifts the fragment's baselines by the difference.
    pub base: usize,
    /// The in-flight output of the suspended owner level.  May be an
    /// antiform, which is why it travels here and not in a details slot.
    pub saved_out: Atom,
}

/// Opaque foreign payload with optional cleanup on collection.
pub struct HandleData {
    pub data: usize,
    pub cleanup: Option<fn(usize)>,
}

//===----------------------------------------------------------------------===//
// Heap
//===----------------------------------------------------------------------===//

pub struct Heap {
    pub(crate) arrays: Arena<Array>,
    pub(crate) texts: Arena<String>,
    pub(crate) contexts: Arena<Context>,
    pub(crate) keylists: Arena<KeyList>,
    pub(crate) actions: Arena<Action>,
    pub(crate) levels: Arena<Level>,
    pub(crate) feeds: Arena<Feed>,
    pub(crate) plugs: Arena<Plug>,
    pub(crate) handles: Arena<HandleData>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            arrays: Arena::new(),
            texts: Arena::new(),
            contexts: Arena::new(),
            keylists: Arena::new(),
            actions: Arena::new(),
            levels: Arena::new(),
            feeds: Arena::new(),
            plugs: Arena::new(),
            handles: Arena::new(),
        }
    }

    /// Live node count across every arena; the collection-threshold input.
    pub fn live_count(&self) -> usize {
        self.arrays.live_count()
            + self.texts.live_count()
            + self.contexts.live_count()
            + self.keylists.live_count()
            + self.actions.live_count()
            + self.levels.live_count()
            + self.feeds.live_count()
            + self.plugs.live_count()
            + self.handles.live_count()
    }

    //===------------------------------------------------------------------===//
    // Arrays
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_array(&mut self, values: Vec<Value>, managed: bool) -> ArrayId {
        let (index, gen) =
            self.arrays.alloc(Array { values, managed, frozen: false });
        ArrayId { index, gen }
    }

    pub fn array(&self, id: ArrayId) -> &Array {
        self.arrays.get(id.index, id.gen, "array")
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut Array {
        self.arrays.get_mut(id.index, id.gen, "array")
    }

    pub fn array_append(&mut self, id: ArrayId, value: Value) -> Result<(), crate::error::Failure> {
        let arr = self.array_mut(id);
        if arr.frozen {
            return Err(crate::error::Failure::Protected);
        }
        arr.values.push(value);
        Ok(())
    }

    pub fn freeze_array(&mut self, id: ArrayId) {
        self.array_mut(id).frozen = true;
    }

    /// Hand an unmanaged array to the collector.
    pub fn manage_array(&mut self, id: ArrayId) {
        self.array_mut(id).managed = true;
    }

    /// Explicitly free an unmanaged array.  Managed arrays are never freed
    /// by hand; they become unreachable and are collected.
    pub fn free_array(&mut self, id: ArrayId) {
        assert!(
            !self.array(id).managed,
            "explicit free of a managed array {:?}",
            id
        );
        self.arrays.release(id.index);
    }

    //===------------------------------------------------------------------===//
    // Texts
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_text(&mut self, s: &str) -> TextId {
        let (index, gen) = self.texts.alloc(s.to_owned());
        TextId { index, gen }
    }

    pub fn text(&self, id: TextId) -> &str {
        self.texts.get(id.index, id.gen, "text")
    }

    //===------------------------------------------------------------------===//
    // KeyLists
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_keylist(&mut self, keys: Vec<Key>) -> KeyListId {
        let (index, gen) = self.keylists.alloc(KeyList { keys, users: 0 });
        KeyListId { index, gen }
    }

    pub fn keylist(&self, id: KeyListId) -> &KeyList {
        self.keylists.get(id.index, id.gen, "keylist")
    }

    pub(crate) fn attach_keylist(&mut self, id: KeyListId) {
        self.keylists.get_mut(id.index, id.gen, "keylist").users += 1;
    }

    pub(crate) fn release_keylist(&mut self, id: KeyListId) {
        let kl = self.keylists.get_mut(id.index, id.gen, "keylist");
        kl.users = kl.users.saturating_sub(1);
    }

    //===------------------------------------------------------------------===//
    // Contexts
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_context(
        &mut self,
        keylist: KeyListId,
        kind: ContextKind,
        parent: Option<ContextId>,
    ) -> ContextId {
        self.attach_keylist(keylist);
        let nkeys = self.keylist(keylist).keys.len();
        let slots = vec![Value::Quasi(Quasiform::Tripwire); nkeys];
        let (index, gen) =
            self.contexts.alloc(Context { keylist, slots, kind, parent });
        ContextId { index, gen }
    }

    pub fn context(&self, id: ContextId) -> &Context {
        self.contexts.get(id.index, id.gen, "context")
    }

    pub fn context_mut(&mut self, id: ContextId) -> &mut Context {
        self.contexts.get_mut(id.index, id.gen, "context")
    }

    pub fn try_context(&self, id: ContextId) -> Ref<'_, Context> {
        self.contexts.try_get(id.index, id.gen)
    }

    /// Withdraw a context's storage while outstanding `Frame`/`Context`
    /// values may still reference its identity.
    pub fn reclaim_context(&mut self, id: ContextId) {
        let keylist = self.context(id).keylist;
        self.release_keylist(keylist);
        self.contexts.reclaim(id.index, id.gen, "context");
    }

    /// Find a visible key's slot index in this context alone.
    pub fn find_key(&self, ctx: ContextId, sym: SymId) -> Option<usize> {
        let keylist = self.context(ctx).keylist;
        self.keylist(keylist)
            .keys
            .iter()
            .position(|k| k.sym == sym && !k.flags.has(KeyFlags::HIDDEN))
    }

    /// Resolve a word through the binding chain (context, then parents).
    pub fn lookup(
        &self,
        binding: Option<ContextId>,
        sym: SymId,
    ) -> Option<(ContextId, usize)> {
        let mut cursor = binding;
        while let Some(ctx) = cursor {
            if let Some(slot) = self.find_key(ctx, sym) {
                return Some((ctx, slot));
            }
            cursor = self.context(ctx).parent;
        }
        None
    }

    pub fn slot(&self, ctx: ContextId, index: usize) -> Value {
        self.context(ctx).slots[index]
    }

    pub fn set_slot(&mut self, ctx: ContextId, index: usize, value: Value) {
        self.context_mut(ctx).slots[index] = value;
    }

    /// Append a key (and an unset slot) to a context.  Copies the keylist
    /// first if it is shared; the new index is permanent.
    #[track_caller]
    pub fn append_key(&mut self, ctx: ContextId, key: Key) -> usize {
        self.ensure_unique_keylist(ctx);
        let keylist = self.context(ctx).keylist;
        let kl = self.keylists.get_mut(keylist.index, keylist.gen, "keylist");
        kl.keys.push(key);
        let index = kl.keys.len() - 1;
        self.context_mut(ctx).slots.push(Value::Quasi(Quasiform::Tripwire));
        index
    }

    /// Copy-on-write: give this context a keylist of its own if the current
    /// one is shared.  Mutating a shared keylist in place is never allowed.
    #[track_caller]
    pub fn ensure_unique_keylist(&mut self, ctx: ContextId) {
        let keylist = self.context(ctx).keylist;
        if self.keylist(keylist).users <= 1 {
            return;
        }
        let keys = self.keylist(keylist).keys.clone();
        let fresh = self.alloc_keylist(keys);
        self.attach_keylist(fresh);
        self.release_keylist(keylist);
        self.context_mut(ctx).keylist = fresh;
    }

    /// Hide a key from lookup in this context only.
    pub fn hide_key(&mut self, ctx: ContextId, sym: SymId) -> bool {
        let Some(index) = self.find_key(ctx, sym) else {
            return false;
        };
        self.ensure_unique_keylist(ctx);
        let keylist = self.context(ctx).keylist;
        let kl = self.keylists.get_mut(keylist.index, keylist.gen, "keylist");
        kl.keys[index].flags = kl.keys[index].flags.with(KeyFlags::HIDDEN);
        true
    }

    //===------------------------------------------------------------------===//
    // Actions
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_action(&mut self, action: Action) -> ActionId {
        self.attach_keylist(action.params);
        let (index, gen) = self.actions.alloc(action);
        ActionId { index, gen }
    }

    pub fn action(&self, id: ActionId) -> &Action {
        self.actions.get(id.index, id.gen, "action")
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        self.actions.get_mut(id.index, id.gen, "action")
    }

    //===------------------------------------------------------------------===//
    // Levels
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_level(&mut self, level: Level) -> LevelId {
        let (index, gen) = self.levels.alloc(level);
        LevelId { index, gen }
    }

    pub fn level(&self, id: LevelId) -> &Level {
        self.levels.get(id.index, id.gen, "level")
    }

    pub fn level_mut(&mut self, id: LevelId) -> &mut Level {
        self.levels.get_mut(id.index, id.gen, "level")
    }

    /// Free a popped level.  Levels are not reclaimed-with-identity; a
    /// popped level is gone, and anything still holding its id is a bug the
    /// generation check will catch.
    pub(crate) fn free_level(&mut self, id: LevelId) {
        self.levels.release(id.index);
    }

    //===------------------------------------------------------------------===//
    // Feeds
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_feed(&mut self, feed: Feed) -> FeedId {
        let (index, gen) = self.feeds.alloc(feed);
        FeedId { index, gen }
    }

    pub fn feed(&self, id: FeedId) -> &Feed {
        self.feeds.get(id.index, id.gen, "feed")
    }

    pub fn feed_mut(&mut self, id: FeedId) -> &mut Feed {
        self.feeds.get_mut(id.index, id.gen, "feed")
    }

    /// The value under the cursor, or None at end of feed.
    pub fn feed_peek(&self, id: FeedId) -> Option<Value> {
        let feed = self.feed(id);
        self.array(feed.block).values.get(feed.index).copied()
    }

    /// Read the value under the cursor and advance past it.
    pub fn feed_next(&mut self, id: FeedId) -> Option<Value> {
        let value = self.feed_peek(id)?;
        self.feed_mut(id).index += 1;
        Some(value)
    }

    pub fn feed_at_end(&self, id: FeedId) -> bool {
        let feed = self.feed(id);
        feed.index >= self.array(feed.block).values.len()
    }

    //===------------------------------------------------------------------===//
    // Plugs
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_plug(&mut self, plug: Plug) -> PlugId {
        let (index, gen) = self.plugs.alloc(plug);
        PlugId { index, gen }
    }

    pub fn plug(&self, id: PlugId) -> &Plug {
        self.plugs.get(id.index, id.gen, "plug")
    }

    /// Consume a plug: replug uses the fragment exactly once.
    pub(crate) fn take_plug(&mut self, id: PlugId) -> Plug {
        // Validate the handle before releasing the slot.
        self.plugs.get(id.index, id.gen, "plug");
        self.plugs.release(id.index).expect("plug body missing")
    }

    //===------------------------------------------------------------------===//
    // Handles
    //===------------------------------------------------------------------===//

    #[track_caller]
    pub fn alloc_handle(&mut self, data: usize, cleanup: Option<fn(usize)>) -> HandleId {
        let (index, gen) = self.handles.alloc(HandleData { data, cleanup });
        HandleId { index, gen }
    }

    pub fn handle(&self, id: HandleId) -> &HandleData {
        self.handles.get(id.index, id.gen, "handle")
    }
}

//===----------------------------------------------------------------------===//
// Collector-facing raw access
//===----------------------------------------------------------------------===//

/// Per-arena sweep/trace plumbing used by the collector.  Kept here so the
/// arena internals stay private to this module.
impl Heap {
    /// Live unmanaged arrays: sweep-exempt, and roots for their contents.
    pub(crate) fn unmanaged_array_ids(&self) -> Vec<ArrayId> {
        let mut out = Vec::new();
        for i in 0..self.arrays.slot_count() {
            let index = i as u32;
            if !self.arrays.is_live(index) {
                continue;
            }
            let gen = self.arrays.gen_of(index);
            if !self.arrays.get(index, gen, "array").managed {
                out.push(ArrayId { index, gen });
            }
        }
        out
    }

    pub(crate) fn sweep_arrays(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.arrays.slot_count() {
            if self.arrays.is_free(i as u32) || marks[i] {
                continue;
            }
            // Unmanaged arrays are exempt: freeing them is the owner's job.
            if self.arrays.is_live(i as u32)
                && !self.arrays.get(i as u32, self.arrays.gen_of(i as u32), "array").managed
            {
                continue;
            }
            self.arrays.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_texts(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.texts.slot_count() {
            if self.texts.is_free(i as u32) || marks[i] {
                continue;
            }
            self.texts.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_contexts(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.contexts.slot_count() {
            if self.contexts.is_free(i as u32) || marks[i] {
                continue;
            }
            if self.contexts.is_live(i as u32) {
                let gen = self.contexts.gen_of(i as u32);
                let keylist = self.contexts.get(i as u32, gen, "context").keylist;
                self.release_keylist(keylist);
            }
            self.contexts.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_keylists(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.keylists.slot_count() {
            if self.keylists.is_free(i as u32) || marks[i] {
                continue;
            }
            self.keylists.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_actions(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.actions.slot_count() {
            if self.actions.is_free(i as u32) || marks[i] {
                continue;
            }
            if self.actions.is_live(i as u32) {
                let gen = self.actions.gen_of(i as u32);
                let params = self.actions.get(i as u32, gen, "action").params;
                self.release_keylist(params);
            }
            self.actions.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_levels(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.levels.slot_count() {
            if self.levels.is_free(i as u32) || marks[i] {
                continue;
            }
            self.levels.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_feeds(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.feeds.slot_count() {
            if self.feeds.is_free(i as u32) || marks[i] {
                continue;
            }
            self.feeds.release(i as u32);
            swept += 1;
        }
        swept
    }

    pub(crate) fn sweep_plugs(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.plugs.slot_count() {
            if self.plugs.is_free(i as u32) || marks[i] {
                continue;
            }
            self.plugs.release(i as u32);
            swept += 1;
        }
        swept
    }

    /// Sweeping a handle runs its cleanup callback exactly once.
    pub(crate) fn sweep_handles(&mut self, marks: &[bool]) -> usize {
        let mut swept = 0;
        for i in 0..self.handles.slot_count() {
            if self.handles.is_free(i as u32) || marks[i] {
                continue;
            }
            if let Some(data) = self.handles.release(i as u32) {
                if let Some(cleanup) = data.cleanup {
                    cleanup(data.data);
                }
            }
            swept += 1;
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_panics() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(vec![Value::Int(1)], false);
        heap.free_array(id);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            heap.array(id);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn reclaimed_context_reports_tristate() {
        let mut heap = Heap::new();
        let keys = heap.alloc_keylist(vec![Key::normal(crate::interner::intern("a"))]);
        let ctx = heap.alloc_context(keys, ContextKind::Object, None);
        assert!(matches!(heap.try_context(ctx), Ref::Live(_)));
        heap.reclaim_context(ctx);
        assert!(matches!(heap.try_context(ctx), Ref::Reclaimed));
    }

    #[test]
    fn shared_keylist_copied_before_mutation() {
        let mut heap = Heap::new();
        let sym_a = crate::interner::intern("a");
        let keys = heap.alloc_keylist(vec![Key::normal(sym_a)]);
        let ctx1 = heap.alloc_context(keys, ContextKind::Object, None);
        let ctx2 = heap.alloc_context(keys, ContextKind::Object, None);

        assert!(heap.hide_key(ctx1, sym_a));

        // ctx2 still sees the key; ctx1 no longer does.
        assert!(heap.find_key(ctx2, sym_a).is_some());
        assert!(heap.find_key(ctx1, sym_a).is_none());
        assert_ne!(
            heap.context(ctx1).keylist,
            heap.context(ctx2).keylist,
        );
    }

    #[test]
    fn appended_key_index_is_stable() {
        let mut heap = Heap::new();
        let keys = heap.alloc_keylist(vec![]);
        let ctx = heap.alloc_context(keys, ContextKind::Object, None);
        let a = heap.append_key(ctx, Key::normal(crate::interner::intern("a")));
        let b = heap.append_key(ctx, Key::normal(crate::interner::intern("b")));
        assert_eq!((a, b), (0, 1));
        heap.set_slot(ctx, a, Value::Int(10));
        assert_eq!(heap.slot(ctx, a), Value::Int(10));
        assert_eq!(heap.slot(ctx, b), Value::Quasi(Quasiform::Tripwire));
    }

    #[test]
    fn feed_cursor() {
        let mut heap = Heap::new();
        let block = heap.alloc_array(vec![Value::Int(1), Value::Int(2)], false);
        let feed = heap.alloc_feed(Feed { block, index: 0, binding: None });
        assert_eq!(heap.feed_next(feed), Some(Value::Int(1)));
        assert!(!heap.feed_at_end(feed));
        assert_eq!(heap.feed_next(feed), Some(Value::Int(2)));
        assert!(heap.feed_at_end(feed));
        assert_eq!(heap.feed_next(feed), None);
    }
}
