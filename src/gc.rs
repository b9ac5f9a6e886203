//! Mark-and-sweep collection over the arena heap.
//!
//! Roots: the live level chain, the data stack, host guards, the lib
//! context, and every unmanaged array.  Marking is a worklist walk over
//! typed handles; a handle to a *reclaimed* slot marks the stub so its
//! identity survives, but is never traced into.  Suspended generator
//! fragments need no special casing — they are reached through an action's
//! details array like any other data.
//!
//! After marking (debug builds) the cross-structure invariants are
//! verified: a violation is a tracing bug and aborts with a diagnostic
//! dump, it is not a recoverable condition.

use log::debug;

use crate::heap::{
    ActionId, ArrayId, ContextId, ContextKind, FeedId, HandleId, Heap, KeyListId,
    LevelId, PlugId, Ref, TextId,
};
use crate::level::LevelState;
use crate::trampoline::Machine;
use crate::value::{Atom, Value};

struct Marks {
    arrays: Vec<bool>,
    texts: Vec<bool>,
    contexts: Vec<bool>,
    keylists: Vec<bool>,
    actions: Vec<bool>,
    levels: Vec<bool>,
    feeds: Vec<bool>,
    plugs: Vec<bool>,
    handles: Vec<bool>,
}

impl Marks {
    fn new(heap: &Heap) -> Self {
        Self {
            arrays: vec![false; heap.arrays.slot_count()],
            texts: vec![false; heap.texts.slot_count()],
            contexts: vec![false; heap.contexts.slot_count()],
            keylists: vec![false; heap.keylists.slot_count()],
            actions: vec![false; heap.actions.slot_count()],
            levels: vec![false; heap.levels.slot_count()],
            feeds: vec![false; heap.feeds.slot_count()],
            plugs: vec![false; heap.plugs.slot_count()],
            handles: vec![false; heap.handles.slot_count()],
        }
    }
}

enum Item {
    Arr(ArrayId),
    Text(TextId),
    Ctx(ContextId),
    Keys(KeyListId),
    Act(ActionId),
    Lvl(LevelId),
    Feed(FeedId),
    Plug(PlugId),
    Handle(HandleId),
}

fn push_value(value: Value, queue: &mut Vec<Item>) {
    match value {
        Value::Block(id) | Value::Group(id) => queue.push(Item::Arr(id)),
        Value::Text(id) => queue.push(Item::Text(id)),
        Value::Context(id) | Value::Frame(id) => queue.push(Item::Ctx(id)),
        Value::Action(id) => queue.push(Item::Act(id)),
        Value::Handle(id) => queue.push(Item::Handle(id)),
        Value::Plug(id) => queue.push(Item::Plug(id)),
        _ => {}
    }
}

fn push_atom(atom: &Atom, queue: &mut Vec<Item>) {
    match atom {
        Atom::Value(v) => push_value(*v, queue),
        Atom::Pack(items) => {
            for v in items {
                push_value(*v, queue);
            }
        }
        _ => {}
    }
}

/// Run a full collection cycle.
pub(crate) fn collect(m: &mut Machine) {
    let mut marks = Marks::new(&m.heap);
    let mut queue: Vec<Item> = Vec::new();

    // Root set.
    if let Some(top) = m.top {
        queue.push(Item::Lvl(top));
    }
    for v in &m.data_stack {
        push_value(*v, &mut queue);
    }
    for v in &m.guards {
        push_value(*v, &mut queue);
    }
    queue.push(Item::Ctx(m.lib));
    queue.push(Item::Arr(m.empty_block));
    for id in m.heap.unmanaged_array_ids() {
        queue.push(Item::Arr(id));
    }

    while let Some(item) = queue.pop() {
        mark_item(&m.heap, &mut marks, &mut queue, item);
    }

    if cfg!(debug_assertions) {
        verify_marks(m, &marks);
    }

    let swept = sweep(&mut m.heap, &marks);
    debug!("gc cycle: swept {} nodes, {} live", swept, m.heap.live_count());
}

fn mark_item(heap: &Heap, marks: &mut Marks, queue: &mut Vec<Item>, item: Item) {
    match item {
        Item::Arr(id) => {
            if marks.arrays[id.index as usize] {
                return;
            }
            match heap.arrays.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.arrays[id.index as usize] = true,
                Ref::Live(array) => {
                    marks.arrays[id.index as usize] = true;
                    for v in &array.values {
                        push_value(*v, queue);
                    }
                }
            }
        }
        Item::Text(id) => {
            if let Ref::Live(_) | Ref::Reclaimed = heap.texts.try_get(id.index, id.gen) {
                marks.texts[id.index as usize] = true;
            }
        }
        Item::Ctx(id) => {
            if marks.contexts[id.index as usize] {
                return;
            }
            match heap.contexts.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.contexts[id.index as usize] = true,
                Ref::Live(ctx) => {
                    marks.contexts[id.index as usize] = true;
                    queue.push(Item::Keys(ctx.keylist));
                    if let Some(parent) = ctx.parent {
                        queue.push(Item::Ctx(parent));
                    }
                    if let ContextKind::Frame { action, .. } = ctx.kind {
                        queue.push(Item::Act(action));
                    }
                    for v in &ctx.slots {
                        push_value(*v, queue);
                    }
                }
            }
        }
        Item::Keys(id) => {
            if let Ref::Live(_) | Ref::Reclaimed = heap.keylists.try_get(id.index, id.gen)
            {
                marks.keylists[id.index as usize] = true;
            }
        }
        Item::Act(id) => {
            if marks.actions[id.index as usize] {
                return;
            }
            match heap.actions.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.actions[id.index as usize] = true,
                Ref::Live(action) => {
                    marks.actions[id.index as usize] = true;
                    queue.push(Item::Keys(action.params));
                    queue.push(Item::Arr(action.details));
                }
            }
        }
        Item::Lvl(id) => {
            if marks.levels[id.index as usize] {
                return;
            }
            match heap.levels.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.levels[id.index as usize] = true,
                Ref::Live(level) => {
                    marks.levels[id.index as usize] = true;
                    queue.push(Item::Feed(level.feed));
                    push_atom(&level.out, queue);
                    push_atom(&level.spare, queue);
                    if let Some(varlist) = level.varlist {
                        queue.push(Item::Ctx(varlist));
                    }
                    if let Some(action) = level.action {
                        queue.push(Item::Act(action));
                    }
                    if let Some(prior) = level.prior {
                        queue.push(Item::Lvl(prior));
                    }
                    match level.state {
                        LevelState::Returning(v) | LevelState::Yielded(v) => {
                            push_value(v, queue)
                        }
                        _ => {}
                    }
                }
            }
        }
        Item::Feed(id) => {
            if marks.feeds[id.index as usize] {
                return;
            }
            match heap.feeds.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.feeds[id.index as usize] = true,
                Ref::Live(feed) => {
                    marks.feeds[id.index as usize] = true;
                    queue.push(Item::Arr(feed.block));
                    if let Some(binding) = feed.binding {
                        queue.push(Item::Ctx(binding));
                    }
                }
            }
        }
        Item::Plug(id) => {
            if marks.plugs[id.index as usize] {
                return;
            }
            match heap.plugs.try_get(id.index, id.gen) {
                Ref::Absent => {}
                Ref::Reclaimed => marks.plugs[id.index as usize] = true,
                Ref::Live(plug) => {
                    marks.plugs[id.index as usize] = true;
                    for &level in &plug.levels {
                        queue.push(Item::Lvl(level));
                    }
                    for v in &plug.data_tail {
                        push_value(*v, queue);
                    }
                    push_atom(&plug.saved_out, queue);
                }
            }
        }
        Item::Handle(id) => {
            if let Ref::Live(_) | Ref::Reclaimed = heap.handles.try_get(id.index, id.gen)
            {
                marks.handles[id.index as usize] = true;
            }
        }
    }
}

/// Cross-structure consistency of the marked graph.  A failure here is a
/// tracing bug; abort loudly with everything we know.
fn verify_marks(m: &Machine, marks: &Marks) {
    let heap = &m.heap;

    for i in 0..heap.contexts.slot_count() {
        let index = i as u32;
        if !marks.contexts[i] || !heap.contexts.is_live(index) {
            continue;
        }
        let gen = heap.contexts.gen_of(index);
        let ctx = heap.context(ContextId { index, gen });
        if !marks.keylists[ctx.keylist.index as usize] {
            crate::crash::gc_panic(
                m,
                &format!(
                    "marked context {:?} has unmarked keylist {:?} (allocated at {})",
                    ContextId { index, gen },
                    ctx.keylist,
                    heap.contexts.origin_of(index),
                ),
            );
        }
        if let ContextKind::Frame { action, level } = ctx.kind {
            if !marks.actions[action.index as usize] {
                crate::crash::gc_panic(
                    m,
                    &format!(
                        "frame context {:?} archetype action {:?} is unmarked",
                        ContextId { index, gen },
                        action,
                    ),
                );
            }
            if let Some(level) = level {
                if !marks.levels[level.index as usize] {
                    crate::crash::gc_panic(
                        m,
                        &format!(
                            "frame context {:?} backlinks unmarked level {:?}",
                            ContextId { index, gen },
                            level,
                        ),
                    );
                }
            }
        }
    }

    for i in 0..heap.actions.slot_count() {
        let index = i as u32;
        if !marks.actions[i] || !heap.actions.is_live(index) {
            continue;
        }
        let gen = heap.actions.gen_of(index);
        let id = ActionId { index, gen };
        let action = heap.action(id);
        if !marks.keylists[action.params.index as usize] {
            crate::crash::gc_panic(
                m,
                &format!("marked action {:?} has unmarked param keylist", id),
            );
        }
        if !marks.arrays[action.details.index as usize] {
            crate::crash::gc_panic(
                m,
                &format!("marked action {:?} has unmarked details array", id),
            );
        }
        let archetype = heap.array(action.details).values[crate::action::IDX_ARCHETYPE];
        if archetype != Value::Action(id) {
            crate::crash::gc_panic(
                m,
                &format!(
                    "details archetype of {:?} does not point back at it: {:?}",
                    id, archetype,
                ),
            );
        }
    }

    for i in 0..heap.plugs.slot_count() {
        let index = i as u32;
        if !marks.plugs[i] || !heap.plugs.is_live(index) {
            continue;
        }
        let gen = heap.plugs.gen_of(index);
        let plug = heap.plug(PlugId { index, gen });
        for &level in &plug.levels {
            if !marks.levels[level.index as usize] {
                crate::crash::gc_panic(
                    m,
                    &format!(
                        "plug {:?} holds unmarked level {:?}",
                        PlugId { index, gen },
                        level,
                    ),
                );
            }
        }
    }
}

fn sweep(heap: &mut Heap, marks: &Marks) -> usize {
    // Contexts and actions release their keylist users before keylists are
    // themselves swept.
    let mut swept = 0;
    swept += heap.sweep_contexts(&marks.contexts);
    swept += heap.sweep_actions(&marks.actions);
    swept += heap.sweep_keylists(&marks.keylists);
    swept += heap.sweep_arrays(&marks.arrays);
    swept += heap.sweep_texts(&marks.texts);
    swept += heap.sweep_levels(&marks.levels);
    swept += heap.sweep_feeds(&marks.feeds);
    swept += heap.sweep_plugs(&marks.plugs);
    swept += heap.sweep_handles(&marks.handles);
    swept
}
