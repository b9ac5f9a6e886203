//! Unplug and replug: suspending and reattaching stack fragments.
//!
//! `unplug` detaches every level above a boundary level — plus the data
//! stack entries pushed since that boundary's baseline — into a `Plug` heap
//! node.  The fragment stops executing and becomes plain traceable data; the
//! boundary level is the top of the stack again.
//!
//! `replug` splices a fragment back in above a different level, shifts the
//! fragment's data-stack baselines by however much the surroundings changed,
//! and restores the boundary's saved output cell.  The pointer surgery of a
//! C implementation becomes handle-list surgery: nothing is copied, only
//! relinked.

use crate::heap::{LevelId, Plug, PlugId};
use crate::trampoline::Machine;
use crate::value::Atom;

impl Machine {
    /// Detach all levels strictly above `down_to` into a plug.  On return
    /// `down_to` is the top of the stack; the fragment is inert heap data.
    pub(crate) fn unplug(&mut self, down_to: LevelId, saved_out: Atom) -> PlugId {
        let mut levels = Vec::new();
        let mut cursor = self.top.expect("unplug on an idle machine");
        while cursor != down_to {
            levels.push(cursor);
            cursor = self
                .heap
                .level(cursor)
                .prior
                .expect("unplug boundary is not on the stack");
        }
        assert!(!levels.is_empty(), "unplug with nothing above the boundary");

        // Sever the fragment from its owner.
        let outermost = *levels.last().unwrap();
        self.heap.level_mut(outermost).prior = None;

        let base = self.heap.level(down_to).baseline;
        let data_tail = self.data_stack.split_off(base);

        self.top = Some(down_to);
        self.heap.alloc_plug(Plug { levels, data_tail, base, saved_out })
    }

    /// Splice a fragment back in above `new_base`.  Returns the innermost
    /// level, which the caller makes the new top (via `Bounce::Continue`).
    /// The plug is consumed; a fragment resumes at most once.
    pub(crate) fn replug(&mut self, id: PlugId, new_base: LevelId) -> LevelId {
        let Plug { levels, data_tail, base, saved_out } = self.heap.take_plug(id);

        // The surroundings may sit at a different data-stack depth than when
        // the fragment was captured; shift its baselines to match.
        let delta = self.data_stack.len() as isize - base as isize;
        self.data_stack.extend(data_tail);
        for &level in &levels {
            let lvl = self.heap.level_mut(level);
            lvl.baseline = (lvl.baseline as isize + delta) as usize;
        }

        let outermost = *levels.last().expect("replug of an empty fragment");
        self.heap.level_mut(outermost).prior = Some(new_base);
        self.heap.level_mut(new_base).out = saved_out;

        levels[0]
    }
}
