//! Fatal-diagnostic formatting.
//!
//! A read-only consumer of the machine: walks the level stack and renders
//! what each frame was doing when an unrecoverable inconsistency was found.
//! Nothing here mutates trampoline state; it exists so an abort carries
//! maximum context instead of a bare message.

use colored::Colorize;

use crate::heap::LevelId;
use crate::interner;
use crate::trampoline::Machine;

/// Render the live level stack, innermost first.
pub fn stack_dump(m: &Machine) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "--- level stack ---".bold()));
    let mut cursor = m.top;
    let mut depth = 0usize;
    while let Some(lv) = cursor {
        out.push_str(&describe_level(m, lv, depth));
        cursor = m.heap.level(lv).prior;
        depth += 1;
    }
    if depth == 0 {
        out.push_str("  (machine idle)\n");
    }
    out.push_str(&format!(
        "  data stack: {} entries, {} heap nodes live\n",
        m.data_stack.len(),
        m.heap.live_count()
    ));
    out
}

fn describe_level(m: &Machine, lv: LevelId, depth: usize) -> String {
    let level = m.heap.level(lv);
    let label = level
        .action
        .map(|a| match m.heap.action(a).label {
            Some(sym) => interner::spelling(sym),
            None => "(anonymous)".to_string(),
        })
        .unwrap_or_default();
    let feed = m.heap.feed(level.feed);
    format!(
        "  #{:<3} {:?} {} state={:?} feed={:?}@{}\n",
        depth,
        level.kind,
        label,
        level.state,
        feed.block,
        feed.index,
    )
}

/// Abort on a collector invariant violation with full context.
pub(crate) fn gc_panic(m: &Machine, message: &str) -> ! {
    panic!(
        "{} {}\n{}",
        "gc invariant violated:".red().bold(),
        message,
        stack_dump(m)
    );
}
