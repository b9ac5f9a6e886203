//! Value rendering ("molding") for diagnostics and tests.
//!
//! Values are handles, so rendering needs the heap.  Output follows the
//! family's conventions loosely: blocks in brackets, groups in parens,
//! quasiforms in tildes.

use crate::heap::{ArrayId, Heap};
use crate::interner;
use crate::value::{Atom, Quasiform, Value};

pub fn mold(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Blank => "_".to_string(),
        Value::Logic(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Decimal(d) => format!("{}", d),
        Value::Word(sym) => interner::spelling(*sym),
        Value::SetWord(sym) => format!("{}:", interner::spelling(*sym)),
        Value::GetWord(sym) => format!(":{}", interner::spelling(*sym)),
        Value::Block(id) => mold_items(heap, *id, "[", "]"),
        Value::Group(id) => mold_items(heap, *id, "(", ")"),
        Value::Text(id) => format!("{:?}", heap.text(*id)),
        Value::Context(_) => "#[context]".to_string(),
        Value::Frame(_) => "#[frame]".to_string(),
        Value::Action(id) => match heap.action(*id).label {
            Some(sym) => format!("#[action {}]", interner::spelling(sym)),
            None => "#[action]".to_string(),
        },
        Value::Handle(_) => "#[handle]".to_string(),
        Value::Plug(_) => "#[plug]".to_string(),
        Value::Quasi(Quasiform::Null) => "~null~".to_string(),
        Value::Quasi(Quasiform::Void) => "~void~".to_string(),
        Value::Quasi(Quasiform::Tripwire) => "~".to_string(),
    }
}

fn mold_items(heap: &Heap, id: ArrayId, open: &str, close: &str) -> String {
    let items: Vec<String> =
        heap.array(id).values.iter().map(|v| mold(heap, v)).collect();
    format!("{}{}{}", open, items.join(" "), close)
}

pub fn mold_atom(heap: &Heap, atom: &Atom) -> String {
    match atom {
        Atom::Value(v) => mold(heap, v),
        Atom::Null => "~null~ (antiform)".to_string(),
        Atom::Void => "~void~ (antiform)".to_string(),
        Atom::Tripwire => "~ (antiform)".to_string(),
        Atom::Pack(items) => {
            let molded: Vec<String> = items.iter().map(|v| mold(heap, v)).collect();
            format!("~[{}]~ (antiform)", molded.join(" "))
        }
        Atom::Failure(failure) => format!("!! {}", failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn molds_nested_blocks() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(vec![Value::Int(2), Value::Int(3)], false);
        let outer = heap.alloc_array(
            vec![
                Value::Int(1),
                Value::Block(inner),
                Value::Word(interner::intern("foo")),
            ],
            false,
        );
        assert_eq!(mold(&heap, &Value::Block(outer)), "[1 [2 3] foo]");
    }

    #[test]
    fn molds_quasiforms() {
        let heap = Heap::new();
        assert_eq!(mold(&heap, &Value::Quasi(Quasiform::Null)), "~null~");
        assert_eq!(mold_atom(&heap, &Atom::Null), "~null~ (antiform)");
    }
}
