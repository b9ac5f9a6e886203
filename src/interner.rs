//! Global symbol interner.
//!
//! Words are identified by `SymId`, a small copyable handle into a global
//! spelling table.  Interning the same spelling twice yields the same id, so
//! word comparison is integer comparison and keylist probes never touch
//! string data.  Symbols are never collected; they are identities, not
//! values.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

struct Table {
    map: FxHashMap<String, u32>, // spelling -> id
    rev: Vec<String>,            // id -> spelling
}

impl Table {
    fn new() -> Self {
        Self { map: FxHashMap::default(), rev: Vec::new() }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = self.rev.len() as u32;
        self.rev.push(s.to_owned());
        self.map.insert(self.rev[id as usize].clone(), id);
        id
    }

    fn resolve(&self, id: u32) -> &str {
        &self.rev[id as usize]
    }
}

static INTERNER: Lazy<Mutex<Table>> = Lazy::new(|| Mutex::new(Table::new()));

pub fn intern(s: &str) -> SymId {
    SymId(INTERNER.lock().unwrap().intern(s))
}

pub fn spelling(id: SymId) -> String {
    INTERNER.lock().unwrap().resolve(id.0).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_same_spelling_returns_same_id() {
        let id1 = intern("foo");
        let id2 = intern("foo");
        assert_eq!(id1, id2);
        assert_eq!(spelling(id1), "foo");
    }

    #[test]
    fn intern_different_spellings_returns_different_ids() {
        let id1 = intern("foo");
        let id2 = intern("bar");
        assert_ne!(id1, id2);
    }
}
