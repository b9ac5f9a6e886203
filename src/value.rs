//! Runtime values and evaluation products.
//!
//! `Value` is the storable tagged union: everything that can legally sit in
//! an array slot or a context slot.  It is `Copy` — heap payloads are held
//! behind arena handles, so a cell is a tag plus at most eight bytes.
//!
//! `Atom` is the evaluation-output type.  It is a strict superset of `Value`:
//! it additionally carries the antiforms — states that only exist in output
//! positions (null, void, tripwire, multi-return packs, errors in flight).
//! Storing an antiform is impossible by construction: arrays hold `Value`,
//! and the only way from `Atom` to `Value` is `to_value`, which fails on
//! antiforms.

use std::sync::Arc;

use crate::error::Failure;
use crate::heap::{ActionId, ArrayId, ContextId, HandleId, PlugId, TextId};
use crate::interner::SymId;

//===----------------------------------------------------------------------===//
// Value
//===----------------------------------------------------------------------===//

/// Storable reified counterparts of the antiforms.  A meta-class parameter
/// receives a null argument as `Quasi(Null)`; an unset context slot holds
/// `Quasi(Tripwire)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Quasiform {
    Null,
    Void,
    Tripwire,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Blank,
    Logic(bool),
    Int(i64),
    Decimal(f64),

    Word(SymId),
    SetWord(SymId),
    GetWord(SymId),

    Block(ArrayId),
    Group(ArrayId),
    Text(TextId),

    Context(ContextId),
    Frame(ContextId),
    Action(ActionId),
    Handle(HandleId),
    Plug(PlugId),

    Quasi(Quasiform),
}

impl Value {
    /// Datatype name used in error messages and molded output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Blank => "blank",
            Value::Logic(_) => "logic",
            Value::Int(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Word(_) => "word",
            Value::SetWord(_) => "set-word",
            Value::GetWord(_) => "get-word",
            Value::Block(_) => "block",
            Value::Group(_) => "group",
            Value::Text(_) => "text",
            Value::Context(_) => "context",
            Value::Frame(_) => "frame",
            Value::Action(_) => "action",
            Value::Handle(_) => "handle",
            Value::Plug(_) => "plug",
            Value::Quasi(_) => "quasiform",
        }
    }
}

//===----------------------------------------------------------------------===//
// Atom
//===----------------------------------------------------------------------===//

#[derive(Clone, Debug)]
pub enum Atom {
    Value(Value),

    // Antiforms: evaluation-only states.
    Null,
    Void,
    Tripwire,
    Pack(Vec<Value>),
    Failure(Arc<Failure>),
}

impl Atom {
    pub fn is_antiform(&self) -> bool {
        !matches!(self, Atom::Value(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Atom::Failure(_))
    }

    /// Convert to a storable value, failing on antiforms.  This is the single
    /// chokepoint enforcing the no-antiforms-in-arrays invariant.
    pub fn to_value(&self) -> Result<Value, Arc<Failure>> {
        match self {
            Atom::Value(v) => Ok(*v),
            Atom::Pack(items) => {
                // Packs decay to their first slot in single-value positions.
                match items.first() {
                    Some(v) => Ok(*v),
                    None => Err(Arc::new(Failure::AntiformStore("pack"))),
                }
            }
            Atom::Null => Err(Arc::new(Failure::AntiformStore("null"))),
            Atom::Void => Err(Arc::new(Failure::AntiformStore("void"))),
            Atom::Tripwire => Err(Arc::new(Failure::AntiformStore("tripwire"))),
            Atom::Failure(f) => Err(f.clone()),
        }
    }

    /// Reify to a storable form, mapping antiforms to quasiforms instead of
    /// failing.  This is how meta-class parameters accept null arguments.
    pub fn reify(&self) -> Result<Value, Arc<Failure>> {
        match self {
            Atom::Value(v) => Ok(*v),
            Atom::Null => Ok(Value::Quasi(Quasiform::Null)),
            Atom::Void => Ok(Value::Quasi(Quasiform::Void)),
            Atom::Tripwire => Ok(Value::Quasi(Quasiform::Tripwire)),
            Atom::Pack(items) => match items.first() {
                Some(v) => Ok(*v),
                None => Ok(Value::Quasi(Quasiform::Void)),
            },
            Atom::Failure(f) => Err(f.clone()),
        }
    }

    /// Inverse of `reify`: turn a stored quasiform back into its antiform.
    pub fn unreify(value: Value) -> Atom {
        match value {
            Value::Quasi(Quasiform::Null) => Atom::Null,
            Value::Quasi(Quasiform::Void) => Atom::Void,
            Value::Quasi(Quasiform::Tripwire) => Atom::Tripwire,
            other => Atom::Value(other),
        }
    }

    /// Branch truthiness: null and false are falsey, void is an error (a
    /// vanished expression is not a condition), everything else is truthy.
    pub fn truthy(&self) -> Result<bool, Arc<Failure>> {
        match self {
            Atom::Null => Ok(false),
            Atom::Value(Value::Logic(b)) => Ok(*b),
            Atom::Void => Err(Arc::new(Failure::Script(
                "void is not a valid condition".to_string(),
            ))),
            Atom::Failure(f) => Err(f.clone()),
            _ => Ok(true),
        }
    }
}

impl From<Value> for Atom {
    fn from(v: Value) -> Self {
        Atom::Value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antiforms_refuse_storage() {
        assert!(Atom::Null.to_value().is_err());
        assert!(Atom::Void.to_value().is_err());
        assert!(Atom::Tripwire.to_value().is_err());
        assert!(Atom::Value(Value::Int(1)).to_value().is_ok());
    }

    #[test]
    fn reify_roundtrip() {
        let v = Atom::Null.reify().unwrap();
        assert_eq!(v, Value::Quasi(Quasiform::Null));
        assert!(matches!(Atom::unreify(v), Atom::Null));
    }

    #[test]
    fn pack_decays_to_first_slot() {
        let pack = Atom::Pack(vec![Value::Int(7), Value::Int(8)]);
        assert_eq!(pack.to_value().unwrap(), Value::Int(7));
    }

    #[test]
    fn truthiness() {
        assert!(!Atom::Null.truthy().unwrap());
        assert!(!Atom::Value(Value::Logic(false)).truthy().unwrap());
        assert!(Atom::Value(Value::Int(0)).truthy().unwrap());
        assert!(Atom::Void.truthy().is_err());
    }
}
