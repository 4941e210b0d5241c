//! Place expressions: a root plus a chain of subscript modifiers.
//!
//! A `Reference` designates either a value itself (constant or temporary
//! roots) or a storage location (variable root), possibly narrowed by array
//! indices and object keys. Reads and writes walk the chain on every access;
//! nothing is cached, so mutations between accesses stay observable.

use crate::errors::RuntimeError;
use crate::values::{Object, Value};
use crate::variable::{VarSlot, Variable};
use smallvec::SmallVec;
use std::rc::Rc;

/// One step of narrowing applied to a reference root.
#[derive(Debug, Clone, PartialEq)]
pub enum RefModifier {
    /// Integer subscript. Negative indices count from the back.
    ArrayIndex(i64),
    /// String subscript.
    ObjectKey(String),
}

/// The anchor a modifier chain is applied to.
#[derive(Debug, Clone)]
pub enum RefRoot {
    /// A read-only value (literals, builtins).
    Constant(Value),
    /// An rvalue produced by an expression. Reads work; writes are rejected
    /// until the reference is materialized.
    Temporary(Value),
    /// A mutable slot with a constness flag.
    Variable(VarSlot),
}

/// Most chains hold at most a few modifiers, so they live inline.
type ModifierChain = SmallVec<[RefModifier; 4]>;

#[derive(Debug, Clone)]
pub struct Reference {
    root: RefRoot,
    modifiers: ModifierChain,
}

impl Reference {
    pub fn constant(value: Value) -> Self {
        Reference {
            root: RefRoot::Constant(value),
            modifiers: ModifierChain::new(),
        }
    }

    pub fn temporary(value: Value) -> Self {
        Reference {
            root: RefRoot::Temporary(value),
            modifiers: ModifierChain::new(),
        }
    }

    pub fn variable(slot: VarSlot) -> Self {
        Reference {
            root: RefRoot::Variable(slot),
            modifiers: ModifierChain::new(),
        }
    }

    pub fn root(&self) -> &RefRoot {
        &self.root
    }

    pub fn modifiers(&self) -> &[RefModifier] {
        &self.modifiers
    }

    pub fn is_variable_root(&self) -> bool {
        matches!(self.root, RefRoot::Variable(_))
    }

    /// Push a modifier, narrowing the designated place.
    pub fn zoom_in(&mut self, modifier: RefModifier) {
        self.modifiers.push(modifier);
    }

    /// Pop the innermost modifier. Returns it, or `None` at the root.
    pub fn zoom_out(&mut self) -> Option<RefModifier> {
        self.modifiers.pop()
    }

    /// The reference designating the container of the innermost member, used
    /// to derive `this` for method-style calls. `None` when the chain is
    /// empty.
    pub fn parent_of_member(&self) -> Option<Reference> {
        if self.modifiers.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.modifiers.pop();
        Some(parent)
    }

    /// Dereference: combine the root with the modifier chain. Missing members
    /// and out-of-range indices read as null; subscripting a value of the
    /// wrong type is an error.
    pub fn read(&self) -> Result<Value, RuntimeError> {
        let mut current = match &self.root {
            RefRoot::Constant(v) | RefRoot::Temporary(v) => v.clone(),
            RefRoot::Variable(slot) => slot.borrow().value().clone(),
        };
        for modifier in &self.modifiers {
            current = read_member(&current, modifier)?;
        }
        Ok(current)
    }

    /// Replace the designated slot. Fails on constant or temporary roots and
    /// on `const` variables; intermediate nulls autovivify into containers,
    /// and an array write one past the end (or further) extends with nulls.
    pub fn write(&self, value: Value) -> Result<(), RuntimeError> {
        let slot = self.writable_root()?;
        let mut guard = slot.borrow_mut();
        let mut current = guard.value_mut()?;
        for modifier in &self.modifiers {
            current = drill_member(current, modifier)?;
        }
        *current = value;
        Ok(())
    }

    /// Remove the designated member and return the removed value; removing a
    /// member that does not exist yields null. The reference must designate a
    /// member of a mutable variable, not a whole variable.
    pub fn unset(&self) -> Result<Value, RuntimeError> {
        let Some((last, path)) = self.modifiers.split_last() else {
            return Err(RuntimeError::UnsetTarget {
                designator: self.read()?.to_string(),
            });
        };
        let slot = self.writable_root()?;
        let mut guard = slot.borrow_mut();
        let mut current = guard.value_mut()?;
        for modifier in path {
            match peek_member(current, modifier)? {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            }
        }
        remove_member(current, last)
    }

    /// Convert a temporary root into a fresh mutable variable root so that
    /// further modifications have observable identity. Constant and variable
    /// roots are unaffected. The new slot is reported to `track` so the
    /// collector can see it.
    pub fn materialize(&mut self, track: &mut dyn FnMut(&VarSlot)) {
        if let RefRoot::Temporary(value) = &self.root {
            let slot = Variable::slot(value.clone(), false);
            track(&slot);
            self.root = RefRoot::Variable(slot);
        }
    }

    fn writable_root(&self) -> Result<&VarSlot, RuntimeError> {
        match &self.root {
            RefRoot::Constant(_) => Err(RuntimeError::ModifyConstant),
            RefRoot::Temporary(_) => Err(RuntimeError::ModifyTemporary),
            RefRoot::Variable(slot) => Ok(slot),
        }
    }
}

fn wrap_index(index: i64, len: usize) -> i64 {
    if index < 0 {
        index + len as i64
    } else {
        index
    }
}

fn read_member(value: &Value, modifier: &RefModifier) -> Result<Value, RuntimeError> {
    match (value, modifier) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(elems), RefModifier::ArrayIndex(index)) => {
            let idx = wrap_index(*index, elems.len());
            if idx < 0 || idx as usize >= elems.len() {
                Ok(Value::Null)
            } else {
                Ok(elems[idx as usize].clone())
            }
        }
        (Value::Object(members), RefModifier::ObjectKey(key)) => {
            Ok(members.get(key).cloned().unwrap_or(Value::Null))
        }
        (other, RefModifier::ArrayIndex(_)) => Err(RuntimeError::NotAnArray {
            value: other.to_string(),
        }),
        (other, RefModifier::ObjectKey(_)) => Err(RuntimeError::NotAnObject {
            value: other.to_string(),
        }),
    }
}

/// Walk one step for writing, creating missing containers and slots.
fn drill_member<'a>(
    value: &'a mut Value,
    modifier: &RefModifier,
) -> Result<&'a mut Value, RuntimeError> {
    match modifier {
        RefModifier::ArrayIndex(index) => {
            if value.is_null() {
                *value = Value::new_array(Vec::new());
            }
            let Value::Array(rc) = value else {
                return Err(RuntimeError::NotAnArray {
                    value: value.to_string(),
                });
            };
            let elems = Rc::make_mut(rc);
            let idx = wrap_index(*index, elems.len());
            if idx < 0 {
                return Err(RuntimeError::IndexOutOfRange {
                    index: *index,
                    len: elems.len(),
                });
            }
            while elems.len() <= idx as usize {
                elems.push(Value::Null);
            }
            Ok(&mut elems[idx as usize])
        }
        RefModifier::ObjectKey(key) => {
            if value.is_null() {
                *value = Value::new_object(Object::new());
            }
            let Value::Object(rc) = value else {
                return Err(RuntimeError::NotAnObject {
                    value: value.to_string(),
                });
            };
            let members = Rc::make_mut(rc);
            Ok(members.entry(key.clone()).or_insert(Value::Null))
        }
    }
}

/// Walk one step without autovivification. `None` when the path is absent.
fn peek_member<'a>(
    value: &'a mut Value,
    modifier: &RefModifier,
) -> Result<Option<&'a mut Value>, RuntimeError> {
    match modifier {
        RefModifier::ArrayIndex(index) => match value {
            Value::Null => Ok(None),
            Value::Array(rc) => {
                let elems = Rc::make_mut(rc);
                let idx = wrap_index(*index, elems.len());
                if idx < 0 || idx as usize >= elems.len() {
                    Ok(None)
                } else {
                    Ok(Some(&mut elems[idx as usize]))
                }
            }
            other => Err(RuntimeError::NotAnArray {
                value: other.to_string(),
            }),
        },
        RefModifier::ObjectKey(key) => match value {
            Value::Null => Ok(None),
            Value::Object(rc) => Ok(Rc::make_mut(rc).get_mut(key)),
            other => Err(RuntimeError::NotAnObject {
                value: other.to_string(),
            }),
        },
    }
}

fn remove_member(value: &mut Value, modifier: &RefModifier) -> Result<Value, RuntimeError> {
    match modifier {
        RefModifier::ArrayIndex(index) => match value {
            Value::Null => Ok(Value::Null),
            Value::Array(rc) => {
                let elems = Rc::make_mut(rc);
                let idx = wrap_index(*index, elems.len());
                if idx < 0 || idx as usize >= elems.len() {
                    Ok(Value::Null)
                } else {
                    Ok(elems.remove(idx as usize))
                }
            }
            other => Err(RuntimeError::NotAnArray {
                value: other.to_string(),
            }),
        },
        RefModifier::ObjectKey(key) => match value {
            Value::Null => Ok(Value::Null),
            Value::Object(rc) => Ok(Rc::make_mut(rc)
                .shift_remove(key)
                .unwrap_or(Value::Null)),
            other => Err(RuntimeError::NotAnObject {
                value: other.to_string(),
            }),
        },
    }
}
