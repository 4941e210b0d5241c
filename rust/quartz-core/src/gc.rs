//! Host-invoked cycle collector.
//!
//! Variables are tracked in three generation buckets. A collection pass marks
//! every slot reachable from the root context by walking the Reference graph
//! (containers recurse, function values report their captured scopes through
//! the enumeration callback), then sweeps the requested generations:
//! unreachable slots have their value reset to null, which breaks
//! array/object/closure cycles and lets the reference counts fall to zero.
//! Survivors are promoted to the next generation. Collection never runs
//! implicitly, so it cannot interrupt evaluation.

use crate::context::Context;
use crate::reference::{RefRoot, Reference};
use crate::values::Value;
use crate::variable::VarSlot;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

pub const GENERATION_COUNT: usize = 3;

type WeakSlot = Weak<std::cell::RefCell<crate::variable::Variable>>;

#[derive(Debug, Default)]
pub struct Collector {
    generations: [Vec<WeakSlot>; GENERATION_COUNT],
}

impl Collector {
    pub fn new() -> Self {
        Collector::default()
    }

    pub fn track(&mut self, slot: &VarSlot) {
        self.generations[0].push(Rc::downgrade(slot));
    }

    pub fn tracked_count(&self) -> usize {
        self.generations.iter().map(Vec::len).sum()
    }

    /// Mark from `roots`, then sweep generations `0..=max_generation`.
    /// Returns the number of variables reclaimed (reset to null).
    pub fn collect(&mut self, max_generation: usize, roots: &Context) -> usize {
        let max_generation = max_generation.min(GENERATION_COUNT - 1);
        let reachable = mark_from(roots);

        let mut collected = 0;
        for generation in 0..=max_generation {
            let bucket = std::mem::take(&mut self.generations[generation]);
            let promoted = (generation + 1).min(GENERATION_COUNT - 1);
            for weak in bucket {
                let Some(slot) = weak.upgrade() else {
                    // Already dropped by reference counting alone.
                    continue;
                };
                if reachable.contains(&(Rc::as_ptr(&slot) as usize)) {
                    self.generations[promoted].push(weak);
                } else {
                    slot.borrow_mut().reset(Value::Null);
                    collected += 1;
                }
            }
        }
        collected
    }
}

fn mark_from(roots: &Context) -> HashSet<usize> {
    let mut reachable = HashSet::new();
    let mut frontier: Vec<VarSlot> = Vec::new();
    {
        let mut callback = |slot: &VarSlot| {
            if reachable.insert(Rc::as_ptr(slot) as usize) {
                frontier.push(slot.clone());
            }
        };
        roots.enumerate_references(&mut |reference| {
            enumerate_reference(reference, &mut callback);
        });
    }
    while !frontier.is_empty() {
        let mut next: Vec<VarSlot> = Vec::new();
        {
            let mut callback = |slot: &VarSlot| {
                if reachable.insert(Rc::as_ptr(slot) as usize) {
                    next.push(slot.clone());
                }
            };
            for slot in &frontier {
                let value = slot.borrow().value().clone();
                enumerate_value(&value, &mut callback);
            }
        }
        frontier = next;
    }
    reachable
}

/// Report every variable slot directly reachable from `reference`.
pub fn enumerate_reference(reference: &Reference, callback: &mut dyn FnMut(&VarSlot)) {
    match reference.root() {
        RefRoot::Variable(slot) => callback(slot),
        RefRoot::Constant(value) | RefRoot::Temporary(value) => enumerate_value(value, callback),
    }
}

/// Walk a value for variable slots: containers recurse, function values
/// report their captured scopes.
pub fn enumerate_value(value: &Value, callback: &mut dyn FnMut(&VarSlot)) {
    match value {
        Value::Array(elems) => {
            for element in elems.iter() {
                enumerate_value(element, callback);
            }
        }
        Value::Object(members) => {
            for member in members.values() {
                enumerate_value(member, callback);
            }
        }
        Value::Func(func) => func.0.enumerate_variables(callback),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GlobalContext;
    use crate::variable::Variable;

    #[test]
    fn reachable_variables_survive_collection() {
        let global = GlobalContext::new();
        let slot = global.create_variable(Value::Int(1), false);
        global
            .declare("kept", Reference::variable(slot.clone()))
            .unwrap();
        assert_eq!(global.collect(GENERATION_COUNT), 0);
        assert!(slot.borrow().value().equals(&Value::Int(1)));
    }

    #[test]
    fn unreachable_variables_are_reset() {
        let global = GlobalContext::new();
        let slot = global.create_variable(Value::Int(7), false);
        assert_eq!(global.collect(0), 1);
        assert!(slot.borrow().value().is_null());
    }

    #[test]
    fn survivors_are_promoted_past_young_collections() {
        let global = GlobalContext::new();
        let slot = global.create_variable(Value::Int(3), false);
        global
            .declare("pinned", Reference::variable(slot.clone()))
            .unwrap();
        assert_eq!(global.collect(0), 0);
        // Now in generation 1; dropping the root binding and collecting only
        // generation 0 must not touch it.
        global.declare("pinned", Reference::constant(Value::Null)).unwrap();
        assert_eq!(global.collect(0), 0);
        assert!(slot.borrow().value().equals(&Value::Int(3)));
        // A full collection reclaims it.
        assert_eq!(global.collect(GENERATION_COUNT), 1);
        assert!(slot.borrow().value().is_null());
    }

    #[test]
    fn orphaned_variables_are_reclaimed_in_one_pass() {
        let global = GlobalContext::new();
        let a = global.create_variable(Value::new_array(vec![Value::Int(1)]), false);
        let b = global.create_variable(Value::new_array(vec![Value::Int(2)]), false);
        let reclaimed = global.collect(GENERATION_COUNT);
        assert_eq!(reclaimed, 2);
        assert!(a.borrow().value().is_null());
        assert!(b.borrow().value().is_null());
        drop((a, b));
        assert_eq!(global.collect(GENERATION_COUNT), 0);
    }

    #[test]
    fn enumerate_value_walks_nested_containers() {
        let slot = Variable::slot(Value::Int(1), false);
        let nested = Value::new_array(vec![Value::new_object({
            let mut members = crate::values::Object::new();
            members.insert("k".to_string(), Value::Int(2));
            members
        })]);
        let mut seen = 0;
        enumerate_value(&nested, &mut |_| seen += 1);
        assert_eq!(seen, 0);
        let mut seen = 0;
        enumerate_reference(&Reference::variable(slot), &mut |_| seen += 1);
        assert_eq!(seen, 1);
    }
}
