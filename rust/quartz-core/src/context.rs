//! Linked scopes of named references.
//!
//! A `Context` maps names to references and chains to a parent; lookup walks
//! the chain. Analytic contexts exist only during the binding pass and refuse
//! variable creation. The distinguished `GlobalContext` terminates every
//! chain, owns the collector, and is where hosts install builtins.

use crate::errors::RuntimeError;
use crate::gc::Collector;
use crate::reference::Reference;
use crate::values::Value;
use crate::variable::{VarSlot, Variable};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Names with this prefix are reserved for the engine in every scope.
pub const RESERVED_PREFIX: &str = "__";

pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

#[derive(Debug)]
pub struct Context {
    names: RefCell<HashMap<String, Reference>>,
    parent: Option<Rc<Context>>,
    analytic: bool,
}

impl Context {
    /// The root executive context. Only `GlobalContext` creates one.
    fn new_root() -> Rc<Context> {
        Rc::new(Context {
            names: RefCell::new(HashMap::new()),
            parent: None,
            analytic: false,
        })
    }

    pub fn child_executive(parent: &Rc<Context>) -> Rc<Context> {
        Rc::new(Context {
            names: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            analytic: false,
        })
    }

    pub fn child_analytic(parent: &Rc<Context>) -> Rc<Context> {
        Rc::new(Context {
            names: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            analytic: true,
        })
    }

    pub fn is_analytic(&self) -> bool {
        self.analytic
    }

    pub fn parent(&self) -> Option<&Rc<Context>> {
        self.parent.as_ref()
    }

    /// Walk self-then-parents for `name`.
    pub fn lookup(&self, name: &str) -> Option<Reference> {
        self.lookup_with_origin(name).map(|(reference, _)| reference)
    }

    /// Like [`lookup`](Context::lookup), but also reports whether the
    /// context the name was found in is analytic. The binder uses this to
    /// decline to capture references into scopes that will not exist at run
    /// time.
    pub fn lookup_with_origin(&self, name: &str) -> Option<(Reference, bool)> {
        if let Some(reference) = self.names.borrow().get(name) {
            return Some((reference.clone(), self.analytic));
        }
        let mut cursor = self.parent.clone();
        while let Some(ctx) = cursor {
            if let Some(reference) = ctx.names.borrow().get(name) {
                return Some((reference.clone(), ctx.analytic));
            }
            cursor = ctx.parent.clone();
        }
        None
    }

    /// Declare a user-visible name in this context. Reserved names are
    /// rejected; redeclaration shadows the previous binding in place.
    pub fn declare(&self, name: &str, reference: Reference) -> Result<(), RuntimeError> {
        if is_reserved_name(name) {
            return Err(RuntimeError::ReservedName {
                name: name.to_string(),
            });
        }
        self.names.borrow_mut().insert(name.to_string(), reference);
        Ok(())
    }

    /// Install an engine-reserved binding (`__this`, `__varg`, …) without the
    /// reserved-name check.
    pub fn declare_reserved(&self, name: &str, reference: Reference) {
        self.names.borrow_mut().insert(name.to_string(), reference);
    }

    /// Iterate every reference declared directly in this context.
    pub fn enumerate_references(&self, callback: &mut dyn FnMut(&Reference)) {
        for reference in self.names.borrow().values() {
            callback(reference);
        }
    }
}

/// The root of every context chain: builtins plus the cycle collector.
#[derive(Debug)]
pub struct GlobalContext {
    root: Rc<Context>,
    collector: RefCell<Collector>,
}

impl GlobalContext {
    pub fn new() -> Self {
        GlobalContext {
            root: Context::new_root(),
            collector: RefCell::new(Collector::new()),
        }
    }

    pub fn root(&self) -> &Rc<Context> {
        &self.root
    }

    /// Install a named binding (builtins) at the root.
    pub fn declare(&self, name: &str, reference: Reference) -> Result<(), RuntimeError> {
        self.root.declare(name, reference)
    }

    /// Create a variable slot registered with the collector.
    pub fn create_variable(&self, value: Value, immutable: bool) -> VarSlot {
        let slot = Variable::slot(value, immutable);
        self.collector.borrow_mut().track(&slot);
        slot
    }

    /// Register an externally created slot with the collector.
    pub fn track_variable(&self, slot: &VarSlot) {
        self.collector.borrow_mut().track(slot);
    }

    /// Run a mark-and-sweep pass over generations `0..=max_generation`.
    /// Returns the number of variables reclaimed.
    pub fn collect(&self, max_generation: usize) -> usize {
        self.collector.borrow_mut().collect(max_generation, &self.root)
    }

    pub fn tracked_variables(&self) -> usize {
        self.collector.borrow().tracked_count()
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        GlobalContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_parent_chain() {
        let global = GlobalContext::new();
        global
            .declare("outer", Reference::constant(Value::Int(1)))
            .unwrap();
        let child = Context::child_executive(global.root());
        let grandchild = Context::child_executive(&child);
        assert!(grandchild.lookup("outer").is_some());
        assert!(grandchild.lookup("missing").is_none());
    }

    #[test]
    fn inner_declaration_shadows_outer() {
        let global = GlobalContext::new();
        global
            .declare("x", Reference::constant(Value::Int(1)))
            .unwrap();
        let child = Context::child_executive(global.root());
        child.declare("x", Reference::constant(Value::Int(2))).unwrap();
        let found = child.lookup("x").unwrap();
        assert!(found.read().unwrap().equals(&Value::Int(2)));
    }

    #[test]
    fn reserved_names_are_rejected() {
        let global = GlobalContext::new();
        assert!(matches!(
            global.declare("__this", Reference::constant(Value::Null)),
            Err(RuntimeError::ReservedName { .. })
        ));
    }

    #[test]
    fn reserved_bindings_bypass_the_check() {
        let global = GlobalContext::new();
        let ctx = Context::child_executive(global.root());
        ctx.declare_reserved("__this", Reference::constant(Value::Null));
        assert!(ctx.lookup("__this").is_some());
    }

    #[test]
    fn analytic_origin_is_reported() {
        let global = GlobalContext::new();
        let analytic = Context::child_analytic(global.root());
        analytic
            .declare("a", Reference::constant(Value::Null))
            .unwrap();
        let inner = Context::child_analytic(&analytic);
        let (_, from_analytic) = inner.lookup_with_origin("a").unwrap();
        assert!(from_analytic);
        global
            .declare("g", Reference::constant(Value::Null))
            .unwrap();
        let (_, from_analytic) = inner.lookup_with_origin("g").unwrap();
        assert!(!from_analytic);
    }
}
