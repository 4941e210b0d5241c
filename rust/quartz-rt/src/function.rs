//! Instantiated function objects and the reserved `__varg` accessor.
//!
//! A function object bundles its header, the fully bound body, and the
//! captured enclosing context. Invocation parents the fresh function scope
//! to the *captured* context, not the caller's — free names are lexically
//! scoped. Parameters bind to the passed argument references directly, so
//! `&` arguments keep their identity while by-value arguments arrive as
//! temporaries.

use crate::executor::{execute_stmts_in, DeferQueue, Status};
use quartz_compiler::ast::{Block, FnHeader};
use quartz_core::gc::enumerate_reference;
use quartz_core::{
    Callable, Context, Exception, FuncValue, GlobalContext, Reference, RuntimeError, Value,
    VarSlot,
};
use std::rc::Rc;

pub struct InstantiatedFunction {
    header: FnHeader,
    body: Block,
    scope: Rc<Context>,
}

impl InstantiatedFunction {
    pub fn new(header: FnHeader, body: Block, scope: Rc<Context>) -> Self {
        InstantiatedFunction {
            header,
            body,
            scope,
        }
    }

    pub fn header(&self) -> &FnHeader {
        &self.header
    }
}

impl Callable for InstantiatedFunction {
    fn describe(&self) -> String {
        self.header.name.clone()
    }

    fn invoke(
        &self,
        global: &GlobalContext,
        this: Reference,
        args: Vec<Reference>,
    ) -> Result<Reference, Exception> {
        let ctx = Context::child_executive(&self.scope);
        let binding = self.header.binding_params();
        let mut args = args;
        let excess = if args.len() > binding.len() {
            args.split_off(binding.len())
        } else {
            Vec::new()
        };
        for (index, param) in binding.iter().enumerate() {
            let argument = args
                .get(index)
                .cloned()
                .unwrap_or_else(|| Reference::temporary(Value::Null));
            ctx.declare(param, argument)?;
        }
        ctx.declare_reserved("__this", this);
        ctx.declare_reserved(
            "__varg",
            Reference::constant(Value::Func(FuncValue::new(Rc::new(VargAccessor {
                args: excess,
            })))),
        );
        ctx.declare_reserved(
            "__file",
            Reference::constant(Value::string(self.header.loc.file.clone())),
        );
        ctx.declare_reserved(
            "__line",
            Reference::constant(Value::Int(i64::from(self.header.loc.line))),
        );
        ctx.declare_reserved(
            "__source",
            Reference::constant(Value::string(format!(
                "func {} at {}",
                self.header, self.header.loc
            ))),
        );

        let mut defers = DeferQueue::new();
        let outcome = execute_stmts_in(&self.body.stmts, global, &ctx, &mut defers);
        defers.run_all(global);
        match outcome? {
            Status::Next => Ok(Reference::temporary(Value::Null)),
            Status::Return(result) => Ok(result),
            Status::Break(_) => Err(RuntimeError::MisplacedBreak.into()),
            Status::Continue(_) => Err(RuntimeError::MisplacedContinue.into()),
        }
    }

    fn enumerate_variables(&self, callback: &mut dyn FnMut(&VarSlot)) {
        // The captured scope chain keeps everything this closure can reach.
        let mut cursor = Some(self.scope.clone());
        while let Some(ctx) = cursor {
            ctx.enumerate_references(&mut |reference| enumerate_reference(reference, callback));
            cursor = ctx.parent().cloned();
        }
    }
}

/// The reserved per-call accessor for excess arguments: `__varg()` yields
/// their count, `__varg(i)` the i-th one (null when out of range; negative
/// indices count from the back).
pub struct VargAccessor {
    args: Vec<Reference>,
}

impl Callable for VargAccessor {
    fn describe(&self) -> String {
        "__varg".to_string()
    }

    fn invoke(
        &self,
        _global: &GlobalContext,
        _this: Reference,
        args: Vec<Reference>,
    ) -> Result<Reference, Exception> {
        let Some(selector) = args.first() else {
            return Ok(Reference::temporary(Value::Int(self.args.len() as i64)));
        };
        match selector.read()? {
            Value::Int(index) => {
                let len = self.args.len() as i64;
                let wrapped = if index < 0 { index + len } else { index };
                if wrapped < 0 || wrapped >= len {
                    return Ok(Reference::temporary(Value::Null));
                }
                Ok(self.args[wrapped as usize].clone())
            }
            other => Err(RuntimeError::BadSubscript {
                subscript: other.to_string(),
            }
            .into()),
        }
    }

    fn enumerate_variables(&self, callback: &mut dyn FnMut(&VarSlot)) {
        for reference in &self.args {
            enumerate_reference(reference, callback);
        }
    }
}
