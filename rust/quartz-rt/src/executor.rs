//! The statement executor.
//!
//! Every statement runs against a mutable executive context and reports a
//! `Status` that control-flow constructs interpret on the way up: `break`
//! and `continue` carry the switch/while/for discriminator so an unlabeled
//! `break` still unwinds exactly the nearest matching construct. `return`
//! carries the produced reference. Host exceptions are never used for
//! control flow.

use crate::evaluator::evaluate;
use quartz_compiler::ast::{Block, Expr, SourceLocation, Stmt, SwitchClause, Target};
use quartz_core::{
    Context, Exception, GlobalContext, RefModifier, Reference, RuntimeError, Value,
};
use std::rc::Rc;

/// Control-flow signal returned by statement execution.
#[derive(Debug)]
pub enum Status {
    Next,
    Break(Target),
    Continue(Target),
    Return(Reference),
}

/// Deferred expressions registered by the enclosing function invocation.
/// They run in LIFO order when the invocation completes, normally or by
/// exception; an exception escaping a deferred expression is reported to
/// stderr and suppressed.
#[derive(Default)]
pub struct DeferQueue {
    entries: Vec<(Expr, Rc<Context>, SourceLocation)>,
}

impl DeferQueue {
    pub fn new() -> Self {
        DeferQueue::default()
    }

    fn push(&mut self, expr: Expr, ctx: Rc<Context>, loc: SourceLocation) {
        self.entries.push((expr, ctx, loc));
    }

    pub fn run_all(&mut self, global: &GlobalContext) {
        while let Some((expr, ctx, loc)) = self.entries.pop() {
            if let Err(exception) = evaluate(&expr, global, &ctx) {
                eprintln!(
                    "quartz: ignoring exception from deferred expression at {}: {}",
                    loc,
                    exception.value()
                );
            }
        }
    }
}

/// Execute a block in a fresh child scope.
pub fn execute_block(
    block: &Block,
    global: &GlobalContext,
    parent: &Rc<Context>,
    defers: &mut DeferQueue,
) -> Result<Status, Exception> {
    let ctx = Context::child_executive(parent);
    execute_stmts_in(&block.stmts, global, &ctx, defers)
}

/// Execute statements directly in `ctx` (function bodies, switch bodies and
/// per-iteration scopes own their context already).
pub fn execute_stmts_in(
    stmts: &[Stmt],
    global: &GlobalContext,
    ctx: &Rc<Context>,
    defers: &mut DeferQueue,
) -> Result<Status, Exception> {
    for stmt in stmts {
        match execute_stmt(stmt, global, ctx, defers)? {
            Status::Next => continue,
            other => return Ok(other),
        }
    }
    Ok(Status::Next)
}

pub fn execute_stmt(
    stmt: &Stmt,
    global: &GlobalContext,
    ctx: &Rc<Context>,
    defers: &mut DeferQueue,
) -> Result<Status, Exception> {
    match stmt {
        Stmt::Expression { expr } => {
            evaluate(expr, global, ctx)?;
            Ok(Status::Next)
        }
        Stmt::Block(block) => execute_block(block, global, ctx, defers),
        Stmt::VarDef {
            decls, immutable, ..
        } => {
            for decl in decls {
                // The slot is visible to its own initializer, as null.
                let slot = global.create_variable(Value::Null, false);
                ctx.declare(&decl.name, Reference::variable(slot.clone()))?;
                let value = evaluate(&decl.init, global, ctx)?.read()?;
                slot.borrow_mut().reset(value);
                if *immutable {
                    slot.borrow_mut().set_immutable();
                }
            }
            Ok(Status::Next)
        }
        Stmt::FuncDef { name, header, body } => {
            // Pre-declared so the body can call itself recursively.
            let slot = global.create_variable(Value::Null, false);
            ctx.declare(name, Reference::variable(slot.clone()))?;
            let bound = crate::bind::bind_function_body(header, body, ctx);
            let function =
                crate::function::InstantiatedFunction::new(header.clone(), bound, ctx.clone());
            slot.borrow_mut().reset(Value::Func(quartz_core::FuncValue::new(
                Rc::new(function),
            )));
            slot.borrow_mut().set_immutable();
            Ok(Status::Next)
        }
        Stmt::If {
            negate,
            cond,
            branch_true,
            branch_false,
        } => {
            let value = evaluate(cond, global, ctx)?.read()?;
            if value.is_truthy() != *negate {
                execute_block(branch_true, global, ctx, defers)
            } else {
                execute_block(branch_false, global, ctx, defers)
            }
        }
        Stmt::Switch { ctrl, clauses } => execute_switch(ctrl, clauses, global, ctx, defers),
        Stmt::DoWhile { body, negate, cond } => loop {
            match execute_block(body, global, ctx, defers)? {
                Status::Next => {}
                Status::Break(Target::Unspec) | Status::Break(Target::While) => {
                    return Ok(Status::Next)
                }
                Status::Continue(Target::Unspec) | Status::Continue(Target::While) => {}
                other => return Ok(other),
            }
            let value = evaluate(cond, global, ctx)?.read()?;
            if value.is_truthy() == *negate {
                return Ok(Status::Next);
            }
        },
        Stmt::While { negate, cond, body } => loop {
            let value = evaluate(cond, global, ctx)?.read()?;
            if value.is_truthy() == *negate {
                return Ok(Status::Next);
            }
            match execute_block(body, global, ctx, defers)? {
                Status::Next => {}
                Status::Break(Target::Unspec) | Status::Break(Target::While) => {
                    return Ok(Status::Next)
                }
                Status::Continue(Target::Unspec) | Status::Continue(Target::While) => {}
                other => return Ok(other),
            }
        },
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            // The init scope encloses the condition, step and body.
            let for_ctx = Context::child_executive(ctx);
            if let Some(init) = init {
                match execute_stmt(init, global, &for_ctx, defers)? {
                    Status::Next => {}
                    other => return Ok(other),
                }
            }
            loop {
                if !cond.is_empty() {
                    let value = evaluate(cond, global, &for_ctx)?.read()?;
                    if !value.is_truthy() {
                        return Ok(Status::Next);
                    }
                }
                match execute_block(body, global, &for_ctx, defers)? {
                    Status::Next => {}
                    Status::Break(Target::Unspec) | Status::Break(Target::For) => {
                        return Ok(Status::Next)
                    }
                    Status::Continue(Target::Unspec) | Status::Continue(Target::For) => {}
                    other => return Ok(other),
                }
                if !step.is_empty() {
                    evaluate(step, global, &for_ctx)?;
                }
            }
        }
        Stmt::ForEach {
            key_name,
            value_name,
            range,
            body,
        } => execute_for_each(key_name, value_name, range, body, global, ctx, defers),
        Stmt::Try {
            body,
            except_name,
            handler,
        } => match execute_block(body, global, ctx, defers) {
            Ok(status) => Ok(status),
            Err(exception) => {
                let catch_ctx = Context::child_executive(ctx);
                catch_ctx.declare(
                    except_name,
                    Reference::temporary(exception.value().clone()),
                )?;
                catch_ctx
                    .declare_reserved("__backtrace", Reference::constant(exception.backtrace_value()));
                execute_stmts_in(&handler.stmts, global, &catch_ctx, defers)
            }
        },
        Stmt::Defer { expr, loc } => {
            defers.push(expr.clone(), ctx.clone(), loc.clone());
            Ok(Status::Next)
        }
        Stmt::Break { target } => Ok(Status::Break(*target)),
        Stmt::Continue { target } => Ok(Status::Continue(*target)),
        Stmt::Throw { expr, loc } => {
            let value = evaluate(expr, global, ctx)?.read()?;
            let mut exception = Exception::new(value);
            exception.push_frame(loc.file.clone(), loc.line, "<throw>");
            Err(exception)
        }
        Stmt::Return { by_ref, expr } => {
            let mut result = evaluate(expr, global, ctx)?;
            if !*by_ref {
                result = Reference::temporary(result.read()?);
            }
            Ok(Status::Return(result))
        }
        Stmt::Assert {
            negate,
            expr,
            message,
            loc,
        } => {
            let value = evaluate(expr, global, ctx)?.read()?;
            if value.is_truthy() == *negate {
                return Err(RuntimeError::AssertionFailure {
                    message: message.clone().unwrap_or_default(),
                    file: loc.file.clone(),
                    line: loc.line,
                }
                .into());
            }
            Ok(Status::Next)
        }
    }
}

fn execute_switch(
    ctrl: &Expr,
    clauses: &[SwitchClause],
    global: &GlobalContext,
    ctx: &Rc<Context>,
    defers: &mut DeferQueue,
) -> Result<Status, Exception> {
    let control = evaluate(ctrl, global, ctx)?.read()?;
    // Every clause shares one nested scope so fall-through sees earlier
    // declarations.
    let switch_ctx = Context::child_executive(ctx);
    let mut start = None;
    let mut default_index = None;
    for (index, clause) in clauses.iter().enumerate() {
        match &clause.label {
            Some(label) => {
                let value = evaluate(label, global, &switch_ctx)?.read()?;
                if control.equals(&value) {
                    start = Some(index);
                    break;
                }
            }
            None => default_index = Some(index),
        }
    }
    let Some(start) = start.or(default_index) else {
        return Ok(Status::Next);
    };
    // Clauses skipped over still get their declarations, uninitialized.
    for clause in &clauses[..start] {
        predeclare_clause(clause, global, &switch_ctx)?;
    }
    for clause in &clauses[start..] {
        match execute_stmts_in(&clause.body, global, &switch_ctx, defers)? {
            Status::Next => continue,
            Status::Break(Target::Unspec) | Status::Break(Target::Switch) => {
                return Ok(Status::Next)
            }
            other => return Ok(other),
        }
    }
    Ok(Status::Next)
}

/// Declare every name a bypassed clause would have declared, bound to null.
fn predeclare_clause(
    clause: &SwitchClause,
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<(), RuntimeError> {
    for stmt in &clause.body {
        match stmt {
            Stmt::VarDef { decls, .. } => {
                for decl in decls {
                    let slot = global.create_variable(Value::Null, false);
                    ctx.declare(&decl.name, Reference::variable(slot))?;
                }
            }
            Stmt::FuncDef { name, .. } => {
                let slot = global.create_variable(Value::Null, false);
                ctx.declare(name, Reference::variable(slot))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn execute_for_each(
    key_name: &str,
    value_name: &str,
    range: &Expr,
    body: &Block,
    global: &GlobalContext,
    ctx: &Rc<Context>,
    defers: &mut DeferQueue,
) -> Result<Status, Exception> {
    let each_ctx = Context::child_executive(ctx);
    let mut range_ref = evaluate(range, global, &each_ctx)?;
    // A literal range still needs identity so element references stay live.
    range_ref.materialize(&mut |slot| global.track_variable(slot));
    let range_value = range_ref.read()?;
    match range_value {
        Value::Array(elems) => {
            // The index bound is snapshotted; element references are live.
            let len = elems.len();
            for index in 0..len {
                let iter_ctx = Context::child_executive(&each_ctx);
                iter_ctx.declare(key_name, Reference::constant(Value::Int(index as i64)))?;
                let mut element = range_ref.clone();
                element.zoom_in(RefModifier::ArrayIndex(index as i64));
                iter_ctx.declare(value_name, element)?;
                match execute_stmts_in(&body.stmts, global, &iter_ctx, defers)? {
                    Status::Next => {}
                    Status::Break(Target::Unspec) | Status::Break(Target::For) => {
                        return Ok(Status::Next)
                    }
                    Status::Continue(Target::Unspec) | Status::Continue(Target::For) => {}
                    other => return Ok(other),
                }
            }
            Ok(Status::Next)
        }
        Value::Object(members) => {
            let keys: Vec<String> = members.keys().cloned().collect();
            for key in keys {
                let iter_ctx = Context::child_executive(&each_ctx);
                iter_ctx.declare(key_name, Reference::constant(Value::string(key.clone())))?;
                let mut member = range_ref.clone();
                member.zoom_in(RefModifier::ObjectKey(key));
                iter_ctx.declare(value_name, member)?;
                match execute_stmts_in(&body.stmts, global, &iter_ctx, defers)? {
                    Status::Next => {}
                    Status::Break(Target::Unspec) | Status::Break(Target::For) => {
                        return Ok(Status::Next)
                    }
                    Status::Continue(Target::Unspec) | Status::Continue(Target::For) => {}
                    other => return Ok(other),
                }
            }
            Ok(Status::Next)
        }
        other => Err(RuntimeError::BadRange {
            value: other.to_string(),
        }
        .into()),
    }
}
