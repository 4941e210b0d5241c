//! The analytic binder: the first pass over a function body at
//! instantiation time.
//!
//! The binder mirrors the lexical nesting with analytic contexts and visits
//! every named reference. A name that resolves in a non-analytic ancestor (a
//! run-time scope that already exists, such as the scope a closure is being
//! instantiated in) is rewritten into a bound reference capturing the
//! resolved `Reference`. Names that resolve to analytic scopes — or do not
//! resolve at all — stay named and are looked up at execution time. Reserved
//! `__` names are never bound.

use quartz_compiler::ast::{Block, FnHeader, Stmt, SwitchClause, Xunit};
use quartz_core::{is_reserved_name, Context, Reference, Value};
use std::rc::Rc;

/// Bind a function body against the context it is instantiated in. `ctx` is
/// the executive scope the closure captures; the body's parameters and local
/// declarations shadow it through analytic child contexts.
pub fn bind_function_body(header: &FnHeader, body: &Block, ctx: &Rc<Context>) -> Block {
    bind_closure_body(header, body, ctx)
}

/// Names introduced by statements are pre-declared as dummy references so
/// that the binder sees them before their defining statement executes.
fn predeclare(ctx: &Rc<Context>, name: &str) {
    let _ = ctx.declare(name, Reference::constant(Value::Null));
}

fn bind_block(block: &Block, ctx: &Rc<Context>) -> Block {
    let child = Context::child_analytic(ctx);
    Block::new(bind_stmts(&block.stmts, &child))
}

fn bind_stmts(stmts: &[Stmt], ctx: &Rc<Context>) -> Vec<Stmt> {
    stmts.iter().map(|stmt| bind_stmt(stmt, ctx)).collect()
}

fn bind_stmt(stmt: &Stmt, ctx: &Rc<Context>) -> Stmt {
    match stmt {
        Stmt::Expression { expr } => Stmt::Expression {
            expr: bind_expr(expr, ctx),
        },
        Stmt::Block(block) => Stmt::Block(bind_block(block, ctx)),
        Stmt::VarDef {
            decls,
            immutable,
            loc,
        } => {
            // Each slot is visible to its own initializer (as null), so the
            // name is declared before the initializer is bound.
            let decls = decls
                .iter()
                .map(|decl| {
                    predeclare(ctx, &decl.name);
                    quartz_compiler::ast::VarDecl {
                        name: decl.name.clone(),
                        init: bind_expr(&decl.init, ctx),
                    }
                })
                .collect();
            Stmt::VarDef {
                decls,
                immutable: *immutable,
                loc: loc.clone(),
            }
        }
        Stmt::FuncDef { name, header, body } => {
            predeclare(ctx, name);
            Stmt::FuncDef {
                name: name.clone(),
                header: header.clone(),
                body: bind_closure_body(header, body, ctx),
            }
        }
        Stmt::If {
            negate,
            cond,
            branch_true,
            branch_false,
        } => Stmt::If {
            negate: *negate,
            cond: bind_expr(cond, ctx),
            branch_true: bind_block(branch_true, ctx),
            branch_false: bind_block(branch_false, ctx),
        },
        Stmt::Switch { ctrl, clauses } => {
            // All clauses share one nested scope.
            let shared = Context::child_analytic(ctx);
            let clauses = clauses
                .iter()
                .map(|clause| SwitchClause {
                    label: clause
                        .label
                        .as_ref()
                        .map(|label| bind_expr(label, &shared)),
                    body: bind_stmts(&clause.body, &shared),
                })
                .collect();
            Stmt::Switch {
                ctrl: bind_expr(ctrl, ctx),
                clauses,
            }
        }
        Stmt::DoWhile { body, negate, cond } => Stmt::DoWhile {
            body: bind_block(body, ctx),
            negate: *negate,
            cond: bind_expr(cond, ctx),
        },
        Stmt::While { negate, cond, body } => Stmt::While {
            negate: *negate,
            cond: bind_expr(cond, ctx),
            body: bind_block(body, ctx),
        },
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            // The init scope encloses the condition, step and body.
            let for_ctx = Context::child_analytic(ctx);
            Stmt::For {
                init: init
                    .as_ref()
                    .map(|stmt| Box::new(bind_stmt(stmt, &for_ctx))),
                cond: bind_expr(cond, &for_ctx),
                step: bind_expr(step, &for_ctx),
                body: bind_block(body, &for_ctx),
            }
        }
        Stmt::ForEach {
            key_name,
            value_name,
            range,
            body,
        } => {
            let range = bind_expr(range, ctx);
            let loop_ctx = Context::child_analytic(ctx);
            predeclare(&loop_ctx, key_name);
            predeclare(&loop_ctx, value_name);
            Stmt::ForEach {
                key_name: key_name.clone(),
                value_name: value_name.clone(),
                range,
                body: bind_block(body, &loop_ctx),
            }
        }
        Stmt::Try {
            body,
            except_name,
            handler,
        } => {
            let catch_ctx = Context::child_analytic(ctx);
            predeclare(&catch_ctx, except_name);
            Stmt::Try {
                body: bind_block(body, ctx),
                except_name: except_name.clone(),
                handler: bind_block(handler, &catch_ctx),
            }
        }
        Stmt::Defer { expr, loc } => Stmt::Defer {
            expr: bind_expr(expr, ctx),
            loc: loc.clone(),
        },
        Stmt::Break { .. } | Stmt::Continue { .. } => stmt.clone(),
        Stmt::Throw { expr, loc } => Stmt::Throw {
            expr: bind_expr(expr, ctx),
            loc: loc.clone(),
        },
        Stmt::Return { by_ref, expr } => Stmt::Return {
            by_ref: *by_ref,
            expr: bind_expr(expr, ctx),
        },
        Stmt::Assert {
            negate,
            expr,
            message,
            loc,
        } => Stmt::Assert {
            negate: *negate,
            expr: bind_expr(expr, ctx),
            message: message.clone(),
            loc: loc.clone(),
        },
    }
}

fn bind_closure_body(header: &FnHeader, body: &Block, ctx: &Rc<Context>) -> Block {
    let fn_ctx = Context::child_analytic(ctx);
    for param in header.binding_params() {
        predeclare(&fn_ctx, param);
    }
    Block::new(bind_stmts(&body.stmts, &fn_ctx))
}

fn bind_expr(expr: &[Xunit], ctx: &Rc<Context>) -> Vec<Xunit> {
    expr.iter()
        .map(|unit| match unit {
            Xunit::NamedRef { name } => {
                if is_reserved_name(name) {
                    return unit.clone();
                }
                match ctx.lookup_with_origin(name) {
                    Some((reference, false)) => Xunit::BoundRef { reference },
                    _ => unit.clone(),
                }
            }
            Xunit::ClosureFunc { header, body } => Xunit::ClosureFunc {
                header: header.clone(),
                body: bind_closure_body(header, body, ctx),
            },
            Xunit::Branch {
                assign,
                branch_true,
                branch_false,
            } => Xunit::Branch {
                assign: *assign,
                branch_true: bind_expr(branch_true, ctx),
                branch_false: bind_expr(branch_false, ctx),
            },
            Xunit::Coalescence {
                assign,
                branch_null,
            } => Xunit::Coalescence {
                assign: *assign,
                branch_null: bind_expr(branch_null, ctx),
            },
            _ => unit.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_compiler::ast::SourceLocation;
    use quartz_core::GlobalContext;

    fn header() -> FnHeader {
        FnHeader {
            loc: SourceLocation::new("t.qz", 1),
            name: "f".to_string(),
            params: vec!["p".to_string()],
        }
    }

    #[test]
    fn executive_names_become_bound_references() {
        let global = GlobalContext::new();
        global
            .declare("builtin", Reference::constant(Value::Int(1)))
            .unwrap();
        let body = Block::new(vec![Stmt::Expression {
            expr: vec![Xunit::NamedRef {
                name: "builtin".to_string(),
            }],
        }]);
        let bound = bind_function_body(&header(), &body, global.root());
        match &bound.stmts[0] {
            Stmt::Expression { expr } => {
                assert!(matches!(expr[0], Xunit::BoundRef { .. }));
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn parameters_stay_named() {
        let global = GlobalContext::new();
        let body = Block::new(vec![Stmt::Expression {
            expr: vec![Xunit::NamedRef {
                name: "p".to_string(),
            }],
        }]);
        let bound = bind_function_body(&header(), &body, global.root());
        match &bound.stmts[0] {
            Stmt::Expression { expr } => {
                assert!(matches!(expr[0], Xunit::NamedRef { .. }));
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn reserved_names_are_never_bound() {
        let global = GlobalContext::new();
        let body = Block::new(vec![Stmt::Expression {
            expr: vec![Xunit::NamedRef {
                name: "__this".to_string(),
            }],
        }]);
        let bound = bind_function_body(&header(), &body, global.root());
        match &bound.stmts[0] {
            Stmt::Expression { expr } => {
                assert!(matches!(expr[0], Xunit::NamedRef { .. }));
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn locals_shadow_executive_names() {
        let global = GlobalContext::new();
        global
            .declare("x", Reference::constant(Value::Int(1)))
            .unwrap();
        let body = Block::new(vec![
            Stmt::VarDef {
                decls: vec![quartz_compiler::ast::VarDecl {
                    name: "x".to_string(),
                    init: vec![Xunit::Literal { value: Value::Null }],
                }],
                immutable: false,
                loc: SourceLocation::new("t.qz", 1),
            },
            Stmt::Expression {
                expr: vec![Xunit::NamedRef {
                    name: "x".to_string(),
                }],
            },
        ]);
        let bound = bind_function_body(&header(), &body, global.root());
        match &bound.stmts[1] {
            Stmt::Expression { expr } => {
                // Shadowed by the analytic local, so it must stay named.
                assert!(matches!(expr[0], Xunit::NamedRef { .. }));
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }
}
