//! RPN expression evaluation over a stack of references.
//!
//! Each expression is a flat unit vector; evaluation pushes and pops
//! `Reference`s. A well-formed expression leaves exactly one reference on
//! the stack — anything else is a compiler bug and panics rather than
//! throwing, because user code must not be able to catch it.

use crate::bind::bind_function_body;
use crate::function::InstantiatedFunction;
use quartz_compiler::ast::{Xop, Xunit};
use quartz_core::values::Object;
use quartz_core::{
    Compare, Context, Exception, FuncValue, GlobalContext, RefModifier, Reference, RuntimeError,
    Value,
};
use std::rc::Rc;

pub struct RefStack {
    refs: Vec<Reference>,
}

impl RefStack {
    pub fn new() -> Self {
        RefStack { refs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    fn push(&mut self, reference: Reference) {
        self.refs.push(reference);
    }

    fn pop(&mut self) -> Reference {
        self.refs
            .pop()
            .expect("expression evaluation stack is unbalanced (pop from empty stack)")
    }

    fn top_mut(&mut self) -> &mut Reference {
        self.refs
            .last_mut()
            .expect("expression evaluation stack is unbalanced (no top of stack)")
    }
}

impl Default for RefStack {
    fn default() -> Self {
        RefStack::new()
    }
}

/// Evaluate a whole expression to a single reference.
pub fn evaluate(
    expr: &[Xunit],
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<Reference, Exception> {
    let mut stack = RefStack::new();
    evaluate_onto(expr, &mut stack, global, ctx)?;
    if stack.len() != 1 {
        panic!(
            "expression evaluation left {} references on the stack instead of exactly one",
            stack.len()
        );
    }
    Ok(stack.pop())
}

fn evaluate_onto(
    expr: &[Xunit],
    stack: &mut RefStack,
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<(), Exception> {
    for unit in expr {
        evaluate_unit(unit, stack, global, ctx)?;
    }
    Ok(())
}

/// Evaluate a branch sub-expression in place and check it produced exactly
/// one reference.
fn evaluate_subexpression(
    expr: &[Xunit],
    stack: &mut RefStack,
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<(), Exception> {
    let depth = stack.len();
    evaluate_onto(expr, stack, global, ctx)?;
    if stack.len() != depth + 1 {
        panic!("branch sub-expression must leave exactly one reference on the stack");
    }
    Ok(())
}

fn evaluate_unit(
    unit: &Xunit,
    stack: &mut RefStack,
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<(), Exception> {
    match unit {
        Xunit::Literal { value } => {
            stack.push(Reference::constant(value.clone()));
        }
        Xunit::NamedRef { name } => match ctx.lookup(name) {
            Some(reference) => stack.push(reference),
            None => {
                return Err(RuntimeError::UndeclaredIdentifier {
                    name: name.clone(),
                }
                .into())
            }
        },
        Xunit::BoundRef { reference } => {
            stack.push(reference.clone());
        }
        Xunit::ClosureFunc { header, body } => {
            let bound = bind_function_body(header, body, ctx);
            let function = InstantiatedFunction::new(header.clone(), bound, ctx.clone());
            stack.push(Reference::temporary(Value::Func(FuncValue::new(Rc::new(
                function,
            )))));
        }
        Xunit::FuncCall { loc, arg_cnt } => {
            let mut args = Vec::with_capacity(*arg_cnt);
            for _ in 0..*arg_cnt {
                args.push(stack.pop());
            }
            args.reverse();
            let callee = stack.pop();
            let func = match callee.read().map_err(Exception::from)? {
                Value::Func(func) => func,
                other => {
                    return Err(RuntimeError::NotAFunction {
                        value: other.to_string(),
                    }
                    .into())
                }
            };
            // `this` is the container the callee was plucked out of, if any.
            let this = callee
                .parent_of_member()
                .unwrap_or_else(|| Reference::constant(Value::Null));
            match func.0.invoke(global, this, args) {
                Ok(result) => stack.push(result),
                Err(mut exception) => {
                    exception.push_frame(loc.file.clone(), loc.line, func.0.describe());
                    return Err(exception);
                }
            }
        }
        Xunit::MemberAccess { key } => {
            stack
                .top_mut()
                .zoom_in(RefModifier::ObjectKey(key.clone()));
        }
        Xunit::UnnamedArray { elem_cnt } => {
            let mut elems = Vec::with_capacity(*elem_cnt);
            for _ in 0..*elem_cnt {
                elems.push(stack.pop().read().map_err(Exception::from)?);
            }
            elems.reverse();
            stack.push(Reference::temporary(Value::new_array(elems)));
        }
        Xunit::UnnamedObject { keys } => {
            let mut values = Vec::with_capacity(keys.len());
            for _ in 0..keys.len() {
                values.push(stack.pop().read().map_err(Exception::from)?);
            }
            values.reverse();
            let mut members = Object::new();
            for (key, value) in keys.iter().zip(values) {
                members.insert(key.clone(), value);
            }
            stack.push(Reference::temporary(Value::new_object(members)));
        }
        Xunit::Branch {
            assign,
            branch_true,
            branch_false,
        } => {
            let condition = stack.pop();
            let taken = if condition.read().map_err(Exception::from)?.is_truthy() {
                branch_true
            } else {
                branch_false
            };
            finish_branch(condition, taken, *assign, stack, global, ctx)?;
        }
        Xunit::Coalescence {
            assign,
            branch_null,
        } => {
            let condition = stack.pop();
            let taken: &[Xunit] = if condition.read().map_err(Exception::from)?.is_null() {
                branch_null
            } else {
                &[]
            };
            finish_branch(condition, taken, *assign, stack, global, ctx)?;
        }
        Xunit::OperatorRpn { op, assign } => {
            apply_operator(*op, *assign, stack).map_err(Exception::from)?;
        }
    }
    Ok(())
}

/// Shared tail of branch / coalescence: evaluate the chosen sub-expression
/// (an empty one keeps the condition), optionally writing the result back
/// through the condition reference.
fn finish_branch(
    condition: Reference,
    taken: &[Xunit],
    assign: bool,
    stack: &mut RefStack,
    global: &GlobalContext,
    ctx: &Rc<Context>,
) -> Result<(), Exception> {
    if taken.is_empty() {
        stack.push(condition);
        return Ok(());
    }
    evaluate_subexpression(taken, stack, global, ctx)?;
    if assign {
        let result = stack.pop();
        let value = result.read().map_err(Exception::from)?;
        condition.write(value).map_err(Exception::from)?;
        stack.push(condition);
    }
    Ok(())
}

// ── Operator dispatch ───────────────────────────────────────────────

fn apply_operator(op: Xop, assign: bool, stack: &mut RefStack) -> Result<(), RuntimeError> {
    match op {
        Xop::PostfixInc | Xop::PostfixDec => {
            let target = stack.pop();
            let old = target.read()?;
            let new = step_value(&old, op == Xop::PostfixInc, op)?;
            target.write(new)?;
            stack.push(Reference::temporary(old));
        }
        Xop::PrefixInc | Xop::PrefixDec => {
            let old = stack.top_mut().read()?;
            let new = step_value(&old, op == Xop::PrefixInc, op)?;
            stack.top_mut().write(new)?;
            // The reference itself stays on the stack.
        }
        Xop::Pos => {
            // Identity; this is also the unit that materializes by-value
            // call arguments into temporaries.
            let value = stack.pop().read()?;
            stack.push(Reference::temporary(value));
        }
        Xop::Unset => {
            let removed = stack.pop().unset()?;
            stack.push(Reference::temporary(removed));
        }
        Xop::Assign => {
            let value = stack.pop().read()?;
            stack.top_mut().write(value)?;
            // The left reference keeps its identity so `a = b = c` chains.
        }
        Xop::Subscr => {
            let subscript = stack.pop().read()?;
            let modifier = match subscript {
                Value::Int(index) => RefModifier::ArrayIndex(index),
                Value::Str(key) => RefModifier::ObjectKey(key.to_string()),
                other => {
                    return Err(RuntimeError::BadSubscript {
                        subscript: other.to_string(),
                    })
                }
            };
            stack.top_mut().zoom_in(modifier);
        }
        Xop::Neg
        | Xop::NotB
        | Xop::NotL
        | Xop::Lengthof
        | Xop::Typeof
        | Xop::Abs
        | Xop::Sqrt
        | Xop::Signb
        | Xop::Isnan
        | Xop::Isinf
        | Xop::Round
        | Xop::Floor
        | Xop::Ceil
        | Xop::Trunc
        | Xop::Iround
        | Xop::Ifloor
        | Xop::Iceil
        | Xop::Itrunc => {
            let operand = stack.pop().read()?;
            let result = apply_unary(op, operand)?;
            stack.push(Reference::temporary(result));
        }
        Xop::Fma => {
            let c = stack.pop().read()?;
            let b = stack.pop().read()?;
            let a = stack.pop().read()?;
            let result = Value::Real(as_real(op, &a)?.mul_add(as_real(op, &b)?, as_real(op, &c)?));
            stack.push(Reference::temporary(result));
        }
        Xop::CmpEq | Xop::CmpNe | Xop::CmpLt | Xop::CmpGt | Xop::CmpLte | Xop::CmpGte
        | Xop::Cmp3Way => {
            let rhs = stack.pop().read()?;
            let lhs = stack.pop().read()?;
            let result = apply_comparison(op, &lhs, &rhs)?;
            stack.push(Reference::temporary(result));
        }
        Xop::Add
        | Xop::Sub
        | Xop::Mul
        | Xop::Div
        | Xop::Mod
        | Xop::Sll
        | Xop::Srl
        | Xop::Sla
        | Xop::Sra
        | Xop::AndB
        | Xop::OrB
        | Xop::XorB => {
            let rhs = stack.pop().read()?;
            if assign {
                let lhs_ref = stack.pop();
                let lhs = lhs_ref.read()?;
                let result = apply_binary(op, lhs, rhs)?;
                lhs_ref.write(result)?;
                stack.push(lhs_ref);
            } else {
                let lhs = stack.pop().read()?;
                let result = apply_binary(op, lhs, rhs)?;
                stack.push(Reference::temporary(result));
            }
        }
    }
    Ok(())
}

fn step_value(value: &Value, increment: bool, op: Xop) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => {
            let delta = if increment { 1 } else { -1 };
            let new = n.checked_add(delta).ok_or(RuntimeError::IntegerOverflow {
                op: if increment { "increment" } else { "decrement" },
                lhs: *n,
                rhs: delta,
            })?;
            Ok(Value::Int(new))
        }
        Value::Real(f) => Ok(Value::Real(if increment { f + 1.0 } else { f - 1.0 })),
        other => Err(undefined_unary(op, other)),
    }
}

fn undefined_unary(op: Xop, operand: &Value) -> RuntimeError {
    RuntimeError::UndefinedUnary {
        op: operator_name(op),
        operand: operand.to_string(),
    }
}

fn undefined_binary(op: Xop, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::UndefinedBinary {
        op: operator_name(op),
        lhs: lhs.to_string(),
        rhs: rhs.to_string(),
    }
}

/// Leaked-once operator names for error payloads.
fn operator_name(op: Xop) -> &'static str {
    match op {
        Xop::PostfixInc => "postfix increment",
        Xop::PostfixDec => "postfix decrement",
        Xop::Pos => "unary promotion",
        Xop::Neg => "unary negation",
        Xop::NotB => "bitwise not",
        Xop::NotL => "logical not",
        Xop::PrefixInc => "prefix increment",
        Xop::PrefixDec => "prefix decrement",
        Xop::Unset => "prefix `unset`",
        Xop::Lengthof => "prefix `lengthof`",
        Xop::Typeof => "prefix `typeof`",
        Xop::Abs => "`__abs`",
        Xop::Sqrt => "`__sqrt`",
        Xop::Signb => "`__signb`",
        Xop::Isnan => "`__isnan`",
        Xop::Isinf => "`__isinf`",
        Xop::Round => "`__round`",
        Xop::Floor => "`__floor`",
        Xop::Ceil => "`__ceil`",
        Xop::Trunc => "`__trunc`",
        Xop::Iround => "`__iround`",
        Xop::Ifloor => "`__ifloor`",
        Xop::Iceil => "`__iceil`",
        Xop::Itrunc => "`__itrunc`",
        Xop::Fma => "`__fma`",
        Xop::CmpEq => "equality comparison",
        Xop::CmpNe => "inequality comparison",
        Xop::CmpLt => "less-than comparison",
        Xop::CmpGt => "greater-than comparison",
        Xop::CmpLte => "less-than-or-equal comparison",
        Xop::CmpGte => "greater-than-or-equal comparison",
        Xop::Cmp3Way => "three-way comparison",
        Xop::Add => "addition",
        Xop::Sub => "subtraction",
        Xop::Mul => "multiplication",
        Xop::Div => "division",
        Xop::Mod => "modulo",
        Xop::Sll => "logical left shift",
        Xop::Srl => "logical right shift",
        Xop::Sla => "arithmetic left shift",
        Xop::Sra => "arithmetic right shift",
        Xop::AndB => "bitwise and",
        Xop::OrB => "bitwise or",
        Xop::XorB => "bitwise xor",
        Xop::Assign => "assignment",
        Xop::Subscr => "subscript",
    }
}

fn as_real(op: Xop, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Real(f) => Ok(*f),
        other => Err(undefined_unary(op, other)),
    }
}

fn apply_unary(op: Xop, operand: Value) -> Result<Value, RuntimeError> {
    match (op, &operand) {
        (Xop::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or(RuntimeError::NegationOverflow { operand: *n }),
        (Xop::Neg, Value::Real(f)) => Ok(Value::Real(-f)),
        (Xop::NotB, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (Xop::NotB, Value::Int(n)) => Ok(Value::Int(!n)),
        (Xop::NotL, _) => Ok(Value::Bool(!operand.is_truthy())),
        (Xop::Lengthof, Value::Str(s)) => Ok(Value::Int(s.len() as i64)),
        (Xop::Lengthof, Value::Array(elems)) => Ok(Value::Int(elems.len() as i64)),
        (Xop::Lengthof, Value::Object(members)) => Ok(Value::Int(members.len() as i64)),
        (Xop::Typeof, _) => Ok(Value::string(operand.vtype().to_string())),
        (Xop::Abs, Value::Int(n)) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or(RuntimeError::NegationOverflow { operand: *n }),
        (Xop::Abs, Value::Real(f)) => Ok(Value::Real(f.abs())),
        (Xop::Sqrt, Value::Int(n)) => Ok(Value::Real((*n as f64).sqrt())),
        (Xop::Sqrt, Value::Real(f)) => Ok(Value::Real(f.sqrt())),
        (Xop::Signb, Value::Int(n)) => Ok(Value::Bool(*n < 0)),
        (Xop::Signb, Value::Real(f)) => Ok(Value::Bool(f.is_sign_negative())),
        (Xop::Isnan, Value::Int(_)) => Ok(Value::Bool(false)),
        (Xop::Isnan, Value::Real(f)) => Ok(Value::Bool(f.is_nan())),
        (Xop::Isinf, Value::Int(_)) => Ok(Value::Bool(false)),
        (Xop::Isinf, Value::Real(f)) => Ok(Value::Bool(f.is_infinite())),
        (Xop::Round, Value::Int(_)) => Ok(operand),
        (Xop::Round, Value::Real(f)) => Ok(Value::Real(f.round())),
        (Xop::Floor, Value::Int(_)) => Ok(operand),
        (Xop::Floor, Value::Real(f)) => Ok(Value::Real(f.floor())),
        (Xop::Ceil, Value::Int(_)) => Ok(operand),
        (Xop::Ceil, Value::Real(f)) => Ok(Value::Real(f.ceil())),
        (Xop::Trunc, Value::Int(_)) => Ok(operand),
        (Xop::Trunc, Value::Real(f)) => Ok(Value::Real(f.trunc())),
        (Xop::Iround, Value::Int(_)) => Ok(operand),
        (Xop::Iround, Value::Real(f)) => real_to_int(f.round()),
        (Xop::Ifloor, Value::Int(_)) => Ok(operand),
        (Xop::Ifloor, Value::Real(f)) => real_to_int(f.floor()),
        (Xop::Iceil, Value::Int(_)) => Ok(operand),
        (Xop::Iceil, Value::Real(f)) => real_to_int(f.ceil()),
        (Xop::Itrunc, Value::Int(_)) => Ok(operand),
        (Xop::Itrunc, Value::Real(f)) => real_to_int(f.trunc()),
        _ => Err(undefined_unary(op, &operand)),
    }
}

fn real_to_int(f: f64) -> Result<Value, RuntimeError> {
    // i64 range check; 2^63 is exactly representable as f64.
    if f.is_nan() || f < -9_223_372_036_854_775_808.0 || f >= 9_223_372_036_854_775_808.0 {
        return Err(RuntimeError::RealToInteger {
            operand: quartz_core::values::format_real(f),
        });
    }
    Ok(Value::Int(f as i64))
}

fn apply_comparison(op: Xop, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let ordering = lhs.compare(rhs);
    match op {
        Xop::CmpEq => Ok(Value::Bool(ordering == Compare::Equal)),
        Xop::CmpNe => Ok(Value::Bool(ordering != Compare::Equal)),
        Xop::Cmp3Way => Ok(match ordering {
            Compare::Less => Value::Int(-1),
            Compare::Equal => Value::Int(0),
            Compare::Greater => Value::Int(1),
            Compare::Unordered => Value::string("unordered"),
        }),
        _ => {
            if ordering == Compare::Unordered {
                return Err(RuntimeError::UnorderedComparison {
                    lhs: lhs.to_string(),
                    rhs: rhs.to_string(),
                });
            }
            Ok(Value::Bool(match op {
                Xop::CmpLt => ordering == Compare::Less,
                Xop::CmpGt => ordering == Compare::Greater,
                Xop::CmpLte => ordering != Compare::Greater,
                Xop::CmpGte => ordering != Compare::Less,
                _ => unreachable!("non-comparison opcode in apply_comparison"),
            }))
        }
    }
}

fn apply_binary(op: Xop, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (op, &lhs, &rhs) {
        // `+`: boolean OR, checked integer addition, real addition, string
        // concatenation.
        (Xop::Add, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a | *b)),
        (Xop::Add, Value::Int(a), Value::Int(b)) => checked_int(op, *a, *b, a.checked_add(*b)),
        (Xop::Add, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a + b)),
        (Xop::Add, Value::Str(a), Value::Str(b)) => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::string(out))
        }
        // A string operand turns `+` into concatenation of display forms.
        (Xop::Add, Value::Str(_), _) | (Xop::Add, _, Value::Str(_)) => {
            Ok(Value::string(format!("{}{}", lhs, rhs)))
        }
        // `-`: boolean XOR, checked integer / real subtraction.
        (Xop::Sub, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a ^ *b)),
        (Xop::Sub, Value::Int(a), Value::Int(b)) => checked_int(op, *a, *b, a.checked_sub(*b)),
        (Xop::Sub, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a - b)),
        // `*`: boolean AND, checked integer / real multiplication, string
        // repetition with a non-negative count.
        (Xop::Mul, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a & *b)),
        (Xop::Mul, Value::Int(a), Value::Int(b)) => checked_int(op, *a, *b, a.checked_mul(*b)),
        (Xop::Mul, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a * b)),
        (Xop::Mul, Value::Str(s), Value::Int(n)) => repeat_string(s, *n),
        (Xop::Mul, Value::Int(n), Value::Str(s)) => repeat_string(s, *n),
        // `/` and `%` on integers guard zero and INT64_MIN / -1.
        (Xop::Div, Value::Int(a), Value::Int(b)) => {
            check_division(*a, *b)?;
            Ok(Value::Int(a / b))
        }
        (Xop::Div, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a / b)),
        (Xop::Mod, Value::Int(a), Value::Int(b)) => {
            check_division(*a, *b)?;
            Ok(Value::Int(a % b))
        }
        (Xop::Mod, Value::Real(a), Value::Real(b)) => Ok(Value::Real(a % b)),
        // Shifts.
        (Xop::Sll, Value::Int(a), Value::Int(b)) => {
            let count = shift_count(&lhs, *b)?;
            Ok(Value::Int(if count >= 64 {
                0
            } else {
                ((*a as u64) << count) as i64
            }))
        }
        (Xop::Srl, Value::Int(a), Value::Int(b)) => {
            let count = shift_count(&lhs, *b)?;
            Ok(Value::Int(if count >= 64 {
                0
            } else {
                ((*a as u64) >> count) as i64
            }))
        }
        (Xop::Sla, Value::Int(a), Value::Int(b)) => {
            let count = shift_count(&lhs, *b)?;
            shift_left_arithmetic(*a, count)
        }
        (Xop::Sra, Value::Int(a), Value::Int(b)) => {
            let count = shift_count(&lhs, *b)?;
            Ok(Value::Int(if count >= 64 {
                if *a < 0 {
                    -1
                } else {
                    0
                }
            } else {
                a >> count
            }))
        }
        // String shifts: `<<<`/`>>>` move bytes with NUL fill, length
        // preserved; `<<` appends NUL bytes, `>>` truncates at the end.
        (Xop::Sll, Value::Str(s), Value::Int(n)) => {
            let count = shift_count(&lhs, *n)?;
            let bytes = s.as_bytes();
            let mut out = vec![0u8; bytes.len()];
            if (count as usize) < bytes.len() {
                let kept = bytes.len() - count as usize;
                out[..kept].copy_from_slice(&bytes[count as usize..]);
            }
            Ok(bytes_to_string(out))
        }
        (Xop::Srl, Value::Str(s), Value::Int(n)) => {
            let count = shift_count(&lhs, *n)?;
            let bytes = s.as_bytes();
            let mut out = vec![0u8; bytes.len()];
            if (count as usize) < bytes.len() {
                let kept = bytes.len() - count as usize;
                out[count as usize..].copy_from_slice(&bytes[..kept]);
            }
            Ok(bytes_to_string(out))
        }
        (Xop::Sla, Value::Str(s), Value::Int(n)) => {
            let count = shift_count(&lhs, *n)?;
            if count as u64 > u32::MAX as u64 {
                return Err(RuntimeError::StringShiftOverflow {
                    operand: s.to_string(),
                    count,
                });
            }
            let mut out = s.as_bytes().to_vec();
            out.extend(std::iter::repeat(0u8).take(count as usize));
            Ok(bytes_to_string(out))
        }
        (Xop::Sra, Value::Str(s), Value::Int(n)) => {
            let count = shift_count(&lhs, *n)?;
            let bytes = s.as_bytes();
            let kept = bytes.len().saturating_sub(count as usize);
            Ok(bytes_to_string(bytes[..kept].to_vec()))
        }
        // Bitwise: boolean pairs act logically, integer pairs bitwise.
        (Xop::AndB, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a & *b)),
        (Xop::AndB, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
        (Xop::OrB, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a | *b)),
        (Xop::OrB, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
        (Xop::XorB, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a ^ *b)),
        (Xop::XorB, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a ^ b)),
        _ => Err(undefined_binary(op, &lhs, &rhs)),
    }
}

fn checked_int(op: Xop, lhs: i64, rhs: i64, result: Option<i64>) -> Result<Value, RuntimeError> {
    result
        .map(Value::Int)
        .ok_or(RuntimeError::IntegerOverflow {
            op: operator_name(op),
            lhs,
            rhs,
        })
}

fn check_division(lhs: i64, rhs: i64) -> Result<(), RuntimeError> {
    if rhs == 0 {
        return Err(RuntimeError::DivisionByZero { lhs });
    }
    if lhs == i64::MIN && rhs == -1 {
        return Err(RuntimeError::IntegerOverflow {
            op: "division",
            lhs,
            rhs,
        });
    }
    Ok(())
}

fn shift_count(operand: &Value, count: i64) -> Result<i64, RuntimeError> {
    if count < 0 {
        return Err(RuntimeError::NegativeShiftCount {
            operand: operand.to_string(),
            count,
        });
    }
    Ok(count)
}

fn shift_left_arithmetic(lhs: i64, count: i64) -> Result<Value, RuntimeError> {
    if lhs == 0 {
        return Ok(Value::Int(0));
    }
    if count >= 64 {
        return Err(RuntimeError::ShiftOverflow { lhs, count });
    }
    // Every bit shifted out, and the new top bit, must equal the sign bit.
    let bits = lhs as u64;
    let bits_rem = 63 - count as u32;
    let mask_out = (bits >> bits_rem) << bits_rem;
    let mask_sign = 0u64.wrapping_sub(bits >> 63) << bits_rem;
    if mask_out != mask_sign {
        return Err(RuntimeError::ShiftOverflow { lhs, count });
    }
    Ok(Value::Int((bits << count) as i64))
}

fn repeat_string(s: &str, n: i64) -> Result<Value, RuntimeError> {
    if n < 0 {
        return Err(RuntimeError::NegativeRepetition {
            operand: s.to_string(),
            count: n,
        });
    }
    let count = n as usize;
    if s.len().checked_mul(count).map_or(true, |total| total > u32::MAX as usize) {
        return Err(RuntimeError::RepetitionOverflow {
            operand: s.to_string(),
            count: n,
        });
    }
    Ok(Value::string(s.repeat(count)))
}

/// Byte-level string results may cut multi-byte sequences; repair lossily.
fn bytes_to_string(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::string(s),
        Err(err) => Value::string(String::from_utf8_lossy(err.as_bytes()).into_owned()),
    }
}
