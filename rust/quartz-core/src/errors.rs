//! Runtime fault taxonomy.
//!
//! Every recoverable runtime fault is an enumerated `RuntimeError`; at the
//! throw site it converts into an [`Exception`](crate::exception::Exception)
//! whose payload is the rendered message string, so `try`/`catch` sees the
//! same shape for engine faults and user `throw`s alike. Stack-discipline
//! violations are NOT represented here: those are bugs and panic instead.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("the identifier `{name}` has not been declared")]
    UndeclaredIdentifier { name: String },
    #[error("the name `{name}` is reserved and cannot be declared")]
    ReservedName { name: String },
    #[error("the name `{name}` has already been declared in this scope")]
    DuplicateName { name: String },
    #[error("attempt to modify a constant")]
    ModifyConstant,
    #[error("attempt to modify a temporary value")]
    ModifyTemporary,
    #[error("attempt to modify the `const` variable after its initialization")]
    ModifyImmutable,
    #[error("the {op} operation is not defined for `{operand}`")]
    UndefinedUnary { op: &'static str, operand: String },
    #[error("the {op} operation is not defined for `{lhs}` and `{rhs}`")]
    UndefinedBinary {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("integral {op} of `{lhs}` and `{rhs}` would result in overflow")]
    IntegerOverflow {
        op: &'static str,
        lhs: i64,
        rhs: i64,
    },
    #[error("integral negation of `{operand}` would result in overflow")]
    NegationOverflow { operand: i64 },
    #[error("the divisor for `{lhs}` was zero")]
    DivisionByZero { lhs: i64 },
    #[error("bit shift count `{count}` for `{operand}` is negative")]
    NegativeShiftCount { operand: String, count: i64 },
    #[error("arithmetic left shift of `{lhs}` by `{count}` would result in overflow")]
    ShiftOverflow { lhs: i64, count: i64 },
    #[error("string duplication count `{count}` for `{operand}` is negative")]
    NegativeRepetition { operand: String, count: i64 },
    #[error("duplication of `{operand}` up to `{count}` times would result in an overlong string")]
    RepetitionOverflow { operand: String, count: i64 },
    #[error("shifting `{operand}` by `{count}` bytes would result in an overlong string")]
    StringShiftOverflow { operand: String, count: i64 },
    #[error("the value `{operand}` cannot be represented as an integer")]
    RealToInteger { operand: String },
    #[error("`{subscript}` cannot be used as a subscript")]
    BadSubscript { subscript: String },
    #[error("`{value}` cannot be indexed with an integer subscript")]
    NotAnArray { value: String },
    #[error("`{value}` cannot be indexed with a string subscript")]
    NotAnObject { value: String },
    #[error("array index `{index}` is out of range for a write (length `{len}`)")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("`{designator}` does not designate a removable member")]
    UnsetTarget { designator: String },
    #[error("`{value}` is not a function and cannot be called")]
    NotAFunction { value: String },
    #[error("the range of a `for each` loop must be an array or object, not `{value}`")]
    BadRange { value: String },
    #[error("`{lhs}` and `{rhs}` are unordered and cannot be compared relationally")]
    UnorderedComparison { lhs: String, rhs: String },
    #[error("`break` statements are not allowed outside matching `switch` or loop statements")]
    MisplacedBreak,
    #[error("`continue` statements are not allowed outside matching loop statements")]
    MisplacedContinue,
    #[error("assertion failure{}{} at {file}:{line}", if .message.is_empty() { "" } else { ": " }, .message)]
    AssertionFailure {
        message: String,
        file: String,
        line: u32,
    },
    #[error("variables cannot be created in analytic contexts")]
    AnalyticContextOperation,
    #[error("host error: {message}")]
    Host { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render_operands() {
        let err = RuntimeError::IntegerOverflow {
            op: "addition",
            lhs: i64::MAX,
            rhs: 1,
        };
        let text = err.to_string();
        assert!(text.contains("addition"));
        assert!(text.contains("9223372036854775807"));
    }

    #[test]
    fn assertion_message_is_optional() {
        let bare = RuntimeError::AssertionFailure {
            message: String::new(),
            file: "t.qz".to_string(),
            line: 3,
        };
        assert_eq!(bare.to_string(), "assertion failure at t.qz:3");
        let with_msg = RuntimeError::AssertionFailure {
            message: "broken".to_string(),
            file: "t.qz".to_string(),
            line: 3,
        };
        assert_eq!(with_msg.to_string(), "assertion failure: broken at t.qz:3");
    }
}
