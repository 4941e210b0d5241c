//! Tagged value representation for the Quartz interpreter.
//!
//! Collection variants (Array, Object) are wrapped in `Rc` for cheap cloning
//! via reference counting. Mutation goes through `Rc::make_mut()`, which gives
//! copy-on-write semantics: the inner data is only cloned when the reference
//! count is greater than one, so observable behavior stays value-typed.

use crate::callable::Callable;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use strum_macros::Display as StrumDisplay;

/// Element sequence backing `Value::Array`.
pub type Array = Vec<Value>;

/// Insertion-ordered string-keyed map backing `Value::Object`.
pub type Object = IndexMap<String, Value>;

/// Reference-counted handle to something invocable: an instantiated script
/// function, a host builtin, or the reserved `__varg` accessor.
#[derive(Clone)]
pub struct FuncValue(pub Rc<dyn Callable>);

impl FuncValue {
    pub fn new(callable: Rc<dyn Callable>) -> Self {
        FuncValue(callable)
    }

    pub fn callable(&self) -> &Rc<dyn Callable> {
        &self.0
    }

    /// Identity comparison. Two handles are the same function iff they point
    /// at the same allocation.
    pub fn ptr_eq(&self, other: &FuncValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncValue({})", self.0.describe())
    }
}

/// A runtime value: the tagged sum over the seven primitive kinds plus null.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Rc<str>),
    Func(FuncValue),
    Array(Rc<Array>),
    Object(Rc<Object>),
}

/// Discriminant of a `Value`, exposed to scripts by `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum Vtype {
    Null,
    Boolean,
    Integer,
    Real,
    String,
    Function,
    Array,
    Object,
}

/// Outcome of a three-way comparison between two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Unordered,
    Less,
    Equal,
    Greater,
}

impl From<Ordering> for Compare {
    fn from(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => Compare::Less,
            Ordering::Equal => Compare::Equal,
            Ordering::Greater => Compare::Greater,
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into()))
    }

    pub fn new_array(elems: Array) -> Self {
        Value::Array(Rc::new(elems))
    }

    pub fn new_object(members: Object) -> Self {
        Value::Object(Rc::new(members))
    }

    pub fn vtype(&self) -> Vtype {
        match self {
            Value::Null => Vtype::Null,
            Value::Bool(_) => Vtype::Boolean,
            Value::Int(_) => Vtype::Integer,
            Value::Real(_) => Vtype::Real,
            Value::Str(_) => Vtype::String,
            Value::Func(_) => Vtype::Function,
            Value::Array(_) => Vtype::Array,
            Value::Object(_) => Vtype::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness test used by branches, loops and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Real(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Func(_) | Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Three-way comparison.
    ///
    /// Same-type values order naturally; `Real` NaN is unordered against
    /// everything including itself. Integer/real pairs promote the integer.
    /// Arrays order lexicographically element-wise. Objects and functions
    /// only ever answer `Equal` or `Unordered`.
    pub fn compare(&self, other: &Value) -> Compare {
        match (self, other) {
            (Value::Null, Value::Null) => Compare::Equal,
            (Value::Bool(a), Value::Bool(b)) => Compare::from(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Compare::from(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => compare_reals(*a, *b),
            (Value::Int(a), Value::Real(b)) => compare_reals(*a as f64, *b),
            (Value::Real(a), Value::Int(b)) => compare_reals(*a, *b as f64),
            (Value::Str(a), Value::Str(b)) => Compare::from(a.as_bytes().cmp(b.as_bytes())),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Compare::Equal => continue,
                        other => return other,
                    }
                }
                Compare::from(a.len().cmp(&b.len()))
            }
            (Value::Object(a), Value::Object(b)) => {
                if objects_equal(a, b) {
                    Compare::Equal
                } else {
                    Compare::Unordered
                }
            }
            (Value::Func(a), Value::Func(b)) => {
                if a.ptr_eq(b) {
                    Compare::Equal
                } else {
                    Compare::Unordered
                }
            }
            _ => Compare::Unordered,
        }
    }

    /// Deep value-wise equality. Unordered pairs are unequal.
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Compare::Equal
    }

    /// Multi-line indented dump of this value, one leaf per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => {
                out.push_str("boolean ");
                out.push_str(if *b { "true" } else { "false" });
            }
            Value::Int(n) => {
                out.push_str("integer ");
                out.push_str(&n.to_string());
            }
            Value::Real(f) => {
                out.push_str("real ");
                out.push_str(&format_real(*f));
            }
            Value::Str(s) => {
                out.push_str(&format!("string({}) {:?}", s.len(), s));
            }
            Value::Func(f) => {
                out.push_str(&format!("function {}", f.0.describe()));
            }
            Value::Array(elems) => {
                out.push_str(&format!("array({}) [\n", elems.len()));
                for (i, v) in elems.iter().enumerate() {
                    out.push_str(&format!("{}  {} = ", pad, i));
                    v.dump_into(out, depth + 1);
                    out.push_str(";\n");
                }
                out.push_str(&format!("{}]", pad));
            }
            Value::Object(members) => {
                out.push_str(&format!("object({}) {{\n", members.len()));
                for (k, v) in members.iter() {
                    out.push_str(&format!("{}  {:?} = ", pad, k));
                    v.dump_into(out, depth + 1);
                    out.push_str(";\n");
                }
                out.push_str(&format!("{}}}", pad));
            }
        }
    }
}

fn compare_reals(a: f64, b: f64) -> Compare {
    match a.partial_cmp(&b) {
        Some(ord) => Compare::from(ord),
        None => Compare::Unordered,
    }
}

fn objects_equal(a: &Object, b: &Object) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| match b.get(k) {
        Some(w) => v.equals(w),
        None => false,
    })
}

/// Format a real the way the language prints it: `nan`, `infinity`,
/// `-infinity`, or the shortest round-trip decimal form.
pub fn format_real(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f < 0.0 {
            "-infinity".to_string()
        } else {
            "infinity".to_string()
        }
    } else {
        let mut s = f.to_string();
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.push_str(".0");
        }
        s
    }
}

impl fmt::Display for Value {
    /// Compact single-line rendering used in error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", format_real(*r)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Func(func) => write!(f, "<function {}>", func.0.describe()),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (i, v) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(members) => {
                write!(f, "{{")?;
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_of_primitives() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::Real(0.0).is_truthy());
        assert!(!Value::Real(f64::NAN).is_truthy());
        assert!(Value::Real(0.5).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(Value::new_array(vec![]).is_truthy());
        assert!(Value::new_object(Object::new()).is_truthy());
    }

    #[test]
    fn nan_is_unordered_even_against_itself() {
        let nan = Value::Real(f64::NAN);
        assert_eq!(nan.compare(&nan), Compare::Unordered);
        assert!(!nan.equals(&nan));
    }

    #[test]
    fn integer_real_promotion() {
        assert_eq!(Value::Int(2).compare(&Value::Real(2.0)), Compare::Equal);
        assert_eq!(Value::Int(2).compare(&Value::Real(2.5)), Compare::Less);
        assert_eq!(Value::Real(3.0).compare(&Value::Int(2)), Compare::Greater);
    }

    #[test]
    fn cross_type_is_unordered() {
        assert_eq!(
            Value::Int(1).compare(&Value::string("1")),
            Compare::Unordered
        );
        assert_eq!(Value::Null.compare(&Value::Bool(false)), Compare::Unordered);
        assert!(!Value::Int(0).equals(&Value::Bool(false)));
    }

    #[test]
    fn arrays_order_lexicographically() {
        let a = Value::new_array(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::new_array(vec![Value::Int(1), Value::Int(3)]);
        let c = Value::new_array(vec![Value::Int(1)]);
        assert_eq!(a.compare(&b), Compare::Less);
        assert_eq!(b.compare(&a), Compare::Greater);
        assert_eq!(c.compare(&a), Compare::Less);
        assert_eq!(a.compare(&a.clone()), Compare::Equal);
    }

    #[test]
    fn objects_compare_only_for_equality() {
        let mut m = Object::new();
        m.insert("x".to_string(), Value::Int(1));
        let a = Value::new_object(m.clone());
        let b = Value::new_object(m);
        let mut n = Object::new();
        n.insert("x".to_string(), Value::Int(2));
        let c = Value::new_object(n);
        assert_eq!(a.compare(&b), Compare::Equal);
        assert_eq!(a.compare(&c), Compare::Unordered);
    }

    #[test]
    fn string_comparison_is_bytewise() {
        assert_eq!(
            Value::string("abc").compare(&Value::string("abd")),
            Compare::Less
        );
        assert_eq!(
            Value::string("b").compare(&Value::string("ab")),
            Compare::Greater
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(Vtype::Null.to_string(), "null");
        assert_eq!(Vtype::Boolean.to_string(), "boolean");
        assert_eq!(Vtype::Integer.to_string(), "integer");
        assert_eq!(Vtype::Real.to_string(), "real");
        assert_eq!(Vtype::String.to_string(), "string");
        assert_eq!(Vtype::Function.to_string(), "function");
        assert_eq!(Vtype::Array.to_string(), "array");
        assert_eq!(Vtype::Object.to_string(), "object");
    }

    #[test]
    fn real_formatting() {
        assert_eq!(format_real(1.0), "1.0");
        assert_eq!(format_real(1.5), "1.5");
        assert_eq!(format_real(f64::NAN), "nan");
        assert_eq!(format_real(f64::INFINITY), "infinity");
        assert_eq!(format_real(f64::NEG_INFINITY), "-infinity");
    }

    #[test]
    fn dump_shows_structure() {
        let mut m = Object::new();
        m.insert("k".to_string(), Value::Int(7));
        let v = Value::new_array(vec![Value::Null, Value::new_object(m)]);
        let dump = v.dump();
        assert!(dump.starts_with("array(2) ["));
        assert!(dump.contains("0 = null;"));
        assert!(dump.contains("object(1)"));
        assert!(dump.contains("\"k\" = integer 7;"));
    }
}
