//! Thrown values and their accumulated backtraces.
//!
//! An `Exception` is the error arm of every fallible runtime operation. It
//! carries the thrown `Value` (a user `throw` payload or the rendered message
//! of an engine fault) and the list of call-site frames accreted while the
//! stack unwound. `catch` scopes expose the frame list to scripts as the
//! reserved `__backtrace` array.

use crate::errors::RuntimeError;
use crate::values::{Object, Value};

/// One backtrace record: where a throw happened or a call unwound.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub func: String,
}

#[derive(Debug, Clone)]
pub struct Exception {
    value: Value,
    frames: Vec<Frame>,
}

impl Exception {
    pub fn new(value: Value) -> Self {
        Exception {
            value,
            frames: Vec::new(),
        }
    }

    /// Wrap a host-side error message, as when a builtin fails with a native
    /// `std::error::Error`.
    pub fn host(message: impl Into<String>) -> Self {
        Exception::from(RuntimeError::Host {
            message: message.into(),
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Record a frame as the stack unwinds past a throw site or a call site.
    pub fn push_frame(&mut self, file: impl Into<String>, line: u32, func: impl Into<String>) {
        self.frames.push(Frame {
            file: file.into(),
            line,
            func: func.into(),
        });
    }

    /// The backtrace as a script value: an array of `{file, line, func}`
    /// objects, innermost frame first.
    pub fn backtrace_value(&self) -> Value {
        let records = self
            .frames
            .iter()
            .map(|frame| {
                let mut record = Object::new();
                record.insert("file".to_string(), Value::string(frame.file.clone()));
                record.insert("line".to_string(), Value::Int(i64::from(frame.line)));
                record.insert("func".to_string(), Value::string(frame.func.clone()));
                Value::new_object(record)
            })
            .collect();
        Value::new_array(records)
    }
}

impl From<RuntimeError> for Exception {
    fn from(err: RuntimeError) -> Self {
        Exception::new(Value::string(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_accrete_in_unwind_order() {
        let mut exc = Exception::new(Value::string("boom"));
        exc.push_frame("a.qz", 3, "<throw>");
        exc.push_frame("a.qz", 9, "inner");
        exc.push_frame("a.qz", 20, "outer");
        assert_eq!(exc.frames().len(), 3);
        assert_eq!(exc.frames()[0].func, "<throw>");
        assert_eq!(exc.frames()[2].line, 20);
    }

    #[test]
    fn backtrace_value_shape() {
        let mut exc = Exception::new(Value::Null);
        exc.push_frame("f.qz", 1, "g");
        let bt = exc.backtrace_value();
        match bt {
            Value::Array(frames) => {
                assert_eq!(frames.len(), 1);
                match &frames[0] {
                    Value::Object(rec) => {
                        assert!(rec.get("file").unwrap().equals(&Value::string("f.qz")));
                        assert!(rec.get("line").unwrap().equals(&Value::Int(1)));
                        assert!(rec.get("func").unwrap().equals(&Value::string("g")));
                    }
                    other => panic!("expected object, got {:?}", other),
                }
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn runtime_error_becomes_string_payload() {
        let exc: Exception = RuntimeError::ModifyConstant.into();
        assert!(exc.value().equals(&Value::string("attempt to modify a constant")));
    }
}
