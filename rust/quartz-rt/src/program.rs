//! The driver API: compile source text, execute against a global context.
//!
//! A `Program` is a parsed top-level block. Execution binds it against the
//! global context and runs it as a zero-parameter variadic function whose
//! `__varg` exposes the host-supplied arguments.

use crate::bind::bind_function_body;
use crate::function::InstantiatedFunction;
use quartz_compiler::ast::{Block, FnHeader, SourceLocation};
use quartz_compiler::{parse_source, ParseError};
use quartz_core::{Callable, Exception, GlobalContext, Reference, Value};

#[derive(Debug, Clone)]
pub struct Program {
    file: String,
    block: Block,
}

impl Program {
    /// Lex and parse `source`. The first scanner or parser error becomes the
    /// result without being thrown.
    pub fn compile(source: &[u8], filename: &str) -> Result<Program, ParseError> {
        Ok(Program {
            file: filename.to_string(),
            block: parse_source(source, filename)?,
        })
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Execute the program. `args` become the file scope's excess arguments,
    /// reachable through `__varg`.
    pub fn execute(
        &self,
        global: &GlobalContext,
        args: Vec<Reference>,
    ) -> Result<Reference, Exception> {
        let header = FnHeader {
            loc: SourceLocation::new(self.file.clone(), 1),
            name: "<file scope>".to_string(),
            params: vec!["...".to_string()],
        };
        let bound = bind_function_body(&header, &self.block, global.root());
        let function = InstantiatedFunction::new(header, bound, global.root().clone());
        function.invoke(global, Reference::constant(Value::Null), args)
    }
}
