//! Host builtins installed into the global context before execution.

use quartz_core::{
    Callable, Exception, GlobalContext, Reference, RuntimeError, Value,
};
use std::rc::Rc;

type NativeFn = fn(&GlobalContext, Vec<Reference>) -> Result<Reference, Exception>;

/// A host function exposed to scripts as an ordinary function value.
struct NativeFunction {
    name: &'static str,
    body: NativeFn,
}

impl Callable for NativeFunction {
    fn describe(&self) -> String {
        self.name.to_string()
    }

    fn invoke(
        &self,
        global: &GlobalContext,
        _this: Reference,
        args: Vec<Reference>,
    ) -> Result<Reference, Exception> {
        (self.body)(global, args)
    }
}

fn declare_native(global: &GlobalContext, name: &'static str, body: NativeFn) {
    let function = Value::Func(quartz_core::FuncValue::new(Rc::new(NativeFunction {
        name,
        body,
    })));
    global
        .declare(name, Reference::constant(function))
        .expect("builtin names are not reserved");
}

/// Install the driver's standard bindings.
pub fn install(global: &GlobalContext) {
    declare_native(global, "print", |_global, args| {
        let mut out = String::new();
        for reference in &args {
            out.push_str(&reference.read().map_err(Exception::from)?.to_string());
        }
        print!("{}", out);
        Ok(Reference::temporary(Value::Null))
    });
    declare_native(global, "println", |_global, args| {
        let mut out = String::new();
        for reference in &args {
            out.push_str(&reference.read().map_err(Exception::from)?.to_string());
        }
        println!("{}", out);
        Ok(Reference::temporary(Value::Null))
    });
    declare_native(global, "dump", |_global, args| {
        let Some(reference) = args.first() else {
            return Err(RuntimeError::Host {
                message: "dump requires one argument".to_string(),
            }
            .into());
        };
        let value = reference.read().map_err(Exception::from)?;
        println!("{}", value.dump());
        Ok(Reference::temporary(value))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_declared_and_callable() {
        let global = GlobalContext::new();
        install(&global);
        let print = global.root().lookup("print").expect("print is installed");
        match print.read().unwrap() {
            Value::Func(_) => {}
            other => panic!("expected a function, got {:?}", other),
        }
    }
}
