//! Exceptions: throw/try/catch, backtrace accretion, assert, defer.

use quartz_core::{GlobalContext, Value};
use quartz_rt::Program;

fn run(src: &str) -> Value {
    let global = GlobalContext::new();
    let program = Program::compile(src.as_bytes(), "exc.qz").expect("program compiles");
    program
        .execute(&global, Vec::new())
        .expect("program executes")
        .read()
        .expect("result reads")
}

fn run_exception(src: &str) -> quartz_core::Exception {
    let global = GlobalContext::new();
    let program = Program::compile(src.as_bytes(), "exc.qz").expect("program compiles");
    program
        .execute(&global, Vec::new())
        .expect_err("program throws")
}

#[test]
fn thrown_values_keep_their_type() {
    assert!(run(r#"try { throw 42; } catch(e) { return e; }"#).equals(&Value::Int(42)));
    assert!(
        run(r#"try { throw { code: 7 }; } catch(e) { return e.code; }"#).equals(&Value::Int(7))
    );
}

#[test]
fn uncaught_exceptions_reach_the_host() {
    let exception = run_exception(r#"throw "top";"#);
    assert!(exception.value().equals(&Value::string("top")));
    assert!(!exception.frames().is_empty());
}

#[test]
fn backtrace_grows_through_call_frames() {
    let src = r#"
        func inner() { throw "x"; }
        func outer() { inner(); }
        try { outer(); } catch(e) { return lengthof(__backtrace); }
    "#;
    assert!(run(src).equals(&Value::Int(3)));
}

#[test]
fn backtrace_records_file_line_and_function() {
    let src = r#"
        func inner() { throw "x"; }
        inner();
    "#;
    let exception = run_exception(src);
    let frames = exception.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].func, "<throw>");
    assert_eq!(frames[0].file, "exc.qz");
    assert_eq!(frames[0].line, 2);
    assert_eq!(frames[1].func, "inner");
    assert_eq!(frames[1].line, 3);
}

#[test]
fn catch_scope_sees_backtrace_records() {
    let src = r#"
        func inner() { throw "x"; }
        try { inner(); } catch(e) {
            var first = __backtrace[0];
            return first.func + "@" + first.file + ":" + first.line;
        }
    "#;
    assert!(run(src).equals(&Value::string("<throw>@exc.qz:2")));
}

#[test]
fn runtime_errors_are_catchable_as_strings() {
    let src = r#"try { return 1 / 0; } catch(e) { return typeof e; }"#;
    assert!(run(src).equals(&Value::string("string")));
    let src = r#"try { missing(); } catch(e) { return e; }"#;
    let text = run(src).to_string();
    assert!(text.contains("missing"), "got {}", text);
}

#[test]
fn execution_continues_after_a_handled_exception() {
    let src = r#"
        var s = "";
        try { s = s + "a"; throw 1; } catch(e) { s = s + "b"; }
        s = s + "c";
        return s;
    "#;
    assert!(run(src).equals(&Value::string("abc")));
}

#[test]
fn nested_try_rethrow() {
    let src = r#"
        try {
            try { throw "inner"; } catch(e) { throw e + "+outer"; }
        } catch(e) {
            return e;
        }
    "#;
    assert!(run(src).equals(&Value::string("inner+outer")));
}

#[test]
fn finally_like_defer_runs_on_normal_return() {
    let src = r#"
        var trace = "";
        func f() {
            defer trace = trace + "a";
            defer trace = trace + "b";
            trace = trace + "c";
        }
        f();
        return trace;
    "#;
    assert!(run(src).equals(&Value::string("cba")));
}

#[test]
fn defer_runs_when_an_exception_unwinds() {
    let src = r#"
        var trace = "";
        func f() {
            defer trace = trace + "d";
            throw "boom";
        }
        try { f(); } catch(e) { trace = trace + "c"; }
        return trace;
    "#;
    assert!(run(src).equals(&Value::string("dc")));
}

#[test]
fn assertions_throw_with_location_and_message() {
    let exception = run_exception(r#"assert 1 == 2 : "math broke";"#);
    let text = exception.value().to_string();
    assert!(text.contains("assertion failure"), "got {}", text);
    assert!(text.contains("math broke"), "got {}", text);
    assert!(text.contains("exc.qz:1"), "got {}", text);
}

#[test]
fn negated_assertions_fire_on_truthy() {
    assert!(run("assert !(1 == 2); return 1;").equals(&Value::Int(1)));
    let exception = run_exception("assert !(2 == 2);");
    assert!(exception.value().to_string().contains("assertion failure"));
}

#[test]
fn passing_assertions_are_silent() {
    assert!(run("assert 1 == 1; return 7;").equals(&Value::Int(7)));
}

#[test]
fn break_outside_a_loop_is_a_runtime_error() {
    let exception = run_exception("break;");
    assert!(exception.value().to_string().contains("break"));
    let exception = run_exception("continue;");
    assert!(exception.value().to_string().contains("continue"));
}

#[test]
fn catch_binding_is_a_temporary() {
    // Writing through the caught temporary has no observable identity.
    let exception = run_exception(r#"try { throw 1; } catch(e) { e = 2; }"#);
    assert!(exception
        .value()
        .to_string()
        .contains("temporary"));
}

#[test]
fn host_exception_wrapping() {
    let exception = quartz_core::Exception::host("disk on fire");
    assert!(exception.value().to_string().contains("disk on fire"));
}
