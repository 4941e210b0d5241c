//! Functions and closures: lexical capture, `this`, `__varg`, reference
//! arguments, and cycle collection.

use quartz_core::{GlobalContext, Value};
use quartz_rt::Program;

fn run(src: &str) -> Value {
    let global = GlobalContext::new();
    let program = Program::compile(src.as_bytes(), "fn.qz").expect("program compiles");
    program
        .execute(&global, Vec::new())
        .expect("program executes")
        .read()
        .expect("result reads")
}

fn run_err(src: &str) -> String {
    let global = GlobalContext::new();
    let program = Program::compile(src.as_bytes(), "fn.qz").expect("program compiles");
    program
        .execute(&global, Vec::new())
        .expect_err("program throws")
        .value()
        .to_string()
}

#[test]
fn closures_capture_their_enclosing_scope() {
    let src = r#"
        func counter() {
            var n = 0;
            return func() { n += 1; return n; };
        }
        var c = counter();
        c();
        c();
        return c();
    "#;
    assert!(run(src).equals(&Value::Int(3)));
}

#[test]
fn two_instances_do_not_share_state() {
    let src = r#"
        func counter() {
            var n = 0;
            return func() { n += 1; return n; };
        }
        var a = counter();
        var b = counter();
        a();
        a();
        return a() * 10 + b();
    "#;
    assert!(run(src).equals(&Value::Int(31)));
}

#[test]
fn mutations_through_the_closure_are_visible_outside() {
    let src = r#"
        var shared = 1;
        func bump() { shared += 10; }
        bump();
        return shared;
    "#;
    assert!(run(src).equals(&Value::Int(11)));
}

#[test]
fn parameters_shadow_captured_names() {
    let src = r#"
        var x = 1;
        func f(x) { return x; }
        return f(42);
    "#;
    assert!(run(src).equals(&Value::Int(42)));
}

#[test]
fn missing_arguments_are_null() {
    assert!(run("func f(a, b) { return b ?? -1; } return f(1);").equals(&Value::Int(-1)));
}

#[test]
fn by_value_arguments_are_temporaries() {
    let message = run_err("func f(x) { x = 1; } f(5);");
    assert!(message.contains("temporary"), "got {}", message);
}

#[test]
fn reference_arguments_keep_their_identity() {
    let src = r#"
        func bump(x) { x += 1; }
        var a = 41;
        bump(&a);
        return a;
    "#;
    assert!(run(src).equals(&Value::Int(42)));
}

#[test]
fn varg_exposes_count_and_indexed_access() {
    let src = r#"
        func f(a, ...) { return __varg() * 100 + __varg(0) + __varg(-1); }
        return f(1, 10, 20);
    "#;
    assert!(run(src).equals(&Value::Int(230)));
}

#[test]
fn varg_out_of_range_is_null() {
    assert!(run("func f() { return __varg(5) ?? -1; } return f();").equals(&Value::Int(-1)));
}

#[test]
fn excess_arguments_flow_to_varg_without_the_marker() {
    assert!(run("func f(a) { return __varg(); } return f(1, 2, 3);").equals(&Value::Int(2)));
}

#[test]
fn method_calls_bind_this_to_the_container() {
    let src = r#"
        var o = {
            x: 42,
            get: func() { return this.x; }
        };
        return o.get();
    "#;
    assert!(run(src).equals(&Value::Int(42)));
}

#[test]
fn plain_calls_have_null_this() {
    let src = r#"
        func f() { return this; }
        return f() ?? "no this";
    "#;
    assert!(run(src).equals(&Value::string("no this")));
}

#[test]
fn file_and_line_reserved_names_exist_in_functions() {
    let src = r#"
        func f() { return __file; }
        return f();
    "#;
    assert!(run(src).equals(&Value::string("fn.qz")));
}

#[test]
fn functions_returning_nothing_yield_null() {
    assert!(run("func f() { } return f() ?? 9;").equals(&Value::Int(9)));
}

#[test]
fn return_by_reference_lets_callers_write_through() {
    let src = r#"
        var a = [1, 2, 3];
        func second() { return &a[1]; }
        second() = 99;
        return a[1];
    "#;
    assert!(run(src).equals(&Value::Int(99)));
}

#[test]
fn return_by_value_produces_a_temporary() {
    let src = r#"
        var a = [1, 2, 3];
        func second() { return a[1]; }
        second() = 99;
    "#;
    assert!(run_err(src).contains("temporary"));
}

#[test]
fn functions_compare_by_identity() {
    let src = r#"
        func f() { }
        var g = f;
        return f == g ? "same" : "different";
    "#;
    assert!(run(src).equals(&Value::string("same")));
}

#[test]
fn anonymous_closures_call_immediately() {
    assert!(run("return func(x) { return x * 2; }(21);").equals(&Value::Int(42)));
}

#[test]
fn higher_order_functions() {
    let src = r#"
        func twice(f, x) { return f(f(x)); }
        return twice(func(n) { return n + 3; }, 10);
    "#;
    assert!(run(src).equals(&Value::Int(16)));
}

#[test]
fn closure_cycles_are_reclaimed_by_the_collector() {
    let global = GlobalContext::new();
    let src = r#"
        var cell = [];
        cell[0] = func() { return cell; };
    "#;
    let program = Program::compile(src.as_bytes(), "gc.qz").expect("program compiles");
    program.execute(&global, Vec::new()).expect("program executes");
    // The array holds a closure whose captured scope holds the array: a
    // cycle unreachable from the global context once execution finished.
    let reclaimed = global.collect(quartz_core::gc::GENERATION_COUNT);
    assert!(reclaimed >= 1, "reclaimed {}", reclaimed);
}

#[test]
fn reachable_globals_survive_collection() {
    let global = GlobalContext::new();
    let slot = global.create_variable(Value::Int(5), false);
    global
        .declare("keep", quartz_core::Reference::variable(slot.clone()))
        .unwrap();
    let program = Program::compile(b"return keep;", "gc.qz").expect("program compiles");
    program.execute(&global, Vec::new()).expect("program executes");
    global.collect(quartz_core::gc::GENERATION_COUNT);
    assert!(slot.borrow().value().equals(&Value::Int(5)));
}
