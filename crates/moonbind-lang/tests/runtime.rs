//! Language behavior tests.
//!
//! Tests the full stack: compile → validate → interpret, through a
//! RuntimeManager with captured output. Printed lines are inspected to
//! verify correctness.

use moonbind_lang::{ErrorCode, RuntimeConfig, RuntimeManager, ScriptError, Value};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn manager() -> RuntimeManager {
    RuntimeManager::with_config(RuntimeConfig::default().with_capture_output(true))
}

fn run(src: &str) -> Vec<String> {
    let mut rt = manager();
    rt.execute(src).unwrap_or_else(|e| panic!("execute failed: {e}"));
    rt.take_output()
}

fn run_err(src: &str) -> ScriptError {
    let mut rt = manager();
    match rt.execute(src) {
        Ok(()) => panic!("expected execute to fail but it succeeded"),
        Err(e) => e,
    }
}

fn runtime_err(src: &str) -> moonbind_lang::RuntimeError {
    match run_err(src) {
        ScriptError::Runtime(e) => e,
        ScriptError::Compile(errs) => panic!("expected runtime error, got compile errors: {errs:#?}"),
    }
}

fn compile_codes(src: &str) -> Vec<ErrorCode> {
    match run_err(src) {
        ScriptError::Compile(errs) => errs.iter().map(|e| e.code).collect(),
        ScriptError::Runtime(e) => panic!("expected compile error, got runtime error: {e}"),
    }
}

// ─── Arithmetic ──────────────────────────────────────────────────────────────

#[test]
fn integer_and_float_arithmetic() {
    assert_eq!(run("print(1 + 2, 10 / 4, 7 // 2, 2 ^ 10)"), vec!["3\t2.5\t3\t1024.0"]);
}

#[test]
fn division_always_produces_float() {
    assert_eq!(run("print(10 / 2)"), vec!["5.0"]);
}

#[test]
fn modulo_takes_sign_of_divisor() {
    assert_eq!(run("print(7 % -3, -7 % 3)"), vec!["-2\t2"]);
}

#[test]
fn integer_division_by_zero() {
    let e = runtime_err("local z = 0\nprint(1 // z)");
    assert_eq!(e.line, 2);
    assert!(e.message.contains("n//0"), "{}", e.message);
}

#[test]
fn arithmetic_on_nil_reports_line() {
    let e = runtime_err("\n\nlocal x = nil + 1");
    assert_eq!(e.code, ErrorCode::R001);
    assert_eq!(e.line, 3);
    assert!(e.message.contains("arithmetic on a nil value"));
}

#[test]
fn numeric_strings_coerce() {
    assert_eq!(run("print('10' + 1, 1.5 .. '')"), vec!["11\t1.5"]);
}

// ─── Logic & comparison ─────────────────────────────────────────────────────

#[test]
fn and_or_return_operands() {
    assert_eq!(run("print(nil or 'd', false and 1, 1 and 2)"), vec!["d\tfalse\t2"]);
}

#[test]
fn string_comparison() {
    assert_eq!(run("print('a' < 'b', 'b' <= 'a')"), vec!["true\tfalse"]);
}

#[test]
fn mixed_comparison_is_error() {
    let e = runtime_err("print(1 < 'x')");
    assert!(e.message.contains("attempt to compare number with string"), "{}", e.message);
}

// ─── Strings ─────────────────────────────────────────────────────────────────

#[test]
fn string_methods_and_length() {
    assert_eq!(run("print(('abc'):upper(), #'hello', 'a' .. 'b' .. 1)"), vec!["ABC\t5\tab1"]);
}

#[test]
fn string_library() {
    let out = run("print(string.rep('ab', 3, ','), string.sub('hello', 2, -2), string.len(''))");
    assert_eq!(out, vec!["ab,ab,ab\tell\t0"]);
}

#[test]
fn string_rep_refuses_huge_results() {
    let e = runtime_err("local s = string.rep('x', math.maxinteger)");
    assert_eq!(e.message, "resulting string too large");
    let e = runtime_err("local s = string.rep('', math.maxinteger, 'ab')");
    assert_eq!(e.message, "resulting string too large");
    assert_eq!(run("print(#string.rep('', math.maxinteger))"), vec!["0"]);
}

#[test]
fn escapes_and_long_strings() {
    assert_eq!(run("print('a\\tb', [[raw]])"), vec!["a\tb\traw"]);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(run("-- line\n--[[ block\n comment ]] print(1)"), vec!["1"]);
}

// ─── Control flow ────────────────────────────────────────────────────────────

#[test]
fn numeric_for_ascending_and_descending() {
    assert_eq!(run("for i = 1, 3 do print(i) end"), vec!["1", "2", "3"]);
    assert_eq!(run("for i = 3, 1, -1 do print(i) end"), vec!["3", "2", "1"]);
}

#[test]
fn numeric_for_with_float_step() {
    assert_eq!(run("for x = 0, 1, 0.5 do print(x) end"), vec!["0.0", "0.5", "1.0"]);
}

#[test]
fn numeric_for_stops_at_maxinteger() {
    let out = run("for i = math.maxinteger - 1, math.maxinteger do print(i) end");
    assert_eq!(out, vec![(i64::MAX - 1).to_string(), i64::MAX.to_string()]);
}

#[test]
fn for_step_zero_is_error() {
    let e = runtime_err("for i = 1, 2, 0 do end");
    assert!(e.message.contains("step is zero"));
}

#[test]
fn while_with_break() {
    let src = "local i = 0\nwhile true do\n  i = i + 1\n  if i == 4 then break end\nend\nprint(i)";
    assert_eq!(run(src), vec!["4"]);
}

#[test]
fn repeat_condition_sees_body_locals() {
    let src = "local i = 0 repeat local j = i i = i + 1 until j >= 2 print(i)";
    assert_eq!(run(src), vec!["3"]);
}

#[test]
fn if_elseif_else() {
    let src = r#"
        local function classify(n)
            if n < 0 then return "neg"
            elseif n == 0 then return "zero"
            else return "pos" end
        end
        print(classify(-1), classify(0), classify(5))
    "#;
    assert_eq!(run(src), vec!["neg\tzero\tpos"]);
}

#[test]
fn generic_for_over_pairs_and_ipairs() {
    let src = r#"
        local t = {10, 20, 30}
        local s = 0
        for i, v in ipairs(t) do s = s + i * v end
        print(s)
        local n = 0
        for k, v in pairs({a = 1, b = 2, c = 3}) do n = n + v end
        print(n)
    "#;
    assert_eq!(run(src), vec!["140", "6"]);
}

// ─── Functions ───────────────────────────────────────────────────────────────

#[test]
fn closures_keep_upvalues() {
    let src = r#"
        local function counter()
            local n = 0
            return function() n = n + 1 return n end
        end
        local c = counter()
        c() c()
        print(c())
    "#;
    assert_eq!(run(src), vec!["3"]);
}

#[test]
fn loop_closures_capture_each_iteration() {
    let src = r#"
        local fns = {}
        for i = 1, 3 do fns[i] = function() return i end end
        print(fns[1](), fns[3]())
    "#;
    assert_eq!(run(src), vec!["1\t3"]);
}

#[test]
fn varargs_and_select() {
    let src = r#"
        local function count(...) return select('#', ...) end
        local function sum(...)
            local s = 0
            for _, v in ipairs({...}) do s = s + v end
            return s
        end
        print(count(1, nil, 3), sum(1, 2, 3))
    "#;
    assert_eq!(run(src), vec!["3\t6"]);
}

#[test]
fn multiple_assignment_swaps() {
    assert_eq!(run("local a, b = 1, 2 a, b = b, a print(a, b)"), vec!["2\t1"]);
}

#[test]
fn method_definition_on_table() {
    let src = r#"
        local Account = {balance = 0}
        function Account:deposit(v) self.balance = self.balance + v end
        Account:deposit(5)
        Account:deposit(7)
        print(Account.balance)
    "#;
    assert_eq!(run(src), vec!["12"]);
}

#[test]
fn dotted_function_name() {
    assert_eq!(run("local a = {b = {}} function a.b.c() return 1 end print(a.b.c())"), vec!["1"]);
}

#[test]
fn recursion_depth_is_bounded() {
    let mut rt = RuntimeManager::with_config(RuntimeConfig::default().with_max_call_depth(40));
    let err = rt.execute("local function f() return f() end f()").unwrap_err();
    assert_eq!(err.runtime_code(), Some(ErrorCode::R007));
}

#[test]
fn unbounded_recursion_faults_at_default_depth() {
    let e = runtime_err("local function f() return f() end f()");
    assert_eq!(e.code, ErrorCode::R007);
    assert!(e.message.contains("call depth exceeded 200"), "{}", e.message);
}

#[test]
fn deep_recursion_through_pcall_faults_cleanly() {
    let src = r#"
        local function f(n) return pcall(f, n + 1) end
        print(f(1))
    "#;
    let out = run(src);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("true"), "{out:?}");
    assert!(out[0].ends_with("false\tstack overflow (call depth exceeded 200)"), "{out:?}");
}

#[test]
fn calling_nil_global_names_it() {
    let e = runtime_err("foo()");
    assert_eq!(e.message, "attempt to call a nil value (global 'foo')");
}

#[test]
fn indexing_nil_local_names_it() {
    let e = runtime_err("local t = nil\nprint(t.x)");
    assert_eq!(e.line, 2);
    assert!(e.message.contains("(local 't')"), "{}", e.message);
}

// ─── Errors from script ─────────────────────────────────────────────────────

#[test]
fn pcall_catches_error() {
    assert_eq!(run("print(pcall(function() error('boom') end))"), vec!["false\tboom"]);
}

#[test]
fn pcall_passes_results_through() {
    assert_eq!(run("print(pcall(function(a, b) return a + b end, 2, 3))"), vec!["true\t5"]);
}

#[test]
fn uncaught_error_carries_code() {
    let e = runtime_err("error('bad thing')");
    assert_eq!(e.code, ErrorCode::R006);
    assert_eq!(e.message, "bad thing");
}

#[test]
fn assert_failure_message() {
    let e = runtime_err("assert(false, 'nope')");
    assert_eq!(e.message, "nope");
    assert_eq!(runtime_err("assert(nil)").message, "assertion failed!");
}

// ─── Standard library ───────────────────────────────────────────────────────

#[test]
fn conversions() {
    let out = run("print(tonumber('42'), tonumber('ff', 16), tonumber('z'), tostring(nil), type({}))");
    assert_eq!(out, vec!["42\t255\tnil\tnil\ttable"]);
}

#[test]
fn math_library() {
    assert_eq!(run("print(math.floor(3.7), math.max(1, 5, 3), math.huge > 1)"), vec!["3\t5\ttrue"]);
}

#[test]
fn table_length() {
    assert_eq!(run("local t = {1, 2, 3} t[4] = 4 print(#t, rawlen(t))"), vec!["4\t4"]);
}

#[test]
fn bad_argument_names_function() {
    let e = runtime_err("string.rep()");
    assert_eq!(e.code, ErrorCode::R005);
    assert!(e.message.starts_with("bad argument #1 to 'string.rep'"), "{}", e.message);
}

// ─── Compile errors ─────────────────────────────────────────────────────────

#[test]
fn syntax_error_is_compile_error() {
    let codes = compile_codes("x = = 1");
    assert!(codes.contains(&ErrorCode::P001), "{codes:?}");
}

#[test]
fn break_outside_loop() {
    assert_eq!(compile_codes("break"), vec![ErrorCode::S001]);
}

#[test]
fn vararg_outside_vararg_function() {
    assert_eq!(compile_codes("local function f() return ... end"), vec![ErrorCode::S002]);
}

// ─── Embedding ──────────────────────────────────────────────────────────────

#[test]
fn globals_persist_between_executions() {
    let mut rt = manager();
    rt.execute("function twice(x) return x * 2 end").unwrap();
    rt.execute("print(twice(21))").unwrap();
    assert_eq!(rt.take_output(), vec!["42"]);
}

#[test]
fn chunk_results_can_be_bound_as_globals() {
    let mut rt = manager();
    rt.execute("return 1, 2").unwrap();
    rt.set_global("b").unwrap();
    rt.set_global("a").unwrap();
    assert_eq!(rt.get_global("a"), Value::Integer(1));
    assert_eq!(rt.get_global("b"), Value::Integer(2));
}

#[test]
fn set_global_with_empty_stack_underflows() {
    let mut rt = manager();
    let e = rt.set_global("x").unwrap_err();
    assert_eq!(e.code, ErrorCode::R009);
}

#[test]
fn closed_context_rejects_execution() {
    let mut rt = manager();
    rt.context_mut().close();
    assert!(rt.execute("print(1)").is_err());
}
