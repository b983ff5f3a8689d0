use std::fs;

use evy::{
    bytecode,
    evaluator::{self, BufferRuntime, EvalError, Evaluator, Event, PanicKind},
    parser,
};

fn source(name: &str) -> String {
    let path = format!("{}/tests/testdata/{}.evy", env!("CARGO_MANIFEST_DIR"), name);
    match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => panic!("cannot read {}: {}", path, err),
    }
}

fn eval(source: &str) -> (Evaluator, BufferRuntime, Result<(), EvalError>) {
    let rt = BufferRuntime::new();
    let mut ev = Evaluator::new(Box::new(rt.clone()));
    let result = ev.run(source);
    (ev, rt, result)
}

fn output(name: &str) -> String {
    let (_, rt, result) = eval(&source(name));
    if let Err(err) = result {
        panic!("{}: {}\noutput: {}", name, err, rt.output());
    }
    rt.output()
}

#[test]
fn fizzbuzz() {
    let want = "1\n2\nFizz\n4\nBuzz\nFizz\n7\n8\nFizz\nBuzz\n11\nFizz\n13\n14\nFizzBuzz\n";
    assert_eq!(output("fizzbuzz"), want);
}

#[test]
fn words() {
    let want = "5 the-cat-saw-the-dog\nyve\n{the:2 cat:1 saw:1 dog:1} \"CAT\"\n";
    assert_eq!(output("words"), want);
}

#[test]
fn animate_until_exit() {
    let (mut ev, rt, result) = eval(&source("animate"));
    assert!(result.is_ok());
    assert_eq!(ev.event_handler_names(), ["animate"]);
    let mut exit = None;
    for frame in 0..10 {
        if let Err(err) = ev.handle_event(Event::animate(frame as f64 * 16.0)) {
            exit = err.exit_code();
            break;
        }
    }
    assert_eq!(exit, Some(0));
    assert_eq!(rt.output(), "done\n");
    assert_eq!(ev.global("frames").map(|v| v.to_string()), Some("3".into()));
}

#[test]
fn runtime_panic_stops_the_program() {
    let (_, rt, result) = eval(&source("bounds"));
    let Err(err) = result else {
        panic!("expected out of bounds panic");
    };
    assert_eq!(err.panic_kind(), Some(PanicKind::Bounds));
    assert!(err.to_string().starts_with("line 3 column "), "{}", err);
    assert_eq!(rt.output(), "before\n");
}

#[test]
fn parse_errors_are_collected() {
    let (_, rt, result) = eval(&source("parse_errors"));
    let Err(EvalError::Parse(errors)) = result else {
        panic!("expected parse errors");
    };
    assert!(errors.len() >= 2);
    assert_eq!(errors.0[0].to_string(), "line 2 column 1: redeclaration of \"x\"");
    assert!(errors
        .0
        .iter()
        .any(|e| e.message == "unknown variable name \"y\""));
    assert_eq!(rt.output(), "");
}

#[test]
fn formatting_is_stable() {
    for name in ["fizzbuzz", "words", "animate", "bounds"] {
        let program = match parser::parse(&source(name), &evaluator::builtins()) {
            Ok(program) => program,
            Err(err) => panic!("{}: {}", name, err),
        };
        let once = program.format();
        let again = match parser::parse(&once, &evaluator::builtins()) {
            Ok(program) => program.format(),
            Err(err) => panic!("{} formatted: {}", name, err),
        };
        assert_eq!(once, again, "{}", name);
    }
    let fizzbuzz = source("fizzbuzz");
    let program = parser::parse(&fizzbuzz, &evaluator::builtins()).unwrap();
    assert_eq!(program.format(), fizzbuzz);
}

/// Runs `body` followed by `x = x` on both backends and compares the final
/// value of `x`.
fn assert_backends_agree(body: &str) {
    let source = format!("{}\nx = x\n", body);
    let (ev, rt, result) = eval(&source);
    if let Err(err) = result {
        panic!("evaluator: {}\n{}", err, rt.output());
    }
    let evaluated = ev.global("x").map(|v| v.to_string());
    let vm = match bytecode::run(&source) {
        Ok(vm) => vm,
        Err(err) => panic!("vm: {}", err),
    };
    let executed = vm.last_popped().map(|v| v.to_string());
    assert_eq!(evaluated, executed, "{}", body);
}

#[test]
fn backends_agree() {
    let programs = [
        "x := 1 + 2",
        "x := 7 % 3 * 2 - 1 / 4",
        "x := \"ab\" + \"c\"\nx = x[1:]",
        "x := [1 2] + [3]\nx[0] = x[-1]",
        "m := {a:1 b:2}\nm.c = m.a + m.b\nx := m",
        "x := 0\nfor i := range 10\n    if i % 2 == 0\n        y := i\n        x = x + y\n    end\nend",
        "x := \"\"\nfor s := range [\"a\" \"b\" \"c\"]\n    x = s + x\nend",
        "x := 1\nwhile true\n    x = x * 2\n    if x > 100\n        break\n    end\nend",
        "x := (1 < 2 and \"a\" < \"b\") or false",
    ];
    for body in programs {
        assert_backends_agree(body);
    }
}

#[test]
fn backends_report_the_same_panics() {
    let (_, _, result) = eval("a := [1]\nprint a[1]");
    let evaluated = result.err().and_then(|err| err.panic_kind());
    let executed = match bytecode::run("a := [1]\nx := a[1]\nx = x") {
        Err(bytecode::BytecodeError::Vm(err)) => err.panic_kind(),
        _ => None,
    };
    assert_eq!(evaluated, Some(PanicKind::Bounds));
    assert_eq!(evaluated, executed);
}
