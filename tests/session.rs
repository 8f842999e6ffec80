use exprc::ast::Expr;
use exprc::backend::{Backend, RuntimeValue};
use exprc::error::ErrorKind;
use exprc::ir::Builder;
use exprc::lexer::tokenize;
use exprc::parser::parse_statement;
use exprc::toplevel::{Options, Outcome, Session};

fn session() -> Session<Builder> {
    Session::new(Builder::new(), Options::default())
}

fn evaluated(session: &mut Session<Builder>, src: &str) -> RuntimeValue {
    let mut results = session.run_source(src);
    match results.pop() {
        Some(Ok(Outcome::Evaluated(value))) => value,
        other => panic!("'{}' did not evaluate: {:?}", src, other),
    }
}

fn parse_expr(src: &str) -> Expr {
    let tokens = tokenize(src).unwrap();
    let (function, consumed) = parse_statement(&tokens).unwrap();
    assert_eq!(consumed, tokens.len(), "{}", src);
    *function.1
}

#[test]
fn increment() {
    let mut session = session();
    let results = session.run_source("def foo(x) x + 1");
    assert_eq!(results[0].as_ref().unwrap(), &Outcome::Defined("foo".to_owned()));
    assert_eq!(evaluated(&mut session, "foo(41)"), RuntimeValue::Number(42.0));
}

#[test]
fn minimum() {
    let mut session = session();
    session.run_source("def bar(a,b) if a < b then a else b");
    assert_eq!(evaluated(&mut session, "bar(3,5)"), RuntimeValue::Number(3.0));
    assert_eq!(evaluated(&mut session, "bar(8,5)"), RuntimeValue::Number(5.0));
}

#[test]
fn equality_yields_bool() {
    let mut session = session();
    assert_eq!(evaluated(&mut session, "1 == 1"), RuntimeValue::Bool(true));
    assert_eq!(evaluated(&mut session, "1 == 2"), RuntimeValue::Bool(false));
}

#[test]
fn unknown_variable_is_recoverable() {
    let mut session = session();
    let results = session.run_source("x = 5\n2 * 3");
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0].as_ref().unwrap_err().kind(),
        &ErrorKind::UnknownVariable("x".to_owned())
    );
    assert_eq!(
        results[1].as_ref().unwrap(),
        &Outcome::Evaluated(RuntimeValue::Number(6.0))
    );
    assert_eq!(session.codegen().backend().module().functions().count(), 0);
}

#[test]
fn bool_return_is_inferred() {
    let mut session = session();
    session.run_source("def f() true");
    assert_eq!(evaluated(&mut session, "f()"), RuntimeValue::Bool(true));
    assert_eq!(evaluated(&mut session, "!f()"), RuntimeValue::Bool(false));
}

#[test]
fn statements_split_on_semicolons_and_newlines() {
    let mut session = session();
    let results = session.run_source("def a() 1; def b() 2\na() + b(); ;\n# nothing here\n");
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[2].as_ref().unwrap(),
        &Outcome::Evaluated(RuntimeValue::Number(3.0))
    );
}

#[test]
fn parse_errors_resume_at_next_token() {
    let mut session = session();
    let results = session.run_source("def (x) x; 4\ndef ok() 1");
    let failures = results.iter().filter(|r| r.is_err()).count();
    assert!(failures >= 1);
    assert_eq!(
        results.last().unwrap().as_ref().unwrap(),
        &Outcome::Defined("ok".to_owned())
    );
    assert!(results.iter().any(|r| match r {
        Ok(Outcome::Evaluated(RuntimeValue::Number(n))) => *n == 4.0,
        _ => false,
    }));
}

#[test]
fn failed_definition_is_not_callable() {
    let mut session = session();
    let results = session.run_source("def g(x) y + x");
    assert!(results[0].is_err());
    assert!(session.codegen().backend().get_function("g").is_none());

    let results = session.run_source("g(1)");
    match results[0].as_ref().unwrap_err().kind() {
        ErrorKind::UnknownFunction(_) | ErrorKind::Execution(_) => {}
        kind => panic!("unexpected error kind: {:?}", kind),
    }
}

#[test]
fn arity_mismatch() {
    let mut session = session();
    session.run_source("def two(a, b) a * b");
    let results = session.run_source("two(1)");
    assert_eq!(
        results[0].as_ref().unwrap_err().kind(),
        &ErrorKind::ArityMismatch {
            name: "two".to_owned(),
            expected: 2,
            found: 1
        }
    );
    assert_eq!(evaluated(&mut session, "two(3, 4)"), RuntimeValue::Number(12.0));
}

#[test]
fn parameters_are_mutable() {
    let mut session = session();
    session.run_source("def bump(x) (x = x + 1) * 0 + x");
    assert_eq!(evaluated(&mut session, "bump(9)"), RuntimeValue::Number(10.0));
}

#[test]
fn later_definition_wins() {
    let mut session = session();
    session.run_source("def k() 1\ndef use() k() + 10\ndef k() 2");
    assert_eq!(evaluated(&mut session, "use()"), RuntimeValue::Number(12.0));
}

#[test]
fn recursion() {
    let mut session = session();
    session.run_source("def fact(n) if n <= 1 then 1 else n * fact(n - 1)");
    assert_eq!(evaluated(&mut session, "fact(5)"), RuntimeValue::Number(120.0));
}

#[test]
fn precedence() {
    assert_eq!(parse_expr("a + b * c").to_string(), "(a + (b * c))");
    assert_eq!(parse_expr("a - b - c").to_string(), "((a - b) - c)");
    assert_eq!(
        parse_expr("a = b < c + 1 == d").to_string(),
        "(a = ((b < (c + 1)) == d))"
    );
}

#[test]
fn pretty_print_round_trip() {
    let sources = [
        "1 + 2 * 3 - 4 / 5",
        "a = b = c",
        "-(-x) + !y",
        "if a < b then f(a, b + 1) else g()",
        "if x a else -b",
        "(a >= b) != (c <= d)",
        "f(g(h(1)), true, false)",
        "-f(x) * (if p then 1 else 2)",
    ];
    for src in sources.iter() {
        let first = parse_expr(src);
        let second = parse_expr(&first.to_string());
        assert_eq!(first, second, "{}", src);
    }
}

#[test]
fn identical_definitions_agree() {
    let src = "def h(a, b) if a > b then a * 2 else b - a";
    let mut first = session();
    let mut second = session();
    first.run_source(src);
    second.run_source(src);
    for call in ["h(4, 1)", "h(1, 4)", "h(3, 3)"].iter() {
        assert_eq!(evaluated(&mut first, call), evaluated(&mut second, call));
    }
}

#[test]
fn failed_redefinition_keeps_previous() {
    let mut session = session();
    let results = session.run_source("def k() 1\ndef k() zzz\nk()");
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[1].as_ref().unwrap_err().kind(),
        &ErrorKind::UnknownVariable("zzz".to_owned())
    );
    assert_eq!(
        results[2].as_ref().unwrap(),
        &Outcome::Evaluated(RuntimeValue::Number(1.0))
    );
}

#[test]
fn called_function_keeps_its_return_kind() {
    let mut session = session();
    let results = session.run_source("def k() 1\ndef g() k() + 1\ndef k() true\ng()");
    match results[2].as_ref().unwrap_err().kind() {
        ErrorKind::TypeMismatch(_) => {}
        kind => panic!("unexpected error kind: {:?}", kind),
    }
    assert_eq!(
        results[3].as_ref().unwrap(),
        &Outcome::Evaluated(RuntimeValue::Number(2.0))
    );
}

#[test]
fn deep_nesting_is_an_error() {
    let mut session = session();
    let src = format!("{}1{}\n2", "(".repeat(200), ")".repeat(200));
    let results = session.run_source(&src);
    assert_eq!(results.len(), 2);
    match results[0].as_ref().unwrap_err().kind() {
        ErrorKind::Parse(_) => {}
        kind => panic!("unexpected error kind: {:?}", kind),
    }
    assert_eq!(
        results[1].as_ref().unwrap(),
        &Outcome::Evaluated(RuntimeValue::Number(2.0))
    );
}
