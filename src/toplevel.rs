use super::ast::Function;
use super::backend::{Backend, Execute, RuntimeValue};
use super::codegen::CodeGen;
use super::error::Error;
use super::lexer;
use super::parser;
use super::token::Token;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Print each parsed statement before lowering it.
    pub dump_ast: bool,
    /// Print each lowered function.
    pub dump_ir: bool,
}

/// What a successfully handled statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Defined(String),
    Evaluated(RuntimeValue),
}

/// Drives statements through lowering and execution.
///
/// Notices, results and dumps go to `out`; errors are left to the caller.
pub struct Session<B: Backend + Execute, W: Write = io::Stdout> {
    codegen: CodeGen<B>,
    options: Options,
    out: W,
}

impl<B: Backend + Execute> Session<B> {
    pub fn new(backend: B, options: Options) -> Session<B> {
        Session::with_output(backend, options, io::stdout())
    }
}

impl<B: Backend + Execute, W: Write> Session<B, W> {
    pub fn with_output(backend: B, options: Options, out: W) -> Session<B, W> {
        Session {
            codegen: CodeGen::new(backend),
            options,
            out,
        }
    }

    pub fn codegen(&self) -> &CodeGen<B> {
        &self.codegen
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs every statement of `src`, one result per statement.
    pub fn run_source(&mut self, src: &str) -> Vec<Result<Outcome, Error>> {
        let mut results = Vec::new();
        for line in src.lines() {
            results.extend(self.run_line(line));
        }
        results
    }

    /// Runs the statements of a single line.
    ///
    /// A lexical error abandons the rest of the line. A parse error is
    /// reported and parsing resumes one token past where it was detected.
    pub fn run_line(&mut self, line: &str) -> Vec<Result<Outcome, Error>> {
        let tokens = match lexer::tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => return vec![Err(e)],
        };

        let mut results = Vec::new();
        let mut ts = tokens.as_slice();
        while !ts.is_empty() {
            match ts[0] {
                Token::Kwd(';') | Token::Kwd('\n') => ts = &ts[1..],
                _ => match parser::parse_statement(ts) {
                    Ok((function, consumed)) => {
                        results.push(self.handle(function));
                        ts = &ts[consumed..];
                    }
                    Err(failure) => {
                        results.push(Err(failure.error));
                        let skip = (failure.position + 1).min(ts.len());
                        ts = &ts[skip..];
                    }
                },
            }
        }
        results
    }

    fn handle(&mut self, function: Function) -> Result<Outcome, Error> {
        if self.options.dump_ast {
            writeln!(self.out, "{}", function)?;
        }

        let name = function.prototype().name().to_owned();
        let anonymous = function.is_anonymous();
        let the_function = self.codegen.codegen_func(function)?;
        if anonymous {
            writeln!(self.out, "Parsed a top-level expression.")?;
        } else {
            writeln!(self.out, "Parsed a function definition.")?;
        }
        if self.options.dump_ir {
            write!(self.out, "{}", self.codegen.backend().dump_function(the_function))?;
        }

        if !anonymous {
            return Ok(Outcome::Defined(name));
        }

        let result = self.codegen.backend_mut().run(the_function);
        self.codegen.backend_mut().delete_function(the_function);
        let value = result?;
        writeln!(self.out, "Evaluated to {}", value)?;
        Ok(Outcome::Evaluated(value))
    }

    /// Reads statements from `input` until end of input.
    ///
    /// With `prompt` set, `ready> ` is printed before each line.
    pub fn main_loop<R: BufRead>(&mut self, mut input: R, prompt: bool) -> io::Result<()> {
        let mut line = String::new();
        loop {
            if prompt {
                write!(self.out, "ready> ")?;
                self.out.flush()?;
            }
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            for result in self.run_line(&line) {
                report(&result);
            }
        }
    }
}

/// Sends a failed statement's error to stderr.
pub fn report(result: &Result<Outcome, Error>) {
    if let Err(e) = result {
        eprintln!("error: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::super::error::ErrorKind;
    use super::super::ir::Builder;
    use super::*;

    fn session() -> Session<Builder> {
        Session::new(Builder::new(), Options::default())
    }

    #[test]
    fn test_run_line() {
        let mut session = session();
        let results = session.run_line("def foo(x) x + 1; foo(41)\n");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &Outcome::Defined("foo".to_owned()));
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Outcome::Evaluated(RuntimeValue::Number(42.0))
        );
    }

    #[test]
    fn test_anonymous_is_deleted() {
        let mut session = session();
        session.run_line("1 + 2");
        assert_eq!(session.codegen().backend().get_function("__anon_expr"), None);
        assert_eq!(session.codegen().backend().module().functions().count(), 0);
    }

    #[test]
    fn test_lex_error_discards_line() {
        let mut session = session();
        let results = session.run_line("1.2.3; 4");
        assert_eq!(results.len(), 1);
        match results[0].as_ref().unwrap_err().kind() {
            ErrorKind::Lex(_) => {}
            kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn test_parse_error_recovery() {
        let mut session = session();
        let results = session.run_line(") 7");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Outcome::Evaluated(RuntimeValue::Number(7.0))
        );
    }

    fn captured() -> Session<Builder, Vec<u8>> {
        Session::with_output(Builder::new(), Options::default(), Vec::new())
    }

    fn printed(session: &Session<Builder, Vec<u8>>) -> String {
        String::from_utf8_lossy(session.output()).into_owned()
    }

    #[test]
    fn test_notices_follow_lowering() {
        let mut session = captured();
        session.run_line("def f(x) x * 2; def g() nope; f(4); y");
        assert_eq!(
            printed(&session),
            "Parsed a function definition.\n\
             Parsed a top-level expression.\n\
             Evaluated to 8\n"
        );
    }

    #[test]
    fn test_dumps() {
        let options = Options {
            dump_ast: true,
            dump_ir: true,
        };
        let mut session = Session::with_output(Builder::new(), options, Vec::new());
        session.run_line("def id(x) x");
        let out = printed(&session);
        assert!(out.starts_with("def id(x) x\nParsed a function definition.\n"));
        assert!(out.contains("define double @id(double %x) {"));
    }

    #[test]
    fn test_prompt() {
        let mut session = captured();
        session.main_loop(b"1\n" as &[u8], true).unwrap();
        assert_eq!(
            printed(&session),
            "ready> Parsed a top-level expression.\nEvaluated to 1\nready> "
        );
    }

    #[test]
    fn test_main_loop() {
        let mut session = session();
        let input = b"def k() 3\nk() * 2\n" as &[u8];
        session.main_loop(input, false).unwrap();
        assert!(session.codegen().backend().get_function("k").is_some());
    }
}
