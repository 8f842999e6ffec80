use failure::{Backtrace, Context, Fail};
use std::fmt;
use std::io;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    Lex(String),
    #[fail(display = "{}", _0)]
    Parse(String),
    #[fail(display = "unknown variable '{}'", _0)]
    UnknownVariable(String),
    #[fail(display = "unknown function '{}'", _0)]
    UnknownFunction(String),
    #[fail(
        display = "wrong number of arguments to '{}', expected {} but got {}",
        name, expected, found
    )]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[fail(display = "left operand of '=' must be a variable")]
    InvalidAssignment,
    #[fail(display = "unsupported operator '{}'", _0)]
    UnsupportedOperator(String),
    #[fail(display = "{}", _0)]
    TypeMismatch(String),
    #[fail(display = "codegen: {}", _0)]
    Codegen(String),
    #[fail(display = "execution: {}", _0)]
    Execution(String),
    #[fail(display = "i/o: {}", _0)]
    Io(String),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::from(ErrorKind::Io(e.to_string()))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::from(ErrorKind::UnknownVariable("x".to_owned()));
        assert_eq!(e.to_string(), "unknown variable 'x'");

        let e = Error::from(ErrorKind::ArityMismatch {
            name: "foo".to_owned(),
            expected: 1,
            found: 2,
        });
        assert_eq!(
            e.to_string(),
            "wrong number of arguments to 'foo', expected 1 but got 2"
        );
    }

    #[test]
    fn test_kind() {
        let e = Error::from(ErrorKind::InvalidAssignment);
        assert_eq!(e.kind(), &ErrorKind::InvalidAssignment);
    }
}
