use super::ast::{BinOp, Expr, Function, Prototype};
use super::error::{Error, ErrorKind};
use super::token::Token;
use combine::easy;
use combine::error::ParseError;
use combine::parser::{EasyParser, Parser};
use combine::stream::{position, Stream};
use combine::{between, choice, many, optional, parser, satisfy_map, sep_by, token};
use std::iter::Peekable;

fn ident<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t| match t {
        Token::Ident(id) => Some(id),
        _ => None,
    })
    .expected("identifier")
}

fn kwd<Input>(c: char) -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    token(Token::Kwd(c))
}

fn args<Input>() -> impl Parser<Input, Output = Vec<Expr>>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    sep_by(expr(), kwd(','))
}

/// A bare identifier is a variable; one followed by `(` is a call.
fn identifier_expr<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (ident(), optional(between(kwd('('), kwd(')'), args()))).map(|(id, args)| match args {
        Some(args) => Expr::Call(id, args),
        None => Expr::Variable(id),
    })
}

fn parse_if<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    use super::token::Token::*;

    (
        token(If),
        expr(),
        optional(token(Then)),
        expr(),
        token(Else),
        expr(),
    )
        .map(|(_, c, _, t, _, e)| Expr::If(Box::new(c), Box::new(t), Box::new(e)))
}

fn primary_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    use super::token::Token::*;
    let number = satisfy_map(|t| match t {
        Number(n) => Some(Expr::Number(n)),
        _ => None,
    });

    let boolean = satisfy_map(|t| match t {
        True => Some(Expr::Bool(true)),
        False => Some(Expr::Bool(false)),
        _ => None,
    });

    let paren = between(kwd('('), kwd(')'), expr());

    choice((number, boolean, identifier_expr(), parse_if(), paren)).expected("an expression")
}

parser! {
    fn primary[Input]()(Input) -> Expr
        where [Input: Stream<Token=Token>]
    {
        primary_()
    }
}

fn unary_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let prefix = satisfy_map(|t| match t {
        Token::Kwd(c) if Token::is_prefix_char(c) => Some(c),
        _ => None,
    });

    choice((
        (prefix, unary()).map(|(op, operand)| Expr::Unary(op, Box::new(operand))),
        primary(),
    ))
}

parser! {
    fn unary[Input]()(Input) -> Expr
        where [Input: Stream<Token=Token>]
    {
        unary_()
    }
}

fn bin_op<Input>() -> impl Parser<Input, Output = BinOp>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t| match t {
        Token::Kwd('=') => Some(BinOp::Assign),
        Token::EqEq => Some(BinOp::Eq),
        Token::NotEq => Some(BinOp::Ne),
        Token::Kwd('<') => Some(BinOp::Lt),
        Token::Kwd('>') => Some(BinOp::Gt),
        Token::LessEq => Some(BinOp::Le),
        Token::GreaterEq => Some(BinOp::Ge),
        Token::Kwd('+') => Some(BinOp::Add),
        Token::Kwd('-') => Some(BinOp::Sub),
        Token::Kwd('*') => Some(BinOp::Mul),
        Token::Kwd('/') => Some(BinOp::Div),
        _ => None,
    })
}

/// Precedence climbing over an already-parsed `op operand` sequence.
///
/// Operators below `min_prec` are left for the caller. A following
/// operator that binds tighter than the current one absorbs the pending
/// right operand first; ties combine left to right except for `=`.
fn climb<I>(mut lhs: Expr, min_prec: u8, rest: &mut Peekable<I>) -> Expr
where
    I: Iterator<Item = (BinOp, Expr)>,
{
    while let Some(prec) = rest
        .peek()
        .map(|(op, _)| op.precedence())
        .filter(|prec| *prec >= min_prec)
    {
        let (op, mut rhs) = match rest.next() {
            Some(next) => next,
            None => break,
        };

        while let Some(&(next, _)) = rest.peek() {
            let next_prec = next.precedence();
            if next_prec > prec {
                rhs = climb(rhs, prec + 1, rest);
            } else if next_prec == prec && op.is_right_assoc() {
                rhs = climb(rhs, prec, rest);
            } else {
                break;
            }
        }

        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    lhs
}

fn expr_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (unary(), many((bin_op(), unary()))).map(|(lhs, rest): (Expr, Vec<(BinOp, Expr)>)| {
        climb(lhs, 0, &mut rest.into_iter().peekable())
    })
}

parser! {
    pub fn expr[Input]()(Input) -> Expr
        where [Input: Stream<Token=Token>]
    {
        expr_()
    }
}

fn prototype<Input>() -> impl Parser<Input, Output = Prototype>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let params = sep_by(ident(), kwd(','));

    (
        ident().expected("function name in prototype"),
        between(kwd('('), kwd(')'), params),
    )
        .map(|(id, params)| Prototype(id, params))
}

pub fn definition<Input>() -> impl Parser<Input, Output = Function>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (token(Token::Def), prototype(), expr()).map(|(_, p, e)| Function(p, Box::new(e)))
}

pub fn toplevel<Input>() -> impl Parser<Input, Output = Function>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    expr().map(Function::anonymous)
}

/// A statement that failed to parse.
///
/// `position` is the index, relative to the start of the statement, of the
/// token at which the error was detected.
#[derive(Debug)]
pub struct ParseFailure {
    pub error: Error,
    pub position: usize,
}

/// Deepest nesting of parentheses, conditionals and prefix operators a
/// statement may use.
pub const MAX_NESTING: usize = 64;

// Index of the end of the first statement in `tokens` if that statement
// nests deeper than `MAX_NESTING`.
fn too_deep(tokens: &[Token]) -> Option<usize> {
    let end = tokens
        .iter()
        .position(|t| *t == Token::Kwd(';') || *t == Token::Kwd('\n'))
        .unwrap_or_else(|| tokens.len());

    let mut parens = 0usize;
    let mut conditionals = 0usize;
    let mut prefixes = 0usize;
    for t in &tokens[..end] {
        match t {
            Token::Kwd('(') => parens += 1,
            Token::Kwd(')') => {
                parens = parens.saturating_sub(1);
                prefixes = 0;
            }
            Token::If => conditionals += 1,
            Token::Kwd(c) if Token::is_prefix_char(*c) => prefixes += 1,
            Token::EqEq | Token::NotEq | Token::LessEq | Token::GreaterEq => prefixes += 1,
            _ => prefixes = 0,
        }
        if parens + conditionals + prefixes > MAX_NESTING {
            return Some(end);
        }
    }
    None
}

/// Parses one statement off the front of `tokens`.
///
/// A leading `def` selects a function definition; anything else is a
/// top-level expression wrapped into an anonymous function. On success the
/// number of consumed tokens is returned alongside the function.
///
/// A statement nested deeper than `MAX_NESTING` is rejected before parsing,
/// with `position` set to the statement's end so that recovery skips all of
/// it.
pub fn parse_statement(tokens: &[Token]) -> Result<(Function, usize), ParseFailure> {
    if let Some(end) = too_deep(tokens) {
        return Err(ParseFailure {
            position: end,
            error: Error::from(ErrorKind::Parse(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            ))),
        });
    }

    let input = position::Stream::new(tokens);
    let result = match tokens.first() {
        Some(Token::Def) => definition().easy_parse(input),
        _ => toplevel().easy_parse(input),
    };

    match result {
        Ok((function, rest)) => Ok((function, tokens.len() - rest.input.len())),
        Err(errors) => Err(ParseFailure {
            position: errors.position,
            error: Error::from(ErrorKind::Parse(describe(&errors))),
        }),
    }
}

fn info_text(info: &easy::Info<Token, &[Token]>) -> String {
    match info {
        easy::Info::Token(t) => format!("'{}'", t),
        easy::Info::Range(r) => {
            let parts: Vec<String> = r.iter().map(|t| t.to_string()).collect();
            format!("'{}'", parts.join(" "))
        }
        easy::Info::Owned(s) => s.clone(),
        easy::Info::Static(s) => (*s).to_owned(),
    }
}

fn describe(errors: &easy::Errors<Token, &[Token], usize>) -> String {
    let mut unexpected = None;
    let mut expected: Vec<String> = Vec::new();
    let mut messages = Vec::new();

    for error in &errors.errors {
        match error {
            easy::Error::Unexpected(info) => unexpected = Some(info_text(info)),
            easy::Error::Expected(info) => {
                let text = info_text(info);
                if !expected.contains(&text) {
                    expected.push(text);
                }
            }
            easy::Error::Message(info) => messages.push(info_text(info)),
            easy::Error::Other(err) => messages.push(err.to_string()),
        }
    }

    let mut parts = Vec::new();
    if let Some(unexpected) = unexpected {
        parts.push(format!("unexpected {}", unexpected));
    }
    if !expected.is_empty() {
        parts.push(format!("expected {}", expected.join(" or ")));
    }
    parts.extend(messages);

    if parts.is_empty() {
        "syntax error".to_owned()
    } else {
        parts.join(", ")
    }
}
