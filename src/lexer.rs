use super::error::{Error, ErrorKind};
use super::token::Token;
use combine::error::{ParseError, StreamError};
use combine::parser::char::{alpha_num, digit, letter, string};
use combine::parser::{EasyParser, Parser};
use combine::stream::position::{self, SourcePosition};
use combine::stream::{Stream, StreamErrorFor};
use combine::{any, attempt, choice, eof, many, many1, parser, satisfy, skip_many, token};

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(choice((digit(), token('.'))))
        .and_then(|ns: String| {
            ns.parse::<f64>()
                .map_err(|e| StreamErrorFor::<Input>::other(e))
        })
        .map(Token::Number)
}

fn keyword(id: String) -> Token {
    match id.as_ref() {
        "def" => Token::Def,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Ident(id),
    }
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (letter(), many(alpha_num())).map(|(first, rest): (char, String)| {
        let mut id = String::with_capacity(rest.len() + 1);
        id.push(first);
        id.push_str(&rest);
        keyword(id)
    })
}

fn operator<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    choice((
        attempt(string("==")).map(|_| Token::EqEq),
        attempt(string("!=")).map(|_| Token::NotEq),
        attempt(string("<=")).map(|_| Token::LessEq),
        attempt(string(">=")).map(|_| Token::GreaterEq),
    ))
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    // The terminating newline is left for `lex` to report as a separator.
    (token('#'), skip_many(satisfy(|c: char| c != '\n'))).map(|_| ())
}

fn blank<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(satisfy(|c: char| c.is_whitespace() && c != '\n'))
}

fn lex_<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    blank().with(choice((
        number(),
        ident(),
        comment().with(lex()),
        operator(),
        eof().map(|_| Token::Eof),
        any().map(Token::Kwd),
    )))
}

parser! {
    pub fn lex[Input]()(Input) -> Token
        where [Input: Stream<Token=char>]
    {
        lex_()
    }
}

/// Pulls tokens one at a time out of a source string.
///
/// Once the input is exhausted every further call yields `Token::Eof`.
pub struct Lexer<'a> {
    input: position::Stream<&'a str, SourcePosition>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            input: position::Stream::new(src),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        match lex().easy_parse(self.input.clone()) {
            Ok((token, rest)) => {
                self.input = rest;
                Ok(token)
            }
            Err(errors) => {
                let messages: Vec<String> = errors.errors.iter().map(|e| e.to_string()).collect();
                Err(Error::from(ErrorKind::Lex(format!(
                    "line {}, column {}: {}",
                    errors.position.line,
                    errors.position.column,
                    messages.join(", ").trim_end()
                ))))
            }
        }
    }
}

/// Lexes a whole source string, dropping the trailing `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Eof => break,
            token => tokens.push(token),
        }
    }
    Ok(tokens)
}
