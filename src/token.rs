use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Def,
    If,
    Then,
    Else,
    True,
    False,
    Ident(String),
    Number(f64),
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    Kwd(char),
    Eof,
}

impl Token {
    /// Single characters that may start a prefix operation. Grouping,
    /// argument and statement punctuation never do.
    pub fn is_prefix_char(c: char) -> bool {
        match c {
            '(' | ')' | ',' | ';' | '\n' => false,
            _ => true,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::If => write!(f, "if"),
            Token::Then => write!(f, "then"),
            Token::Else => write!(f, "else"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Ident(id) => write!(f, "{}", id),
            Token::Number(n) => write!(f, "{}", n),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::LessEq => write!(f, "<="),
            Token::GreaterEq => write!(f, ">="),
            Token::Kwd('\n') => write!(f, "newline"),
            Token::Kwd(c) => write!(f, "{}", c),
            Token::Eof => write!(f, "end of input"),
        }
    }
}
