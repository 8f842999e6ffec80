use std::fmt;

/// Name given to the function wrapping a top-level expression.
pub const ANON_FN_NAME: &str = "__anon_expr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Assign => 1,
            BinOp::Eq | BinOp::Ne => 2,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        self == BinOp::Assign
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Variable(String),
    Unary(char, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype(pub String, pub Vec<String>);

impl Prototype {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn params(&self) -> &[String] {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function(pub Prototype, pub Box<Expr>);

impl Function {
    pub fn anonymous(body: Expr) -> Function {
        Function(
            Prototype(ANON_FN_NAME.to_owned(), vec![]),
            Box::new(body),
        )
    }

    pub fn prototype(&self) -> &Prototype {
        &self.0
    }

    pub fn body(&self) -> &Expr {
        &self.1
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.name() == ANON_FN_NAME
    }
}

// The printed form re-parses to the same tree: binary nodes and
// conditionals are parenthesized and nested prefix operators are split so
// the lexer cannot fuse them into a two-character operator.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Unary(op, operand) => match **operand {
                Expr::Unary(..) => write!(f, "{}({})", op, operand),
                _ => write!(f, "{}{}", op, operand),
            },
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.as_str(), rhs),
            Expr::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::If(cond, then, els) => write!(f, "(if {} then {} else {})", cond, then, els),
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.0, self.1.join(", "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "{}", self.1)
        } else {
            write!(f, "def {} {}", self.0, self.1)
        }
    }
}
