//! The instruction-building surface the lowering pass drives.
//!
//! `codegen` only ever talks to a backend through these traits. The crate
//! ships the in-memory `ir` backend; the `llvm` feature adds one on top of
//! llvm-sys.

use super::error::Error;
use std::fmt;

/// The two kinds of runtime value the language knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueKind::Number => write!(f, "double"),
            ValueKind::Bool => write!(f, "bool"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Floating-point comparisons. `Ult`/`Ule` are unordered: true when either
/// side is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    One,
    Ult,
    Ule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolPredicate {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    Number(f64),
    Bool(bool),
}

impl RuntimeValue {
    pub fn kind(self) -> ValueKind {
        match self {
            RuntimeValue::Number(_) => ValueKind::Number,
            RuntimeValue::Bool(_) => ValueKind::Bool,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeValue::Number(n) => write!(f, "{}", n),
            RuntimeValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

pub trait Backend {
    type Value: Copy;
    type Block: Copy;
    type Slot: Copy;
    type Function: Copy;

    fn const_number(&mut self, value: f64) -> Self::Value;
    fn const_bool(&mut self, value: bool) -> Self::Value;

    fn build_arith(&mut self, op: ArithOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn build_fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Self::Value;
    fn build_bcmp(
        &mut self,
        pred: BoolPredicate,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Self::Value;
    fn build_not(&mut self, operand: Self::Value) -> Self::Value;

    /// Allocates a number slot in the entry block of `function`.
    fn build_slot(&mut self, function: Self::Function, name: &str) -> Self::Slot;
    fn build_load(&mut self, slot: Self::Slot, name: &str) -> Self::Value;
    fn build_store(&mut self, slot: Self::Slot, value: Self::Value);

    fn append_block(&mut self, function: Self::Function, name: &str) -> Self::Block;
    fn position_at_end(&mut self, block: Self::Block);
    fn insert_block(&self) -> Self::Block;
    fn build_br(&mut self, target: Self::Block);
    fn build_cond_br(&mut self, cond: Self::Value, then: Self::Block, els: Self::Block);
    fn build_phi(
        &mut self,
        kind: ValueKind,
        incoming: &[(Self::Value, Self::Block)],
    ) -> Self::Value;
    fn build_ret(&mut self, value: Self::Value);
    fn build_call(&mut self, callee: Self::Function, args: &[Self::Value]) -> Self::Value;

    /// Adds a body-less function with number parameters to the module.
    fn declare_function(
        &mut self,
        name: &str,
        params: &[String],
        ret: ValueKind,
    ) -> Self::Function;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn param(&mut self, function: Self::Function, index: usize) -> Self::Value;
    fn param_count(&self, function: Self::Function) -> usize;
    fn return_kind(&self, function: Self::Function) -> ValueKind;
    fn delete_function(&mut self, function: Self::Function);

    /// Hands the name of `old` to `new`, points every call of `old` at `new`
    /// and removes `old`. Both must have the same signature.
    fn replace_function(&mut self, old: Self::Function, new: Self::Function);

    /// True when some function other than `function` itself calls it.
    fn has_callers(&self, function: Self::Function) -> bool;

    /// Called once a body is complete; verifies it.
    fn finish_function(&mut self, function: Self::Function) -> Result<(), Error>;

    /// Renders a function for diagnostics.
    fn dump_function(&self, function: Self::Function) -> String;
}

/// Runs lowered code.
pub trait Execute: Backend {
    fn run(&mut self, function: Self::Function) -> Result<RuntimeValue, Error>;
}
