pub mod ast;
pub mod backend;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod ir;
pub mod lexer;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod parser;
pub mod token;
pub mod toplevel;
