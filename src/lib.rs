//! Lexer, parser, formatter and two execution backends for the Evy
//! programming language: a tree-walking evaluator and a bytecode VM.

pub mod ast;
pub mod bytecode;
pub mod cli;
pub mod common;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod types;
