//! Marl typed syntax tree
//!
//! This crate defines the AST that a parser hands to the evaluation engine.
//! The engine has no dependency on any concrete grammar; hosts bring their
//! own front end and produce these types, either directly or through the
//! [`builder`] helpers.

pub mod ast;
pub mod builder;

pub use ast::*;
