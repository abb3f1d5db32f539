//! Query front-end: AST types and a minimal conjunctive parser
//!
//! The pruning pipeline consumes a parsed query AST; the full query language
//! belongs to an external parser. [`ast`] defines the node shapes that
//! contract guarantees (inversion flags, And/Or/Filter variants, literal
//! accessors), and [`parser`] is a small stand-in front-end that produces
//! them from textual queries so the CLI and the pipeline are testable
//! end-to-end.

pub mod ast;
pub mod parser;

pub use ast::{ColumnDescriptor, Expr, FilterOperation, Literal, LiteralKind};
pub use parser::parse_query;
