//! Query AST node types
//!
//! The shapes mirror the collaborator contract of the external query
//! parser: every node carries an inversion flag, `And`/`Or` nodes hold
//! child expressions, and `Filter` nodes pair a column with an operation
//! and a literal operand. String literals keep their raw escaped text;
//! consumers decide when to unescape.

/// Comparison operation of a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperation {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Exists,
    NExists,
}

/// Literal type a column can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    VarString,
    Int,
    Float,
    Bool,
}

/// Column reference with the literal types it can match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    types: Vec<LiteralKind>,
}

impl ColumnDescriptor {
    /// A column constrained to the given literal types.
    pub fn new(name: impl Into<String>, types: Vec<LiteralKind>) -> Self {
        Self {
            name: name.into(),
            types,
        }
    }

    /// True when the column can hold values of `kind`.
    pub fn matches_type(&self, kind: LiteralKind) -> bool {
        self.types.contains(&kind)
    }
}

/// Literal operand of a filter node.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Raw string text with escapes preserved
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    /// Interprets the literal as a variable string, if the operation allows.
    ///
    /// Integer literals render as their decimal text so that equality
    /// filters on numeric-looking values can still probe string filters.
    pub fn as_var_string(&self, _operation: FilterOperation) -> Option<String> {
        match self {
            Self::String(text) => Some(text.clone()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }

    /// Interprets the literal as an integer, if the operation allows.
    pub fn as_int(&self, _operation: FilterOperation) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::String(text) => text.parse().ok(),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }
}

/// A query expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Conjunction of child expressions
    And { inverted: bool, children: Vec<Expr> },
    /// Disjunction of child expressions
    Or { inverted: bool, children: Vec<Expr> },
    /// A single column comparison
    Filter {
        inverted: bool,
        column: ColumnDescriptor,
        operation: FilterOperation,
        operand: Literal,
    },
    /// Degenerate expression matching nothing (e.g. an empty query)
    Empty,
}

impl Expr {
    /// Whether this node negates its subtree.
    pub fn is_inverted(&self) -> bool {
        match self {
            Self::And { inverted, .. } | Self::Or { inverted, .. } => *inverted,
            Self::Filter { inverted, .. } => *inverted,
            Self::Empty => false,
        }
    }

    /// Flips this node's inversion flag.
    pub fn invert(&mut self) {
        match self {
            Self::And { inverted, .. } | Self::Or { inverted, .. } => *inverted = !*inverted,
            Self::Filter { inverted, .. } => *inverted = !*inverted,
            Self::Empty => {}
        }
    }

    /// Convenience constructor for an equality filter on a string column.
    pub fn string_eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Filter {
            inverted: false,
            column: ColumnDescriptor::new(column, vec![LiteralKind::VarString]),
            operation: FilterOperation::Eq,
            operand: Literal::String(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inversion_flag() {
        let mut expr = Expr::string_eq("level", "error");
        assert!(!expr.is_inverted());
        expr.invert();
        assert!(expr.is_inverted());
        expr.invert();
        assert!(!expr.is_inverted());
    }

    #[test]
    fn test_literal_coercions() {
        let text = Literal::String("42".to_string());
        assert_eq!(text.as_var_string(FilterOperation::Eq), Some("42".to_string()));
        assert_eq!(text.as_int(FilterOperation::Eq), Some(42));

        let number = Literal::Int(7);
        assert_eq!(number.as_var_string(FilterOperation::Eq), Some("7".to_string()));
        assert_eq!(number.as_int(FilterOperation::Eq), Some(7));

        let truth = Literal::Bool(true);
        assert_eq!(truth.as_var_string(FilterOperation::Eq), None);
    }

    #[test]
    fn test_column_type_matching() {
        let column = ColumnDescriptor::new("status", vec![LiteralKind::Int]);
        assert!(column.matches_type(LiteralKind::Int));
        assert!(!column.matches_type(LiteralKind::VarString));
    }
}
