//! Query-term extraction
//!
//! Distills a parsed query AST into the conjunctive set of literal terms a
//! membership filter can test. The committed contract: when extraction
//! reports `supported`, any record satisfying the query must make every
//! extracted term pass `possibly_contains` on the filter attached to that
//! record's partition — so a single failing term refutes the whole
//! partition.
//!
//! Only conjunctions of non-inverted equalities qualify. Disjunctions and
//! inversions break the "every term must be present" implication and mark
//! the query unsupported; non-equality comparisons and wildcard-bearing
//! literals are merely skipped, since they neither produce a testable term
//! nor invalidate the others.

use rustc_hash::FxHashSet;

use crate::query::ast::{Expr, FilterOperation, LiteralKind};

/// Reason tag for queries with an inverted subtree.
pub const REASON_INVERTED: &str = "inverted-expression";

/// Reason tag for queries containing a disjunction.
pub const REASON_OR: &str = "or-expression";

/// Reason tag for unrecognized node kinds.
pub const REASON_UNSUPPORTED: &str = "unsupported-expression";

/// Outcome of term extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermExtraction {
    /// Whether the filters can act on this query at all
    pub supported: bool,
    /// Why not, when `supported` is false
    pub reason: Option<String>,
    /// Extracted terms in AST order, unescaped
    pub terms: Vec<String>,
}

impl TermExtraction {
    fn unsupported(reason: &str) -> Self {
        Self {
            supported: false,
            reason: Some(reason.to_string()),
            terms: Vec::new(),
        }
    }
}

/// Extracts the conjunctive equality terms of `expr`, or declares the query
/// unsupported.
pub fn extract_conjunctive_terms(expr: &Expr) -> TermExtraction {
    let mut result = TermExtraction {
        supported: true,
        reason: None,
        terms: Vec::new(),
    };
    collect_terms(expr, false, &mut result);
    if !result.supported {
        result.terms.clear();
    }
    result
}

fn collect_terms(expr: &Expr, inverted_context: bool, result: &mut TermExtraction) {
    if !result.supported {
        return;
    }

    let inverted = inverted_context ^ expr.is_inverted();
    if inverted {
        *result = TermExtraction::unsupported(REASON_INVERTED);
        return;
    }

    match expr {
        Expr::Or { .. } => {
            *result = TermExtraction::unsupported(REASON_OR);
        }
        Expr::And { children, .. } => {
            for child in children {
                collect_terms(child, inverted, result);
                if !result.supported {
                    return;
                }
            }
        }
        Expr::Filter {
            operation, operand, ..
        } => {
            if *operation != FilterOperation::Eq {
                // Not contributory; the remaining terms still bind.
                return;
            }
            let Some(value) = operand.as_var_string(*operation) else {
                return;
            };
            if has_unescaped_wildcards(&value) {
                // The filter cannot confirm wildcards; fall through.
                return;
            }
            result.terms.push(unescape(&value));
        }
        Expr::Empty => {
            *result = TermExtraction::unsupported(REASON_UNSUPPORTED);
        }
    }
}

/// Collects every non-wildcard variable-string literal reachable in `expr`.
///
/// Companion traversal for the pre-dictionary check: it never declares a
/// query unsupported (conservative admission is already the fallback
/// there), skips existence probes, and deduplicates into a set.
pub fn collect_var_search_strings(expr: &Expr, out: &mut FxHashSet<String>) {
    match expr {
        Expr::And { children, .. } | Expr::Or { children, .. } => {
            for child in children {
                collect_var_search_strings(child, out);
            }
        }
        Expr::Filter {
            column,
            operation,
            operand,
            ..
        } => {
            if matches!(
                operation,
                FilterOperation::Exists | FilterOperation::NExists
            ) {
                return;
            }
            if !column.matches_type(LiteralKind::VarString) {
                return;
            }
            let Some(value) = operand.as_var_string(*operation) else {
                return;
            };
            if !has_unescaped_wildcards(&value) {
                out.insert(unescape(&value));
            }
        }
        Expr::Empty => {}
    }
}

/// True when `value` contains a `*` not preceded by a backslash escape.
pub fn has_unescaped_wildcards(value: &str) -> bool {
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '*' {
            return true;
        }
    }
    false
}

/// Removes one level of backslash escaping: `\*` becomes `*`, `\\` becomes
/// `\`, and a backslash before any other character is dropped.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn extract(query: &str) -> TermExtraction {
        extract_conjunctive_terms(&parse_query(query).unwrap())
    }

    #[test]
    fn test_single_equality() {
        let result = extract(r#"field == "needle""#);
        assert!(result.supported);
        assert_eq!(result.terms, vec!["needle"]);
    }

    #[test]
    fn test_conjunction_extracts_in_order() {
        let result = extract(r#"a == "first" AND b == "second" AND c == "third""#);
        assert!(result.supported);
        assert_eq!(result.terms, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_or_anywhere_is_unsupported() {
        for query in [
            r#"a == "x" OR b == "y""#,
            r#"a == "x" AND (b == "y" OR c == "z")"#,
        ] {
            let result = extract(query);
            assert!(!result.supported, "query should be unsupported: {query}");
            assert_eq!(result.reason.as_deref(), Some(REASON_OR));
            assert!(result.terms.is_empty());
        }
    }

    #[test]
    fn test_inversion_is_unsupported() {
        let result = extract(r#"NOT a == "x""#);
        assert!(!result.supported);
        assert_eq!(result.reason.as_deref(), Some(REASON_INVERTED));

        // Double negation cancels out.
        let result = extract(r#"NOT NOT a == "x""#);
        assert!(result.supported);
        assert_eq!(result.terms, vec!["x"]);
    }

    #[test]
    fn test_empty_query_unsupported() {
        let result = extract("");
        assert!(!result.supported);
        assert_eq!(result.reason.as_deref(), Some(REASON_UNSUPPORTED));
    }

    #[test]
    fn test_non_equality_skipped() {
        let result = extract(r#"a == "keep" AND b != "drop" AND c > 5"#);
        assert!(result.supported);
        assert_eq!(result.terms, vec!["keep"]);
    }

    #[test]
    fn test_wildcards_skipped_but_escapes_extracted() {
        let result = extract(r#"a == "wild*card" AND b == "lit\*eral""#);
        assert!(result.supported);
        assert_eq!(result.terms, vec!["lit*eral"]);
    }

    #[test]
    fn test_integer_equality_extracts_decimal_text() {
        let result = extract("status == 500");
        assert!(result.supported);
        assert_eq!(result.terms, vec!["500"]);
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(has_unescaped_wildcards("a*b"));
        assert!(has_unescaped_wildcards("*"));
        assert!(!has_unescaped_wildcards(r"a\*b"));
        assert!(has_unescaped_wildcards(r"a\\*b"));
        assert!(!has_unescaped_wildcards("plain"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\*b"), "a*b");
        assert_eq!(unescape(r"a\\b"), r"a\b");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn test_var_search_strings_ignore_structure() {
        let expr = parse_query(
            r#"a == "x" OR (NOT b == "y" AND c == "wild*" AND d == "x")"#,
        )
        .unwrap();
        let mut strings = FxHashSet::default();
        collect_var_search_strings(&expr, &mut strings);
        // Dedupe across branches; wildcards excluded; Or/NOT structure ignored.
        assert_eq!(strings.len(), 2);
        assert!(strings.contains("x"));
        assert!(strings.contains("y"));
    }
}
