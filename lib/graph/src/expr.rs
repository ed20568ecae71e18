//! Minimal `{{var}}` interpolation and comparison-expression evaluation.
//!
//! This engine deliberately supports nothing beyond variable interpolation
//! and a single `==`/`!=` comparison against a string literal (§ Open
//! Questions — edge-expression grammar). Anything else is rejected at
//! graph-validation time rather than failing silently during traversal.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Replaces every `{{name}}` occurrence in `template` with the
/// string-rendered value of `name` looked up in `vars`. Unknown variables
/// are replaced with an empty string.
#[must_use]
pub fn interpolate(template: &str, vars: &HashMap<String, JsonValue>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = after[..end].trim();
        out.push_str(&render(vars.get(name)));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn render(value: Option<&JsonValue>) -> String {
    match value {
        None => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

enum Op {
    Eq,
    NotEq,
}

struct ParsedExpression {
    var: String,
    op: Op,
    literal: String,
}

fn parse(expression: &str) -> Option<ParsedExpression> {
    let expr = expression.trim();
    let var_start = expr.strip_prefix("{{")?;
    let brace_end = var_start.find("}}")?;
    let var = var_start[..brace_end].trim().to_string();
    if var.is_empty() {
        return None;
    }
    let after_var = var_start[brace_end + 2..].trim();

    let (op, rest) = if let Some(r) = after_var.strip_prefix("==") {
        (Op::Eq, r)
    } else if let Some(r) = after_var.strip_prefix("!=") {
        (Op::NotEq, r)
    } else {
        return None;
    };

    let literal_part = rest.trim();
    let literal = literal_part.strip_prefix('"')?.strip_suffix('"')?;

    Some(ParsedExpression { var, op, literal: literal.to_string() })
}

/// Whether `expression` matches the supported `{{var}} == "literal"` /
/// `{{var}} != "literal"` grammar.
#[must_use]
pub fn is_well_formed(expression: &str) -> bool {
    parse(expression).is_some()
}

/// Evaluates a validated expression against `vars`. Returns `None` if the
/// expression doesn't parse; callers that already validated the graph
/// should never see `None` in practice.
#[must_use]
pub fn evaluate(expression: &str, vars: &HashMap<String, JsonValue>) -> Option<bool> {
    let parsed = parse(expression)?;
    let actual = render(vars.get(&parsed.var));
    Some(match parsed.op {
        Op::Eq => actual == parsed.literal,
        Op::NotEq => actual != parsed.literal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
            .collect()
    }

    #[test]
    fn interpolates_known_variable() {
        let out = interpolate("hello {{name}}!", &vars(&[("name", "world")]));
        assert_eq!(out, "hello world!");
    }

    #[test]
    fn interpolates_unknown_variable_as_empty() {
        let out = interpolate("{{missing}}", &HashMap::new());
        assert_eq!(out, "");
    }

    #[test]
    fn interpolates_multiple_occurrences() {
        let out = interpolate("{{a}}-{{b}}", &vars(&[("a", "1"), ("b", "2")]));
        assert_eq!(out, "1-2");
    }

    #[test]
    fn well_formed_eq_expression() {
        assert!(is_well_formed(r#"{{status}} == "ok""#));
    }

    #[test]
    fn well_formed_neq_expression() {
        assert!(is_well_formed(r#"{{status}} != "failed""#));
    }

    #[test]
    fn malformed_expression_rejected() {
        assert!(!is_well_formed("status == ok"));
        assert!(!is_well_formed("{{status}} > 5"));
        assert!(!is_well_formed("just text"));
    }

    #[test]
    fn evaluates_eq_true() {
        let result = evaluate(r#"{{flag}} == "yes""#, &vars(&[("flag", "yes")]));
        assert_eq!(result, Some(true));
    }

    #[test]
    fn evaluates_eq_false() {
        let result = evaluate(r#"{{flag}} == "yes""#, &vars(&[("flag", "no")]));
        assert_eq!(result, Some(false));
    }

    #[test]
    fn evaluates_neq() {
        let result = evaluate(r#"{{flag}} != "yes""#, &vars(&[("flag", "no")]));
        assert_eq!(result, Some(true));
    }
}
