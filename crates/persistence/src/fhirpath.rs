//! FHIRPath collaborator.
//!
//! The catalog's expressions are FHIRPath, consumed here behind a single
//! contract: given a JSON document and a path expression, return zero or more
//! JSON values. The bundled evaluator covers what the catalog actually uses:
//! dotted paths with array flattening, a leading resource-type segment, and
//! top-level `|` unions. Two `.where(...)` shapes get special structural
//! treatment by the extractor and include engine (`where(url='…')` on
//! extensions and `where(resolve() is T)` on polymorphic references) and
//! are parsed by the helpers below. Anything else simply does not index.

use serde_json::Value;

/// Evaluates a path expression against a document.
///
/// Returns an empty vector for paths the evaluator does not support.
pub fn evaluate(resource: &Value, expression: &str) -> Vec<Value> {
    expression
        .split('|')
        .flat_map(|part| evaluate_single(resource, part.trim()))
        .collect()
}

fn evaluate_single(resource: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut segments = path.split('.').map(str::trim).peekable();

    // A leading capitalized segment names the resource type.
    if let Some(first) = segments.peek() {
        if first.chars().next().is_some_and(|c| c.is_uppercase()) {
            let declared = resource.get("resourceType").and_then(Value::as_str);
            if declared.is_some_and(|rt| rt != *first) {
                return Vec::new();
            }
            segments.next();
        }
    }

    let mut current: Vec<&Value> = vec![resource];
    for segment in segments {
        if segment.is_empty() || segment.contains('(') {
            return Vec::new();
        }
        let mut next = Vec::new();
        for value in current {
            let candidates: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for candidate in candidates {
                if let Some(child) = candidate.get(segment) {
                    match child {
                        Value::Array(items) => next.extend(items.iter()),
                        other => next.push(other),
                    }
                }
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        current = next;
    }

    current.into_iter().cloned().collect()
}

/// The leaf JSON field a path lands on: the last segment before `.where(` or
/// the end of the expression.
pub fn leaf_field(expression: &str) -> String {
    let head = match expression.find(".where(") {
        Some(pos) => &expression[..pos],
        None => expression,
    };
    head.rsplit('.').next().unwrap_or(head).trim().to_string()
}

/// Extracts the URL of a literal `where(url='…')` clause.
pub fn where_url(expression: &str) -> Option<String> {
    let start = expression.find("where(url='")? + "where(url='".len();
    let rest = &expression[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// Extracts the expected target type of a `where(resolve() is T)` clause.
pub fn where_resolve_target(expression: &str) -> Option<String> {
    let start = expression.find("where(resolve() is ")? + "where(resolve() is ".len();
    let rest = &expression[start..];
    let end = rest.find(')')?;
    let target = rest[..end].trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

/// Removes every `.where(...)` clause, balancing nested parentheses.
pub fn strip_where(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(pos) = rest.find(".where(") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + ".where(".len()..];
        let mut depth = 1usize;
        let mut consumed = after.len();
        for (i, c) in after.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        consumed = i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &after[consumed.min(after.len())..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_simple_paths() {
        let patient = json!({
            "resourceType": "Patient",
            "birthDate": "1980-06-15"
        });
        assert_eq!(
            evaluate(&patient, "Patient.birthDate"),
            vec![json!("1980-06-15")]
        );
    }

    #[test]
    fn flattens_arrays_along_the_path() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [
                {"family": "Doe", "given": ["John", "James"]},
                {"family": "Smith"}
            ]
        });
        assert_eq!(
            evaluate(&patient, "Patient.name.family"),
            vec![json!("Doe"), json!("Smith")]
        );
        assert_eq!(
            evaluate(&patient, "Patient.name.given"),
            vec![json!("John"), json!("James")]
        );
    }

    #[test]
    fn resource_type_mismatch_yields_nothing() {
        let patient = json!({"resourceType": "Patient", "status": "x"});
        assert!(evaluate(&patient, "Appointment.status").is_empty());
    }

    #[test]
    fn unions_concatenate() {
        let appt = json!({
            "resourceType": "Appointment",
            "start": "2024-01-01T09:00:00Z",
            "end": "2024-01-01T10:00:00Z"
        });
        assert_eq!(
            evaluate(&appt, "Appointment.start | Appointment.end"),
            vec![json!("2024-01-01T09:00:00Z"), json!("2024-01-01T10:00:00Z")]
        );
    }

    #[test]
    fn unsupported_functions_do_not_index() {
        let patient = json!({"resourceType": "Patient", "name": [{"family": "Doe"}]});
        assert!(evaluate(&patient, "Patient.name.first()").is_empty());
    }

    #[test]
    fn leaf_field_stops_before_where() {
        assert_eq!(
            leaf_field("Appointment.participant.actor.where(resolve() is Patient)"),
            "actor"
        );
        assert_eq!(leaf_field("Patient.managingOrganization"), "managingOrganization");
        assert_eq!(
            leaf_field("Patient.generalPractitioner.where(resolve() is Practitioner)"),
            "generalPractitioner"
        );
    }

    #[test]
    fn parses_where_url() {
        let expr = "Patient.extension.where(url='http://example.org/eye-color').valueString";
        assert_eq!(
            where_url(expr).as_deref(),
            Some("http://example.org/eye-color")
        );
        assert_eq!(where_url("Patient.name"), None);
    }

    #[test]
    fn parses_resolve_target() {
        assert_eq!(
            where_resolve_target("Appointment.participant.actor.where(resolve() is Patient)")
                .as_deref(),
            Some("Patient")
        );
        assert_eq!(where_resolve_target("Appointment.participant.actor"), None);
    }

    #[test]
    fn strip_where_balances_parens() {
        assert_eq!(
            strip_where("Appointment.participant.actor.where(resolve() is Patient)"),
            "Appointment.participant.actor"
        );
        assert_eq!(
            strip_where("Patient.extension.where(url='x').valueString"),
            "Patient.extension.valueString"
        );
        assert_eq!(strip_where("Patient.name"), "Patient.name");
    }

    #[test]
    fn evaluate_after_strip_resolves_polymorphic_reference_field() {
        let appt = json!({
            "resourceType": "Appointment",
            "participant": [
                {"actor": {"reference": "Patient/p1"}},
                {"actor": {"reference": "Practitioner/d1"}}
            ]
        });
        let stripped =
            strip_where("Appointment.participant.actor.where(resolve() is Patient)");
        let values = evaluate(&appt, &stripped);
        assert_eq!(values.len(), 2);
    }
}
