use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::TemplateError;

/// Render `{{ .name }}` placeholders against a value map.
///
/// This is deliberately the whole template language: a placeholder is two
/// opening braces, optional whitespace, a dot, a key, optional whitespace,
/// two closing braces. Anything else between double braces is rejected so a
/// typo fails loudly instead of deploying half-rendered payloads.
///
/// # Errors
///
/// Returns an error for unterminated placeholders, non-placeholder
/// directives, and keys missing from `values`.
pub fn render(template: &str, values: &BTreeMap<String, Value>) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            return Err(TemplateError::UnterminatedPlaceholder);
        };

        let directive = &after_open[..end];
        let key = parse_placeholder(directive)?;
        let value = values
            .get(key)
            .ok_or_else(|| TemplateError::MissingKey {
                key: key.to_string(),
            })?;
        output.push_str(&render_value(value));

        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

fn parse_placeholder(directive: &str) -> Result<&str, TemplateError> {
    let trimmed = directive.trim();

    let Some(key) = trimmed.strip_prefix('.') else {
        return Err(TemplateError::UnknownDirective {
            directive: trimmed.to_string(),
        });
    };

    if key.is_empty() || !key.chars().all(is_key_char) {
        return Err(TemplateError::UnknownDirective {
            directive: trimmed.to_string(),
        });
    }

    Ok(key)
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Strings substitute verbatim; everything else substitutes as its JSON
/// notation so lists and objects stay valid inside JSON templates.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The names a template will ask for, in order of appearance. Used to check
/// renders ahead of resolution.
#[must_use]
pub fn placeholder_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        if let Ok(key) = parse_placeholder(&after_open[..end]) {
            keys.push(key.to_string());
        }
        rest = &after_open[end + 2..];
    }

    keys
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::collections::BTreeMap;

    use serde_json::{Value, json};

    use super::{placeholder_keys, render};
    use crate::error::TemplateError;

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn substitutes_string_values_verbatim() {
        let rendered = render(
            r#"{"name":"{{ .name }}"}"#,
            &values(&[("name", json!("My Dashboard"))]),
        )
        .expect("render");
        assert_eq!(rendered, r#"{"name":"My Dashboard"}"#);
    }

    #[test]
    fn whitespace_inside_the_placeholder_is_optional() {
        let map = values(&[("id", json!("abc"))]);
        assert_eq!(render("{{.id}}", &map).expect("render"), "abc");
        assert_eq!(render("{{   .id   }}", &map).expect("render"), "abc");
    }

    #[test]
    fn non_string_values_substitute_as_json() {
        let rendered = render(
            r#"{"limit":{{ .limit }},"tags":{{ .tags }}}"#,
            &values(&[("limit", json!(25)), ("tags", json!(["a", "b"]))]),
        )
        .expect("render");
        assert_eq!(rendered, r#"{"limit":25,"tags":["a","b"]}"#);
    }

    #[test]
    fn missing_keys_error() {
        let error = render("{{ .unknown }}", &values(&[])).expect_err("must fail");
        assert!(matches!(error, TemplateError::MissingKey { key } if key == "unknown"));
    }

    #[test]
    fn control_flow_directives_are_rejected() {
        let map = values(&[("name", json!("x"))]);
        let error = render("{{ if .name }}{{ end }}", &map).expect_err("must fail");
        assert!(matches!(error, TemplateError::UnknownDirective { .. }));
    }

    #[test]
    fn unterminated_placeholders_are_rejected() {
        let error = render("{{ .name", &values(&[])).expect_err("must fail");
        assert!(matches!(error, TemplateError::UnterminatedPlaceholder));
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        let template = r#"{"a": "b", "single": "{brace}"}"#;
        assert_eq!(render(template, &values(&[])).expect("render"), template);
    }

    #[test]
    fn keys_are_listed_in_order_of_appearance() {
        let keys = placeholder_keys(r#"{"n":"{{ .name }}","t":"{{ .tagId }}","n2":"{{ .name }}"}"#);
        assert_eq!(keys, vec!["name", "tagId", "name"]);
    }
}
