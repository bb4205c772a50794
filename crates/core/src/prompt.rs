//! Renders script templates against a learner's profile.
//!
//! Templates reference values as `{{key}}`. Only keys the script declares
//! (plus `input` when the learner replied) are looked up; a declared key the
//! learner has no value for renders empty, and any other placeholder is left
//! as written.

use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::store::ProfileAccessor;

pub const INPUT_KEY: &str = "input";

/// Substitutes `{{key}}` placeholders found in `values`.
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + len].trim();
        out.push_str(&rest[..start]);
        match values.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + len + 4]),
        }
        rest = &rest[start + len + 4..];
    }
    out.push_str(rest);
    out
}

/// Formats a script template for one learner.
///
/// With no declared keys and no input the template is returned untouched.
pub async fn format_prompt(
    profiles: &dyn ProfileAccessor,
    learner_id: &str,
    template: &str,
    keys: &[String],
    input: Option<&str>,
) -> Result<String> {
    if keys.is_empty() && input.is_none() {
        return Ok(template.to_string());
    }
    let mut values = if keys.is_empty() {
        HashMap::new()
    } else {
        profiles.get(learner_id, keys).await?
    };
    for key in keys {
        values.entry(key.clone()).or_default();
    }
    if let Some(input) = input {
        values.insert(INPUT_KEY.to_string(), input.to_string());
    }
    let prompt = render(template, &values);
    debug!(learner = %learner_id, %prompt, "Formatted prompt");
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_known_keys() {
        let out = render("Hello {{name}}, age {{ age }}", &values(&[("name", "Ana"), ("age", "7")]));
        assert_eq!(out, "Hello Ana, age 7");
    }

    #[test]
    fn test_render_leaves_unknown_and_unclosed_placeholders() {
        let out = render("{{who}} says {{hi", &values(&[("name", "Ana")]));
        assert_eq!(out, "{{who}} says {{hi");
    }

    #[tokio::test]
    async fn test_format_prompt_reads_declared_keys_and_input() {
        let store = InMemoryStore::new();
        store.put_profile("u1", "name", "Ana").await;
        store.put_profile("u1", "secret", "hidden").await;

        let out = format_prompt(
            &store,
            "u1",
            "{{name}} wrote '{{input}}' {{secret}} {{missing}}",
            &["name".to_string(), "missing".to_string()],
            Some("42"),
        )
        .await
        .unwrap();
        assert_eq!(out, "Ana wrote '42' {{secret}} ");
    }

    #[tokio::test]
    async fn test_format_prompt_without_keys_is_verbatim() {
        let store = InMemoryStore::new();
        let out = format_prompt(&store, "u1", "Hi {{name}}", &[], None).await.unwrap();
        assert_eq!(out, "Hi {{name}}");
    }
}
