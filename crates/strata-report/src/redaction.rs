use std::collections::BTreeSet;

use strata_domain::Manifest;

/// Collect every resolved secret value of a manifest, for masking before any
/// human-facing output leaves the process.
#[must_use]
pub fn collect_secret_values(manifest: &Manifest) -> BTreeSet<String> {
    let mut values = BTreeSet::new();

    for environment in manifest.environments.values() {
        if let Some(token) = &environment.auth.token {
            values.insert(token.value().to_string());
        }
        if let Some(oauth) = &environment.auth.oauth {
            values.insert(oauth.client_id.value().to_string());
            values.insert(oauth.client_secret.value().to_string());
        }
    }

    values
}

/// Replace every occurrence of a secret value with a placeholder. Values
/// shorter than three characters are left alone; masking those would mangle
/// unrelated text.
#[must_use]
pub fn redact_secrets(text: &str, secret_values: &BTreeSet<String>) -> String {
    let mut by_length: Vec<&str> = secret_values
        .iter()
        .filter(|value| value.len() >= 3)
        .map(String::as_str)
        .collect();
    by_length.sort_by_key(|value| std::cmp::Reverse(value.len()));

    let mut redacted = text.to_string();
    for value in by_length {
        redacted = redacted.replace(value, "[REDACTED]");
    }
    redacted
}
