use std::collections::BTreeMap;

/// Replace every `${NAME}` in `text` for each `NAME` in `env`.
///
/// Runs on raw text, so references in keys and comments are replaced too.
/// Variables are applied in iteration order; pass a sorted mapping for a
/// deterministic result when values themselves contain `${...}`.
pub fn substitute_env<I, K, V>(text: &str, env: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = text.to_string();
    for (name, value) in env {
        let pattern = format!("${{{}}}", name.as_ref());
        if out.contains(&pattern) {
            out = out.replace(&pattern, value.as_ref());
        }
    }
    out
}

/// Snapshot of the process environment, skipping entries that are not valid UTF-8.
pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}
