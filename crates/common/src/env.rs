use std::env;

/// Reads an env var, treating an empty string the same as unset.
pub fn get_env(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}
