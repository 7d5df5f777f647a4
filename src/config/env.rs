//! `${VAR}` placeholder substitution for config files.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("valid regex"));

/// Replace `${VAR}` with values from `lookup`; unknown variables stay as written.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    log::warn!("Environment variable not set: {}", name);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}
