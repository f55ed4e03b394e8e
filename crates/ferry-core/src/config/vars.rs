//! `$VAR` substitution in configuration text.
//!
//! - `$VAR`, `${VAR}`: value of VAR, an error when unset
//! - `${VAR:-fallback}`: fallback when VAR is unset or empty
//! - `${VAR-fallback}`: fallback only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        | \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<fallback>[^}]*) )? \}
        | \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable pattern is valid")
});

/// Substitute variables from the process environment.
///
/// Every unresolved variable is reported, not just the first.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Substitute variables using `lookup` to resolve names.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let output = VARIABLE.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        let name = name.as_str();
        let op = caps.name("op").map(|m| m.as_str());
        let fallback = caps.name("fallback").map_or("", |m| m.as_str());

        match (lookup(name), op) {
            (Some(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!("environment variable '{name}' contains a newline"));
                String::new()
            }
            (Some(value), Some(":-")) if value.is_empty() => fallback.to_string(),
            (Some(value), _) => value,
            (None, Some(_)) => fallback.to_string(),
            (None, None) => {
                problems.push(format!("environment variable '{name}' is not set"));
                String::new()
            }
        }
    });

    if problems.is_empty() {
        Ok(output.into_owned())
    } else {
        Err(problems)
    }
}
