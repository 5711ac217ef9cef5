// SPDX-License-Identifier: MIT OR Apache-2.0

use regex::Regex;
use std::sync::OnceLock;

fn package_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9@._+-]+$").unwrap_or_else(|err| {
            unreachable!("package name pattern must compile: {err}")
        })
    })
}

/// Returns `true` when `name` is a well-formed package name.
///
/// Names start with a lowercase alphanumeric and continue with at least one
/// more character from `[a-z0-9@._+-]`; everything that reaches a shell,
/// a filesystem path, or a container env var is validated against this.
pub fn is_valid_package_name(name: &str) -> bool {
    package_name_pattern().is_match(name)
}
