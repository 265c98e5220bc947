//! Glob pattern compilation shared by the `glob` tool and the file transports.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compile `pattern` (with brace alternatives) into a matcher over paths
/// relative to the search base. `*` does not cross `/`; use `**` for that.
pub fn compile(pattern: &str) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pat in expand_braces(pattern) {
        let glob = GlobBuilder::new(&pat)
            .literal_separator(true)
            .build()
            .map_err(|e| format!("invalid glob pattern '{pat}': {e}"))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| format!("failed to compile glob patterns: {e}"))
}

/// Expands brace patterns like `{a,b,c}` into multiple alternatives.
/// Handles nested braces and multiple brace groups.
/// Example: `**/*.{cpp,h}` -> `["**/*.cpp", "**/*.h"]`
#[must_use]
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let mut results = vec![pattern.to_string()];

    loop {
        let mut expanded = false;
        let mut new_results = Vec::new();

        for pat in &results {
            if let Some(expansion) = expand_single_brace(pat) {
                new_results.extend(expansion);
                expanded = true;
            } else {
                new_results.push(pat.clone());
            }
        }

        results = new_results;
        if !expanded {
            break;
        }
    }

    results
}

/// Expands the first (innermost) brace group found in the pattern.
/// Returns None if no braces found.
fn expand_single_brace(pattern: &str) -> Option<Vec<String>> {
    let bytes = pattern.as_bytes();
    let mut brace_start = None;

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'{' {
            brace_start = Some(i);
        } else if b == b'}'
            && let Some(start) = brace_start
        {
            let prefix = &pattern[..start];
            let suffix = &pattern[i + 1..];
            let alternatives = &pattern[start + 1..i];

            return Some(
                alternatives
                    .split(',')
                    .map(|p| format!("{prefix}{p}{suffix}"))
                    .collect(),
            );
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{compile, expand_braces, expand_single_brace};

    #[test]
    fn expand_braces_no_braces() {
        assert_eq!(expand_braces("**/*.rs"), vec!["**/*.rs"]);
    }

    #[test]
    fn expand_braces_multiple_alternatives() {
        let mut result = expand_braces("src/*.{ts,tsx,js}");
        result.sort();
        assert_eq!(result, vec!["src/*.js", "src/*.ts", "src/*.tsx"]);
    }

    #[test]
    fn expand_braces_single_item_removes_braces() {
        assert_eq!(expand_braces("**/*.{rs}"), vec!["**/*.rs"]);
    }

    #[test]
    fn expand_braces_nested() {
        let result = expand_braces("{a{b,c}}");
        assert!(result.contains(&"ab".to_string()));
        assert!(result.contains(&"ac".to_string()));
    }

    #[test]
    fn expand_single_brace_with_prefix_suffix() {
        let result = expand_single_brace("pre{a,b}post").unwrap();
        assert_eq!(result, vec!["preapost", "prebpost"]);
        assert_eq!(expand_single_brace("plain"), None);
    }

    #[test]
    fn star_does_not_cross_directories() {
        let set = compile("*.rs").unwrap();
        assert!(set.is_match("main.rs"));
        assert!(!set.is_match("src/main.rs"));
        let deep = compile("**/*.{rs,toml}").unwrap();
        assert!(deep.is_match("src/main.rs"));
        assert!(deep.is_match("Cargo.toml"));
        assert!(!deep.is_match("README.md"));
    }

    #[test]
    fn invalid_pattern_reports_error() {
        let err = compile("src/[").unwrap_err();
        assert!(err.contains("invalid glob pattern"));
    }
}
