use std::sync::OnceLock;

use regex::Regex;

use crate::errors::GuardError;

/// Compiled allow-list of glob patterns restricting which workspace paths a
/// patch (or a file read) may touch.
///
/// Glob semantics: `*` matches a run of non-`/` characters, `**` matches any
/// number of path segments including zero (`**/` collapses), `?` matches one
/// non-`/` character, everything else is literal. A path is allowed when any
/// pattern matches it, equals it, or is a directory prefix of it.
#[derive(Clone, Debug)]
pub struct AllowList {
    patterns: Vec<CompiledPattern>,
}

#[derive(Clone, Debug)]
struct CompiledPattern {
    raw: String,
    regex: Regex,
}

impl AllowList {
    pub fn new(patterns: &[String]) -> Result<Self, GuardError> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                let regex = Regex::new(&glob_to_regex(pattern)).map_err(|error| {
                    GuardError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: error.to_string(),
                    }
                })?;
                Ok(CompiledPattern {
                    raw: pattern.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, GuardError>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        self.patterns.iter().any(|pattern| {
            let raw = pattern.raw.trim_end_matches('/');
            pattern.regex.is_match(path) || path == raw || path.starts_with(&format!("{raw}/"))
        })
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        // `**/` collapses so `src/**/*.ts` also matches `src/a.ts`.
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            _ => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    regex
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^[+-]{3} [ab]/(.+)$").expect("static header regex"))
}

/// Distinct `--- a/<p>` / `+++ b/<p>` targets of a unified diff, `/dev/null`
/// excluded.
pub fn extract_patch_paths(patch: &str) -> Vec<String> {
    let header = header_regex();
    let mut paths: Vec<String> = Vec::new();
    for line in patch.lines() {
        if !(line.starts_with("--- ") || line.starts_with("+++ ")) {
            continue;
        }
        let Some(captures) = header.captures(line) else {
            continue;
        };
        let path = captures[1].to_string();
        if path == "dev/null" || paths.contains(&path) {
            continue;
        }
        paths.push(path);
    }
    paths
}

/// Rejects a patch that touches any path outside the allow-list, or one with
/// no recognizable file headers at all.
pub fn validate_patch(patch: &str, allow_list: &AllowList) -> Result<(), GuardError> {
    let paths = extract_patch_paths(patch);
    if paths.is_empty() {
        return Err(GuardError::UnrecognizedDiff);
    }
    for path in paths {
        if !allow_list.is_allowed(&path) {
            return Err(GuardError::DisallowedPath(path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(patterns: &[&str]) -> AllowList {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        AllowList::new(&patterns).expect("patterns should compile")
    }

    #[test]
    fn double_star_collapses_and_single_star_stays_in_segment() {
        let list = allow(&["src/**/*.ts"]);
        assert!(list.is_allowed("src/a.ts"));
        assert!(list.is_allowed("src/sub/b.ts"));
        assert!(!list.is_allowed("src/a.js"));
        assert!(!list.is_allowed("lib/a.ts"));
    }

    #[test]
    fn question_mark_matches_one_non_separator_character() {
        let list = allow(&["src/?.rs"]);
        assert!(list.is_allowed("src/a.rs"));
        assert!(!list.is_allowed("src/ab.rs"));
        assert!(!list.is_allowed("src//.rs"));
    }

    #[test]
    fn literal_equality_and_directory_prefix_also_allow() {
        let list = allow(&["docs"]);
        assert!(list.is_allowed("docs"));
        assert!(list.is_allowed("docs/guide.md"));
        assert!(!list.is_allowed("docs-old/guide.md"));
    }

    #[test]
    fn regex_metacharacters_in_patterns_are_literal() {
        let list = allow(&["src/a+b.rs"]);
        assert!(list.is_allowed("src/a+b.rs"));
        assert!(!list.is_allowed("src/aab.rs"));
    }

    #[test]
    fn extract_patch_paths_collects_distinct_targets_and_skips_dev_null() {
        let patch = "\
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1 +1 @@
-old
+new
--- /dev/null
+++ b/src/new_file.rs
@@ -0,0 +1 @@
+content
";
        let paths = extract_patch_paths(patch);
        assert_eq!(paths, vec!["src/lib.rs", "src/new_file.rs"]);
    }

    #[test]
    fn validate_patch_reports_the_first_disallowed_path() {
        let list = allow(&["src/**/*"]);
        let patch = "\
--- a/src/ok.ts
+++ b/src/ok.ts
--- a/secrets/key.ts
+++ b/secrets/key.ts
";
        let err = validate_patch(patch, &list).expect_err("disallowed path should fail");
        assert_eq!(
            err.to_string(),
            "Patch touches disallowed path: secrets/key.ts"
        );
    }

    #[test]
    fn validate_patch_rejects_header_free_text() {
        let list = allow(&["**/*"]);
        let err = validate_patch("this is not a diff", &list).expect_err("should fail");
        assert!(matches!(err, GuardError::UnrecognizedDiff));
    }
}
