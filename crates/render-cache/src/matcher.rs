//! Bulk-expire name matching
//!
//! `expire` selects victim names in one of three modes. Glob patterns are
//! translated to anchored regexes; regex patterns are used as given and
//! match anywhere in the name. The full match set is computed before any
//! removal starts, so removing one match cannot hide another.

use crate::error::Result;
use crate::store::CacheGroup;
use regex::Regex;

/// How `expire` interprets its pattern argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Exact name equality
    Strict,
    /// Shell-style wildcard (`*`, `?`)
    Glob,
    /// Regular expression
    Regex,
}

impl MatchMode {
    /// Parse a mode from its lowercase wire name (case-insensitive)
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.to_ascii_lowercase().as_str() {
            "strict" => Some(MatchMode::Strict),
            "glob" => Some(MatchMode::Glob),
            "regex" => Some(MatchMode::Regex),
            _ => None,
        }
    }
}

/// Resolve a pattern against the resident names of a group
///
/// Strict mode returns the pattern itself without consulting the group, so
/// a strict expire works even when nothing is resident. Glob and regex scan
/// every resident record's name.
pub fn match_names(
    group: Option<&CacheGroup>,
    pattern: &str,
    mode: MatchMode,
) -> Result<Vec<String>> {
    match mode {
        MatchMode::Strict => Ok(vec![pattern.to_string()]),
        MatchMode::Glob => {
            let regex = Regex::new(&glob_to_regex(pattern))?;
            Ok(scan(group, &regex))
        }
        MatchMode::Regex => {
            let regex = Regex::new(pattern)?;
            Ok(scan(group, &regex))
        }
    }
}

fn scan(group: Option<&CacheGroup>, regex: &Regex) -> Vec<String> {
    group
        .map(|group| {
            group
                .values()
                .filter(|item| regex.is_match(&item.name))
                .map(|item| item.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Translate a shell-style glob into an anchored regex
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 2);
    regex.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }
    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheItem;
    use chrono::Utc;

    fn group_of(names: &[&str]) -> CacheGroup {
        names
            .iter()
            .map(|name| {
                (
                    format!("hash-of-{}", name),
                    CacheItem {
                        name: name.to_string(),
                        stored_filename: format!("{}.png", name),
                        expires_at: Utc::now(),
                        keep: false,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_strict_returns_pattern_without_group() {
        let names = match_names(None, "report-jan", MatchMode::Strict).unwrap();
        assert_eq!(names, vec!["report-jan".to_string()]);
    }

    #[test]
    fn test_glob_star_matches_prefix() {
        let group = group_of(&["report-jan", "report-feb", "summary"]);
        let mut names = match_names(Some(&group), "report-*", MatchMode::Glob).unwrap();
        names.sort();
        assert_eq!(names, vec!["report-feb", "report-jan"]);
    }

    #[test]
    fn test_glob_question_mark_matches_one_char() {
        let group = group_of(&["page-1", "page-2", "page-10"]);
        let mut names = match_names(Some(&group), "page-?", MatchMode::Glob).unwrap();
        names.sort();
        assert_eq!(names, vec!["page-1", "page-2"]);
    }

    #[test]
    fn test_glob_dot_is_literal() {
        let group = group_of(&["report.pdf", "reportxpdf"]);
        let names = match_names(Some(&group), "report.pdf", MatchMode::Glob).unwrap();
        assert_eq!(names, vec!["report.pdf"]);
    }

    #[test]
    fn test_glob_is_anchored() {
        let group = group_of(&["report-jan", "old-report-jan"]);
        let names = match_names(Some(&group), "report-*", MatchMode::Glob).unwrap();
        assert_eq!(names, vec!["report-jan"]);
    }

    #[test]
    fn test_regex_matches_anywhere() {
        let group = group_of(&["report-jan", "old-report-feb", "summary"]);
        let mut names = match_names(Some(&group), "report", MatchMode::Regex).unwrap();
        names.sort();
        assert_eq!(names, vec!["old-report-feb", "report-jan"]);
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        let group = group_of(&["report"]);
        assert!(match_names(Some(&group), "(unclosed", MatchMode::Regex).is_err());
    }

    #[test]
    fn test_glob_against_missing_group_matches_nothing() {
        let names = match_names(None, "*", MatchMode::Glob).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(MatchMode::parse("strict"), Some(MatchMode::Strict));
        assert_eq!(MatchMode::parse("GLOB"), Some(MatchMode::Glob));
        assert_eq!(MatchMode::parse("Regex"), Some(MatchMode::Regex));
        assert_eq!(MatchMode::parse("fuzzy"), None);
    }
}
