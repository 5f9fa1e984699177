//! Shell-style wildcards in repository paths.
//!
//! Patterns are matched one path segment at a time:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from the set or range
//! - `[!abc]`, `[^abc]` match one character outside it

use std::path::{Component, Path, PathBuf};

/// Bound on recursive match calls, so `*a*a*a…` patterns stay linear-ish.
const MAX_MATCH_CALLS: usize = 100_000;

pub fn contains_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Whether `pattern` matches the whole of `input`.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = input.chars().collect();
    let mut calls = 0usize;
    match_from(&pattern, 0, &input, 0, &mut calls)
}

fn match_from(pattern: &[char], pi: usize, input: &[char], ii: usize, calls: &mut usize) -> bool {
    *calls += 1;
    if *calls > MAX_MATCH_CALLS {
        return false;
    }
    if pi >= pattern.len() {
        return ii >= input.len();
    }
    match pattern[pi] {
        '*' => {
            let mut next = pi;
            while next < pattern.len() && pattern[next] == '*' {
                next += 1;
            }
            if next >= pattern.len() {
                return true;
            }
            (ii..=input.len()).any(|skip| match_from(pattern, next, input, skip, calls))
        }
        '?' => ii < input.len() && match_from(pattern, pi + 1, input, ii + 1, calls),
        '[' => {
            if ii >= input.len() {
                return false;
            }
            match char_class(&pattern[pi..], input[ii]) {
                Some((true, len)) => match_from(pattern, pi + len, input, ii + 1, calls),
                Some((false, _)) => false,
                // Unterminated class: treat '[' literally.
                None => input[ii] == '[' && match_from(pattern, pi + 1, input, ii + 1, calls),
            }
        }
        c => ii < input.len() && c == input[ii] && match_from(pattern, pi + 1, input, ii + 1, calls),
    }
}

/// `(matched, consumed)` for a class starting at `pattern[0] == '['`.
fn char_class(pattern: &[char], ch: char) -> Option<(bool, usize)> {
    let mut idx = 1;
    let negate = matches!(pattern.get(idx), Some('!') | Some('^'));
    if negate {
        idx += 1;
    }
    let first = idx;
    let mut matched = false;
    while idx < pattern.len() {
        let c = pattern[idx];
        if c == ']' && idx > first {
            return Some((matched != negate, idx + 1));
        }
        if idx + 2 < pattern.len() && pattern[idx + 1] == '-' && pattern[idx + 2] != ']' {
            if (c..=pattern[idx + 2]).contains(&ch) {
                matched = true;
            }
            idx += 3;
            continue;
        }
        if c == ch {
            matched = true;
        }
        idx += 1;
    }
    None
}

/// Existing files matching an absolute `pattern`, sorted. Patterns without
/// wildcards come back unchanged whether or not they exist.
pub fn expand(pattern: &Path) -> Vec<PathBuf> {
    if !contains_glob(&pattern.to_string_lossy()) {
        return vec![pattern.to_path_buf()];
    }
    let mut candidates: Vec<PathBuf> = vec![PathBuf::new()];
    for component in pattern.components() {
        let segment = match component {
            Component::Normal(s) => s.to_string_lossy().into_owned(),
            other => {
                for c in &mut candidates {
                    c.push(other.as_os_str());
                }
                continue;
            }
        };
        if !contains_glob(&segment) {
            for c in &mut candidates {
                c.push(&segment);
            }
            continue;
        }
        let mut next = Vec::new();
        for dir in &candidates {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.') || segment.starts_with('.'))
                .filter(|name| glob_match(&segment, name))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|n| dir.join(n)));
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }
    candidates.retain(|p| p.exists());
    candidates
}
