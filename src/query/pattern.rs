use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::{Regex, RegexBuilder};

use crate::core::{DbError, Result};

const REGEX_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => panic!("cache size must be non-zero"),
};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<(bool, String), Arc<Regex>>> =
        Mutex::new(LruCache::new(REGEX_CACHE_SIZE));
}

/// Translates a LIKE pattern into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Patterns without `_` or `\` and with `%` only at the ends are matched
/// without a regex.
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let starts = pattern.starts_with('%');
    let ends = pattern.len() > 1 && pattern.ends_with('%');
    let core = pattern
        .strip_prefix('%')
        .unwrap_or(pattern);
    let core = if ends { core.strip_suffix('%').unwrap_or(core) } else { core };
    if core.contains('%') {
        return None;
    }

    let (text, core) = if case_sensitive {
        (text.to_string(), core.to_string())
    } else {
        (text.to_lowercase(), core.to_lowercase())
    };

    Some(match (starts, ends) {
        (false, false) => text == core,
        (false, true) => text.starts_with(&core),
        (true, false) => text.ends_with(&core),
        (true, true) => text.contains(&core),
    })
}

fn get_or_compile_regex(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = (case_sensitive, pattern.to_string());

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| DbError::ExecutionError(format!("Invalid LIKE pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    REGEX_LRU_CACHE.lock()?.put(cache_key, Arc::clone(&compiled));
    Ok(compiled)
}

/// Evaluates `text LIKE pattern`.
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let regex = get_or_compile_regex(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_paths() {
        assert!(eval_like("adult", "adult", true).unwrap());
        assert!(eval_like("adult", "ad%", true).unwrap());
        assert!(eval_like("adult", "%ult", true).unwrap());
        assert!(eval_like("adult", "%du%", true).unwrap());
        assert!(!eval_like("adult", "%child%", true).unwrap());
        assert!(eval_like("Adult", "adult", false).unwrap());
        assert!(eval_like("anything", "%", true).unwrap());
    }

    #[test]
    fn test_regex_path() {
        assert!(eval_like("Ann Lee", "A_n%e", true).unwrap());
        assert!(!eval_like("Ann Lee", "A_n%x", true).unwrap());
        assert!(eval_like("a.b", "a.b", true).unwrap());
        assert!(!eval_like("axb", "a.b", true).unwrap());
    }

    #[test]
    fn test_escaped_wildcards() {
        let pattern = format!("%{}%", escape_like("50%"));
        assert!(eval_like("save 50% now", &pattern, true).unwrap());
        assert!(!eval_like("save 500 now", &pattern, true).unwrap());
    }
}
