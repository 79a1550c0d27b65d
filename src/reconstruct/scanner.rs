//! Low-level text scanning for tolerant JSON recovery

use regex::Regex;

/// A located `key:` occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHit {
    /// Byte offset where the key (or its opening quote) starts
    pub start: usize,
    /// Byte offset just past the `:`
    pub end: usize,
    /// Bracket nesting depth at `start`
    pub depth: i32,
}

/// Outermost `{...}` span of a response (surrounding chatter removed)
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn key_pattern(key: &str) -> Option<Regex> {
    let escaped = regex::escape(key);
    Regex::new(&format!(r#"(?:^|[^A-Za-z0-9_])(["']?{}["']?)\s*:"#, escaped)).ok()
}

/// Every `key:` occurrence, quoted or bare, in text order
pub fn find_all_keys(text: &str, key: &str) -> Vec<KeyHit> {
    let Some(pattern) = key_pattern(key) else {
        return Vec::new();
    };
    let depths = bracket_depths(text);
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let key_match = caps.get(1)?;
            let whole = caps.get(0)?;
            Some(KeyHit {
                start: key_match.start(),
                end: whole.end(),
                depth: depths.get(key_match.start()).copied().unwrap_or(0),
            })
        })
        .collect()
}

/// The shallowest occurrence of `key:`; ties go to the earliest
pub fn find_key(text: &str, key: &str) -> Option<KeyHit> {
    find_all_keys(text, key)
        .into_iter()
        .min_by_key(|hit| (hit.depth, hit.start))
}

/// Bracket depth before each byte
fn bracket_depths(text: &str) -> Vec<i32> {
    let mut depths = Vec::with_capacity(text.len() + 1);
    let mut depth = 0;
    for byte in text.bytes() {
        depths.push(depth);
        match byte {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth -= 1,
            _ => {}
        }
    }
    depths.push(depth);
    depths
}

/// Strip surrounding punctuation, quotes and control characters from a cut value
pub fn clean_scalar(raw: &str) -> String {
    let without_control: String = raw.chars().filter(|c| !c.is_control()).collect();
    without_control
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '{' | '}' | '[' | ']' | ':' | '`'))
        .to_string()
}

/// Split a cut list body into cleaned, non-empty scalars
pub fn split_scalars(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(clean_scalar)
        .filter(|s| !s.is_empty())
        .collect()
}

/// `"path": "reason"` pairs; the reason may be unquoted or unterminated
pub fn extract_pairs(raw: &str) -> Vec<(String, String)> {
    let Ok(pattern) = Regex::new(r#"["']([^"']*)["']\s*:\s*["']?([^"',{}\[\]]*)"#) else {
        return Vec::new();
    };
    pattern
        .captures_iter(raw)
        .filter_map(|caps| {
            let path = caps.get(1)?.as_str().trim().to_string();
            let reason = clean_scalar(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            Some((path, reason))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_span() {
        let text = "Sure! {\"target\": {}} hope this helps";
        assert_eq!(extract_json_span(text), Some("{\"target\": {}}"));
        assert_eq!(extract_json_span("no json here"), None);
    }

    #[test]
    fn test_find_key_prefers_shallowest() {
        let text = r#"{"distribution": {"name": "ubuntu"}, "name": "Linux"}"#;
        let hit = find_key(text, "name").unwrap();
        assert_eq!(hit.depth, 1);
        assert!(text[hit.end..].trim_start().starts_with("\"Linux\""));
    }

    #[test]
    fn test_find_key_respects_word_boundary() {
        let text = r#"{"server_version": "2.4", "version": "1.0"}"#;
        let hits = find_all_keys(text, "version");
        assert_eq!(hits.len(), 1);
        assert!(find_all_keys(r#"{"services": []}"#, "service").is_empty());
    }

    #[test]
    fn test_bare_keys() {
        let text = "{port: 22, protocol: tcp}";
        assert!(find_key(text, "port").is_some());
        assert!(find_key(text, "protocol").is_some());
    }

    #[test]
    fn test_clean_scalar() {
        assert_eq!(clean_scalar(" \"Apache httpd\", "), "Apache httpd");
        assert_eq!(clean_scalar("\"tcp\"}, {"), "tcp");
        assert_eq!(clean_scalar("22\n"), "22");
        assert_eq!(clean_scalar("\u{7}\"x\""), "x");
    }

    #[test]
    fn test_extract_pairs() {
        let pairs = extract_pairs(r#"{"/index.php": "OK", "/admin": "Forbidden"}, "#);
        assert_eq!(
            pairs,
            vec![
                ("/index.php".to_string(), "OK".to_string()),
                ("/admin".to_string(), "Forbidden".to_string())
            ]
        );
        let truncated = extract_pairs(r#"{"/phpMyAdmin": "Moved"#);
        assert_eq!(truncated, vec![("/phpMyAdmin".to_string(), "Moved".to_string())]);
    }

    #[test]
    fn test_split_scalars() {
        assert_eq!(split_scalars(r#"["ftp", "ftps"], "#), vec!["ftp", "ftps"]);
        assert!(split_scalars("[]").is_empty());
    }
}
