//! Dotted schema paths
//!
//! `target.services[].port` addresses the `port` field of every element of
//! the list at `target.services`. Paths are parsed once with nom and then
//! resolved against `serde_json::Value` trees.

use crate::core::error::{ReconError, Result};
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::char;
use nom::combinator::all_consuming;
use nom::multi::{many0_count, separated_list1};
use nom::{IResult, Parser};
use serde_json::Value;

/// One step of a schema path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object descent by key
    Key(String),
    /// List descent over every member
    Each,
}

/// A parsed schema path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaPath {
    raw: String,
    segments: Vec<Segment>,
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-').parse(input)
}

fn segment(input: &str) -> IResult<&str, (&str, usize)> {
    (ident, many0_count(tag("[]"))).parse(input)
}

fn segments(input: &str) -> IResult<&str, Vec<(&str, usize)>> {
    all_consuming(separated_list1(char('.'), segment)).parse(input)
}

impl SchemaPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let (_, parts) = segments(raw).map_err(|e| ReconError::InvalidSchemaPath {
            path: raw.to_string(),
            reason: e.to_string(),
        })?;

        let mut out = Vec::new();
        for (key, each_count) in parts {
            out.push(Segment::Key(key.to_string()));
            for _ in 0..each_count {
                out.push(Segment::Each);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments: out,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Last key segment (field name), if any
    pub fn leaf_key(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::Key(k) => Some(k.as_str()),
            Segment::Each => None,
        })
    }

    /// Whether the path ends in `[]` (addresses list members)
    pub fn is_member_path(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Each))
    }

    /// Every value reachable at this path
    ///
    /// Missing keys and type mismatches simply yield nothing.
    pub fn resolve<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match segment {
                    Segment::Key(key) => {
                        if let Some(child) = value.as_object().and_then(|m| m.get(key)) {
                            next.push(child);
                        }
                    }
                    Segment::Each => {
                        if let Some(items) = value.as_array() {
                            next.extend(items.iter());
                        }
                    }
                }
            }
            current = next;
        }
        current
    }

    /// Mutable access to every value reachable at this path
    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Vec<&'a mut Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match segment {
                    Segment::Key(key) => {
                        if let Some(child) = value.as_object_mut().and_then(|m| m.get_mut(key)) {
                            next.push(child);
                        }
                    }
                    Segment::Each => {
                        if let Some(items) = value.as_array_mut() {
                            next.extend(items.iter_mut());
                        }
                    }
                }
            }
            current = next;
        }
        current
    }
}

impl std::fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Map a concrete feature key (`target.services[3].port`) to its schema path
/// (`target.services[].port`)
pub fn generalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '[' {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&']') && !digits.is_empty() {
                chars.next();
                out.push_str("[]");
            } else {
                out.push('[');
                out.push_str(&digits);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Join a child key onto a parent path
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_list_path() {
        let path = SchemaPath::parse("target.services[].port").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("target".into()),
                Segment::Key("services".into()),
                Segment::Each,
                Segment::Key("port".into()),
            ]
        );
        assert_eq!(path.leaf_key(), Some("port"));
        assert!(!path.is_member_path());
    }

    #[test]
    fn test_parse_status_code_path() {
        let path = SchemaPath::parse("web_directories_status.200").unwrap();
        assert_eq!(path.segments().len(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SchemaPath::parse("target..ip").is_err());
        assert!(SchemaPath::parse("").is_err());
        assert!(SchemaPath::parse("target.ip ").is_err());
    }

    #[test]
    fn test_resolve_over_list_members() {
        let value = json!({
            "target": {"services": [{"port": 21}, {"port": 22}, {"protocol": "tcp"}]}
        });
        let path = SchemaPath::parse("target.services[].port").unwrap();
        let ports: Vec<_> = path.resolve(&value).into_iter().cloned().collect();
        assert_eq!(ports, vec![json!(21), json!(22)]);
    }

    #[test]
    fn test_resolve_member_path() {
        let value = json!({"tags": ["a", "b"]});
        let path = SchemaPath::parse("tags[]").unwrap();
        assert!(path.is_member_path());
        assert_eq!(path.resolve(&value).len(), 2);
    }

    #[test]
    fn test_generalize_key() {
        assert_eq!(
            generalize_key("target.services[3].softwares[0].name"),
            "target.services[].softwares[].name"
        );
        assert_eq!(generalize_key("target.ip"), "target.ip");
        assert_eq!(generalize_key("action_history_idx_2"), "action_history_idx_2");
    }
}
