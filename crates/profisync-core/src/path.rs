//! Dotted/bracket JSON path addressing.
//!
//! `JsonPath` covers exactly what the workflow definitions need: reading
//! scalar leaves and writing at one or two levels of nesting. A write
//! replaces only the addressed sub-tree -- sibling data is never touched --
//! and creates missing intermediate objects along the way.
//!
//! Supported syntax: `$`, `$.a.b`, `$.a[0].b`, `$['a key']`.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing or applying a JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string is malformed.
    #[error("invalid path '{0}'")]
    Parse(String),

    /// A write could not traverse an existing non-object value.
    #[error("cannot write through non-object value at '{0}'")]
    Traversal(String),

    /// A write addressed an array index that does not exist.
    #[error("array index out of bounds at '{0}'")]
    IndexOutOfBounds(String),
}

// ---------------------------------------------------------------------------
// JsonPath
// ---------------------------------------------------------------------------

/// One segment of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed dotted/bracket path rooted at `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse a path string. Must start with `$`.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut chars = raw.chars().peekable();
        if chars.next() != Some('$') {
            return Err(PathError::Parse(raw.to_string()));
        }

        let mut segments = Vec::new();
        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let mut key = String::new();
                    while let Some(&k) = chars.peek() {
                        if k == '.' || k == '[' {
                            break;
                        }
                        key.push(k);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(PathError::Parse(raw.to_string()));
                    }
                    segments.push(Segment::Key(key));
                }
                '[' => {
                    chars.next();
                    match chars.peek() {
                        Some('\'') => {
                            chars.next();
                            let mut key = String::new();
                            loop {
                                match chars.next() {
                                    Some('\'') => break,
                                    Some(k) => key.push(k),
                                    None => return Err(PathError::Parse(raw.to_string())),
                                }
                            }
                            if chars.next() != Some(']') {
                                return Err(PathError::Parse(raw.to_string()));
                            }
                            segments.push(Segment::Key(key));
                        }
                        _ => {
                            let mut digits = String::new();
                            while let Some(&d) = chars.peek() {
                                if d == ']' {
                                    break;
                                }
                                digits.push(d);
                                chars.next();
                            }
                            if chars.next() != Some(']') {
                                return Err(PathError::Parse(raw.to_string()));
                            }
                            let index: usize = digits
                                .parse()
                                .map_err(|_| PathError::Parse(raw.to_string()))?;
                            segments.push(Segment::Index(index));
                        }
                    }
                }
                _ => return Err(PathError::Parse(raw.to_string())),
            }
        }

        Ok(Self { segments })
    }

    /// Whether this path addresses the document root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Read the value at this path, if present.
    pub fn read<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(k) => current.get(k.as_str())?,
                Segment::Index(i) => current.get(*i)?,
            };
        }
        Some(current)
    }

    /// Replace the sub-tree at this path with `value`.
    ///
    /// Missing intermediate keys are created as empty objects. Existing
    /// sibling data is left untouched. Writing through an existing
    /// non-object, non-array value is an error.
    pub fn write(&self, doc: &mut Value, value: Value) -> Result<(), PathError> {
        if self.is_root() {
            *doc = value;
            return Ok(());
        }

        let mut current = doc;
        for (pos, segment) in self.segments.iter().enumerate() {
            let last = pos == self.segments.len() - 1;
            match segment {
                Segment::Key(k) => {
                    if current.is_null() {
                        *current = Value::Object(serde_json::Map::new());
                    }
                    let map = current
                        .as_object_mut()
                        .ok_or_else(|| PathError::Traversal(self.to_string()))?;
                    if last {
                        map.insert(k.clone(), value);
                        return Ok(());
                    }
                    current = map.entry(k.clone()).or_insert(Value::Null);
                }
                Segment::Index(i) => {
                    let arr = current
                        .as_array_mut()
                        .ok_or_else(|| PathError::Traversal(self.to_string()))?;
                    if *i >= arr.len() {
                        return Err(PathError::IndexOutOfBounds(self.to_string()));
                    }
                    if last {
                        arr[*i] = value;
                        return Ok(());
                    }
                    current = &mut arr[*i];
                }
            }
        }
        unreachable!("loop returns on the last segment")
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_root() {
        let path = JsonPath::parse("$").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "$");
    }

    #[test]
    fn test_parse_dotted() {
        let path = JsonPath::parse("$.context.userId").unwrap();
        assert_eq!(path.to_string(), "$.context.userId");
    }

    #[test]
    fn test_parse_bracket_index() {
        let path = JsonPath::parse("$.items[2].name").unwrap();
        assert_eq!(path.to_string(), "$.items[2].name");
    }

    #[test]
    fn test_parse_bracket_key() {
        let path = JsonPath::parse("$['a key'].b").unwrap();
        assert_eq!(path.read(&json!({ "a key": { "b": 7 } })), Some(&json!(7)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "context", "$.", "$.a..b", "$[", "$[x]", "$['unterminated"] {
            assert!(JsonPath::parse(raw).is_err(), "should reject {raw:?}");
        }
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    #[test]
    fn test_read_nested() {
        let doc = json!({ "detail": { "messageBody": { "userName": "42" } } });
        let path = JsonPath::parse("$.detail.messageBody.userName").unwrap();
        assert_eq!(path.read(&doc), Some(&json!("42")));
    }

    #[test]
    fn test_read_missing_returns_none() {
        let doc = json!({ "a": 1 });
        let path = JsonPath::parse("$.a.b").unwrap();
        assert_eq!(path.read(&doc), None);
    }

    #[test]
    fn test_read_array_element() {
        let doc = json!({ "attrs": [{ "name": "email" }] });
        let path = JsonPath::parse("$.attrs[0].name").unwrap();
        assert_eq!(path.read(&doc), Some(&json!("email")));
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    #[test]
    fn test_write_replaces_only_the_addressed_subtree() {
        let mut doc = json!({ "a": { "b": 1, "c": 2 }, "d": 3 });
        let path = JsonPath::parse("$.a.b").unwrap();
        path.write(&mut doc, json!({ "x": 9 })).unwrap();
        assert_eq!(doc, json!({ "a": { "b": { "x": 9 }, "c": 2 }, "d": 3 }));
    }

    #[test]
    fn test_write_creates_missing_intermediates() {
        let mut doc = json!({ "firstName": "A" });
        let path = JsonPath::parse("$.context.userId").unwrap();
        path.write(&mut doc, json!(42)).unwrap();
        assert_eq!(doc, json!({ "firstName": "A", "context": { "userId": 42 } }));
    }

    #[test]
    fn test_write_root_replaces_document() {
        let mut doc = json!({ "old": true });
        let path = JsonPath::parse("$").unwrap();
        path.write(&mut doc, json!({ "response": { "statusCode": 400 } }))
            .unwrap();
        assert_eq!(doc, json!({ "response": { "statusCode": 400 } }));
    }

    #[test]
    fn test_write_through_scalar_fails() {
        let mut doc = json!({ "a": 1 });
        let path = JsonPath::parse("$.a.b").unwrap();
        let err = path.write(&mut doc, json!(2)).unwrap_err();
        assert!(matches!(err, PathError::Traversal(_)));
    }

    #[test]
    fn test_write_out_of_bounds_index_fails() {
        let mut doc = json!({ "items": [] });
        let path = JsonPath::parse("$.items[0]").unwrap();
        let err = path.write(&mut doc, json!(1)).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfBounds(_)));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        /// Writing at $.a.b then reading it back yields the written value,
        /// and sibling keys are untouched.
        #[test]
        fn prop_write_then_read_roundtrip(n in any::<i64>(), sibling in any::<i64>()) {
            let mut doc = json!({ "a": { "keep": sibling }, "other": true });
            let path = JsonPath::parse("$.a.b").unwrap();
            path.write(&mut doc, json!(n)).unwrap();
            prop_assert_eq!(path.read(&doc), Some(&json!(n)));
            prop_assert_eq!(doc["a"]["keep"].as_i64(), Some(sibling));
            prop_assert_eq!(&doc["other"], &json!(true));
        }

        /// Display of a parsed dotted path parses back to the same path.
        #[test]
        fn prop_display_parse_roundtrip(keys in proptest::collection::vec("[a-zA-Z][a-zA-Z0-9_]{0,8}", 1..4)) {
            let raw = format!("$.{}", keys.join("."));
            let path = JsonPath::parse(&raw).unwrap();
            let reparsed = JsonPath::parse(&path.to_string()).unwrap();
            prop_assert_eq!(path, reparsed);
        }
    }
}
