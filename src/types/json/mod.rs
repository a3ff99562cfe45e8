//! JSON document values.
//!
//! Documents are parsed with `serde_json` and held as an explicit tree.
//! Objects keep their members in insertion order.

pub mod path;

use path::{Location, Step};

#[derive(Debug, Clone, Copy)]
pub enum JsonNumber {
    Int(i64),
    Float(f64),
}

impl JsonNumber {
    pub fn as_f64(self) -> f64 {
        match self {
            JsonNumber::Int(i) => i as f64,
            JsonNumber::Float(f) => f,
        }
    }
}

impl PartialEq for JsonNumber {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsonNumber::Int(a), JsonNumber::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonNode {
    Null,
    Bool(bool),
    Number(JsonNumber),
    String(String),
    Array(Vec<JsonNode>),
    Object(Vec<(String, JsonNode)>),
}

/// Whitespace used by `JSON.GET INDENT/NEWLINE/SPACE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Format {
    pub indent: String,
    pub newline: String,
    pub space: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Mul,
}

impl From<serde_json::Value> for JsonNode {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => JsonNode::Null,
            Value::Bool(b) => JsonNode::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => JsonNode::Number(JsonNumber::Int(i)),
                None => JsonNode::Number(JsonNumber::Float(n.as_f64().unwrap_or(0.0))),
            },
            Value::String(s) => JsonNode::String(s),
            Value::Array(items) => JsonNode::Array(items.into_iter().map(JsonNode::from).collect()),
            Value::Object(map) => JsonNode::Object(map.into_iter().map(|(k, v)| (k, JsonNode::from(v))).collect()),
        }
    }
}

impl JsonNode {
    pub fn parse(text: &[u8]) -> Result<JsonNode, String> {
        serde_json::from_slice::<serde_json::Value>(text)
            .map(JsonNode::from)
            .map_err(|e| e.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JsonNode::Null => "null",
            // Booleans are tagged with their literal.
            JsonNode::Bool(true) => "true",
            JsonNode::Bool(false) => "false",
            JsonNode::Number(JsonNumber::Int(_)) => "integer",
            JsonNode::Number(JsonNumber::Float(_)) => "number",
            JsonNode::String(_) => "string",
            JsonNode::Array(_) => "array",
            JsonNode::Object(_) => "object",
        }
    }

    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, &Format::default(), 0);
        out
    }

    pub fn to_json_formatted(&self, format: &Format) -> String {
        let mut out = String::new();
        self.write(&mut out, format, 0);
        out
    }

    fn write(&self, out: &mut String, format: &Format, depth: usize) {
        let line = |out: &mut String, depth: usize| {
            out.push_str(&format.newline);
            for _ in 0..depth {
                out.push_str(&format.indent);
            }
        };
        match self {
            JsonNode::Null => out.push_str("null"),
            JsonNode::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            JsonNode::Number(JsonNumber::Int(i)) => out.push_str(&i.to_string()),
            JsonNode::Number(JsonNumber::Float(f)) => match serde_json::Number::from_f64(*f) {
                Some(n) => out.push_str(&n.to_string()),
                None => out.push_str("null"),
            },
            JsonNode::String(s) => out.push_str(&quote(s)),
            JsonNode::Array(items) if items.is_empty() => out.push_str("[]"),
            JsonNode::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    line(out, depth + 1);
                    item.write(out, format, depth + 1);
                }
                line(out, depth);
                out.push(']');
            }
            JsonNode::Object(members) if members.is_empty() => out.push_str("{}"),
            JsonNode::Object(members) => {
                out.push('{');
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    line(out, depth + 1);
                    out.push_str(&quote(k));
                    out.push(':');
                    out.push_str(&format.space);
                    v.write(out, format, depth + 1);
                }
                line(out, depth);
                out.push('}');
            }
        }
    }

    pub fn get(&self, loc: &[Step]) -> Option<&JsonNode> {
        loc.iter().try_fold(self, |node, step| match (node, step) {
            (JsonNode::Object(members), Step::Key(k)) => members.iter().find(|(name, _)| name == k).map(|(_, v)| v),
            (JsonNode::Array(items), Step::Index(i)) => items.get(*i),
            _ => None,
        })
    }

    pub fn get_mut(&mut self, loc: &[Step]) -> Option<&mut JsonNode> {
        let mut node = self;
        for step in loc {
            node = match (node, step) {
                (JsonNode::Object(members), Step::Key(k)) => {
                    members.iter_mut().find(|(name, _)| name == k).map(|(_, v)| v)?
                }
                (JsonNode::Array(items), Step::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Set or insert an object member.
    pub fn set_member(&mut self, key: &str, value: JsonNode) -> bool {
        let JsonNode::Object(members) = self else {
            return false;
        };
        match members.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => members.push((key.to_string(), value)),
        }
        true
    }

    /// Remove the node at `loc`. The root cannot be removed this way.
    fn remove_at(&mut self, loc: &[Step]) -> bool {
        let Some((last, parent)) = loc.split_last() else {
            return false;
        };
        match (self.get_mut(parent), last) {
            (Some(JsonNode::Object(members)), Step::Key(k)) => {
                let before = members.len();
                members.retain(|(name, _)| name != k);
                members.len() != before
            }
            (Some(JsonNode::Array(items)), Step::Index(i)) if *i < items.len() => {
                items.remove(*i);
                true
            }
            _ => false,
        }
    }

    /// Remove every location, deepest and right-most first so earlier
    /// removals never shift the addresses of later ones. Returns the count.
    pub fn remove_all(&mut self, mut locs: Vec<Location>) -> usize {
        locs.sort();
        locs.dedup();
        let mut removed = 0;
        for loc in locs.iter().rev() {
            if self.remove_at(loc) {
                removed += 1;
            }
        }
        removed
    }

    /// Run `f` on each location and return the results in the given order.
    ///
    /// Locations are visited deepest and right-most first so that an edit
    /// which changes an array's length cannot invalidate a location that has
    /// not been visited yet.
    pub fn update_each<R>(&mut self, locs: &[Location], mut f: impl FnMut(&mut JsonNode) -> R) -> Vec<Option<R>> {
        let mut order: Vec<usize> = (0..locs.len()).collect();
        order.sort_by(|&a, &b| locs[b].cmp(&locs[a]));
        let mut results: Vec<Option<R>> = (0..locs.len()).map(|_| None).collect();
        for i in order {
            results[i] = self.get_mut(&locs[i]).map(&mut f);
        }
        results
    }

    /// RFC 7396 merge patch.
    pub fn merge_patch(&mut self, patch: &JsonNode) {
        let JsonNode::Object(patch_members) = patch else {
            *self = patch.clone();
            return;
        };
        if !matches!(self, JsonNode::Object(_)) {
            *self = JsonNode::Object(Vec::new());
        }
        let JsonNode::Object(members) = self else {
            return;
        };
        for (key, value) in patch_members {
            if *value == JsonNode::Null {
                members.retain(|(k, _)| k != key);
                continue;
            }
            match members.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => existing.merge_patch(value),
                None => {
                    let mut fresh = JsonNode::Null;
                    fresh.merge_patch(value);
                    members.push((key.clone(), fresh));
                }
            }
        }
    }

    /// Reset a container to empty or a number to zero. Returns whether the
    /// node was of a clearable kind; strings, booleans and null are left as is.
    pub fn clear(&mut self) -> bool {
        match self {
            JsonNode::Array(items) => items.clear(),
            JsonNode::Object(members) => members.clear(),
            JsonNode::Number(n) => *n = JsonNumber::Int(0),
            _ => return false,
        }
        true
    }

    /// Apply `op` with `operand` to a number node. Integer arithmetic stays
    /// integral while it fits; anything else is computed in floating point.
    pub fn arith(&mut self, op: Arith, operand: JsonNumber) -> Option<Result<JsonNumber, String>> {
        let JsonNode::Number(current) = self else {
            return None;
        };
        let integral = match (*current, operand) {
            (JsonNumber::Int(a), JsonNumber::Int(b)) => match op {
                Arith::Add => a.checked_add(b),
                Arith::Mul => a.checked_mul(b),
            },
            _ => None,
        };
        let result = match integral {
            Some(i) => JsonNumber::Int(i),
            None => {
                let (a, b) = (current.as_f64(), operand.as_f64());
                let f = match op {
                    Arith::Add => a + b,
                    Arith::Mul => a * b,
                };
                if !f.is_finite() {
                    return Some(Err(format!("result {f} is not a finite number")));
                }
                JsonNumber::Float(f)
            }
        };
        *current = result;
        Some(Ok(result))
    }
}

/// Python-style clamped index used by array commands: negative counts from
/// the end, and out-of-range values are pulled to the nearest bound.
pub fn clamp_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let idx = if index < 0 { len + index } else { index };
    idx.clamp(0, len.max(1) - 1) as usize
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> JsonNode {
        JsonNode::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_preserves_member_order() {
        let d = doc(r#"{"name":"John","age":30,"email":"j@x"}"#);
        let JsonNode::Object(members) = &d else { panic!("not an object") };
        let keys: Vec<&str> = members.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "age", "email"]);
        assert_eq!(d.to_json(), r#"{"name":"John","age":30,"email":"j@x"}"#);
    }

    #[test]
    fn test_number_kinds() {
        assert_eq!(doc("42").type_name(), "integer");
        assert_eq!(doc("4.5").type_name(), "number");
        assert_eq!(doc("true").type_name(), "true");
        assert_eq!(doc("false").type_name(), "false");
        assert_eq!(doc("2.0").to_json(), "2.0");
        assert_eq!(doc("1").to_json(), "1");
    }

    #[test]
    fn test_formatted_output() {
        let d = doc(r#"{"a":1,"b":[true]}"#);
        let format = Format {
            indent: "  ".into(),
            newline: "\n".into(),
            space: " ".into(),
        };
        assert_eq!(d.to_json_formatted(&format), "{\n  \"a\": 1,\n  \"b\": [\n    true\n  ]\n}");
    }

    #[test]
    fn test_remove_all_handles_shifting_indices() {
        let mut d = doc("[0,1,2,3]");
        let removed = d.remove_all(vec![vec![Step::Index(1)], vec![Step::Index(3)], vec![Step::Index(1)]]);
        assert_eq!(removed, 2);
        assert_eq!(d.to_json(), "[0,2]");
    }

    #[test]
    fn test_merge_patch() {
        let mut d = doc(r#"{"a":"b","c":{"d":"e","f":"g"}}"#);
        d.merge_patch(&doc(r#"{"a":"z","c":{"f":null},"n":{"x":null,"y":1}}"#));
        assert_eq!(d.to_json(), r#"{"a":"z","c":{"d":"e"},"n":{"y":1}}"#);
    }

    #[test]
    fn test_clear_policy() {
        let mut arr = doc("[1,2]");
        assert!(arr.clear());
        assert_eq!(arr.to_json(), "[]");
        let mut num = doc("4.5");
        assert!(num.clear());
        assert_eq!(num.to_json(), "0");
        let mut s = doc("\"x\"");
        assert!(!s.clear());
        assert_eq!(s.to_json(), "\"x\"");
    }

    #[test]
    fn test_arith() {
        let mut n = doc("5");
        assert_eq!(n.arith(Arith::Mul, JsonNumber::Int(2)), Some(Ok(JsonNumber::Int(10))));
        assert_eq!(n.arith(Arith::Mul, JsonNumber::Float(0.25)), Some(Ok(JsonNumber::Float(2.5))));
        let mut big = JsonNode::Number(JsonNumber::Int(i64::MAX));
        assert!(matches!(big.arith(Arith::Add, JsonNumber::Int(1)), Some(Ok(JsonNumber::Float(_)))));
        assert!(doc("\"s\"").arith(Arith::Add, JsonNumber::Int(1)).is_none());
        let mut huge = doc("1e308");
        assert!(matches!(huge.arith(Arith::Mul, JsonNumber::Float(10.0)), Some(Err(_))));
    }

    #[test]
    fn test_update_each_preserves_result_order() {
        let mut d = doc("[[1],[2,3]]");
        let locs = vec![vec![Step::Index(0)], vec![Step::Index(1)]];
        let lens = d.update_each(&locs, |node| match node {
            JsonNode::Array(items) => {
                items.push(JsonNode::Null);
                items.len()
            }
            _ => 0,
        });
        assert_eq!(lens, vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-1, 3), 2);
        assert_eq!(clamp_index(10, 3), 2);
        assert_eq!(clamp_index(-10, 3), 0);
    }
}
