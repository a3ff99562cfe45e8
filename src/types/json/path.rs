//! JSONPath parsing and evaluation.
//!
//! Supported syntax: `$`, `.name`, `['name']` / `["name"]` (optionally
//! several, comma separated), `[n]` with negative indices, `[n1,n2]`,
//! `[start:end:step]`, `.*` / `[*]`, and recursive descent with `..`.
//! Paths without a leading `$` are read as if they had one.

use super::JsonNode;

/// One step from a node to a child.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// The concrete address of a node within a document.
pub type Location = Vec<Step>;

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Keys(Vec<String>),
    Indices(Vec<i64>),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub selector: Selector,
    /// Apply the selector to the node and every descendant (`..`).
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("JSONPath syntax error at offset {0}")]
    Syntax(usize),
    #[error("JSONPath filter expressions are not supported")]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err(&self) -> PathError {
        PathError::Syntax(self.pos)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn dotted_name(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b'.' | b'[' | b']') {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.err());
        }
        String::from_utf8(self.src[start..self.pos].to_vec()).map_err(|_| PathError::Syntax(start))
    }

    fn quoted(&mut self) -> Result<String, PathError> {
        let Some(quote) = self.peek() else {
            return Err(self.err());
        };
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err()),
                Some(b'\\') => {
                    self.pos += 1;
                    let c = self.peek().ok_or_else(|| self.err())?;
                    out.push(c);
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).map_err(|_| self.err())
    }

    fn integer(&mut self) -> Result<Option<i64>, PathError> {
        self.skip_spaces();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).map_err(|_| PathError::Syntax(start))?;
        let n = text.parse().map_err(|_| PathError::Syntax(start))?;
        self.skip_spaces();
        Ok(Some(n))
    }

    /// Parse the inside of `[...]`; the `[` is already consumed.
    fn bracket(&mut self) -> Result<Selector, PathError> {
        self.skip_spaces();
        let selector = match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                Selector::Wildcard
            }
            Some(b'?') => return Err(PathError::Unsupported),
            Some(b'\'') | Some(b'"') => {
                let mut keys = vec![self.quoted()?];
                self.skip_spaces();
                while self.eat(b',') {
                    self.skip_spaces();
                    keys.push(self.quoted()?);
                    self.skip_spaces();
                }
                Selector::Keys(keys)
            }
            _ => {
                let first = self.integer()?;
                if self.eat(b':') {
                    let end = self.integer()?;
                    let step = if self.eat(b':') { self.integer()?.unwrap_or(1) } else { 1 };
                    if step == 0 {
                        return Err(self.err());
                    }
                    Selector::Slice { start: first, end, step }
                } else {
                    let mut indices = vec![first.ok_or_else(|| self.err())?];
                    while self.eat(b',') {
                        indices.push(self.integer()?.ok_or_else(|| self.err())?);
                    }
                    Selector::Indices(indices)
                }
            }
        };
        self.skip_spaces();
        if !self.eat(b']') {
            return Err(self.err());
        }
        Ok(selector)
    }
}

impl JsonPath {
    pub fn parse(text: &str) -> Result<JsonPath, PathError> {
        let mut p = Parser { src: text.as_bytes(), pos: 0 };
        p.eat(b'$');
        let mut segments = Vec::new();

        // A legacy path may start straight with a member name.
        if !matches!(p.peek(), None | Some(b'.') | Some(b'[')) {
            segments.push(Segment {
                selector: Selector::Keys(vec![p.dotted_name()?]),
                recursive: false,
            });
        }

        while let Some(c) = p.peek() {
            p.pos += 1;
            let segment = match c {
                b'.' => {
                    let recursive = p.eat(b'.');
                    let selector = if p.eat(b'*') {
                        Selector::Wildcard
                    } else if p.eat(b'[') {
                        p.bracket()?
                    } else if p.peek().is_none() && !recursive && segments.is_empty() {
                        // A lone "." is the legacy spelling of the root.
                        break;
                    } else {
                        Selector::Keys(vec![p.dotted_name()?])
                    };
                    Segment { selector, recursive }
                }
                b'[' => Segment {
                    selector: p.bracket()?,
                    recursive: false,
                },
                _ => return Err(PathError::Syntax(p.pos - 1)),
            };
            segments.push(segment);
        }
        Ok(JsonPath { segments })
    }

    /// The path `$`.
    pub fn root() -> JsonPath {
        JsonPath { segments: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path minus its last segment, and that segment's member name if
    /// it names exactly one object member non-recursively.
    pub fn parent_and_key(&self) -> Option<(JsonPath, &str)> {
        let (last, init) = self.segments.split_last()?;
        match &last.selector {
            Selector::Keys(keys) if keys.len() == 1 && !last.recursive => Some((
                JsonPath {
                    segments: init.to_vec(),
                },
                keys[0].as_str(),
            )),
            _ => None,
        }
    }

    /// Locations of every node the path matches, in match order.
    pub fn locate(&self, root: &JsonNode) -> Vec<Location> {
        let mut current: Vec<(Location, &JsonNode)> = vec![(Vec::new(), root)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (loc, node) in &current {
                if segment.recursive {
                    descend(loc, node, &segment.selector, &mut next);
                } else {
                    select(loc, node, &segment.selector, &mut next);
                }
            }
            current = next;
        }
        current.into_iter().map(|(loc, _)| loc).collect()
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { len as i64 + i } else { i };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

fn slice_indices(start: Option<i64>, end: Option<i64>, step: i64, len: usize) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| v.clamp(lo, hi);
    let resolve = |v: i64| if v < 0 { v + len } else { v };
    if step > 0 {
        let s = clamp(start.map_or(0, resolve), 0, len);
        let e = clamp(end.map_or(len, resolve), 0, len);
        (s..e).step_by(step as usize).map(|i| i as usize).collect()
    } else {
        let s = clamp(start.map_or(len - 1, resolve), -1, len - 1);
        let e = clamp(end.map_or(-1, resolve), -1, len - 1);
        let mut out = Vec::new();
        let mut i = s;
        while i > e {
            out.push(i as usize);
            i += step;
        }
        out
    }
}

fn child<'a>(loc: &Location, step: Step, node: &'a JsonNode, out: &mut Vec<(Location, &'a JsonNode)>) {
    let mut loc = loc.clone();
    loc.push(step);
    out.push((loc, node));
}

fn select<'a>(loc: &Location, node: &'a JsonNode, selector: &Selector, out: &mut Vec<(Location, &'a JsonNode)>) {
    match (selector, node) {
        (Selector::Keys(keys), JsonNode::Object(members)) => {
            for key in keys {
                if let Some((k, v)) = members.iter().find(|(k, _)| k == key) {
                    child(loc, Step::Key(k.clone()), v, out);
                }
            }
        }
        (Selector::Indices(indices), JsonNode::Array(items)) => {
            for &i in indices {
                if let Some(idx) = normalize_index(i, items.len()) {
                    child(loc, Step::Index(idx), &items[idx], out);
                }
            }
        }
        (Selector::Slice { start, end, step }, JsonNode::Array(items)) => {
            for idx in slice_indices(*start, *end, *step, items.len()) {
                child(loc, Step::Index(idx), &items[idx], out);
            }
        }
        (Selector::Wildcard, JsonNode::Array(items)) => {
            for (idx, item) in items.iter().enumerate() {
                child(loc, Step::Index(idx), item, out);
            }
        }
        (Selector::Wildcard, JsonNode::Object(members)) => {
            for (k, v) in members {
                child(loc, Step::Key(k.clone()), v, out);
            }
        }
        _ => {}
    }
}

/// Apply `selector` to `node` and, in pre-order, to every descendant.
fn descend<'a>(loc: &Location, node: &'a JsonNode, selector: &Selector, out: &mut Vec<(Location, &'a JsonNode)>) {
    select(loc, node, selector, out);
    match node {
        JsonNode::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let mut sub = loc.clone();
                sub.push(Step::Index(idx));
                descend(&sub, item, selector, out);
            }
        }
        JsonNode::Object(members) => {
            for (k, v) in members {
                let mut sub = loc.clone();
                sub.push(Step::Key(k.clone()));
                descend(&sub, v, selector, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> JsonNode {
        JsonNode::parse(text.as_bytes()).unwrap()
    }

    fn locs(path: &str, text: &str) -> Vec<Location> {
        JsonPath::parse(path).unwrap().locate(&doc(text))
    }

    #[test]
    fn test_root_forms() {
        assert!(JsonPath::parse("$").unwrap().is_root());
        assert!(JsonPath::parse(".").unwrap().is_root());
        assert_eq!(JsonPath::parse("a.b").unwrap(), JsonPath::parse("$.a.b").unwrap());
    }

    #[test]
    fn test_dotted_and_bracketed_keys() {
        let text = r#"{"a":{"b c":1,"d":2}}"#;
        assert_eq!(locs("$.a.d", text), vec![vec![Step::Key("a".into()), Step::Key("d".into())]]);
        assert_eq!(locs("$['a'][\"b c\"]", text).len(), 1);
        assert_eq!(locs("$.a['b c','d']", text).len(), 2);
        assert!(locs("$.missing", text).is_empty());
    }

    #[test]
    fn test_indices_and_slices() {
        let text = "[0,1,2,3,4]";
        assert_eq!(locs("$[-1]", text), vec![vec![Step::Index(4)]]);
        assert_eq!(locs("$[0,2]", text).len(), 2);
        assert_eq!(locs("$[1:3]", text), vec![vec![Step::Index(1)], vec![Step::Index(2)]]);
        assert_eq!(locs("$[::2]", text).len(), 3);
        assert_eq!(locs("$[::-1]", text)[0], vec![Step::Index(4)]);
        assert!(locs("$[9]", text).is_empty());
    }

    #[test]
    fn test_wildcards_and_recursion() {
        let text = r#"{"a":{"x":1},"b":[{"x":2}],"x":3}"#;
        assert_eq!(locs("$.*", text).len(), 3);
        assert_eq!(locs("$..x", text).len(), 3);
        assert_eq!(locs("$.b[*].x", text), vec![vec![Step::Key("b".into()), Step::Index(0), Step::Key("x".into())]]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(JsonPath::parse("$[?(@.a>1)]"), Err(PathError::Unsupported));
        assert!(JsonPath::parse("$[1").is_err());
        assert!(JsonPath::parse("$.a]").is_err());
        assert!(JsonPath::parse("$[::0]").is_err());
    }

    #[test]
    fn test_parent_and_key() {
        let path = JsonPath::parse("$.a.new").unwrap();
        let (parent, key) = path.parent_and_key().unwrap();
        assert_eq!(key, "new");
        assert_eq!(parent, JsonPath::parse("$.a").unwrap());
        assert!(JsonPath::parse("$..a").unwrap().parent_and_key().is_none());
    }
}
