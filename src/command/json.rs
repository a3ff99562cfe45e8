use crate::command::{arg_to_i64, arg_to_str, get_json, upper};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::Reply;
use crate::store::KeyLock;
use crate::types::Value;
use crate::types::json::path::JsonPath;
use crate::types::json::{Arith, Format, JsonNode, clamp_index};
use bytes::Bytes;
use std::collections::HashSet;

fn parse_path(arg: &[u8]) -> KeelResult<JsonPath> {
    JsonPath::parse(arg_to_str(arg)?).map_err(|e| KeelError::Json(e.to_string()))
}

fn parse_value(arg: &[u8]) -> KeelResult<JsonNode> {
    JsonNode::parse(arg).map_err(KeelError::Json)
}

fn optional_path(arg: Option<&Bytes>) -> KeelResult<JsonPath> {
    arg.map_or_else(|| Ok(JsonPath::root()), |a| parse_path(a))
}

fn missing_key() -> KeelError {
    KeelError::generic("could not perform this operation on a key that doesn't exist")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// A missing key reads as Nil.
    Read,
    /// A missing key is an error.
    Write,
}

/// Run `f` on every node `path` matches in the document at `key`.
///
/// Returns `None` when the key is missing and `access` is `Read`. Each
/// match yields `None` when `f` declines the node (wrong kind).
fn each_match<R>(
    engine: &Engine,
    key: &[u8],
    path: &JsonPath,
    access: Access,
    mut f: impl FnMut(&mut JsonNode) -> KeelResult<Option<R>>,
) -> KeelResult<Option<Vec<Option<R>>>> {
    let mut lock = engine.keyspace().lock(key);
    let Some(doc) = get_json(&mut lock, key)? else {
        return match access {
            Access::Read => Ok(None),
            Access::Write => Err(missing_key()),
        };
    };
    let locs = path.locate(doc);
    // A failure on one match must leave the whole document untouched.
    let snapshot = matches!(access, Access::Write).then(|| doc.clone());
    let results = doc
        .update_each(&locs, &mut f)
        .into_iter()
        .map(|r| r.unwrap_or(Ok(None)))
        .collect::<KeelResult<Vec<_>>>();
    if results.is_err()
        && let Some(snapshot) = snapshot
    {
        *doc = snapshot;
    }
    results.map(Some)
}

fn integers(results: Option<Vec<Option<usize>>>) -> Reply {
    match results {
        None => Reply::Nil,
        Some(items) => Reply::array(
            items
                .into_iter()
                .map(|n| n.map_or(Reply::Nil, |n| Reply::integer(n as i64)))
                .collect(),
        ),
    }
}

/// A path not starting with `$` is in the legacy syntax, which selects a
/// single value instead of an array of matches.
fn is_legacy(raw: &[u8]) -> bool {
    !raw.starts_with(b"$")
}

/// The nodes `path` selects: all of them as a JSON array, or for a legacy
/// path the first one alone (`None` when nothing matches).
fn selected(doc: &JsonNode, path: &JsonPath, legacy: bool) -> Option<JsonNode> {
    let mut found = path.locate(doc).into_iter().filter_map(|loc| doc.get(&loc).cloned());
    if legacy {
        found.next()
    } else {
        Some(JsonNode::Array(found.collect()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetCondition {
    Always,
    Nx,
    Xx,
}

/// Set `value` at `path` in the document at `key`. Returns false when the
/// condition or the path shape prevents the write.
fn set_at(lock: &mut KeyLock<'_>, key: &[u8], path: &JsonPath, value: JsonNode, cond: SetCondition) -> KeelResult<bool> {
    let Some(doc) = get_json(lock, key)? else {
        if !path.is_root() {
            return Err(KeelError::generic("new objects must be created at the root"));
        }
        if cond == SetCondition::Xx {
            return Ok(false);
        }
        lock.set(key, Value::Json(value));
        return Ok(true);
    };

    let locs = path.locate(doc);
    if !locs.is_empty() {
        if cond == SetCondition::Nx {
            return Ok(false);
        }
        doc.update_each(&locs, |node| *node = value.clone());
        return Ok(true);
    }
    if cond == SetCondition::Xx {
        return Ok(false);
    }
    let Some((parent, member)) = path.parent_and_key() else {
        return Ok(false);
    };
    let parents = parent.locate(doc);
    let created = doc.update_each(&parents, |node| node.set_member(member, value.clone()));
    Ok(created.into_iter().any(|c| c == Some(true)))
}

/// JSON.SET key path value [NX|XX]
pub fn cmd_json_set(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path, value, cond) = match args {
        [key, path, value] => (key, path, value, SetCondition::Always),
        [key, path, value, flag] => {
            let cond = match upper(flag).as_str() {
                "NX" => SetCondition::Nx,
                "XX" => SetCondition::Xx,
                _ => return Err(KeelError::SyntaxError),
            };
            (key, path, value, cond)
        }
        _ => return Err(KeelError::arity("json.set")),
    };
    let path = parse_path(path)?;
    let value = parse_value(value)?;
    let mut lock = engine.keyspace().lock(key);
    let written = set_at(&mut lock, key, &path, value, cond)?;
    Ok(if written { Reply::ok() } else { Reply::Nil })
}

/// JSON.GET key [INDENT s] [NEWLINE s] [SPACE s] [path ...]
pub fn cmd_json_get(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, rest)) = args.split_first() else {
        return Err(KeelError::arity("json.get"));
    };
    let mut format = Format::default();
    let mut raw_paths = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let slot = match upper(&rest[i]).as_str() {
            "INDENT" => Some(&mut format.indent),
            "NEWLINE" => Some(&mut format.newline),
            "SPACE" => Some(&mut format.space),
            _ => None,
        };
        match slot {
            Some(slot) => {
                let text = rest.get(i + 1).ok_or(KeelError::SyntaxError)?;
                *slot = String::from_utf8_lossy(text).into_owned();
                i += 2;
            }
            None => {
                raw_paths.push(&rest[i]);
                i += 1;
            }
        }
    }
    // With no path the whole document comes back unwrapped.
    let legacy = raw_paths.iter().all(|p| is_legacy(p));
    let paths = raw_paths
        .iter()
        .map(|p| Ok((String::from_utf8_lossy(p).into_owned(), parse_path(p)?)))
        .collect::<KeelResult<Vec<_>>>()?;

    let mut lock = engine.keyspace().lock(key);
    let Some(doc) = get_json(&mut lock, key)? else {
        return Ok(Reply::Nil);
    };
    let doc: &JsonNode = doc;
    let node = match paths.as_slice() {
        [] => Some(doc.clone()),
        [(_, path)] => selected(doc, path, legacy),
        many => Some(JsonNode::Object(
            many.iter()
                .map(|(name, path)| (name.clone(), selected(doc, path, legacy).unwrap_or(JsonNode::Null)))
                .collect(),
        )),
    };
    Ok(Reply::from_optional_bytes(node.map(|n| n.to_json_formatted(&format))))
}

/// JSON.DEL key [path]; also serves JSON.FORGET.
pub fn cmd_json_del(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.del")),
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(doc) = get_json(&mut lock, key)? else {
        return Ok(Reply::integer(0));
    };
    if path.is_root() {
        lock.remove(key);
        return Ok(Reply::integer(1));
    }
    let locs = path.locate(doc);
    Ok(Reply::integer(doc.remove_all(locs) as i64))
}

/// JSON.MGET key [key ...] path
pub fn cmd_json_mget(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((path, keys)) = args.split_last().filter(|(_, keys)| !keys.is_empty()) else {
        return Err(KeelError::arity("json.mget"));
    };
    let legacy = is_legacy(path);
    let path = parse_path(path)?;
    let mut lock = engine.keyspace().lock_many(keys);
    let replies = keys
        .iter()
        .map(|key| match lock.get_value(key) {
            Some(Value::Json(doc)) => Reply::from_optional_bytes(selected(doc, &path, legacy).map(|n| n.to_json())),
            _ => Reply::Nil,
        })
        .collect();
    Ok(Reply::array(replies))
}

/// JSON.MSET key path value [key path value ...]
///
/// Every triple is validated before any is applied.
pub fn cmd_json_mset(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() || args.len() % 3 != 0 {
        return Err(KeelError::arity("json.mset"));
    }
    let triples = args
        .chunks(3)
        .map(|t| Ok((&t[0], parse_path(&t[1])?, parse_value(&t[2])?)))
        .collect::<KeelResult<Vec<_>>>()?;
    let keys: Vec<&Bytes> = triples.iter().map(|(k, _, _)| *k).collect();
    let mut lock = engine.keyspace().lock_many(&keys);

    let mut created: HashSet<&[u8]> = HashSet::new();
    for (key, path, _) in &triples {
        match lock.get_value(key) {
            Some(Value::Json(_)) => {}
            Some(_) => return Err(KeelError::WrongType),
            None if path.is_root() => {
                created.insert(&key[..]);
            }
            None if created.contains(&key[..]) => {}
            None => return Err(KeelError::generic("new objects must be created at the root")),
        }
    }
    for (key, path, value) in triples {
        set_at(&mut lock, key, &path, value, SetCondition::Always)?;
    }
    Ok(Reply::ok())
}

/// JSON.TYPE key [path]
pub fn cmd_json_type(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.type")),
    };
    let names = each_match(engine, key, &path, Access::Read, |node| Ok(Some(node.type_name())))?;
    Ok(match names {
        None => Reply::Nil,
        Some(names) if names.is_empty() => Reply::array(vec![Reply::Nil]),
        Some(names) => Reply::array(names.into_iter().flatten().map(Reply::bulk_string).collect()),
    })
}

/// JSON.ARRAPPEND key path value [value ...]
pub fn cmd_json_arrappend(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity("json.arrappend"));
    }
    let path = parse_path(&args[1])?;
    let values = args[2..].iter().map(|v| parse_value(v)).collect::<KeelResult<Vec<_>>>()?;
    let lens = each_match(engine, &args[0], &path, Access::Write, |node| {
        let JsonNode::Array(items) = node else {
            return Ok(None);
        };
        items.extend(values.iter().cloned());
        Ok(Some(items.len()))
    })?;
    Ok(integers(lens))
}

/// JSON.ARRINSERT key path index value [value ...]
pub fn cmd_json_arrinsert(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 4 {
        return Err(KeelError::arity("json.arrinsert"));
    }
    let path = parse_path(&args[1])?;
    let index = arg_to_i64(&args[2])?;
    let values = args[3..].iter().map(|v| parse_value(v)).collect::<KeelResult<Vec<_>>>()?;
    let lens = each_match(engine, &args[0], &path, Access::Write, |node| {
        let JsonNode::Array(items) = node else {
            return Ok(None);
        };
        let len = items.len() as i64;
        let at = if index < 0 { len + index } else { index };
        if !(0..=len).contains(&at) {
            return Err(KeelError::OutOfRange("array index out of range".into()));
        }
        let at = at as usize;
        items.splice(at..at, values.iter().cloned());
        Ok(Some(items.len()))
    })?;
    Ok(integers(lens))
}

/// Resolve an ARRINDEX `start`/`stop` pair into a half-open range. A stop
/// of zero, or one past the end, means "to the end".
fn search_range(start: i64, stop: i64, len: usize) -> (usize, usize) {
    let len_i = len as i64;
    let resolve = |v: i64| if v < 0 { (len_i + v).max(0) } else { v.min(len_i) };
    let lo = resolve(start);
    let hi = if stop == 0 { len_i } else { resolve(stop) };
    (lo as usize, hi.max(lo) as usize)
}

/// JSON.ARRINDEX key path value [start [stop]]
pub fn cmd_json_arrindex(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if !(3..=5).contains(&args.len()) {
        return Err(KeelError::arity("json.arrindex"));
    }
    let path = parse_path(&args[1])?;
    let needle = parse_value(&args[2])?;
    let start = args.get(3).map(|a| arg_to_i64(a)).transpose()?.unwrap_or(0);
    let stop = args.get(4).map(|a| arg_to_i64(a)).transpose()?.unwrap_or(0);
    let found = each_match(engine, &args[0], &path, Access::Read, |node| {
        let JsonNode::Array(items) = node else {
            return Ok(None);
        };
        let (lo, hi) = search_range(start, stop, items.len());
        let pos = items[lo..hi].iter().position(|item| *item == needle).map_or(-1, |p| (p + lo) as i64);
        Ok(Some(pos))
    })?;
    Ok(match found {
        None => Reply::Nil,
        Some(items) => Reply::array(items.into_iter().map(|p| p.map_or(Reply::Nil, Reply::integer)).collect()),
    })
}

/// JSON.ARRLEN key [path]
pub fn cmd_json_arrlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, rest @ ..] = args else {
        return Err(KeelError::arity("json.arrlen"));
    };
    if rest.len() > 1 {
        return Err(KeelError::arity("json.arrlen"));
    }
    let path = optional_path(rest.first())?;
    let lens = each_match(engine, key, &path, Access::Read, |node| match node {
        JsonNode::Array(items) => Ok(Some(items.len())),
        _ => Ok(None),
    })?;
    Ok(integers(lens))
}

/// JSON.ARRPOP key [path [index]]
pub fn cmd_json_arrpop(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() || args.len() > 3 {
        return Err(KeelError::arity("json.arrpop"));
    }
    let path = optional_path(args.get(1))?;
    let index = args.get(2).map(|a| arg_to_i64(a)).transpose()?.unwrap_or(-1);
    let popped = each_match(engine, &args[0], &path, Access::Write, |node| match node {
        JsonNode::Array(items) if !items.is_empty() => {
            let at = clamp_index(index, items.len());
            Ok(Some(items.remove(at).to_json()))
        }
        _ => Ok(None),
    })?;
    Ok(match popped {
        None => Reply::Nil,
        Some(items) => Reply::array(items.into_iter().map(Reply::from_optional_bytes).collect()),
    })
}

/// JSON.ARRTRIM key path start stop
pub fn cmd_json_arrtrim(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, path, start, stop] = args else {
        return Err(KeelError::arity("json.arrtrim"));
    };
    let path = parse_path(path)?;
    let (start, stop) = (arg_to_i64(start)?, arg_to_i64(stop)?);
    let lens = each_match(engine, key, &path, Access::Write, |node| {
        let JsonNode::Array(items) = node else {
            return Ok(None);
        };
        let len = items.len() as i64;
        let lo = if start < 0 { (len + start).max(0) } else { start };
        let hi = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if lo >= len || lo > hi {
            items.clear();
        } else {
            items.truncate(hi as usize + 1);
            items.drain(..lo as usize);
        }
        Ok(Some(items.len()))
    })?;
    Ok(integers(lens))
}

/// JSON.STRAPPEND key [path] value
pub fn cmd_json_strappend(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path, value) = match args {
        [key, value] => (key, JsonPath::root(), value),
        [key, path, value] => (key, parse_path(path)?, value),
        _ => return Err(KeelError::arity("json.strappend")),
    };
    let JsonNode::String(suffix) = parse_value(value)? else {
        return Err(KeelError::Json("expected a JSON string value".into()));
    };
    let lens = each_match(engine, key, &path, Access::Write, |node| {
        let JsonNode::String(s) = node else {
            return Ok(None);
        };
        s.push_str(&suffix);
        Ok(Some(s.len()))
    })?;
    Ok(integers(lens))
}

/// JSON.STRLEN key [path]
pub fn cmd_json_strlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.strlen")),
    };
    let lens = each_match(engine, key, &path, Access::Read, |node| match node {
        JsonNode::String(s) => Ok(Some(s.len())),
        _ => Ok(None),
    })?;
    Ok(integers(lens))
}

fn num_op(engine: &Engine, args: &[Bytes], op: Arith, cmd: &str) -> KeelResult<Reply> {
    let [key, path, operand] = args else {
        return Err(KeelError::arity(cmd));
    };
    let path = parse_path(path)?;
    let JsonNode::Number(operand) = parse_value(operand)? else {
        return Err(KeelError::Json("expected a numeric value".into()));
    };
    let results = each_match(engine, key, &path, Access::Write, |node| match node.arith(op, operand) {
        None => Ok(None),
        Some(Ok(n)) => Ok(Some(n)),
        Some(Err(msg)) => Err(KeelError::Json(msg)),
    })?
    .unwrap_or_default();
    let values = results
        .into_iter()
        .map(|n| n.map_or(JsonNode::Null, JsonNode::Number))
        .collect();
    Ok(Reply::bulk_string(JsonNode::Array(values).to_json()))
}

/// JSON.NUMINCRBY key path number
pub fn cmd_json_numincrby(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    num_op(engine, args, Arith::Add, "json.numincrby")
}

/// JSON.NUMMULTBY key path number
pub fn cmd_json_nummultby(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    num_op(engine, args, Arith::Mul, "json.nummultby")
}

/// JSON.OBJKEYS key [path]
pub fn cmd_json_objkeys(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.objkeys")),
    };
    let keys = each_match(engine, key, &path, Access::Read, |node| match node {
        JsonNode::Object(members) => Ok(Some(members.iter().map(|(k, _)| Reply::bulk_string(k.clone())).collect::<Vec<_>>())),
        _ => Ok(None),
    })?;
    Ok(match keys {
        None => Reply::Nil,
        Some(items) => Reply::array(items.into_iter().map(|k| k.map_or(Reply::Nil, Reply::array)).collect()),
    })
}

/// JSON.OBJLEN key [path]
pub fn cmd_json_objlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.objlen")),
    };
    let lens = each_match(engine, key, &path, Access::Read, |node| match node {
        JsonNode::Object(members) => Ok(Some(members.len())),
        _ => Ok(None),
    })?;
    Ok(integers(lens))
}

/// JSON.TOGGLE key path
pub fn cmd_json_toggle(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, path] = args else {
        return Err(KeelError::arity("json.toggle"));
    };
    let path = parse_path(path)?;
    let flipped = each_match(engine, key, &path, Access::Write, |node| match node {
        JsonNode::Bool(b) => {
            *b = !*b;
            Ok(Some(*b as usize))
        }
        _ => Ok(None),
    })?;
    Ok(integers(flipped))
}

/// JSON.CLEAR key [path]
pub fn cmd_json_clear(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, path) = match args {
        [key] => (key, JsonPath::root()),
        [key, path] => (key, parse_path(path)?),
        _ => return Err(KeelError::arity("json.clear")),
    };
    let cleared = each_match(engine, key, &path, Access::Write, |node| Ok(node.clear().then_some(())))?
        .unwrap_or_default();
    Ok(Reply::integer(cleared.iter().flatten().count() as i64))
}

/// JSON.MERGE key path value
pub fn cmd_json_merge(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, path, patch] = args else {
        return Err(KeelError::arity("json.merge"));
    };
    let path = parse_path(path)?;
    let patch = parse_value(patch)?;

    let mut lock = engine.keyspace().lock(key);
    let Some(doc) = get_json(&mut lock, key)? else {
        if !path.is_root() {
            return Err(KeelError::generic("new objects must be created at the root"));
        }
        let mut fresh = JsonNode::Null;
        fresh.merge_patch(&patch);
        lock.set(key, Value::Json(fresh));
        return Ok(Reply::ok());
    };

    let locs = path.locate(doc);
    if !locs.is_empty() {
        doc.update_each(&locs, |node| node.merge_patch(&patch));
        return Ok(Reply::ok());
    }
    if patch != JsonNode::Null
        && let Some((parent, member)) = path.parent_and_key()
    {
        let parents = parent.locate(doc);
        doc.update_each(&parents, |node| {
            let mut fresh = JsonNode::Null;
            fresh.merge_patch(&patch);
            node.set_member(member, fresh)
        });
    }
    Ok(Reply::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_range() {
        assert_eq!(search_range(0, 0, 5), (0, 5));
        assert_eq!(search_range(-2, 0, 5), (3, 5));
        assert_eq!(search_range(1, 3, 5), (1, 3));
        assert_eq!(search_range(4, 2, 5), (4, 4));
        assert_eq!(search_range(-10, 100, 5), (0, 5));
    }

    #[test]
    fn test_set_requires_root_for_new_key() {
        let engine = Engine::new(Default::default());
        let mut lock = engine.keyspace().lock(b"doc");
        let nested = JsonPath::parse("$.a").unwrap();
        assert!(set_at(&mut lock, b"doc", &nested, JsonNode::Null, SetCondition::Always).is_err());
        assert!(!set_at(&mut lock, b"doc", &JsonPath::root(), JsonNode::Null, SetCondition::Xx).unwrap());
        assert!(set_at(&mut lock, b"doc", &JsonPath::root(), JsonNode::Object(Vec::new()), SetCondition::Nx).unwrap());
        assert!(set_at(&mut lock, b"doc", &nested, JsonNode::Bool(true), SetCondition::Nx).unwrap());
        assert!(!set_at(&mut lock, b"doc", &nested, JsonNode::Bool(false), SetCondition::Nx).unwrap());
    }

    #[test]
    fn test_failed_mutation_leaves_document_unchanged() {
        let engine = Engine::new(Default::default());
        let b = |s: &str| Bytes::copy_from_slice(s.as_bytes());
        engine.execute("JSON.SET", &[b("doc"), b("$"), b(r#"{"a":[1,2,3],"b":[1]}"#)]);
        let reply = engine.execute("JSON.ARRINSERT", &[b("doc"), b("$.*"), b("2"), b("9")]);
        assert!(reply.is_error());
        assert_eq!(
            engine.execute("JSON.GET", &[b("doc")]),
            Reply::bulk_string(r#"{"a":[1,2,3],"b":[1]}"#)
        );
    }
}
