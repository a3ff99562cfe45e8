use crate::command::{ScanOptions, arg_to_i64, parse_cursor, parse_scan_options, scan_reply};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::glob::glob_match;
use crate::reply::Reply;
use crate::scan;
use crate::store::entry::now_millis;
use crate::types::hash::ExpireCondition;
use bytes::Bytes;

pub fn cmd_del(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() {
        return Err(KeelError::arity("del"));
    }
    let mut lock = engine.keyspace().lock_many(args);
    let removed = args.iter().filter(|k| lock.remove(k).is_some()).count();
    Ok(Reply::integer(removed as i64))
}

pub fn cmd_exists(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() {
        return Err(KeelError::arity("exists"));
    }
    let mut lock = engine.keyspace().lock_many(args);
    let found = args.iter().filter(|k| lock.contains(k)).count();
    Ok(Reply::integer(found as i64))
}

pub fn cmd_type(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("type"));
    };
    let mut lock = engine.keyspace().lock(key);
    let name = lock.get_value(key).map_or("none", |v| v.type_name());
    Ok(Reply::simple_string(name))
}

/// Parse trailing `NX|XX|GT|LT` flags of the key-level expire commands.
fn parse_conditions(flags: &[Bytes]) -> KeelResult<Vec<ExpireCondition>> {
    let mut conditions = Vec::with_capacity(flags.len());
    for flag in flags {
        let cond = std::str::from_utf8(flag)
            .ok()
            .and_then(ExpireCondition::parse)
            .ok_or_else(|| KeelError::generic(format!("Unsupported option {}", String::from_utf8_lossy(flag))))?;
        conditions.push(cond);
    }
    let has = |c: ExpireCondition| conditions.contains(&c);
    if has(ExpireCondition::Nx) && (has(ExpireCondition::Xx) || has(ExpireCondition::Gt) || has(ExpireCondition::Lt)) {
        return Err(KeelError::generic("NX and XX, GT or LT options at the same time are not compatible"));
    }
    if has(ExpireCondition::Gt) && has(ExpireCondition::Lt) {
        return Err(KeelError::generic("GT and LT options at the same time are not compatible"));
    }
    Ok(conditions)
}

fn expire_generic(engine: &Engine, args: &[Bytes], cmd: &str, unit_ms: i64, absolute: bool) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity(cmd));
    }
    let key = &args[0];
    let amount = arg_to_i64(&args[1])?;
    let conditions = parse_conditions(&args[2..])?;

    let now = now_millis();
    let base = if absolute { 0 } else { now as i64 };
    let at = amount
        .checked_mul(unit_ms)
        .and_then(|ms| ms.checked_add(base))
        .ok_or_else(|| KeelError::generic(format!("invalid expire time in '{cmd}' command")))?;

    let mut lock = engine.keyspace().lock(key);
    let Some(entry) = lock.get(key) else {
        return Ok(Reply::integer(0));
    };
    let at = at.max(0) as u64;
    if !conditions.iter().all(|c| c.allows(entry.expires_at, at)) {
        return Ok(Reply::integer(0));
    }
    if at <= now {
        lock.remove(key);
    } else {
        entry.expires_at = Some(at);
    }
    Ok(Reply::integer(1))
}

pub fn cmd_expire(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expire_generic(engine, args, "expire", 1000, false)
}

pub fn cmd_pexpire(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expire_generic(engine, args, "pexpire", 1, false)
}

pub fn cmd_expireat(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expire_generic(engine, args, "expireat", 1000, true)
}

pub fn cmd_pexpireat(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expire_generic(engine, args, "pexpireat", 1, true)
}

pub fn cmd_ttl(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("ttl"));
    };
    let mut lock = engine.keyspace().lock(key);
    Ok(Reply::integer(lock.get(key).map_or(-2, |e| e.ttl_seconds())))
}

pub fn cmd_pttl(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("pttl"));
    };
    let mut lock = engine.keyspace().lock(key);
    Ok(Reply::integer(lock.get(key).map_or(-2, |e| e.ttl_millis())))
}

fn expiretime_generic(engine: &Engine, args: &[Bytes], cmd: &str, unit_ms: u64) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity(cmd));
    };
    let mut lock = engine.keyspace().lock(key);
    let reply = match lock.get(key) {
        None => -2,
        Some(entry) => entry.expires_at.map_or(-1, |at| (at / unit_ms) as i64),
    };
    Ok(Reply::integer(reply))
}

pub fn cmd_expiretime(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expiretime_generic(engine, args, "expiretime", 1000)
}

pub fn cmd_pexpiretime(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    expiretime_generic(engine, args, "pexpiretime", 1)
}

pub fn cmd_persist(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("persist"));
    };
    let mut lock = engine.keyspace().lock(key);
    let removed = lock.get(key).is_some_and(|e| e.expires_at.take().is_some());
    Ok(Reply::integer(removed as i64))
}

pub fn cmd_keys(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [pattern] = args else {
        return Err(KeelError::arity("keys"));
    };
    let keys = engine
        .keyspace()
        .snapshot_keys()
        .into_iter()
        .filter(|(name, _)| glob_match(pattern, name))
        .map(|(name, _)| Reply::bulk_string(name.to_vec()))
        .collect();
    Ok(Reply::array(keys))
}

pub fn cmd_scan(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some(cursor) = args.first() else {
        return Err(KeelError::arity("scan"));
    };
    let cursor = parse_cursor(cursor)?;
    let opts: ScanOptions = parse_scan_options(&args[1..], engine.config().scan_default_count, &["TYPE"])?;

    let keys = engine.keyspace().scan_from(cursor);
    let (next, page) = scan::page_positioned(keys, |entry| &entry.0[..], opts.count);
    let items = page
        .into_iter()
        .filter(|(name, kind)| {
            opts.matches(name) && opts.type_filter.as_deref().is_none_or(|t| t.eq_ignore_ascii_case(kind))
        })
        .map(|(name, _)| Reply::bulk_string(name.to_vec()))
        .collect();
    Ok(scan_reply(next, items))
}

pub fn cmd_rename(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [src, dst] = args else {
        return Err(KeelError::arity("rename"));
    };
    let mut lock = engine.keyspace().lock_many(args);
    let entry = lock.remove(src).ok_or_else(|| KeelError::generic("no such key"))?;
    lock.insert(dst.clone(), entry);
    Ok(Reply::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(list: &[&'static str]) -> Vec<Bytes> {
        list.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[test]
    fn test_parse_conditions() {
        assert_eq!(parse_conditions(&flags(&["xx", "GT"])).unwrap(), vec![ExpireCondition::Xx, ExpireCondition::Gt]);
        assert!(parse_conditions(&flags(&["NX", "XX"])).is_err());
        assert!(parse_conditions(&flags(&["GT", "LT"])).is_err());
        assert!(parse_conditions(&flags(&["SOON"])).is_err());
    }
}
