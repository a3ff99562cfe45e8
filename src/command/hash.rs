use crate::command::{
    arg_to_f64, arg_to_i64, arg_to_random_count, arg_to_usize, get_hash, hash_or_create, is_flag, parse_cursor, parse_scan_options, scan_reply,
};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::{Reply, format_double};
use crate::scan;
use crate::store::entry::now_millis;
use crate::types::hash::ExpireCondition;
use bytes::Bytes;
use rand::Rng;
use rand::seq::{IteratorRandom, SliceRandom};

pub fn cmd_hset(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(KeelError::arity("hset"));
    }
    let key = &args[0];
    let mut lock = engine.keyspace().lock(key);
    let hash = hash_or_create(&mut lock, key)?;
    let added = args[1..]
        .chunks(2)
        .filter(|pair| hash.set(&pair[0], pair[1].to_vec()))
        .count();
    Ok(Reply::integer(added as i64))
}

pub fn cmd_hsetnx(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field, value] = args else {
        return Err(KeelError::arity("hsetnx"));
    };
    let mut lock = engine.keyspace().lock(key);
    let hash = hash_or_create(&mut lock, key)?;
    Ok(Reply::integer(hash.setnx(field, value.to_vec()) as i64))
}

pub fn cmd_hget(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field] = args else {
        return Err(KeelError::arity("hget"));
    };
    let mut lock = engine.keyspace().lock(key);
    let value = get_hash(&mut lock, key)?.and_then(|h| h.get(field).map(<[u8]>::to_vec));
    Ok(Reply::from_optional_bytes(value))
}

pub fn cmd_hmget(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity("hmget"));
    }
    let key = &args[0];
    let mut lock = engine.keyspace().lock(key);
    let hash = get_hash(&mut lock, key)?;
    let values = args[1..]
        .iter()
        .map(|field| Reply::from_optional_bytes(hash.as_ref().and_then(|h| h.get(field))))
        .collect();
    Ok(Reply::array(values))
}

pub fn cmd_hdel(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity("hdel"));
    }
    let key = &args[0];
    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(Reply::integer(0));
    };
    let removed = args[1..].iter().filter(|f| hash.del(f)).count();
    lock.remove_if_empty(key);
    Ok(Reply::integer(removed as i64))
}

pub fn cmd_hexists(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field] = args else {
        return Err(KeelError::arity("hexists"));
    };
    let mut lock = engine.keyspace().lock(key);
    let exists = get_hash(&mut lock, key)?.is_some_and(|h| h.exists(field));
    Ok(Reply::integer(exists as i64))
}

pub fn cmd_hlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("hlen"));
    };
    let mut lock = engine.keyspace().lock(key);
    let len = get_hash(&mut lock, key)?.map_or(0, |h| h.len());
    Ok(Reply::integer(len as i64))
}

pub fn cmd_hstrlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field] = args else {
        return Err(KeelError::arity("hstrlen"));
    };
    let mut lock = engine.keyspace().lock(key);
    let len = get_hash(&mut lock, key)?
        .and_then(|h| h.get(field).map(<[u8]>::len))
        .unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

#[derive(Clone, Copy)]
enum Listing {
    Keys,
    Values,
    Both,
}

fn list_hash(engine: &Engine, args: &[Bytes], cmd: &str, listing: Listing) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity(cmd));
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(Reply::array(Vec::new()));
    };
    let mut items = Vec::new();
    for (field, value) in hash.iter() {
        if matches!(listing, Listing::Keys | Listing::Both) {
            items.push(Reply::bulk_string(field));
        }
        if matches!(listing, Listing::Values | Listing::Both) {
            items.push(Reply::bulk_string(value));
        }
    }
    Ok(Reply::array(items))
}

pub fn cmd_hkeys(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    list_hash(engine, args, "hkeys", Listing::Keys)
}

pub fn cmd_hvals(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    list_hash(engine, args, "hvals", Listing::Values)
}

pub fn cmd_hgetall(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    list_hash(engine, args, "hgetall", Listing::Both)
}

pub fn cmd_hincrby(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field, delta] = args else {
        return Err(KeelError::arity("hincrby"));
    };
    let delta = arg_to_i64(delta)?;
    let mut lock = engine.keyspace().lock(key);
    let hash = hash_or_create(&mut lock, key)?;
    let result = hash.incr_by(field, delta);
    lock.remove_if_empty(key);
    Ok(Reply::integer(result.map_err(KeelError::generic)?))
}

pub fn cmd_hincrbyfloat(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, field, delta] = args else {
        return Err(KeelError::arity("hincrbyfloat"));
    };
    let delta = arg_to_f64(delta)?;
    let mut lock = engine.keyspace().lock(key);
    let hash = hash_or_create(&mut lock, key)?;
    let result = hash.incr_by_float(field, delta);
    lock.remove_if_empty(key);
    let value = result.map_err(KeelError::generic)?;
    Ok(Reply::bulk_string(format_double(value)))
}

/// HRANDFIELD key [count [WITHVALUES]]
pub fn cmd_hrandfield(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() || args.len() > 3 {
        return Err(KeelError::arity("hrandfield"));
    }
    let key = &args[0];
    let count = args.get(1).map(|c| arg_to_random_count(c)).transpose()?;
    let with_values = match args.get(2) {
        Some(flag) if is_flag(flag, "WITHVALUES") => true,
        Some(_) => return Err(KeelError::SyntaxError),
        None => false,
    };

    let mut lock = engine.keyspace().lock(key);
    let hash = get_hash(&mut lock, key)?;
    let mut rng = rand::thread_rng();

    let Some(count) = count else {
        let field = hash.and_then(|h| h.iter().choose(&mut rng).map(|(f, _)| f.to_vec()));
        return Ok(Reply::from_optional_bytes(field));
    };
    let Some(hash) = hash.filter(|h| !h.is_empty()) else {
        return Ok(Reply::array(Vec::new()));
    };

    let picked: Vec<(&[u8], &[u8])> = if count >= 0 {
        let mut picked = hash.iter().choose_multiple(&mut rng, (count as usize).min(hash.len()));
        // choose_multiple does not randomize the order of what it keeps.
        picked.shuffle(&mut rng);
        picked
    } else {
        let all: Vec<(&[u8], &[u8])> = hash.iter().collect();
        (0..count.unsigned_abs())
            .map(|_| all[rng.gen_range(0..all.len())])
            .collect()
    };

    let mut items = Vec::with_capacity(picked.len() * if with_values { 2 } else { 1 });
    for (field, value) in picked {
        items.push(Reply::bulk_string(field));
        if with_values {
            items.push(Reply::bulk_string(value));
        }
    }
    Ok(Reply::array(items))
}

/// HSCAN key cursor [MATCH pattern] [COUNT count] [NOVALUES]
pub fn cmd_hscan(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity("hscan"));
    }
    let key = &args[0];
    let cursor = parse_cursor(&args[1])?;
    let opts = parse_scan_options(&args[2..], engine.config().scan_default_count, &["NOVALUES"])?;

    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(scan_reply(0, Vec::new()));
    };
    let (next, page) = scan::page(hash.iter(), |entry| entry.0, cursor, opts.count);
    let mut items = Vec::new();
    for (field, value) in page.into_iter().filter(|(f, _)| opts.matches(f)) {
        items.push(Reply::bulk_string(field));
        if !opts.novalues {
            items.push(Reply::bulk_string(value));
        }
    }
    Ok(scan_reply(next, items))
}

/// Parse `FIELDS numfields field...` starting at `args[0]`.
fn parse_fields<'a>(args: &'a [Bytes], cmd: &str) -> KeelResult<&'a [Bytes]> {
    match args.split_first() {
        Some((kw, rest)) if is_flag(kw, "FIELDS") => {
            let Some((n, fields)) = rest.split_first() else {
                return Err(KeelError::arity(cmd));
            };
            let n = arg_to_usize(n)?;
            if n == 0 || n != fields.len() {
                return Err(KeelError::generic(
                    "Parameter `numFields` should be greater than 0 and match the number of arguments",
                ));
            }
            Ok(fields)
        }
        _ => Err(KeelError::generic("Mandatory argument FIELDS is missing or not at the right position")),
    }
}

fn all_missing(fields: &[Bytes]) -> Reply {
    Reply::array(fields.iter().map(|_| Reply::integer(-2)).collect())
}

/// Shared body of HEXPIRE, HPEXPIRE, HEXPIREAT and HPEXPIREAT.
fn hexpire_generic(engine: &Engine, args: &[Bytes], cmd: &str, unit_ms: i64, absolute: bool) -> KeelResult<Reply> {
    if args.len() < 4 {
        return Err(KeelError::arity(cmd));
    }
    let key = &args[0];
    let amount = arg_to_i64(&args[1])?;
    let (condition, rest) = match std::str::from_utf8(&args[2]).ok().and_then(ExpireCondition::parse) {
        Some(cond) => (cond, &args[3..]),
        None => (ExpireCondition::Always, &args[2..]),
    };
    let fields = parse_fields(rest, cmd)?;

    let now = now_millis();
    let invalid = || KeelError::generic(format!("invalid expire time in '{cmd}' command"));
    if amount < 0 {
        return Err(invalid());
    }
    let at = amount
        .checked_mul(unit_ms)
        .and_then(|ms| ms.checked_add(if absolute { 0 } else { now as i64 }))
        .ok_or_else(invalid)? as u64;

    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(all_missing(fields));
    };
    let codes = fields
        .iter()
        .map(|f| Reply::integer(hash.expire_field(f, at, condition, now).code()))
        .collect();
    // A hash emptied by field expiry stays behind as an empty hash.
    Ok(Reply::array(codes))
}

pub fn cmd_hexpire(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    hexpire_generic(engine, args, "hexpire", 1000, false)
}

pub fn cmd_hpexpire(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    hexpire_generic(engine, args, "hpexpire", 1, false)
}

pub fn cmd_hexpireat(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    hexpire_generic(engine, args, "hexpireat", 1000, true)
}

pub fn cmd_hpexpireat(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    hexpire_generic(engine, args, "hpexpireat", 1, true)
}

/// Shared body of the field TTL queries. `report` turns a field's absolute
/// expiry into the reported number.
fn field_ttl_generic(engine: &Engine, args: &[Bytes], cmd: &str, report: fn(u64, u64) -> i64) -> KeelResult<Reply> {
    let Some((key, rest)) = args.split_first() else {
        return Err(KeelError::arity(cmd));
    };
    let fields = parse_fields(rest, cmd)?;
    let now = now_millis();

    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(all_missing(fields));
    };
    let replies = fields
        .iter()
        .map(|f| {
            Reply::integer(match hash.field_expiry(f) {
                None => -2,
                Some(None) => -1,
                Some(Some(at)) => report(at, now),
            })
        })
        .collect();
    Ok(Reply::array(replies))
}

pub fn cmd_httl(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    field_ttl_generic(engine, args, "httl", |at, now| (at.saturating_sub(now).div_ceil(1000)) as i64)
}

pub fn cmd_hpttl(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    field_ttl_generic(engine, args, "hpttl", |at, now| at.saturating_sub(now) as i64)
}

pub fn cmd_hexpiretime(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    field_ttl_generic(engine, args, "hexpiretime", |at, _| (at / 1000) as i64)
}

pub fn cmd_hpexpiretime(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    field_ttl_generic(engine, args, "hpexpiretime", |at, _| at as i64)
}

pub fn cmd_hpersist(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, rest)) = args.split_first() else {
        return Err(KeelError::arity("hpersist"));
    };
    let fields = parse_fields(rest, "hpersist")?;

    let mut lock = engine.keyspace().lock(key);
    let Some(hash) = get_hash(&mut lock, key)? else {
        return Ok(all_missing(fields));
    };
    let replies = fields
        .iter()
        .map(|f| Reply::integer(hash.persist_field(f).unwrap_or(false) as i64))
        .collect();
    Ok(Reply::array(replies))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&'static str]) -> Vec<Bytes> {
        list.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[test]
    fn test_parse_fields() {
        let a = args(&["FIELDS", "2", "a", "b"]);
        assert_eq!(parse_fields(&a, "httl").unwrap().len(), 2);
        assert!(parse_fields(&args(&["FIELDS", "3", "a", "b"]), "httl").is_err());
        assert!(parse_fields(&args(&["FIELDS", "0"]), "httl").is_err());
        assert!(parse_fields(&args(&["a", "b"]), "httl").is_err());
    }
}
