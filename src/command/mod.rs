pub mod bitmap;
pub mod geo;
pub mod hash;
pub mod json;
pub mod key;
pub mod server_cmd;
pub mod sorted_set;
pub mod string;

use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::glob::glob_match;
use crate::reply::Reply;
use crate::store::KeyLock;
use crate::types::Value;
use crate::types::hash::RedisHash;
use crate::types::json::JsonNode;
use crate::types::sorted_set::{RedisSortedSet, parse_score};
use bytes::Bytes;
use tracing::debug;

type Handler = fn(&Engine, &[Bytes]) -> KeelResult<Reply>;

/// Route a command to its handler. `name` must already be uppercase.
pub fn dispatch(engine: &Engine, name: &str, args: &[Bytes]) -> KeelResult<Reply> {
    match lookup(name) {
        Some(handler) => handler(engine, args),
        None => {
            debug!(command = name, "unknown command");
            let preview: Vec<String> = args
                .iter()
                .take(3)
                .map(|a| format!("'{}'", String::from_utf8_lossy(a)))
                .collect();
            Err(KeelError::UnknownCommand(name.to_lowercase(), preview.join(" ")))
        }
    }
}

fn lookup(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        // Server
        "PING" => server_cmd::cmd_ping,
        "ECHO" => server_cmd::cmd_echo,
        "DBSIZE" => server_cmd::cmd_dbsize,
        "FLUSHALL" | "FLUSHDB" => server_cmd::cmd_flushall,
        "CONFIG" => server_cmd::cmd_config,

        // Keys
        "DEL" | "UNLINK" => key::cmd_del,
        "EXISTS" => key::cmd_exists,
        "TYPE" => key::cmd_type,
        "EXPIRE" => key::cmd_expire,
        "PEXPIRE" => key::cmd_pexpire,
        "EXPIREAT" => key::cmd_expireat,
        "PEXPIREAT" => key::cmd_pexpireat,
        "TTL" => key::cmd_ttl,
        "PTTL" => key::cmd_pttl,
        "EXPIRETIME" => key::cmd_expiretime,
        "PEXPIRETIME" => key::cmd_pexpiretime,
        "PERSIST" => key::cmd_persist,
        "KEYS" => key::cmd_keys,
        "SCAN" => key::cmd_scan,
        "RENAME" => key::cmd_rename,

        // Strings
        "SET" => string::cmd_set,
        "GET" => string::cmd_get,
        "APPEND" => string::cmd_append,
        "STRLEN" => string::cmd_strlen,
        "MSET" => string::cmd_mset,
        "MGET" => string::cmd_mget,

        // Bitmaps
        "SETBIT" => bitmap::cmd_setbit,
        "GETBIT" => bitmap::cmd_getbit,
        "BITCOUNT" => bitmap::cmd_bitcount,
        "BITPOS" => bitmap::cmd_bitpos,
        "BITOP" => bitmap::cmd_bitop,

        // Hashes
        "HSET" | "HMSET" => hash::cmd_hset,
        "HGET" => hash::cmd_hget,
        "HMGET" => hash::cmd_hmget,
        "HDEL" => hash::cmd_hdel,
        "HEXISTS" => hash::cmd_hexists,
        "HLEN" => hash::cmd_hlen,
        "HKEYS" => hash::cmd_hkeys,
        "HVALS" => hash::cmd_hvals,
        "HGETALL" => hash::cmd_hgetall,
        "HSTRLEN" => hash::cmd_hstrlen,
        "HSETNX" => hash::cmd_hsetnx,
        "HINCRBY" => hash::cmd_hincrby,
        "HINCRBYFLOAT" => hash::cmd_hincrbyfloat,
        "HRANDFIELD" => hash::cmd_hrandfield,
        "HSCAN" => hash::cmd_hscan,
        "HEXPIRE" => hash::cmd_hexpire,
        "HPEXPIRE" => hash::cmd_hpexpire,
        "HEXPIREAT" => hash::cmd_hexpireat,
        "HPEXPIREAT" => hash::cmd_hpexpireat,
        "HTTL" => hash::cmd_httl,
        "HPTTL" => hash::cmd_hpttl,
        "HEXPIRETIME" => hash::cmd_hexpiretime,
        "HPEXPIRETIME" => hash::cmd_hpexpiretime,
        "HPERSIST" => hash::cmd_hpersist,

        // Sorted sets
        "ZADD" => sorted_set::cmd_zadd,
        "ZINCRBY" => sorted_set::cmd_zincrby,
        "ZSCORE" => sorted_set::cmd_zscore,
        "ZMSCORE" => sorted_set::cmd_zmscore,
        "ZCARD" => sorted_set::cmd_zcard,
        "ZCOUNT" => sorted_set::cmd_zcount,
        "ZLEXCOUNT" => sorted_set::cmd_zlexcount,
        "ZRANK" => sorted_set::cmd_zrank,
        "ZREVRANK" => sorted_set::cmd_zrevrank,
        "ZRANGE" => sorted_set::cmd_zrange,
        "ZRANGESTORE" => sorted_set::cmd_zrangestore,
        "ZREVRANGE" => sorted_set::cmd_zrevrange,
        "ZRANGEBYSCORE" => sorted_set::cmd_zrangebyscore,
        "ZREVRANGEBYSCORE" => sorted_set::cmd_zrevrangebyscore,
        "ZRANGEBYLEX" => sorted_set::cmd_zrangebylex,
        "ZREVRANGEBYLEX" => sorted_set::cmd_zrevrangebylex,
        "ZREM" => sorted_set::cmd_zrem,
        "ZREMRANGEBYRANK" => sorted_set::cmd_zremrangebyrank,
        "ZREMRANGEBYSCORE" => sorted_set::cmd_zremrangebyscore,
        "ZREMRANGEBYLEX" => sorted_set::cmd_zremrangebylex,
        "ZPOPMIN" => sorted_set::cmd_zpopmin,
        "ZPOPMAX" => sorted_set::cmd_zpopmax,
        "ZUNIONSTORE" => sorted_set::cmd_zunionstore,
        "ZINTERSTORE" => sorted_set::cmd_zinterstore,
        "ZDIFFSTORE" => sorted_set::cmd_zdiffstore,
        "ZUNION" => sorted_set::cmd_zunion,
        "ZINTER" => sorted_set::cmd_zinter,
        "ZDIFF" => sorted_set::cmd_zdiff,
        "ZRANDMEMBER" => sorted_set::cmd_zrandmember,
        "ZSCAN" => sorted_set::cmd_zscan,

        // Geo
        "GEOADD" => geo::cmd_geoadd,
        "GEOPOS" => geo::cmd_geopos,
        "GEODIST" => geo::cmd_geodist,
        "GEOHASH" => geo::cmd_geohash,
        "GEOSEARCH" => geo::cmd_geosearch,
        "GEOSEARCHSTORE" => geo::cmd_geosearchstore,
        "GEORADIUS" | "GEORADIUS_RO" => geo::cmd_georadius,
        "GEORADIUSBYMEMBER" | "GEORADIUSBYMEMBER_RO" => geo::cmd_georadiusbymember,

        // JSON
        "JSON.SET" => json::cmd_json_set,
        "JSON.GET" => json::cmd_json_get,
        "JSON.DEL" | "JSON.FORGET" => json::cmd_json_del,
        "JSON.MGET" => json::cmd_json_mget,
        "JSON.MSET" => json::cmd_json_mset,
        "JSON.TYPE" => json::cmd_json_type,
        "JSON.ARRAPPEND" => json::cmd_json_arrappend,
        "JSON.ARRINSERT" => json::cmd_json_arrinsert,
        "JSON.ARRINDEX" => json::cmd_json_arrindex,
        "JSON.ARRLEN" => json::cmd_json_arrlen,
        "JSON.ARRPOP" => json::cmd_json_arrpop,
        "JSON.ARRTRIM" => json::cmd_json_arrtrim,
        "JSON.STRAPPEND" => json::cmd_json_strappend,
        "JSON.STRLEN" => json::cmd_json_strlen,
        "JSON.NUMINCRBY" => json::cmd_json_numincrby,
        "JSON.NUMMULTBY" => json::cmd_json_nummultby,
        "JSON.OBJKEYS" => json::cmd_json_objkeys,
        "JSON.OBJLEN" => json::cmd_json_objlen,
        "JSON.TOGGLE" => json::cmd_json_toggle,
        "JSON.CLEAR" => json::cmd_json_clear,
        "JSON.MERGE" => json::cmd_json_merge,

        _ => return None,
    };
    Some(handler)
}

/// Borrow an argument as UTF-8 text.
pub fn arg_to_str(arg: &[u8]) -> KeelResult<&str> {
    std::str::from_utf8(arg).map_err(|_| KeelError::SyntaxError)
}

pub fn arg_to_i64(arg: &[u8]) -> KeelResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KeelError::NotInteger)
}

/// Parse a non-negative integer argument.
pub fn arg_to_usize(arg: &[u8]) -> KeelResult<usize> {
    let n = arg_to_i64(arg)?;
    usize::try_from(n).map_err(|_| KeelError::generic("value is out of range, must be positive"))
}

/// Parse a float argument. Accepts `inf`, `+inf` and `-inf`; rejects NaN.
pub fn arg_to_f64(arg: &[u8]) -> KeelResult<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(parse_score)
        .ok_or(KeelError::NotFloat)
}

/// Case-insensitive comparison of an argument against an option keyword.
/// Largest number of repeats a negative HRANDFIELD / ZRANDMEMBER count may ask for.
pub const MAX_RANDOM_REPEATS: u64 = 1 << 20;

/// Parse the count of HRANDFIELD / ZRANDMEMBER. A negative count allows
/// repeats and materializes that many replies, so its size is bounded.
pub fn arg_to_random_count(arg: &[u8]) -> KeelResult<i64> {
    let count = arg_to_i64(arg)?;
    if count < 0 && count.unsigned_abs() > MAX_RANDOM_REPEATS {
        return Err(KeelError::generic("value is out of range"));
    }
    Ok(count)
}

pub fn is_flag(arg: &[u8], flag: &str) -> bool {
    arg.eq_ignore_ascii_case(flag.as_bytes())
}

pub fn upper(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

fn typed<'a, T>(
    lock: &'a mut KeyLock<'_>,
    key: &[u8],
    pick: fn(&mut Value) -> Option<&mut T>,
) -> KeelResult<Option<&'a mut T>> {
    match lock.get_value(key) {
        None => Ok(None),
        Some(value) => pick(value).map(Some).ok_or(KeelError::WrongType),
    }
}

fn typed_or_create<'a, T>(
    lock: &'a mut KeyLock<'_>,
    key: &[u8],
    pick: fn(&mut Value) -> Option<&mut T>,
    make: fn() -> Value,
) -> KeelResult<&'a mut T> {
    if !lock.contains(key) {
        lock.set(key, make());
    }
    typed(lock, key, pick)?.ok_or(KeelError::WrongType)
}

/// The string stored at `key`, or None when the key is absent.
pub fn get_string<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<Option<&'a mut Vec<u8>>> {
    typed(lock, key, Value::as_string_mut)
}

pub fn string_or_create<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<&'a mut Vec<u8>> {
    typed_or_create(lock, key, Value::as_string_mut, || Value::String(Vec::new()))
}

pub fn get_hash<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<Option<&'a mut RedisHash>> {
    typed(lock, key, Value::as_hash_mut)
}

/// The hash at `key`, created empty if absent. Callers that might leave it
/// empty must follow up with [`KeyLock::remove_if_empty`].
pub fn hash_or_create<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<&'a mut RedisHash> {
    typed_or_create(lock, key, Value::as_hash_mut, || Value::Hash(RedisHash::new()))
}

pub fn get_sorted_set<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<Option<&'a mut RedisSortedSet>> {
    typed(lock, key, Value::as_sorted_set_mut)
}

pub fn sorted_set_or_create<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<&'a mut RedisSortedSet> {
    typed_or_create(lock, key, Value::as_sorted_set_mut, || {
        Value::SortedSet(RedisSortedSet::new())
    })
}

pub fn get_json<'a>(lock: &'a mut KeyLock<'_>, key: &[u8]) -> KeelResult<Option<&'a mut JsonNode>> {
    typed(lock, key, Value::as_json_mut)
}

/// Options shared by SCAN, HSCAN and ZSCAN.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub pattern: Option<Vec<u8>>,
    pub count: usize,
    pub type_filter: Option<String>,
    pub novalues: bool,
}

impl ScanOptions {
    pub fn matches(&self, name: &[u8]) -> bool {
        self.pattern.as_deref().is_none_or(|p| glob_match(p, name))
    }
}

pub fn parse_cursor(arg: &[u8]) -> KeelResult<u64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KeelError::InvalidCursor)
}

/// Parse the `[MATCH p] [COUNT n] [TYPE t] [NOVALUES]` tail of a scan
/// command. `extra` lists which of TYPE and NOVALUES the command accepts.
pub fn parse_scan_options(args: &[Bytes], default_count: usize, extra: &[&str]) -> KeelResult<ScanOptions> {
    let mut opts = ScanOptions {
        pattern: None,
        count: default_count,
        type_filter: None,
        novalues: false,
    };
    let mut i = 0;
    while i < args.len() {
        let opt = upper(&args[i]);
        match opt.as_str() {
            "MATCH" if i + 1 < args.len() => {
                opts.pattern = Some(args[i + 1].to_vec());
                i += 2;
            }
            "COUNT" if i + 1 < args.len() => {
                let count = arg_to_i64(&args[i + 1])?;
                if count < 1 {
                    return Err(KeelError::SyntaxError);
                }
                opts.count = count as usize;
                i += 2;
            }
            "TYPE" if i + 1 < args.len() && extra.contains(&"TYPE") => {
                opts.type_filter = Some(String::from_utf8_lossy(&args[i + 1]).to_lowercase());
                i += 2;
            }
            "NOVALUES" if extra.contains(&"NOVALUES") => {
                opts.novalues = true;
                i += 1;
            }
            _ => return Err(KeelError::SyntaxError),
        }
    }
    Ok(opts)
}

/// The `[cursor, [items...]]` reply shared by the scan family.
pub fn scan_reply(cursor: u64, items: Vec<Reply>) -> Reply {
    Reply::array(vec![Reply::bulk_string(cursor.to_string()), Reply::array(items)])
}
