use crate::command::{arg_to_i64, get_string, string_or_create, upper};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::Reply;
use crate::store::entry::{Entry, now_millis};
use crate::types::Value;
use bytes::Bytes;

pub fn cmd_get(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("get"));
    };
    let mut lock = engine.keyspace().lock(key);
    let value = get_string(&mut lock, key)?;
    Ok(Reply::from_optional_bytes(value.cloned()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetExpiry {
    Clear,
    Keep,
    At(u64),
}

pub fn cmd_set(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity("set"));
    }
    let key = &args[0];
    let value = args[1].to_vec();

    let mut nx = false;
    let mut xx = false;
    let mut get = false;
    let mut expiry = SetExpiry::Clear;
    let mut expiry_given = false;

    let mut i = 2;
    while i < args.len() {
        let opt = upper(&args[i]);
        match opt.as_str() {
            "NX" if !xx => nx = true,
            "XX" if !nx => xx = true,
            "GET" => get = true,
            "KEEPTTL" if !expiry_given => {
                expiry = SetExpiry::Keep;
                expiry_given = true;
            }
            "EX" | "PX" | "EXAT" | "PXAT" if !expiry_given && i + 1 < args.len() => {
                i += 1;
                let n = arg_to_i64(&args[i])?;
                let invalid = || KeelError::generic("invalid expire time in 'set' command");
                if n <= 0 {
                    return Err(invalid());
                }
                let at = match opt.as_str() {
                    "EX" => n.checked_mul(1000).and_then(|ms| ms.checked_add(now_millis() as i64)),
                    "PX" => n.checked_add(now_millis() as i64),
                    "EXAT" => n.checked_mul(1000),
                    _ => Some(n),
                }
                .ok_or_else(invalid)?;
                expiry = SetExpiry::At(at as u64);
                expiry_given = true;
            }
            _ => return Err(KeelError::SyntaxError),
        }
        i += 1;
    }

    let mut lock = engine.keyspace().lock(key);
    let previous = match lock.get(key) {
        Some(entry) => match &entry.value {
            Value::String(s) => Some((s.clone(), entry.expires_at)),
            _ if get => return Err(KeelError::WrongType),
            _ => Some((Vec::new(), entry.expires_at)),
        },
        None => None,
    };

    let old_value = || Reply::from_optional_bytes(previous.as_ref().map(|(v, _)| v.clone()));
    if (nx && previous.is_some()) || (xx && previous.is_none()) {
        return Ok(if get { old_value() } else { Reply::Nil });
    }

    let expires_at = match expiry {
        SetExpiry::Clear => None,
        SetExpiry::Keep => previous.as_ref().and_then(|(_, exp)| *exp),
        SetExpiry::At(at) => Some(at),
    };
    let reply = if get { old_value() } else { Reply::ok() };
    lock.insert(key.clone(), Entry::with_expiry(Value::String(value), expires_at));
    Ok(reply)
}

pub fn cmd_append(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, suffix] = args else {
        return Err(KeelError::arity("append"));
    };
    let max = engine.config().proto_max_bulk_len;
    let mut lock = engine.keyspace().lock(key);
    let current = get_string(&mut lock, key)?.map_or(0, |s| s.len());
    if (current + suffix.len()) as u64 > max {
        return Err(KeelError::generic("string exceeds maximum allowed size (proto-max-bulk-len)"));
    }
    let s = string_or_create(&mut lock, key)?;
    s.extend_from_slice(suffix);
    Ok(Reply::integer(s.len() as i64))
}

pub fn cmd_strlen(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("strlen"));
    };
    let mut lock = engine.keyspace().lock(key);
    let len = get_string(&mut lock, key)?.map_or(0, |s| s.len());
    Ok(Reply::integer(len as i64))
}

pub fn cmd_mset(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(KeelError::arity("mset"));
    }
    let keys: Vec<&Bytes> = args.iter().step_by(2).collect();
    let mut lock = engine.keyspace().lock_many(&keys);
    for pair in args.chunks(2) {
        lock.set(&pair[0], Value::String(pair[1].to_vec()));
    }
    Ok(Reply::ok())
}

pub fn cmd_mget(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() {
        return Err(KeelError::arity("mget"));
    }
    let mut lock = engine.keyspace().lock_many(args);
    let values = args
        .iter()
        .map(|key| match lock.get_value(key) {
            Some(Value::String(s)) => Reply::bulk_string(s.clone()),
            _ => Reply::Nil,
        })
        .collect();
    Ok(Reply::array(values))
}
