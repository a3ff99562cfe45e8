use crate::command::{arg_to_i64, get_string, string_or_create, upper};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::Reply;
use crate::types::Value;
use crate::types::bitmap::{self, BitOp, MAX_BIT_OFFSET, RangeUnit};
use bytes::Bytes;

fn parse_unit(arg: &[u8]) -> KeelResult<RangeUnit> {
    match upper(arg).as_str() {
        "BYTE" => Ok(RangeUnit::Byte),
        "BIT" => Ok(RangeUnit::Bit),
        _ => Err(KeelError::SyntaxError),
    }
}

fn parse_bit(arg: &[u8]) -> KeelResult<bool> {
    match arg {
        b"0" => Ok(false),
        b"1" => Ok(true),
        _ => Err(KeelError::generic("bit is not an integer or out of range")),
    }
}

/// SETBIT key offset value
pub fn cmd_setbit(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, offset, value] = args else {
        return Err(KeelError::arity("setbit"));
    };
    let max_offset = MAX_BIT_OFFSET.min(engine.config().proto_max_bulk_len.saturating_mul(8).saturating_sub(1));
    let offset = arg_to_i64(offset)
        .ok()
        .and_then(|o| u64::try_from(o).ok())
        .filter(|&o| o <= max_offset)
        .ok_or_else(|| KeelError::generic("bit offset is not an integer or out of range"))?;
    let value = parse_bit(value)?;

    let mut lock = engine.keyspace().lock(key);
    let data = string_or_create(&mut lock, key)?;
    let old = bitmap::setbit(data, offset as usize, value);
    Ok(Reply::integer(old as i64))
}

/// GETBIT key offset
pub fn cmd_getbit(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, offset] = args else {
        return Err(KeelError::arity("getbit"));
    };
    let offset = arg_to_i64(offset)
        .ok()
        .and_then(|o| u64::try_from(o).ok())
        .filter(|&o| o <= MAX_BIT_OFFSET)
        .ok_or_else(|| KeelError::generic("bit offset is not an integer or out of range"))?;

    let mut lock = engine.keyspace().lock(key);
    let bit = get_string(&mut lock, key)?.is_some_and(|data| bitmap::getbit(data, offset as usize));
    Ok(Reply::integer(bit as i64))
}

/// BITCOUNT key [start end [BYTE|BIT]]
pub fn cmd_bitcount(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, range, unit) = match args {
        [key] => (key, None, RangeUnit::Byte),
        [key, start, end] => (key, Some((arg_to_i64(start)?, arg_to_i64(end)?)), RangeUnit::Byte),
        [key, start, end, unit] => (key, Some((arg_to_i64(start)?, arg_to_i64(end)?)), parse_unit(unit)?),
        [] => return Err(KeelError::arity("bitcount")),
        _ => return Err(KeelError::SyntaxError),
    };

    let mut lock = engine.keyspace().lock(key);
    let count = get_string(&mut lock, key)?.map_or(0, |data| bitmap::bitcount(data, range, unit));
    Ok(Reply::integer(count as i64))
}

/// BITPOS key bit [start [end [BYTE|BIT]]]
pub fn cmd_bitpos(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 || args.len() > 5 {
        return Err(KeelError::arity("bitpos"));
    }
    let key = &args[0];
    let bit = parse_bit(&args[1]).map_err(|_| KeelError::generic("The bit argument must be 1 or 0."))?;
    let start = args.get(2).map(|a| arg_to_i64(a)).transpose()?;
    let end = args.get(3).map(|a| arg_to_i64(a)).transpose()?;
    let unit = args.get(4).map(|a| parse_unit(a)).transpose()?.unwrap_or(RangeUnit::Byte);

    let mut lock = engine.keyspace().lock(key);
    let pos = match get_string(&mut lock, key)? {
        Some(data) => bitmap::bitpos(data, bit, start, end, unit),
        None => bitmap::bitpos(&[], bit, start, end, unit),
    };
    Ok(Reply::integer(pos))
}

/// BITOP AND|OR|XOR|NOT destkey key [key ...]
pub fn cmd_bitop(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity("bitop"));
    }
    let op = BitOp::parse(&String::from_utf8_lossy(&args[0])).ok_or(KeelError::SyntaxError)?;
    let dest = &args[1];
    let source_keys = &args[2..];
    if op == BitOp::Not && source_keys.len() != 1 {
        return Err(KeelError::generic("BITOP NOT must be called with a single source key."));
    }

    let mut lock = engine.keyspace().lock_many(&args[1..]);
    let mut sources = Vec::with_capacity(source_keys.len());
    for key in source_keys {
        sources.push(get_string(&mut lock, key)?.cloned().unwrap_or_default());
    }

    let result = bitmap::bitop(op, &sources);
    let len = result.len();
    if result.is_empty() {
        lock.remove(dest);
    } else {
        lock.set(dest, Value::String(result));
    }
    Ok(Reply::integer(len as i64))
}
