use crate::command::{
    arg_to_f64, arg_to_i64, arg_to_random_count, get_sorted_set, is_flag, parse_cursor, parse_scan_options, scan_reply, sorted_set_or_create,
    upper,
};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::Reply;
use crate::scan;
use crate::store::KeyLock;
use crate::types::Value;
use crate::types::sorted_set::{Aggregate, LexBound, RedisSortedSet, ScoreBound, SetOp};
use bytes::Bytes;
use rand::Rng;
use rand::seq::{IteratorRandom, SliceRandom};

fn score_bound(arg: &[u8]) -> KeelResult<ScoreBound> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(ScoreBound::parse)
        .ok_or_else(|| KeelError::generic("min or max is not a float"))
}

fn lex_bound(arg: &[u8]) -> KeelResult<LexBound> {
    LexBound::parse(arg).ok_or_else(|| KeelError::generic("min or max not valid string range item"))
}

/// Flatten entries into `member [score]` replies.
fn entries_items(entries: Vec<(Vec<u8>, f64)>, withscores: bool) -> Vec<Reply> {
    let mut items = Vec::with_capacity(entries.len() * if withscores { 2 } else { 1 });
    for (member, score) in entries {
        items.push(Reply::bulk_string(member));
        if withscores {
            items.push(Reply::double(score));
        }
    }
    items
}

fn entries_reply(entries: Vec<(Vec<u8>, f64)>, withscores: bool) -> Reply {
    Reply::array(entries_items(entries, withscores))
}

/// Write `result` to `dest`, deleting it when empty. Returns the cardinality.
fn store_result(lock: &mut KeyLock<'_>, dest: &[u8], result: RedisSortedSet) -> Reply {
    let len = result.len();
    if result.is_empty() {
        lock.remove(dest);
    } else {
        lock.set(dest, Value::SortedSet(result));
    }
    Reply::integer(len as i64)
}

#[derive(Debug, Default)]
struct ZaddFlags {
    nx: bool,
    xx: bool,
    gt: bool,
    lt: bool,
    ch: bool,
    incr: bool,
}

/// ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...]
pub fn cmd_zadd(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity("zadd"));
    }
    let key = &args[0];
    let mut flags = ZaddFlags::default();
    let mut i = 1;
    while i < args.len() {
        match upper(&args[i]).as_str() {
            "NX" => flags.nx = true,
            "XX" => flags.xx = true,
            "GT" => flags.gt = true,
            "LT" => flags.lt = true,
            "CH" => flags.ch = true,
            "INCR" => flags.incr = true,
            _ => break,
        }
        i += 1;
    }

    if flags.nx && flags.xx {
        return Err(KeelError::generic("XX and NX options at the same time are not compatible"));
    }
    if (flags.gt && flags.lt) || (flags.nx && (flags.gt || flags.lt)) {
        return Err(KeelError::generic("GT, LT, and/or NX options at the same time are not compatible"));
    }
    let pairs = &args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(KeelError::SyntaxError);
    }
    if flags.incr && pairs.len() > 2 {
        return Err(KeelError::generic("INCR option supports a single increment-element pair"));
    }
    let entries = pairs
        .chunks(2)
        .map(|pair| Ok((arg_to_f64(&pair[0])?, &pair[1])))
        .collect::<KeelResult<Vec<_>>>()?;

    let mut lock = engine.keyspace().lock(key);
    if flags.xx && get_sorted_set(&mut lock, key)?.is_none() {
        return Ok(if flags.incr { Reply::Nil } else { Reply::integer(0) });
    }
    let zset = sorted_set_or_create(&mut lock, key)?;

    let mut added = 0;
    let mut changed = 0;
    let mut incr_result = None;
    for (score, member) in entries {
        let current = zset.score(member);
        if (flags.nx && current.is_some()) || (flags.xx && current.is_none()) {
            continue;
        }
        let new_score = match (flags.incr, current) {
            (true, Some(old)) => old + score,
            _ => score,
        };
        if new_score.is_nan() {
            lock.remove_if_empty(key);
            return Err(KeelError::generic("resulting score is not a number (NaN)"));
        }
        if let Some(old) = current {
            if (flags.gt && new_score <= old) || (flags.lt && new_score >= old) {
                continue;
            }
            if old != new_score {
                changed += 1;
            }
        } else {
            added += 1;
        }
        zset.insert(member, new_score);
        incr_result = Some(new_score);
    }
    lock.remove_if_empty(key);

    if flags.incr {
        return Ok(incr_result.map_or(Reply::Nil, Reply::double));
    }
    Ok(Reply::integer(if flags.ch { added + changed } else { added }))
}

pub fn cmd_zincrby(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, delta, member] = args else {
        return Err(KeelError::arity("zincrby"));
    };
    let delta = arg_to_f64(delta)?;
    let mut lock = engine.keyspace().lock(key);
    let zset = sorted_set_or_create(&mut lock, key)?;
    let score = zset.score(member).unwrap_or(0.0) + delta;
    if score.is_nan() {
        return Err(KeelError::generic("resulting score is not a number (NaN)"));
    }
    zset.insert(member, score);
    Ok(Reply::double(score))
}

pub fn cmd_zscore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, member] = args else {
        return Err(KeelError::arity("zscore"));
    };
    let mut lock = engine.keyspace().lock(key);
    let score = get_sorted_set(&mut lock, key)?.and_then(|z| z.score(member));
    Ok(score.map_or(Reply::Nil, Reply::double))
}

pub fn cmd_zmscore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, members)) = args.split_first().filter(|(_, m)| !m.is_empty()) else {
        return Err(KeelError::arity("zmscore"));
    };
    let mut lock = engine.keyspace().lock(key);
    let zset = get_sorted_set(&mut lock, key)?;
    let scores = members
        .iter()
        .map(|m| zset.as_ref().and_then(|z| z.score(m)).map_or(Reply::Nil, Reply::double))
        .collect();
    Ok(Reply::array(scores))
}

pub fn cmd_zcard(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key] = args else {
        return Err(KeelError::arity("zcard"));
    };
    let mut lock = engine.keyspace().lock(key);
    let len = get_sorted_set(&mut lock, key)?.map_or(0, |z| z.len());
    Ok(Reply::integer(len as i64))
}

pub fn cmd_zcount(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, min, max] = args else {
        return Err(KeelError::arity("zcount"));
    };
    let (min, max) = (score_bound(min)?, score_bound(max)?);
    let mut lock = engine.keyspace().lock(key);
    let count = get_sorted_set(&mut lock, key)?.map_or(0, |z| {
        let (lo, hi) = z.score_range(&min, &max);
        hi - lo
    });
    Ok(Reply::integer(count as i64))
}

pub fn cmd_zlexcount(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let [key, min, max] = args else {
        return Err(KeelError::arity("zlexcount"));
    };
    let (min, max) = (lex_bound(min)?, lex_bound(max)?);
    let mut lock = engine.keyspace().lock(key);
    let count = get_sorted_set(&mut lock, key)?.map_or(0, |z| {
        let (lo, hi) = z.lex_range(&min, &max);
        hi - lo
    });
    Ok(Reply::integer(count as i64))
}

fn rank_generic(engine: &Engine, args: &[Bytes], cmd: &str, rev: bool) -> KeelResult<Reply> {
    let (key, member, withscore) = match args {
        [key, member] => (key, member, false),
        [key, member, flag] if is_flag(flag, "WITHSCORE") => (key, member, true),
        [_, _, _] => return Err(KeelError::SyntaxError),
        _ => return Err(KeelError::arity(cmd)),
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(Reply::Nil);
    };
    let rank = if rev { zset.rev_rank(member) } else { zset.rank(member) };
    Ok(match (rank, zset.score(member)) {
        (Some(rank), Some(score)) if withscore => Reply::array(vec![Reply::integer(rank as i64), Reply::double(score)]),
        (Some(rank), _) => Reply::integer(rank as i64),
        _ => Reply::Nil,
    })
}

pub fn cmd_zrank(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    rank_generic(engine, args, "zrank", false)
}

pub fn cmd_zrevrank(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    rank_generic(engine, args, "zrevrank", true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeBy {
    Rank,
    Score,
    Lex,
}

#[derive(Debug, Clone)]
enum Bounds {
    Rank(i64, i64),
    Score(ScoreBound, ScoreBound),
    Lex(LexBound, LexBound),
}

/// A validated range request, independent of which command spelled it.
#[derive(Debug, Clone)]
struct RangeQuery {
    bounds: Bounds,
    rev: bool,
    /// `None` when a negative LIMIT offset makes the result empty.
    offset: Option<usize>,
    count: Option<usize>,
    withscores: bool,
}

impl RangeQuery {
    /// `start`/`stop` are given in traversal order, so with `rev` the score
    /// and lex forms take the maximum first.
    fn new(
        by: RangeBy,
        start: &[u8],
        stop: &[u8],
        rev: bool,
        limit: Option<(i64, i64)>,
        withscores: bool,
    ) -> KeelResult<RangeQuery> {
        if limit.is_some() && by == RangeBy::Rank {
            return Err(KeelError::generic(
                "syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX",
            ));
        }
        if withscores && by == RangeBy::Lex {
            return Err(KeelError::generic(
                "syntax error, WITHSCORES not supported in combination with BYLEX",
            ));
        }
        let (min, max) = if rev { (stop, start) } else { (start, stop) };
        let bounds = match by {
            RangeBy::Rank => Bounds::Rank(arg_to_i64(start)?, arg_to_i64(stop)?),
            RangeBy::Score => Bounds::Score(score_bound(min)?, score_bound(max)?),
            RangeBy::Lex => Bounds::Lex(lex_bound(min)?, lex_bound(max)?),
        };
        let (offset, count) = match limit {
            Some((offset, count)) => (usize::try_from(offset).ok(), usize::try_from(count).ok()),
            None => (Some(0), None),
        };
        Ok(RangeQuery {
            bounds,
            rev,
            offset,
            count,
            withscores,
        })
    }

    /// Parse `start stop [BYSCORE|BYLEX] [REV] [LIMIT offset count] [WITHSCORES]`.
    fn parse_zrange(args: &[Bytes], allow_withscores: bool) -> KeelResult<RangeQuery> {
        let mut by = RangeBy::Rank;
        let mut rev = false;
        let mut limit = None;
        let mut withscores = false;
        let mut i = 2;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "BYSCORE" => by = RangeBy::Score,
                "BYLEX" => by = RangeBy::Lex,
                "REV" => rev = true,
                "WITHSCORES" if allow_withscores => withscores = true,
                "LIMIT" if i + 2 < args.len() => {
                    limit = Some((arg_to_i64(&args[i + 1])?, arg_to_i64(&args[i + 2])?));
                    i += 2;
                }
                _ => return Err(KeelError::SyntaxError),
            }
            i += 1;
        }
        RangeQuery::new(by, &args[0], &args[1], rev, limit, withscores)
    }

    /// Parse the tail of the legacy ZRANGEBYSCORE / ZRANGEBYLEX forms.
    fn parse_legacy(args: &[Bytes], by: RangeBy, rev: bool) -> KeelResult<RangeQuery> {
        let mut limit = None;
        let mut withscores = false;
        let mut i = 2;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "WITHSCORES" if by == RangeBy::Score => withscores = true,
                "LIMIT" if i + 2 < args.len() => {
                    limit = Some((arg_to_i64(&args[i + 1])?, arg_to_i64(&args[i + 2])?));
                    i += 2;
                }
                _ => return Err(KeelError::SyntaxError),
            }
            i += 1;
        }
        RangeQuery::new(by, &args[0], &args[1], rev, limit, withscores)
    }

    fn run(&self, zset: &RedisSortedSet) -> Vec<(Vec<u8>, f64)> {
        let Some(offset) = self.offset else {
            return Vec::new();
        };
        match &self.bounds {
            Bounds::Rank(start, stop) => {
                let (lo, hi) = zset.rank_range(*start, *stop);
                if self.rev {
                    let len = zset.len();
                    zset.slice((len - hi, len - lo), true, 0, None)
                } else {
                    zset.slice((lo, hi), false, 0, None)
                }
            }
            Bounds::Score(min, max) => zset.slice(zset.score_range(min, max), self.rev, offset, self.count),
            Bounds::Lex(min, max) => zset.slice(zset.lex_range(min, max), self.rev, offset, self.count),
        }
    }
}

fn range_reply(engine: &Engine, key: &[u8], query: &RangeQuery) -> KeelResult<Reply> {
    let mut lock = engine.keyspace().lock(key);
    let entries = get_sorted_set(&mut lock, key)?.map_or_else(Vec::new, |z| query.run(z));
    Ok(entries_reply(entries, query.withscores))
}

/// ZRANGE key start stop [BYSCORE|BYLEX] [REV] [LIMIT offset count] [WITHSCORES]
pub fn cmd_zrange(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity("zrange"));
    }
    let query = RangeQuery::parse_zrange(&args[1..], true)?;
    range_reply(engine, &args[0], &query)
}

/// ZRANGESTORE dst src start stop [BYSCORE|BYLEX] [REV] [LIMIT offset count]
pub fn cmd_zrangestore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 4 {
        return Err(KeelError::arity("zrangestore"));
    }
    let (dest, src) = (&args[0], &args[1]);
    let query = RangeQuery::parse_zrange(&args[2..], false)?;
    let mut lock = engine.keyspace().lock_many(&args[..2]);
    let entries = get_sorted_set(&mut lock, src)?.map_or_else(Vec::new, |z| query.run(z));
    let mut result = RedisSortedSet::new();
    for (member, score) in entries {
        result.insert(&member, score);
    }
    Ok(store_result(&mut lock, dest, result))
}

/// ZREVRANGE key start stop [WITHSCORES]
pub fn cmd_zrevrange(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let withscores = match args {
        [_, _, _] => false,
        [_, _, _, flag] if is_flag(flag, "WITHSCORES") => true,
        [_, _, _, _] => return Err(KeelError::SyntaxError),
        _ => return Err(KeelError::arity("zrevrange")),
    };
    let query = RangeQuery::new(RangeBy::Rank, &args[1], &args[2], true, None, withscores)?;
    range_reply(engine, &args[0], &query)
}

fn legacy_range(engine: &Engine, args: &[Bytes], cmd: &str, by: RangeBy, rev: bool) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity(cmd));
    }
    let query = RangeQuery::parse_legacy(&args[1..], by, rev)?;
    range_reply(engine, &args[0], &query)
}

pub fn cmd_zrangebyscore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    legacy_range(engine, args, "zrangebyscore", RangeBy::Score, false)
}

pub fn cmd_zrevrangebyscore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    legacy_range(engine, args, "zrevrangebyscore", RangeBy::Score, true)
}

pub fn cmd_zrangebylex(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    legacy_range(engine, args, "zrangebylex", RangeBy::Lex, false)
}

pub fn cmd_zrevrangebylex(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    legacy_range(engine, args, "zrevrangebylex", RangeBy::Lex, true)
}

pub fn cmd_zrem(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, members)) = args.split_first().filter(|(_, m)| !m.is_empty()) else {
        return Err(KeelError::arity("zrem"));
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(Reply::integer(0));
    };
    let removed = members.iter().filter(|m| zset.remove(m)).count();
    lock.remove_if_empty(key);
    Ok(Reply::integer(removed as i64))
}

fn remrange_generic(engine: &Engine, args: &[Bytes], cmd: &str, by: RangeBy) -> KeelResult<Reply> {
    let [key, start, stop] = args else {
        return Err(KeelError::arity(cmd));
    };
    let query = RangeQuery::new(by, start, stop, false, None, false)?;
    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(Reply::integer(0));
    };
    let range = match &query.bounds {
        Bounds::Rank(start, stop) => zset.rank_range(*start, *stop),
        Bounds::Score(min, max) => zset.score_range(min, max),
        Bounds::Lex(min, max) => zset.lex_range(min, max),
    };
    let removed = zset.remove_positions(range);
    lock.remove_if_empty(key);
    Ok(Reply::integer(removed as i64))
}

pub fn cmd_zremrangebyrank(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    remrange_generic(engine, args, "zremrangebyrank", RangeBy::Rank)
}

pub fn cmd_zremrangebyscore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    remrange_generic(engine, args, "zremrangebyscore", RangeBy::Score)
}

pub fn cmd_zremrangebylex(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    remrange_generic(engine, args, "zremrangebylex", RangeBy::Lex)
}

fn pop_generic(engine: &Engine, args: &[Bytes], cmd: &str, highest: bool) -> KeelResult<Reply> {
    let (key, count) = match args {
        [key] => (key, 1),
        [key, count] => {
            let count = usize::try_from(arg_to_i64(count)?)
                .map_err(|_| KeelError::generic("value is out of range, must be positive"))?;
            (key, count)
        }
        _ => return Err(KeelError::arity(cmd)),
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(Reply::array(Vec::new()));
    };
    let popped = zset.pop(count, highest);
    lock.remove_if_empty(key);
    Ok(entries_reply(popped, true))
}

pub fn cmd_zpopmin(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    pop_generic(engine, args, "zpopmin", false)
}

pub fn cmd_zpopmax(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    pop_generic(engine, args, "zpopmax", true)
}

/// Parsed `numkeys key... [WEIGHTS w...] [AGGREGATE SUM|MIN|MAX] [WITHSCORES]`.
struct CombineArgs<'a> {
    keys: &'a [Bytes],
    weights: Vec<f64>,
    aggregate: Aggregate,
    withscores: bool,
}

fn parse_combine<'a>(args: &'a [Bytes], cmd: &str, op: SetOp, allow_withscores: bool) -> KeelResult<CombineArgs<'a>> {
    let Some((numkeys, rest)) = args.split_first() else {
        return Err(KeelError::arity(cmd));
    };
    let numkeys = arg_to_i64(numkeys)?;
    if numkeys <= 0 {
        return Err(KeelError::generic(format!("at least 1 input key is needed for '{cmd}' command")));
    }
    let numkeys = numkeys as usize;
    if numkeys > rest.len() {
        return Err(KeelError::SyntaxError);
    }
    let (keys, options) = rest.split_at(numkeys);

    let mut parsed = CombineArgs {
        keys,
        weights: Vec::new(),
        aggregate: Aggregate::Sum,
        withscores: false,
    };
    let mut i = 0;
    while i < options.len() {
        match upper(&options[i]).as_str() {
            "WEIGHTS" if op != SetOp::Diff && i + numkeys < options.len() => {
                parsed.weights = options[i + 1..=i + numkeys]
                    .iter()
                    .map(|w| arg_to_f64(w).map_err(|_| KeelError::generic("weight value is not a float")))
                    .collect::<KeelResult<_>>()?;
                i += numkeys;
            }
            "AGGREGATE" if op != SetOp::Diff && i + 1 < options.len() => {
                parsed.aggregate = match upper(&options[i + 1]).as_str() {
                    "SUM" => Aggregate::Sum,
                    "MIN" => Aggregate::Min,
                    "MAX" => Aggregate::Max,
                    _ => return Err(KeelError::SyntaxError),
                };
                i += 1;
            }
            "WITHSCORES" if allow_withscores => parsed.withscores = true,
            _ => return Err(KeelError::SyntaxError),
        }
        i += 1;
    }
    Ok(parsed)
}

/// Load every source under the held lock. Missing keys read as empty sets.
fn load_sources(lock: &mut KeyLock<'_>, keys: &[Bytes]) -> KeelResult<Vec<RedisSortedSet>> {
    keys.iter()
        .map(|k| Ok(get_sorted_set(lock, k)?.cloned().unwrap_or_default()))
        .collect()
}

fn combine_store(engine: &Engine, args: &[Bytes], cmd: &str, op: SetOp) -> KeelResult<Reply> {
    let Some((dest, rest)) = args.split_first() else {
        return Err(KeelError::arity(cmd));
    };
    let plan = parse_combine(rest, cmd, op, false)?;
    let mut locked: Vec<&Bytes> = plan.keys.iter().collect();
    locked.push(dest);
    let mut lock = engine.keyspace().lock_many(&locked);

    let sources = load_sources(&mut lock, plan.keys)?;
    let refs: Vec<&RedisSortedSet> = sources.iter().collect();
    let result = RedisSortedSet::combine(op, &refs, &plan.weights, plan.aggregate);
    Ok(store_result(&mut lock, dest, result))
}

fn combine_read(engine: &Engine, args: &[Bytes], cmd: &str, op: SetOp) -> KeelResult<Reply> {
    let plan = parse_combine(args, cmd, op, true)?;
    let mut lock = engine.keyspace().lock_many(plan.keys);
    let sources = load_sources(&mut lock, plan.keys)?;
    drop(lock);

    let refs: Vec<&RedisSortedSet> = sources.iter().collect();
    let result = RedisSortedSet::combine(op, &refs, &plan.weights, plan.aggregate);
    let entries = result.slice((0, result.len()), false, 0, None);
    Ok(entries_reply(entries, plan.withscores))
}

pub fn cmd_zunionstore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_store(engine, args, "zunionstore", SetOp::Union)
}

pub fn cmd_zinterstore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_store(engine, args, "zinterstore", SetOp::Inter)
}

pub fn cmd_zdiffstore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_store(engine, args, "zdiffstore", SetOp::Diff)
}

pub fn cmd_zunion(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_read(engine, args, "zunion", SetOp::Union)
}

pub fn cmd_zinter(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_read(engine, args, "zinter", SetOp::Inter)
}

pub fn cmd_zdiff(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    combine_read(engine, args, "zdiff", SetOp::Diff)
}

/// ZRANDMEMBER key [count [WITHSCORES]]
pub fn cmd_zrandmember(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.is_empty() || args.len() > 3 {
        return Err(KeelError::arity("zrandmember"));
    }
    let key = &args[0];
    let count = args.get(1).map(|c| arg_to_random_count(c)).transpose()?;
    let withscores = match args.get(2) {
        Some(flag) if is_flag(flag, "WITHSCORES") => true,
        Some(_) => return Err(KeelError::SyntaxError),
        None => false,
    };

    let mut lock = engine.keyspace().lock(key);
    let zset = get_sorted_set(&mut lock, key)?;
    let mut rng = rand::thread_rng();

    let Some(count) = count else {
        let member = zset.and_then(|z| z.iter().choose(&mut rng).map(|e| e.member.clone()));
        return Ok(Reply::from_optional_bytes(member));
    };
    let Some(zset) = zset.filter(|z| !z.is_empty()) else {
        return Ok(Reply::array(Vec::new()));
    };

    let picked: Vec<(Vec<u8>, f64)> = if count >= 0 {
        let mut picked = zset.iter().choose_multiple(&mut rng, (count as usize).min(zset.len()));
        picked.shuffle(&mut rng);
        picked.into_iter().map(|e| (e.member.clone(), e.score)).collect()
    } else {
        (0..count.unsigned_abs())
            .filter_map(|_| zset.select(rng.gen_range(0..zset.len())))
            .map(|e| (e.member.clone(), e.score))
            .collect()
    };
    Ok(entries_reply(picked, withscores))
}

/// ZSCAN key cursor [MATCH pattern] [COUNT count]
pub fn cmd_zscan(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 2 {
        return Err(KeelError::arity("zscan"));
    }
    let key = &args[0];
    let cursor = parse_cursor(&args[1])?;
    let opts = parse_scan_options(&args[2..], engine.config().scan_default_count, &[])?;

    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(scan_reply(0, Vec::new()));
    };
    let (next, page) = scan::page(zset.iter(), |e| &e.member[..], cursor, opts.count);
    let entries = page
        .into_iter()
        .filter(|e| opts.matches(&e.member))
        .map(|e| (e.member.clone(), e.score))
        .collect();
    Ok(scan_reply(next, entries_items(entries, true)))
}
