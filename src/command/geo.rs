use crate::command::{arg_to_f64, arg_to_i64, get_sorted_set, sorted_set_or_create, upper};
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::reply::Reply;
use crate::store::KeyLock;
use crate::types::Value;
use crate::types::geo::{self, GeoPoint, Shape};
use crate::types::sorted_set::RedisSortedSet;
use bytes::Bytes;

fn parse_point(lon: &[u8], lat: &[u8]) -> KeelResult<GeoPoint> {
    let (lon, lat) = (arg_to_f64(lon)?, arg_to_f64(lat)?);
    GeoPoint::new(lon, lat)
        .ok_or_else(|| KeelError::generic(format!("invalid longitude,latitude pair {lon:.6},{lat:.6}")))
}

fn parse_unit(arg: &[u8]) -> KeelResult<f64> {
    geo::unit_to_meters(&String::from_utf8_lossy(arg))
        .ok_or_else(|| KeelError::generic("unsupported unit provided. please use M, KM, FT, MI"))
}

/// Distances are reported with four decimals, as Redis does.
fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn point_reply(p: GeoPoint) -> Reply {
    Reply::array(vec![Reply::double(p.lon), Reply::double(p.lat)])
}

/// GEOADD key [NX|XX] [CH] longitude latitude member [...]
pub fn cmd_geoadd(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 4 {
        return Err(KeelError::arity("geoadd"));
    }
    let key = &args[0];
    let (mut nx, mut xx, mut ch) = (false, false, false);
    let mut i = 1;
    while i < args.len() {
        match upper(&args[i]).as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "CH" => ch = true,
            _ => break,
        }
        i += 1;
    }
    if nx && xx {
        return Err(KeelError::generic("XX and NX options at the same time are not compatible"));
    }
    let triples = &args[i..];
    if triples.is_empty() || triples.len() % 3 != 0 {
        return Err(KeelError::SyntaxError);
    }
    let points = triples
        .chunks(3)
        .map(|t| Ok((geo::encode(parse_point(&t[0], &t[1])?) as f64, &t[2])))
        .collect::<KeelResult<Vec<_>>>()?;

    let mut lock = engine.keyspace().lock(key);
    let zset = sorted_set_or_create(&mut lock, key)?;
    let mut added = 0;
    let mut changed = 0;
    for (score, member) in points {
        match zset.score(member) {
            Some(_) if nx => continue,
            None if xx => continue,
            Some(old) if old != score => changed += 1,
            Some(_) => continue,
            None => added += 1,
        }
        zset.insert(member, score);
    }
    lock.remove_if_empty(key);
    Ok(Reply::integer(if ch { added + changed } else { added }))
}

/// GEOPOS key member [member ...]
pub fn cmd_geopos(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, members)) = args.split_first() else {
        return Err(KeelError::arity("geopos"));
    };
    let mut lock = engine.keyspace().lock(key);
    let zset = get_sorted_set(&mut lock, key)?;
    let positions = members
        .iter()
        .map(|m| match zset.as_ref().and_then(|z| z.score(m)) {
            Some(score) => point_reply(geo::decode_score(score)),
            None => Reply::Nil,
        })
        .collect();
    Ok(Reply::array(positions))
}

/// GEODIST key member1 member2 [M|KM|FT|MI]
pub fn cmd_geodist(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let (key, a, b, factor) = match args {
        [key, a, b] => (key, a, b, 1.0),
        [key, a, b, unit] => (key, a, b, parse_unit(unit)?),
        _ => return Err(KeelError::arity("geodist")),
    };
    let mut lock = engine.keyspace().lock(key);
    let Some(zset) = get_sorted_set(&mut lock, key)? else {
        return Ok(Reply::Nil);
    };
    match (zset.score(a), zset.score(b)) {
        (Some(sa), Some(sb)) => {
            let meters = geo::distance(geo::decode_score(sa), geo::decode_score(sb));
            Ok(Reply::double(round4(meters / factor)))
        }
        _ => Ok(Reply::Nil),
    }
}

/// GEOHASH key member [member ...]
pub fn cmd_geohash(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, members)) = args.split_first() else {
        return Err(KeelError::arity("geohash"));
    };
    let mut lock = engine.keyspace().lock(key);
    let zset = get_sorted_set(&mut lock, key)?;
    let hashes = members
        .iter()
        .map(|m| match zset.as_ref().and_then(|z| z.score(m)) {
            Some(score) => Reply::bulk_string(geo::geohash_string(score)),
            None => Reply::Nil,
        })
        .collect();
    Ok(Reply::array(hashes))
}

#[derive(Debug, Clone)]
enum Origin {
    Member(Bytes),
    Point(GeoPoint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Asc,
    Desc,
}

/// A parsed GEOSEARCH-style query. Shape dimensions are in meters.
#[derive(Debug, Clone)]
struct GeoQuery {
    origin: Origin,
    shape: Shape,
    /// Meters per reported distance unit.
    unit: f64,
    order: Option<Order>,
    count: Option<usize>,
    any: bool,
    with_coord: bool,
    with_dist: bool,
    with_hash: bool,
    store_dist: bool,
}

impl GeoQuery {
    fn new(origin: Origin, shape: Shape, unit: f64) -> Self {
        GeoQuery {
            origin,
            shape,
            unit,
            order: None,
            count: None,
            any: false,
            with_coord: false,
            with_dist: false,
            with_hash: false,
            store_dist: false,
        }
    }

    /// Apply one option starting at `args[i]`; returns how many arguments
    /// it consumed, or None if `args[i]` is not a shared option.
    fn apply_option(&mut self, args: &[Bytes], i: usize) -> KeelResult<Option<usize>> {
        let consumed = match upper(&args[i]).as_str() {
            "ASC" => {
                self.order = Some(Order::Asc);
                1
            }
            "DESC" => {
                self.order = Some(Order::Desc);
                1
            }
            "WITHCOORD" => {
                self.with_coord = true;
                1
            }
            "WITHDIST" => {
                self.with_dist = true;
                1
            }
            "WITHHASH" => {
                self.with_hash = true;
                1
            }
            "COUNT" => {
                let n = args.get(i + 1).ok_or(KeelError::SyntaxError)?;
                let n = arg_to_i64(n)?;
                if n <= 0 {
                    return Err(KeelError::generic("COUNT must be > 0"));
                }
                self.count = Some(n as usize);
                if args.get(i + 2).is_some_and(|a| upper(a) == "ANY") {
                    self.any = true;
                    3
                } else {
                    2
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(consumed))
    }

    /// Parse the GEOSEARCH tail: FROMMEMBER/FROMLONLAT, BYRADIUS/BYBOX and
    /// the shared options.
    fn parse_search(args: &[Bytes], storing: bool) -> KeelResult<GeoQuery> {
        let mut origin = None;
        let mut shape = None;
        let mut rest = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let need = |n: usize| if i + n < args.len() { Ok(()) } else { Err(KeelError::SyntaxError) };
            match upper(&args[i]).as_str() {
                "FROMMEMBER" if origin.is_none() => {
                    need(1)?;
                    origin = Some(Origin::Member(args[i + 1].clone()));
                    i += 2;
                }
                "FROMLONLAT" if origin.is_none() => {
                    need(2)?;
                    origin = Some(Origin::Point(parse_point(&args[i + 1], &args[i + 2])?));
                    i += 3;
                }
                "BYRADIUS" if shape.is_none() => {
                    need(2)?;
                    let unit = parse_unit(&args[i + 2])?;
                    shape = Some((Shape::Radius(arg_to_f64(&args[i + 1])? * unit), unit));
                    i += 3;
                }
                "BYBOX" if shape.is_none() => {
                    need(3)?;
                    let unit = parse_unit(&args[i + 3])?;
                    let width = arg_to_f64(&args[i + 1])? * unit;
                    let height = arg_to_f64(&args[i + 2])? * unit;
                    shape = Some((Shape::Box { width, height }, unit));
                    i += 4;
                }
                _ => {
                    rest.push(i);
                    i += 1;
                }
            }
        }

        let origin = origin
            .ok_or_else(|| KeelError::generic("exactly one of FROMMEMBER or FROMLONLAT can be specified"))?;
        let (shape, unit) =
            shape.ok_or_else(|| KeelError::generic("exactly one of BYRADIUS and BYBOX can be specified"))?;
        let mut query = GeoQuery::new(origin, shape, unit);

        let mut j = 0;
        while j < rest.len() {
            let at = rest[j];
            if storing && upper(&args[at]) == "STOREDIST" {
                query.store_dist = true;
                j += 1;
                continue;
            }
            match query.apply_option(args, at)? {
                Some(consumed) => j += consumed,
                None => return Err(KeelError::SyntaxError),
            }
        }
        if storing && (query.with_coord || query.with_dist || query.with_hash) {
            return Err(KeelError::SyntaxError);
        }
        Ok(query)
    }

    /// Parse the GEORADIUS tail after the shape: only shared options.
    fn parse_radius_options(mut self, args: &[Bytes]) -> KeelResult<GeoQuery> {
        let mut i = 0;
        while i < args.len() {
            match self.apply_option(args, i)? {
                Some(consumed) => i += consumed,
                None => return Err(KeelError::SyntaxError),
            }
        }
        Ok(self)
    }

    /// Members inside the shape as `(member, meters, score)`, ordered and
    /// truncated as requested.
    fn run(&self, zset: &RedisSortedSet) -> KeelResult<Vec<(Vec<u8>, f64, f64)>> {
        let center = match &self.origin {
            Origin::Point(p) => *p,
            Origin::Member(m) => zset
                .score(m)
                .map(geo::decode_score)
                .ok_or_else(|| KeelError::generic("could not decode requested zset member"))?,
        };

        let mut found = Vec::new();
        for entry in zset.iter() {
            if let Some(dist) = self.shape.contains(center, geo::decode_score(entry.score)) {
                found.push((entry.member.clone(), dist, entry.score));
                if self.any && self.count.is_some_and(|c| found.len() >= c) {
                    break;
                }
            }
        }

        // COUNT without ANY implies the nearest matches.
        let order = match self.order {
            None if self.count.is_some() && !self.any => Some(Order::Asc),
            other => other,
        };
        match order {
            Some(Order::Asc) => found.sort_by(|a, b| a.1.total_cmp(&b.1)),
            Some(Order::Desc) => found.sort_by(|a, b| b.1.total_cmp(&a.1)),
            None => {}
        }
        if let Some(count) = self.count {
            found.truncate(count);
        }
        Ok(found)
    }

    fn reply(&self, found: Vec<(Vec<u8>, f64, f64)>) -> Reply {
        let plain = !(self.with_coord || self.with_dist || self.with_hash);
        let items = found
            .into_iter()
            .map(|(member, dist, score)| {
                if plain {
                    return Reply::bulk_string(member);
                }
                let mut item = vec![Reply::bulk_string(member)];
                if self.with_dist {
                    item.push(Reply::double(round4(dist / self.unit)));
                }
                if self.with_hash {
                    item.push(Reply::integer(score as i64));
                }
                if self.with_coord {
                    item.push(point_reply(geo::decode_score(score)));
                }
                Reply::array(item)
            })
            .collect();
        Reply::array(items)
    }
}

fn search_reply(lock: &mut KeyLock<'_>, key: &[u8], query: &GeoQuery) -> KeelResult<Reply> {
    let found = match get_sorted_set(lock, key)? {
        Some(zset) => query.run(zset)?,
        None => Vec::new(),
    };
    Ok(query.reply(found))
}

/// GEOSEARCH key FROMMEMBER m|FROMLONLAT lon lat BYRADIUS r unit|BYBOX w h unit
/// [ASC|DESC] [COUNT n [ANY]] [WITHCOORD] [WITHDIST] [WITHHASH]
pub fn cmd_geosearch(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some((key, rest)) = args.split_first().filter(|(_, r)| !r.is_empty()) else {
        return Err(KeelError::arity("geosearch"));
    };
    let query = GeoQuery::parse_search(rest, false)?;
    let mut lock = engine.keyspace().lock(key);
    search_reply(&mut lock, key, &query)
}

/// GEOSEARCHSTORE dst src ... [STOREDIST]
pub fn cmd_geosearchstore(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 3 {
        return Err(KeelError::arity("geosearchstore"));
    }
    let (dest, src) = (&args[0], &args[1]);
    let query = GeoQuery::parse_search(&args[2..], true)?;

    let mut lock = engine.keyspace().lock_many(&args[..2]);
    let found = match get_sorted_set(&mut lock, src)? {
        Some(zset) => query.run(zset)?,
        None => Vec::new(),
    };
    let mut result = RedisSortedSet::new();
    for (member, dist, score) in &found {
        let stored = if query.store_dist { round4(dist / query.unit) } else { *score };
        result.insert(member, stored);
    }
    let len = result.len();
    if result.is_empty() {
        lock.remove(dest);
    } else {
        lock.set(dest, Value::SortedSet(result));
    }
    Ok(Reply::integer(len as i64))
}

/// GEORADIUS key longitude latitude radius unit [options]
pub fn cmd_georadius(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 5 {
        return Err(KeelError::arity("georadius"));
    }
    let center = parse_point(&args[1], &args[2])?;
    let unit = parse_unit(&args[4])?;
    let shape = Shape::Radius(arg_to_f64(&args[3])? * unit);
    let query = GeoQuery::new(Origin::Point(center), shape, unit).parse_radius_options(&args[5..])?;
    let mut lock = engine.keyspace().lock(&args[0]);
    search_reply(&mut lock, &args[0], &query)
}

/// GEORADIUSBYMEMBER key member radius unit [options]
pub fn cmd_georadiusbymember(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if args.len() < 4 {
        return Err(KeelError::arity("georadiusbymember"));
    }
    let unit = parse_unit(&args[3])?;
    let shape = Shape::Radius(arg_to_f64(&args[2])? * unit);
    let query = GeoQuery::new(Origin::Member(args[1].clone()), shape, unit).parse_radius_options(&args[4..])?;
    let mut lock = engine.keyspace().lock(&args[0]);
    search_reply(&mut lock, &args[0], &query)
}
