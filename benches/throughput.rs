use bytes::Bytes;
use keel::config::Config;
use keel::engine::Engine;
use std::sync::Arc;
use std::time::Instant;

fn args(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
}

fn ops_per_sec(iterations: usize, start: Instant) -> f64 {
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_set_get(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.execute("SET", &args(&[&format!("bench_key_{i}"), &format!("value_{i}")]));
    }
    let set_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for i in 0..iterations {
        engine.execute("GET", &args(&[&format!("bench_key_{i}")]));
    }
    (set_ops, ops_per_sec(iterations, start))
}

fn bench_hset_hget(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.execute("HSET", &args(&["bench_hash", &format!("field_{i}"), &format!("value_{i}")]));
    }
    let hset_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for i in 0..iterations {
        engine.execute("HGET", &args(&["bench_hash", &format!("field_{i}")]));
    }
    (hset_ops, ops_per_sec(iterations, start))
}

fn bench_zadd_zrange(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.execute("ZADD", &args(&["bench_zset", &(i % 997).to_string(), &format!("member_{i}")]));
    }
    let zadd_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for i in 0..iterations {
        let from = (i % 900).to_string();
        engine.execute("ZRANGE", &args(&["bench_zset", &from, "+inf", "BYSCORE", "LIMIT", "0", "10"]));
    }
    (zadd_ops, ops_per_sec(iterations, start))
}

fn bench_geo(engine: &Engine, iterations: usize) -> f64 {
    for i in 0..1000 {
        let lon = -10.0 + (i % 100) as f64 * 0.2;
        let lat = 40.0 + (i / 100) as f64 * 0.2;
        engine.execute("GEOADD", &args(&["bench_geo", &lon.to_string(), &lat.to_string(), &format!("p{i}")]));
    }
    let start = Instant::now();
    for _ in 0..iterations {
        engine.execute(
            "GEOSEARCH",
            &args(&["bench_geo", "FROMLONLAT", "0", "41", "BYRADIUS", "50", "km", "COUNT", "5"]),
        );
    }
    ops_per_sec(iterations, start)
}

fn bench_json(engine: &Engine, iterations: usize) -> (f64, f64) {
    engine.execute("JSON.SET", &args(&["bench_doc", "$", r#"{"n":0,"tags":[],"user":{"name":"x"}}"#]));
    let start = Instant::now();
    for _ in 0..iterations {
        engine.execute("JSON.NUMINCRBY", &args(&["bench_doc", "$.n", "1"]));
    }
    let incr_ops = ops_per_sec(iterations, start);

    let start = Instant::now();
    for _ in 0..iterations {
        engine.execute("JSON.GET", &args(&["bench_doc", "$..name"]));
    }
    (incr_ops, ops_per_sec(iterations, start))
}

/// Several threads hitting disjoint keys, then one shared hot key.
fn bench_threads(engine: &Arc<Engine>, threads: usize, iterations: usize) -> (f64, f64) {
    let run = |shared: bool| {
        let start = Instant::now();
        std::thread::scope(|s| {
            for t in 0..threads {
                let engine = Arc::clone(engine);
                s.spawn(move || {
                    let key = if shared { "hot".to_string() } else { format!("counter_{t}") };
                    for i in 0..iterations {
                        engine.execute("HINCRBY", &args(&[&key, &format!("f{}", i % 16), "1"]));
                    }
                });
            }
        });
        ops_per_sec(threads * iterations, start)
    };
    (run(false), run(true))
}

fn main() {
    let engine = Arc::new(Engine::new(Config::default()));
    let iterations = 100_000;

    println!("=== Keel Benchmark ({iterations} operations) ===\n");

    let (set_ops, get_ops) = bench_set_get(&engine, iterations);
    println!("SET:        {set_ops:>10.0} ops/sec");
    println!("GET:        {get_ops:>10.0} ops/sec");

    let (hset_ops, hget_ops) = bench_hset_hget(&engine, iterations);
    println!("HSET:       {hset_ops:>10.0} ops/sec");
    println!("HGET:       {hget_ops:>10.0} ops/sec");

    let (zadd_ops, zrange_ops) = bench_zadd_zrange(&engine, iterations);
    println!("ZADD:       {zadd_ops:>10.0} ops/sec");
    println!("ZRANGE:     {zrange_ops:>10.0} ops/sec (BYSCORE LIMIT 10)");

    let geo_ops = bench_geo(&engine, iterations / 10);
    println!("GEOSEARCH:  {geo_ops:>10.0} ops/sec (1000 points, 50 km)");

    let (incr_ops, get_ops) = bench_json(&engine, iterations);
    println!("NUMINCRBY:  {incr_ops:>10.0} ops/sec");
    println!("JSON.GET:   {get_ops:>10.0} ops/sec ($..name)");

    let threads = std::thread::available_parallelism().map_or(4, |n| n.get());
    let (spread_ops, hot_ops) = bench_threads(&engine, threads, iterations / 4);
    println!("HINCRBY x{threads}: {spread_ops:>10.0} ops/sec (disjoint keys)");
    println!("HINCRBY x{threads}: {hot_ops:>10.0} ops/sec (one hot key)");

    println!("\n=== Done ===");
}
