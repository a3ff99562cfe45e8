use keel::config::Config;
use keel::engine::Engine;
use keel::inline::split_words;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, rejected) = Config::from_args(&args);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.loglevel));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    for message in rejected {
        warn!("{message}");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .max_blocking_threads(config.workers)
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

/// Read commands from stdin, one per line, and print each reply.
async fn run(config: Config) -> std::io::Result<()> {
    let engine = Arc::new(Engine::new(config));
    let sweeper = engine.spawn_expiry_task();
    info!("keel ready, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let words = match split_words(line.as_bytes()) {
            Ok(words) => words,
            Err(e) => {
                warn!("bad input: {e}");
                stdout.write_all(format!("(error) ERR {e}\n").as_bytes()).await?;
                continue;
            }
        };
        let Some((name, args)) = words.split_first() else {
            continue;
        };
        let name = String::from_utf8_lossy(name).into_owned();
        let reply = engine.execute_async(name, args.to_vec()).await;
        stdout.write_all(format!("{reply}\n").as_bytes()).await?;
        stdout.flush().await?;
    }

    engine.shutdown();
    if let Err(e) = sweeper.await {
        warn!("expiry task ended abnormally: {e}");
    }
    Ok(())
}
