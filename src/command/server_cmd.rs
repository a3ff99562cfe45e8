use crate::command::upper;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KeelError, KeelResult};
use crate::glob::glob_match;
use crate::reply::Reply;
use bytes::Bytes;
use tracing::info;

pub fn cmd_ping(_engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    match args {
        [] => Ok(Reply::simple_string("PONG")),
        [msg] => Ok(Reply::bulk_string(msg.to_vec())),
        _ => Err(KeelError::arity("ping")),
    }
}

pub fn cmd_echo(_engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    match args {
        [msg] => Ok(Reply::bulk_string(msg.to_vec())),
        _ => Err(KeelError::arity("echo")),
    }
}

pub fn cmd_dbsize(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    if !args.is_empty() {
        return Err(KeelError::arity("dbsize"));
    }
    Ok(Reply::integer(engine.keyspace().len() as i64))
}

pub fn cmd_flushall(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    // ASYNC and SYNC are accepted and behave the same.
    if args.len() > 1 || args.first().is_some_and(|a| !matches!(upper(a).as_str(), "ASYNC" | "SYNC")) {
        return Err(KeelError::SyntaxError);
    }
    engine.keyspace().lock_all().clear();
    info!("keyspace flushed");
    Ok(Reply::ok())
}

pub fn cmd_config(engine: &Engine, args: &[Bytes]) -> KeelResult<Reply> {
    let Some(sub) = args.first() else {
        return Err(KeelError::arity("config"));
    };

    match upper(sub).as_str() {
        "GET" => {
            if args.len() < 2 {
                return Err(KeelError::arity("config|get"));
            }
            let config = engine.config();
            let mut result = Vec::new();
            for name in Config::names() {
                if !args[1..].iter().any(|p| glob_match(&p.to_ascii_lowercase(), name.as_bytes())) {
                    continue;
                }
                if let Some(value) = config.get(name) {
                    result.push(Reply::bulk_string(name.as_bytes()));
                    result.push(Reply::bulk_string(value));
                }
            }
            Ok(Reply::array(result))
        }
        "SET" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return Err(KeelError::arity("config|set"));
            }
            // Validate every pair against a copy so a bad one changes nothing.
            let mut updated = engine.config().clone();
            for pair in args[1..].chunks(2) {
                let name = String::from_utf8_lossy(&pair[0]);
                let value = String::from_utf8_lossy(&pair[1]);
                updated.set(&name, &value).map_err(KeelError::Generic)?;
            }
            *engine.config_mut() = updated;
            info!(changes = (args.len() - 1) / 2, "configuration updated");
            Ok(Reply::ok())
        }
        other => Err(KeelError::generic(format!(
            "unknown subcommand '{}'. Try CONFIG HELP.",
            other.to_lowercase()
        ))),
    }
}
