//! The engine: a keyspace, its live configuration and the background sweep.

use crate::command;
use crate::config::Config;
use crate::reply::Reply;
use crate::store::Keyspace;
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Engine {
    keyspace: Keyspace,
    config: RwLock<Config>,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        info!(hz = config.hz, active_expire = config.active_expire_enabled, "engine created");
        Engine {
            keyspace: Keyspace::new(),
            config: RwLock::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn config(&self) -> RwLockReadGuard<'_, Config> {
        self.config.read()
    }

    pub fn config_mut(&self) -> RwLockWriteGuard<'_, Config> {
        self.config.write()
    }

    /// Run one command. `name` is matched case-insensitively and `args`
    /// excludes it. Errors come back as `Reply::Error`.
    pub fn execute(&self, name: &str, args: &[Bytes]) -> Reply {
        let name = name.to_ascii_uppercase();
        match command::dispatch(self, &name, args) {
            Ok(reply) => reply,
            Err(e) => Reply::Error(e.to_string()),
        }
    }

    /// Run a command on tokio's blocking pool so key locks are never held
    /// across an await point.
    pub async fn execute_async(self: &Arc<Self>, name: String, args: Vec<Bytes>) -> Reply {
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || engine.execute(&name, &args)).await {
            Ok(reply) => reply,
            Err(e) => Reply::error(format!("ERR command task failed: {e}")),
        }
    }

    /// Start the active expiry sweep. It runs `hz` times a second until
    /// [`Engine::shutdown`] is called.
    pub fn spawn_expiry_task(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let (hz, enabled, sample) = {
                    let cfg = engine.config();
                    (cfg.hz, cfg.active_expire_enabled, cfg.active_expire_sample)
                };
                let interval = Duration::from_millis(1000 / hz.max(1));

                tokio::select! {
                    _ = engine.shutdown.cancelled() => {
                        debug!("expiry sweep stopped");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if enabled {
                    let removed = engine.keyspace.active_expire_cycle(sample);
                    if removed > 0 {
                        debug!(removed, "active expiry sweep");
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_execute_is_case_insensitive() {
        let engine = Engine::new(Config::default());
        assert_eq!(engine.execute("set", &[b("k"), b("v")]), Reply::ok());
        assert_eq!(engine.execute("GeT", &[b("k")]), Reply::bulk_string("v"));
    }

    #[test]
    fn test_errors_become_replies() {
        let engine = Engine::new(Config::default());
        let reply = engine.execute("nosuch", &[b("a")]);
        assert_eq!(reply, Reply::error("ERR unknown command 'nosuch', with args beginning with: 'a'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_task_runs_until_shutdown() {
        let engine = Arc::new(Engine::new(Config::default()));
        engine.execute("SET", &[b("kept"), b("v")]);
        let task = engine.spawn_expiry_task();

        for _ in 0..20 {
            tokio::time::advance(Duration::from_millis(100)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.keyspace().len(), 1);
        assert!(!task.is_finished());

        engine.shutdown();
        task.await.unwrap();
    }
}
