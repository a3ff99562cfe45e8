#[derive(Debug, Clone)]
pub struct Config {
    /// Active expiry sweeps per second.
    pub hz: u64,
    pub loglevel: String,
    pub active_expire_enabled: bool,
    /// Keys sampled per stripe on each sweep.
    pub active_expire_sample: usize,
    /// COUNT used by the SCAN family when none is given.
    pub scan_default_count: usize,
    /// Blocking worker threads used by the shell to run commands.
    pub workers: usize,
    /// Longest string a command may create, in bytes.
    pub proto_max_bulk_len: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hz: 10,
            loglevel: "info".to_string(),
            active_expire_enabled: true,
            active_expire_sample: 20,
            scan_default_count: 10,
            workers: 4,
            proto_max_bulk_len: 512 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Build a config from `--name value` pairs. Bad values keep their
    /// defaults and are returned as messages for the caller to report once
    /// logging is up.
    pub fn from_args(args: &[String]) -> (Self, Vec<String>) {
        let mut config = Config::default();
        let mut rejected = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let name = args[i].trim_start_matches("--");
            if args[i].starts_with("--") && i + 1 < args.len() {
                if let Err(e) = config.set(name, &args[i + 1]) {
                    rejected.push(format!("ignoring --{name}: {e}"));
                }
                i += 1;
            }
            i += 1;
        }
        (config, rejected)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key.to_lowercase().as_str() {
            "hz" => Some(self.hz.to_string()),
            "loglevel" => Some(self.loglevel.clone()),
            "active-expire" => Some(yes_no(self.active_expire_enabled)),
            "active-expire-sample" => Some(self.active_expire_sample.to_string()),
            "scan-count" => Some(self.scan_default_count.to_string()),
            "workers" => Some(self.workers.to_string()),
            "proto-max-bulk-len" => Some(self.proto_max_bulk_len.to_string()),
            _ => None,
        }
    }

    /// Names accepted by [`Config::get`], for `CONFIG GET` patterns.
    pub fn names() -> &'static [&'static str] {
        &[
            "hz",
            "loglevel",
            "active-expire",
            "active-expire-sample",
            "scan-count",
            "workers",
            "proto-max-bulk-len",
        ]
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_lowercase().as_str() {
            "hz" => {
                let hz: u64 = value.parse().map_err(|_| "Invalid hz value".to_string())?;
                self.hz = hz.clamp(1, 500);
            }
            "loglevel" => match value {
                "trace" | "debug" | "info" | "warn" | "error" => self.loglevel = value.to_string(),
                _ => return Err(format!("Invalid loglevel '{value}'")),
            },
            "active-expire" => self.active_expire_enabled = parse_yes_no(value)?,
            "active-expire-sample" => {
                self.active_expire_sample = value.parse().map_err(|_| "Invalid value".to_string())?;
            }
            "scan-count" => {
                let count: usize = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.scan_default_count = count.max(1);
            }
            "workers" => {
                let workers: usize = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.workers = workers.max(1);
            }
            "proto-max-bulk-len" => {
                self.proto_max_bulk_len = value.parse().map_err(|_| "Invalid value".to_string())?;
            }
            other => return Err(format!("Unknown option or number of arguments for CONFIG SET - '{other}'")),
        }
        Ok(())
    }
}

fn yes_no(b: bool) -> String {
    if b { "yes" } else { "no" }.to_string()
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err("argument must be 'yes' or 'no'".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_args() {
        let (config, rejected) = Config::from_args(&args(&["--hz", "50", "--active-expire", "no", "--scan-count", "100"]));
        assert!(rejected.is_empty());
        assert_eq!(config.hz, 50);
        assert!(!config.active_expire_enabled);
        assert_eq!(config.scan_default_count, 100);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let (config, rejected) = Config::from_args(&args(&["--hz", "fast", "--loglevel", "loud"]));
        assert_eq!(config.hz, 10);
        assert_eq!(config.loglevel, "info");
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].starts_with("ignoring --hz"));
    }

    #[test]
    fn test_get_set() {
        let mut config = Config::default();
        config.set("HZ", "20").unwrap();
        assert_eq!(config.get("hz").as_deref(), Some("20"));
        assert!(config.set("nope", "1").is_err());
        assert!(Config::names().iter().all(|n| config.get(n).is_some()));
    }
}
