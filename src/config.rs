use serde::Deserialize;

const DEFAULT_LOG_FILE_NAME: &str = "simpledb.log";
const DEFAULT_MAX_WAIT_MS: u64 = 10_000;

fn default_log_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT_MS
}

/// The configuration surface a caller opens a database with: where its
/// files live, how big a block is, how many buffer frames to keep, the log
/// file's name, and how long a blocked pin/lock waits before aborting.
///
/// Deserializable so a caller can load it from a TOML/JSON file instead of
/// constructing it by hand.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_directory: String,
    pub block_size: usize,
    pub buffer_pool_size: usize,

    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Config {
    pub fn new(db_directory: impl Into<String>, block_size: usize, buffer_pool_size: usize) -> Self {
        Self {
            db_directory: db_directory.into(),
            block_size,
            buffer_pool_size,
            log_file_name: default_log_file_name(),
            max_wait_ms: default_max_wait_ms(),
        }
    }

    pub fn with_log_file_name(mut self, name: impl Into<String>) -> Self {
        self.log_file_name = name.into();
        self
    }

    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn new_fills_in_defaults() {
        let cfg = Config::new("/tmp/db", 400, 8);
        assert_eq!(cfg.log_file_name, "simpledb.log");
        assert_eq!(cfg.max_wait_ms, 10_000);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let cfg = Config::new("/tmp/db", 400, 8)
            .with_log_file_name("custom.log")
            .with_max_wait_ms(5_000);
        assert_eq!(cfg.log_file_name, "custom.log");
        assert_eq!(cfg.max_wait_ms, 5_000);
    }
}
