use envconfig::Envconfig;
use lazy_static::lazy_static;

/// Number of elements stored per shard when the caller does not pick a shard count.
pub const DEFAULT_ELEMENTS_PER_SHARD: usize = 32 * 1024 * 1024;
/// Upper bound in bytes for a single chunk written by `create_from_array`.
pub const DEFAULT_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

#[derive(Debug, Envconfig)]
pub struct Config {
    #[envconfig(from = "BIGCOL_LOG_LEVEL", default = "info")]
    pub log_level: String,
    //Memory limit in bytes for one chunked write
    #[envconfig(from = "BIGCOL_MEMORY_LIMIT", default = "268435456")]
    pub memory_limit: usize,
    #[envconfig(from = "BIGCOL_ELEMENTS_PER_SHARD", default = "33554432")]
    pub elements_per_shard: usize,
}

impl Config {
    pub fn init() -> Config {
        Config::init_from_env().expect("Failed to load config")
    }

    /// Memory limit used for chunked writes. Zero falls back to the default.
    pub fn memory_limit(&self) -> usize {
        if self.memory_limit == 0 {
            DEFAULT_MEMORY_LIMIT
        } else {
            self.memory_limit
        }
    }

    /// Elements per shard used to derive a shard count. Zero falls back to the default.
    pub fn elements_per_shard(&self) -> usize {
        if self.elements_per_shard == 0 {
            DEFAULT_ELEMENTS_PER_SHARD
        } else {
            self.elements_per_shard
        }
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = Config {
            log_level: "info".to_string(),
            memory_limit: 0,
            elements_per_shard: 0,
        };
        assert_eq!(config.memory_limit(), DEFAULT_MEMORY_LIMIT);
        assert_eq!(config.elements_per_shard(), DEFAULT_ELEMENTS_PER_SHARD);
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = Config {
            log_level: "debug".to_string(),
            memory_limit: 4096,
            elements_per_shard: 10,
        };
        assert_eq!(config.memory_limit(), 4096);
        assert_eq!(config.elements_per_shard(), 10);
    }
}
