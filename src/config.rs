use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Immutable, validated pool configuration.
///
/// Grounded on `sqlx-core`'s `PoolOptions<DB>` field set, flattened into a
/// plain record (this crate's `ConnectionFactory`/`Dialect` collaborators
/// stand in for the driver identifier + URL + credentials fields; see
/// [`PoolOptions`] for the chainable builder and [`PoolConfig::from_properties`]
/// for the string-keyed binding).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    pub init_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub increment: u32,
    pub retries: u32,
    pub retry_interval: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_connection: bool,
    pub test_before_acquire: bool,
    pub test_timeout: Duration,
    pub janitor_period: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            init_size: 0,
            min_size: 0,
            max_size: 10,
            increment: 1,
            retries: 3,
            retry_interval: Duration::from_millis(500),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            test_connection: true,
            test_before_acquire: false,
            test_timeout: Duration::from_secs(5),
            janitor_period: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Validates the invariants from the data model: `init <= min <= max`,
    /// `increment >= 1`.
    pub fn validate(&self) -> Result<()> {
        if self.init_size > self.min_size {
            return Err(Error::ConfigInvalid(
                "init_size must be <= min_size".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(Error::ConfigInvalid("min_size must be <= max_size".into()));
        }
        if self.max_size == 0 {
            return Err(Error::ConfigInvalid("max_size must be >= 1".into()));
        }
        if self.increment == 0 {
            return Err(Error::ConfigInvalid("increment must be >= 1".into()));
        }
        Ok(())
    }

    /// Binds the recognised property-bag keys from `§6` onto a
    /// [`PoolOptions`] builder, defaulting unrecognised or absent keys and
    /// logging (rather than failing on) unknown keys.
    ///
    /// This is the explicit, enumerated substitute for the source's
    /// reflective field-by-name config binding.
    ///
    /// `driverClassName`, `url`, and `username` are required: their values
    /// aren't stored on `PoolConfig` (that collaborator wiring belongs to
    /// the caller's `ConnectionFactory`), but their *presence* in the
    /// property bag is still part of the pool's construction contract, so
    /// a missing key fails with [`Error::ConfigMissing`].
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        for key in ["driverClassName", "url", "username"] {
            if !props.contains_key(key) {
                return Err(Error::ConfigMissing(key));
            }
        }

        let mut opts = PoolOptions::new();

        for (key, value) in props {
            match key.as_str() {
                "driverClassName" | "url" | "username" | "password" => {
                    // Collaborator wiring (driver identity/credentials) is owned
                    // by the caller's `ConnectionFactory`, not by `PoolConfig`;
                    // these keys are recognised but not stored here.
                }
                "initSize" => opts = opts.init_size(parse(key, value)?),
                "minSize" => opts = opts.min_size(parse(key, value)?),
                "maxSize" => opts = opts.max_size(parse(key, value)?),
                "increment" => opts = opts.increment(parse(key, value)?),
                "retries" => opts = opts.retries(parse(key, value)?),
                "retryInterval" => {
                    opts = opts.retry_interval(Duration::from_millis(parse(key, value)?))
                }
                "getConnectionTimeout" => {
                    opts = opts.acquire_timeout(Duration::from_millis(parse(key, value)?))
                }
                "inactiveTimeout" => {
                    opts = opts.idle_timeout(non_zero_millis(parse(key, value)?))
                }
                "maxLifetime" => opts = opts.max_lifetime(non_zero_millis(parse(key, value)?)),
                "testConnection" => opts = opts.test_connection(parse(key, value)?),
                "testSql" => { /* consumed by the caller's Dialect, not stored here */ }
                "testTimeout" => {
                    opts = opts.test_timeout(Duration::from_millis(parse(key, value)?))
                }
                other => {
                    tracing::warn!(key = other, "ignoring unrecognised pool configuration key");
                }
            }
        }

        opts.build()
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::ConfigInvalid(format!("invalid value for `{key}`: {value}")))
}

fn non_zero_millis(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

/// Chainable builder for [`PoolConfig`], mirroring `sqlx-core`'s
/// `PoolOptions<DB>` method-per-field style.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    inner: PoolConfig,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, $name: $ty) -> Self {
            self.inner.$name = $name;
            self
        }
    };
}

impl PoolOptions {
    pub fn new() -> Self {
        Self {
            inner: PoolConfig::default(),
        }
    }

    setter!(init_size: u32);
    setter!(min_size: u32);
    setter!(max_size: u32);
    setter!(increment: u32);
    setter!(retries: u32);
    setter!(retry_interval: Duration);
    setter!(acquire_timeout: Duration);
    setter!(idle_timeout: Option<Duration>);
    setter!(max_lifetime: Option<Duration>);
    setter!(test_connection: bool);
    setter!(test_before_acquire: bool);
    setter!(test_timeout: Duration);
    setter!(janitor_period: Duration);

    pub fn build(self) -> Result<PoolConfig> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_init_greater_than_min() {
        let err = PoolOptions::new()
            .init_size(5)
            .min_size(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    fn required_props() -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert("driverClassName".to_string(), "org.postgresql.Driver".to_string());
        props.insert("url".to_string(), "jdbc:postgresql://localhost/db".to_string());
        props.insert("username".to_string(), "admin".to_string());
        props
    }

    #[test]
    fn from_properties_defaults_unset_fields() {
        let mut props = required_props();
        props.insert("maxSize".to_string(), "20".to_string());
        props.insert("unknownKey".to_string(), "ignored".to_string());

        let cfg = PoolConfig::from_properties(&props).unwrap();
        assert_eq!(cfg.max_size, 20);
        assert_eq!(cfg.min_size, 0);
    }

    #[test]
    fn from_properties_requires_driver_url_and_username() {
        let props = HashMap::new();
        let err = PoolConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));

        let mut partial = required_props();
        partial.remove("username");
        let err = PoolConfig::from_properties(&partial).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing("username")));
    }
}
