#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod factory;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod raw;

pub use config::{PoolConfig, PoolOptions};
pub use error::{Error, Result};
pub use factory::ConnectionFactory;
pub use health::{Dialect, FixedDialect, HealthProbe, NoopProbe, QueryProbe};
pub use pool::Pool;
pub use proxy::PooledConnection;
pub use raw::{RawConnection, Statement};
