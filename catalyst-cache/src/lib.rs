//! Single-threaded caches that share expensive resources by key.
//!
//! - [`RetentionCache`]: reference-counted instances, disposed a fixed time
//!   after their last user leaves
//! - [`SubscriptionCache`]: one upstream feed per key, fanned out to many
//!   listeners, with the latest value replayed to late subscribers
//!
//! Disposal timers run on a [`Scheduler`]. [`ManualScheduler`] drives them
//! from a virtual clock; `TokioScheduler` (feature `tokio`) uses the tokio
//! timer inside a `LocalSet`.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use std::time::Duration;
//! use catalyst_cache::{CachePolicy, ManualScheduler, RetentionCache};
//!
//! let scheduler = ManualScheduler::new();
//! let policy = CachePolicy::from_toml_str("retention_ms = 500").unwrap();
//! let cache = RetentionCache::new(
//!     policy,
//!     Rc::new(scheduler.clone()),
//!     |name: &&str| name.to_string(),
//!     |name: &&str| format!("connection to {name}"),
//!     |_conn: String| {},
//! );
//!
//! let lease = cache.acquire(&"db");
//! assert_eq!(lease.instance(), "connection to db");
//! lease.release();
//!
//! scheduler.advance(Duration::from_millis(500));
//! assert_eq!(cache.size(), 0);
//! ```

mod config;
mod retention;
mod scheduler;
mod subscription;
#[cfg(test)]
mod test_log;

pub use config::{CachePolicy, ConfigError};
pub use retention::{Lease, RetentionCache};
#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{ManualScheduler, Scheduler, Task, TimerHandle};
pub use subscription::{Emitter, Listener, Subscription, SubscriptionCache, Teardown};
