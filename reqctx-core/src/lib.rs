//! # Reqctx Core
//!
//! A side table for per-request data.
//!
//! Code handling a request attaches values to the request's
//! [`RequestHandle`] (decoded auth, parsed body, timings, ...) and any other
//! code that has the handle can read them back later, without threading the
//! data through every call.
//!
//! ## Features
//!
//! - One store per process, cheaply clonable, safe to share across threads
//! - Slot and creation-time tables kept consistent under a single lock
//! - `get` (returns a nil sentinel) and `get_ok` (returns `Option`) lookups
//! - Detached snapshots of a whole slot with `get_all`
//! - Scoped clearing that survives early returns, panics and cancellation
//! - Age-based purge plus an optional background [`Sweeper`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use reqctx_core::{RequestHandle, Store, SweepConfig, Sweeper, Value};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Store::new();
//!
//!     // Reclaim anything a handler forgot to clear
//!     let config = SweepConfig::default()
//!         .with_interval(Duration::from_secs(30))
//!         .with_max_age(Duration::from_secs(600));
//!     let _sweeper = Sweeper::spawn(store.clone(), config).unwrap();
//!
//!     // Per request: the slot is cleared once the handler finishes
//!     let req = RequestHandle::new();
//!     store
//!         .scope_async(req, async {
//!             store.set(&req, "user", Value::new("alice".to_string()));
//!
//!             let user = store.get(&req, &"user");
//!             println!("user: {:?}", user.downcast_ref::<String>());
//!         })
//!         .await;
//!
//!     assert!(store.get_all(&req).is_none());
//! }
//! ```

mod clock;
mod config;
mod handle;
mod scope;
mod store;
mod sweeper;
mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SweepConfig;
pub use handle::RequestHandle;
pub use scope::ClearGuard;
pub use store::Store;
pub use sweeper::{SweepError, Sweeper};
pub use value::Value;
