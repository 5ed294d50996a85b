//! Record lifecycle engine for rowbind.
//!
//! A [`Database`] holds named clients, the model registry and the
//! [`EngineConfig`]. Each registered model is operated on through a
//! [`ModelHandle`], which runs reads (`get`, `mget`, `first`, `all`) and
//! writes (`save`, `remove`, `modify`) through the hook and validation
//! pipeline, applies optimistic revision guards and batch-loads relations
//! named by an [`Include`].
//!
//! # Example
//!
//! ```ignore
//! let db = Database::new();
//! db.register_client("default", conn)?;
//! db.define(ModelDescriptor::builder("user").revisioned().build())?;
//!
//! let users = db.model("user")?;
//! let ann = users.save(&Record::new().with("name", "Ann")).await?;
//!
//! // Only applies while the row still has `active = true`.
//! let guard = Predicate::new().eq("active", true);
//! users.modify(ann, &guard, |r| { r.set("name", "Anne"); }).await?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod include;
pub mod n1_detection;

pub use config::EngineConfig;
pub use context::Database;
pub use engine::{Lookup, ModelHandle, Order, OrderFn, QueryOptions};
pub use include::Include;
pub use n1_detection::{N1QueryTracker, N1Stats};
