//! Pool State Cache and the event feed that invalidates it

pub mod cache;
pub mod events;

pub use cache::{CatalogKey, CatalogSnapshot, PoolCache};
pub use events::{EventFeed, EventSource, PoolEvent, WsEventSource};
