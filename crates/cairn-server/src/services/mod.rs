//! Service implementations for the four RPC groups.

pub mod routing;
pub mod search;
pub mod store;
pub mod sync;

pub use routing::RoutingServiceImpl;
pub use search::SearchServiceImpl;
pub use store::StoreServiceImpl;
pub use sync::SyncServiceImpl;
