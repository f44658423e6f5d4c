//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `KeyValueStore` using a JSON document in the platform data directory
//! - `BridgeTransport` using `reqwest`, replying through the `ResponseSink`
//!   from a Tokio task
//!
//! Navigation is always host-specific, so no desktop `Navigator` is shipped;
//! headless hosts use `bridge_traits::InMemoryNavigator`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileKeyValueStore, ReqwestTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = FileKeyValueStore::open_default("media-client").unwrap();
//!     let transport = ReqwestTransport::new().unwrap();
//!     // Hand both to CoreConfig::builder()
//! }
//! ```

mod store;
mod transport;

pub use store::FileKeyValueStore;
pub use transport::ReqwestTransport;
