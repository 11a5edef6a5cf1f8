// Store adapters
// local: the on-device collection payload
// remote: per-user document collections

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::{DocumentStore, RemoteStore};
