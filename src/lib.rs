// PlantScope - plant collection library
// Local/remote collection reconciliation and deduplication.

pub mod constants;
pub mod error;
pub mod identity;
pub mod model;
pub mod db;
pub mod hash;
pub mod media;
pub mod recognition;
pub mod store;
pub mod reconcile;
pub mod locks;
pub mod view;
pub mod config;
pub mod friends;
pub mod collection;

pub use collection::{AddOutcome, Collection, RecordRef, RemoteRemoval, RemoteWrite, RemoveOutcome};
pub use config::CollectionConfig;
pub use error::{PlantScopeError, Result};
pub use identity::{derive_key, IdentityKey};
pub use model::{CollectionView, PlantRecord, UserId, UserSession};
pub use reconcile::{merge_view, SyncReport};
pub use view::ViewState;
