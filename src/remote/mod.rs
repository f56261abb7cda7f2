//! Interfaces to the external managed services. The crate never talks to
//! auth, storage or image hosting except through these traits.

pub mod auth;
pub mod data;
pub mod memory;
pub mod upload;

use async_trait::async_trait;
use std::sync::Arc;

pub use auth::{AuthChange, AuthEvent, AuthProvider, AuthUser, DynAuthProvider, Session, UserMetadata};
pub use data::{
    ChangeEvent, ChangeKind, DataStore, DynDataStore, LikeRow, NewPost, PostId, PostRow,
    ProfileRow, Table, UserId,
};
pub use memory::MemoryBackend;
pub use upload::{is_remote_url, DynImageUploader, HttpImageUploader, ImageUploader};

/// Reachability probe consulted before flows that want a pre-flight
/// connectivity check (sign-in). Hosts plug in their platform's network
/// monitor; `None` skips the check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_connected(&self) -> bool;
}

pub type DynConnectivityProbe = Arc<dyn ConnectivityProbe>;
