//! The interception runtime seen by the lifecycle controller.
//!
//! `Registration` is the worker's own registration record; `Clients` is the set of
//! open pages the worker can take over and reload.

pub mod clients;
pub mod registration;

use async_trait::async_trait;
use tether_core::Error;

pub use clients::{ClientEvent, ClientRegistry};
pub use registration::PersistedRegistration;

/// An open window known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: u64,
    /// The page the window currently shows.
    pub url: String,
    /// Whether a worker controls this window's requests.
    pub controlled: bool,
}

#[async_trait]
pub trait Registration: Send + Sync {
    /// Whether a worker was already active before this one.
    async fn has_active_worker(&self) -> Result<bool, Error>;

    /// Allow activation without waiting for existing clients to close.
    async fn skip_waiting(&self);

    /// Record this worker as the active one.
    async fn mark_active(&self, architecture: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every open client, including uncontrolled ones.
    ///
    /// Returns the number of clients newly brought under control.
    async fn claim(&self) -> usize;

    /// Open window clients. Uncontrolled windows are listed only when asked for.
    async fn windows(&self, include_uncontrolled: bool) -> Vec<WindowClient>;

    /// Make window `id` load `url`.
    async fn navigate(&self, id: u64, url: &str) -> Result<(), Error>;
}
