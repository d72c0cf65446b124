//! Tensor Vault
//!
//! A serving backend for partitioned machine-learning pipelines whose
//! weights are encrypted at rest. Partitions are sealed with AES-256-GCM
//! at registration, linked into an operator graph by tensor-name prefix
//! matching, and executed in dependency order at inference time.
//!
//! # Trust Boundaries
//!
//! - Wire: one length-prefixed request per connection, handled
//!   sequentially. No request is trusted before the checked cursor has
//!   validated every length field.
//! - Weights: plaintext exists only inside the serving process. Durable
//!   deployments keep ciphertext on disk and re-authenticate every
//!   partition against its client-supplied tag on each run.
//! - Runtime: tensor execution is behind the [`runtime::InferenceRuntime`]
//!   trait; the backend never sees key material.

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod graph;
pub mod runtime;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod wire;

use std::sync::Arc;

use config::EnvConfig;
use dispatch::Dispatcher;
use runtime::InferenceRuntime;
use server::{Server, ServerError};

/// A fully wired serving instance.
pub struct Vault {
    pub config: EnvConfig,
    pub dispatcher: Arc<Dispatcher>,
}

impl Vault {
    /// Wire a dispatcher and store for the given configuration.
    pub fn new(config: EnvConfig, runtime: Box<dyn InferenceRuntime>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config, runtime));
        Self { config, dispatcher }
    }

    /// Bind the listener and serve until shutdown.
    pub async fn serve(self) -> Result<(), ServerError> {
        let server = Server::bind(&self.config, self.dispatcher.clone()).await?;
        server.run().await
    }
}
