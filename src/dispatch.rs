//! Request validation and routing.
//!
//! The dispatcher owns the model store and the inference runtime. Every
//! typed failure is converted to response text here; nothing below this
//! layer writes to the client, and nothing short of startup failure
//! terminates the process.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{CacheMode, EnvConfig};
use crate::crypto::{self, CryptoError, TAG_BYTES};
use crate::graph::{build_graph, execute, BuildError, ExecutionError, OperatorIo};
use crate::runtime::{InferenceRuntime, RuntimeError, TensorValue};
use crate::store::{ModelEntry, ModelStore, PartitionStorage, StoreError};
use crate::telemetry;
use crate::wire::{InferRequest, RegisterRequest, Request, Response};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no model registered under id {id}")]
    ModelNotFound { id: i32 },

    #[error("expected {expected} tags, got {got}")]
    TagCountMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Dispatcher {
    store: Mutex<ModelStore>,
    runtime: Box<dyn InferenceRuntime>,
    model_dir: PathBuf,
    cache_mode: CacheMode,
}

impl Dispatcher {
    pub fn new(config: &EnvConfig, runtime: Box<dyn InferenceRuntime>) -> Self {
        Self {
            store: Mutex::new(ModelStore::new()),
            runtime,
            model_dir: config.model_dir.clone(),
            cache_mode: config.cache_mode,
        }
    }

    /// Handle one decoded request, converting any failure to error text.
    pub fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Register(register) => self.register(register),
            Request::Infer(infer) => self.infer(infer),
            Request::Shutdown => {
                self.shutdown();
                Ok(Response::Text("shutting down".to_string()))
            }
        };

        match result {
            Ok(response) => response,
            Err(error) => {
                match &error {
                    DispatchError::Execution(ExecutionError::AuthenticationFailed { .. })
                    | DispatchError::Crypto(CryptoError::AuthenticationFailed { .. }) => {
                        telemetry::record_auth_failure();
                        warn!(%error, "partition authentication failed");
                    }
                    _ => warn!(%error, "request failed"),
                }
                Response::Error(error.to_string())
            }
        }
    }

    /// Number of models currently registered.
    pub fn model_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Drop every registered model so key material does not outlive the
    /// serving process.
    pub fn shutdown(&self) {
        let mut store = self.store.lock();
        let dropped = store.len();
        store.clear();
        info!(models = dropped, "store cleared for shutdown");
    }

    /// Remove a single model. Not reachable over the wire; exposed for
    /// operational embeddings.
    pub fn remove_model(&self, id: i32) -> bool {
        self.store.lock().remove(id).is_some()
    }

    fn register(&self, request: RegisterRequest) -> Result<Response, DispatchError> {
        if request.id != -1 {
            return Err(DispatchError::MalformedRequest(format!(
                "registration must use id -1, got {}",
                request.id
            )));
        }
        if request.partition_names.is_empty() {
            return Err(DispatchError::MalformedRequest(
                "registration carries no partitions".to_string(),
            ));
        }
        if request.partition_names.len() != request.partitions.len() {
            return Err(DispatchError::MalformedRequest(format!(
                "{} names for {} partition blobs",
                request.partition_names.len(),
                request.partitions.len()
            )));
        }
        for (i, name) in request.partition_names.iter().enumerate() {
            if name.is_empty() {
                return Err(DispatchError::MalformedRequest(format!(
                    "partition {i} has an empty name"
                )));
            }
            if request.partition_names[..i].contains(name) {
                return Err(DispatchError::MalformedRequest(format!(
                    "duplicate partition name '{name}'"
                )));
            }
        }
        if request.tokenizer.is_some() && !request.inputs.is_empty() {
            return Err(DispatchError::MalformedRequest(
                "tokenizer and tensor inputs are mutually exclusive".to_string(),
            ));
        }

        // Introspect every blob before touching the store; one bad
        // partition aborts the whole registration.
        let mut ios = Vec::with_capacity(request.partitions.len());
        for (name, blob) in request.partition_names.iter().zip(&request.partitions) {
            let signature = self.runtime.introspect(blob)?;
            ios.push(OperatorIo {
                name: name.clone(),
                input_names: signature.inputs,
                output_names: signature.outputs,
            });
        }
        let graph = build_graph(&ios)?;

        let (params, ciphertexts) = crypto::seal_pipeline(&request.partitions)?;

        // The duplicate check runs before any artifact leaves memory; a
        // rejected registration must not disturb the stored model's
        // sealed files. Paths carry the pending id so models sharing a
        // partition name cannot clobber each other either.
        let mut store = self.store.lock();
        if let Some(existing) = store.find_duplicate(&request.partition_names) {
            return Err(StoreError::DuplicateModel { id: existing }.into());
        }
        let pending = store.next_id();

        let (storage, tags) = match self.cache_mode {
            CacheMode::Resident => (PartitionStorage::Resident(request.partitions), Vec::new()),
            CacheMode::Durable => {
                let paths = self.write_sealed(pending, &request.partition_names, &ciphertexts)?;
                (PartitionStorage::Durable(paths), params.tags_hex())
            }
        };

        let id = store.insert(ModelEntry {
            partition_names: request.partition_names,
            params,
            graph,
            storage,
            tokenizer: request.tokenizer,
        })?;

        telemetry::record_registration();
        info!(id, mode = ?self.cache_mode, "model registered");
        Ok(Response::Registered {
            id: id.to_string(),
            tags,
        })
    }

    fn write_sealed(
        &self,
        id: i32,
        names: &[String],
        ciphertexts: &[Vec<u8>],
    ) -> Result<Vec<PathBuf>, DispatchError> {
        fs::create_dir_all(&self.model_dir)?;
        let mut paths = Vec::with_capacity(ciphertexts.len());
        for (name, ciphertext) in names.iter().zip(ciphertexts) {
            let path = self.model_dir.join(format!("{id}_{name}.sealed"));
            fs::write(&path, ciphertext)?;
            paths.push(path);
        }
        Ok(paths)
    }

    fn infer(&self, request: InferRequest) -> Result<Response, DispatchError> {
        if request.model_id < 0 {
            return Err(DispatchError::MalformedRequest(format!(
                "inference needs an assigned id, got {}",
                request.model_id
            )));
        }
        if request.tokenizer.is_some() && !request.inputs.is_empty() {
            return Err(DispatchError::MalformedRequest(
                "tokenizer and tensor inputs are mutually exclusive".to_string(),
            ));
        }

        let store = self.store.lock();
        let model = store
            .get(request.model_id)
            .ok_or(DispatchError::ModelNotFound {
                id: request.model_id,
            })?;

        let expected_tags = match self.cache_mode {
            CacheMode::Resident => 0,
            CacheMode::Durable => model.partition_names.len(),
        };
        if request.tags.len() != expected_tags {
            return Err(DispatchError::TagCountMismatch {
                expected: expected_tags,
                got: request.tags.len(),
            });
        }

        let mut tags: Vec<[u8; TAG_BYTES]> = Vec::with_capacity(request.tags.len());
        for tag in &request.tags {
            tags.push(crypto::parse_tag_hex(tag)?);
        }

        // Read ciphertext up front so file problems surface as Io, not
        // as a mid-graph execution failure.
        let ciphertexts: Option<Vec<Vec<u8>>> = match &model.storage {
            PartitionStorage::Resident(_) => None,
            PartitionStorage::Durable(paths) => {
                let mut blobs = Vec::with_capacity(paths.len());
                for path in paths {
                    blobs.push(fs::read(path)?);
                }
                Some(blobs)
            }
        };

        // The stored tokenizer is only a fallback for requests that
        // carry neither tensors nor a tokenizer of their own; tensor
        // inputs always drive the graph.
        let tokenizer = request.tokenizer.as_deref().or_else(|| {
            if request.inputs.is_empty() {
                model.tokenizer.as_deref()
            } else {
                None
            }
        });
        if let Some(tokenizer) = tokenizer {
            let blob = match (&model.storage, &ciphertexts) {
                (PartitionStorage::Resident(plaintexts), _) => plaintexts[0].clone(),
                (PartitionStorage::Durable(_), Some(blobs)) => crypto::open_partition(
                    &model.params,
                    0,
                    &blobs[0],
                    tags.first().unwrap_or(&model.params.tags[0]),
                )?,
                (PartitionStorage::Durable(_), None) => unreachable!(),
            };
            let text = self.runtime.run_text(&blob, tokenizer)?;
            telemetry::record_inference(true);
            return Ok(Response::Text(text));
        }

        if request.inputs.is_empty() {
            return Err(DispatchError::MalformedRequest(
                "inference carries no input tensors".to_string(),
            ));
        }
        let inputs: Vec<TensorValue> = request
            .inputs
            .iter()
            .map(|t| TensorValue::new(t.shape(), t.data().to_vec()))
            .collect();

        let partition_names = model.partition_names.clone();
        let result = execute(&model.graph, self.runtime.as_ref(), &inputs, |index| {
            match (&model.storage, &ciphertexts) {
                (PartitionStorage::Resident(plaintexts), _) => Ok(plaintexts[index].clone()),
                (PartitionStorage::Durable(_), Some(blobs)) => {
                    crypto::open_partition(&model.params, index, &blobs[index], &tags[index])
                        .map_err(|_| ExecutionError::AuthenticationFailed {
                            partition: partition_names[index].clone(),
                        })
                }
                (PartitionStorage::Durable(_), None) => unreachable!(),
            }
        });

        match result {
            Ok(prediction) => {
                telemetry::record_inference(true);
                Ok(Response::Prediction {
                    partition: prediction.partition,
                    score: prediction.score,
                    category: prediction.category,
                })
            }
            Err(error) => {
                telemetry::record_inference(false);
                Err(error.into())
            }
        }
    }
}
