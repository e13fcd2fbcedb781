//! Long-term multi-modal memory engine for conversational agents.
//!
//! Mirix ingests a heterogeneous stream of observations (text,
//! screenshots, audio) captured over time, classifies and stores them
//! across six specialized memory types, and serves
//! semantic/lexical/fuzzy retrieval queries that ground a chat agent's
//! responses.
//!
//! # Architecture
//!
//! ```text
//! send_message(obs, memorizing)
//!   ├── UploadManager      — worker pool materializes media blobs
//!   ├── TemporaryAccumulator — buffers in temporal order, flushes when ready
//!   ├── MetaRouter         — routed (meta agent) or direct fan-out dispatch
//!   ├── MessageQueue       — per-agent-type FIFO over concurrent submissions
//!   └── MemoryManagers     — episodic / semantic / procedural / resource /
//!                            knowledge-vault / core, over one SQLite Store
//! ask(query)
//!   └── chat agent → search_in_memory tools → respond_to_user reply
//! ```
//!
//! External collaborators stay behind traits: [`llm::LlmProvider`],
//! [`blob::BlobStore`], [`embedding::Embedder`],
//! [`transcribe::Transcriber`].

pub mod accumulator;
pub mod agents;
pub mod blob;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod ids;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod queue;
pub mod reflexion;
pub mod router;
pub mod schema;
pub mod store;
pub mod transcribe;
pub mod upload;

pub use accumulator::{ObservationInput, TemporaryAccumulator};
pub use config::{AgentFileConfig, EngineConfig};
pub use coordinator::{Coordinator, EngineDeps, ModelUpdate};
pub use error::{AgentError, ConfigError, MemoryError, UploadError};
pub use memory::{MemoryManagers, SearchMethod};
pub use queue::MessageQueue;
pub use router::{MetaRouter, RouterMode};
pub use store::Store;
pub use upload::{UploadManager, UploadOptions};
