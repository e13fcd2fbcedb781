//! Top-level façade wiring the engine together.
//!
//! The coordinator owns the agent identities, the active persona and
//! timezone, the model selection, and the API-key lifecycle. Ingest goes
//! through [`Coordinator::send_message`]: memorizing traffic feeds the
//! accumulator and flushes through the router when enough is ready;
//! chat traffic composes recent-image context, runs the chat agent's
//! tool loop under queue ordering, and extracts the user-facing reply.
//!
//! Retrieval errors never escape as `Err`: the chat path returns the
//! sentinel tokens of [`ReplyError`](crate::agents::reply::ReplyError)
//! so a front-end can always render something recoverable.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};

use crate::accumulator::{ObservationInput, ReadyObservation, TemporaryAccumulator, assemble_flush_prompt};
use crate::agents::reply::{ReplyError, extract_reply};
use crate::agents::toolset::{self, RESPOND_TOOL};
use crate::agents::{AgentKind, AgentRegistry, ToolExecutor, run_tool_loop};
use crate::blob::BlobStore;
use crate::config::{
    EngineConfig, ModelProvider, is_allowed_memory_model, provider_for_model,
};
use crate::embedding::Embedder;
use crate::error::MemoryError;
use crate::llm::message::{ChatRequest, PromptPart, system_message, user_parts};
use crate::llm::provider::LlmProvider;
use crate::memory::MemoryManagers;
use crate::memory::search::parse_timezone;
use crate::prompts;
use crate::queue::MessageQueue;
use crate::reflexion::{ReflexionReport, reflexion_on_memory};
use crate::router::{MetaRouter, RouterMode};
use crate::schema::{CloudFileStatus, MessageRecord};
use crate::store::Store;
use crate::store::backup::AgentConfigSnapshot;
use crate::transcribe::Transcriber;
use crate::upload::{UploadManager, UploadOptions};

/// Organization that owns everything this coordinator creates.
pub const DEFAULT_ORGANIZATION_ID: &str = "org_default";

/// Core block labels created at startup.
const CORE_LABELS: [&str; 2] = ["persona", "human"];
/// Initial persona block value.
const DEFAULT_PERSONA_VALUE: &str = "helpful assistant";

/// External collaborators handed to the coordinator.
pub struct EngineDeps {
    /// Shared store.
    pub store: Store,
    /// Blob storage provider.
    pub blob: Arc<dyn BlobStore>,
    /// LLM provider.
    pub provider: Arc<dyn LlmProvider>,
    /// Embedding provider.
    pub embedder: Arc<dyn Embedder>,
    /// Audio transcriber.
    pub transcriber: Arc<dyn Transcriber>,
    /// Upload pipeline tuning.
    pub upload_options: UploadOptions,
}

/// Result of a model change request.
///
/// Missing keys are reported, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct ModelUpdate {
    /// Whether the model was applied.
    pub success: bool,
    /// Environment variables / key names still needed.
    pub missing_keys: Vec<String>,
    /// Human-readable detail on failure.
    pub message: Option<String>,
}

impl ModelUpdate {
    fn ok() -> Self {
        Self {
            success: true,
            missing_keys: Vec::new(),
            message: None,
        }
    }
}

#[derive(Debug)]
struct CoordinatorState {
    model_name: String,
    memory_model_name: String,
    persona: String,
    timezone_str: String,
    timezone: Option<Tz>,
    include_recent_screenshots: bool,
    missing_keys: BTreeSet<String>,
}

/// The memory engine façade.
pub struct Coordinator {
    config: EngineConfig,
    state: Mutex<CoordinatorState>,
    store: Store,
    managers: MemoryManagers,
    registry: AgentRegistry,
    queue: MessageQueue,
    router: MetaRouter,
    executor: Arc<ToolExecutor>,
    accumulator: TemporaryAccumulator,
    blob: Arc<dyn BlobStore>,
    provider: Mutex<Arc<dyn LlmProvider>>,
    transcriber: Arc<dyn Transcriber>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("agent_name", &self.config.agent_name)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Wires the engine together and runs startup reconciliation.
    ///
    /// Creates the core blocks if absent, then reconciles the cloud file
    /// mappings against the blob provider: mappings whose remote blob no
    /// longer exists are deleted, surviving ones seed the in-memory URI
    /// tracking cache.
    pub async fn new(config: EngineConfig, deps: EngineDeps) -> Result<Self, MemoryError> {
        let timezone = parse_timezone(&config.timezone_str).ok();
        let managers = MemoryManagers::new(&deps.store, &deps.embedder, DEFAULT_ORGANIZATION_ID);
        let registry = AgentRegistry::new();

        let chat_agent_id = registry.id_of(AgentKind::Chat).to_string();
        for label in CORE_LABELS {
            let initial = if label == "persona" {
                DEFAULT_PERSONA_VALUE
            } else {
                ""
            };
            managers.core.ensure_block(&chat_agent_id, label, initial)?;
        }

        let executor = Arc::new(
            ToolExecutor::new(managers.clone(), &chat_agent_id).with_timezone(timezone),
        );
        let queue = MessageQueue::new();
        let mode = if config.skip_meta_memory_manager {
            RouterMode::Direct
        } else {
            RouterMode::Routed
        };
        let router = MetaRouter::new(
            queue.clone(),
            Arc::clone(&executor),
            mode,
            config.max_tool_iterations,
        );

        let uploads = UploadManager::new(
            Arc::clone(&deps.blob),
            deps.store.clone(),
            DEFAULT_ORGANIZATION_ID,
            deps.upload_options.clone(),
        );
        let accumulator = TemporaryAccumulator::new(
            uploads,
            config.temporary_message_limit,
            config.upload_timeout,
        );

        let coordinator = Self {
            state: Mutex::new(CoordinatorState {
                model_name: config.model_name.clone(),
                memory_model_name: config.memory_model_name.clone(),
                persona: config.persona.clone(),
                timezone_str: config.timezone_str.clone(),
                timezone,
                include_recent_screenshots: config.include_recent_screenshots,
                missing_keys: BTreeSet::new(),
            }),
            config,
            store: deps.store,
            managers,
            registry,
            queue,
            router,
            executor,
            accumulator,
            blob: deps.blob,
            provider: Mutex::new(deps.provider),
            transcriber: deps.transcriber,
        };

        coordinator.reconcile_cloud_mappings().await?;
        Ok(coordinator)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn provider(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.provider.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// The memory managers (read access for embedding, export, tests).
    #[must_use]
    pub const fn managers(&self) -> &MemoryManagers {
        &self.managers
    }

    /// The shared store handle.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The accumulator (observable state for the front-end).
    #[must_use]
    pub const fn accumulator(&self) -> &TemporaryAccumulator {
        &self.accumulator
    }

    /// Currently selected chat model.
    #[must_use]
    pub fn current_model(&self) -> String {
        self.state().model_name.clone()
    }

    /// Currently selected memory model.
    #[must_use]
    pub fn current_memory_model(&self) -> String {
        self.state().memory_model_name.clone()
    }

    fn now_timestamp(&self) -> String {
        let state = self.state();
        state.timezone.map_or_else(
            || Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            |tz| Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        )
    }

    // -----------------------------------------------------------------------
    // Ingest and retrieval
    // -----------------------------------------------------------------------

    /// Entry point for both ingest and retrieval.
    ///
    /// With `memorizing` the observation enters the accumulator; when
    /// enough resolved observations are buffered they are flushed to the
    /// memory agents and `None` is returned. Otherwise the text is
    /// treated as a chat query and the reply (or a sentinel error token)
    /// is returned.
    pub async fn send_message(
        &self,
        input: ObservationInput,
        memorizing: bool,
    ) -> Option<String> {
        if memorizing {
            let timestamp = self.now_timestamp();
            if let Err(e) = self.accumulator.add(input, &timestamp, true).await {
                warn!(error = %e, "failed to buffer observation");
                return None;
            }
            let ready = self.accumulator.should_flush();
            if !ready.is_empty() {
                self.flush(ready).await;
            }
            self.clear_old_screenshots().await;
            None
        } else {
            let query = input.text.unwrap_or_default();
            Some(self.ask(&query).await)
        }
    }

    /// Answers a retrieval query through the chat agent.
    pub async fn ask(&self, query: &str) -> String {
        let (model, include_screenshots) = {
            let state = self.state();
            (state.model_name.clone(), state.include_recent_screenshots)
        };

        let mut parts: Vec<PromptPart> = vec![PromptPart::text(query)];
        if include_screenshots {
            let recent = self.accumulator.recent_images_for_chat();
            if !recent.is_empty() {
                parts.push(PromptPart::text(prompts::RECENT_IMAGES_START));
                for (index, (timestamp, blob)) in recent.iter().enumerate() {
                    parts.push(PromptPart::text(prompts::image_marker(timestamp, index)));
                    parts.push(PromptPart::blob_uri(&blob.uri));
                }
                parts.push(PromptPart::text(prompts::RECENT_IMAGES_END));
            }
        }

        let mut request = ChatRequest {
            model,
            messages: vec![
                system_message(&self.chat_system_prompt()),
                user_parts(parts),
            ],
            temperature: None,
            max_tokens: None,
            tools: toolset::tools_for(AgentKind::Chat),
        };

        let provider = self.provider();
        let executor = Arc::clone(&self.executor);
        let max_iterations = self.config.max_tool_iterations;
        let response = self
            .queue
            .run(AgentKind::Chat, async {
                run_tool_loop(
                    provider.as_ref(),
                    &mut request,
                    &executor,
                    Some(RESPOND_TOOL),
                    max_iterations,
                )
                .await
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "chat dispatch failed");
                return ReplyError::ResponseFailed.token().to_string();
            }
        };

        match extract_reply(&response, &request.messages) {
            Ok(reply) => {
                let tool_calls = serde_json::to_value(&response.tool_calls).ok();
                self.log_chat_exchange(query, &reply, tool_calls);
                self.accumulator.add_conversation(query, &reply);
                reply
            }
            Err(e) => e.token().to_string(),
        }
    }

    fn chat_system_prompt(&self) -> String {
        let chat_agent_id = self.registry.id_of(AgentKind::Chat);
        let mut prompt = prompts::system_prompt_for(AgentKind::Chat).to_string();
        if let Ok(blocks) = self.managers.core.list_blocks(chat_agent_id) {
            for block in blocks {
                if !block.value.trim().is_empty() {
                    prompt.push_str(&format!("\n\n<{0}>\n{1}\n</{0}>", block.label, block.value));
                }
            }
        }
        prompt
    }

    fn log_chat_exchange(&self, query: &str, reply: &str, tool_calls: Option<serde_json::Value>) {
        let chat_agent_id = self.registry.id_of(AgentKind::Chat);
        let mut assistant =
            MessageRecord::new(chat_agent_id, DEFAULT_ORGANIZATION_ID, "assistant", Some(reply.to_string()));
        if let Some(tool_calls) = tool_calls {
            assistant = assistant.with_tool_calls(tool_calls);
        }
        for record in [
            MessageRecord::new(chat_agent_id, DEFAULT_ORGANIZATION_ID, "user", Some(query.to_string())),
            assistant,
        ] {
            if let Err(e) = self.store.append_message(&record) {
                warn!(error = %e, "failed to log chat message");
            }
        }
    }

    /// Flushes the ready prefix to the memory agents.
    async fn flush(&self, ready: Vec<ReadyObservation>) {
        let conversation = self.accumulator.drain_conversation();

        let audio: Vec<_> = ready.iter().flat_map(|o| o.audio.iter().cloned()).collect();
        let transcript = if audio.is_empty() {
            String::new()
        } else {
            match self.transcriber.process(&audio).await {
                Ok(transcript) => transcript,
                Err(e) => {
                    warn!(error = %e, "transcription failed, flushing without audio");
                    String::new()
                }
            }
        };

        let directive = match self.router.mode() {
            RouterMode::Direct => prompts::direct_directive(!conversation.is_empty()),
            RouterMode::Routed => prompts::meta_directive(!conversation.is_empty()),
        };
        let parts = assemble_flush_prompt(&ready, &transcript, &conversation, directive);

        let existing = self.accumulator.tracked_uris();
        let provider = self.provider();
        let model = self.current_memory_model();
        let outcomes = self
            .router
            .dispatch(provider.as_ref(), &model, parts, &existing)
            .await;
        info!(dispatched = outcomes.len(), flushed = ready.len(), "flush complete");

        self.accumulator.complete_flush(ready.len());
        for observation in &ready {
            for image in &observation.images {
                if let Err(e) = self
                    .store
                    .set_mapping_status(&image.name, CloudFileStatus::Processed)
                {
                    warn!(error = %e, blob = %image.name, "failed to mark mapping processed");
                }
            }
        }
    }

    /// Flushes whatever prefix is ready, regardless of the threshold.
    pub async fn force_flush(&self) {
        let ready = self.accumulator.ready_prefix();
        if !ready.is_empty() {
            self.flush(ready).await;
        }
    }

    /// Runs the three-phase reflexion sweep.
    pub async fn reflexion_on_memory(&self) -> ReflexionReport {
        let provider = self.provider();
        let model = self.current_memory_model();
        reflexion_on_memory(&self.router, provider.as_ref(), &model).await
    }

    // -----------------------------------------------------------------------
    // Model and key lifecycle
    // -----------------------------------------------------------------------

    fn resolve_provider_key(&self, provider: ModelProvider) -> Option<String> {
        // Database-stored keys take precedence over the environment.
        if let Ok(Some(key)) = self.store.get_provider_key(provider.key_name()) {
            return Some(key);
        }
        std::env::var(provider.env_var()).ok()
    }

    fn check_model(&self, model: &str) -> Result<ModelProvider, ModelUpdate> {
        let Some(provider) = provider_for_model(model) else {
            return Err(ModelUpdate {
                success: false,
                missing_keys: Vec::new(),
                message: Some(format!("unsupported model: {model}")),
            });
        };
        if self.resolve_provider_key(provider).is_none() {
            self.state()
                .missing_keys
                .insert(provider.env_var().to_string());
            return Err(ModelUpdate {
                success: false,
                missing_keys: vec![provider.env_var().to_string()],
                message: Some(format!(
                    "model {model} requires a {} key",
                    provider.key_name()
                )),
            });
        }
        Ok(provider)
    }

    /// Switches the chat model after validating its provider key.
    pub fn set_model(&self, model: &str) -> ModelUpdate {
        let provider = match self.check_model(model) {
            Ok(provider) => provider,
            Err(update) => return update,
        };
        self.rebuild_provider_if_possible(provider);
        self.state().model_name = model.to_string();
        info!(model, "chat model updated");
        ModelUpdate::ok()
    }

    /// Switches the memory model; restricted to the allow-list.
    pub fn set_memory_model(&self, model: &str) -> ModelUpdate {
        if !is_allowed_memory_model(model) {
            return ModelUpdate {
                success: false,
                missing_keys: Vec::new(),
                message: Some(format!("model {model} is not an allowed memory model")),
            };
        }
        let provider = match self.check_model(model) {
            Ok(provider) => provider,
            Err(update) => return update,
        };
        self.rebuild_provider_if_possible(provider);
        self.state().memory_model_name = model.to_string();
        info!(model, "memory model updated");
        ModelUpdate::ok()
    }

    /// Rebuilds the LLM client when this crate ships one for the
    /// provider. Other providers are supplied externally through
    /// [`EngineDeps::provider`] and keep the current client.
    fn rebuild_provider_if_possible(&self, provider: ModelProvider) {
        if provider == ModelProvider::OpenAi
            && let Some(key) = self.resolve_provider_key(provider)
        {
            let client = crate::llm::OpenAiProvider::new(&key, self.config.model_endpoint.as_deref());
            *self.provider.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(client);
        }
    }

    /// Stores a provider API key and re-initializes what depends on it.
    ///
    /// For the blob-backing provider this re-runs cloud reconciliation so
    /// the upload pipeline starts from a consistent mapping set.
    pub async fn provide_api_key(&self, provider_name: &str, value: &str) -> Result<ModelUpdate, MemoryError> {
        let Some(provider) = ModelProvider::parse(provider_name) else {
            return Ok(ModelUpdate {
                success: false,
                missing_keys: Vec::new(),
                message: Some(format!("unknown provider: {provider_name}")),
            });
        };

        self.store.set_provider_key(provider.key_name(), value)?;
        self.state().missing_keys.remove(provider.env_var());
        self.rebuild_provider_if_possible(provider);

        if provider == ModelProvider::Gemini {
            self.reconcile_cloud_mappings().await?;
        }
        info!(provider = provider.key_name(), "api key stored");
        Ok(ModelUpdate::ok())
    }

    /// Provider keys still unresolved after failed model switches.
    #[must_use]
    pub fn missing_keys(&self) -> Vec<String> {
        self.state().missing_keys.iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Timezone and persona
    // -----------------------------------------------------------------------

    /// Updates the active timezone (e.g. `"Asia/Shanghai (UTC+8:00)"`).
    pub fn set_timezone(&self, timezone_str: &str) -> Result<(), MemoryError> {
        let tz = parse_timezone(timezone_str)?;
        let mut state = self.state();
        state.timezone_str = timezone_str.to_string();
        state.timezone = Some(tz);
        drop(state);
        self.executor.set_timezone(Some(tz));
        Ok(())
    }

    /// Records the active persona name.
    pub fn set_persona(&self, name: &str) {
        self.state().persona = name.to_string();
    }

    /// Toggles whether chat prompts include recent screenshots.
    pub fn set_include_recent_screenshots(&self, value: bool) {
        self.state().include_recent_screenshots = value;
    }

    /// Overwrites the chat agent's persona core block.
    pub fn update_core_persona(&self, text: &str) -> Result<(), MemoryError> {
        let chat_agent_id = self.registry.id_of(AgentKind::Chat);
        self.managers.core.set_value(chat_agent_id, "persona", text)
    }

    // -----------------------------------------------------------------------
    // Snapshot / restore
    // -----------------------------------------------------------------------

    fn snapshot_config(&self) -> AgentConfigSnapshot {
        let state = self.state();
        AgentConfigSnapshot {
            agent_name: self.config.agent_name.clone(),
            model_name: state.model_name.clone(),
            memory_model_name: state.memory_model_name.clone(),
            timezone_str: state.timezone_str.clone(),
            active_persona_name: state.persona.clone(),
            include_recent_screenshots: state.include_recent_screenshots,
            is_screen_monitor: self.config.is_screen_monitor,
            backup_type: "sqlite".to_string(),
            backup_timestamp: Utc::now(),
        }
    }

    /// Snapshots the store and coordinator state into `dir`.
    pub fn save_agent(&self, dir: &Path) -> Result<(), MemoryError> {
        self.store.save_to(dir, &self.snapshot_config())
    }

    /// Restores the store and coordinator state from `dir`.
    pub fn load_agent(&self, dir: &Path) -> Result<(), MemoryError> {
        let snapshot = self.store.load_from(dir)?;
        let timezone = parse_timezone(&snapshot.timezone_str).ok();
        let mut state = self.state();
        state.model_name = snapshot.model_name;
        state.memory_model_name = snapshot.memory_model_name;
        state.timezone_str = snapshot.timezone_str;
        state.timezone = timezone;
        state.persona = snapshot.active_persona_name;
        state.include_recent_screenshots = snapshot.include_recent_screenshots;
        drop(state);
        self.executor.set_timezone(timezone);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cloud lifecycle
    // -----------------------------------------------------------------------

    /// Reconciles store mappings against the blob provider.
    ///
    /// Mappings whose remote blob no longer exists are deleted; the
    /// survivors seed the in-memory URI tracking cache. Afterwards the
    /// mapping set is a subset of the provider's blob set.
    pub async fn reconcile_cloud_mappings(&self) -> Result<usize, MemoryError> {
        let existing = match self.blob.list().await {
            Ok(blobs) => blobs,
            Err(e) => {
                warn!(error = %e, "blob provider unavailable, skipping reconciliation");
                return Ok(0);
            }
        };
        let existing_names: std::collections::HashSet<&str> =
            existing.iter().map(|b| b.name.as_str()).collect();

        let mut removed = 0;
        for mapping in self.store.list_live_mappings()? {
            if existing_names.contains(mapping.cloud_file_id.as_str()) {
                if let Some(blob) = existing.iter().find(|b| b.name == mapping.cloud_file_id) {
                    self.accumulator.track_uri(blob);
                }
            } else {
                self.store.delete_mapping(&mapping.cloud_file_id)?;
                removed += 1;
            }
        }
        info!(removed, tracked = self.accumulator.tracked_count(), "cloud reconciliation complete");
        Ok(removed)
    }

    /// Deletes the oldest cloud screenshots past the configured cap.
    ///
    /// Skipped entirely while the message queue has in-flight work. Map
    /// mutation happens under the accumulator's mutex; remote deletions
    /// run in background tasks.
    pub async fn clear_old_screenshots(&self) {
        if !self.queue.is_empty() {
            return;
        }
        let tracked = self.accumulator.tracked_count();
        let cap = self.config.maximum_cloud_images;
        if tracked <= cap {
            return;
        }

        let doomed = self.accumulator.take_oldest_tracked(tracked - cap);
        info!(count = doomed.len(), "clearing old screenshots");
        for (_, info) in doomed {
            if let Err(e) = self.store.set_mapping_status(&info.name, CloudFileStatus::Deleted) {
                warn!(error = %e, blob = %info.name, "failed to mark mapping deleted");
            }
            let blob = Arc::clone(&self.blob);
            tokio::spawn(async move {
                if let Err(e) = blob.delete(&info.name).await {
                    warn!(error = %e, blob = %info.name, "remote blob deletion failed");
                }
            });
        }
    }
}
