//! Local model lifecycle manager.
//!
//! Per-model state machine: `NotDownloaded → Downloading → Ready`, any
//! state to `Error(reason)`, `Ready → NotDownloaded` on explicit removal.
//! Downloads are staged into a `.tmp` directory and renamed into place
//! only after every artifact passes its digest check, so a partial or
//! corrupt download is never observable as `Ready`.
//!
//! One mutable "active model" slot feeds inline completion. Switching or
//! removing the active model cancels any in-flight completion run bound to
//! it before the slot changes, so a stale transport can never write
//! against an unloaded model.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use quill_core::{RunEvent, RunId};
use quill_engine::{COMPLETION_SKILL_ID, RunRegistry, StartRequest, StartedRun};
use quill_llm::{DEFAULT_LOCAL_BASE_URL, LocalTransport};
use quill_prompt::{ContextRules, InjectedContext, SkillPromptInput};
use quill_settings::SettingsStore;

use crate::catalog::{ModelCatalog, ModelSpec};
use crate::error::{ModelError, Result};
use crate::fetch::{ArtifactFetcher, HubFetcher, sha256_file};

/// Download/readiness status of a local model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    /// No artifact on disk.
    NotDownloaded,
    /// Artifacts are being fetched and verified.
    Downloading {
        /// Coarse progress, 0–100.
        percent: u8,
    },
    /// Verified artifacts present; usable for completion.
    Ready,
    /// Last download or use failed; requires an explicit `ensure_model`.
    Error(String),
}

impl ModelStatus {
    /// Whether the model is usable for completion.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Snapshot of one catalog model's local state.
#[derive(Clone, Debug)]
pub struct ModelRecord {
    /// Catalog id.
    pub model_id: String,
    /// Current status.
    pub status: ModelStatus,
    /// Artifact directory; present iff the model is ready.
    pub local_path: Option<PathBuf>,
    /// Total artifact size from the catalog.
    pub size_bytes: u64,
}

/// Inline completion request from the editor surface.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Document text leading up to the caret.
    pub text: String,
    /// Windowing rules, forwarded opaquely into the prompt hash.
    pub context_rules: ContextRules,
}

struct ActiveState {
    model_id: Option<String>,
    completion_run: Option<RunId>,
}

/// Tracks locally available models and exposes the completion entry point.
pub struct LocalModelManager {
    cache_dir: PathBuf,
    catalog: ModelCatalog,
    statuses: DashMap<String, ModelStatus>,
    active: Mutex<ActiveState>,
    registry: Arc<RunRegistry>,
    settings: Arc<SettingsStore>,
    fetcher: Arc<dyn ArtifactFetcher>,
    local_base_url: String,
}

impl LocalModelManager {
    /// Create a manager over a cache directory.
    ///
    /// The registry's skill store must contain the reserved
    /// [`COMPLETION_SKILL_ID`] skill
    /// ([`quill_engine::completion_skill_definition`]).
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        catalog: ModelCatalog,
        registry: Arc<RunRegistry>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let cache_dir = cache_dir.into();
        let fetcher = Arc::new(HubFetcher::new(cache_dir.join("hub")));
        Self {
            cache_dir,
            catalog,
            statuses: DashMap::new(),
            active: Mutex::new(ActiveState {
                model_id: None,
                completion_run: None,
            }),
            registry,
            settings,
            fetcher,
            local_base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
        }
    }

    /// Replace the artifact fetcher (tests, alternative registries).
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Point completion at a non-default local model server.
    #[must_use]
    pub fn with_local_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.local_base_url = base_url.into();
        self
    }

    fn model_dir(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Current status of a model. Unknown ids report `NotDownloaded`.
    ///
    /// Falls back to a disk probe for models this process has not touched
    /// yet, so artifacts from a previous session are recognized.
    pub fn status(&self, model_id: &str) -> ModelStatus {
        if let Some(status) = self.statuses.get(model_id) {
            return status.clone();
        }
        if let Some(spec) = self.catalog.find(model_id) {
            let dir = self.model_dir(model_id);
            if spec.files.iter().all(|f| dir.join(&f.name).exists()) {
                return ModelStatus::Ready;
            }
        }
        ModelStatus::NotDownloaded
    }

    /// Every catalog model with its local state.
    pub fn list_models(&self) -> Vec<ModelRecord> {
        self.catalog
            .specs()
            .iter()
            .map(|spec| {
                let status = self.status(&spec.model_id);
                let local_path = status
                    .is_ready()
                    .then(|| self.model_dir(&spec.model_id));
                ModelRecord {
                    model_id: spec.model_id.clone(),
                    status,
                    local_path,
                    size_bytes: spec.total_size_bytes(),
                }
            })
            .collect()
    }

    /// The model currently bound to the completion slot, if any.
    pub fn active_model(&self) -> Option<String> {
        self.active.lock().model_id.clone()
    }

    /// Ensure a model is downloaded, verified, and ready.
    ///
    /// Returns a progress receiver immediately: `Downloading { percent }`
    /// updates followed by a final `Ready` or `Error`. A model that is
    /// already ready yields `Ready` without touching the fetcher; a model
    /// mid-download is `Busy`.
    #[instrument(skip(self))]
    pub fn ensure_model(
        self: &Arc<Self>,
        model_id: &str,
    ) -> Result<watch::Receiver<ModelStatus>> {
        let spec = self
            .catalog
            .find(model_id)
            .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))?
            .clone();

        match self.status(model_id) {
            ModelStatus::Ready => {
                let (_tx, rx) = watch::channel(ModelStatus::Ready);
                return Ok(rx);
            }
            ModelStatus::Downloading { .. } => {
                return Err(ModelError::Busy(model_id.to_string()));
            }
            ModelStatus::NotDownloaded | ModelStatus::Error(_) => {}
        }

        let starting = ModelStatus::Downloading { percent: 0 };
        let _ = self.statuses.insert(model_id.to_string(), starting.clone());
        let (tx, rx) = watch::channel(starting);

        let manager = Arc::clone(self);
        let _ = tokio::task::spawn_blocking(move || {
            let model_id = spec.model_id.clone();
            let result = manager.download_and_verify(&spec, |percent| {
                let status = ModelStatus::Downloading { percent };
                let _ = manager.statuses.insert(model_id.clone(), status.clone());
                let _ = tx.send(status);
            });
            let final_status = match result {
                Ok(()) => {
                    info!(model_id, "model ready");
                    ModelStatus::Ready
                }
                Err(e) => {
                    warn!(model_id, error = %e, "model download failed");
                    ModelStatus::Error(e.to_string())
                }
            };
            let _ = manager.statuses.insert(model_id, final_status.clone());
            let _ = tx.send(final_status);
        });

        Ok(rx)
    }

    /// Fetch and verify every artifact into a staging dir, then commit
    /// with a rename. Blocking; runs on the blocking pool.
    fn download_and_verify(&self, spec: &ModelSpec, progress: impl Fn(u8)) -> Result<()> {
        let staging = self.cache_dir.join(format!("{}.tmp", spec.model_id));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let total = spec.files.len().max(1);
        let fetch_all = || -> Result<()> {
            for (index, file) in spec.files.iter().enumerate() {
                progress((index * 100 / total) as u8);
                let path = self.fetcher.fetch(&spec.repo, &file.name, &staging)?;
                let actual = sha256_file(&path)?;
                if actual != file.sha256 {
                    return Err(ModelError::IntegrityMismatch {
                        file: file.name.clone(),
                        expected: file.sha256.clone(),
                        actual,
                    });
                }
                debug!(model_id = %spec.model_id, file = %file.name, "artifact verified");
            }
            Ok(())
        };

        match fetch_all() {
            Ok(()) => {
                let final_dir = self.model_dir(&spec.model_id);
                if final_dir.exists() {
                    std::fs::remove_dir_all(&final_dir)?;
                }
                std::fs::rename(&staging, &final_dir)?;
                progress(100);
                Ok(())
            }
            Err(e) => {
                // Never leave a partially-written artifact behind
                let _ = std::fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    /// Remove a model's artifacts and return it to `NotDownloaded`.
    ///
    /// If the model is the active completion model, any in-flight
    /// completion run is cancelled first, then the slot is cleared.
    #[instrument(skip(self))]
    pub fn remove_model(&self, model_id: &str) -> Result<()> {
        if self.catalog.find(model_id).is_none() {
            return Err(ModelError::UnknownModel(model_id.to_string()));
        }
        if matches!(self.status(model_id), ModelStatus::Downloading { .. }) {
            return Err(ModelError::Busy(model_id.to_string()));
        }

        {
            let mut active = self.active.lock();
            if active.model_id.as_deref() == Some(model_id) {
                if let Some(run_id) = active.completion_run.take() {
                    debug!(model_id, run_id = %run_id, "cancelling completion run before removal");
                    self.registry.cancel(&run_id);
                }
                active.model_id = None;
            }
        }

        let dir = self.model_dir(model_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        let _ = self
            .statuses
            .insert(model_id.to_string(), ModelStatus::NotDownloaded);
        info!(model_id, "model removed");
        Ok(())
    }

    /// Bind the completion slot to a ready model.
    ///
    /// Switching away from a model with an in-flight completion run
    /// cancels that run before the slot is updated.
    pub fn set_active_model(&self, model_id: &str) -> Result<()> {
        if self.catalog.find(model_id).is_none() {
            return Err(ModelError::UnknownModel(model_id.to_string()));
        }
        if !self.status(model_id).is_ready() {
            return Err(ModelError::NotReady(model_id.to_string()));
        }

        let mut active = self.active.lock();
        if active.model_id.as_deref() != Some(model_id) {
            if let Some(run_id) = active.completion_run.take() {
                debug!(run_id = %run_id, "cancelling completion run before model switch");
                self.registry.cancel(&run_id);
            }
            active.model_id = Some(model_id.to_string());
        }
        Ok(())
    }

    /// Start an inline completion run on the local transport.
    ///
    /// Fails fast when completion is disabled or no ready model is
    /// selected — never a silent fallback to the remote provider. At most
    /// one completion run is in flight: starting a new one cancels its
    /// predecessor.
    #[instrument(skip_all)]
    pub fn complete(self: &Arc<Self>, request: CompletionRequest) -> Result<StartedRun> {
        let settings = self.settings.get();
        if !settings.enabled {
            return Err(ModelError::Disabled);
        }

        let model_id = self
            .active
            .lock()
            .model_id
            .clone()
            .or_else(|| settings.model_selection.clone())
            .ok_or(ModelError::NoActiveModel)?;
        if !self.status(&model_id).is_ready() {
            return Err(ModelError::NotReady(model_id));
        }

        if let Some(previous) = self.active.lock().completion_run.take() {
            self.registry.cancel(&previous);
        }

        let transport = Arc::new(LocalTransport::new(
            self.local_base_url.clone(),
            model_id.clone(),
        ));
        let started = self.registry.start(
            StartRequest {
                skill_id: COMPLETION_SKILL_ID.into(),
                input: SkillPromptInput::new().with("text", request.text),
                injected: InjectedContext {
                    context_rules: request.context_rules,
                    ..InjectedContext::default()
                },
            },
            transport,
        )?;

        self.active.lock().completion_run = Some(started.run_id.clone());
        self.watch_for_crash(&model_id, &started.run_id);
        debug!(run_id = %started.run_id, model_id, "completion run started");
        Ok(started)
    }

    /// Cancel a completion run previously returned by
    /// [`complete`](Self::complete). Idempotent, like registry
    /// cancellation; clears the in-flight slot when it matches.
    pub fn cancel_completion(&self, run_id: &RunId) {
        {
            let mut active = self.active.lock();
            if active.completion_run.as_ref() == Some(run_id) {
                active.completion_run = None;
            }
        }
        self.registry.cancel(run_id);
    }

    /// Watch a completion run for a local-process crash and mark the
    /// model record unhealthy, requiring an explicit `ensure_model`
    /// before reuse.
    fn watch_for_crash(self: &Arc<Self>, model_id: &str, run_id: &RunId) {
        let Ok(mut events) = self.registry.subscribe(run_id) else {
            return;
        };
        let manager = Arc::clone(self);
        let model_id = model_id.to_string();
        let _ = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RunEvent::Error { error }) if error.category == "model_process" => {
                        warn!(model_id, "local model crashed; marking record error");
                        let _ = manager
                            .statuses
                            .insert(model_id.clone(), ModelStatus::Error(error.message));
                        break;
                    }
                    Ok(event) if event.is_terminal() => break,
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use quill_core::NoopSink;
    use quill_engine::{StaticSkillStore, completion_skill_definition};
    use sha2::{Digest, Sha256};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::catalog::ModelFile;

    fn digest_of(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        use std::fmt::Write;
        let mut out = String::new();
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// Fetcher writing canned bytes, with optional per-call delay.
    struct FakeFetcher {
        contents: Mutex<HashMap<String, Vec<u8>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(files: &[(&str, &[u8])]) -> Self {
            Self {
                contents: Mutex::new(
                    files
                        .iter()
                        .map(|(name, bytes)| ((*name).to_string(), bytes.to_vec()))
                        .collect(),
                ),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn set_content(&self, name: &str, bytes: &[u8]) {
            let _ = self.contents.lock().insert(name.to_string(), bytes.to_vec());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ArtifactFetcher for FakeFetcher {
        fn fetch(&self, _repo: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let bytes = self
                .contents
                .lock()
                .get(file_name)
                .cloned()
                .ok_or_else(|| ModelError::Download(format!("no such file: {file_name}")))?;
            let dest = dest_dir.join(file_name);
            std::fs::write(&dest, bytes)?;
            Ok(dest)
        }
    }

    const MODEL_ID: &str = "test-model-q4";
    const FILE_NAME: &str = "model.gguf";
    const GOOD_BYTES: &[u8] = b"tiny model weights";

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![ModelSpec {
            model_id: MODEL_ID.into(),
            repo: "quill/test-model".into(),
            files: vec![ModelFile {
                name: FILE_NAME.into(),
                sha256: digest_of(GOOD_BYTES),
                size_bytes: GOOD_BYTES.len() as u64,
            }],
        }])
    }

    struct Env {
        _dir: tempfile::TempDir,
        manager: Arc<LocalModelManager>,
        settings: Arc<SettingsStore>,
        registry: Arc<RunRegistry>,
    }

    fn env_with_fetcher(fetcher: Arc<dyn ArtifactFetcher>) -> Env {
        let dir = tempfile::tempdir().unwrap();
        let skills =
            StaticSkillStore::new().with(COMPLETION_SKILL_ID, completion_skill_definition());
        let registry = RunRegistry::new(Arc::new(skills), Arc::new(NoopSink));
        let settings = Arc::new(SettingsStore::load(dir.path().join("settings.json")));
        let manager = Arc::new(
            LocalModelManager::new(
                dir.path().join("models"),
                catalog(),
                Arc::clone(&registry),
                Arc::clone(&settings),
            )
            .with_fetcher(fetcher),
        );
        Env {
            _dir: dir,
            manager,
            settings,
            registry,
        }
    }

    fn env() -> Env {
        env_with_fetcher(Arc::new(FakeFetcher::new(&[(FILE_NAME, GOOD_BYTES)])))
    }

    async fn wait_terminal(mut rx: watch::Receiver<ModelStatus>) -> ModelStatus {
        loop {
            let status = rx.borrow_and_update().clone();
            match status {
                ModelStatus::Ready | ModelStatus::Error(_) => return status,
                _ => {}
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    async fn make_ready(env: &Env) {
        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        assert_eq!(wait_terminal(rx).await, ModelStatus::Ready);
    }

    // ── ensure_model ────────────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_unknown_model_errors() {
        let env = env();
        let result = env.manager.ensure_model("no-such-model");
        assert_matches!(result, Err(ModelError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn ensure_downloads_verifies_and_readies() {
        let env = env();
        make_ready(&env).await;

        assert_eq!(env.manager.status(MODEL_ID), ModelStatus::Ready);
        let records = env.manager.list_models();
        assert_eq!(records.len(), 1);
        assert!(records[0].status.is_ready());
        let path = records[0].local_path.as_ref().unwrap();
        assert!(path.join(FILE_NAME).exists());
        assert!(
            !path.with_extension("tmp").exists(),
            "staging dir must be gone after commit"
        );
    }

    #[tokio::test]
    async fn corrupt_artifact_is_never_ready() {
        let env = env_with_fetcher(Arc::new(FakeFetcher::new(&[(FILE_NAME, b"corrupted")])));
        let rx = env.manager.ensure_model(MODEL_ID).unwrap();

        let status = wait_terminal(rx).await;
        assert_matches!(status, ModelStatus::Error(reason) if reason.contains("integrity"));
        assert_matches!(env.manager.status(MODEL_ID), ModelStatus::Error(_));

        // No artifact directory, partial or otherwise
        let records = env.manager.list_models();
        assert!(records[0].local_path.is_none());
    }

    #[tokio::test]
    async fn download_failure_surfaces_reason() {
        let env = env_with_fetcher(Arc::new(FakeFetcher::new(&[]))); // nothing to serve
        let rx = env.manager.ensure_model(MODEL_ID).unwrap();

        let status = wait_terminal(rx).await;
        assert_matches!(status, ModelStatus::Error(reason) if reason.contains("download failed"));
    }

    #[tokio::test]
    async fn ensure_ready_model_short_circuits() {
        let fetcher = Arc::new(FakeFetcher::new(&[(FILE_NAME, GOOD_BYTES)]));
        let env = env_with_fetcher(fetcher.clone());
        make_ready(&env).await;
        let calls_after_first = fetcher.calls();

        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        assert_eq!(*rx.borrow(), ModelStatus::Ready);
        assert_eq!(fetcher.calls(), calls_after_first, "no re-download");
    }

    #[tokio::test]
    async fn ensure_while_downloading_is_busy() {
        let fetcher = Arc::new(
            FakeFetcher::new(&[(FILE_NAME, GOOD_BYTES)])
                .with_delay(Duration::from_millis(200)),
        );
        let env = env_with_fetcher(fetcher);

        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_matches!(env.manager.ensure_model(MODEL_ID), Err(ModelError::Busy(_)));

        assert_eq!(wait_terminal(rx).await, ModelStatus::Ready);
    }

    #[tokio::test]
    async fn error_state_retries_on_ensure() {
        let fetcher = Arc::new(FakeFetcher::new(&[(FILE_NAME, b"wrong bytes")]));
        let env = env_with_fetcher(fetcher.clone());

        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        assert_matches!(wait_terminal(rx).await, ModelStatus::Error(_));

        // Fix the artifact source; explicit ensure retries from Error
        fetcher.set_content(FILE_NAME, GOOD_BYTES);
        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        assert_eq!(wait_terminal(rx).await, ModelStatus::Ready);
    }

    #[tokio::test]
    async fn ready_artifacts_recognized_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let skills =
            StaticSkillStore::new().with(COMPLETION_SKILL_ID, completion_skill_definition());
        let registry = RunRegistry::new(Arc::new(skills), Arc::new(NoopSink));
        let settings = Arc::new(SettingsStore::load(dir.path().join("settings.json")));

        // Simulate artifacts from a previous session
        let model_dir = dir.path().join("models").join(MODEL_ID);
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join(FILE_NAME), GOOD_BYTES).unwrap();

        let manager = LocalModelManager::new(
            dir.path().join("models"),
            catalog(),
            registry,
            settings,
        );
        assert_eq!(manager.status(MODEL_ID), ModelStatus::Ready);
    }

    // ── remove / activate ───────────────────────────────────────────────

    #[tokio::test]
    async fn remove_model_deletes_and_resets() {
        let env = env();
        make_ready(&env).await;

        env.manager.remove_model(MODEL_ID).unwrap();
        assert_eq!(env.manager.status(MODEL_ID), ModelStatus::NotDownloaded);
        assert!(env.manager.list_models()[0].local_path.is_none());
    }

    #[tokio::test]
    async fn remove_while_downloading_is_busy() {
        let fetcher = Arc::new(
            FakeFetcher::new(&[(FILE_NAME, GOOD_BYTES)])
                .with_delay(Duration::from_millis(200)),
        );
        let env = env_with_fetcher(fetcher);

        let rx = env.manager.ensure_model(MODEL_ID).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_matches!(env.manager.remove_model(MODEL_ID), Err(ModelError::Busy(_)));
        let _ = wait_terminal(rx).await;
    }

    #[tokio::test]
    async fn set_active_requires_ready() {
        let env = env();
        assert_matches!(
            env.manager.set_active_model(MODEL_ID),
            Err(ModelError::NotReady(_))
        );

        make_ready(&env).await;
        env.manager.set_active_model(MODEL_ID).unwrap();
        assert_eq!(env.manager.active_model().as_deref(), Some(MODEL_ID));
    }

    // ── complete ────────────────────────────────────────────────────────

    fn completion_request() -> CompletionRequest {
        CompletionRequest {
            text: "The quick brown".into(),
            context_rules: ContextRules::default(),
        }
    }

    async fn serve_completion(server: &MockServer, chunks: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chunks.to_string()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn complete_requires_enabled_settings() {
        let env = env();
        make_ready(&env).await;
        env.manager.set_active_model(MODEL_ID).unwrap();

        let err = env.manager.complete(completion_request()).err().unwrap();
        assert_matches!(err, ModelError::Disabled);
        assert!(err.is_invalid_argument());
        assert!(env.registry.is_empty(), "no run created");
    }

    #[tokio::test]
    async fn complete_requires_a_model() {
        let env = env();
        let _ = env.settings.update(serde_json::json!({"enabled": true})).unwrap();

        let err = env.manager.complete(completion_request()).err().unwrap();
        assert_matches!(err, ModelError::NoActiveModel);
    }

    #[tokio::test]
    async fn complete_requires_ready_model() {
        let env = env();
        let _ = env
            .settings
            .update(serde_json::json!({"enabled": true, "modelSelection": MODEL_ID}))
            .unwrap();

        // Selected but never downloaded
        let err = env.manager.complete(completion_request()).err().unwrap();
        assert_matches!(err, ModelError::NotReady(_));
    }

    #[tokio::test]
    async fn complete_streams_from_local_server() {
        let server = MockServer::start().await;
        serve_completion(
            &server,
            "{\"response\":\" fox jumps\",\"done\":false}\n{\"done\":true}\n",
        )
        .await;

        let env = env();
        make_ready(&env).await;
        env.manager.set_active_model(MODEL_ID).unwrap();
        let _ = env.settings.update(serde_json::json!({"enabled": true})).unwrap();

        let manager = Arc::new(
            LocalModelManager::new(
                env.manager.cache_dir.clone(),
                catalog(),
                Arc::clone(&env.registry),
                Arc::clone(&env.settings),
            )
            .with_local_base_url(server.uri()),
        );
        manager.set_active_model(MODEL_ID).unwrap();

        let started = manager.complete(completion_request()).unwrap();
        let mut rx = started.events;
        let mut events = Vec::new();
        while let Ok(event) = rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }

        assert_matches!(
            events.last().unwrap(),
            RunEvent::Done { output } if output.text == " fox jumps"
        );
    }

    #[tokio::test]
    async fn settings_selection_used_without_active_slot() {
        let server = MockServer::start().await;
        serve_completion(&server, "{\"done\":true}\n").await;

        let env = env();
        make_ready(&env).await;
        let _ = env
            .settings
            .update(serde_json::json!({"enabled": true, "modelSelection": MODEL_ID}))
            .unwrap();

        let manager = Arc::new(
            LocalModelManager::new(
                env.manager.cache_dir.clone(),
                catalog(),
                Arc::clone(&env.registry),
                Arc::clone(&env.settings),
            )
            .with_local_base_url(server.uri()),
        );

        // No set_active_model call; settings selection applies
        let started = manager.complete(completion_request()).unwrap();
        let mut rx = started.events;
        while let Ok(event) = rx.recv().await {
            if event.is_terminal() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn remove_active_model_cancels_inflight_run_first() {
        let server = MockServer::start().await;
        // Response delayed so the run is still in flight when we remove
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_string("{\"done\":true}\n"),
            )
            .mount(&server)
            .await;

        let env = env();
        make_ready(&env).await;
        let _ = env.settings.update(serde_json::json!({"enabled": true})).unwrap();

        let manager = Arc::new(
            LocalModelManager::new(
                env.manager.cache_dir.clone(),
                catalog(),
                Arc::clone(&env.registry),
                Arc::clone(&env.settings),
            )
            .with_local_base_url(server.uri()),
        );
        manager.set_active_model(MODEL_ID).unwrap();

        let started = manager.complete(completion_request()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.remove_model(MODEL_ID).unwrap();

        // The run reached `Cancelled` before the model left the catalog dir
        let mut rx = started.events;
        let mut saw_cancelled = false;
        while let Ok(event) = rx.recv().await {
            if event == RunEvent::Cancelled {
                saw_cancelled = true;
            }
            if event.is_terminal() {
                break;
            }
        }
        assert!(saw_cancelled, "in-flight run must be observably cancelled");
        assert_eq!(manager.status(MODEL_ID), ModelStatus::NotDownloaded);
        assert!(manager.active_model().is_none());
    }

    #[tokio::test]
    async fn new_completion_cancels_previous_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(300))
                    .set_body_string("{\"done\":true}\n"),
            )
            .mount(&server)
            .await;

        let env = env();
        make_ready(&env).await;
        let _ = env.settings.update(serde_json::json!({"enabled": true})).unwrap();

        let manager = Arc::new(
            LocalModelManager::new(
                env.manager.cache_dir.clone(),
                catalog(),
                Arc::clone(&env.registry),
                Arc::clone(&env.settings),
            )
            .with_local_base_url(server.uri()),
        );
        manager.set_active_model(MODEL_ID).unwrap();

        let first = manager.complete(completion_request()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = manager.complete(completion_request()).unwrap();
        assert_ne!(first.run_id, second.run_id);

        let mut rx = first.events;
        let mut events = Vec::new();
        while let Ok(event) = rx.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        assert_eq!(events, vec![RunEvent::Cancelled]);

        env.registry.cancel(&second.run_id);
    }

    #[tokio::test]
    async fn local_crash_marks_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let env = env();
        make_ready(&env).await;
        let _ = env.settings.update(serde_json::json!({"enabled": true})).unwrap();

        let manager = Arc::new(
            LocalModelManager::new(
                env.manager.cache_dir.clone(),
                catalog(),
                Arc::clone(&env.registry),
                Arc::clone(&env.settings),
            )
            .with_local_base_url(server.uri()),
        );
        manager.set_active_model(MODEL_ID).unwrap();

        let started = manager.complete(completion_request()).unwrap();
        let mut rx = started.events;
        while let Ok(event) = rx.recv().await {
            if event.is_terminal() {
                break;
            }
        }

        // The crash watcher marks the record; give its task a beat
        let mut status = manager.status(MODEL_ID);
        for _ in 0..50 {
            if matches!(status, ModelStatus::Error(_)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = manager.status(MODEL_ID);
        }
        assert_matches!(status, ModelStatus::Error(_));
    }
}
