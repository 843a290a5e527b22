use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::{ModelConfig, StoreBackend, SyncConfig};
use crate::integrations::{
    CreateResult, CrmConnector, CrmSession, IntegrationError, IntegrationResult, LanguageService,
    PredictionService,
};
use crate::jobs::{ExecutionLog, SyncReconcilerJob};
use crate::store::{MemoryTicketStore, NotifyingStore, TicketStore};
use crate::workflows::{build_engine, event_channel, EventReceiver, Services, TriggerEngine};
use crate::AppState;

pub const PRIORITY_MODEL: &str = "mdl_helpdesk_priority";
pub const RESOLUTION_TIME_MODEL: &str = "mdl_helpdesk_resolution_time";
pub const SUPPLIED_EMAIL: &str = "user@example.com";

static INIT: Once = Once::new();

/// Route trigger logs to the test harness output, once per process.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("triage_backend=debug"))
            .with_test_writer()
            .try_init();
    });
}

pub fn model_config(base_url: &str) -> ModelConfig {
    ModelConfig {
        base_url: base_url.to_string(),
        project: "helpdesk".to_string(),
        priority_model: PRIORITY_MODEL.to_string(),
        resolution_time_model: RESOLUTION_TIME_MODEL.to_string(),
        access_token: None,
    }
}

fn unavailable(service: &'static str) -> IntegrationError {
    IntegrationError::Status {
        service,
        status: 503,
        body: "unavailable".to_string(),
    }
}

// Fake external services with call counters

pub struct FakeModel {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PredictionService for FakeModel {
    async fn predict(&self, model: &str, _instance: &str) -> IntegrationResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match model {
            PRIORITY_MODEL => Ok(2.0),
            RESOLUTION_TIME_MODEL => Ok(4.5),
            _ => Err(unavailable("model-prediction")),
        }
    }
}

pub struct FakeLanguage {
    pub calls: AtomicUsize,
    /// When set, sentiment analysis fails
    pub sentiment_down: bool,
}

#[async_trait]
impl LanguageService for FakeLanguage {
    async fn analyze_sentiment(&self, _content: &str) -> IntegrationResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.sentiment_down {
            return Err(unavailable("language"));
        }
        Ok(0.8)
    }

    async fn analyze_entities(&self, _content: &str) -> IntegrationResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["Acme".to_string(), "refund".to_string()])
    }
}

pub struct FakeCrm {
    pub logins: AtomicUsize,
    pub creates: AtomicUsize,
    /// Number of upcoming create calls that fail
    pub failures_left: AtomicUsize,
}

#[async_trait]
impl CrmConnector for FakeCrm {
    async fn login(&self) -> IntegrationResult<CrmSession> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(CrmSession {
            access_token: "fake-token".to_string(),
            instance_url: "https://crm.test".to_string(),
        })
    }

    async fn create(
        &self,
        _session: &CrmSession,
        _object_type: &str,
        _fields: &serde_json::Value,
    ) -> IntegrationResult<CreateResult> {
        let pending = self.failures_left.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_left.store(pending - 1, Ordering::SeqCst);
            return Err(unavailable("crm"));
        }
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreateResult {
            id: Some(format!("500{:012}", n)),
            success: true,
            errors: vec![],
        })
    }
}

#[derive(Default)]
pub struct HarnessOptions {
    pub sentiment_down: bool,
    pub crm_failures: usize,
}

/// In-memory store, notification bus, engine and fakes wired together.
pub struct Harness {
    /// The notifying store every trigger and handler writes through
    pub store: Arc<dyn TicketStore>,
    /// The same records, without notifications
    pub records: MemoryTicketStore,
    pub engine: Arc<TriggerEngine>,
    pub events: EventReceiver,
    pub reconciler: Arc<SyncReconcilerJob>,
    pub model: Arc<FakeModel>,
    pub language: Arc<FakeLanguage>,
    pub crm: Arc<FakeCrm>,
}

pub fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

pub fn harness_with(options: HarnessOptions) -> Harness {
    init_test_logging();

    let (tx, events) = event_channel();
    let records = MemoryTicketStore::new();
    let store: Arc<dyn TicketStore> = Arc::new(NotifyingStore::new(records.clone(), tx));

    let model = Arc::new(FakeModel {
        calls: AtomicUsize::new(0),
    });
    let language = Arc::new(FakeLanguage {
        calls: AtomicUsize::new(0),
        sentiment_down: options.sentiment_down,
    });
    let crm = Arc::new(FakeCrm {
        logins: AtomicUsize::new(0),
        creates: AtomicUsize::new(0),
        failures_left: AtomicUsize::new(options.crm_failures),
    });

    let sync = SyncConfig {
        sweep_interval_minutes: 5,
        claim_ttl_secs: 60,
        max_attempts: 3,
        enrichment_grace_secs: 60,
        enrichment_horizon_hours: 24,
    };
    let services = Services {
        prediction: model.clone(),
        language: language.clone(),
        crm: crm.clone(),
    };
    let engine = Arc::new(build_engine(
        store.clone(),
        services,
        &model_config("http://unused.test"),
        &sync,
        SUPPLIED_EMAIL,
    ));
    let reconciler = Arc::new(SyncReconcilerJob::new(store.clone(), engine.clone(), sync));

    Harness {
        store,
        records,
        engine,
        events,
        reconciler,
        model,
        language,
        crm,
    }
}

impl Harness {
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            store: self.store.clone(),
            store_backend: StoreBackend::Memory,
            engine: self.engine.clone(),
            reconciler: self.reconciler.clone(),
            job_log: ExecutionLog::default(),
        })
    }

    pub fn crm_creates(&self) -> usize {
        self.crm.creates.load(Ordering::SeqCst)
    }
}

/// Poll until `check` holds or the timeout elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// Mock external service helpers
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub async fn mount_model(server: &MockServer, model: &str, predicted: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/projects/helpdesk/models/{}:predict", model)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "predictions": [{ "predicted": predicted }] })),
        )
        .mount(server)
        .await;
}

pub async fn mount_language(server: &MockServer, score: f64, entities: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1beta2/documents:analyzeSentiment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentSentiment": { "score": score, "magnitude": 0.9 }
        })))
        .mount(server)
        .await;

    let entities: Vec<_> = entities.iter().map(|name| json!({ "name": name })).collect();
    Mock::given(method("POST"))
        .and(path("/v1beta2/documents:analyzeEntities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entities": entities })))
        .mount(server)
        .await;
}

/// CRM login plus case creation; creation must happen exactly `expected_cases` times.
pub async fn mount_crm(server: &MockServer, case_id: &str, expected_cases: u64) {
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "00Dxx!session",
            "instance_url": server.uri(),
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/services/data/v58.0/sobjects/Case/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": case_id,
            "success": true,
            "errors": []
        })))
        .expect(expected_cases)
        .mount(server)
        .await;
}
