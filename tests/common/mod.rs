//! Common test utilities for E2E tests

pub mod schema_validator;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fedinbox::backend::{
    ArticleIngest, BackendError, BackendOutcome, Backends, FollowDecision, FollowService,
    NewForeignArticle, ReceivedFollow, UserDirectory, UserRecord,
};
use fedinbox::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const HOSTNAME: &str = "myhost.example";

/// In-memory collaborators that record every call
#[derive(Default)]
pub struct FakeBackend {
    pub articles: Mutex<Vec<NewForeignArticle>>,
    pub follows: Mutex<Vec<ReceivedFollow>>,
    pub decisions: Mutex<Vec<FollowDecision>>,
    /// Handles the user directory knows about
    pub users: Vec<String>,
    /// Artificial latency applied to every call
    pub delay: Option<Duration>,
    /// Answer every article/follow call with a refusal
    pub refuse: bool,
    /// Fail every user directory lookup with a transport error
    pub directory_down: bool,
}

impl FakeBackend {
    pub fn with_users(users: &[&str]) -> Self {
        Self {
            users: users.iter().map(|user| user.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn article_count(&self) -> usize {
        self.articles.lock().unwrap().len()
    }

    pub fn follow_count(&self) -> usize {
        self.follows.lock().unwrap().len()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.article_count() + self.follow_count() + self.decision_count()
    }

    async fn respond(&self) -> BackendOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse {
            BackendOutcome::Rejected("refused by test backend".to_string())
        } else {
            BackendOutcome::Accepted
        }
    }
}

#[async_trait]
impl ArticleIngest for FakeBackend {
    async fn receive_create(
        &self,
        article: NewForeignArticle,
    ) -> Result<BackendOutcome, BackendError> {
        self.articles.lock().unwrap().push(article);
        Ok(self.respond().await)
    }
}

#[async_trait]
impl FollowService for FakeBackend {
    async fn receive_follow(
        &self,
        follow: ReceivedFollow,
    ) -> Result<BackendOutcome, BackendError> {
        self.follows.lock().unwrap().push(follow);
        Ok(self.respond().await)
    }

    async fn accept_follow(
        &self,
        decision: FollowDecision,
    ) -> Result<BackendOutcome, BackendError> {
        self.decisions.lock().unwrap().push(decision);
        Ok(self.respond().await)
    }
}

#[async_trait]
impl UserDirectory for FakeBackend {
    async fn find_user(&self, handle: &str, host: &str) -> Result<UserRecord, BackendError> {
        if self.directory_down {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        if self.users.iter().any(|user| user == handle) {
            Ok(UserRecord {
                handle: handle.to_string(),
                host: Some(host.to_string()),
                display_name: None,
            })
        } else {
            Err(BackendError::NotFound)
        }
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server with user "alice" and "bad.example" untrusted
    pub async fn new() -> Self {
        Self::with_backend(FakeBackend::with_users(&["alice"])).await
    }

    /// Create a new test server around the given collaborators
    pub async fn with_backend(backend: FakeBackend) -> Self {
        // Trust list file lives in a temporary directory
        let temp_dir = TempDir::new().unwrap();
        let trust_list_path = temp_dir.path().join("untrusted_hosts.txt");
        let mut file = std::fs::File::create(&trust_list_path).unwrap();
        writeln!(file, "# hosts we refuse traffic from").unwrap();
        writeln!(file, "bad.example").unwrap();
        writeln!(file, "worse.example   # spam").unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                hostname: HOSTNAME.to_string(),
                debug_host: None,
            },
            federation: config::FederationConfig {
                trust_list_path,
                freshness_window_seconds: 300,
                backend_timeout_ms: 200,
                max_body_bytes: 16 * 1024,
            },
            backend: config::BackendConfig {
                articles_url: "http://127.0.0.1:9".to_string(),
                follows_url: "http://127.0.0.1:9".to_string(),
                users_url: "http://127.0.0.1:9".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let backend = Arc::new(backend);
        let backends = Backends {
            articles: backend.clone(),
            follows: backend.clone(),
            users: backend.clone(),
        };

        fedinbox::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config, backends).unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = fedinbox::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            backend,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST a JSON activity to a local user's inbox
    pub async fn deliver(&self, username: &str, activity: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/ap/@{}/inbox", username)))
            .header("Content-Type", "application/activity+json")
            .json(activity)
            .send()
            .await
            .unwrap()
    }
}

/// Timestamp in the activity wire format, `age` in the past
pub fn timestamp_ago(age: chrono::Duration) -> String {
    fedinbox::federation::format_timestamp(chrono::Utc::now() - age)
}

/// Create activity from a trusted remote author
pub fn create_activity(published: &str) -> serde_json::Value {
    serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "type": "Create",
        "actor": "https://remote.example/ap/@carol",
        "object": {
            "type": "Note",
            "name": "Hello from afar",
            "content": "<p>Hi there</p>",
            "published": published,
            "attributedTo": "https://remote.example/ap/@carol"
        }
    })
}
