#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Value};
use uuid::Uuid;

use realty_api::access::Role;
use realty_api::app::{router, AppState};
use realty_api::auth::{generate_jwt, Claims};
use realty_api::database::models::Profile;
use realty_api::database::{Collection, MemoryStore, Store, WriteOp};
use realty_api::push::{PushDispatcher, PushSettings, WebhookPushGateway};

/// A seeded profile together with a bearer token for it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub token: String,
}

/// The real router served in-process over a fresh `MemoryStore`.
///
/// Each `#[tokio::test]` owns its runtime, so every test spawns its own server.
pub struct TestServer {
    pub base_url: String,
    pub store: Arc<dyn Store>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Self::serve(store.clone(), PushDispatcher::disabled()).await
    }

    /// Push delivery goes to `webhook_url` through the real webhook gateway.
    pub async fn spawn_with_push(webhook_url: &str) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let settings = PushSettings {
            timeout: Duration::from_secs(2),
            max_retries: 1,
            backoff: Duration::from_millis(10),
            queue_capacity: 64,
        };
        let gateway = WebhookPushGateway::new(webhook_url, settings.timeout)?;
        let push = PushDispatcher::spawn(Arc::new(gateway), store.clone(), settings);
        Self::serve(store, push).await
    }

    async fn serve(store: Arc<dyn Store>, push: PushDispatcher) -> Result<Self> {
        let app = router(AppState::new(store.clone(), push));
        let base_url = spawn_router(app).await?;
        Ok(Self {
            base_url,
            store,
            client: reqwest::Client::new(),
        })
    }

    pub async fn seed(&self, name: &str, role: Role) -> Result<Actor> {
        self.seed_profile(name, role, true).await
    }

    pub async fn seed_profile(&self, name: &str, role: Role, is_active: bool) -> Result<Actor> {
        let timestamp = chrono::Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
            phone: None,
            role,
            is_active,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.store.write(vec![WriteOp::insert(Collection::Profiles, &profile)?]).await?;
        let token = generate_jwt(&Claims::new(profile.id, role))?;
        Ok(Actor { id: profile.id, role, token })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: Method, actor: &Actor, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path)).bearer_auth(&actor.token)
    }

    pub fn anonymous(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    pub async fn get(&self, actor: &Actor, path: &str) -> Result<(StatusCode, Value)> {
        read(self.request(Method::GET, actor, path).send().await?).await
    }

    pub async fn post(&self, actor: &Actor, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        read(self.request(Method::POST, actor, path).json(&body).send().await?).await
    }

    pub async fn put(&self, actor: &Actor, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        read(self.request(Method::PUT, actor, path).json(&body).send().await?).await
    }

    pub async fn patch(&self, actor: &Actor, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        read(self.request(Method::PATCH, actor, path).json(&body).send().await?).await
    }

    pub async fn delete(&self, actor: &Actor, path: &str) -> Result<(StatusCode, Value)> {
        read(self.request(Method::DELETE, actor, path).send().await?).await
    }

    /// Creates an available listing through the staff API and returns its id.
    pub async fn create_property(&self, staff: &Actor) -> Result<String> {
        let (status, body) = self
            .post(
                staff,
                "/api/sales-ops/properties",
                json!({
                    "title": "Two-bedroom flat",
                    "property_type": "Apartment",
                    "location": "Cairo",
                    "price": 150000,
                    "bedrooms": 2,
                    "bathrooms": 1
                }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "property create failed: {} {}", status, body);
        id_of(&body)
    }

    /// Opens a property request as `customer` and returns its id.
    pub async fn create_request(&self, customer: &Actor, title: &str) -> Result<String> {
        let (status, body) = self
            .post(
                customer,
                "/api/property-requests",
                json!({
                    "title": title,
                    "property_type": "Apartment",
                    "location": "Cairo",
                    "min_price": 50,
                    "max_price": 100
                }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "request create failed: {} {}", status, body);
        id_of(&body)
    }
}

pub async fn read(response: Response) -> Result<(StatusCode, Value)> {
    let status = StatusCode::from_u16(response.status().as_u16())?;
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, body))
}

pub fn id_of(body: &Value) -> Result<String> {
    body["data"]["id"]
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("response has no data.id: {}", body))
}

/// Binds an unused port and serves `app` on it in the background.
async fn spawn_router(app: Router) -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://127.0.0.1:{}", port))
}

/// Collects push payloads posted by the webhook gateway.
pub struct PushSink {
    pub url: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl PushSink {
    pub async fn spawn() -> Result<Self> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route("/push", post(record_push)).with_state(received.clone());
        let base_url = spawn_router(app).await?;
        Ok(Self {
            url: format!("{}/push", base_url),
            received,
        })
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Polls until at least `count` payloads arrived.
    pub async fn wait_for(&self, count: usize) -> Result<Vec<Value>> {
        for _ in 0..200 {
            let received = self.received();
            if received.len() >= count {
                return Ok(received);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("expected {} push payloads, got {}", count, self.received().len())
    }
}

async fn record_push(State(received): State<Arc<Mutex<Vec<Value>>>>, Json(payload): Json<Value>) -> StatusCode {
    if let Ok(mut received) = received.lock() {
        received.push(payload);
    }
    StatusCode::OK
}
