//! In-process API gateway double
//!
//! Two listeners, like a real gateway deployment:
//!
//! - admin API: services, routes, consumers, per-consumer `jwt` credentials
//!   and per-route `jwt` plugins, with the status codes a Kong admin API
//!   returns (409 on duplicates, 404 on missing parents, 400 when deleting a
//!   service that still has routes, 204 on delete)
//! - proxy: longest-prefix route matching, RS256 verification on routes with
//!   the `jwt` plugin (401 before the upstream is contacted), then forwarding
//!   to the service URL
//!
//! State is inspectable through [`FakeGateway::snapshot`], and every admin
//! call is logged as `"METHOD /raw/path"` so tests can assert ordering.

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use common::jwt::{decode_json_segment, split_token};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Header the admin API checks when started with an admin token.
pub const ADMIN_TOKEN_HEADER: &str = "Kong-Admin-Token";

const MAX_PROXY_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub name: String,
    pub service: String,
    pub paths: Vec<String>,
    pub strip_path: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub consumer: String,
    pub key: String,
    pub algorithm: String,
    pub rsa_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    pub route: String,
    pub name: String,
    pub key_claim_name: String,
    pub claims_to_verify: Vec<String>,
}

/// Full configuration state, sorted by name. Ids are excluded so snapshots
/// from separate runs compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewaySnapshot {
    pub services: Vec<ServiceRecord>,
    pub routes: Vec<RouteRecord>,
    pub consumers: Vec<ConsumerRecord>,
    pub credentials: Vec<CredentialRecord>,
    pub plugins: Vec<PluginRecord>,
}

#[derive(Default)]
struct GatewayState {
    services: BTreeMap<String, ServiceRecord>,
    routes: BTreeMap<String, RouteRecord>,
    consumers: BTreeMap<String, ConsumerRecord>,
    credentials: BTreeMap<(String, String), CredentialRecord>,
    plugins: BTreeMap<String, PluginRecord>,
    next_id: u64,
    request_log: Vec<String>,
    upstream_requests: Vec<String>,
    failures: HashMap<String, (u16, String)>,
    unready_probes: u32,
}

impl GatewayState {
    fn id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }
}

#[derive(Clone)]
struct Shared {
    state: Arc<Mutex<GatewayState>>,
    admin_token: Option<String>,
    http: reqwest::Client,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().expect("gateway state poisoned")
    }
}

/// Options for [`FakeGateway::start_with`].
#[derive(Debug, Clone, Default)]
pub struct FakeGatewayOptions {
    /// Require this value in `Kong-Admin-Token` on every admin call.
    pub admin_token: Option<String>,

    /// Answer this many `/status` probes with 503 before reporting ready.
    pub unready_probes: u32,
}

/// Test harness for a gateway with an admin API and an enforcing proxy.
///
/// # Example
/// ```rust,ignore
/// let gateway = FakeGateway::start().await?;
/// // ... provision against gateway.admin_url() ...
/// let response = reqwest::get(format!("{}/public", gateway.proxy_url())).await?;
/// ```
pub struct FakeGateway {
    admin_addr: SocketAddr,
    proxy_addr: SocketAddr,
    shared: Shared,
    admin_handle: JoinHandle<()>,
    proxy_handle: JoinHandle<()>,
}

impl FakeGateway {
    pub async fn start() -> Result<Self, anyhow::Error> {
        Self::start_with(FakeGatewayOptions::default()).await
    }

    pub async fn start_with(options: FakeGatewayOptions) -> Result<Self, anyhow::Error> {
        let shared = Shared {
            state: Arc::new(Mutex::new(GatewayState {
                unready_probes: options.unready_probes,
                ..GatewayState::default()
            })),
            admin_token: options.admin_token,
            http: reqwest::Client::new(),
        };

        let admin_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind admin listener: {}", e))?;
        let proxy_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind proxy listener: {}", e))?;
        let admin_addr = admin_listener.local_addr()?;
        let proxy_addr = proxy_listener.local_addr()?;

        let admin_app = admin_router(shared.clone());
        let proxy_app = Router::new()
            .fallback(proxy)
            .with_state(shared.clone());

        let admin_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_app).await {
                eprintln!("Fake gateway admin error: {}", e);
            }
        });
        let proxy_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(proxy_listener, proxy_app).await {
                eprintln!("Fake gateway proxy error: {}", e);
            }
        });

        Ok(Self {
            admin_addr,
            proxy_addr,
            shared,
            admin_handle,
            proxy_handle,
        })
    }

    pub fn admin_url(&self) -> String {
        format!("http://{}", self.admin_addr)
    }

    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.proxy_addr)
    }

    /// Make every admin call matching `call` (e.g. `"POST /consumers"`)
    /// answer `status` with `body` until cleared.
    pub fn fail(&self, call: &str, status: u16, body: &str) {
        self.shared
            .lock()
            .failures
            .insert(call.to_string(), (status, body.to_string()));
    }

    pub fn clear_failures(&self) {
        self.shared.lock().failures.clear();
    }

    /// Admin calls received, as `"METHOD /raw/path"`.
    pub fn request_log(&self) -> Vec<String> {
        self.shared.lock().request_log.clone()
    }

    pub fn clear_request_log(&self) {
        self.shared.lock().request_log.clear();
    }

    /// Proxied requests that reached an upstream, as `"METHOD /path"`.
    pub fn upstream_requests(&self) -> Vec<String> {
        self.shared.lock().upstream_requests.clone()
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        let state = self.shared.lock();
        GatewaySnapshot {
            services: state.services.values().cloned().collect(),
            routes: state.routes.values().cloned().collect(),
            consumers: state.consumers.values().cloned().collect(),
            credentials: state.credentials.values().cloned().collect(),
            plugins: state.plugins.values().cloned().collect(),
        }
    }

    /// The `jwt` plugin on `route`, if any.
    pub fn plugin_on(&self, route: &str) -> Option<PluginRecord> {
        self.shared.lock().plugins.get(route).cloned()
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.admin_handle.abort();
        self.proxy_handle.abort();
    }
}

fn kong_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn created(body: Value) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

fn not_found() -> Response {
    kong_error(StatusCode::NOT_FOUND, "Not found")
}

fn unique_violation(field: &str, value: &str) -> Response {
    kong_error(
        StatusCode::CONFLICT,
        &format!("UNIQUE violation detected on '{{{field}=\"{value}\"}}'"),
    )
}

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, Response> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            kong_error(
                StatusCode::BAD_REQUEST,
                &format!("schema violation ({field}: required field missing)"),
            )
        })
}

// ============================================================================
// Admin API
// ============================================================================

fn admin_router(shared: Shared) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/services", post(create_service))
        .route("/services/:name", delete(delete_service))
        .route("/services/:name/routes", post(create_route))
        .route("/routes/:name", delete(delete_route))
        .route("/routes/:name/plugins", post(create_plugin))
        .route("/consumers", post(create_consumer))
        .route("/consumers/:username", delete(delete_consumer))
        .route("/consumers/:username/jwt", post(create_credential))
        .route("/consumers/:username/jwt/:key", delete(delete_credential))
        .layer(middleware::from_fn_with_state(shared.clone(), admin_gate))
        .with_state(shared)
}

/// Logs the call, checks the admin token, then applies injected failures.
async fn admin_gate(State(shared): State<Shared>, req: Request, next: Next) -> Response {
    let call = format!("{} {}", req.method(), req.uri().path());
    shared.lock().request_log.push(call.clone());

    if let Some(expected) = &shared.admin_token {
        let presented = req
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return kong_error(
                StatusCode::UNAUTHORIZED,
                "Invalid credentials. Token or User credentials required",
            );
        }
    }

    let injected = shared.lock().failures.get(&call).cloned();
    if let Some((status, body)) = injected {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, body).into_response();
    }

    next.run(req).await
}

async fn status(State(shared): State<Shared>) -> Response {
    let mut state = shared.lock();
    if state.unready_probes > 0 {
        state.unready_probes -= 1;
        return kong_error(StatusCode::SERVICE_UNAVAILABLE, "database not reachable");
    }
    Json(json!({ "database": { "reachable": true } })).into_response()
}

async fn create_service(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let (name, url) = match (required_str(&body, "name"), required_str(&body, "url")) {
        (Ok(name), Ok(url)) => (name, url),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let mut state = shared.lock();
    if state.services.contains_key(name) {
        return unique_violation("name", name);
    }
    let id = state.id("service");
    state.services.insert(
        name.to_string(),
        ServiceRecord {
            name: name.to_string(),
            url: url.to_string(),
        },
    );
    created(json!({ "id": id, "name": name, "url": url }))
}

async fn delete_service(State(shared): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = shared.lock();
    if !state.services.contains_key(&name) {
        return not_found();
    }
    if state.routes.values().any(|r| r.service == name) {
        return kong_error(
            StatusCode::BAD_REQUEST,
            "an existing 'routes' entity references this 'services' entity",
        );
    }
    state.services.remove(&name);
    StatusCode::NO_CONTENT.into_response()
}

async fn create_route(
    State(shared): State<Shared>,
    Path(service): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let name = match required_str(&body, "name") {
        Ok(name) => name,
        Err(resp) => return resp,
    };
    let paths: Vec<String> = body
        .get("paths")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if paths.is_empty() || paths.iter().any(|p| !p.starts_with('/')) {
        return kong_error(
            StatusCode::BAD_REQUEST,
            "schema violation (paths: should start with: /)",
        );
    }
    let strip_path = body
        .get("strip_path")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let mut state = shared.lock();
    if !state.services.contains_key(&service) {
        return not_found();
    }
    if state.routes.contains_key(name) {
        return unique_violation("name", name);
    }
    let id = state.id("route");
    state.routes.insert(
        name.to_string(),
        RouteRecord {
            name: name.to_string(),
            service: service.clone(),
            paths: paths.clone(),
            strip_path,
        },
    );
    created(json!({
        "id": id,
        "name": name,
        "paths": paths,
        "strip_path": strip_path,
        "service": { "name": service },
    }))
}

async fn delete_route(State(shared): State<Shared>, Path(name): Path<String>) -> Response {
    let mut state = shared.lock();
    if state.routes.remove(&name).is_none() {
        return not_found();
    }
    // Plugins scoped to a route go with it.
    state.plugins.remove(&name);
    StatusCode::NO_CONTENT.into_response()
}

async fn create_plugin(
    State(shared): State<Shared>,
    Path(route): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let name = match required_str(&body, "name") {
        Ok(name) => name,
        Err(resp) => return resp,
    };
    if name != "jwt" {
        return kong_error(
            StatusCode::BAD_REQUEST,
            &format!("schema violation (name: plugin '{name}' not enabled; add it to the 'plugins' configuration property)"),
        );
    }
    let config = body.get("config").cloned().unwrap_or_else(|| json!({}));
    let key_claim_name = config
        .get("key_claim_name")
        .and_then(Value::as_str)
        .unwrap_or("iss")
        .to_string();
    let claims_to_verify: Vec<String> = config
        .get("claims_to_verify")
        .and_then(Value::as_array)
        .map(|c| c.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let mut state = shared.lock();
    if !state.routes.contains_key(&route) {
        return not_found();
    }
    if state.plugins.contains_key(&route) {
        return unique_violation("name", "jwt");
    }
    let id = state.id("plugin");
    state.plugins.insert(
        route.clone(),
        PluginRecord {
            route: route.clone(),
            name: name.to_string(),
            key_claim_name: key_claim_name.clone(),
            claims_to_verify: claims_to_verify.clone(),
        },
    );
    created(json!({
        "id": id,
        "name": name,
        "route": { "name": route },
        "config": { "key_claim_name": key_claim_name, "claims_to_verify": claims_to_verify },
    }))
}

async fn create_consumer(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let username = match required_str(&body, "username") {
        Ok(username) => username,
        Err(resp) => return resp,
    };

    let mut state = shared.lock();
    if state.consumers.contains_key(username) {
        return unique_violation("username", username);
    }
    let id = state.id("consumer");
    state.consumers.insert(
        username.to_string(),
        ConsumerRecord {
            username: username.to_string(),
        },
    );
    created(json!({ "id": id, "username": username }))
}

async fn delete_consumer(State(shared): State<Shared>, Path(username): Path<String>) -> Response {
    let mut state = shared.lock();
    if state.consumers.remove(&username).is_none() {
        return not_found();
    }
    // Credentials belong to their consumer.
    state.credentials.retain(|(consumer, _), _| *consumer != username);
    StatusCode::NO_CONTENT.into_response()
}

async fn create_credential(
    State(shared): State<Shared>,
    Path(username): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let key = match required_str(&body, "key") {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let algorithm = body
        .get("algorithm")
        .and_then(Value::as_str)
        .unwrap_or("HS256")
        .to_string();
    if algorithm != "RS256" {
        return kong_error(
            StatusCode::BAD_REQUEST,
            &format!("schema violation (algorithm: '{algorithm}' not supported by this gateway double)"),
        );
    }
    let rsa_public_key = match required_str(&body, "rsa_public_key") {
        Ok(pem) => pem,
        Err(resp) => return resp,
    };
    if DecodingKey::from_rsa_pem(rsa_public_key.as_bytes()).is_err() {
        return kong_error(
            StatusCode::BAD_REQUEST,
            "schema violation (rsa_public_key: invalid key)",
        );
    }

    let mut state = shared.lock();
    if !state.consumers.contains_key(&username) {
        return not_found();
    }
    if state.credentials.values().any(|c| c.key == key) {
        return unique_violation("key", key);
    }
    let id = state.id("jwt");
    state.credentials.insert(
        (username.clone(), key.to_string()),
        CredentialRecord {
            consumer: username.clone(),
            key: key.to_string(),
            algorithm: algorithm.clone(),
            rsa_public_key: rsa_public_key.to_string(),
        },
    );
    created(json!({
        "id": id,
        "key": key,
        "algorithm": algorithm,
        "consumer": { "username": username },
    }))
}

async fn delete_credential(
    State(shared): State<Shared>,
    Path((username, key)): Path<(String, String)>,
) -> Response {
    let mut state = shared.lock();
    if state.credentials.remove(&(username, key)).is_none() {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// Proxy
// ============================================================================

async fn proxy(State(shared): State<Shared>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let matched = {
        let state = shared.lock();
        state
            .routes
            .values()
            .filter_map(|route| {
                route
                    .paths
                    .iter()
                    .filter(|prefix| path.starts_with(prefix.as_str()))
                    .map(|prefix| prefix.len())
                    .max()
                    .map(|len| (len, route))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, route)| {
                (
                    route.clone(),
                    state.services.get(&route.service).cloned(),
                    state.plugins.get(&route.name).cloned(),
                    state.credentials.values().cloned().collect::<Vec<_>>(),
                )
            })
    };

    let Some((route, service, plugin, credentials)) = matched else {
        return kong_error(StatusCode::NOT_FOUND, "no Route matched with those values");
    };

    if let Some(plugin) = plugin {
        if let Err(rejection) = verify_bearer(req.headers(), &plugin, &credentials) {
            tracing::debug!(target: "fake_gateway.proxy", route = %route.name, "Rejected by jwt plugin");
            return rejection;
        }
    }

    let Some(service) = service else {
        return kong_error(StatusCode::SERVICE_UNAVAILABLE, "service not found for route");
    };

    let upstream_path = if route.strip_path {
        let prefix_len = route
            .paths
            .iter()
            .filter(|p| path_and_query.starts_with(p.as_str()))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let rest = &path_and_query[prefix_len..];
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        }
    } else {
        path_and_query
    };

    forward(&shared, &service, &upstream_path, req).await
}

fn verify_bearer(
    headers: &HeaderMap,
    plugin: &PluginRecord,
    credentials: &[CredentialRecord],
) -> Result<(), Response> {
    let unauthorized = |message: &str| kong_error(StatusCode::UNAUTHORIZED, message);

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("Unauthorized"))?;

    let segments = split_token(token).map_err(|_| unauthorized("Bad token; invalid JSON"))?;
    let claims =
        decode_json_segment(segments.payload).map_err(|_| unauthorized("Bad token; invalid JSON"))?;
    let jose_header =
        decode_json_segment(segments.header).map_err(|_| unauthorized("Bad token; invalid JSON"))?;

    let claim = plugin.key_claim_name.as_str();
    let key = claims
        .get(claim)
        .or_else(|| jose_header.get(claim))
        .and_then(Value::as_str)
        .ok_or_else(|| unauthorized(&format!("No mandatory '{claim}' in claims")))?;

    let credential = credentials
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| unauthorized(&format!("No credentials found for given '{claim}'")))?;

    let decoding_key = DecodingKey::from_rsa_pem(credential.rsa_public_key.as_bytes())
        .map_err(|_| unauthorized("Invalid key/secret"))?;

    let verify_exp = plugin.claims_to_verify.iter().any(|c| c == "exp");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.validate_exp = verify_exp;
    validation.required_spec_claims = if verify_exp {
        HashSet::from(["exp".to_string()])
    } else {
        HashSet::new()
    };

    decode::<Value>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => unauthorized("token expired"),
        ErrorKind::MissingRequiredClaim(_) => unauthorized("exp must be a number"),
        _ => unauthorized("Invalid signature"),
    })?;

    Ok(())
}

async fn forward(
    shared: &Shared,
    service: &ServiceRecord,
    path_and_query: &str,
    req: Request,
) -> Response {
    let url = format!("{}{}", service.url.trim_end_matches('/'), path_and_query);
    let (parts, body) = req.into_parts();

    let Ok(body) = to_bytes(body, MAX_PROXY_BODY_BYTES).await else {
        return kong_error(StatusCode::PAYLOAD_TOO_LARGE, "Request size limit exceeded");
    };

    let mut headers = parts.headers.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONNECTION);

    shared
        .lock()
        .upstream_requests
        .push(format!("{} {}", parts.method, path_and_query));

    let upstream = shared
        .http
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(upstream) => {
            let status = upstream.status();
            let mut headers = upstream.headers().clone();
            headers.remove(header::TRANSFER_ENCODING);
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::CONNECTION);
            let bytes = upstream.bytes().await.unwrap_or_default();

            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(_) => kong_error(
            StatusCode::BAD_GATEWAY,
            "An invalid response was received from the upstream server",
        ),
    }
}
