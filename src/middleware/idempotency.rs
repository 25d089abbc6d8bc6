use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::IdempotencyConfig;
use crate::error::ApiError;
use crate::middleware::firm_context::FirmContext;
use crate::middleware::transaction::is_mutating;
use crate::middleware::validate_user::CurrentUser;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";
pub const MAX_KEY_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scope: String,
    user_id: Uuid,
    key: String,
}

impl CacheKey {
    /// Keys are scoped per firm (or the platform tier) and per user
    pub fn new(firm_id: Option<Uuid>, user_id: Uuid, key: &str) -> Self {
        Self {
            scope: firm_id.map(|f| f.to_string()).unwrap_or_else(|| "platform".to_string()),
            user_id,
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl CachedResponse {
    fn into_replay(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Some(content_type) = self.content_type.and_then(|c| HeaderValue::from_str(&c).ok()) {
            headers.insert(CONTENT_TYPE, content_type);
        }
        headers.insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
        response
    }
}

#[derive(Debug)]
enum EntryState {
    InFlight,
    Completed(CachedResponse),
}

#[derive(Debug)]
struct Entry {
    fingerprint: [u8; 32],
    state: EntryState,
    created_at: Instant,
}

/// What to do with an incoming keyed request
#[derive(Debug, PartialEq)]
pub enum Claim {
    /// First sighting; the caller now owns the key
    Proceed,
    Replay(CachedResponse),
    /// Same key still being processed
    InFlight,
    /// Same key, different request
    Mismatch,
}

/// In-memory idempotency cache
pub struct IdempotencyStore {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    max_entries: usize,
    pub enabled: bool,
    pub max_body_bytes: usize,
}

impl IdempotencyStore {
    pub fn new(config: &IdempotencyConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries,
            enabled: config.enabled,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn fingerprint(method: &str, path: &str, body: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b" ");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(body);
        hasher.finalize().into()
    }

    pub fn claim(&self, key: &CacheKey, fingerprint: [u8; 32]) -> Claim {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.created_at) < self.ttl);

        if let Some(entry) = entries.get(key) {
            if entry.fingerprint != fingerprint {
                return Claim::Mismatch;
            }
            return match &entry.state {
                EntryState::InFlight => Claim::InFlight,
                EntryState::Completed(cached) => Claim::Replay(cached.clone()),
            };
        }

        entries.insert(
            key.clone(),
            Entry {
                fingerprint,
                state: EntryState::InFlight,
                created_at: now,
            },
        );
        Claim::Proceed
    }

    pub fn complete(&self, key: &CacheKey, response: CachedResponse) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.state = EntryState::Completed(response);
        }
        self.evict(&mut entries);
    }

    pub fn release(&self, key: &CacheKey) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the oldest completed entries past `max_entries`
    fn evict(&self, entries: &mut HashMap<CacheKey, Entry>) {
        if entries.len() <= self.max_entries {
            return;
        }
        let mut completed: Vec<(Instant, CacheKey)> = entries
            .iter()
            .filter(|(_, e)| matches!(e.state, EntryState::Completed(_)))
            .map(|(k, e)| (e.created_at, k.clone()))
            .collect();
        completed.sort_by_key(|(created, _)| *created);

        let excess = entries.len() - self.max_entries;
        for (_, key) in completed.into_iter().take(excess) {
            entries.remove(&key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Entry>> {
        // A panic while holding the lock leaves the map usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Replays completed mutations that carry an `Idempotency-Key` header
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let store = &state.idempotency;
    if !store.enabled || !is_mutating(request.method()) {
        return Ok(next.run(request).await);
    }
    let key = match request.headers().get(IDEMPOTENCY_HEADER) {
        None => return Ok(next.run(request).await),
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::bad_request("Idempotency-Key must be ASCII"))?
            .trim()
            .to_string(),
    };
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ApiError::bad_request(format!(
            "Idempotency-Key must be 1 to {} characters",
            MAX_KEY_LEN
        )));
    }

    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authenticated user missing from request"))?;
    let firm_id = request.extensions().get::<FirmContext>().map(|f| f.firm_id);
    let cache_key = CacheKey::new(firm_id, user.id, &key);

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, store.max_body_bytes)
        .await
        .map_err(|_| ApiError::payload_too_large(format!("Request body exceeds {} bytes", store.max_body_bytes)))?;
    let fingerprint = IdempotencyStore::fingerprint(parts.method.as_str(), parts.uri.path(), &body);

    match store.claim(&cache_key, fingerprint) {
        Claim::Proceed => {}
        Claim::Replay(cached) => {
            tracing::info!(key = %key, "Replaying idempotent response");
            return Ok(cached.into_replay());
        }
        Claim::InFlight => {
            tracing::warn!(key = %key, user_id = %cache_key.user_id, "Idempotency key already in flight");
            return Err(ApiError::conflict("A request with this Idempotency-Key is still being processed"));
        }
        Claim::Mismatch => {
            tracing::warn!(key = %key, user_id = %cache_key.user_id, "Idempotency key reused with a different request");
            return Err(ApiError::unprocessable_entity(
                "Idempotency-Key was already used for a different request",
                HashMap::from([(IDEMPOTENCY_HEADER.to_string(), "reused".to_string())]),
            ));
        }
    }

    // Dropped without `complete` (client gone, handler panic, 5xx) the key is released
    let guard = InFlightGuard::new(store, cache_key);
    let response = next.run(Request::from_parts(parts, Body::from(body))).await;
    let status = response.status();
    if status.is_server_error() {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to buffer response for idempotency cache: {}", e);
            return Err(ApiError::internal_server_error("Failed to read response body"));
        }
    };
    guard.complete(CachedResponse {
        status: status.as_u16(),
        content_type: parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.clone(),
    });
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Owns an `InFlight` claim until the response is stored
struct InFlightGuard<'a> {
    store: &'a IdempotencyStore,
    key: CacheKey,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(store: &'a IdempotencyStore, key: CacheKey) -> Self {
        Self { store, key, armed: true }
    }

    fn complete(mut self, response: CachedResponse) {
        self.armed = false;
        self.store.complete(&self.key, response);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(key = %self.key.key, "Releasing unfinished idempotency key");
            self.store.release(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_secs: u64, max_entries: usize) -> IdempotencyStore {
        IdempotencyStore::new(&IdempotencyConfig {
            enabled: true,
            ttl_secs,
            max_entries,
            max_body_bytes: 1024,
        })
    }

    fn cached(status: u16) -> CachedResponse {
        CachedResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(b"{\"success\":true}"),
        }
    }

    #[test]
    fn first_claim_proceeds_then_in_flight() {
        let s = store(60, 10);
        let key = CacheKey::new(None, Uuid::new_v4(), "abc");
        let fp = IdempotencyStore::fingerprint("POST", "/api/cases", b"{}");
        assert_eq!(s.claim(&key, fp), Claim::Proceed);
        assert_eq!(s.claim(&key, fp), Claim::InFlight);
    }

    #[test]
    fn completed_key_replays_and_detects_mismatch() {
        let s = store(60, 10);
        let key = CacheKey::new(Some(Uuid::new_v4()), Uuid::new_v4(), "abc");
        let fp = IdempotencyStore::fingerprint("POST", "/api/cases", b"{\"title\":\"A\"}");
        s.claim(&key, fp);
        s.complete(&key, cached(201));
        assert_eq!(s.claim(&key, fp), Claim::Replay(cached(201)));

        let other = IdempotencyStore::fingerprint("POST", "/api/cases", b"{\"title\":\"B\"}");
        assert_eq!(s.claim(&key, other), Claim::Mismatch);
    }

    #[test]
    fn released_key_can_be_retried() {
        let s = store(60, 10);
        let key = CacheKey::new(None, Uuid::new_v4(), "retry");
        let fp = IdempotencyStore::fingerprint("DELETE", "/api/tasks/1", b"");
        s.claim(&key, fp);
        s.release(&key);
        assert_eq!(s.claim(&key, fp), Claim::Proceed);
    }

    #[test]
    fn keys_are_scoped_per_user_and_firm() {
        let s = store(60, 10);
        let fp = IdempotencyStore::fingerprint("POST", "/api/clients", b"{}");
        let firm = Uuid::new_v4();
        let a = CacheKey::new(Some(firm), Uuid::new_v4(), "same");
        let b = CacheKey::new(Some(firm), Uuid::new_v4(), "same");
        let c = CacheKey::new(Some(Uuid::new_v4()), a.user_id, "same");
        assert_eq!(s.claim(&a, fp), Claim::Proceed);
        assert_eq!(s.claim(&b, fp), Claim::Proceed);
        assert_eq!(s.claim(&c, fp), Claim::Proceed);
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let s = store(0, 10);
        let key = CacheKey::new(None, Uuid::new_v4(), "ttl");
        let fp = IdempotencyStore::fingerprint("POST", "/x", b"");
        s.claim(&key, fp);
        s.complete(&key, cached(200));
        assert_eq!(s.claim(&key, fp), Claim::Proceed);
    }

    #[test]
    fn dropped_guard_releases_the_key() {
        let s = store(60, 10);
        let key = CacheKey::new(None, Uuid::new_v4(), "dropped");
        let fp = IdempotencyStore::fingerprint("POST", "/api/cases", b"{}");
        assert_eq!(s.claim(&key, fp), Claim::Proceed);
        drop(InFlightGuard::new(&s, key.clone()));
        assert_eq!(s.claim(&key, fp), Claim::Proceed);

        InFlightGuard::new(&s, key.clone()).complete(cached(201));
        assert_eq!(s.claim(&key, fp), Claim::Replay(cached(201)));
    }

    #[test]
    fn oldest_completed_entries_are_evicted() {
        let s = store(60, 2);
        let user = Uuid::new_v4();
        let fp = IdempotencyStore::fingerprint("POST", "/x", b"");
        let keys: Vec<CacheKey> = (0..3).map(|i| CacheKey::new(None, user, &format!("k{}", i))).collect();
        for key in &keys {
            s.claim(key, fp);
            std::thread::sleep(Duration::from_millis(2));
            s.complete(key, cached(200));
        }
        assert_eq!(s.len(), 2);
        assert_eq!(s.claim(&keys[0], fp), Claim::Proceed);
    }
}
