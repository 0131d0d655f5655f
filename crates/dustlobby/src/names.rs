//! Display names from the game's public user search.

use dashmap::DashMap;
use dustlobby_protocol::UserId;
use dustlobby_session::{NameResolver, SessionError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UserSearchResult {
    name: Option<String>,
}

/// Looks names up with `GET <base_url>?userid=<id>` and caches them for
/// the life of the process.
///
/// The endpoint answers with a JSON array; exactly one entry with a
/// `name` means the user exists.
pub struct HitboxNames {
    client: reqwest::Client,
    base_url: String,
    cache: DashMap<UserId, String>,
}

impl HitboxNames {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: DashMap::new(),
        }
    }

    async fn fetch(&self, user: UserId) -> Result<Vec<UserSearchResult>, reqwest::Error> {
        self.client
            .get(&self.base_url)
            .query(&[("userid", user.0)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

impl NameResolver for HitboxNames {
    async fn resolve(&self, user: UserId) -> Result<String, SessionError> {
        if !user.is_valid() {
            return Err(SessionError::UnknownUser(user));
        }
        if let Some(name) = self.cache.get(&user).map(|entry| entry.value().clone()) {
            return Ok(name);
        }

        let results = self.fetch(user).await.map_err(|e| {
            tracing::warn!(%user, error = %e, "name lookup failed");
            SessionError::LookupFailed(e.to_string())
        })?;
        let name = match results.as_slice() {
            [UserSearchResult { name: Some(name) }] if !name.is_empty() => name.clone(),
            _ => return Err(SessionError::UnknownUser(user)),
        };
        self.cache.insert(user, name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    /// Serves a fake user search: user 123 is "alice", everyone else is
    /// unknown. Counts requests.
    async fn fake_search() -> (String, Arc<AtomicUsize>) {
        async fn search(
            State(hits): State<Arc<AtomicUsize>>,
            Query(params): Query<HashMap<String, String>>,
        ) -> Json<serde_json::Value> {
            hits.fetch_add(1, Ordering::SeqCst);
            match params.get("userid").map(String::as_str) {
                Some("123") => Json(serde_json::json!([{ "name": "alice" }])),
                _ => Json(serde_json::json!([])),
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/userSearch.php", get(search))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/userSearch.php", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (url, hits)
    }

    #[tokio::test]
    async fn test_resolve_known_user_is_cached() {
        let (url, hits) = fake_search().await;
        let names = HitboxNames::new(url);

        assert_eq!(names.resolve(UserId(123)).await.unwrap(), "alice");
        assert_eq!(names.resolve(UserId(123)).await.unwrap(), "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_user_rejected() {
        let (url, _) = fake_search().await;
        let names = HitboxNames::new(url);

        let result = names.resolve(UserId(456)).await;

        assert!(matches!(result, Err(SessionError::UnknownUser(UserId(456)))));
    }

    #[tokio::test]
    async fn test_resolve_out_of_range_skips_lookup() {
        let (url, hits) = fake_search().await;
        let names = HitboxNames::new(url);

        assert!(names.resolve(UserId(0)).await.is_err());
        assert!(names.resolve(UserId(1_000_001)).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolve_unreachable_service_is_lookup_failure() {
        let names = HitboxNames::new("http://127.0.0.1:1/userSearch.php");
        let result = names.resolve(UserId(123)).await;
        assert!(matches!(result, Err(SessionError::LookupFailed(_))));
    }
}
