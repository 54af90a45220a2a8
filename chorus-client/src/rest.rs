//! REST data API client.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chorus_core::{BackendConfig, ChorusError, ChorusResult, Entity, EntityKey, MutationKind, Session, ValidationError};
use chorus_storage::RemoteCollection;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::error::{
    fetch_decode, fetch_status, fetch_transport, mutation_decode, mutation_status, mutation_transport,
};

const REST_PREFIX: &str = "/rest/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the hosted backend's REST data and auth APIs.
///
/// Requests carry the project's anonymous key, and the signed-in user's
/// access token once there is one. Clones share the session.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    session: Arc<RwLock<Option<Session>>>,
}

impl RestClient {
    pub fn new(config: &BackendConfig) -> ChorusResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                ChorusError::from(ValidationError::InvalidValue {
                    field: "backend.url".to_string(),
                    reason: format!("HTTP client setup failed: {}", e),
                })
            })?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: SecretString::from(config.anon_key.clone()),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session whose token authorizes requests.
    pub fn session(&self) -> Option<Session> {
        self.read_session().clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.write_session() = session;
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request with `apikey` and `Authorization` set.
    pub(crate) fn request(&self, method: Method, path: &str) -> ChorusResult<RequestBuilder> {
        let token = self.read_session().as_ref().map(|s| s.access_token.clone());
        let headers = auth_headers(self.anon_key.expose_secret(), token.as_deref())?;
        Ok(self.client.request(method, self.url(path)).headers(headers))
    }

    /// GET `path` and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> ChorusResult<T> {
        let response = self
            .request(Method::GET, path)?
            .query(query)
            .send()
            .await
            .map_err(|e| fetch_transport(resource, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(resource, status = status.as_u16(), "fetch failed");
            return Err(fetch_status(resource, status, &body));
        }
        response.json::<T>().await.map_err(|e| fetch_decode(resource, &e))
    }

    async fn send_mutation(
        &self,
        kind: MutationKind,
        resource: &str,
        request: RequestBuilder,
    ) -> ChorusResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| mutation_transport(kind, resource, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(resource, %kind, status = status.as_u16(), "mutation failed");
        Err(mutation_status(kind, resource, status, &body))
    }

    /// The single row a `return=representation` write echoes back.
    async fn returned_row<T: Entity>(kind: MutationKind, resource: &str, response: Response) -> ChorusResult<T> {
        let rows: Vec<T> = response
            .json()
            .await
            .map_err(|e| mutation_decode(kind, resource, e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| mutation_decode(kind, resource, "no row returned"))
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field("signed_in", &self.read_session().is_some())
            .finish()
    }
}

/// `apikey` plus a bearer token: the user's, else the anonymous key.
pub(crate) fn auth_headers(anon_key: &str, access_token: Option<&str>) -> ChorusResult<HeaderMap> {
    let invalid = |e: reqwest::header::InvalidHeaderValue| {
        ChorusError::from(ValidationError::InvalidValue {
            field: "authorization".to_string(),
            reason: e.to_string(),
        })
    };
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("apikey"), HeaderValue::from_str(anon_key).map_err(invalid)?);
    let bearer = format!("Bearer {}", access_token.unwrap_or(anon_key));
    let mut bearer = HeaderValue::from_str(&bearer).map_err(invalid)?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

pub(crate) fn table_path(table: &str) -> String {
    format!("{REST_PREFIX}/{table}")
}

/// Query selecting every column, newest first.
pub(crate) fn list_query() -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("order", "created_at.desc".to_string()),
    ]
}

/// `id=eq.<id>` filter. Temporary keys never reach the server.
pub(crate) fn id_filter(key: &EntityKey) -> ChorusResult<(&'static str, String)> {
    if key.is_temp() {
        return Err(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: format!("{key} has not been created on the server yet"),
        }
        .into());
    }
    Ok(("id", format!("eq.{}", key.as_str())))
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for RestClient {
    async fn fetch_all(&self) -> ChorusResult<Vec<T>> {
        let table = T::entity_kind().table();
        let rows: Vec<T> = self.get_json(table, &table_path(table), &list_query()).await?;
        tracing::debug!(resource = table, rows = rows.len(), "fetched collection");
        Ok(rows)
    }

    async fn create(&self, draft: &T::Draft) -> ChorusResult<T> {
        let kind = MutationKind::Create;
        let table = T::entity_kind().table();
        let request = self
            .request(Method::POST, &table_path(table))?
            .header("Prefer", "return=representation")
            .json(draft);
        let response = self.send_mutation(kind, table, request).await?;
        Self::returned_row(kind, table, response).await
    }

    async fn update(&self, key: &EntityKey, patch: &T::Patch) -> ChorusResult<T> {
        let kind = MutationKind::Update;
        let table = T::entity_kind().table();
        let filter = id_filter(key)?;
        let request = self
            .request(Method::PATCH, &table_path(table))?
            .query(&[filter])
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.send_mutation(kind, table, request).await?;
        Self::returned_row(kind, table, response).await
    }

    async fn delete(&self, key: &EntityKey) -> ChorusResult<()> {
        let kind = MutationKind::Delete;
        let table = T::entity_kind().table();
        let filter = id_filter(key)?;
        let request = self.request(Method::DELETE, &table_path(table))?.query(&[filter]);
        self.send_mutation(kind, table, request).await?;
        Ok(())
    }
}
