//! HTTP client for the authoritative inventory backend.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::models::{EntityKind, EntitySnapshot};
use crate::remote::{RemoteError, RemoteResult, RemoteService};
use crate::util::{is_http_url, normalize_text_option};

/// Remote service backed by the inventory HTTP API.
///
/// Collection paths follow `/v1/{kind}` with plural kind names. Conditional
/// writes carry the client's base `updated_at`; the server answers 409 when
/// its state diverged.
#[derive(Clone)]
pub struct HttpRemoteService {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteService {
    /// Build a client for `endpoint`, with an optional bearer token.
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> RemoteResult<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            endpoint,
            token: token.and_then(|token| normalize_text_option(Some(token))),
            client,
        })
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/v1/{}", self.endpoint, kind.plural())
    }

    fn entity_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/v1/{}/{}", self.endpoint, kind.plural(), id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_snapshot(response: reqwest::Response) -> RemoteResult<EntitySnapshot> {
        response
            .json::<EntitySnapshot>()
            .await
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))
    }
}

impl RemoteService for HttpRemoteService {
    async fn create(
        &self,
        snapshot: &EntitySnapshot,
        idempotency_key: &str,
    ) -> RemoteResult<EntitySnapshot> {
        let response = self
            .authorize(self.client.post(self.collection_url(snapshot.kind)))
            .header("Idempotency-Key", idempotency_key)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Conflict {
                entity_id: snapshot.id.clone(),
                reason: parse_api_error(status, &body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        Self::read_snapshot(response).await
    }

    async fn update(
        &self,
        snapshot: &EntitySnapshot,
        base_updated_at: i64,
    ) -> RemoteResult<EntitySnapshot> {
        let response = self
            .authorize(self.client.put(self.entity_url(snapshot.kind, &snapshot.id)))
            .query(&[("base", base_updated_at)])
            .json(snapshot)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::Conflict {
                entity_id: snapshot.id.clone(),
                reason: "entity missing on remote".to_string(),
            });
        }
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Conflict {
                entity_id: snapshot.id.clone(),
                reason: parse_api_error(status, &body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        Self::read_snapshot(response).await
    }

    async fn delete(&self, kind: EntityKind, id: &str, base_updated_at: i64) -> RemoteResult<()> {
        let response = self
            .authorize(self.client.delete(self.entity_url(kind, id)))
            .query(&[("base", base_updated_at)])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        // Already gone counts as success
        if status == StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(RemoteError::Conflict {
                entity_id: id.to_string(),
                reason: parse_api_error(status, &body),
            });
        }
        Err(RemoteError::Api(parse_api_error(status, &body)))
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> RemoteResult<Option<EntitySnapshot>> {
        let response = self
            .authorize(self.client.get(self.entity_url(kind, id)))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        Ok(Some(Self::read_snapshot(response).await?))
    }

    async fn find_by_code(
        &self,
        kind: EntityKind,
        code: &str,
    ) -> RemoteResult<Option<EntitySnapshot>> {
        let response = self
            .authorize(self.client.get(self.collection_url(kind)))
            .query(&[("code", code)])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        let matches = response
            .json::<Vec<EntitySnapshot>>()
            .await
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;
        Ok(matches.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> RemoteResult<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Api("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Api(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_parse_api_error_prefers_message() {
        let body = r#"{"error":"dup","message":"code already taken"}"#;
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, body),
            "code already taken (409)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "broken"),
            "broken (400)"
        );
    }

    #[test]
    fn test_entity_urls() {
        let remote = HttpRemoteService::new("https://api.example.com/", None).unwrap();
        assert_eq!(
            remote.collection_url(EntityKind::Category),
            "https://api.example.com/v1/categories"
        );
        assert_eq!(
            remote.entity_url(EntityKind::Item, "e1"),
            "https://api.example.com/v1/items/e1"
        );
    }
}
