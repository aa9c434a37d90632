//! HTTP client for the CRM remote API.
//!
//! [`ApiClient`] owns the reqwest client and the endpoint contract:
//! cursor-paginated list fetches, batch relationship mutations,
//! single-item mutations, and batch deletes. Responses are decoded into
//! the raw wire shapes in [`wire`]; canonical classification happens in
//! `crmrelay-bulkops`, downstream of this crate.

pub mod wire;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crmrelay_shared::{
    AppConfig, BulkAction, CrmRelayError, Cursor, EntityId, Page, Resource, Result, SearchQuery,
    TargetContext, resolve_api_key,
};

use wire::{ListResponse, RawBatchResponse, RawSingleResponse};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("crmrelay/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Client for the CRM remote API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    api_key: String,
}

impl ApiClient {
    /// Create a client against `base_url` with a bearer `api_key`.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| CrmRelayError::config(format!("invalid API base URL '{base_url}': {e}")))?;
        // Url::join treats the last segment of a slashless path as a
        // file and drops it; a base like `https://host/api` must keep
        // its `/api` prefix in every endpoint.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CrmRelayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
        })
    }

    /// Create a client from the loaded config, resolving the API key
    /// from its configured environment variable.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(&config.api.base_url, api_key, config.api.timeout_secs)
    }

    /// Fetch one page of a resource listing.
    ///
    /// The cursor, when present, is passed through unchanged; the
    /// server owns its meaning. `query.extra_filters` become additional
    /// query parameters.
    #[instrument(skip_all, fields(resource = resource.path(), q = %query.free_text))]
    pub async fn list(
        &self,
        resource: Resource,
        query: &SearchQuery,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<Page> {
        let mut url = self.endpoint(&format!("v1/{}", resource.path()))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("limit", &limit.to_string());
            if !query.free_text.is_empty() {
                params.append_pair("q", &query.free_text);
            }
            if let Some(cursor) = cursor {
                params.append_pair("cursor", cursor.as_str());
            }
            for (field, value) in &query.extra_filters {
                params.append_pair(field, value);
            }
        }

        let response: ListResponse = self.get_json(url).await?;

        debug!(
            items = response.items.len(),
            has_next = response.next_cursor.is_some(),
            has_previous = response.previous_cursor.is_some(),
            "list page fetched"
        );

        Ok(Page {
            items: response.items.into_iter().map(Into::into).collect(),
            next_cursor: response.next_cursor.map(Cursor),
            previous_cursor: response.previous_cursor.map(Cursor),
            total_count: response.total_count,
        })
    }

    /// Submit a batch relationship mutation (or batch delete) for
    /// `entity_ids`, returning the raw per-id status map.
    #[instrument(skip_all, fields(action = action.verb(), count = entity_ids.len()))]
    pub async fn mutate_batch(
        &self,
        context: &TargetContext,
        action: BulkAction,
        entity_ids: &[EntityId],
    ) -> Result<RawBatchResponse> {
        let url = self.endpoint(&batch_path(context, action))?;
        let body = serde_json::json!({ "entity_ids": entity_ids });
        self.post_json(url, &body).await
    }

    /// Submit a single-item relationship mutation, returning the scalar
    /// success/failure response.
    #[instrument(skip_all, fields(action = action.verb(), entity = %entity_id))]
    pub async fn mutate_single(
        &self,
        context: &TargetContext,
        action: BulkAction,
        entity_id: &EntityId,
    ) -> Result<RawSingleResponse> {
        let url = self.endpoint(&single_path(context, action, entity_id))?;
        let body = serde_json::json!({ "entity_id": entity_id });
        self.post_json(url, &body).await
    }

    // -- internals ----------------------------------------------------------

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CrmRelayError::config(format!("invalid endpoint path '{path}': {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CrmRelayError::Transport(format!("{url}: {e}")))?;
        Self::decode(url, response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CrmRelayError::Transport(format!("{url}: {e}")))?;
        Self::decode(url, response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        url: Url,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrmRelayError::Transport(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(CrmRelayError::Api {
                status: status.as_u16(),
                message: truncate(&body, 200),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| CrmRelayError::decode(format!("{url}: {e}")))
    }
}

/// Endpoint path for a batch mutation against `context`.
fn batch_path(context: &TargetContext, action: BulkAction) -> String {
    match context {
        TargetContext::Relation { kind, target } => {
            format!("v1/{}/{}/members/{}", kind.collection(), target, action.verb())
        }
        TargetContext::Collection { resource } => {
            format!("v1/{}/batch-delete", resource.path())
        }
    }
}

/// Endpoint path for a single-item mutation against `context`.
fn single_path(context: &TargetContext, action: BulkAction, entity_id: &EntityId) -> String {
    match context {
        TargetContext::Relation { kind, target } => {
            format!("v1/{}/{}/member/{}", kind.collection(), target, action.verb())
        }
        TargetContext::Collection { resource } => {
            format!("v1/{}/{}/delete", resource.path(), entity_id)
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmrelay_shared::RelationKind;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), "test-key", 5).expect("build client")
    }

    #[test]
    fn batch_paths() {
        let seq = TargetContext::relation(RelationKind::Sequence, "s-9");
        assert_eq!(batch_path(&seq, BulkAction::Add), "v1/sequences/s-9/members/add");
        assert_eq!(
            batch_path(&seq, BulkAction::Remove),
            "v1/sequences/s-9/members/remove"
        );

        let emails = TargetContext::collection(Resource::Emails);
        assert_eq!(batch_path(&emails, BulkAction::Delete), "v1/emails/batch-delete");
    }

    #[test]
    fn single_paths() {
        let tag = TargetContext::relation(RelationKind::Tag, "t-3");
        assert_eq!(
            single_path(&tag, BulkAction::Add, &"c-1".into()),
            "v1/tags/t-3/member/add"
        );
        let emails = TargetContext::collection(Resource::Emails);
        assert_eq!(
            single_path(&emails, BulkAction::Delete, &"e-7".into()),
            "v1/emails/e-7/delete"
        );
    }

    #[tokio::test]
    async fn list_passes_cursor_through_and_decodes_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .and(query_param("limit", "20"))
            .and(query_param("q", "john"))
            .and(query_param("cursor", "tok-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "1", "display_name": "John Smith"},
                    {"id": "2", "display_name": "Johnson Yu", "company": "Acme"}
                ],
                "next_cursor": "tok-def",
                "total_count": 41
            })))
            .mount(&server)
            .await;

        let query = SearchQuery::text("john");
        let cursor = Cursor::from("tok-abc");
        let page = client(&server)
            .list(Resource::Contacts, &query, Some(&cursor), 20)
            .await
            .expect("list");

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].display_name, "Johnson Yu");
        assert_eq!(page.next_cursor, Some(Cursor::from("tok-def")));
        // No previous_cursor in the response: that direction is disabled.
        assert_eq!(page.previous_cursor, None);
        assert_eq!(page.total_count, Some(41));
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_preserved() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/crm/api/v1/contacts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        // No trailing slash on the configured base path.
        let client = ApiClient::new(&format!("{}/crm/api", server.uri()), "test-key", 5)
            .expect("build client");
        let page = client
            .list(Resource::Contacts, &SearchQuery::default(), None, 20)
            .await
            .expect("list");
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn list_forwards_extra_filters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/companies"))
            .and(query_param("region", "emea"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut query = SearchQuery::default();
        query.extra_filters.insert("region".into(), "emea".into());
        let page = client(&server)
            .list(Resource::Companies, &query, None, 10)
            .await
            .expect("list");
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn mutate_batch_posts_ids_and_decodes_status_map() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/sequences/s-1/members/add"))
            .and(body_json(serde_json::json!({"entity_ids": ["1", "2", "3"]})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"2": "ALREADY_IN_SEQUENCE"})),
            )
            .mount(&server)
            .await;

        let context = TargetContext::relation(RelationKind::Sequence, "s-1");
        let ids: Vec<EntityId> = vec!["1".into(), "2".into(), "3".into()];
        let raw = client(&server)
            .mutate_batch(&context, BulkAction::Add, &ids)
            .await
            .expect("mutate");

        assert_eq!(raw.entries.len(), 1);
        assert!(raw.entry(&"2".into()).is_some());
    }

    #[tokio::test]
    async fn mutate_single_decodes_scalar() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/tags/t-2/member/remove"))
            .and(body_json(serde_json::json!({"entity_id": "c-5"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": false, "code": "NOT_TAGGED"}),
            ))
            .mount(&server)
            .await;

        let context = TargetContext::relation(RelationKind::Tag, "t-2");
        let raw = client(&server)
            .mutate_single(&context, BulkAction::Remove, &"c-5".into())
            .await
            .expect("mutate");

        assert!(!raw.success);
        assert_eq!(raw.code.as_deref(), Some("NOT_TAGGED"));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .list(Resource::Contacts, &SearchQuery::default(), None, 20)
            .await
            .expect_err("should fail");

        match err {
            CrmRelayError::Api { status, message } => {
                assert_eq!(status, 503);
                assert!(message.contains("upstream down"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(
            client(&server)
                .list(Resource::Contacts, &SearchQuery::default(), None, 20)
                .await
                .unwrap_err()
                .is_transport()
        );
    }

    #[tokio::test]
    async fn malformed_body_maps_to_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/emails/batch-delete"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let context = TargetContext::collection(Resource::Emails);
        let err = client(&server)
            .mutate_batch(&context, BulkAction::Delete, &["10".into()])
            .await
            .expect_err("should fail");
        assert!(matches!(err, CrmRelayError::Decode { .. }));
    }
}
