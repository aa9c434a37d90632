//! Cursor-paginated remote search provider.
//!
//! One provider instance drives one picker: it owns the debounce timer,
//! the in-flight guard, and the cursor state, and publishes the current
//! page over a `tokio::sync::watch` channel for the presentation layer.
//!
//! Concurrency model:
//! - At most one outstanding list call per provider. A request arriving
//!   while a call is pending is recorded in a "latest pending" slot;
//!   exactly one follow-up fires once the in-flight call resolves, so
//!   intermediate requests collapse but none is silently dropped.
//! - Free-text edits wait out a quiescence window before fetching; each
//!   edit replaces the owned timer handle. Only the timer is ever
//!   cancelled — a dispatched network call always runs to completion
//!   and its result is conditionally discarded instead.
//! - Every dispatch carries a monotonically increasing generation; a
//!   response is applied only if its generation is still current, so
//!   the displayed page always corresponds to the most recent request.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crmrelay_api::ApiClient;
use crmrelay_shared::{Cursor, EntityId, EntityRef, Page, Resource, SearchConfig, SearchQuery};

/// Default quiescence window for free-text input.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default page size requested from the list endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

// ---------------------------------------------------------------------------
// Options / published state
// ---------------------------------------------------------------------------

/// Tuning knobs for one provider instance.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Quiescence window before a free-text change triggers a fetch.
    pub debounce: Duration,
    /// Page size requested from the server.
    pub page_size: u32,
    /// Metadata fields to substring-match client-side, for fields the
    /// server does not index. Empty disables text refinement.
    pub refine_fields: Vec<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
            refine_fields: Vec::new(),
        }
    }
}

impl ProviderOptions {
    /// Build options from the `[search]` config section.
    pub fn from_config(search: &SearchConfig) -> Self {
        Self {
            debounce: Duration::from_millis(search.debounce_ms),
            page_size: search.page_size,
            refine_fields: Vec::new(),
        }
    }
}

/// The provider's published view: the current page plus load/error flags.
///
/// On a failed fetch the last successfully loaded page is retained and
/// only `error` is set, so the picker never collapses to empty.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    /// Free text of the most recently dispatched query.
    pub query_text: String,
    pub items: Vec<EntityRef>,
    pub next_cursor: Option<Cursor>,
    pub previous_cursor: Option<Cursor>,
    pub total_count: Option<u64>,
    /// True from dispatch until the current-generation response lands.
    pub loading: bool,
    /// Message of the most recent failed fetch, cleared on success.
    pub error: Option<String>,
}

impl PageState {
    /// Whether forward pagination is available.
    pub fn can_page_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Whether backward pagination is available.
    pub fn can_page_previous(&self) -> bool {
        self.previous_cursor.is_some()
    }
}

// ---------------------------------------------------------------------------
// Fetch coordination (pure state machine)
// ---------------------------------------------------------------------------

/// What one fetch would ask the server for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FetchSpec {
    pub query: SearchQuery,
    pub cursor: Option<Cursor>,
}

/// Outcome of completing a fetch at the coordinator.
#[derive(Debug, PartialEq)]
pub(crate) struct Completion {
    /// Apply the response to published state. False when the response
    /// is stale or a newer query is already queued behind it.
    pub apply: bool,
    /// Follow-up fetch to dispatch (the collapsed "latest pending").
    pub follow_up: Option<(u64, FetchSpec)>,
}

/// In-flight guard, latest-pending slot, and generation counter.
///
/// Owned state per provider instance — deliberately not a module-level
/// flag. Pure so the coalescing and staleness rules are testable
/// without timers or a network.
#[derive(Debug, Default)]
pub(crate) struct FetchCoordinator {
    generation: u64,
    in_flight: Option<u64>,
    pending: Option<FetchSpec>,
}

impl FetchCoordinator {
    /// Ask to fetch `spec`. Returns the generation-tagged dispatch when
    /// the line is free; otherwise records it as latest pending (and
    /// collapses any previously pending spec).
    pub fn request(&mut self, spec: FetchSpec) -> Option<(u64, FetchSpec)> {
        if self.in_flight.is_some() {
            self.pending = Some(spec);
            return None;
        }
        self.generation += 1;
        self.in_flight = Some(self.generation);
        Some((self.generation, spec))
    }

    /// Record that the fetch tagged `generation` resolved (successfully
    /// or not) and decide what happens next.
    pub fn complete(&mut self, generation: u64) -> Completion {
        if self.in_flight != Some(generation) {
            // An older response arriving late: last request wins.
            return Completion {
                apply: false,
                follow_up: None,
            };
        }
        self.in_flight = None;

        match self.pending.take() {
            Some(spec) => {
                self.generation += 1;
                self.in_flight = Some(self.generation);
                Completion {
                    apply: false,
                    follow_up: Some((self.generation, spec)),
                }
            }
            None => Completion {
                apply: true,
                follow_up: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// SearchProvider
// ---------------------------------------------------------------------------

struct Inner {
    coordinator: FetchCoordinator,
    /// Owned debounce timer, replaced (aborted) on each text edit.
    debounce_timer: Option<JoinHandle<()>>,
    /// Query applied to the next fetch.
    query: SearchQuery,
    /// Spec of the most recently dispatched fetch, for `retry()`.
    last_dispatched: Option<FetchSpec>,
}

struct Shared {
    client: ApiClient,
    resource: Resource,
    options: ProviderOptions,
    inner: Mutex<Inner>,
    state: watch::Sender<PageState>,
}

/// Debounced, cancellation-safe remote search over one resource.
///
/// Cheap to clone; clones share the same instance state.
#[derive(Clone)]
pub struct SearchProvider {
    shared: Arc<Shared>,
}

impl SearchProvider {
    /// Create a provider for `resource`. No fetch is issued until
    /// [`refresh`](Self::refresh) or a query/pagination call.
    pub fn new(client: ApiClient, resource: Resource, options: ProviderOptions) -> Self {
        let (state, _) = watch::channel(PageState::default());
        Self {
            shared: Arc::new(Shared {
                client,
                resource,
                options,
                inner: Mutex::new(Inner {
                    coordinator: FetchCoordinator::default(),
                    debounce_timer: None,
                    query: SearchQuery::default(),
                    last_dispatched: None,
                }),
                state,
            }),
        }
    }

    /// Subscribe to page state changes.
    pub fn subscribe(&self) -> watch::Receiver<PageState> {
        self.shared.state.subscribe()
    }

    /// Current published state snapshot.
    pub fn state(&self) -> PageState {
        self.shared.state.borrow().clone()
    }

    /// Change the free-text query. The fetch fires after the quiescence
    /// window; each call resets the window and returns to the first page.
    pub async fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        let mut inner = self.shared.inner.lock().await;
        inner.query.free_text = text;
        let spec = FetchSpec {
            query: inner.query.clone(),
            cursor: None,
        };

        if let Some(timer) = inner.debounce_timer.take() {
            timer.abort();
        }

        let debounce = self.shared.options.debounce;
        if debounce.is_zero() {
            drop(inner);
            self.request_fetch(spec).await;
            return;
        }

        let provider = self.clone();
        inner.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            provider.request_fetch(spec).await;
        }));
    }

    /// Replace the exclusion set (ids dropped from every page client-side)
    /// and refetch the first page immediately.
    pub async fn set_exclusions(&self, exclusions: BTreeSet<EntityId>) {
        let spec = {
            let mut inner = self.shared.inner.lock().await;
            inner.query.exclusions = exclusions;
            FetchSpec {
                query: inner.query.clone(),
                cursor: None,
            }
        };
        self.request_fetch(spec).await;
    }

    /// Re-issue the current query from the first page.
    pub async fn refresh(&self) {
        let spec = {
            let inner = self.shared.inner.lock().await;
            FetchSpec {
                query: inner.query.clone(),
                cursor: None,
            }
        };
        self.request_fetch(spec).await;
    }

    /// Fetch the next page. Returns false (and fetches nothing) when
    /// the server did not hand out a forward cursor.
    pub async fn next_page(&self) -> bool {
        let cursor = self.shared.state.borrow().next_cursor.clone();
        self.page_with(cursor).await
    }

    /// Fetch the previous page. Returns false (and fetches nothing)
    /// when the server did not hand out a backward cursor.
    pub async fn previous_page(&self) -> bool {
        let cursor = self.shared.state.borrow().previous_cursor.clone();
        self.page_with(cursor).await
    }

    /// Re-issue the last dispatched query/cursor after a failure.
    /// No-op if nothing was ever dispatched.
    pub async fn retry(&self) {
        let spec = {
            let inner = self.shared.inner.lock().await;
            inner.last_dispatched.clone()
        };
        if let Some(spec) = spec {
            self.request_fetch(spec).await;
        }
    }

    // -- internals ----------------------------------------------------------

    async fn page_with(&self, cursor: Option<Cursor>) -> bool {
        let Some(cursor) = cursor else {
            return false;
        };
        let spec = {
            let inner = self.shared.inner.lock().await;
            FetchSpec {
                query: inner.query.clone(),
                cursor: Some(cursor),
            }
        };
        self.request_fetch(spec).await;
        true
    }

    /// Hand `spec` to the coordinator; dispatch now or queue as latest
    /// pending.
    async fn request_fetch(&self, spec: FetchSpec) {
        let dispatch = {
            let mut inner = self.shared.inner.lock().await;
            inner.coordinator.request(spec)
        };
        if let Some((generation, spec)) = dispatch {
            self.dispatch(generation, spec).await;
        }
    }

    /// Issue the network call for a generation-tagged spec. Runs the
    /// call to completion; the coordinator decides whether the result
    /// is applied. Loops while completions hand back a collapsed
    /// pending follow-up, so the line stays single-occupancy.
    async fn dispatch(&self, generation: u64, spec: FetchSpec) {
        let mut generation = generation;
        let mut spec = spec;
        loop {
            {
                let mut inner = self.shared.inner.lock().await;
                inner.last_dispatched = Some(spec.clone());
            }
            self.shared.state.send_modify(|s| {
                s.loading = true;
                s.query_text = spec.query.free_text.clone();
            });

            debug!(
                generation,
                q = %spec.query.free_text,
                cursor = spec.cursor.as_ref().map(Cursor::as_str),
                "dispatching list fetch"
            );

            let result = self
                .shared
                .client
                .list(
                    self.shared.resource,
                    &spec.query,
                    spec.cursor.as_ref(),
                    self.shared.options.page_size,
                )
                .await;

            let completion = {
                let mut inner = self.shared.inner.lock().await;
                inner.coordinator.complete(generation)
            };

            match result {
                Ok(page) if completion.apply => {
                    let page = refine_page(page, &spec.query, &self.shared.options.refine_fields);
                    self.shared.state.send_modify(|s| {
                        s.items = page.items;
                        s.next_cursor = page.next_cursor;
                        s.previous_cursor = page.previous_cursor;
                        s.total_count = page.total_count;
                        s.loading = false;
                        s.error = None;
                    });
                }
                Ok(_) => {
                    debug!(generation, "discarding superseded response");
                }
                Err(e) if completion.apply => {
                    warn!(generation, error = %e, "list fetch failed");
                    // Retain the last good page; only flag the error.
                    self.shared.state.send_modify(|s| {
                        s.loading = false;
                        s.error = Some(e.to_string());
                    });
                }
                Err(e) => {
                    debug!(generation, error = %e, "superseded fetch failed");
                }
            }

            match completion.follow_up {
                Some((next_generation, next_spec)) => {
                    generation = next_generation;
                    spec = next_spec;
                }
                None => break,
            }
        }
    }
}

/// Client-side refinement: drop excluded ids, then substring-match the
/// free text against the display name and the configured non-indexed
/// fields (when any are configured).
fn refine_page(mut page: Page, query: &SearchQuery, refine_fields: &[String]) -> Page {
    if !query.exclusions.is_empty() {
        page.items.retain(|item| !query.exclusions.contains(&item.id));
    }

    if !query.free_text.is_empty() && !refine_fields.is_empty() {
        let needle = query.free_text.to_lowercase();
        page.items.retain(|item| {
            if item.display_name.to_lowercase().contains(&needle) {
                return true;
            }
            refine_fields.iter().any(|field| {
                item.fields
                    .get(field)
                    .and_then(|v| v.as_str())
                    .is_some_and(|v| v.to_lowercase().contains(&needle))
            })
        });
    }

    page
}


#[cfg(test)]
mod provider_tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, options: ProviderOptions) -> SearchProvider {
        let client = ApiClient::new(&server.uri(), "test-key", 5).expect("client");
        SearchProvider::new(client, Resource::Contacts, options)
    }

    fn immediate() -> ProviderOptions {
        ProviderOptions {
            debounce: Duration::ZERO,
            ..ProviderOptions::default()
        }
    }

    async fn settled(
        rx: &mut watch::Receiver<PageState>,
        pred: impl FnMut(&PageState) -> bool,
    ) -> PageState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("state change before timeout")
            .expect("provider alive")
            .clone()
    }

    fn items_body(names: &[(&str, &str)], next: Option<&str>, prev: Option<&str>) -> serde_json::Value {
        let items: Vec<_> = names
            .iter()
            .map(|(id, name)| serde_json::json!({"id": id, "display_name": name}))
            .collect();
        let mut body = serde_json::json!({ "items": items });
        if let Some(next) = next {
            body["next_cursor"] = serde_json::json!(next);
        }
        if let Some(prev) = prev {
            body["previous_cursor"] = serde_json::json!(prev);
        }
        body
    }

    #[tokio::test]
    async fn rapid_edits_fire_exactly_one_fetch_with_final_text() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .and(query_param("q", "johnson"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("1", "Johnson Yu")],
                None,
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(
            &server,
            ProviderOptions {
                debounce: Duration::from_millis(80),
                ..ProviderOptions::default()
            },
        );
        let mut rx = provider.subscribe();

        // Three edits inside one quiescence window.
        provider.set_text("").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        provider.set_text("john").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        provider.set_text("johnson").await;

        let state = settled(&mut rx, |s| !s.loading && !s.items.is_empty()).await;
        assert_eq!(state.query_text, "johnson");
        assert_eq!(state.items[0].display_name, "Johnson Yu");
        // MockServer verifies expect(1) on drop: exactly one fetch fired.
    }

    #[tokio::test]
    async fn slow_superseded_query_is_never_displayed() {
        let server = MockServer::start().await;

        // The first query answers slowly, after the second was issued.
        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .and(query_param("q", "alpha"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(items_body(&[("1", "Alpha Industries")], None, None))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .and(query_param("q", "beta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("2", "Beta Labs")],
                None,
                None,
            )))
            .mount(&server)
            .await;

        let provider = provider(&server, immediate());
        let mut rx = provider.subscribe();

        let slow = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.set_text("alpha").await })
        };
        // Let the first fetch occupy the line, then supersede it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        provider.set_text("beta").await;

        let state = settled(&mut rx, |s| !s.loading && !s.items.is_empty()).await;
        assert_eq!(state.query_text, "beta");
        assert_eq!(state.items[0].display_name, "Beta Labs");

        slow.await.expect("join");
        // Even after the slow response lands, the newer query's page stays.
        let state = provider.state();
        assert_eq!(state.items[0].display_name, "Beta Labs");
    }

    #[tokio::test]
    async fn cursor_passes_through_and_absent_cursor_disables_direction() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .and(query_param("cursor", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("3", "Carol")],
                None,
                Some("page-1"),
            )))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("1", "Alice"), ("2", "Bob")],
                Some("page-2"),
                None,
            )))
            .mount(&server)
            .await;

        let provider = provider(&server, immediate());
        let mut rx = provider.subscribe();

        provider.refresh().await;
        let first = settled(&mut rx, |s| !s.loading && !s.items.is_empty()).await;
        assert!(first.can_page_next());
        assert!(!first.can_page_previous());

        // Backward direction is disabled on the first page.
        assert!(!provider.previous_page().await);

        assert!(provider.next_page().await);
        let second = settled(&mut rx, |s| {
            !s.loading && s.items.first().is_some_and(|i| i.display_name == "Carol")
        })
        .await;
        assert!(!second.can_page_next());
        assert!(second.can_page_previous());
        assert!(!provider.next_page().await);
    }

    #[tokio::test]
    async fn failure_retains_last_page_and_retry_recovers() {
        let server = MockServer::start().await;

        // First call succeeds, second fails, third (the retry) succeeds.
        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("1", "Alice")],
                None,
                None,
            )))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("2", "Bob")],
                None,
                None,
            )))
            .mount(&server)
            .await;

        let provider = provider(&server, immediate());
        let mut rx = provider.subscribe();

        provider.refresh().await;
        settled(&mut rx, |s| !s.loading && !s.items.is_empty()).await;

        provider.refresh().await;
        let failed = settled(&mut rx, |s| s.error.is_some()).await;
        assert_eq!(failed.items.len(), 1, "last good page retained");
        assert_eq!(failed.items[0].display_name, "Alice");

        provider.retry().await;
        let recovered = settled(&mut rx, |s| {
            s.error.is_none() && s.items.first().is_some_and(|i| i.display_name == "Bob")
        })
        .await;
        assert!(!recovered.loading);
    }

    #[tokio::test]
    async fn exclusions_are_removed_client_side() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items_body(
                &[("1", "Alice"), ("2", "Bob"), ("3", "Carol")],
                None,
                None,
            )))
            .mount(&server)
            .await;

        let provider = provider(&server, immediate());
        let mut rx = provider.subscribe();

        provider
            .set_exclusions(BTreeSet::from([EntityId::from("2")]))
            .await;

        let state = settled(&mut rx, |s| !s.loading && !s.items.is_empty()).await;
        let names: Vec<&str> = state.items.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }

    #[test]
    fn refinement_matches_configured_fields() {
        let mut hidden = EntityRef::new("1", "ACME Corp");
        hidden
            .fields
            .insert("notes".into(), serde_json::json!("call Johnson about renewal"));
        let miss = EntityRef::new("2", "Initech");

        let page = Page {
            items: vec![hidden, miss],
            ..Page::default()
        };
        let query = SearchQuery::text("johnson");
        let refined = refine_page(page, &query, &["notes".to_string()]);
        assert_eq!(refined.items.len(), 1);
        assert_eq!(refined.items[0].id.as_str(), "1");
    }

    #[test]
    fn options_come_from_search_config() {
        let search = SearchConfig {
            debounce_ms: 150,
            page_size: 50,
        };
        let options = ProviderOptions::from_config(&search);
        assert_eq!(options.debounce, Duration::from_millis(150));
        assert_eq!(options.page_size, 50);
    }

    #[test]
    fn refinement_disabled_without_fields() {
        let page = Page {
            items: vec![EntityRef::new("1", "Unrelated")],
            ..Page::default()
        };
        // Server-side matching already happened; with no refine fields
        // configured the page passes through untouched.
        let refined = refine_page(page, &SearchQuery::text("johnson"), &[]);
        assert_eq!(refined.items.len(), 1);
    }
}
