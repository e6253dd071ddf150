//! Banking epics
//!
//! One epic per screen concern: extract search and filters, infinite scroll,
//! transfer drafts, the transactions fetch with its delayed re-trigger,
//! transfers and explicit prefetch requests.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::domain::{validate_transfer, TransactionFilter, Transfer};
use crate::epic::{kinds, Action, Actions, Epic, StateStream, UiState};
use crate::error::{CacheError, Result};
use crate::prefetch::{PrefetchOptions, Prefetcher};
use crate::retry::RetryExecutor;
use crate::stream::{
    debounce, debounce_distinct, retry_with_delay, scroll_triggers, switch_map, PageCursor,
    SaveStatus, ScrollConfig, ScrollEvent, Settled, StreamRetryPolicy,
};

// == Settings ==
#[derive(Debug, Clone)]
pub struct EpicSettings {
    pub search_debounce: Duration,
    pub filter_debounce: Duration,
    pub autosave_debounce: Duration,
    pub scroll: ScrollConfig,
    /// Pause before a failed transactions fetch is requested again
    pub fetch_retry_delay: Duration,
    /// Re-triggers allowed after the first failed fetch
    pub max_fetch_retries: u32,
    pub transfer_retry: StreamRetryPolicy,
}

impl Default for EpicSettings {
    fn default() -> Self {
        Self {
            search_debounce: Duration::from_millis(300),
            filter_debounce: Duration::from_millis(500),
            autosave_debounce: Duration::from_millis(2000),
            scroll: ScrollConfig::default(),
            fetch_retry_delay: Duration::from_millis(1000),
            max_fetch_retries: 3,
            transfer_retry: StreamRetryPolicy::default(),
        }
    }
}

/// Everything the epics share.
#[derive(Clone)]
pub struct EpicContext {
    pub backend: Arc<dyn Backend>,
    pub executor: RetryExecutor<Value>,
    pub prefetcher: Prefetcher<Value>,
    pub settings: EpicSettings,
}

pub fn banking_epics(ctx: EpicContext) -> Vec<Epic<UiState>> {
    vec![
        search_epic(ctx.clone()),
        filter_epic(ctx.clone()),
        load_more_epic(ctx.clone()),
        autosave_epic(ctx.clone()),
        fetch_transactions_epic(ctx.clone()),
        fetch_retry_epic(ctx.clone()),
        transfer_epic(ctx.clone()),
        prefetch_epic(ctx),
    ]
}

// == Payloads ==
#[derive(Deserialize)]
struct SearchPayload {
    query: String,
}

#[derive(Deserialize, Default)]
struct FetchPayload {
    #[serde(default)]
    attempt: u32,
}

#[derive(Deserialize, Default)]
struct FetchFailure {
    #[serde(default)]
    attempt: u32,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct PrefetchPayload {
    page: usize,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    foreground: bool,
}

fn decode<T: DeserializeOwned>(action: &Action) -> Option<T> {
    match action.payload_as() {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "dropping malformed action");
            None
        }
    }
}

/// Pages of different sizes hold different rows, so the size is part of the key.
fn page_key(account_id: &str, page_size: usize, page: usize) -> String {
    format!("transactions:{}:page:{}:size:{}", account_id, page, page_size)
}

fn latest_key(account_id: &str) -> String {
    format!("transactions:{}:latest", account_id)
}

// == Backend Calls ==
async fn search_json(
    backend: Arc<dyn Backend>,
    account_id: String,
    query: String,
) -> anyhow::Result<Value> {
    let found = backend.search_transactions(&account_id, &query).await?;
    Ok(serde_json::to_value(found)?)
}

async fn filter_json(
    backend: Arc<dyn Backend>,
    account_id: String,
    filter: TransactionFilter,
) -> anyhow::Result<Value> {
    let found = backend.filter_transactions(&account_id, &filter).await?;
    Ok(serde_json::to_value(found)?)
}

async fn page_json(
    backend: Arc<dyn Backend>,
    account_id: String,
    page: usize,
    page_size: usize,
) -> anyhow::Result<Value> {
    let items = backend.list_transactions(&account_id, page, page_size).await?;
    Ok(serde_json::to_value(items)?)
}

async fn transfer_json(backend: Arc<dyn Backend>, transfer: Transfer) -> anyhow::Result<Value> {
    let booked = backend.create_transaction(&transfer).await?;
    Ok(serde_json::to_value(booked)?)
}

// == Search ==
fn search_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let queries = actions
            .of_type(&[kinds::SEARCH_REQUESTED])
            .filter_map(|action| {
                future::ready(decode::<SearchPayload>(&action).map(|p| p.query.trim().to_string()))
            });
        let queries = debounce_distinct(queries, ctx.settings.search_debounce);

        let ctx = ctx.clone();
        switch_map(queries, move |query: String| {
            let ctx = ctx.clone();
            let account_id = state.borrow().account_id.clone();
            async move {
                let key = format!("search:{}:{}", account_id, query);
                let backend = Arc::clone(&ctx.backend);
                let q = query.clone();
                let outcome = ctx
                    .executor
                    .get_or_fetch(&key, move || {
                        search_json(Arc::clone(&backend), account_id.clone(), q.clone())
                    })
                    .await;

                match outcome {
                    Ok(results) => Action::new(
                        kinds::SEARCH_SUCCEEDED,
                        json!({ "query": query, "results": results }),
                    ),
                    Err(err) => Action::new(
                        kinds::SEARCH_FAILED,
                        json!({ "query": query, "error": err.to_string() }),
                    ),
                }
            }
        })
    })
}

// == Filter ==
fn filter_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let filters = actions
            .of_type(&[kinds::FILTER_CHANGED])
            .filter_map(|action| future::ready(decode::<TransactionFilter>(&action)));
        let filters = debounce_distinct(filters, ctx.settings.filter_debounce);

        let ctx = ctx.clone();
        switch_map(filters, move |filter: TransactionFilter| {
            let ctx = ctx.clone();
            let account_id = state.borrow().account_id.clone();
            async move {
                let key = format!(
                    "filter:{}:{:?}:{:?}:{:?}",
                    account_id, filter.kind, filter.min_amount_cents, filter.max_amount_cents
                );
                let backend = Arc::clone(&ctx.backend);
                let applied = filter.clone();
                let outcome = ctx
                    .executor
                    .get_or_fetch(&key, move || {
                        filter_json(Arc::clone(&backend), account_id.clone(), applied.clone())
                    })
                    .await;

                match outcome {
                    Ok(results) => Action::new(
                        kinds::FILTER_APPLIED,
                        json!({ "filter": filter, "results": results }),
                    ),
                    Err(err) => Action::new(
                        kinds::FILTER_FAILED,
                        json!({ "filter": filter, "error": err.to_string() }),
                    ),
                }
            }
        })
    })
}

// == Infinite Scroll ==
/// Loads the next extract page near the end of the list and queues the
/// one after it for background prefetch.
///
/// Paging restarts at the first page whenever the account or the page size
/// in the UI state changes.
fn load_more_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let events = actions
            .of_type(&[kinds::EXTRACT_SCROLLED])
            .filter_map(|action| future::ready(decode::<ScrollEvent>(&action)));
        let triggers = scroll_triggers(events, &ctx.settings.scroll);

        let ctx = ctx.clone();
        let cursor = Arc::new(PageCursor::<(String, usize)>::new(ctx.settings.scroll.first_page));
        switch_map(triggers, move |_| {
            let ctx = ctx.clone();
            let cursor = Arc::clone(&cursor);
            let UiState {
                account_id,
                page_size,
            } = state.borrow().clone();
            let scope = (account_id.clone(), page_size);
            let number = cursor.next(&scope);

            async move {
                let key = page_key(&account_id, page_size, number);
                let loaded = ctx
                    .prefetcher
                    .prefetch_now(&key, || {
                        page_json(Arc::clone(&ctx.backend), account_id.clone(), number, page_size)
                    })
                    .await;

                match loaded {
                    Ok(items) => {
                        cursor.advance(&scope, number);
                        prefetch_page(&ctx, &account_id, number + 1, page_size, PrefetchOptions::default())
                            .await;
                        Action::new(
                            kinds::EXTRACT_PAGE_LOADED,
                            json!({ "page": number, "items": items }),
                        )
                    }
                    Err(err) => Action::new(
                        kinds::EXTRACT_PAGE_FAILED,
                        json!({ "page": number, "error": err.to_string() }),
                    ),
                }
            }
        })
    })
}

async fn prefetch_page(
    ctx: &EpicContext,
    account_id: &str,
    page: usize,
    page_size: usize,
    options: PrefetchOptions,
) -> String {
    let key = page_key(account_id, page_size, page);
    let backend = Arc::clone(&ctx.backend);
    let account_id = account_id.to_string();
    ctx.prefetcher
        .schedule_prefetch(
            &key,
            move || page_json(Arc::clone(&backend), account_id.clone(), page, page_size),
            options,
        )
        .await;
    key
}

// == Auto-save ==
fn status_action(status: &SaveStatus) -> Action {
    Action::new(kinds::AUTOSAVE_STATUS, json!(status))
}

/// `saving` goes out on every edit; the save itself only runs for the
/// latest draft once edits pause.
fn autosave_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let saving = actions
            .of_type(&[kinds::DRAFT_CHANGED])
            .map(|_| status_action(&SaveStatus::Saving));
        let drafts = debounce(
            actions
                .of_type(&[kinds::DRAFT_CHANGED])
                .map(|action| action.payload),
            ctx.settings.autosave_debounce,
        );

        let backend = Arc::clone(&ctx.backend);
        let saved = switch_map(drafts, move |draft: Value| {
            let backend = Arc::clone(&backend);
            let account_id = state.borrow().account_id.clone();
            async move {
                let status = match backend.save_draft(&account_id, &draft).await {
                    Ok(()) => SaveStatus::Saved { at: Utc::now() },
                    Err(err) => {
                        warn!(error = %err, "draft save failed");
                        SaveStatus::Error {
                            message: format!("{:#}", err),
                        }
                    }
                };
                status_action(&status)
            }
        });

        futures::stream::select(saving, saved).boxed()
    })
}

// == Transactions Fetch ==
fn fetch_transactions_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let requests = actions
            .of_type(&[kinds::TRANSACTIONS_FETCH])
            .map(|action| action.payload_as::<FetchPayload>().unwrap_or_default().attempt);

        let ctx = ctx.clone();
        switch_map(requests, move |attempt: u32| {
            let ctx = ctx.clone();
            let UiState {
                account_id,
                page_size,
            } = state.borrow().clone();

            async move {
                let key = latest_key(&account_id);
                let cached = ctx.executor.cache().write().await.get(&key);
                if let Some(items) = cached {
                    return Action::new(
                        kinds::TRANSACTIONS_LOADED,
                        json!({ "items": items, "attempt": attempt, "cached": true }),
                    );
                }

                match page_json(Arc::clone(&ctx.backend), account_id, 1, page_size).await {
                    Ok(items) => {
                        ctx.executor.cache().write().await.set(key, items.clone());
                        Action::new(
                            kinds::TRANSACTIONS_LOADED,
                            json!({ "items": items, "attempt": attempt, "cached": false }),
                        )
                    }
                    Err(err) => {
                        warn!(attempt, error = %err, "transactions fetch failed");
                        Action::new(
                            kinds::TRANSACTIONS_FETCH_FAILED,
                            json!({ "attempt": attempt, "error": format!("{:#}", err) }),
                        )
                    }
                }
            }
        })
    })
}

/// Turns a failed fetch back into a fetch request after a fixed delay,
/// until the re-trigger budget runs out.
fn fetch_retry_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, _state: StateStream<UiState>| {
        let delay = ctx.settings.fetch_retry_delay;
        let max_retries = ctx.settings.max_fetch_retries;

        actions
            .of_type(&[kinds::TRANSACTIONS_FETCH_FAILED])
            .then(move |action: Action| async move {
                let failure = action.payload_as::<FetchFailure>().unwrap_or_default();
                if failure.attempt >= max_retries {
                    info!(attempts = failure.attempt + 1, "giving up on transactions fetch");
                    return Action::new(
                        kinds::TRANSACTIONS_FETCH_ABANDONED,
                        json!({ "attempts": failure.attempt + 1, "error": failure.error }),
                    );
                }

                tokio::time::sleep(delay).await;
                Action::new(
                    kinds::TRANSACTIONS_FETCH,
                    json!({ "attempt": failure.attempt + 1 }),
                )
            })
            .boxed()
    })
}

// == Transfer ==
/// Transfers are booked one at a time, in submission order. A transfer
/// that fails validation is rejected without ever reaching the backend.
fn transfer_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let ctx = ctx.clone();
        actions
            .of_type(&[kinds::TRANSFER_SUBMITTED])
            .then(move |action: Action| {
                let ctx = ctx.clone();
                let account_id = state.borrow().account_id.clone();
                async move { submit_transfer(&ctx, &account_id, &action).await }
            })
            .boxed()
    })
}

/// Decodes a submitted transfer, fills in the signed-in account and
/// validates it.
fn prepare_transfer(account_id: &str, action: &Action) -> Result<Transfer> {
    let mut transfer: Transfer = action.payload_as()?;
    if transfer.from_account.is_empty() {
        transfer.from_account = account_id.to_string();
    }
    validate_transfer(&transfer)?;
    Ok(transfer)
}

async fn submit_transfer(ctx: &EpicContext, account_id: &str, action: &Action) -> Action {
    let transfer = match prepare_transfer(account_id, action) {
        Ok(transfer) => transfer,
        Err(err) => {
            let reason = match err {
                CacheError::Validation(reason) => reason.to_string(),
                other => other.to_string(),
            };
            info!(%reason, "transfer rejected");
            return Action::new(kinds::TRANSFER_REJECTED, json!({ "reason": reason }));
        }
    };

    let backend = Arc::clone(&ctx.backend);
    let settled = retry_with_delay(
        || transfer_json(Arc::clone(&backend), transfer.clone()),
        &ctx.settings.transfer_retry,
    )
    .await;

    match settled {
        Settled::Value(booked) => {
            invalidate_account(ctx, &transfer.from_account).await;
            Action::new(kinds::TRANSFER_COMPLETED, json!({ "transaction": booked }))
        }
        Settled::Failed(error) => Action::new(kinds::TRANSFER_FAILED, json!({ "error": error })),
        Settled::TimedOut => Action::new(kinds::TRANSFER_FAILED, json!({ "error": "timed out" })),
    }
}

/// Drops every cached read for `account_id` after its balance moved.
async fn invalidate_account(ctx: &EpicContext, account_id: &str) {
    let pattern = format!("^(transactions|search|filter):{}:", regex::escape(account_id));
    let mut dropped = ctx.executor.cache().write().await.clear(Some(&pattern));
    dropped += ctx.prefetcher.cache().write().await.clear(Some(&pattern));
    debug!(account_id, dropped, "account caches invalidated");
}

// == Prefetch ==
fn prefetch_epic(ctx: EpicContext) -> Epic<UiState> {
    Box::new(move |actions: Actions, state: StateStream<UiState>| {
        let ctx = ctx.clone();
        actions
            .of_type(&[kinds::PREFETCH_REQUESTED])
            .filter_map(|action| future::ready(decode::<PrefetchPayload>(&action)))
            .then(move |request: PrefetchPayload| {
                let ctx = ctx.clone();
                let UiState {
                    account_id,
                    page_size,
                } = state.borrow().clone();

                async move {
                    let mut options = PrefetchOptions::default().priority(request.priority);
                    if request.foreground {
                        options = options.foreground();
                    }
                    let key = prefetch_page(&ctx, &account_id, request.page, page_size, options).await;
                    Action::new(
                        kinds::PREFETCH_SCHEDULED,
                        json!({ "key": key, "priority": request.priority }),
                    )
                }
            })
            .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::epic::{combine_epics, ActionStream, EpicCoordinator};
    use crate::prefetch::{PrefetchConfig, PrefetchState};
    use crate::retry::RetryConfig;

    struct Harness {
        coordinator: EpicCoordinator<UiState>,
        backend: Arc<InMemoryBackend>,
        ctx: EpicContext,
    }

    fn harness() -> Harness {
        let backend = Arc::new(InMemoryBackend::seeded("acc-1", 30));
        let ctx = EpicContext {
            backend: backend.clone(),
            executor: RetryExecutor::new(RetryConfig {
                retry_delay: Duration::from_millis(10),
                ..Default::default()
            }),
            prefetcher: Prefetcher::new(PrefetchConfig::default()),
            settings: EpicSettings::default(),
        };
        let coordinator = EpicCoordinator::new(UiState {
            account_id: "acc-1".to_string(),
            page_size: 10,
        });
        coordinator.run(combine_epics(banking_epics(ctx.clone())));

        Harness {
            coordinator,
            backend,
            ctx,
        }
    }

    async fn wait_for(log: &mut ActionStream, kind: &str) -> Action {
        loop {
            let action = log.next().await.expect("action log closed");
            if action.is(kind) {
                return action;
            }
        }
    }

    async fn quiet_for(log: &mut ActionStream, kind: &str) -> bool {
        tokio::time::timeout(Duration::from_secs(5), wait_for(log, kind))
            .await
            .is_err()
    }

    fn count(coordinator: &EpicCoordinator<UiState>, kind: &str) -> usize {
        coordinator
            .recent_actions()
            .iter()
            .filter(|action| action.is(kind))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_collapses_keystrokes() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        for query in ["m", "me", "mer", "merc"] {
            h.coordinator
                .dispatch(Action::new(kinds::SEARCH_REQUESTED, json!({ "query": query })));
        }

        let done = wait_for(&mut log, kinds::SEARCH_SUCCEEDED).await;
        assert_eq!(done.payload["query"], "merc");
        assert!(!done.payload["results"].as_array().unwrap().is_empty());
        assert_eq!(h.backend.calls(), 1);

        // Same query again is suppressed.
        h.coordinator
            .dispatch(Action::new(kinds::SEARCH_REQUESTED, json!({ "query": "merc " })));
        assert!(quiet_for(&mut log, kinds::SEARCH_SUCCEEDED).await);
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_results() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        h.coordinator
            .dispatch(Action::new(kinds::FILTER_CHANGED, json!({ "kind": "credit" })));

        let applied = wait_for(&mut log, kinds::FILTER_APPLIED).await;
        let results = applied.payload["results"].as_array().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|tx| tx["kind"] == "credit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_retriggered() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();
        h.backend.fail_next(2);

        h.coordinator.dispatch(Action::bare(kinds::TRANSACTIONS_FETCH));

        let loaded = wait_for(&mut log, kinds::TRANSACTIONS_LOADED).await;
        assert_eq!(loaded.payload["attempt"], 2);
        assert_eq!(loaded.payload["items"].as_array().unwrap().len(), 10);
        assert_eq!(count(&h.coordinator, kinds::TRANSACTIONS_FETCH_FAILED), 2);
        assert_eq!(h.backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retrigger_is_bounded() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();
        h.backend.fail_next(100);

        h.coordinator.dispatch(Action::bare(kinds::TRANSACTIONS_FETCH));

        let abandoned = wait_for(&mut log, kinds::TRANSACTIONS_FETCH_ABANDONED).await;
        assert_eq!(abandoned.payload["attempts"], 4);
        assert_eq!(h.backend.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_transfer_is_never_sent() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        h.coordinator.dispatch(Action::new(
            kinds::TRANSFER_SUBMITTED,
            json!({ "to_account": "acc-2", "amount_cents": 0 }),
        ));

        let rejected = wait_for(&mut log, kinds::TRANSFER_REJECTED).await;
        assert_eq!(rejected.payload["reason"], "amount must be greater than zero");

        h.coordinator.dispatch(Action::new(
            kinds::TRANSFER_SUBMITTED,
            json!({ "to_account": "acc-2", "amount_cents": "lots" }),
        ));
        let rejected = wait_for(&mut log, kinds::TRANSFER_REJECTED).await;
        assert!(rejected.payload["reason"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request"));
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_invalidates_account_caches() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();
        {
            let mut cache = h.ctx.executor.cache().write().await;
            cache.set("search:acc-1:merc", json!([]));
            cache.set("search:acc-2:merc", json!([]));
        }
        h.ctx
            .prefetcher
            .cache()
            .write()
            .await
            .set(page_key("acc-1", 10, 2), json!([]));
        h.backend.fail_next(1);

        h.coordinator.dispatch(Action::new(
            kinds::TRANSFER_SUBMITTED,
            json!({ "to_account": "acc-2", "amount_cents": 1500 }),
        ));

        let completed = wait_for(&mut log, kinds::TRANSFER_COMPLETED).await;
        assert_eq!(completed.payload["transaction"]["account_id"], "acc-1");
        assert_eq!(h.backend.calls(), 2);

        assert!(!h.ctx.executor.cache().read().await.contains("search:acc-1:merc"));
        assert!(h.ctx.executor.cache().read().await.contains("search:acc-2:merc"));
        assert!(!h.ctx.prefetcher.cache().read().await.contains(&page_key("acc-1", 10, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_past_threshold_loads_next_page() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        h.coordinator.dispatch(Action::new(
            kinds::EXTRACT_SCROLLED,
            json!({ "scroll_y": 750.0, "viewport_height": 100.0, "content_height": 1000.0 }),
        ));

        let loaded = wait_for(&mut log, kinds::EXTRACT_PAGE_LOADED).await;
        assert_eq!(loaded.payload["page"], 1);
        assert_eq!(loaded.payload["items"].as_array().unwrap().len(), 10);
        assert_eq!(
            h.ctx.prefetcher.status(&page_key("acc-1", 10, 2)),
            Some(PrefetchState::Queued)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_paging_restarts_when_account_or_page_size_changes() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();
        let near_end = json!({ "scroll_y": 900.0, "viewport_height": 100.0, "content_height": 1000.0 });

        h.coordinator
            .dispatch(Action::new(kinds::EXTRACT_SCROLLED, near_end.clone()));
        let loaded = wait_for(&mut log, kinds::EXTRACT_PAGE_LOADED).await;
        assert_eq!(loaded.payload["page"], 1);

        h.coordinator
            .update_state(|state| state.account_id = "acc-2".to_string());
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.coordinator
            .dispatch(Action::new(kinds::EXTRACT_SCROLLED, near_end.clone()));
        let loaded = wait_for(&mut log, kinds::EXTRACT_PAGE_LOADED).await;
        assert_eq!(loaded.payload["page"], 1);
        assert!(h
            .ctx
            .prefetcher
            .cache()
            .read()
            .await
            .contains(&page_key("acc-2", 10, 1)));

        h.coordinator.update_state(|state| {
            state.account_id = "acc-1".to_string();
            state.page_size = 5;
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.coordinator
            .dispatch(Action::new(kinds::EXTRACT_SCROLLED, near_end));
        let loaded = wait_for(&mut log, kinds::EXTRACT_PAGE_LOADED).await;
        assert_eq!(loaded.payload["page"], 1);
        assert_eq!(loaded.payload["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_below_threshold_is_ignored() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        h.coordinator.dispatch(Action::new(
            kinds::EXTRACT_SCROLLED,
            json!({ "scroll_y": 650.0, "viewport_height": 100.0, "content_height": 1000.0 }),
        ));

        assert!(quiet_for(&mut log, kinds::EXTRACT_PAGE_LOADED).await);
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_reports_saving_then_saved() {
        let h = harness();
        let mut log = h.coordinator.actions().of_type(&[kinds::AUTOSAVE_STATUS]);

        for amount in [1, 12, 120] {
            h.coordinator
                .dispatch(Action::new(kinds::DRAFT_CHANGED, json!({ "amount": amount })));
        }

        let mut statuses = Vec::new();
        loop {
            let action = log.next().await.unwrap();
            let status = action.payload["status"].as_str().unwrap().to_string();
            let settled = status != "saving";
            statuses.push(status);
            if settled {
                break;
            }
        }

        assert_eq!(statuses, vec!["saving", "saving", "saving", "saved"]);
        assert_eq!(h.backend.draft("acc-1"), Some(json!({ "amount": 120 })));
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_request_is_queued() {
        let h = harness();
        let mut log = h.coordinator.actions().stream();

        h.coordinator.dispatch(Action::new(
            kinds::PREFETCH_REQUESTED,
            json!({ "page": 3, "priority": 5 }),
        ));

        let scheduled = wait_for(&mut log, kinds::PREFETCH_SCHEDULED).await;
        assert_eq!(scheduled.payload["key"], page_key("acc-1", 10, 3));
        assert_eq!(h.ctx.prefetcher.queued_priority(&page_key("acc-1", 10, 3)), Some(5));
    }
}
