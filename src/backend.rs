//! Banking backend seam
//!
//! The epics only talk to a [`Backend`]. The daemon and the tests use
//! [`InMemoryBackend`], which can inject latency and transient failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::domain::{Transaction, TransactionFilter, TransactionKind, Transfer};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Transactions whose description or counterparty contains `query`.
    async fn search_transactions(&self, account_id: &str, query: &str)
        -> anyhow::Result<Vec<Transaction>>;

    async fn filter_transactions(
        &self,
        account_id: &str,
        filter: &TransactionFilter,
    ) -> anyhow::Result<Vec<Transaction>>;

    /// One page of the extract, newest first. Pages start at 1.
    async fn list_transactions(
        &self,
        account_id: &str,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<Transaction>>;

    /// Books a transfer as a debit on the source account.
    async fn create_transaction(&self, transfer: &Transfer) -> anyhow::Result<Transaction>;

    async fn save_draft(&self, account_id: &str, draft: &Value) -> anyhow::Result<()>;
}

// == In-memory Backend ==
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    transactions: RwLock<Vec<Transaction>>,
    drafts: Mutex<HashMap<String, Value>>,
    latency: Mutex<Duration>,
    failures_remaining: AtomicU32,
    calls: AtomicU64,
    next_id: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        let backend = Self::new();
        backend
            .next_id
            .store(transactions.len() as u64, Ordering::Relaxed);
        *backend.transactions.write() = transactions;
        backend
    }

    /// A demo account with a few weeks of history.
    pub fn seeded(account_id: &str, count: usize) -> Self {
        const MERCHANTS: [&str; 6] = [
            "Mercado Central",
            "Mercury Energy",
            "City Rent Ltd",
            "Bookshop Lisboa",
            "Payroll Inc",
            "Coffee Corner",
        ];

        let now = Utc::now();
        let transactions = (0..count)
            .map(|n| {
                let merchant = MERCHANTS[n % MERCHANTS.len()];
                let kind = if merchant == "Payroll Inc" {
                    TransactionKind::Credit
                } else {
                    TransactionKind::Debit
                };
                Transaction {
                    id: format!("tx-{}", n + 1),
                    account_id: account_id.to_string(),
                    counterparty: merchant.to_string(),
                    description: format!("{} #{}", merchant, n + 1),
                    amount_cents: 500 + (n as i64 * 137) % 20_000,
                    kind,
                    created_at: now - ChronoDuration::hours(n as i64 * 6),
                }
            })
            .collect();

        Self::with_transactions(transactions)
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Total calls received, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn draft(&self, account_id: &str) -> Option<Value> {
        self.drafts.lock().get(account_id).cloned()
    }

    async fn simulate(&self, operation: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            debug!(operation, "injected backend failure");
            bail!("backend unavailable during {}", operation);
        }
        Ok(())
    }

    fn account_history(&self, account_id: &str) -> Vec<Transaction> {
        let mut history: Vec<_> = self
            .transactions
            .read()
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn search_transactions(
        &self,
        account_id: &str,
        query: &str,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.simulate("search").await?;
        let needle = query.to_lowercase();
        Ok(self
            .account_history(account_id)
            .into_iter()
            .filter(|tx| {
                tx.description.to_lowercase().contains(&needle)
                    || tx.counterparty.to_lowercase().contains(&needle)
            })
            .collect())
    }

    async fn filter_transactions(
        &self,
        account_id: &str,
        filter: &TransactionFilter,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.simulate("filter").await?;
        Ok(self
            .account_history(account_id)
            .into_iter()
            .filter(|tx| filter.matches(tx))
            .collect())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.simulate("list").await?;
        let skip = page
            .checked_sub(1)
            .context("pages start at 1")?
            .saturating_mul(page_size);
        Ok(self
            .account_history(account_id)
            .into_iter()
            .skip(skip)
            .take(page_size)
            .collect())
    }

    async fn create_transaction(&self, transfer: &Transfer) -> anyhow::Result<Transaction> {
        self.simulate("transfer").await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let description = if transfer.description.is_empty() {
            format!("Transfer to {}", transfer.to_account)
        } else {
            transfer.description.clone()
        };
        let tx = Transaction {
            id: format!("tx-{}", id),
            account_id: transfer.from_account.clone(),
            counterparty: transfer.to_account.clone(),
            description,
            amount_cents: transfer.amount_cents,
            kind: TransactionKind::Debit,
            created_at: Utc::now(),
        };
        self.transactions.write().push(tx.clone());
        Ok(tx)
    }

    async fn save_draft(&self, account_id: &str, draft: &Value) -> anyhow::Result<()> {
        self.simulate("save_draft").await?;
        self.drafts
            .lock()
            .insert(account_id.to_string(), draft.clone());
        Ok(())
    }
}
