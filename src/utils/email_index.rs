use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use autoscale_cuckoo_filter::CuckooFilter;
use moka::future::Cache;

use crate::gateway::{Filter, Gateway, Table};

const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;
const CACHE_CAPACITY: u64 = 500_000;
const CACHE_TTL: Duration = Duration::from_secs(86_400);

#[inline]
fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registered-email pre-check for sign-up.
///
/// The cuckoo filter answers "definitely free" without a round trip, the cache
/// answers "definitely taken", and anything in between goes to the backend.
/// Until [`EmailIndex::warmup`] has loaded every account the filter cannot
/// answer "free", so every miss is asked of the backend.
pub struct EmailIndex {
    filter: RwLock<CuckooFilter<String>>,
    /// true => email is TAKEN
    taken: Cache<String, bool>,
    warmed: AtomicBool,
}

impl Default for EmailIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailIndex {
    pub fn new() -> Self {
        Self {
            filter: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
            taken: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
            warmed: AtomicBool::new(false),
        }
    }

    pub fn is_warm(&self) -> bool {
        self.warmed.load(Ordering::Acquire)
    }

    /// False positives possible, false negatives not.
    pub fn might_exist(&self, email: &str) -> bool {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize(email))
    }

    pub async fn mark_taken(&self, email: &str) {
        let email = normalize(email);
        self.filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(&email);
        self.taken.insert(email, true).await;
    }

    pub async fn forget(&self, email: &str) {
        let email = normalize(email);
        self.filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&email);
        self.taken.invalidate(&email).await;
    }

    /// true  => email AVAILABLE
    /// false => email TAKEN, or the backend could not be asked
    pub async fn is_email_available<G: Gateway>(&self, gateway: &G, email: &str) -> bool {
        let email = normalize(email);

        if self.is_warm() && !self.might_exist(&email) {
            return true;
        }

        if self.taken.get(&email).await.unwrap_or(false) {
            return false;
        }

        let exists = match Filter::eq("email", &email) {
            Ok(filter) => gateway
                .query_rows(Table::Accounts, &[filter], None)
                .await
                .map(|rows| !rows.is_empty())
                .unwrap_or(true), // fail-safe
            Err(_) => true,
        };

        if exists {
            self.taken.insert(email, true).await;
            return false;
        }
        true
    }

    /// Load every registered email, inserting in batches.
    pub async fn warmup<G: Gateway>(&self, gateway: &G, batch_size: usize) -> Result<()> {
        let rows = gateway.query_rows(Table::Accounts, &[], None).await?;
        let emails: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("email").and_then(|v| v.as_str()))
            .map(normalize)
            .collect();

        for batch in emails.chunks(batch_size.max(1)) {
            {
                let mut filter = self.filter.write().unwrap_or_else(PoisonError::into_inner);
                for email in batch {
                    filter.add(email);
                }
            }
            let inserts: Vec<_> = batch
                .iter()
                .map(|email| self.taken.insert(email.clone(), true))
                .collect();
            futures::future::join_all(inserts).await;
        }

        self.warmed.store(true, Ordering::Release);
        log::info!("Email index warmup complete: {} accounts", emails.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;

    fn account(email: &str) -> crate::gateway::Row {
        json!({ "email": email, "fullname": "X", "role": "student" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[actix_web::test]
    async fn unseen_emails_skip_the_backend_once_warm() {
        let gw = MemoryGateway::new();
        let index = EmailIndex::new();
        index.warmup(&gw, 10).await.unwrap();
        gw.clear_calls();

        assert!(index.is_email_available(&gw, "new@school.edu").await);
        assert!(gw.calls().is_empty());
    }

    #[actix_web::test]
    async fn before_warmup_the_backend_is_asked() {
        let gw = MemoryGateway::new();
        gw.seed(Table::Accounts, [account("old@school.edu")]);
        let index = EmailIndex::new();

        assert!(!index.is_warm());
        assert!(!index.is_email_available(&gw, "old@school.edu").await);
        assert!(index.is_email_available(&gw, "new@school.edu").await);
        assert_eq!(gw.calls().len(), 2);
    }

    #[actix_web::test]
    async fn warmed_emails_are_taken_regardless_of_case() {
        let gw = MemoryGateway::new();
        gw.seed(Table::Accounts, [account("ana@school.edu")]);
        let index = EmailIndex::new();
        index.warmup(&gw, 10).await.unwrap();
        gw.clear_calls();

        assert!(!index.is_email_available(&gw, "ANA@school.edu").await);
        assert!(gw.calls().is_empty());
    }

    #[actix_web::test]
    async fn forgotten_emails_become_available() {
        let gw = MemoryGateway::new();
        let index = EmailIndex::new();
        index.mark_taken("ben@school.edu").await;
        assert!(!index.is_email_available(&gw, "ben@school.edu").await);
        index.forget("ben@school.edu").await;
        assert!(index.is_email_available(&gw, "ben@school.edu").await);
    }
}
