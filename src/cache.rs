//! Per-table caches of compiled write statements.
//!
//! A [`Table`](crate::Table) owns one [`StatementCache`] per write kind (insert,
//! update, upsert). Lookups take a shared read lock; a miss compiles the plan with
//! no lock held and then takes the write lock only to store it. Two callers that
//! miss on the same key both compile, and the later store replaces the earlier
//! one. Compilation is a pure function of the key, so both plans are identical.
//!
//! Entries are never evicted. The key space is every distinct whitelist and
//! default combination the application issues, so a warning is logged once when a
//! cache grows past its configured threshold.

use crate::cache_key::CacheKey;
use crate::error::{Operation, QuarryError};
use crate::mapping::FieldMapping;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// SQL text plus the field mappings that feed and receive its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPlan {
    /// Statement with `$1..$n` placeholders
    pub sql: String,
    /// Fields bound to the placeholders, in placeholder order
    pub values: FieldMapping,
    /// Fields receiving the RETURNING row, in select-list order; may be empty
    pub returning: FieldMapping,
}

/// Concurrent map from [`CacheKey`] to [`CompiledPlan`] for one table and write kind.
#[derive(Debug)]
pub struct StatementCache {
    table: &'static str,
    op: Operation,
    plans: RwLock<HashMap<CacheKey, Arc<CompiledPlan>>>,
    warn_threshold: usize,
    warned: AtomicBool,
}

impl StatementCache {
    /// Create an empty cache. A `warn_threshold` of 0 disables the size warning.
    pub fn new(table: &'static str, op: Operation, warn_threshold: usize) -> Self {
        Self {
            table,
            op,
            plans: RwLock::new(HashMap::new()),
            warn_threshold,
            warned: AtomicBool::new(false),
        }
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    /// Look up a plan.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledPlan>> {
        // Writers never leave the map half-updated, so a poisoned lock is still usable
        let plans = self.plans.read().unwrap_or_else(PoisonError::into_inner);
        plans.get(key).cloned()
    }

    /// Store a plan, replacing any plan already stored under `key`.
    pub fn put(&self, key: CacheKey, plan: CompiledPlan) -> Arc<CompiledPlan> {
        let plan = Arc::new(plan);
        let len = {
            let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
            plans.insert(key, Arc::clone(&plan));
            plans.len()
        };

        if self.warn_threshold > 0
            && len > self.warn_threshold
            && !self.warned.swap(true, Ordering::Relaxed)
        {
            log::warn!(
                "{} {} statement cache holds {} plans (threshold {}); \
                 callers may be generating unbounded distinct column lists",
                self.table,
                self.op,
                len,
                self.warn_threshold
            );
        }
        plan
    }

    /// Return the cached plan for `key`, compiling and storing it on a miss.
    ///
    /// The second element is `true` on a cache hit.
    ///
    /// # Errors
    ///
    /// Propagates the error from `compile`; nothing is stored in that case.
    pub fn get_or_compile<F>(
        &self,
        key: CacheKey,
        compile: F,
    ) -> Result<(Arc<CompiledPlan>, bool), QuarryError>
    where
        F: FnOnce() -> Result<CompiledPlan, QuarryError>,
    {
        if let Some(plan) = self.get(&key) {
            #[cfg(feature = "metrics")]
            METRICS.record_plan_cache(self.table, self.op, true);
            return Ok((plan, true));
        }

        #[cfg(feature = "metrics")]
        METRICS.record_plan_cache(self.table, self.op, false);
        log::trace!("{} {} plan cache miss for key {}", self.table, self.op, key);

        let plan = compile()?;
        Ok((self.put(key, plan), false))
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every plan.
    pub fn clear(&self) {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.warned.store(false, Ordering::Relaxed);
    }
}
