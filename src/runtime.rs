//! Runtime context (§A.9 design note: "scope the site operator tables to a
//! runtime context value threaded through construction" instead of a
//! process-wide cache).
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::site::{SiteKind, SiteTable};

/// Owns the per-[`SiteKind`] operator-table cache. Immutable from the
/// outside once a table is built (§A.5: "site operator tables... are
/// immutable after construction and safely shareable across MPSs"); multiple
/// `RuntimeContext`s never share state, so tests can build independent
/// chains concurrently without cache cross-talk.
#[derive(Default)]
pub struct RuntimeContext {
    tables: Mutex<HashMap<SiteKind, Arc<SiteTable>>>,
}

impl RuntimeContext {
    pub fn new() -> RuntimeContext {
        RuntimeContext::default()
    }

    pub(crate) fn site_table_or_build(
        &self,
        kind: SiteKind,
        build: impl FnOnce(SiteKind) -> SiteTable,
    ) -> Arc<SiteTable> {
        let mut tables = self.tables.lock().expect("runtime context mutex poisoned");
        tables
            .entry(kind)
            .or_insert_with(|| Arc::new(build(kind)))
            .clone()
    }
}
