//! Warm-isolate cache.
//!
//! Holds at most one warm [`Isolate`] per function, keyed by the
//! deployment that built it. A redeploy evicts the previous Isolate as
//! soon as the last invocation running on it finishes (plain `Arc`
//! refcounting handles that for us — we never forcibly interrupt an
//! in-flight call).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::EngineResult;
use crate::isolate::Isolate;

/// Per-function build slot, so that concurrent cold invocations of the
/// same function share one compile instead of racing N of them.
type BuildSlot = Arc<AsyncMutex<()>>;

#[derive(Default)]
pub struct IsolateCache {
    /// deployment_id -> warm isolate.
    entries: Mutex<HashMap<String, Arc<Isolate>>>,
    /// function_id -> the deployment_id currently cached for it.
    live: Mutex<HashMap<String, String>>,
    /// function_id -> build slot.
    build_slots: Mutex<HashMap<String, BuildSlot>>,
}

impl IsolateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_slot_for(&self, function_id: &str) -> BuildSlot {
        self.build_slots
            .lock()
            .unwrap()
            .entry(function_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn lookup(&self, deployment_id: &str) -> Option<Arc<Isolate>> {
        self.entries.lock().unwrap().get(deployment_id).cloned()
    }

    /// Look up the warm Isolate for `deployment_id`, building and caching
    /// one from `source` on a miss. See module docs for the single-flight
    /// and eviction semantics.
    pub async fn get_or_build(
        &self,
        function_id: &str,
        deployment_id: &str,
        source: String,
    ) -> EngineResult<Arc<Isolate>> {
        if let Some(isolate) = self.lookup(deployment_id) {
            return Ok(isolate);
        }

        let slot = self.build_slot_for(function_id);
        let _guard = slot.lock().await;

        // Another task may have finished the build for this exact
        // deployment while we waited for the slot.
        if let Some(isolate) = self.lookup(deployment_id) {
            return Ok(isolate);
        }

        let isolate = Arc::new(Isolate::build(source).await?);

        {
            let mut entries = self.entries.lock().unwrap();
            let mut live = self.live.lock().unwrap();
            if let Some(old_deployment_id) = live.insert(function_id.to_string(), deployment_id.to_string()) {
                entries.remove(&old_deployment_id);
            }
            entries.insert(deployment_id.to_string(), isolate.clone());
        }

        Ok(isolate)
    }

    /// Look up or build the warm Isolate for `deployment_id` and invoke it
    /// with `payload_json`.
    pub async fn invoke_function(
        &self,
        function_id: &str,
        deployment_id: &str,
        source: String,
        payload_json: Option<String>,
    ) -> EngineResult<String> {
        let isolate = self.get_or_build(function_id, deployment_id, source).await?;
        isolate.invoke(payload_json).await
    }
}

/// Build a throwaway Isolate from `source`, invoke it once, and discard
/// it. Never touches the cache, so it cannot perturb any function's warm
/// state.
pub async fn compile_and_invoke_source(
    source: String,
    payload_json: Option<String>,
) -> EngineResult<String> {
    let isolate = Isolate::build(source).await?;
    isolate.invoke(payload_json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_once_and_reuses_the_warm_isolate() {
        crate::engine::init().unwrap();
        let cache = IsolateCache::new();
        let source = "let n = 0; export default () => { n += 1; return n; };".to_string();

        let out1 = cache
            .invoke_function("fn-1", "dp-1", source.clone(), None)
            .await
            .unwrap();
        let out2 = cache
            .invoke_function("fn-1", "dp-1", source, None)
            .await
            .unwrap();

        assert_eq!(out1, "1");
        assert_eq!(out2, "2");
    }

    #[tokio::test]
    async fn redeploy_evicts_the_previous_isolate() {
        crate::engine::init().unwrap();
        let cache = IsolateCache::new();

        cache
            .invoke_function("fn-1", "dp-1", "export default () => 1;".to_string(), None)
            .await
            .unwrap();

        let out = cache
            .invoke_function("fn-1", "dp-2", "export default () => 2;".to_string(), None)
            .await
            .unwrap();
        assert_eq!(out, "2");

        // dp-1's Isolate is gone from the cache; only dp-2 is live for fn-1.
        assert!(cache.lookup("dp-1").is_none());
        assert!(cache.lookup("dp-2").is_some());
    }

    #[tokio::test]
    async fn ad_hoc_path_never_touches_the_cache() {
        crate::engine::init().unwrap();
        let cache = IsolateCache::new();
        let out = compile_and_invoke_source("export default () => 99;".to_string(), None)
            .await
            .unwrap();
        assert_eq!(out, "99");
        assert!(cache.entries.lock().unwrap().is_empty());
    }
}
