//! Process-wide JS engine lifecycle.
//!
//! V8's platform is a process-global singleton: it must be initialized
//! exactly once before any isolate is created, and disposed at most once,
//! after every isolate has been torn down. This module is the only place
//! that calls `v8::V8::initialize`/`v8::V8::dispose`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::error::EngineInitError;

static PLATFORM: OnceLock<v8::SharedRef<v8::Platform>> = OnceLock::new();
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Initialize the V8 platform for the process.
///
/// Safe to call more than once; only the first call does any work. Must be
/// called before the first [`crate::isolate::Isolate`] is built.
pub fn init() -> Result<(), EngineInitError> {
    if SHUTDOWN.load(Ordering::SeqCst) {
        return Err(EngineInitError(
            "cannot re-initialize engine after shutdown".into(),
        ));
    }
    PLATFORM.get_or_init(|| {
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();
        platform
    });
    tracing::info!("js engine initialized");
    Ok(())
}

/// Whether [`init`] has run.
pub fn is_initialized() -> bool {
    PLATFORM.get().is_some()
}

/// Tear down the V8 platform.
///
/// # Safety
///
/// Must only be called once every isolate created by this process has been
/// dropped. Calling it more than once, or skipping it on abnormal exit, is
/// safe — shutdown is best-effort and only runs if `init` succeeded.
pub unsafe fn shutdown() {
    if PLATFORM.get().is_some() && !SHUTDOWN.swap(true, Ordering::SeqCst) {
        v8::V8::dispose();
        tracing::info!("js engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init().unwrap();
        init().unwrap();
        assert!(is_initialized());
    }
}
