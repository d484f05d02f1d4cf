//! Blocking entry points for callers that are not async.
//!
//! A blocking call made from inside a running tokio runtime must not
//! `block_on` that runtime, so it runs the work on a fresh runtime owned by
//! a worker thread and waits for the thread instead.

use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};
use wadriver_core::{
    AuthPayload, EngineStatus, Error, OperationResult, Result, ScanPayload, SendPayload,
};

use crate::engine::Engine;

/// Runtime for one blocking call. Windows gets worker threads for the
/// spawned CDP reader and writer tasks; elsewhere one thread is enough.
/// Both flavors share the same I/O driver.
fn build_runtime() -> Result<Runtime> {
    #[cfg(windows)]
    let mut builder = Builder::new_multi_thread();
    #[cfg(not(windows))]
    let mut builder = Builder::new_current_thread();
    Ok(builder.enable_all().build()?)
}

/// Drive `future` to completion from synchronous code.
pub fn run_blocking<F, T>(future: F) -> Result<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if Handle::try_current().is_ok() {
        warn!("Blocking call made from async context; running on a worker thread");
        let worker = std::thread::Builder::new()
            .name("wadriver-blocking".to_string())
            .spawn(move || build_runtime().map(|rt| rt.block_on(future)))?;
        return worker
            .join()
            .map_err(|_| Error::Other("Blocking worker thread panicked".to_string()))?;
    }
    debug!("Running blocking call on a dedicated runtime");
    Ok(build_runtime()?.block_on(future))
}

/// Synchronous facade over [`Engine`]. Every method returns the same
/// [`OperationResult`] shape as its async counterpart.
#[derive(Clone)]
pub struct BlockingEngine {
    engine: Engine,
}

impl BlockingEngine {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn check_messages(
        &self,
        keywords: Option<Vec<String>>,
        check_archived: bool,
        limit: usize,
    ) -> OperationResult<ScanPayload> {
        let engine = self.engine.clone();
        flatten(run_blocking(async move {
            engine
                .check_messages(keywords.as_deref(), check_archived, limit)
                .await
        }))
    }

    pub fn send_message(&self, target: &str, message: &str) -> OperationResult<SendPayload> {
        let engine = self.engine.clone();
        let (target, message) = (target.to_string(), message.to_string());
        flatten(run_blocking(async move {
            engine.send_message(&target, &message).await
        }))
    }

    pub fn send_alert(&self, message: &str) -> OperationResult<SendPayload> {
        let engine = self.engine.clone();
        let message = message.to_string();
        flatten(run_blocking(async move { engine.send_alert(&message).await }))
    }

    pub fn authenticate(&self) -> OperationResult<AuthPayload> {
        let engine = self.engine.clone();
        flatten(run_blocking(async move { engine.authenticate().await }))
    }

    pub fn get_status(&self) -> EngineStatus {
        self.engine.get_status()
    }
}

fn flatten<T: Default>(result: Result<OperationResult<T>>) -> OperationResult<T> {
    result.unwrap_or_else(|e| OperationResult::failed(&e, T::default()))
}
