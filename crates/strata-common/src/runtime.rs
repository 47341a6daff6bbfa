use std::future::Future;

use tokio::runtime::{Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{CommonError, CommonResult};

/// Owns the background runtime that drives asynchronous engine work
/// on behalf of synchronous callers.
#[derive(Debug)]
pub struct RuntimeManager {
    primary: Runtime,
}

impl RuntimeManager {
    pub fn try_new(config: &RuntimeConfig) -> CommonResult<Self> {
        let primary = Self::build_runtime(config)?;
        Ok(Self { primary })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            primary: self.primary.handle().clone(),
        }
    }

    fn build_runtime(config: &RuntimeConfig) -> CommonResult<Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .thread_name("strata-runtime")
            .thread_stack_size(config.stack_size)
            .enable_all();
        if config.worker_threads > 0 {
            builder.worker_threads(config.worker_threads);
        }
        builder
            .build()
            .map_err(|e| CommonError::internal(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    primary: Handle,
}

impl RuntimeHandle {
    /// Runs a future to completion from a blocking context.
    /// This must not be called from within an asynchronous task.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.primary.block_on(future)
    }
}
