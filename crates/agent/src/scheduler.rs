//! Tool dispatch: runs one batch of tool calls.
//!
//! Read-only calls fan out on a bounded pool; mutating calls run one at a
//! time in their original relative order, after every read has finished.
//! Results always line up with the input calls.

use futures::FutureExt;
use kestrel_config::ParallelConfig;
use kestrel_core::tool::{ToolCall, ToolExecutionResult, ToolExecutor};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub struct ToolScheduler {
    executor: Arc<dyn ToolExecutor>,
    parallel: bool,
    max_workers: usize,
}

impl ToolScheduler {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &ParallelConfig) -> Self {
        Self {
            executor,
            parallel: config.enable_parallel,
            max_workers: config.max_workers.max(1),
        }
    }

    /// Execute `calls`, returning exactly one result per call in input order.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolExecutionResult> {
        if !self.parallel || calls.len() <= 1 {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.run_one(call).await);
            }
            return results;
        }

        let (reads, writes): (Vec<_>, Vec<_>) = calls
            .iter()
            .enumerate()
            .partition(|(_, call)| call.category().is_read_only());
        debug!(
            read_only = reads.len(),
            mutating = writes.len(),
            workers = self.max_workers,
            "Dispatching tool batch"
        );

        let mut slots: Vec<Option<ToolExecutionResult>> = vec![None; calls.len()];

        for (index, result) in self.run_parallel(&reads).await {
            slots[index] = Some(result);
        }
        for (index, call) in writes {
            slots[index] = Some(self.run_one(call).await);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| ToolExecutionResult::err("Parallel execution error: no result"))
            })
            .collect()
    }

    async fn run_one(&self, call: &ToolCall) -> ToolExecutionResult {
        match AssertUnwindSafe(self.executor.execute(&call.name, &call.parameters))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %call.name, "Tool panicked");
                ToolExecutionResult::err(format!("Tool execution error: {} panicked", call.name))
            }
        }
    }

    /// Run read-only calls concurrently, at most `max_workers` at a time.
    /// Each task carries its batch index so results can be put back in place.
    async fn run_parallel(&self, calls: &[(usize, &ToolCall)]) -> Vec<(usize, ToolExecutionResult)> {
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        let mut pending: Vec<(usize, String)> = Vec::with_capacity(calls.len());

        for (index, call) in calls {
            let index = *index;
            let executor = Arc::clone(&self.executor);
            let permits = Arc::clone(&permits);
            let name = call.name.clone();
            let parameters = call.parameters.clone();
            pending.push((index, name.clone()));

            set.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => executor.execute(&name, &parameters).await,
                    Err(e) => ToolExecutionResult::err(format!("Tool execution error: {e}")),
                };
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(calls.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    pending.retain(|(i, _)| *i != index);
                    results.push((index, result));
                }
                Err(e) => warn!(error = %e, "Parallel tool task failed"),
            }
        }

        // Tasks that panicked never reported their index
        for (index, name) in pending {
            results.push((
                index,
                ToolExecutionResult::err(format!("Parallel execution error: {name} did not complete")),
            ));
        }
        results
    }
}
