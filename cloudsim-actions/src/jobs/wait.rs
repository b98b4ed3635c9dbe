//! Wait-for-condition job
//!
//! Polls a check until it reports ready or the timeout elapses. The job's
//! input is passed through unchanged, so a wait can sit between any two jobs
//! of a chain.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::job::{Job, JobBuilder, JobContext};
use crate::payload::Data;
use crate::repository::Tx;

/// Polling schedule of a wait job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("'{job}' not ready after {timeout:?}")]
    Timeout { job: String, timeout: Duration },
}

/// Builds a job that runs `check` every `config.poll_interval` until it
/// returns `true`.
///
/// An error from `check` fails the job immediately. Declare input and
/// output types on the returned builder before building.
pub fn wait_until<T, F, Fut>(
    name: impl Into<String>,
    config: WaitConfig,
    check: F,
) -> JobBuilder<T>
where
    T: Tx,
    F: Fn(JobContext<T>, Option<Data>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    let check = Arc::new(check);

    Job::builder(name, move |ctx: JobContext<T>, input: Option<Data>| {
        let check = check.clone();
        async move {
            let deadline = Instant::now() + config.timeout;
            let mut attempts = 0u32;

            loop {
                attempts += 1;
                if check(ctx.clone(), input.clone()).await? {
                    tracing::debug!("'{}' ready after {} checks", ctx.job(), attempts);
                    return Ok(input);
                }

                if Instant::now() + config.poll_interval > deadline {
                    return Err(anyhow::Error::new(WaitError::Timeout {
                        job: ctx.job().to_string(),
                        timeout: config.timeout,
                    }));
                }

                tokio::time::sleep(config.poll_interval).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::payload::NilType;
    use crate::registry::TypeRegistry;
    use crate::repository::MemoryTx;
    use crate::store::Store;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        }
    }

    async fn context(tx: &MemoryTx) -> JobContext<MemoryTx> {
        let deployment = tx.create_deployment("test", "wait-pods").await.unwrap();
        JobContext::new(tx.clone(), Store::new(), deployment, Arc::new(TypeRegistry::new()))
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let tx = MemoryTx::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let job: Job<MemoryTx> = wait_until("wait-pods", config(), move |_ctx, _input| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n >= 3) }
        })
        .input::<NilType>()
        .output::<NilType>()
        .build();

        let output = job.run(context(&tx).await, None).await.unwrap();

        assert!(output.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_passes_input_through() {
        let tx = MemoryTx::new();
        let job: Job<MemoryTx> =
            wait_until("wait-pods", config(), |_ctx, _input| async { Ok(true) })
                .input::<NilType>()
                .output::<NilType>()
                .build();

        let output = job
            .run(context(&tx).await, Some(Data::new(NilType)))
            .await
            .unwrap();

        assert!(output.unwrap().is::<NilType>());
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let tx = MemoryTx::new();
        let job: Job<MemoryTx> =
            wait_until("wait-pods", config(), |_ctx, _input| async { Ok(false) })
                .input::<NilType>()
                .output::<NilType>()
                .build();

        let err = job.run(context(&tx).await, None).await.unwrap_err();

        match err {
            ActionError::Job { job, source } => {
                assert_eq!(job, "wait-pods");
                assert!(matches!(
                    source.downcast_ref::<WaitError>(),
                    Some(WaitError::Timeout { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_until_check_error_fails_fast() {
        let tx = MemoryTx::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let job: Job<MemoryTx> = wait_until("wait-pods", config(), move |_ctx, _input| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("pod evicted")) }
        })
        .input::<NilType>()
        .output::<NilType>()
        .build();

        let err = job.run(context(&tx).await, None).await.unwrap_err();

        assert_eq!(err.to_string(), "job 'wait-pods' failed: pod evicted");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
