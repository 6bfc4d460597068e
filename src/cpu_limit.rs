//! Tools for limiting the number of concurrent CPU-bound tasks.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// Semaphore used to limit the number of concurrent `pdftocairo` and
/// `tesseract` processes.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Call an async function while holding a permit from the CPU semaphore.
///
/// We do this to limit the number of external processes that are each trying
/// to use 100% of a CPU core. Extracting a long document launches one
/// `tesseract` per region per page, and `--jobs` may be set well above the
/// core count.
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, R>(f: Func) -> Result<R>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    result
}
