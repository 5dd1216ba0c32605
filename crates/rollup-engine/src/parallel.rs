#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Pool that runs grouping specs (`aggregate_many`) and row shards (`shard_rows`).
///
/// Callers often invoke the engine from their own rayon tasks. Spec and shard fan-out therefore
/// runs on a separate pool rather than the global one, so the two do not compete for the same
/// workers. `None` means no pool could be built and every fan-out runs sequentially.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Worker count for the aggregation pool: `ROLLUP_NUM_THREADS`, then `RAYON_NUM_THREADS`, then
/// the machine's available parallelism.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn pool_threads() -> usize {
    ["ROLLUP_NUM_THREADS", "RAYON_NUM_THREADS"]
        .into_iter()
        .find_map(|var| parse_threads(std::env::var(var).ok()?.as_str()))
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}

#[cfg_attr(not(all(feature = "parallel", not(target_arch = "wasm32"))), allow(dead_code))]
fn parse_threads(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(|| {
        let threads = pool_threads();
        // A single worker is still worth trying when the requested size cannot be spawned.
        [threads, 1].into_iter().find_map(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|idx| format!("rollup-{idx}"))
                .build()
                .map_err(|err| log::debug!("cannot build {n}-thread aggregation pool: {err}"))
                .ok()
        })
    })
    .as_ref()
}

/// Maps `f` over `items`, preserving order. Runs on the aggregation pool when there is more than
/// one item and a pool is available.
pub(crate) fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if items.len() > 1 {
            if let Some(pool) = pool() {
                use rayon::prelude::*;
                return pool.install(|| items.par_iter().map(&f).collect());
            }
        }
    }

    items.iter().map(f).collect()
}
