//! Order-preserving maps over independent work items. With the `rayon`
//! feature the items are processed on the global thread pool, otherwise
//! sequentially.

use crate::Result;

pub fn map<T, U, F>(items: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        items.par_iter().map(f).collect()
    }

    #[cfg(not(feature = "rayon"))]
    items.iter().map(f).collect()
}

/// Like [`map`], stopping at an error. Which error is reported is
/// unspecified if several items fail.
pub fn try_map<T, U, F>(items: &[T], f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U> + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        items.par_iter().map(f).collect()
    }

    #[cfg(not(feature = "rayon"))]
    items.iter().map(f).collect()
}

pub fn try_map_mut<T, U, F>(items: &mut [T], f: F) -> Result<Vec<U>>
where
    T: Send,
    U: Send,
    F: Fn(&mut T) -> Result<U> + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

        items.par_iter_mut().map(f).collect()
    }

    #[cfg(not(feature = "rayon"))]
    items.iter_mut().map(f).collect()
}

/// Size the global thread pool. `0` keeps the default of one thread per
/// core. Has no effect once the pool is in use.
pub fn init_thread_pool(nprocs: usize) {
    #[cfg(feature = "rayon")]
    {
        if let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(nprocs)
            .build_global()
        {
            log::warn!("could not resize the thread pool to {nprocs}: {err}");
            return;
        }
        log::debug!("using {} worker threads", rayon::current_num_threads());
    }

    #[cfg(not(feature = "rayon"))]
    if nprocs > 1 {
        log::warn!("built without the rayon feature, ignoring {nprocs} workers");
    }
}
