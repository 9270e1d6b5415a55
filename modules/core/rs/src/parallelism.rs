use std::cmp::Ordering;
use std::thread::available_parallelism;

use eyre::{Result, WrapErr};
use rayon::{ThreadPool, ThreadPoolBuilder};

fn _normalize(requested: isize, max: isize) -> usize {
    match requested.cmp(&0) {
        Ordering::Less => (max + requested + 1).max(1) as usize,
        Ordering::Equal => 1,
        Ordering::Greater => requested.min(max) as usize,
    }
}

/// Number of threads to use. Negative values count back from the number of available cores,
/// -1 means all of them.
pub fn available(requested: isize) -> Result<usize> {
    let max = available_parallelism()?.get() as isize;
    Ok(_normalize(requested, max))
}

pub fn pool(requested: isize) -> Result<ThreadPool> {
    let threads = available(requested)?;
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .wrap_err_with(|| format!("Failed to build a thread pool with {threads} threads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_normalization() {
        for (threads, max, expected) in [
            (0, 4, 1),
            (1, 4, 1),
            (2, 4, 2),
            (4, 4, 4),
            (5, 4, 4),
            (1231, 4, 4),
            (-1, 4, 4),
            (-2, 4, 3),
            (-4, 4, 1),
            (-5, 4, 1),
        ] {
            assert_eq!(_normalize(threads, max), expected);
        }
    }

    #[test]
    fn test_pool() {
        let pool = pool(1).unwrap();
        assert_eq!(pool.current_num_threads(), 1);
    }
}
