//! Concurrency planning for the conversion pool.
//!
//! Derives the worker cap from configuration and the machine's core count.

use oggforge_config::ConversionConfig;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of jobs converting at the same time
    pub max_concurrent_jobs: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// An explicit non-zero `concurrent_jobs` is used unchanged; zero
    /// means "one job per logical core". The result is always at least 1.
    pub fn derive(cfg: &ConversionConfig) -> Self {
        let total_cores = (num_cpus::get() as u32).max(1);

        let max_concurrent_jobs = if cfg.concurrent_jobs > 0 {
            cfg.concurrent_jobs
        } else {
            total_cores
        };

        Self {
            total_cores,
            max_concurrent_jobs,
        }
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &ConversionConfig) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // *For any* explicit non-zero `concurrent_jobs`, the plan SHALL use
    // that value unchanged.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_explicit_job_cap_is_preserved(
            explicit_jobs in 1u32..64,
        ) {
            let cfg = ConversionConfig {
                concurrent_jobs: explicit_jobs,
                ..ConversionConfig::default()
            };

            let plan = derive_plan(&cfg);

            prop_assert_eq!(
                plan.max_concurrent_jobs, explicit_jobs,
                "Explicit cap {} should be preserved, got {}",
                explicit_jobs, plan.max_concurrent_jobs
            );
        }
    }

    #[test]
    fn test_zero_means_one_job_per_core() {
        let cfg = ConversionConfig {
            concurrent_jobs: 0,
            ..ConversionConfig::default()
        };

        let plan = derive_plan(&cfg);

        assert_eq!(plan.max_concurrent_jobs, plan.total_cores);
        assert!(plan.max_concurrent_jobs >= 1);
    }
}
