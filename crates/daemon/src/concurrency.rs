//! Concurrency planning
//!
//! Derives the worker count from configuration, the resolved encoder backend
//! and the CPU core count.

use crate::config::Config;
use crate::profile::QualityProfile;

/// Worker plan for the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Logical CPU cores available
    pub total_cores: u32,
    /// A single hardware encoder unit serializes jobs
    pub hardware_serialized: bool,
    /// Maximum number of jobs running end-to-end at once
    pub max_concurrent_jobs: u32,
}

impl ConcurrencyPlan {
    /// Derive a plan from configuration and the detected core count.
    ///
    /// - an explicit non-zero `max_concurrent_jobs` wins
    /// - otherwise 1 when the hardware backend is active
    /// - otherwise one worker per logical core
    pub fn derive(cfg: &Config, profile: &QualityProfile) -> Self {
        Self::derive_with_cores(cfg, profile, num_cpus::get() as u32)
    }

    pub fn derive_with_cores(cfg: &Config, profile: &QualityProfile, cores: u32) -> Self {
        let total_cores = cores.max(1);
        let hardware_serialized = profile.hardware_active();

        let max_concurrent_jobs = if cfg.workers.max_concurrent_jobs > 0 {
            cfg.workers.max_concurrent_jobs
        } else if hardware_serialized {
            1
        } else {
            total_cores
        };

        Self {
            total_cores,
            hardware_serialized,
            max_concurrent_jobs,
        }
    }
}

/// Derive a plan using the detected core count.
pub fn derive_plan(cfg: &Config, profile: &QualityProfile) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(hw: bool, vendor: &str, explicit_jobs: u32) -> Config {
        let mut cfg = Config::default();
        cfg.encoding.enable_hw_accel = hw;
        cfg.encoding.hw_encoding_type = vendor.to_string();
        cfg.workers.max_concurrent_jobs = explicit_jobs;
        cfg
    }

    fn plan(cfg: &Config, cores: u32) -> ConcurrencyPlan {
        let profile = QualityProfile::resolve(&cfg.encoding);
        ConcurrencyPlan::derive_with_cores(cfg, &profile, cores)
    }

    #[test]
    fn test_hardware_backend_serializes() {
        let p = plan(&config(true, "nvidia", 0), 32);
        assert!(p.hardware_serialized);
        assert_eq!(p.max_concurrent_jobs, 1);
    }

    #[test]
    fn test_unknown_vendor_uses_cores() {
        // unknown vendor falls back to software, so the core count applies
        let p = plan(&config(true, "matrox", 0), 12);
        assert!(!p.hardware_serialized);
        assert_eq!(p.max_concurrent_jobs, 12);
    }

    #[test]
    fn test_zero_cores_clamped() {
        let p = plan(&config(false, "intel", 0), 0);
        assert_eq!(p.total_cores, 1);
        assert_eq!(p.max_concurrent_jobs, 1);
    }

    #[test]
    fn test_derive_plan_detects_cores() {
        let cfg = config(false, "intel", 0);
        let p = derive_plan(&cfg, &QualityProfile::resolve(&cfg.encoding));
        assert_eq!(p.total_cores, num_cpus::get() as u32);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_software_uses_one_worker_per_core(cores in 1u32..256) {
            let p = plan(&config(false, "intel", 0), cores);
            prop_assert_eq!(p.total_cores, cores);
            prop_assert_eq!(p.max_concurrent_jobs, cores);
        }

        #[test]
        fn prop_explicit_override_wins(
            cores in 1u32..256,
            explicit in 1u32..16,
            hw in proptest::bool::ANY,
        ) {
            let p = plan(&config(hw, "nvidia", explicit), cores);
            prop_assert_eq!(p.max_concurrent_jobs, explicit);
        }
    }
}
