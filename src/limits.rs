//! Capacity and timing limits, configurable from the CLI but defaulting
//! to the relay's original hard-coded constants.
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_programs: usize,
    pub max_streams_per_program: usize,
    pub idle_timeout: Duration,
}

impl Limits {
    pub fn from_opt(opt: &crate::config::Opt) -> Self {
        Self {
            max_programs: opt.max_programs,
            max_streams_per_program: opt.max_streams_per_program,
            idle_timeout: Duration::from_secs(opt.idle_timeout_secs),
        }
    }
}

impl Default for Limits {
    /// 100 programs, 100 streams each, a 10 s idle grace period.
    fn default() -> Self {
        Self {
            max_programs: 100,
            max_streams_per_program: 100,
            idle_timeout: Duration::from_secs(10),
        }
    }
}
