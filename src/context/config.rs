use std::fmt;

use crate::descriptor::ExhaustionPolicy;

/// Pool sizes for the three descriptor heaps a [`Context`](super::Context) owns.
///
/// Sizes are a build-time contract: running out of slots at runtime means the
/// numbers here are too small for the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    pub srv_descriptors: u32,
    pub rtv_descriptors: u32,
    pub dsv_descriptors: u32,
    pub exhaustion_policy: ExhaustionPolicy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            srv_descriptors: 4096,
            rtv_descriptors: 256,
            dsv_descriptors: 128,
            exhaustion_policy: ExhaustionPolicy::Panic,
        }
    }
}

impl ContextConfig {
    pub fn srv_descriptors(mut self, count: u32) -> Self {
        self.srv_descriptors = count;
        self
    }

    pub fn rtv_descriptors(mut self, count: u32) -> Self {
        self.rtv_descriptors = count;
        self
    }

    pub fn dsv_descriptors(mut self, count: u32) -> Self {
        self.dsv_descriptors = count;
        self
    }

    pub fn exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = policy;
        self
    }
}

impl fmt::Display for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContextConfig(srv={}, rtv={}, dsv={}, exhaustion={:?})",
            self.srv_descriptors, self.rtv_descriptors, self.dsv_descriptors, self.exhaustion_policy
        )
    }
}
