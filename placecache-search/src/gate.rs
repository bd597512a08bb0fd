//! Local-only switch.

use placecache_core::DiscoveryConfig;

/// When enabled, searches are served from the venue store alone and the
/// provider is never called. Fixed for the lifetime of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalOnlyGate {
    enabled: bool,
}

impl LocalOnlyGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.local_only)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_follows_config() {
        assert!(!LocalOnlyGate::from_config(&DiscoveryConfig::default()).enabled());
        let config = DiscoveryConfig::default().with_local_only(true);
        assert!(LocalOnlyGate::from_config(&config).enabled());
    }
}
