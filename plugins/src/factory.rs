use std::sync::Arc;

use shotrun_core::api::{AppConfig, AutomationPlatform, PlatformConfig, TaskExecutor};

use crate::platform::{CommandExecutor, CommandPlatform, DryRunExecutor, DryRunPlatform};

/// A platform plus the executor that knows how to drive its contexts.
pub struct CaptureBackend {
    pub platform: Arc<dyn AutomationPlatform>,
    pub executor: Arc<dyn TaskExecutor>,
}

pub fn build_backend(cfg: &AppConfig) -> CaptureBackend {
    build_backend_for(&cfg.platform)
}

pub fn build_backend_for(platform: &PlatformConfig) -> CaptureBackend {
    match platform {
        PlatformConfig::Command(c) => CaptureBackend {
            platform: Arc::new(CommandPlatform::new(c)),
            executor: Arc::new(CommandExecutor::new(c)),
        },
        PlatformConfig::DryRun(d) => CaptureBackend {
            platform: Arc::new(DryRunPlatform),
            executor: Arc::new(DryRunExecutor::new(d)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotrun_core::api::DryRunPlatformConfig;

    #[test]
    fn builds_backend_matching_provider() {
        let backend = build_backend(&AppConfig::default());
        assert_eq!(backend.platform.name(), "command");
        assert_eq!(backend.executor.name(), "command");

        let backend = build_backend_for(&PlatformConfig::DryRun(DryRunPlatformConfig::default()));
        assert_eq!(backend.platform.name(), "dry-run");
        assert_eq!(backend.executor.name(), "dry-run");
    }
}
