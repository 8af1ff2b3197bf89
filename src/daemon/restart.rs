//! Post-change action: restart the service that caches disk capacity.
//!
//! Kubelet reads node allocatable storage at startup, so after a tick grows
//! the root filesystem the daemon restarts it to pick up the new size.

use std::sync::Arc;

use crate::core::config::RestartConfig;
use crate::core::errors::Result;
use crate::platform::pal::Platform;

/// Action run after a tick that produced at least one change.
pub trait RestartHook {
    /// Human-readable target, used in logs.
    fn target(&self) -> String;
    /// Perform the restart, returning whatever the tool printed.
    fn restart(&self) -> Result<String>;
    /// True when the hook restarts nothing; the tick then skips it entirely.
    fn is_noop(&self) -> bool {
        false
    }
}

/// `systemctl restart <unit>` through the platform seam.
pub struct SystemctlRestart {
    platform: Arc<dyn Platform>,
    unit: String,
}

impl SystemctlRestart {
    pub fn new(platform: Arc<dyn Platform>, unit: impl Into<String>) -> Self {
        Self {
            platform,
            unit: unit.into(),
        }
    }
}

impl RestartHook for SystemctlRestart {
    fn target(&self) -> String {
        self.unit.clone()
    }

    fn restart(&self) -> Result<String> {
        let output = self.platform.run("systemctl", &["restart", &self.unit])?;
        output.into_stdout("systemctl")
    }
}

/// Hook used when restarts are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRestart;

impl RestartHook for NoopRestart {
    fn target(&self) -> String {
        "nothing".to_string()
    }

    fn restart(&self) -> Result<String> {
        Ok(String::new())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Build the hook the configuration asks for.
pub fn restart_hook_from_config(
    platform: Arc<dyn Platform>,
    config: &RestartConfig,
) -> Box<dyn RestartHook> {
    if config.enabled {
        Box::new(SystemctlRestart::new(platform, config.unit.trim()))
    } else {
        Box::new(NoopRestart)
    }
}

impl<H: RestartHook + ?Sized> RestartHook for Box<H> {
    fn target(&self) -> String {
        (**self).target()
    }

    fn restart(&self) -> Result<String> {
        (**self).restart()
    }

    fn is_noop(&self) -> bool {
        (**self).is_noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{CommandOutput, MockPlatform};

    #[test]
    fn systemctl_restart_runs_unit() {
        let mock = Arc::new(
            MockPlatform::default()
                .with_command("systemctl restart kubelet", CommandOutput::ok("")),
        );
        let hook = SystemctlRestart::new(Arc::clone(&mock) as Arc<dyn Platform>, "kubelet");

        hook.restart().expect("restart");

        assert_eq!(hook.target(), "kubelet");
        assert!(!hook.is_noop());
        assert_eq!(mock.calls(), vec!["systemctl restart kubelet"]);
    }

    #[test]
    fn systemctl_failure_is_reported() {
        let mock = Arc::new(MockPlatform::default().with_command(
            "systemctl restart kubelet",
            CommandOutput::failed(5, "Unit kubelet.service not found."),
        ));
        let hook = SystemctlRestart::new(mock, "kubelet");

        let err = hook.restart().expect_err("missing unit");

        assert_eq!(err.code(), "EMB-2301");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn disabled_config_yields_noop() {
        let mock = Arc::new(MockPlatform::default());
        let config = RestartConfig {
            enabled: false,
            unit: "kubelet".to_string(),
        };
        let hook = restart_hook_from_config(Arc::clone(&mock) as Arc<dyn Platform>, &config);

        hook.restart().expect("noop");

        assert_eq!(hook.target(), "nothing");
        assert!(hook.is_noop());
        assert!(mock.calls().is_empty());
    }
}
