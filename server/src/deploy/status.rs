//! Service lifecycle state machine

use serde::{Deserialize, Serialize};

/// Lifecycle status of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// Record created, nothing run yet
    Starting,
    /// Build/deploy attempt in progress
    Building,
    /// Container(s) up
    Running,
    /// Explicitly stopped
    Stopped,
    /// Last attempt failed
    Error,
}

impl ServiceStatus {
    /// Whether a transition to `next` is part of the lifecycle table
    ///
    /// `Starting -> Building -> Running`, `Error` reachable from any
    /// non-terminal state, `Running <-> Stopped`, and rebuilds re-enter
    /// `Building` from `Running`, `Stopped` or `Error`.
    pub fn can_transition(self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, next),
            (Starting, Building)
                | (Starting, Running)
                | (Building, Running)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Running, Building)
                | (Stopped, Building)
                | (Error, Building)
                | (Error, Running)
                | (_, Error)
        )
    }

    /// Validate and apply a transition
    pub fn transition(self, next: ServiceStatus) -> Result<ServiceStatus, String> {
        if self == next || self.can_transition(next) {
            Ok(next)
        } else {
            Err(format!("Invalid transition: {:?} -> {:?}", self, next))
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Starting => "STARTING",
            ServiceStatus::Building => "BUILDING",
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Stopped => "STOPPED",
            ServiceStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_flow() {
        let s = ServiceStatus::Starting;
        let s = s.transition(ServiceStatus::Building).unwrap();
        let s = s.transition(ServiceStatus::Running).unwrap();
        assert_eq!(s, ServiceStatus::Running);
    }

    #[test]
    fn test_error_from_any_non_terminal() {
        for s in [
            ServiceStatus::Starting,
            ServiceStatus::Building,
            ServiceStatus::Running,
            ServiceStatus::Stopped,
        ] {
            assert!(s.can_transition(ServiceStatus::Error));
        }
    }

    #[test]
    fn test_rebuild_reenters_building() {
        assert!(ServiceStatus::Running.can_transition(ServiceStatus::Building));
        assert!(ServiceStatus::Stopped.can_transition(ServiceStatus::Building));
        assert!(ServiceStatus::Error.can_transition(ServiceStatus::Building));
    }

    #[test]
    fn test_stop_start_cycle() {
        assert!(ServiceStatus::Running.can_transition(ServiceStatus::Stopped));
        assert!(ServiceStatus::Stopped.can_transition(ServiceStatus::Running));
        assert!(!ServiceStatus::Stopped.can_transition(ServiceStatus::Starting));
    }
}
