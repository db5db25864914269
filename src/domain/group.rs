use super::{ContainerSpec, CreateOptions};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Active,
    /// Terminal until the process restarts.
    Suspended,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

/// How often a group may fail start verification and how long to wait
/// before checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub settle_delay: Duration,
    /// The group is suspended once `attempts` exceeds this value.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What a verification failure did to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retrying { attempts: u32 },
    Suspended { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    status: GroupStatus,
    attempts: u32,
}

impl Default for GroupState {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupState {
    pub fn new() -> Self {
        Self {
            status: GroupStatus::Active,
            attempts: 0,
        }
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_active(&self) -> bool {
        self.status == GroupStatus::Active
    }

    /// A started container was confirmed running.
    pub fn record_success(&mut self) {
        if self.is_active() {
            self.attempts = 0;
        }
    }

    /// A started container was not found running after the settle delay.
    ///
    /// Suspended groups are never mutated again, so calling this on one
    /// reports the existing suspension without touching the counter.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Transition {
        if !self.is_active() {
            return Transition::Suspended {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        if self.attempts > policy.max_attempts {
            self.status = GroupStatus::Suspended;
            return Transition::Suspended {
                attempts: self.attempts,
            };
        }

        Transition::Retrying {
            attempts: self.attempts,
        }
    }
}

/// A spec paired with its cached creation parameters and its retry state.
#[derive(Debug, Clone)]
pub struct Group {
    pub spec: ContainerSpec,
    pub options: CreateOptions,
    pub state: GroupState,
}

impl Group {
    pub fn new(spec: ContainerSpec, options: CreateOptions) -> Self {
        Self {
            spec,
            options,
            state: GroupState::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.options.image
    }

    pub fn desired(&self) -> usize {
        self.spec.instances as usize
    }

    /// Options for a single create call. A fixed name is dropped when more
    /// than one instance is desired, since engines reject duplicate names.
    pub fn options_for_create(&self) -> CreateOptions {
        let mut options = self.options.clone();
        if self.spec.instances > 1 {
            options.name = None;
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active_with_zero_attempts() {
        let state = GroupState::new();
        assert_eq!(state.status(), GroupStatus::Active);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn suspends_after_exceeding_threshold() {
        let policy = RetryPolicy::default();
        let mut state = GroupState::new();

        for expected in 1..=3 {
            assert_eq!(
                state.record_failure(&policy),
                Transition::Retrying { attempts: expected }
            );
        }
        assert!(state.is_active());

        assert_eq!(
            state.record_failure(&policy),
            Transition::Suspended { attempts: 4 }
        );
        assert_eq!(state.status(), GroupStatus::Suspended);
    }

    #[test]
    fn success_resets_attempts() {
        let policy = RetryPolicy::default();
        let mut state = GroupState::new();
        state.record_failure(&policy);
        state.record_failure(&policy);
        state.record_success();
        assert_eq!(state.attempts(), 0);
        assert!(state.is_active());
    }

    #[test]
    fn suspended_state_is_frozen() {
        let policy = RetryPolicy {
            settle_delay: Duration::ZERO,
            max_attempts: 0,
        };
        let mut state = GroupState::new();
        assert_eq!(
            state.record_failure(&policy),
            Transition::Suspended { attempts: 1 }
        );

        state.record_success();
        state.record_failure(&policy);
        assert_eq!(state.attempts(), 1);
        assert_eq!(state.status(), GroupStatus::Suspended);
    }

    #[test]
    fn name_is_cleared_only_for_multiple_instances() {
        let options = CreateOptions {
            name: Some("web_front".into()),
            image: "nginx".into(),
            ..Default::default()
        };

        let single = Group::new(ContainerSpec::new("nginx", 1), options.clone());
        assert_eq!(single.options_for_create().name.as_deref(), Some("web_front"));

        let many = Group::new(ContainerSpec::new("nginx", 3), options);
        assert_eq!(many.options_for_create().name, None);
        assert_eq!(many.options.name.as_deref(), Some("web_front"));
    }
}
