//! Container type tags and the session/task storage partition.

use std::fmt;

/// String tag identifying a container's schema, and the on-disk table name
/// for the durable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContainerType {
    /// `analysis_warning`
    AnalysisWarning,
    /// `event`
    Event,
    /// `event_data`
    EventData,
    /// `event_data_stream`
    EventDataStream,
    /// `event_source`
    EventSource,
    /// `event_tag`
    EventTag,
    /// `extraction_warning`
    ExtractionWarning,
    /// `preprocessing_warning`
    PreprocessingWarning,
    /// `recovery_warning`
    RecoveryWarning,
    /// `windows_eventlog_provider`
    WindowsEventlogProvider,
    /// `session_start`
    SessionStart,
    /// `session_completion`
    SessionCompletion,
    /// `session_configuration`
    SessionConfiguration,
    /// `system_configuration`
    SystemConfiguration,
    /// `task_start`
    TaskStart,
    /// `task_completion`
    TaskCompletion,
}

/// All container types known to the registry.
pub const ALL_CONTAINER_TYPES: &[ContainerType] = &[
    ContainerType::AnalysisWarning,
    ContainerType::Event,
    ContainerType::EventData,
    ContainerType::EventDataStream,
    ContainerType::EventSource,
    ContainerType::EventTag,
    ContainerType::ExtractionWarning,
    ContainerType::PreprocessingWarning,
    ContainerType::RecoveryWarning,
    ContainerType::WindowsEventlogProvider,
    ContainerType::SessionStart,
    ContainerType::SessionCompletion,
    ContainerType::SessionConfiguration,
    ContainerType::SystemConfiguration,
    ContainerType::TaskStart,
    ContainerType::TaskCompletion,
];

/// Container types exclusive to a session store.
pub const SESSION_STORE_ONLY: &[ContainerType] = &[
    ContainerType::SessionStart,
    ContainerType::SessionCompletion,
    ContainerType::SessionConfiguration,
];

/// Container types exclusive to a task store.
pub const TASK_STORE_ONLY: &[ContainerType] = &[
    ContainerType::TaskStart,
    ContainerType::TaskCompletion,
];

/// Storage backend kind a store was opened as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Per-processing-session store.
    Session,
    /// Per-task store, used by worker processes.
    Task,
}

impl StorageType {
    /// Whether `container_type` may be created/written under this storage type.
    pub fn allows(&self, container_type: ContainerType) -> bool {
        match self {
            StorageType::Session => !TASK_STORE_ONLY.contains(&container_type),
            StorageType::Task => !SESSION_STORE_ONLY.contains(&container_type),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageType::Session => "session",
            StorageType::Task => "task",
        })
    }
}

impl std::str::FromStr for StorageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(StorageType::Session),
            "task" => Ok(StorageType::Task),
            _ => Err(()),
        }
    }
}

impl ContainerType {
    /// The on-disk table / type-tag name for this container type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::AnalysisWarning => "analysis_warning",
            ContainerType::Event => "event",
            ContainerType::EventData => "event_data",
            ContainerType::EventDataStream => "event_data_stream",
            ContainerType::EventSource => "event_source",
            ContainerType::EventTag => "event_tag",
            ContainerType::ExtractionWarning => "extraction_warning",
            ContainerType::PreprocessingWarning => "preprocessing_warning",
            ContainerType::RecoveryWarning => "recovery_warning",
            ContainerType::WindowsEventlogProvider => "windows_eventlog_provider",
            ContainerType::SessionStart => "session_start",
            ContainerType::SessionCompletion => "session_completion",
            ContainerType::SessionConfiguration => "session_configuration",
            ContainerType::SystemConfiguration => "system_configuration",
            ContainerType::TaskStart => "task_start",
            ContainerType::TaskCompletion => "task_completion",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CONTAINER_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_and_task_only_sets_are_disjoint() {
        for t in SESSION_STORE_ONLY {
            assert!(!TASK_STORE_ONLY.contains(t));
        }
    }

    #[test]
    fn round_trips_through_as_str() {
        for t in ALL_CONTAINER_TYPES {
            let parsed: ContainerType = t.as_str().parse().unwrap();
            assert_eq!(parsed, *t);
        }
    }

    #[test]
    fn storage_type_partition() {
        assert!(StorageType::Session.allows(ContainerType::Event));
        assert!(!StorageType::Session.allows(ContainerType::TaskStart));
        assert!(StorageType::Task.allows(ContainerType::TaskStart));
        assert!(!StorageType::Task.allows(ContainerType::SessionStart));
    }
}
