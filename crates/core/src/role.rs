// SPDX-License-Identifier: MIT

//! Agent role — the closed enumeration of pipeline stages.

use serde::{Deserialize, Serialize};

/// One of the six fixed stages of the repair pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    RepoMapper,
    Planner,
    Implementer,
    Tester,
    Reviewer,
    Finalizer,
}

impl AgentRole {
    /// The fixed pipeline order.
    pub const SEQUENCE: [AgentRole; 6] = [
        AgentRole::RepoMapper,
        AgentRole::Planner,
        AgentRole::Implementer,
        AgentRole::Tester,
        AgentRole::Reviewer,
        AgentRole::Finalizer,
    ];

    /// The role a fresh job starts at.
    pub fn first() -> AgentRole {
        AgentRole::SEQUENCE[0]
    }

    /// The role that follows this one, or `None` if this is the last role
    /// (Finalizer) and the job should transition to Done.
    pub fn next(self) -> Option<AgentRole> {
        let idx = Self::SEQUENCE.iter().position(|r| *r == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::RepoMapper => "repo_mapper",
            AgentRole::Planner => "planner",
            AgentRole::Implementer => "implementer",
            AgentRole::Tester => "tester",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Finalizer => "finalizer",
        }
    }

    pub fn from_str_db(s: &str) -> Option<AgentRole> {
        Some(match s {
            "repo_mapper" => AgentRole::RepoMapper,
            "planner" => AgentRole::Planner,
            "implementer" => AgentRole::Implementer,
            "tester" => AgentRole::Tester,
            "reviewer" => AgentRole::Reviewer,
            "finalizer" => AgentRole::Finalizer,
            _ => return None,
        })
    }
}

crate::simple_display! {
    AgentRole {
        RepoMapper => "repo_mapper",
        Planner => "planner",
        Implementer => "implementer",
        Tester => "tester",
        Reviewer => "reviewer",
        Finalizer => "finalizer",
    }
}

/// Coarse job state derived deterministically from the currently pending
/// role, plus the two terminal states a job can also be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    MapRepo,
    Plan,
    Implement,
    Test,
    Review,
    Finalize,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::MapRepo => "MAP_REPO",
            JobState::Plan => "PLAN",
            JobState::Implement => "IMPLEMENT",
            JobState::Test => "TEST",
            JobState::Review => "REVIEW",
            JobState::Finalize => "FINALIZE",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }

    pub fn from_str_db(s: &str) -> Option<JobState> {
        Some(match s {
            "MAP_REPO" => JobState::MapRepo,
            "PLAN" => JobState::Plan,
            "IMPLEMENT" => JobState::Implement,
            "TEST" => JobState::Test,
            "REVIEW" => JobState::Review,
            "FINALIZE" => JobState::Finalize,
            "DONE" => JobState::Done,
            "FAILED" => JobState::Failed,
            _ => return None,
        })
    }
}

crate::simple_display! {
    JobState {
        MapRepo => "MAP_REPO",
        Plan => "PLAN",
        Implement => "IMPLEMENT",
        Test => "TEST",
        Review => "REVIEW",
        Finalize => "FINALIZE",
        Done => "DONE",
        Failed => "FAILED",
    }
}

impl From<AgentRole> for JobState {
    fn from(role: AgentRole) -> Self {
        match role {
            AgentRole::RepoMapper => JobState::MapRepo,
            AgentRole::Planner => JobState::Plan,
            AgentRole::Implementer => JobState::Implement,
            AgentRole::Tester => JobState::Test,
            AgentRole::Reviewer => JobState::Review,
            AgentRole::Finalizer => JobState::Finalize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_chains_to_finalizer_then_stops() {
        let mut role = AgentRole::first();
        let mut seen = vec![role];
        while let Some(next) = role.next() {
            seen.push(next);
            role = next;
        }
        assert_eq!(seen, AgentRole::SEQUENCE.to_vec());
        assert_eq!(role, AgentRole::Finalizer);
        assert_eq!(role.next(), None);
    }

    #[test]
    fn role_maps_to_coarse_state() {
        assert_eq!(JobState::from(AgentRole::RepoMapper), JobState::MapRepo);
        assert_eq!(JobState::from(AgentRole::Finalizer), JobState::Finalize);
    }

    #[test]
    fn role_round_trips_through_db_string() {
        for role in AgentRole::SEQUENCE {
            assert_eq!(AgentRole::from_str_db(role.as_str()), Some(role));
        }
    }

    #[test]
    fn job_state_round_trips_through_db_string() {
        for state in [
            JobState::MapRepo,
            JobState::Plan,
            JobState::Implement,
            JobState::Test,
            JobState::Review,
            JobState::Finalize,
            JobState::Done,
            JobState::Failed,
        ] {
            assert_eq!(JobState::from_str_db(state.as_str()), Some(state));
        }
    }
}
