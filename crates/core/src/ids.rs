// SPDX-License-Identifier: MIT

//! Opaque identifier types for jobs and steps.

crate::define_id! {
    /// Unique identifier for a repair job.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Unique identifier for a single agent-role step within a job.
    pub struct StepId("stp-");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("job-"));
        let id = StepId::new();
        assert!(id.as_str().starts_with("stp-"));
    }

    #[test]
    fn from_string_round_trips() {
        let id = JobId::from_string("job-abc");
        assert_eq!(id.as_str(), "job-abc");
        assert_eq!(id.to_string(), "job-abc");
    }
}
