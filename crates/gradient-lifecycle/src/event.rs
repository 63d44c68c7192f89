//! Events that drive the release lifecycle.

/// An event applied to the state machine. External callers submit
/// `Configure`, `Deploy`, and `Destroy`; everything else is raised
/// internally by state actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Set up mesh resources and the primary workload.
    Configure,
    /// Configuration finished.
    Configured,
    /// A new candidate deployment has arrived.
    Deploy,
    /// The rollout is prepared; start the strategy.
    Deployed,
    /// Checks passed; apply the new candidate traffic percentage.
    Healthy { traffic: i32 },
    /// The traffic split was applied.
    Scaled,
    /// The current phase finished its work.
    Complete,
    /// Checks failed past the threshold; roll back.
    Unhealthy,
    /// The candidate was promoted to primary.
    Promoted,
    /// A state action failed.
    Fail,
    /// Tear down everything the controller created.
    Destroy,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Configure => "configure",
            Event::Configured => "configured",
            Event::Deploy => "deploy",
            Event::Deployed => "deployed",
            Event::Healthy { .. } => "healthy",
            Event::Scaled => "scaled",
            Event::Complete => "complete",
            Event::Unhealthy => "unhealthy",
            Event::Promoted => "promoted",
            Event::Fail => "fail",
            Event::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
