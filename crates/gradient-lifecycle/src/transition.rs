//! The transition table of the release lifecycle.
//!
//! Pure function of `(state, event)`; all side effects live in the
//! state actions. `None` means the event is not valid in that state.

use gradient_model::State;

use crate::event::Event;

pub fn transition(state: State, event: &Event) -> Option<State> {
    use State::*;

    match (state, event) {
        (Start | Idle | Fail, Event::Configure) => Some(Configure),
        (Configure, Event::Configured) => Some(Idle),

        (Idle | Fail, Event::Deploy) => Some(Deploy),
        (Deploy, Event::Deployed) => Some(Monitor),
        (Deploy, Event::Complete) => Some(Idle),

        (Monitor, Event::Healthy { .. }) => Some(Scale),
        (Monitor, Event::Complete) => Some(Promote),
        (Monitor, Event::Unhealthy) => Some(Rollback),
        (Scale, Event::Scaled) => Some(Monitor),

        (Promote, Event::Promoted) => Some(Idle),
        (Rollback, Event::Complete) => Some(Idle),
        (Destroy, Event::Complete) => Some(Idle),

        // Fail is reachable from everywhere but itself.
        (Fail, Event::Fail) => None,
        (_, Event::Fail) => Some(Fail),

        (
            Configure | Idle | Deploy | Monitor | Scale | Promote | Rollback | Fail,
            Event::Destroy,
        ) => Some(Destroy),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    #[test]
    fn configure_is_accepted_from_start_idle_and_fail() {
        assert_eq!(transition(Start, &Event::Configure), Some(Configure));
        assert_eq!(transition(Idle, &Event::Configure), Some(Configure));
        assert_eq!(transition(Fail, &Event::Configure), Some(Configure));
        assert_eq!(transition(Monitor, &Event::Configure), None);
    }

    #[test]
    fn deploy_requires_a_settled_release() {
        assert_eq!(transition(Idle, &Event::Deploy), Some(Deploy));
        assert_eq!(transition(Fail, &Event::Deploy), Some(Deploy));
        assert_eq!(transition(Start, &Event::Deploy), None);
        assert_eq!(transition(Monitor, &Event::Deploy), None);
    }

    #[test]
    fn rollout_loop_alternates_monitor_and_scale() {
        assert_eq!(transition(Deploy, &Event::Deployed), Some(Monitor));
        assert_eq!(
            transition(Monitor, &Event::Healthy { traffic: 10 }),
            Some(Scale)
        );
        assert_eq!(transition(Scale, &Event::Scaled), Some(Monitor));
        assert_eq!(transition(Monitor, &Event::Complete), Some(Promote));
        assert_eq!(transition(Promote, &Event::Promoted), Some(Idle));
    }

    #[test]
    fn complete_returns_to_idle_from_terminal_phases() {
        assert_eq!(transition(Deploy, &Event::Complete), Some(Idle));
        assert_eq!(transition(Rollback, &Event::Complete), Some(Idle));
        assert_eq!(transition(Destroy, &Event::Complete), Some(Idle));
        assert_eq!(transition(Promote, &Event::Complete), None);
    }

    #[test]
    fn unhealthy_only_fires_while_monitoring() {
        assert_eq!(transition(Monitor, &Event::Unhealthy), Some(Rollback));
        assert_eq!(transition(Scale, &Event::Unhealthy), None);
    }

    #[test]
    fn fail_is_reachable_from_everywhere_but_itself() {
        for state in [
            Start, Configure, Idle, Deploy, Monitor, Scale, Promote, Rollback, Destroy,
        ] {
            assert_eq!(transition(state, &Event::Fail), Some(Fail), "{state}");
        }
        assert_eq!(transition(Fail, &Event::Fail), None);
    }

    #[test]
    fn destroy_is_accepted_mid_rollout_and_after_failure() {
        for state in [Configure, Idle, Deploy, Monitor, Scale, Promote, Rollback, Fail] {
            assert_eq!(transition(state, &Event::Destroy), Some(Destroy), "{state}");
        }
        assert_eq!(transition(Start, &Event::Destroy), None);
        assert_eq!(transition(Destroy, &Event::Destroy), None);
    }
}
