// tests/property_fsm.rs

use std::sync::Arc;

use proptest::prelude::*;

use clustertrack::errors::ClustertrackError;
use clustertrack::fsm::TrackedEntity;
use clustertrack::lifecycle::{job_table, JobEvent, JobEventType, JobMachine, JobState};
use clustertrack::poll::{aggregate, AggregateStatus, HostStatusRecord, ProcessState};
use clustertrack::types::HostStatusToken;

fn event_kind() -> impl Strategy<Value = JobEventType> {
    prop_oneof![
        Just(JobEventType::JobInit),
        Just(JobEventType::JobInProgress),
        Just(JobEventType::JobCompleted),
        Just(JobEventType::JobFailed),
    ]
}

/// A host record with an optional done-file exit code and some log text.
fn host_record() -> impl Strategy<Value = HostStatusRecord> {
    ("[a-z]{1,8}", proptest::option::of(-5i32..5), "[ -~]{0,20}").prop_map(|(host, code, log)| {
        let done = code.map(|c| c.to_string());
        HostStatusRecord::from_markers(host, done.as_deref(), log, 1).unwrap()
    })
}

proptest! {
    #[test]
    fn registered_pairs_reach_their_destination(kinds in proptest::collection::vec(event_kind(), 0..40)) {
        let table = Arc::new(job_table().unwrap());
        let job = TrackedEntity::<JobMachine>::new("job-p", Arc::clone(&table));

        for (t, kind) in kinds.into_iter().enumerate() {
            let before = job.snapshot();
            let result = job.handle_event(&JobEvent::new("job-p", kind, t as u64));

            match table.destinations(before.state, kind) {
                Some(dests) => {
                    let next = result.unwrap();
                    prop_assert_eq!(dests, vec![next]);
                    prop_assert_eq!(job.state(), next);
                }
                None => {
                    let is_invalid = matches!(result, Err(ClustertrackError::InvalidTransition { .. }));
                    prop_assert!(is_invalid);
                    let after = job.snapshot();
                    prop_assert_eq!(after.state, before.state);
                    prop_assert_eq!(after.data, before.data);
                }
            }
            prop_assert!(table.states().contains(&job.state()));
        }
    }

    #[test]
    fn reset_only_succeeds_from_terminal_states(kinds in proptest::collection::vec(event_kind(), 0..10)) {
        let job = TrackedEntity::<JobMachine>::new("job-r", Arc::new(job_table().unwrap()));
        for (t, kind) in kinds.into_iter().enumerate() {
            let _ = job.handle_event(&JobEvent::new("job-r", kind, t as u64));
        }

        let before = job.snapshot();
        let terminal = matches!(before.state, JobState::Completed | JobState::Failed);
        let result = job.reset();

        prop_assert_eq!(result.is_ok(), terminal);
        if terminal {
            prop_assert_eq!(job.state(), JobState::Init);
        } else {
            prop_assert_eq!(job.snapshot().data, before.data);
            prop_assert_eq!(job.state(), before.state);
        }
    }

    #[test]
    fn aggregation_is_idempotent_and_follows_the_rule(
        process_exit in proptest::option::of(-2i32..3),
        hosts in proptest::collection::vec(host_record(), 0..8),
    ) {
        let first = aggregate(ProcessState::from(process_exit), hosts.clone());
        let second = aggregate(ProcessState::from(process_exit), hosts.clone());
        prop_assert_eq!(&first, &second);

        let failed = matches!(process_exit, Some(c) if c != 0)
            || hosts.iter().any(|h| h.status == HostStatusToken::Failed);
        let running = hosts.iter().any(|h| h.status == HostStatusToken::Running);
        let expected = if failed {
            AggregateStatus::Error
        } else if running {
            AggregateStatus::Running
        } else {
            AggregateStatus::Success
        };
        prop_assert_eq!(first.status, expected);

        for h in &hosts {
            let header = format!("==> {} [", h.host);
            prop_assert!(first.log.contains(&header));
        }
    }

    #[test]
    fn marker_pair_round_trips(code in any::<i32>(), log in "\\PC{0,64}") {
        let done = code.to_string();
        let record = HostStatusRecord::from_markers("h1", Some(&done), log.clone(), 1).unwrap();

        prop_assert_eq!(record.exit_code(), Some(code));
        prop_assert_eq!(record.log(), log.as_str());
    }
}
