#[macro_use]
extern crate proptest;
extern crate nimbus_core;
extern crate nimbus_master;

use std::collections::HashSet;

use proptest::prelude::*;

use nimbus_core::types::{AccessMode, DataDescription};
use nimbus_master::data::info::DataInfo;

fn file_data() -> DataInfo {
    DataInfo::new(
        1,
        1,
        DataDescription::File {
            location: "/tmp/property".to_string(),
        },
    )
}

fn arb_mode() -> impl Strategy<Value = AccessMode> {
    prop_oneof![
        Just(AccessMode::R),
        Just(AccessMode::W),
        Just(AccessMode::RW),
        Just(AccessMode::C),
        Just(AccessMode::CV),
    ]
}

proptest! {
    /// Invariant: across any access sequence the current version id never
    /// decreases and every produced version id is unique.
    #[test]
    fn version_ids_are_monotonic_and_unique(
        modes in proptest::collection::vec(arb_mode(), 1..64)
    ) {
        let mut data = file_data();
        let mut produced = HashSet::new();
        produced.insert(1);
        let mut last = data.get_current_version_id();
        for mode in modes {
            let access = data.will_access(mode).unwrap();
            let now = data.get_current_version_id();
            prop_assert!(now >= last, "version went backwards: {} -> {}", last, now);
            if let Some(written) = access.written_instance() {
                prop_assert!(
                    produced.insert(written.get_version_id()),
                    "version {} produced twice",
                    written.get_version_id()
                );
            }
            last = now;
        }
    }

    /// Invariant: a version is never physically removed while an access
    /// still promises to read or write it.
    #[test]
    fn versions_survive_their_promised_accesses(
        modes in proptest::collection::vec(arb_mode(), 1..48),
        commit_order in proptest::collection::vec(any::<usize>(), 1..48)
    ) {
        let mut data = file_data();
        let mut open = Vec::new();
        for mode in modes {
            open.push(data.will_access(mode).unwrap());
        }
        // Commit a scrambled subset
        let mut order: Vec<usize> = (0..open.len()).collect();
        for pick in commit_order.iter() {
            if order.is_empty() {
                break;
            }
            let j = pick % order.len();
            let slot = order.remove(j);
            let access = open[slot];
            let outcome = data.committed_access(&access);
            // Whatever got physically removed is referenced by no access
            // that is still open
            for removed in outcome.removed {
                let version = removed.get_version_id();
                for other_slot in order.iter() {
                    let other = open[*other_slot];
                    let reads_it = other.read_instance()
                        .map(|i| i.get_version_id() == version)
                        .unwrap_or(false);
                    let writes_it = other.written_instance()
                        .map(|i| i.get_version_id() == version)
                        .unwrap_or(false);
                    prop_assert!(
                        !reads_it && !writes_it,
                        "version {} removed while access {:?} is open",
                        version,
                        other
                    );
                }
                prop_assert!(data.version(version).is_none());
            }
        }
    }

    /// Cancelling the last write rewinds to the most recent version that
    /// was actually used; a fully cancelled history kills the datum.
    #[test]
    fn write_cancellation_rewinds_to_used_versions(writes in 1usize..6) {
        let mut data = file_data();
        data.mark_current_used();
        let mut accesses = Vec::new();
        for _ in 0..writes {
            accesses.push(data.will_access(AccessMode::W).unwrap());
        }
        prop_assert_eq!(data.get_current_version_id(), 1 + writes as i32);
        let mut gone = false;
        for access in accesses.iter().rev() {
            let version = access.written_instance().unwrap().get_version_id();
            let outcome = data.version_write_cancelled(version);
            gone = outcome.data_gone;
        }
        prop_assert!(!gone, "a used first version must survive the rollback");
        prop_assert_eq!(data.get_current_version_id(), 1);
    }
}
