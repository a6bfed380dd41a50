use std::collections::BTreeMap;

use nimbus_core::errors::Result;
use nimbus_core::types::{AccessMode, AppId, DataDescription, DataId, DataInstanceId, VersionId};
use nimbus_core::utils::ConsistencyCheck;

use data::access::EngineDataAccessId;
use data::params::DataKey;
use data::version::DataVersion;
use graph::task::TaskNodeRef;

const FIRST_VERSION_ID: VersionId = 1;

/// Producer/consumer bookkeeping, keyed by the data kind.
///
/// Standard data has at most one last writer (possibly a commutative group
/// node) plus the readers collected since it; a stream keeps every active
/// writer and never hands exclusive ownership to a single task.
#[derive(Debug)]
pub enum AccessTracking {
    Standard {
        last_writer: Option<TaskNodeRef>,
        concurrent_readers: Vec<TaskNodeRef>,
    },
    Stream {
        writers: Vec<TaskNodeRef>,
    },
}

impl AccessTracking {
    pub fn for_data(params: &DataDescription) -> AccessTracking {
        if params.is_stream() {
            AccessTracking::Stream {
                writers: Vec::new(),
            }
        } else {
            AccessTracking::Standard {
                last_writer: None,
                concurrent_readers: Vec::new(),
            }
        }
    }
}

/// What happened to a version after an access was resolved on it.
#[derive(Debug, Default)]
pub struct VersionOutcome {
    /// Physical instances that can be removed from the transfer layer.
    pub removed: Vec<DataInstanceId>,
    /// No version remains; the DataInfo must deregister itself.
    pub data_gone: bool,
}

impl VersionOutcome {
    fn removed(instance: DataInstanceId, data_gone: bool) -> Self {
        VersionOutcome {
            removed: vec![instance],
            data_gone,
        }
    }

    pub fn merge(&mut self, other: VersionOutcome) {
        self.removed.extend(other.removed);
        self.data_gone = self.data_gone || other.data_gone;
    }
}

/// The runtime's record of a logical value: its identity, its versions and
/// the tasks producing or consuming it.
#[derive(Debug)]
pub struct DataInfo {
    data_id: DataId,
    app: AppId,
    params: DataDescription,

    current_version_id: VersionId,
    versions: BTreeMap<VersionId, DataVersion>,

    deletion_blocks: u32,
    pending_deletions: Vec<VersionId>,
    cancelled_versions: Vec<VersionId>,

    deleted: bool,

    /// Children of a collection datum, deleted recursively with it.
    pub(crate) children: Vec<DataKey>,

    pub(crate) tracking: AccessTracking,
}

wrapped_ref!(DataInfoRef, DataInfo);

impl DataInfo {
    pub fn new(data_id: DataId, app: AppId, params: DataDescription) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(
            FIRST_VERSION_ID,
            DataVersion::new(data_id, FIRST_VERSION_ID, None),
        );
        let tracking = AccessTracking::for_data(&params);
        DataInfo {
            data_id,
            app,
            params,
            current_version_id: FIRST_VERSION_ID,
            versions,
            deletion_blocks: 0,
            pending_deletions: Vec::new(),
            cancelled_versions: Vec::new(),
            deleted: false,
            children: Vec::new(),
            tracking,
        }
    }

    #[inline]
    pub fn get_data_id(&self) -> DataId {
        self.data_id
    }

    #[inline]
    pub fn get_app(&self) -> AppId {
        self.app
    }

    #[inline]
    pub fn get_params(&self) -> &DataDescription {
        &self.params
    }

    #[inline]
    pub fn get_current_version_id(&self) -> VersionId {
        self.current_version_id
    }

    pub fn current_instance(&self) -> DataInstanceId {
        DataInstanceId::new(self.data_id, self.current_version_id)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn version(&self, version_id: VersionId) -> Option<&DataVersion> {
        self.versions.get(&version_id)
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Registers a new access, advancing the version on writing modes.
    ///
    /// Streams never advance versions: their reads do not consume the
    /// written value and their writes pile onto the single live version.
    pub fn will_access(&mut self, mode: AccessMode) -> Option<EngineDataAccessId> {
        let is_stream = self.params.is_stream();
        let daid = if is_stream {
            match mode {
                AccessMode::R => {
                    self.will_be_read();
                    Some(EngineDataAccessId::R {
                        data_id: self.data_id,
                        read_version: self.current_version_id,
                    })
                }
                AccessMode::W => {
                    {
                        let current = self.current_version_mut();
                        current.will_be_written();
                        current.version_used();
                    }
                    Some(EngineDataAccessId::W {
                        data_id: self.data_id,
                        write_version: self.current_version_id,
                    })
                }
                _ => {
                    warn!(
                        "Unsupported type of access ({}) for stream {}",
                        mode, self.data_id
                    );
                    None
                }
            }
        } else {
            match mode {
                AccessMode::R | AccessMode::C => {
                    self.will_be_read();
                    Some(EngineDataAccessId::R {
                        data_id: self.data_id,
                        read_version: self.current_version_id,
                    })
                }
                AccessMode::W => {
                    self.will_be_written();
                    Some(EngineDataAccessId::W {
                        data_id: self.data_id,
                        write_version: self.current_version_id,
                    })
                }
                AccessMode::RW | AccessMode::CV => {
                    self.will_be_read();
                    let read_version = self.current_version_id;
                    self.will_be_written();
                    Some(EngineDataAccessId::RW {
                        data_id: self.data_id,
                        read_version,
                        write_version: self.current_version_id,
                    })
                }
            }
        };
        if let Some(ref id) = daid {
            debug!("{}", id.to_debug_string());
        }
        daid
    }

    /// Reconstructs the last access as if it were of the given mode, without
    /// touching any counter. Used when the main code finishes an access.
    pub fn get_last_access(&self, mode: AccessMode) -> Option<EngineDataAccessId> {
        match mode {
            AccessMode::R | AccessMode::C => Some(EngineDataAccessId::R {
                data_id: self.data_id,
                read_version: self.current_version_id,
            }),
            AccessMode::W => Some(EngineDataAccessId::W {
                data_id: self.data_id,
                write_version: self.current_version_id,
            }),
            AccessMode::RW | AccessMode::CV => {
                let read_version = self.current_version_id - 1;
                if self.versions.contains_key(&read_version) {
                    Some(EngineDataAccessId::RW {
                        data_id: self.data_id,
                        read_version,
                        write_version: self.current_version_id,
                    })
                } else {
                    warn!("Previous instance for data {} is missing", self.data_id);
                    None
                }
            }
        }
    }

    fn current_version_mut(&mut self) -> &mut DataVersion {
        let id = self.current_version_id;
        self.versions.get_mut(&id).expect("current version missing")
    }

    fn will_be_read(&mut self) {
        let current = self.current_version_mut();
        current.version_used();
        current.will_be_read();
    }

    fn will_be_written(&mut self) {
        let predecessor = {
            let current = self.current_version_mut();
            if current.has_been_cancelled() {
                current.get_valid_predecessor()
            } else {
                Some(current.get_version_id())
            }
        };
        self.current_version_id += 1;
        let mut version = DataVersion::new(self.data_id, self.current_version_id, predecessor);
        version.will_be_written();
        version.version_used();
        self.versions.insert(self.current_version_id, version);
    }

    fn remove_version(&mut self, version_id: VersionId) -> DataInstanceId {
        self.versions.remove(&version_id);
        DataInstanceId::new(self.data_id, version_id)
    }

    /// A version can physically go once nothing is promised on it and it is
    /// either superseded or explicitly marked for deletion.
    fn is_removable(&self, version_id: VersionId) -> bool {
        if self.deletion_blocks > 0 {
            return false;
        }
        match self.versions.get(&version_id) {
            Some(v) => {
                v.is_free() && !v.is_value_on_main()
                    && (version_id != self.current_version_id || v.is_to_delete() || self.deleted)
            }
            None => false,
        }
    }

    /// A promised read of the version has completed.
    pub fn version_read_committed(&mut self, version_id: VersionId) -> VersionOutcome {
        match self.versions.get_mut(&version_id) {
            Some(v) => v.read_committed(),
            None => {
                warn!(
                    "Read commit on unknown version {} of data {}",
                    version_id, self.data_id
                );
                return VersionOutcome::default();
            }
        }
        if self.is_removable(version_id) {
            let instance = self.remove_version(version_id);
            return VersionOutcome::removed(instance, self.versions.is_empty());
        }
        VersionOutcome::default()
    }

    /// The promised write of the version has completed; the version is
    /// promoted.
    pub fn version_write_committed(&mut self, version_id: VersionId) -> VersionOutcome {
        let mut outcome = VersionOutcome::default();
        match self.versions.get_mut(&version_id) {
            Some(v) => v.write_committed(),
            None => {
                warn!(
                    "Write commit on unknown version {} of data {}",
                    version_id, self.data_id
                );
                return outcome;
            }
        }
        if self.is_removable(version_id) {
            let instance = self.remove_version(version_id);
            outcome.merge(VersionOutcome::removed(instance, false));
        }
        outcome.data_gone = self.versions.is_empty();
        outcome
    }

    /// Finalizes a whole access: its promised read completes, the version
    /// superseded by its write becomes reclaimable and the written version
    /// is promoted.
    pub fn committed_access(&mut self, access: &EngineDataAccessId) -> VersionOutcome {
        let mut outcome = VersionOutcome::default();
        let mut read_version = None;
        if let Some(ri) = access.read_instance() {
            read_version = Some(ri.get_version_id());
            outcome.merge(self.version_read_committed(ri.get_version_id()));
        }
        if let Some(wi) = access.written_instance() {
            let write_version = wi.get_version_id();
            let superseded = read_version.unwrap_or(write_version - 1);
            outcome.merge(self.try_remove_version(superseded));
            outcome.merge(self.version_write_committed(write_version));
        }
        outcome.data_gone = self.versions.is_empty();
        outcome
    }

    /// Undoes a whole access after its task was cancelled. With
    /// `keep_modified` the write counts as committed so downstream reads of
    /// the new version stay valid; without it the version history is rolled
    /// back.
    pub fn cancelled_access(
        &mut self,
        access: &EngineDataAccessId,
        keep_modified: bool,
    ) -> VersionOutcome {
        let mut outcome = VersionOutcome::default();
        match *access {
            EngineDataAccessId::R { read_version, .. } => {
                outcome.merge(self.version_read_cancelled(read_version));
            }
            EngineDataAccessId::W { write_version, .. } => {
                outcome.merge(self.version_write_cancelled(write_version));
            }
            EngineDataAccessId::RW {
                read_version,
                write_version,
                ..
            } => {
                if keep_modified {
                    outcome.merge(self.version_read_committed(read_version));
                    outcome.merge(self.try_remove_version(read_version));
                    outcome.merge(self.version_write_committed(write_version));
                } else {
                    outcome.merge(self.version_read_cancelled(read_version));
                    outcome.merge(self.version_write_cancelled(write_version));
                }
            }
        }
        outcome
    }

    /// Flags the version for removal and removes it when nothing holds it.
    pub fn try_remove_version(&mut self, version_id: VersionId) -> VersionOutcome {
        let marked = match self.versions.get_mut(&version_id) {
            Some(v) => v.mark_to_delete(),
            None => false,
        };
        if marked && self.deletion_blocks == 0 {
            let instance = self.remove_version(version_id);
            return VersionOutcome::removed(instance, self.versions.is_empty());
        }
        VersionOutcome::default()
    }

    /// A promised read was cancelled together with its task.
    pub fn version_read_cancelled(&mut self, version_id: VersionId) -> VersionOutcome {
        let unmark = match self.versions.get(&version_id) {
            Some(v) => !self.deleted && v.is_to_delete() && v.has_been_used(),
            None => {
                warn!(
                    "Read cancel on unknown version {} of data {}",
                    version_id, self.data_id
                );
                return VersionOutcome::default();
            }
        };
        if unmark {
            self.versions.get_mut(&version_id).unwrap().unmark_to_delete();
        }
        self.version_read_committed(version_id)
    }

    /// A promised write was cancelled; rolls the current version back to the
    /// most recent predecessor that was actually used.
    pub fn version_write_cancelled(&mut self, version_id: VersionId) -> VersionOutcome {
        let mut outcome = VersionOutcome::default();
        match self.versions.get_mut(&version_id) {
            Some(v) => {
                v.write_committed();
                v.cancel();
            }
            None => {
                warn!(
                    "Write cancel on unknown version {} of data {}",
                    version_id, self.data_id
                );
                return outcome;
            }
        }
        self.cancelled_versions.push(version_id);

        if version_id != self.current_version_id {
            return outcome;
        }

        // Walk backwards over cancelled generations. Versions that were
        // already physically retired are skipped as well, so the rollback
        // never lands on a version that no longer exists.
        let mut last_version = self.current_version_id;
        while last_version >= FIRST_VERSION_ID {
            if self.cancelled_versions.contains(&last_version) {
                outcome.merge(self.try_remove_version(last_version));
                last_version -= 1;
            } else if !self.versions.contains_key(&last_version) {
                last_version -= 1;
            } else {
                break;
            }
        }

        if last_version > FIRST_VERSION_ID {
            self.current_version_id = last_version;
            outcome.data_gone = false;
        } else if last_version == FIRST_VERSION_ID {
            let first_used = self.versions
                .get(&FIRST_VERSION_ID)
                .map(|v| v.has_been_used())
                .unwrap_or(false);
            if first_used {
                self.current_version_id = FIRST_VERSION_ID;
                outcome.data_gone = false;
            } else {
                outcome.data_gone = true;
            }
        } else {
            outcome.data_gone = true;
        }
        outcome
    }

    /// Replaces no-longer-valid versions of an access by their valid
    /// predecessors. Called before a parked main access is released.
    pub fn consolidate(&self, access: EngineDataAccessId) -> EngineDataAccessId {
        let valid = |version: VersionId| -> VersionId {
            let mut v = version;
            loop {
                match self.versions.get(&v) {
                    Some(ver) if ver.has_been_cancelled() => match ver.get_valid_predecessor() {
                        Some(p) => v = p,
                        None => return v,
                    },
                    _ => return v,
                }
            }
        };
        match access {
            EngineDataAccessId::R {
                data_id,
                read_version,
            } => EngineDataAccessId::R {
                data_id,
                read_version: valid(read_version),
            },
            EngineDataAccessId::W {
                data_id,
                write_version,
            } => EngineDataAccessId::W {
                data_id,
                write_version: valid(write_version),
            },
            EngineDataAccessId::RW {
                data_id,
                read_version,
                write_version,
            } => EngineDataAccessId::RW {
                data_id,
                read_version: valid(read_version),
                write_version: valid(write_version),
            },
        }
    }

    /// The current version holds (or will hold) an actual value.
    pub fn mark_current_used(&mut self) {
        self.current_version_mut().version_used();
    }

    /// A value read by the main code stays addressable on the master.
    pub fn value_on_main(&mut self, version_id: VersionId) {
        if let Some(v) = self.versions.get_mut(&version_id) {
            v.set_value_on_main();
        }
    }

    pub fn block_deletions(&mut self) {
        self.deletion_blocks += 1;
    }

    #[inline]
    pub fn has_deletion_blocks(&self) -> bool {
        self.deletion_blocks > 0
    }

    /// Lifts one deletion block; flushes the pending deletions on the last
    /// and sweeps the versions that became removable while the block held.
    pub fn unblock_deletions(&mut self) -> VersionOutcome {
        assert!(self.deletion_blocks > 0);
        self.deletion_blocks -= 1;
        let mut outcome = VersionOutcome::default();
        if self.deletion_blocks == 0 {
            let pending = ::std::mem::replace(&mut self.pending_deletions, Vec::new());
            for version_id in pending {
                outcome.merge(self.try_remove_version(version_id));
            }
            let sweep: Vec<VersionId> = {
                let removable = |id: &VersionId| self.is_removable(*id);
                self.versions.keys().cloned().filter(removable).collect()
            };
            for version_id in sweep {
                let instance = self.remove_version(version_id);
                outcome.merge(VersionOutcome::removed(instance, false));
            }
            outcome.data_gone = self.versions.is_empty();
        }
        outcome
    }

    /// Marks the whole datum deleted. Versions still in use stay flagged and
    /// go as their promised accesses resolve.
    pub fn delete(&mut self) -> VersionOutcome {
        self.deleted = true;
        let mut outcome = VersionOutcome::default();
        if self.deletion_blocks > 0 {
            let all: Vec<VersionId> = self.versions.keys().cloned().collect();
            self.pending_deletions.extend(all);
        } else {
            let all: Vec<VersionId> = self.versions.keys().cloned().collect();
            for version_id in all {
                outcome.merge(self.try_remove_version(version_id));
            }
            outcome.data_gone = self.versions.is_empty();
        }
        outcome
    }
}

impl DataInfoRef {
    pub fn new(data_id: DataId, app: AppId, params: DataDescription) -> Self {
        Self::wrap(DataInfo::new(data_id, app, params))
    }
}

impl ConsistencyCheck for DataInfoRef {
    fn check_consistency(&self) -> Result<()> {
        let d = self.get();
        if !d.deleted && !d.versions.contains_key(&d.current_version_id) {
            bail!(
                "current version {} of live data {} not in the version map",
                d.current_version_id,
                d.data_id
            );
        }
        for (id, v) in d.versions.iter() {
            if *id != v.get_version_id() {
                bail!("version map key mismatch in data {}", d.data_id);
            }
            if *id > d.current_version_id {
                bail!(
                    "version {} of data {} is newer than the current version {}",
                    id,
                    d.data_id,
                    d.current_version_id
                );
            }
            if v.pending_reads() < 0 || v.pending_writes() < 0 {
                bail!("negative pending counters on data {}", d.data_id);
            }
        }
        for cancelled in d.cancelled_versions.iter() {
            if let Some(v) = d.versions.get(cancelled) {
                if !v.has_been_cancelled() {
                    bail!(
                        "version {} of data {} recorded as cancelled but not flagged",
                        cancelled,
                        d.data_id
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::types::AccessMode;

    fn file_data(id: DataId) -> DataInfo {
        DataInfo::new(
            id,
            1,
            DataDescription::File {
                location: format!("/tmp/data{}", id),
            },
        )
    }

    #[test]
    fn versions_advance_on_writes_only() {
        let mut d = file_data(1);
        assert_eq!(d.get_current_version_id(), 1);
        d.will_access(AccessMode::R);
        assert_eq!(d.get_current_version_id(), 1);
        d.will_access(AccessMode::W);
        assert_eq!(d.get_current_version_id(), 2);
        d.will_access(AccessMode::RW);
        assert_eq!(d.get_current_version_id(), 3);
    }

    #[test]
    fn rw_access_reads_previous_version() {
        let mut d = file_data(1);
        d.will_access(AccessMode::W);
        let access = d.will_access(AccessMode::RW).unwrap();
        match access {
            EngineDataAccessId::RW {
                read_version,
                write_version,
                ..
            } => {
                assert_eq!(read_version, 2);
                assert_eq!(write_version, 3);
            }
            _ => panic!("expected a RW access"),
        }
    }

    #[test]
    fn committed_write_releases_predecessor() {
        let mut d = file_data(1);
        let access = d.will_access(AccessMode::W).unwrap();
        let outcome = d.committed_access(&access);
        // Version 1 was never used, it goes away with the commit of version 2
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].get_version_id(), 1);
        assert!(!outcome.data_gone);
        assert_eq!(d.version_count(), 1);
    }

    #[test]
    fn cancelled_access_keeping_the_write_stays_readable() {
        let mut d = file_data(1);
        d.will_access(AccessMode::R);
        let rw = d.will_access(AccessMode::RW).unwrap();
        let outcome = d.cancelled_access(&rw, true);
        assert!(!outcome.data_gone);
        // The written version survives as the current one
        assert_eq!(d.get_current_version_id(), 2);
        let next = d.will_access(AccessMode::R).unwrap();
        assert_eq!(next.read_instance().unwrap().get_version_id(), 2);
    }

    #[test]
    fn cancellation_rolls_back_to_used_version() {
        let mut d = file_data(1);
        d.will_access(AccessMode::R);
        let access = d.will_access(AccessMode::W).unwrap();
        assert_eq!(d.get_current_version_id(), 2);
        let outcome =
            d.version_write_cancelled(access.written_instance().unwrap().get_version_id());
        assert!(!outcome.data_gone);
        assert_eq!(d.get_current_version_id(), 1);
    }

    #[test]
    fn cancelling_every_version_kills_the_data() {
        let mut d = file_data(1);
        let access = d.will_access(AccessMode::W).unwrap();
        let outcome =
            d.version_write_cancelled(access.written_instance().unwrap().get_version_id());
        // Version 1 was never used, there is nothing to roll back to
        assert!(outcome.data_gone);
    }

    #[test]
    fn repeated_cancellations_walk_the_chain() {
        let mut d = file_data(1);
        d.will_access(AccessMode::R);
        let a2 = d.will_access(AccessMode::W).unwrap();
        let a3 = d.will_access(AccessMode::W).unwrap();
        d.version_write_cancelled(a3.written_instance().unwrap().get_version_id());
        let outcome = d.version_write_cancelled(a2.written_instance().unwrap().get_version_id());
        assert!(!outcome.data_gone);
        assert_eq!(d.get_current_version_id(), 1);
    }

    #[test]
    fn deletion_blocks_defer_removal() {
        let mut d = file_data(1);
        d.block_deletions();
        let outcome = d.delete();
        assert!(outcome.removed.is_empty());
        assert!(!outcome.data_gone);
        let outcome = d.unblock_deletions();
        assert_eq!(outcome.removed.len(), 1);
        assert!(outcome.data_gone);
    }

    #[test]
    fn stream_writes_do_not_advance_versions() {
        let mut d = DataInfo::new(5, 1, DataDescription::Stream { code: 17 });
        d.will_access(AccessMode::W);
        d.will_access(AccessMode::W);
        d.will_access(AccessMode::R);
        assert_eq!(d.get_current_version_id(), 1);
        assert!(d.will_access(AccessMode::RW).is_none());
    }

    #[test]
    fn rollback_skips_already_retired_versions() {
        let mut d = file_data(1);
        d.mark_current_used();
        // The main code still holds the first value
        d.value_on_main(1);
        // v2 produced and fully consumed; v3 written on top of it
        let a2 = d.will_access(AccessMode::W).unwrap();
        let a3 = d.will_access(AccessMode::W).unwrap();
        d.committed_access(&a2);
        let r = d.will_access(AccessMode::R).unwrap();
        assert_eq!(r.read_instance().unwrap().get_version_id(), 3);
        d.committed_access(&r);
        // v2 is physically gone by now; cancelling v3 must land on v1
        let outcome = d.version_write_cancelled(a3.written_instance().unwrap().get_version_id());
        assert!(!outcome.data_gone);
        assert_eq!(d.get_current_version_id(), 1);
    }

    #[test]
    fn consolidate_skips_cancelled_versions() {
        let mut d = file_data(1);
        d.will_access(AccessMode::R);
        let a2 = d.will_access(AccessMode::W).unwrap();
        let read_after = d.will_access(AccessMode::R).unwrap();
        d.version_write_cancelled(a2.written_instance().unwrap().get_version_id());
        let fixed = d.consolidate(read_after);
        assert_eq!(fixed.read_instance().unwrap().get_version_id(), 1);
    }
}
