use nimbus_core::types::{DataId, DataInstanceId, VersionId};

/// One immutable generation of a datum.
///
/// A version is alive while reads or writes are still promised on it. The
/// `valid_predecessor` chain skips cancelled generations so that a rollback
/// always lands on a version that was actually produced.
#[derive(Debug)]
pub struct DataVersion {
    data_id: DataId,
    version_id: VersionId,
    valid_predecessor: Option<VersionId>,

    readers: i32,
    writers: i32,

    been_used: bool,
    to_delete: bool,
    cancelled: bool,

    /// The main code holds a copy of this version; keep it addressable.
    value_on_main: bool,
}

impl DataVersion {
    pub fn new(data_id: DataId, version_id: VersionId, valid_predecessor: Option<VersionId>) -> Self {
        DataVersion {
            data_id,
            version_id,
            valid_predecessor,
            readers: 0,
            writers: 0,
            been_used: false,
            to_delete: false,
            cancelled: false,
            value_on_main: false,
        }
    }

    #[inline]
    pub fn get_version_id(&self) -> VersionId {
        self.version_id
    }

    #[inline]
    pub fn instance(&self) -> DataInstanceId {
        DataInstanceId::new(self.data_id, self.version_id)
    }

    #[inline]
    pub fn get_valid_predecessor(&self) -> Option<VersionId> {
        self.valid_predecessor
    }

    pub fn will_be_read(&mut self) {
        self.readers += 1;
    }

    pub fn will_be_written(&mut self) {
        self.writers += 1;
    }

    pub fn version_used(&mut self) {
        self.been_used = true;
    }

    #[inline]
    pub fn has_been_used(&self) -> bool {
        self.been_used
    }

    pub fn read_committed(&mut self) {
        assert!(self.readers > 0, "read commit without promised read");
        self.readers -= 1;
    }

    pub fn write_committed(&mut self) {
        assert!(self.writers > 0, "write commit without promised write");
        self.writers -= 1;
    }

    #[inline]
    pub fn pending_reads(&self) -> i32 {
        self.readers
    }

    #[inline]
    pub fn pending_writes(&self) -> i32 {
        self.writers
    }

    /// No reads or writes remain promised on the version.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }

    /// Flag the version for removal. Returns whether it can go right now.
    pub fn mark_to_delete(&mut self) -> bool {
        self.to_delete = true;
        self.is_free() && !self.value_on_main
    }

    pub fn unmark_to_delete(&mut self) {
        self.to_delete = false;
    }

    #[inline]
    pub fn is_to_delete(&self) -> bool {
        self.to_delete
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    #[inline]
    pub fn has_been_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_value_on_main(&mut self) {
        self.value_on_main = true;
    }

    #[inline]
    pub fn is_value_on_main(&self) -> bool {
        self.value_on_main
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_after_balanced_commits() {
        let mut v = DataVersion::new(1, 1, None);
        v.will_be_read();
        v.will_be_read();
        v.will_be_written();
        assert!(!v.is_free());
        v.read_committed();
        v.read_committed();
        v.write_committed();
        assert!(v.is_free());
    }

    #[test]
    fn mark_to_delete_respects_pending_work() {
        let mut v = DataVersion::new(1, 2, Some(1));
        v.will_be_read();
        assert!(!v.mark_to_delete());
        v.read_committed();
        assert!(v.is_to_delete());
        assert!(v.is_free());
    }

    #[test]
    fn value_on_main_pins_version() {
        let mut v = DataVersion::new(1, 1, None);
        v.set_value_on_main();
        assert!(!v.mark_to_delete());
    }
}
