use std::fmt;

/// Generic ID type. Negative values have special meaning.
pub type Id = i32;

/// Identifier of a logical datum, unique within a runtime.
pub type DataId = Id;

/// Identifier of one version of a datum, strictly increasing per datum.
pub type VersionId = Id;

/// Identifier of a task, unique within a runtime.
pub type TaskId = Id;

/// Identifier of a job (one execution attempt of a task on a worker).
pub type JobId = Id;

/// Identifier of a core element (the abstract operation a task runs).
pub type CoreId = Id;

/// Identifier of one implementation of a core element.
pub type ImplId = Id;

/// Application identifier, randomly drawn from the whole 64-bit space.
pub type AppId = u64;

/// Workers are identified by their registration name.
pub type WorkerId = String;

/// A concrete version of a datum: the pair (data, version).
///
/// Its canonical string form (the *renaming*) is the name under which the
/// physical bytes are addressed in the data-transfer layer.
#[derive(Copy, Clone, Debug, Ord, Eq, PartialEq, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DataInstanceId {
    data_id: DataId,
    version_id: VersionId,
}

impl DataInstanceId {
    #[inline]
    pub fn new(data_id: DataId, version_id: VersionId) -> Self {
        DataInstanceId {
            data_id,
            version_id,
        }
    }

    #[inline]
    pub fn get_data_id(&self) -> DataId {
        self.data_id
    }

    #[inline]
    pub fn get_version_id(&self) -> VersionId {
        self.version_id
    }

    pub fn get_renaming(&self) -> String {
        format!("d{}v{}", self.data_id, self.version_id)
    }
}

impl fmt::Display for DataInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "d{}v{}", self.data_id, self.version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renaming_format() {
        let id = DataInstanceId::new(7, 3);
        assert_eq!(id.get_renaming(), "d7v3");
        assert_eq!(format!("{}", id), "d7v3");
    }

    #[test]
    fn instance_ordering_follows_versions() {
        let older = DataInstanceId::new(2, 1);
        let newer = DataInstanceId::new(2, 4);
        assert!(older < newer);
    }
}
