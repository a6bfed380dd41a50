use nimbus_core::types::{DataId, DataInstanceId, VersionId};

/// Handle naming one registered access to a datum.
///
/// Reading accesses carry the version they read, writing accesses the
/// version they produce; a read-write access carries both. The handle is
/// plain data so it can cross thread boundaries; committing or cancelling
/// it goes through the access processor that owns the `DataInfo`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EngineDataAccessId {
    R {
        data_id: DataId,
        read_version: VersionId,
    },
    W {
        data_id: DataId,
        write_version: VersionId,
    },
    RW {
        data_id: DataId,
        read_version: VersionId,
        write_version: VersionId,
    },
}

impl EngineDataAccessId {
    pub fn get_data_id(&self) -> DataId {
        match *self {
            EngineDataAccessId::R { data_id, .. }
            | EngineDataAccessId::W { data_id, .. }
            | EngineDataAccessId::RW { data_id, .. } => data_id,
        }
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        match *self {
            EngineDataAccessId::W { .. } => false,
            _ => true,
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        match *self {
            EngineDataAccessId::R { .. } => false,
            _ => true,
        }
    }

    pub fn read_instance(&self) -> Option<DataInstanceId> {
        match *self {
            EngineDataAccessId::R {
                data_id,
                read_version,
            }
            | EngineDataAccessId::RW {
                data_id,
                read_version,
                ..
            } => Some(DataInstanceId::new(data_id, read_version)),
            EngineDataAccessId::W { .. } => None,
        }
    }

    pub fn written_instance(&self) -> Option<DataInstanceId> {
        match *self {
            EngineDataAccessId::W {
                data_id,
                write_version,
            }
            | EngineDataAccessId::RW {
                data_id,
                write_version,
                ..
            } => Some(DataInstanceId::new(data_id, write_version)),
            EngineDataAccessId::R { .. } => None,
        }
    }

    pub fn to_debug_string(&self) -> String {
        match *self {
            EngineDataAccessId::R {
                data_id,
                read_version,
            } => format!("Access R d{}v{}", data_id, read_version),
            EngineDataAccessId::W {
                data_id,
                write_version,
            } => format!("Access W d{}v{}", data_id, write_version),
            EngineDataAccessId::RW {
                data_id,
                read_version,
                write_version,
            } => format!("Access RW d{}v{} -> d{}v{}", data_id, read_version, data_id, write_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_follow_direction() {
        let rw = EngineDataAccessId::RW {
            data_id: 4,
            read_version: 1,
            write_version: 2,
        };
        assert!(rw.is_read() && rw.is_write());
        assert_eq!(rw.read_instance().unwrap().get_renaming(), "d4v1");
        assert_eq!(rw.written_instance().unwrap().get_renaming(), "d4v2");

        let w = EngineDataAccessId::W {
            data_id: 4,
            write_version: 3,
        };
        assert!(w.read_instance().is_none());
    }
}
