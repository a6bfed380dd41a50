use nimbus_core::types::{AccessMode, AppId, DataDescription};

/// Key under which a datum registers on its owning application.
///
/// Objects, streams and binding objects share the hashcode space, exactly
/// as the caller's address space sees them.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataKey {
    Location(String),
    Code(i32),
    Collection(String),
    DictCollection(String),
}

impl DataKey {
    pub fn of(data: &DataDescription) -> DataKey {
        match *data {
            DataDescription::File { ref location } => DataKey::Location(location.clone()),
            DataDescription::Object { code }
            | DataDescription::BindingObject { code, .. }
            | DataDescription::Stream { code } => DataKey::Code(code),
            DataDescription::Collection { ref id } => DataKey::Collection(id.clone()),
            DataDescription::DictCollection { ref id } => DataKey::DictCollection(id.clone()),
        }
    }
}

/// One declared access: which application touches which datum and how.
#[derive(Clone, Debug)]
pub struct AccessParams {
    pub app: AppId,
    pub mode: AccessMode,
    pub data: DataDescription,
    /// A main-code read keeps its copy of the value on the master.
    pub result_remains_on_main: bool,
}

impl AccessParams {
    pub fn new(app: AppId, mode: AccessMode, data: DataDescription) -> Self {
        AccessParams {
            app,
            mode,
            data,
            result_remains_on_main: false,
        }
    }

    pub fn main_access(app: AppId, mode: AccessMode, data: DataDescription) -> Self {
        AccessParams {
            app,
            mode,
            data,
            result_remains_on_main: mode.is_read(),
        }
    }

    pub fn key(&self) -> DataKey {
        DataKey::of(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_and_stream_share_the_code_space() {
        let object = DataDescription::Object { code: 9 };
        let stream = DataDescription::Stream { code: 9 };
        assert_eq!(DataKey::of(&object), DataKey::of(&stream));
    }

    #[test]
    fn collections_and_dictionaries_do_not_collide() {
        let c = DataDescription::Collection {
            id: "c1".to_string(),
        };
        let d = DataDescription::DictCollection {
            id: "c1".to_string(),
        };
        assert_ne!(DataKey::of(&c), DataKey::of(&d));
    }
}
