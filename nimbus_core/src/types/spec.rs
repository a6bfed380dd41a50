use std::collections::HashMap;

use types::{AccessMode, CoreId, DataDescription, ImplId, OnFailure, StdIo, UserAttrs};
use types::resources::ImplRequirements;

/// One parameter of a task invocation.
///
/// `Basic` parameters carry plain values and never produce dependencies.
/// `Dependency` parameters access a datum; `Collective` parameters group an
/// ordered list of child parameters under one collection datum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ParamSpec {
    Basic {
        #[serde(skip_serializing_if = "String::is_empty")]
        #[serde(default)]
        name: String,
        value: ::serde_json::Value,
    },
    Dependency {
        #[serde(skip_serializing_if = "String::is_empty")]
        #[serde(default)]
        name: String,

        #[serde(skip_serializing_if = "String::is_empty")]
        #[serde(default)]
        prefix: String,

        mode: AccessMode,

        #[serde(default)]
        stdio: StdIo,

        data: DataDescription,
    },
    Collective {
        #[serde(skip_serializing_if = "String::is_empty")]
        #[serde(default)]
        name: String,

        mode: AccessMode,

        data: DataDescription,

        elements: Vec<ParamSpec>,
    },
}

impl ParamSpec {
    /// Shorthand for an unnamed dependency parameter.
    pub fn dependency(mode: AccessMode, data: DataDescription) -> ParamSpec {
        ParamSpec::Dependency {
            name: String::new(),
            prefix: String::new(),
            mode,
            stdio: StdIo::Unspecified,
            data,
        }
    }

    pub fn is_potential_dependency(&self) -> bool {
        match *self {
            ParamSpec::Basic { .. } => false,
            _ => true,
        }
    }
}

/// The executable variants a task may run as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ImplKind {
    Method {
        class: String,
        method: String,
    },
    Binary {
        binary: String,
    },
    Mpi {
        binary: String,
        runner: String,
        processes: u32,
    },
    Http {
        method: String,
        service: String,
    },
}

/// One concrete implementation of a core element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImplementationSpec {
    pub impl_id: ImplId,

    /// Unique signature, also the key of the execution profile store.
    pub signature: String,

    pub kind: ImplKind,

    pub requirements: ImplRequirements,
}

impl ImplementationSpec {
    pub fn method(impl_id: ImplId, signature: &str, cpus: u32) -> Self {
        ImplementationSpec {
            impl_id,
            signature: signature.to_string(),
            kind: ImplKind::Method {
                class: String::new(),
                method: signature.to_string(),
            },
            requirements: ImplRequirements::Method(
                ::types::resources::MethodResourceDescription::new(cpus),
            ),
        }
    }
}

/// Description of a submitted task: the core element it runs, its candidate
/// implementations, parameters and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub core_id: CoreId,

    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub label: String,

    pub implementations: Vec<ImplementationSpec>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub params: Vec<ParamSpec>,

    #[serde(default)]
    pub on_failure: OnFailure,

    #[serde(default)]
    pub priority: bool,

    /// Named groups the task joins besides the ones currently open.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    #[serde(default)]
    pub user: UserAttrs,
}

impl TaskSpec {
    pub fn new(core_id: CoreId, label: &str, implementations: Vec<ImplementationSpec>) -> Self {
        TaskSpec {
            core_id,
            label: label.to_string(),
            implementations,
            params: Vec::new(),
            on_failure: OnFailure::default(),
            priority: false,
            groups: Vec::new(),
            user: HashMap::new(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::AccessMode;

    #[test]
    fn spec_roundtrip_preserves_params() {
        let spec = TaskSpec::new(0, "inc", vec![ImplementationSpec::method(0, "inc", 1)])
            .with_param(ParamSpec::dependency(
                AccessMode::RW,
                DataDescription::File {
                    location: "/tmp/x".to_string(),
                },
            ));
        let text = ::serde_json::to_string(&spec).unwrap();
        let back: TaskSpec = ::serde_json::from_str(&text).unwrap();
        assert_eq!(spec, back);
    }
}
