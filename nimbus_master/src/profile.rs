use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde_json::{Map, Value};

use nimbus_core::errors::Result;

/// Execution statistics of one implementation. Unknown keys read from a
/// persisted profile are kept and written back untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionProfile {
    #[serde(default)]
    pub executions: u64,

    #[serde(default)]
    pub min_time: f64,

    #[serde(default)]
    pub avg_time: f64,

    #[serde(default)]
    pub max_time: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionProfile {
    pub fn new() -> Self {
        ExecutionProfile {
            executions: 0,
            min_time: 0.0,
            avg_time: 0.0,
            max_time: 0.0,
            extra: Map::new(),
        }
    }

    /// Folds one observed execution (milliseconds) into the aggregate.
    pub fn note_execution(&mut self, duration_ms: f64) {
        if self.executions == 0 {
            self.min_time = duration_ms;
            self.avg_time = duration_ms;
            self.max_time = duration_ms;
        } else {
            if duration_ms < self.min_time {
                self.min_time = duration_ms;
            }
            if duration_ms > self.max_time {
                self.max_time = duration_ms;
            }
            let n = self.executions as f64;
            self.avg_time = (self.avg_time * n + duration_ms) / (n + 1.0);
        }
        self.executions += 1;
    }

    /// Merges another aggregate into this one, weighting averages by their
    /// execution counts.
    pub fn accumulate(&mut self, other: &ExecutionProfile) {
        if other.executions == 0 {
            return;
        }
        if self.executions == 0 {
            self.min_time = other.min_time;
            self.max_time = other.max_time;
            self.avg_time = other.avg_time;
        } else {
            if other.min_time < self.min_time {
                self.min_time = other.min_time;
            }
            if other.max_time > self.max_time {
                self.max_time = other.max_time;
            }
            let mine = self.executions as f64;
            let theirs = other.executions as f64;
            self.avg_time = (self.avg_time * mine + other.avg_time * theirs) / (mine + theirs);
        }
        self.executions += other.executions;
        for (k, v) in other.extra.iter() {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        ExecutionProfile::new()
    }
}

/// Persisted execution state: one JSON object with `resources`,
/// `implementations` and `cloud` sections. The format is additive — keys
/// this runtime does not understand survive a load/dump cycle.
pub struct ProfileStore {
    root: Map<String, Value>,
}

impl ProfileStore {
    pub fn new() -> Self {
        let mut store = ProfileStore { root: Map::new() };
        store.init();
        store
    }

    fn init(&mut self) {
        for section in &["resources", "implementations", "cloud"] {
            if !self.root.contains_key(*section) {
                self.root
                    .insert(section.to_string(), Value::Object(Map::new()));
            }
        }
    }

    pub fn load(path: &Path) -> Self {
        let mut text = String::new();
        match File::open(path).and_then(|mut f| f.read_to_string(&mut text)) {
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Error loading profile from {:?}: {}. Using default values",
                    path, e
                );
                return ProfileStore::new();
            }
        }
        match ::serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => {
                let mut store = ProfileStore { root: map };
                store.init();
                store
            }
            _ => {
                warn!("Profile {:?} is not a JSON object. Using default values", path);
                ProfileStore::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!("Writing profile to {:?}", path);
        let mut root = self.root.clone();
        root.insert(
            "dumped_at".to_string(),
            Value::String(::chrono::Utc::now().to_rfc3339()),
        );
        let mut file = File::create(path)?;
        let text = ::serde_json::to_string(&Value::Object(root))?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn dump_string(&self) -> String {
        ::serde_json::to_string(&Value::Object(self.root.clone())).unwrap_or_default()
    }

    fn section_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        self.root
            .get_mut(name)
            .and_then(|v| v.as_object_mut())
            .expect("profile section missing")
    }

    fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.root.get(name).and_then(|v| v.as_object())
    }

    /// Aggregate for an implementation signature, across all resources.
    pub fn implementation_profile(&self, signature: &str) -> Option<ExecutionProfile> {
        self.section("implementations")
            .and_then(|m| m.get(signature))
            .and_then(|v| ::serde_json::from_value(v.clone()).ok())
    }

    /// Mean execution time of an implementation, if ever observed.
    pub fn implementation_mean(&self, signature: &str) -> Option<f64> {
        self.implementation_profile(signature)
            .and_then(|p| if p.executions > 0 { Some(p.avg_time) } else { None })
    }

    /// Folds a freshly observed aggregate into the global section of the
    /// given signature.
    pub fn accumulate_implementation(&mut self, signature: &str, profile: &ExecutionProfile) {
        let mut merged = self.implementation_profile(signature)
            .unwrap_or_else(ExecutionProfile::new);
        merged.accumulate(profile);
        let value = ::serde_json::to_value(&merged).unwrap();
        self.section_mut("implementations")
            .insert(signature.to_string(), value);
    }

    /// Per-resource profiles recorded under `resources.<name>`; keys other
    /// than `implementations` under a resource are preserved.
    pub fn update_resource(
        &mut self,
        name: &str,
        profiles: &::std::collections::HashMap<String, ExecutionProfile>,
    ) {
        let mut resource = match self.section("resources").and_then(|m| m.get(name)) {
            Some(&Value::Object(ref m)) => m.clone(),
            _ => Map::new(),
        };
        let mut impls = match resource.get("implementations") {
            Some(&Value::Object(ref m)) => m.clone(),
            _ => Map::new(),
        };
        for (signature, profile) in profiles.iter() {
            let mut merged: ExecutionProfile = impls
                .get(signature)
                .and_then(|v| ::serde_json::from_value(v.clone()).ok())
                .unwrap_or_else(ExecutionProfile::new);
            merged.accumulate(profile);
            impls.insert(
                signature.clone(),
                ::serde_json::to_value(&merged).unwrap(),
            );
        }
        resource.insert("implementations".to_string(), Value::Object(impls));
        self.section_mut("resources")
            .insert(name.to_string(), Value::Object(resource));
    }

    /// Seed profiles for a new resource scheduler from the persisted state.
    pub fn resource_defaults(
        &self,
        name: &str,
    ) -> ::std::collections::HashMap<String, ExecutionProfile> {
        let mut result = ::std::collections::HashMap::new();
        if let Some(&Value::Object(ref resource)) =
            self.section("resources").and_then(|m| m.get(name))
        {
            if let Some(&Value::Object(ref impls)) = resource.get("implementations") {
                for (signature, value) in impls.iter() {
                    if let Ok(profile) = ::serde_json::from_value(value.clone()) {
                        result.insert(signature.clone(), profile);
                    }
                }
            }
        }
        result
    }

    /// Elastic workers aggregate under `cloud.<provider>.<instance_type>`.
    pub fn update_cloud_instance(
        &mut self,
        provider: &str,
        instance_type: &str,
        profiles: &::std::collections::HashMap<String, ExecutionProfile>,
    ) {
        let mut provider_map = match self.section("cloud").and_then(|m| m.get(provider)) {
            Some(&Value::Object(ref m)) => m.clone(),
            _ => Map::new(),
        };
        let mut instance = match provider_map.get(instance_type) {
            Some(&Value::Object(ref m)) => m.clone(),
            _ => Map::new(),
        };
        for (signature, profile) in profiles.iter() {
            let mut merged: ExecutionProfile = instance
                .get(signature)
                .and_then(|v| ::serde_json::from_value(v.clone()).ok())
                .unwrap_or_else(ExecutionProfile::new);
            merged.accumulate(profile);
            instance.insert(
                signature.clone(),
                ::serde_json::to_value(&merged).unwrap(),
            );
        }
        provider_map.insert(instance_type.to_string(), Value::Object(instance));
        self.section_mut("cloud")
            .insert(provider.to_string(), Value::Object(provider_map));
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        ProfileStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_fold_correctly() {
        let mut p = ExecutionProfile::new();
        p.note_execution(10.0);
        p.note_execution(30.0);
        assert_eq!(p.executions, 2);
        assert_eq!(p.min_time, 10.0);
        assert_eq!(p.max_time, 30.0);
        assert_eq!(p.avg_time, 20.0);

        let mut q = ExecutionProfile::new();
        q.note_execution(40.0);
        p.accumulate(&q);
        assert_eq!(p.executions, 3);
        assert_eq!(p.max_time, 40.0);
        assert!((p.avg_time - 80.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_keys_survive_roundtrip() {
        let text = r#"{
            "resources": {"w0": {"implementations": {}, "vendor": "acme"}},
            "implementations": {"inc": {"executions": 2, "min_time": 1.0,
                                         "avg_time": 2.0, "max_time": 3.0,
                                         "energy": 42}},
            "cloud": {},
            "future_section": {"x": 1}
        }"#;
        let value: Value = ::serde_json::from_str(text).unwrap();
        let mut store = ProfileStore {
            root: match value {
                Value::Object(m) => m,
                _ => unreachable!(),
            },
        };
        store.init();

        // Touch the known aggregate
        let mut p = ExecutionProfile::new();
        p.note_execution(5.0);
        store.accumulate_implementation("inc", &p);

        let dumped: Value = ::serde_json::from_str(&store.dump_string()).unwrap();
        assert_eq!(dumped["future_section"]["x"], Value::from(1));
        assert_eq!(dumped["resources"]["w0"]["vendor"], Value::from("acme"));
        assert_eq!(dumped["implementations"]["inc"]["energy"], Value::from(42));
        assert_eq!(
            dumped["implementations"]["inc"]["executions"],
            Value::from(3)
        );
    }
}
