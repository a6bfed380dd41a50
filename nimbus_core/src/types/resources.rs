/// Static capacity of a method (compute) worker.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MethodResourceDescription {
    #[serde(default = "default_cpus")]
    pub cpus: u32,

    #[serde(default)]
    pub gpus: u32,

    #[serde(default)]
    pub memory_mb: u32,

    #[serde(default)]
    pub storage_mb: u32,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub software: Vec<String>,
}

#[inline]
fn default_cpus() -> u32 {
    1
}

impl ::std::default::Default for MethodResourceDescription {
    fn default() -> Self {
        MethodResourceDescription {
            cpus: default_cpus(),
            gpus: 0,
            memory_mb: 0,
            storage_mb: 0,
            software: Vec::new(),
        }
    }
}

impl MethodResourceDescription {
    pub fn new(cpus: u32) -> Self {
        MethodResourceDescription {
            cpus,
            ..Default::default()
        }
    }

    pub fn add(&mut self, other: &MethodResourceDescription) {
        self.cpus += other.cpus;
        self.gpus += other.gpus;
        self.memory_mb += other.memory_mb;
        self.storage_mb += other.storage_mb;
    }

    pub fn remove(&mut self, other: &MethodResourceDescription) {
        assert!(other.is_subset_of(self));
        self.cpus -= other.cpus;
        self.gpus -= other.gpus;
        self.memory_mb -= other.memory_mb;
        self.storage_mb -= other.storage_mb;
    }

    /// Counts only; software is a static property checked separately.
    #[inline]
    pub fn is_subset_of(&self, other: &MethodResourceDescription) -> bool {
        self.cpus <= other.cpus && self.gpus <= other.gpus && self.memory_mb <= other.memory_mb
            && self.storage_mb <= other.storage_mb
    }

    pub fn provides_software(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.software.contains(s))
    }
}

/// Static capacity of an HTTP worker: it hosts services and bounds the
/// number of simultaneous requests instead of tracking CPUs.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HttpResourceDescription {
    pub connections: u32,

    pub base_url: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub services: Vec<String>,
}

/// Static description of a worker.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerDescription {
    Method(MethodResourceDescription),
    Http(HttpResourceDescription),
}

/// Capacity an implementation needs from its hosting worker.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImplRequirements {
    Method(MethodResourceDescription),
    Http { connections: u32, service: String },
}

impl ImplRequirements {
    /// Static match: can a worker of this description ever host the
    /// implementation.
    pub fn can_be_hosted_by(&self, worker: &WorkerDescription) -> bool {
        match (self, worker) {
            (&ImplRequirements::Method(ref req), &WorkerDescription::Method(ref cap)) => {
                req.is_subset_of(cap) && cap.provides_software(&req.software)
            }
            (
                &ImplRequirements::Http {
                    connections,
                    ref service,
                },
                &WorkerDescription::Http(ref cap),
            ) => connections <= cap.connections && cap.services.contains(service),
            _ => false,
        }
    }
}
