pub mod cloud;

use std::fmt;

use nimbus_core::types::{HttpResourceDescription, ImplRequirements, MethodResourceDescription,
                         WorkerDescription, WorkerId};

/// Dynamic occupation of a worker: how much of its static capacity is
/// currently reserved by running jobs.
#[derive(Debug, Clone)]
enum DynamicUsage {
    Method(MethodResourceDescription),
    Http { connections: u32 },
}

/// A worker with its static description and its dynamic profile. HTTP
/// workers track a connection count instead of CPUs.
#[derive(Debug, Clone)]
pub struct Worker {
    name: WorkerId,
    description: WorkerDescription,
    used: DynamicUsage,
}

impl Worker {
    pub fn new(name: WorkerId, description: WorkerDescription) -> Self {
        let used = match description {
            WorkerDescription::Method(_) => DynamicUsage::Method(MethodResourceDescription {
                cpus: 0,
                gpus: 0,
                memory_mb: 0,
                storage_mb: 0,
                software: Vec::new(),
            }),
            WorkerDescription::Http(_) => DynamicUsage::Http { connections: 0 },
        };
        Worker {
            name,
            description,
            used,
        }
    }

    #[inline]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn get_description(&self) -> &WorkerDescription {
        &self.description
    }

    /// Static match: the worker could run the implementation when idle.
    pub fn can_host(&self, requirements: &ImplRequirements) -> bool {
        requirements.can_be_hosted_by(&self.description)
    }

    /// Dynamic match: enough capacity is free right now.
    pub fn can_host_dynamic(&self, requirements: &ImplRequirements) -> bool {
        if !self.can_host(requirements) {
            return false;
        }
        match (requirements, &self.description, &self.used) {
            (
                &ImplRequirements::Method(ref req),
                &WorkerDescription::Method(ref cap),
                &DynamicUsage::Method(ref used),
            ) => {
                req.cpus + used.cpus <= cap.cpus && req.gpus + used.gpus <= cap.gpus
                    && req.memory_mb + used.memory_mb <= cap.memory_mb
                    && req.storage_mb + used.storage_mb <= cap.storage_mb
            }
            (
                &ImplRequirements::Http { connections, .. },
                &WorkerDescription::Http(ref cap),
                &DynamicUsage::Http {
                    connections: in_use,
                },
            ) => connections + in_use <= cap.connections,
            _ => false,
        }
    }

    /// Reserve capacity for a launching job.
    pub fn reserve(&mut self, requirements: &ImplRequirements) {
        assert!(self.can_host_dynamic(requirements));
        match (requirements, &mut self.used) {
            (&ImplRequirements::Method(ref req), &mut DynamicUsage::Method(ref mut used)) => {
                used.add(req);
            }
            (
                &ImplRequirements::Http { connections, .. },
                &mut DynamicUsage::Http {
                    connections: ref mut in_use,
                },
            ) => {
                *in_use += connections;
            }
            _ => unreachable!("reservation on a mismatched worker"),
        }
    }

    /// Release the capacity of a finished job.
    pub fn release(&mut self, requirements: &ImplRequirements) {
        match (requirements, &mut self.used) {
            (&ImplRequirements::Method(ref req), &mut DynamicUsage::Method(ref mut used)) => {
                used.remove(req);
            }
            (
                &ImplRequirements::Http { connections, .. },
                &mut DynamicUsage::Http {
                    connections: ref mut in_use,
                },
            ) => {
                assert!(*in_use >= connections);
                *in_use -= connections;
            }
            _ => unreachable!("release on a mismatched worker"),
        }
    }

    /// Whether anything at all could still be placed on the worker.
    pub fn can_run_something(&self) -> bool {
        match (&self.description, &self.used) {
            (&WorkerDescription::Method(ref cap), &DynamicUsage::Method(ref used)) => {
                used.cpus < cap.cpus
            }
            (
                &WorkerDescription::Http(ref cap),
                &DynamicUsage::Http {
                    connections: in_use,
                },
            ) => in_use < cap.connections,
            _ => false,
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Worker {}", self.name)
    }
}

pub fn method_worker(name: &str, cpus: u32) -> Worker {
    Worker::new(
        name.to_string(),
        WorkerDescription::Method(MethodResourceDescription::new(cpus)),
    )
}

pub fn http_worker(name: &str, connections: u32, base_url: &str, services: Vec<String>) -> Worker {
    Worker::new(
        name.to_string(),
        WorkerDescription::Http(HttpResourceDescription {
            connections,
            base_url: base_url.to_string(),
            services,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_req(cpus: u32) -> ImplRequirements {
        ImplRequirements::Method(MethodResourceDescription::new(cpus))
    }

    #[test]
    fn dynamic_capacity_tracks_reservations() {
        let mut w = method_worker("w0", 4);
        let req = cpu_req(3);
        assert!(w.can_host_dynamic(&req));
        w.reserve(&req);
        assert!(!w.can_host_dynamic(&req));
        assert!(w.can_host_dynamic(&cpu_req(1)));
        w.release(&req);
        assert!(w.can_host_dynamic(&req));
    }

    #[test]
    fn static_match_survives_saturation() {
        let mut w = method_worker("w0", 2);
        let req = cpu_req(2);
        w.reserve(&req);
        // still a static match, just busy
        assert!(w.can_host(&req));
        assert!(!w.can_host_dynamic(&req));
        assert!(!w.can_run_something());
    }

    #[test]
    fn http_workers_count_connections() {
        let mut w = http_worker("svc", 2, "http://svc:80", vec!["echo".to_string()]);
        let req = ImplRequirements::Http {
            connections: 1,
            service: "echo".to_string(),
        };
        w.reserve(&req);
        w.reserve(&req);
        assert!(!w.can_host_dynamic(&req));
        w.release(&req);
        assert!(w.can_host_dynamic(&req));
    }
}
