use std::collections::HashMap;

use nimbus_core::errors::Result;
use nimbus_core::types::WorkerDescription;

/// Hook into an elastic infrastructure: asked for capacity by instance
/// type, hands back the description of the machine it booted.
pub trait CloudProvider: Send {
    fn reserve_instance(&mut self, instance_type: &str) -> Result<WorkerDescription>;
    fn release_instance(&mut self, instance_type: &str) -> Result<()>;
}

/// Registry of cloud providers. Reservations name the provider and the
/// instance type; profiles of elastic workers aggregate under
/// `cloud.<provider>.<instance_type>` in the persisted profile.
pub struct CloudManager {
    providers: HashMap<String, Box<CloudProvider>>,
}

impl CloudManager {
    pub fn new() -> Self {
        CloudManager {
            providers: HashMap::new(),
        }
    }

    pub fn register_provider(&mut self, name: &str, provider: Box<CloudProvider>) {
        info!("Registering cloud provider {}", name);
        self.providers.insert(name.to_string(), provider);
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn reserve(&mut self, provider: &str, instance_type: &str) -> Result<WorkerDescription> {
        match self.providers.get_mut(provider) {
            Some(p) => p.reserve_instance(instance_type),
            None => bail!("unknown cloud provider {:?}", provider),
        }
    }

    pub fn release(&mut self, provider: &str, instance_type: &str) -> Result<()> {
        match self.providers.get_mut(provider) {
            Some(p) => p.release_instance(instance_type),
            None => bail!("unknown cloud provider {:?}", provider),
        }
    }
}

impl Default for CloudManager {
    fn default() -> Self {
        CloudManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::types::MethodResourceDescription;

    struct StubProvider {
        booted: u32,
    }

    impl CloudProvider for StubProvider {
        fn reserve_instance(&mut self, instance_type: &str) -> Result<WorkerDescription> {
            self.booted += 1;
            let cpus = if instance_type == "large" { 8 } else { 2 };
            Ok(WorkerDescription::Method(MethodResourceDescription::new(
                cpus,
            )))
        }

        fn release_instance(&mut self, _instance_type: &str) -> Result<()> {
            self.booted -= 1;
            Ok(())
        }
    }

    #[test]
    fn reservations_go_through_the_named_provider() {
        let mut manager = CloudManager::new();
        manager.register_provider("stub", Box::new(StubProvider { booted: 0 }));
        let desc = manager.reserve("stub", "large").unwrap();
        match desc {
            WorkerDescription::Method(ref d) => assert_eq!(d.cpus, 8),
            _ => panic!("expected a method worker"),
        }
        manager.release("stub", "large").unwrap();
        assert!(manager.reserve("missing", "large").is_err());
    }
}
