use std::collections::{HashMap, HashSet};

use nimbus_core::types::WorkerId;

/// Where the physical bytes of every live renaming are located.
///
/// Both runtime loops keep their own ledger, fed by the job callbacks they
/// observe; renamings disappear when the version bookkeeping retires them.
#[derive(Debug, Default)]
pub struct TransferLedger {
    locations: HashMap<String, HashSet<WorkerId>>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_location(&mut self, renaming: &str, worker: WorkerId) {
        self.locations
            .entry(renaming.to_string())
            .or_insert_with(HashSet::new)
            .insert(worker);
    }

    pub fn exists(&self, renaming: &str) -> bool {
        self.locations.contains_key(renaming)
    }

    pub fn locations(&self, renaming: &str) -> Vec<WorkerId> {
        self.locations
            .get(renaming)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_else(Vec::new)
    }

    /// How many of the given renamings are not present on the worker. Used
    /// as the data-locality cost of a placement.
    pub fn missing_on(&self, worker: &str, renamings: &[String]) -> usize {
        renamings
            .iter()
            .filter(|r| match self.locations.get(*r) {
                Some(set) => !set.contains(worker),
                None => true,
            })
            .count()
    }

    pub fn remove(&mut self, renaming: &str) -> bool {
        self.locations.remove(renaming).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locality_counts_missing_inputs() {
        let mut ledger = TransferLedger::new();
        ledger.register_location("d1v1", "w0".to_string());
        ledger.register_location("d2v1", "w1".to_string());
        let inputs = vec!["d1v1".to_string(), "d2v1".to_string(), "d3v1".to_string()];
        assert_eq!(ledger.missing_on("w0", &inputs), 2);
        assert_eq!(ledger.missing_on("w1", &inputs), 2);
    }
}
