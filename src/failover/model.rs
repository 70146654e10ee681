use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverType {
    Live,
    Test,
}

impl FailoverType {
    pub fn as_str(self) -> &'static str {
        match self {
            FailoverType::Live => "live",
            FailoverType::Test => "test",
        }
    }

    pub fn power_off_source(self) -> bool {
        matches!(self, FailoverType::Live)
    }

    pub fn perform_final_sync(self) -> bool {
        matches!(self, FailoverType::Live)
    }

    pub fn context_status(self) -> &'static str {
        match self {
            FailoverType::Live => "failed_over_live",
            FailoverType::Test => "failed_over_test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStrategy {
    Production,
    Isolated,
    Custom,
}

impl NetworkStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkStrategy::Production => "production",
            NetworkStrategy::Isolated => "isolated",
            NetworkStrategy::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotType {
    None,
    MultiVolume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMapping {
    pub source_network_id: String,
    pub destination_network_id: String,
    /// "production" | "isolated" — classifies this single mapping for strategy derivation.
    pub mapping_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    pub vm_context_id: String,
    pub failover_type: FailoverType,
    pub network_strategy: Option<NetworkStrategy>,
    pub network_mappings: Vec<NetworkMapping>,
    pub snapshot_type: SnapshotType,
    pub skip_validation: bool,
    pub skip_virtio: bool,
    pub requested_by: String,
}

/// Explicit override wins; otherwise mappings are classified; no mappings
/// falls back to a default per failover type (spec §4.6).
pub fn derive_network_strategy(
    explicit: Option<NetworkStrategy>,
    mappings: &[NetworkMapping],
    failover_type: FailoverType,
) -> NetworkStrategy {
    if let Some(strategy) = explicit {
        return strategy;
    }
    if mappings.is_empty() {
        return match failover_type {
            FailoverType::Live => NetworkStrategy::Production,
            FailoverType::Test => NetworkStrategy::Isolated,
        };
    }
    let all_isolated = mappings.iter().all(|m| m.mapping_type == "isolated");
    let all_production = mappings.iter().all(|m| m.mapping_type == "production");
    if all_isolated {
        NetworkStrategy::Isolated
    } else if all_production {
        NetworkStrategy::Production
    } else {
        NetworkStrategy::Custom
    }
}

pub fn destination_vm_name(source_name: &str, failover_type: FailoverType, unix_now: i64) -> String {
    match failover_type {
        FailoverType::Live => source_name.to_string(),
        FailoverType::Test => format!("{}-test-{}", source_name, unix_now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(kind: &str) -> NetworkMapping {
        NetworkMapping {
            source_network_id: "src-net".to_string(),
            destination_network_id: "dst-net".to_string(),
            mapping_type: kind.to_string(),
        }
    }

    #[test]
    fn explicit_strategy_always_wins() {
        let strategy = derive_network_strategy(
            Some(NetworkStrategy::Custom),
            &[mapping("production")],
            FailoverType::Live,
        );
        assert_eq!(strategy, NetworkStrategy::Custom);
    }

    #[test]
    fn no_mappings_defaults_by_type() {
        assert_eq!(
            derive_network_strategy(None, &[], FailoverType::Live),
            NetworkStrategy::Production
        );
        assert_eq!(
            derive_network_strategy(None, &[], FailoverType::Test),
            NetworkStrategy::Isolated
        );
    }

    #[test]
    fn mixed_mappings_are_custom() {
        let mappings = vec![mapping("production"), mapping("isolated")];
        assert_eq!(
            derive_network_strategy(None, &mappings, FailoverType::Live),
            NetworkStrategy::Custom
        );
    }

    #[test]
    fn destination_name_adds_test_suffix() {
        assert_eq!(destination_vm_name("pgtest1", FailoverType::Live, 1234), "pgtest1");
        assert_eq!(
            destination_vm_name("pgtest1", FailoverType::Test, 1234),
            "pgtest1-test-1234"
        );
    }
}
