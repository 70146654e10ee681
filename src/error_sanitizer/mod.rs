use serde::{Deserialize, Serialize};

/// Category taxonomy from spec §7, narrowed to the subset the Sanitizer
/// itself assigns (network/auth/resource/configuration/internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Auth,
    Resource,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Operator-facing summary of a failed step. Raw technical detail never
/// appears here; it stays in Job Log, reachable by correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedError {
    pub user_message: String,
    pub category: Category,
    pub severity: Severity,
    pub actionable_steps: Vec<String>,
}

/// Classifies a raw error message surfaced by `step_name` into an
/// operator-facing summary. Matching is keyword-based against the error's
/// `Display` text — good enough for the taxonomy in spec §7, which is
/// deliberately coarse.
pub fn sanitize(step_name: &str, err: &str) -> SanitizedError {
    let lower = err.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("connection refused") || lower.contains("connection reset") {
        return SanitizedError {
            user_message: format!("{} could not reach the remote host in time.", step_name),
            category: Category::Network,
            severity: Severity::Error,
            actionable_steps: vec![
                "Check network connectivity between the hub and the source site.".to_string(),
                "Retry the operation once connectivity is restored.".to_string(),
            ],
        };
    }

    if lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("invalid credentials") || lower.contains("authentication") {
        return SanitizedError {
            user_message: format!("{} failed because the stored credentials were rejected.", step_name),
            category: Category::Auth,
            severity: Severity::Error,
            actionable_steps: vec![
                "Verify the credential in the credential store is current.".to_string(),
                "Re-enroll the source if the credential has expired.".to_string(),
            ],
        };
    }

    if lower.contains("no space") || lower.contains("quota") || lower.contains("insufficient") || lower.contains("out of memory") {
        return SanitizedError {
            user_message: format!("{} ran out of a required resource.", step_name),
            category: Category::Resource,
            severity: Severity::Critical,
            actionable_steps: vec![
                "Free up capacity on the affected repository or volume backend.".to_string(),
                "Retry once capacity has been restored.".to_string(),
            ],
        };
    }

    if lower.contains("not found") || lower.contains("missing configuration") || lower.contains("invalid config") || lower.contains("parse") {
        return SanitizedError {
            user_message: format!("{} failed due to a configuration problem.", step_name),
            category: Category::Configuration,
            severity: Severity::Error,
            actionable_steps: vec![
                "Review the configuration referenced by this operation.".to_string(),
            ],
        };
    }

    SanitizedError {
        user_message: format!("{} failed unexpectedly.", step_name),
        category: Category::Internal,
        severity: Severity::Critical,
        actionable_steps: vec!["Contact support with the job's correlation id.".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_as_network() {
        let s = sanitize("attach volume", "operation timed out after 30s");
        assert_eq!(s.category, Category::Network);
    }

    #[test]
    fn classifies_unknown_as_internal() {
        let s = sanitize("finalize job", "panic in worker thread");
        assert_eq!(s.category, Category::Internal);
        assert_eq!(s.severity, Severity::Critical);
    }
}
