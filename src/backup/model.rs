use crate::db::tables::BackupDisk;

/// Disk-level plan for one backup disk: whether it runs `full` or
/// `incremental`, the parent image it is a delta against (if any), and why
/// the engine chose what it chose (spec §4.7 chain rule).
#[derive(Debug, Clone)]
pub struct DiskPlan {
    pub backup_type: &'static str,
    pub prior_change_id: Option<String>,
    pub parent_image_path: Option<String>,
    pub promotion_reason: Option<&'static str>,
}

/// Decides full vs incremental for one disk given the requested type and the
/// latest completed backup disk on its chain.
///
/// An incremental may only start if the chain's latest backup is completed
/// and its change-tracking id equals `expected_parent_change_id`. Otherwise
/// the request is promoted to a full backup and the reason recorded
/// (S4 — chain mismatch).
pub fn plan_disk(
    requested_type: &str,
    latest_on_chain: Option<&BackupDisk>,
    expected_parent_change_id: Option<&str>,
) -> DiskPlan {
    if requested_type == "full" {
        return DiskPlan {
            backup_type: "full",
            prior_change_id: None,
            parent_image_path: None,
            promotion_reason: None,
        };
    }

    match latest_on_chain {
        None => DiskPlan {
            backup_type: "full",
            prior_change_id: None,
            parent_image_path: None,
            promotion_reason: Some("no_prior_chain"),
        },
        Some(latest) if latest.status != "completed" => DiskPlan {
            backup_type: "full",
            prior_change_id: None,
            parent_image_path: None,
            promotion_reason: Some("parent_not_completed"),
        },
        Some(latest) => {
            let matches = match (expected_parent_change_id, &latest.disk_change_id) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => false,
            };
            if matches {
                DiskPlan {
                    backup_type: "incremental",
                    prior_change_id: latest.disk_change_id.clone(),
                    parent_image_path: Some(latest.image_path.clone()),
                    promotion_reason: None,
                }
            } else {
                DiskPlan {
                    backup_type: "full",
                    prior_change_id: None,
                    parent_image_path: None,
                    promotion_reason: Some("chain_mismatch"),
                }
            }
        }
    }
}

/// Path a backup disk's image is written to, per spec §6's persisted-state
/// layout: `<repository-root>/<vm-name>/<backup-id>-disk<index>.<ext>`.
pub fn image_path(
    repository_root: &str,
    vm_name: &str,
    backup_job_id: &str,
    disk_index: i32,
    backup_type: &str,
) -> String {
    let ext = if backup_type == "full" { "full" } else { "delta" };
    format!(
        "{}/{}/{}-disk{}.{}",
        repository_root, vm_name, backup_job_id, disk_index, ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_disk(change_id: &str) -> BackupDisk {
        BackupDisk {
            id: "bd-1".to_string(),
            backup_job_id: "bj-1".to_string(),
            disk_index: 0,
            disk_change_id: Some(change_id.to_string()),
            prior_change_id: None,
            image_path: "/repo/vm/bj-1-disk0.full".to_string(),
            size_bytes: 1024,
            status: "completed".to_string(),
            bytes_transferred: 1024,
            completed_at: Some(chrono::Utc::now()),
        }
    }

    #[test]
    fn full_request_is_always_full() {
        let plan = plan_disk("full", Some(&completed_disk("x1")), Some("x1"));
        assert_eq!(plan.backup_type, "full");
        assert!(plan.promotion_reason.is_none());
    }

    #[test]
    fn incremental_promotes_on_chain_mismatch() {
        let plan = plan_disk("incremental", Some(&completed_disk("x1")), Some("x0"));
        assert_eq!(plan.backup_type, "full");
        assert_eq!(plan.promotion_reason, Some("chain_mismatch"));
    }

    #[test]
    fn incremental_proceeds_on_matching_chain() {
        let plan = plan_disk("incremental", Some(&completed_disk("x1")), Some("x1"));
        assert_eq!(plan.backup_type, "incremental");
        assert_eq!(plan.prior_change_id.as_deref(), Some("x1"));
    }

    #[test]
    fn incremental_with_no_chain_becomes_full() {
        let plan = plan_disk("incremental", None, None);
        assert_eq!(plan.backup_type, "full");
        assert_eq!(plan.promotion_reason, Some("no_prior_chain"));
    }
}
