pub mod error;
pub mod model;

use crate::db::queries::enrollment as equeries;
use crate::db::tables::{Enrollment, EnrollmentAudit, TunnelConnection};
use chrono::{Duration as ChronoDuration, Utc};
use error::EnrollmentError;
use log::info;
use sqlx::{MySql, Pool};
use uuid::Uuid;

/// Three-legged trust establishment between an operator, an SNA, and this
/// hub (spec §4.10): pairing code issuance, SNA-initiated claim, operator
/// approval, and the tunnel connection lifecycle that follows approval.
/// Every transition is mirrored into an append-only audit table.
pub struct EnrollmentRegistry {
    pool: Pool<MySql>,
}

impl EnrollmentRegistry {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// Operator-initiated step one: mint a one-shot pairing code with a
    /// short TTL and record it as a not-yet-claimed enrollment.
    pub async fn generate_pairing_code(&self) -> Result<Enrollment, EnrollmentError> {
        let now = Utc::now();
        let enrollment = Enrollment {
            id: format!("enrollment-{}", Uuid::new_v4()),
            pairing_code: model::generate_pairing_code(),
            status: "pending_approval".to_string(),
            sna_fingerprint: None,
            host: None,
            name: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ChronoDuration::minutes(model::PAIRING_CODE_TTL_MINUTES),
        };
        equeries::insert_enrollment(&self.pool, &enrollment)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("pairing_code_generated", &enrollment.id, None, None).await;
        info!("enrollment: pairing code generated for {}", enrollment.id);
        Ok(enrollment)
    }

    /// SNA-initiated step two: redeem a pairing code with the SNA's own
    /// identity. One-shot — a code with an identity already attached
    /// cannot be claimed again.
    pub async fn enroll(
        &self,
        pairing_code: &str,
        sna_fingerprint: &str,
        host: &str,
        name: &str,
        source_ip: Option<&str>,
    ) -> Result<Enrollment, EnrollmentError> {
        let enrollment = equeries::get_by_pairing_code(&self.pool, pairing_code)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?
            .ok_or(EnrollmentError::UnknownPairingCode)?;

        if enrollment.expires_at < Utc::now() {
            return Err(EnrollmentError::Expired);
        }
        if enrollment.sna_fingerprint.is_some() {
            return Err(EnrollmentError::AlreadyClaimed);
        }

        equeries::claim(&self.pool, &enrollment.id, sna_fingerprint, host, name)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("enrollment_claimed", &enrollment.id, source_ip, None).await;
        info!("enrollment: {} claimed by SNA {} ({})", enrollment.id, name, host);

        equeries::get_enrollment(&self.pool, &enrollment.id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))
    }

    pub async fn list_pending(&self) -> Result<Vec<Enrollment>, EnrollmentError> {
        equeries::list_pending(&self.pool)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))
    }

    pub async fn approve(&self, id: &str, admin_user: &str) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self.get(id).await?;
        if enrollment.status != "pending_approval" {
            return Err(EnrollmentError::NotPending(id.to_string()));
        }
        equeries::set_status(&self.pool, id, "approved", Some(admin_user))
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("approved", id, None, Some(admin_user)).await;
        info!("enrollment: {} approved by {}", id, admin_user);
        self.get(id).await
    }

    pub async fn reject(&self, id: &str, admin_user: &str) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self.get(id).await?;
        if enrollment.status != "pending_approval" {
            return Err(EnrollmentError::NotPending(id.to_string()));
        }
        equeries::set_status(&self.pool, id, "rejected", Some(admin_user))
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("rejected", id, None, Some(admin_user)).await;
        info!("enrollment: {} rejected by {}", id, admin_user);
        self.get(id).await
    }

    /// An approved enrollment may be revoked at any time, tearing down its
    /// active tunnel connection if one exists.
    pub async fn revoke(&self, id: &str, admin_user: &str) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self.get(id).await?;
        if enrollment.status != "approved" {
            return Err(EnrollmentError::NotApproved(id.to_string()));
        }
        equeries::mark_disconnected(&self.pool, id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        equeries::set_status(&self.pool, id, "revoked", Some(admin_user))
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("revoked", id, None, Some(admin_user)).await;
        info!("enrollment: {} revoked by {}", id, admin_user);
        self.get(id).await
    }

    /// First (or reconnecting) tunnel handshake for an approved enrollment.
    /// Idempotent — an already-active connection is returned as-is rather
    /// than duplicated.
    pub async fn tunnel_connect(
        &self,
        enrollment_id: &str,
        source_ip: Option<&str>,
    ) -> Result<TunnelConnection, EnrollmentError> {
        let enrollment = self.get(enrollment_id).await?;
        if enrollment.status != "approved" {
            return Err(EnrollmentError::NotApproved(enrollment_id.to_string()));
        }
        if let Some(existing) = equeries::active_tunnel_for_enrollment(&self.pool, enrollment_id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?
        {
            return Ok(existing);
        }
        let now = Utc::now();
        let tunnel = TunnelConnection {
            id: format!("tunnel-{}", Uuid::new_v4()),
            enrollment_id: enrollment_id.to_string(),
            connected_at: now,
            last_seen_at: now,
            status: "active".to_string(),
        };
        equeries::insert_tunnel(&self.pool, &tunnel)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("tunnel_connected", enrollment_id, source_ip, None).await;
        info!("enrollment: tunnel connected for {}", enrollment_id);
        Ok(tunnel)
    }

    pub async fn tunnel_heartbeat(&self, tunnel_id: &str) -> Result<(), EnrollmentError> {
        equeries::touch_tunnel(&self.pool, tunnel_id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))
    }

    pub async fn tunnel_disconnect(&self, enrollment_id: &str) -> Result<(), EnrollmentError> {
        equeries::mark_disconnected(&self.pool, enrollment_id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))?;
        self.audit("tunnel_disconnected", enrollment_id, None, None).await;
        info!("enrollment: tunnel disconnected for {}", enrollment_id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Enrollment, EnrollmentError> {
        equeries::get_enrollment(&self.pool, id)
            .await
            .map_err(|_| EnrollmentError::NotFound(id.to_string()))
    }

    pub async fn audit_log(&self, enrollment_id: &str) -> Result<Vec<EnrollmentAudit>, EnrollmentError> {
        equeries::list_audit_for_enrollment(&self.pool, enrollment_id)
            .await
            .map_err(|e| EnrollmentError::Persistence(e.to_string()))
    }

    async fn audit(&self, event_type: &str, enrollment_id: &str, source_ip: Option<&str>, admin_user: Option<&str>) {
        let audit = EnrollmentAudit {
            id: format!("audit-{}", Uuid::new_v4()),
            event_type: event_type.to_string(),
            enrollment_id: enrollment_id.to_string(),
            source_ip: source_ip.map(str::to_string),
            admin_user: admin_user.map(str::to_string),
            created_at: Utc::now(),
        };
        if let Err(e) = equeries::record_audit(&self.pool, &audit).await {
            log::error!("enrollment: failed to record audit event {} for {}: {}", event_type, enrollment_id, e);
        }
    }
}
