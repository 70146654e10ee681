use crate::db::tables::{Enrollment, EnrollmentAudit, TunnelConnection};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert_enrollment(pool: &Pool<MySql>, enrollment: &Enrollment) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO enrollments (
            id, pairing_code, status, sna_fingerprint, host, name, approved_by,
            created_at, updated_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&enrollment.id)
    .bind(&enrollment.pairing_code)
    .bind(&enrollment.status)
    .bind(&enrollment.sna_fingerprint)
    .bind(&enrollment.host)
    .bind(&enrollment.name)
    .bind(&enrollment.approved_by)
    .bind(enrollment.created_at)
    .bind(enrollment.updated_at)
    .bind(enrollment.expires_at)
    .execute(pool)
    .await
    .context("Failed to insert enrollment")?;
    Ok(())
}

pub async fn get_by_pairing_code(
    pool: &Pool<MySql>,
    pairing_code: &str,
) -> anyhow::Result<Option<Enrollment>> {
    sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE pairing_code = ?")
        .bind(pairing_code)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch enrollment by pairing code")
}

pub async fn get_enrollment(pool: &Pool<MySql>, id: &str) -> anyhow::Result<Enrollment> {
    sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch enrollment")
}

/// Fills in the SNA-provided identity on first redemption of a pairing
/// code. Only ever called once per enrollment — callers check
/// `sna_fingerprint.is_none()` first to enforce the one-shot rule.
pub async fn claim(
    pool: &Pool<MySql>,
    id: &str,
    sna_fingerprint: &str,
    host: &str,
    name: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE enrollments SET sna_fingerprint = ?, host = ?, name = ?, updated_at = NOW() WHERE id = ?",
    )
    .bind(sna_fingerprint)
    .bind(host)
    .bind(name)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to claim enrollment pairing code")?;
    Ok(())
}

pub async fn set_status(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    approved_by: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE enrollments SET status = ?, approved_by = ?, updated_at = NOW() WHERE id = ?",
    )
    .bind(status)
    .bind(approved_by)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update enrollment status")?;
    Ok(())
}

pub async fn list_pending(pool: &Pool<MySql>) -> anyhow::Result<Vec<Enrollment>> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE status = 'pending_approval' ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list pending enrollments")
}

pub async fn insert_tunnel(pool: &Pool<MySql>, tunnel: &TunnelConnection) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO tunnel_connections (
            id, enrollment_id, connected_at, last_seen_at, status
        ) VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&tunnel.id)
    .bind(&tunnel.enrollment_id)
    .bind(tunnel.connected_at)
    .bind(tunnel.last_seen_at)
    .bind(&tunnel.status)
    .execute(pool)
    .await
    .context("Failed to insert tunnel connection")?;
    Ok(())
}

pub async fn touch_tunnel(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE tunnel_connections SET last_seen_at = NOW() WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to touch tunnel connection")?;
    Ok(())
}

pub async fn mark_disconnected(pool: &Pool<MySql>, enrollment_id: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE tunnel_connections SET status = 'disconnected' WHERE enrollment_id = ? AND status = 'active'",
    )
    .bind(enrollment_id)
    .execute(pool)
    .await
    .context("Failed to mark tunnel connection disconnected")?;
    Ok(())
}

pub async fn active_tunnel_for_enrollment(
    pool: &Pool<MySql>,
    enrollment_id: &str,
) -> anyhow::Result<Option<TunnelConnection>> {
    sqlx::query_as::<_, TunnelConnection>(
        "SELECT * FROM tunnel_connections WHERE enrollment_id = ? AND status = 'active'",
    )
    .bind(enrollment_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch active tunnel connection")
}

pub async fn record_audit(pool: &Pool<MySql>, audit: &EnrollmentAudit) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO enrollment_audit (
            id, event_type, enrollment_id, source_ip, admin_user, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&audit.id)
    .bind(&audit.event_type)
    .bind(&audit.enrollment_id)
    .bind(&audit.source_ip)
    .bind(&audit.admin_user)
    .bind(audit.created_at)
    .execute(pool)
    .await
    .context("Failed to record enrollment audit event")?;
    Ok(())
}

pub async fn list_audit_for_enrollment(
    pool: &Pool<MySql>,
    enrollment_id: &str,
) -> anyhow::Result<Vec<EnrollmentAudit>> {
    sqlx::query_as::<_, EnrollmentAudit>(
        "SELECT * FROM enrollment_audit WHERE enrollment_id = ? ORDER BY created_at ASC",
    )
    .bind(enrollment_id)
    .fetch_all(pool)
    .await
    .context("Failed to list enrollment audit events")
}
