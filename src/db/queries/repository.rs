use crate::db::tables::Repository;
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert(pool: &Pool<MySql>, repo: &Repository) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO backup_repositories (
            id, name, repo_type, config, total_size_bytes, used_size_bytes,
            status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&repo.id)
    .bind(&repo.name)
    .bind(&repo.repo_type)
    .bind(&repo.config)
    .bind(repo.total_size_bytes)
    .bind(repo.used_size_bytes)
    .bind(&repo.status)
    .bind(repo.created_at)
    .bind(repo.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert repository")?;
    Ok(())
}

pub async fn get(pool: &Pool<MySql>, id: &str) -> anyhow::Result<Repository> {
    sqlx::query_as::<_, Repository>("SELECT * FROM backup_repositories WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch repository")
}

pub async fn list(pool: &Pool<MySql>) -> anyhow::Result<Vec<Repository>> {
    sqlx::query_as::<_, Repository>("SELECT * FROM backup_repositories ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .context("Failed to list repositories")
}

pub async fn update_storage(
    pool: &Pool<MySql>,
    id: &str,
    total_size_bytes: i64,
    used_size_bytes: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE backup_repositories SET total_size_bytes = ?, used_size_bytes = ?, updated_at = NOW() WHERE id = ?",
    )
    .bind(total_size_bytes)
    .bind(used_size_bytes)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update repository storage stats")?;
    Ok(())
}

pub async fn delete(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM backup_repositories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete repository")?;
    Ok(())
}
