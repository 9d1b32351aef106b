use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order. Entry `n` brings the database to version `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

pub fn schema_version() -> i32 {
    MIGRATIONS.len() as i32
}

fn stored_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Bring the database up to [`schema_version`].
///
/// Each step commits together with its `user_version` bump, so a failed
/// step leaves the database at the last version that applied cleanly.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let target = schema_version();
    let current = stored_version(conn)?;

    if current > target {
        bail!("database schema v{current} is newer than this build supports (v{target})");
    }

    for (index, (name, script)) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as i32 + 1;
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to begin migration to v{version}"))?;
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply {name}"))?;
        tx.pragma_update(None, "user_version", version)
            .with_context(|| format!("failed to record schema v{version}"))?;
        tx.commit()
            .with_context(|| format!("failed to commit migration to v{version}"))?;
    }

    Ok(())
}
