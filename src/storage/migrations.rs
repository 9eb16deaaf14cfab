// Offline Media Core - offline media downloads for mobile playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Schema migrations
//!
//! Plain SQL applied at startup (no build-time database, which mobile builds
//! can't provide). Each migration runs in its own transaction together with
//! its `_migrations` bookkeeping row, so a crash never leaves one half-applied.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

struct Migration {
    id: i64,
    name: &'static str,
    sql: &'static str,
}

/// Applied in order; never edit an entry once released, append a new one
const MIGRATIONS: &[Migration] = &[Migration {
    id: 1,
    name: "key_value_entries",
    // `seq` is assigned on first insert and kept on replace, so listing by
    // `seq` yields first-enqueue order
    sql: r#"
CREATE TABLE IF NOT EXISTS KeyValueEntries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (namespace, key)
);

CREATE INDEX IF NOT EXISTS idx_key_value_namespace ON KeyValueEntries(namespace, seq);
"#,
}];

/// Apply every migration not yet recorded in `_migrations`
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .await?;

    for migration in MIGRATIONS {
        let applied: Option<i64> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
            .bind(migration.id)
            .fetch_optional(pool)
            .await?;
        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        (&mut *tx).execute(migration.sql).await?;
        sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
            .bind(migration.id)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(id = migration.id, name = migration.name, "applied migration");
    }

    Ok(())
}
