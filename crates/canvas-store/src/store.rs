//! SQLite-backed persistence facade.
//!
//! A thin typed accessor over the SQL engine: every other crate in this
//! workspace reaches the database only through `Store`. Nothing upstream
//! builds its own `sqlx::query`.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::{Error, Result};
use crate::models::{
    Canvas, CanvasCollaborator, CanvasNavigationState, CanvasVersion, FileRecord,
    OperationRecord, OperationState, ProcessingStatus, SessionRecord, TransactionRecord,
    TransactionState, User, UserViewportState,
};

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-based persistence facade for the whole server.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Wrap an existing pool. Callers own connection configuration.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for components that need a raw transaction
    /// (e.g. the debug wipe endpoint).
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create every table this server needs, idempotently.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS canvases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                owner_id INTEGER NOT NULL REFERENCES users(id),
                canvas_data TEXT NOT NULL,
                last_modified TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS canvas_collaborators (
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (canvas_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS canvas_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                canvas_data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                label TEXT
            );

            CREATE TABLE IF NOT EXISTS operations (
                id TEXT PRIMARY KEY,
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                op_type TEXT NOT NULL,
                params TEXT NOT NULL,
                undo_data TEXT,
                transaction_id TEXT,
                sequence_number INTEGER NOT NULL,
                state TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                undone_at TEXT,
                undone_by INTEGER,
                redone_at TEXT,
                redone_by INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_operations_canvas_seq ON operations(canvas_id, sequence_number);
            CREATE INDEX IF NOT EXISTS idx_operations_user_state ON operations(user_id, state);
            CREATE INDEX IF NOT EXISTS idx_operations_tx ON operations(transaction_id);

            CREATE TABLE IF NOT EXISTS files (
                filename TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                hash TEXT NOT NULL,
                user_id INTEGER,
                canvas_id INTEGER,
                processed_formats TEXT,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                processing_error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
            CREATE INDEX IF NOT EXISTS idx_files_canvas ON files(canvas_id);

            CREATE TABLE IF NOT EXISTS active_sessions (
                socket_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                tab_id TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                last_ping TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS canvas_states (
                canvas_id INTEGER PRIMARY KEY REFERENCES canvases(id),
                scale REAL NOT NULL DEFAULT 1.0,
                offset_x REAL NOT NULL DEFAULT 0.0,
                offset_y REAL NOT NULL DEFAULT 0.0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_viewport_states (
                user_id INTEGER NOT NULL REFERENCES users(id),
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                scale REAL NOT NULL DEFAULT 1.0,
                offset_x REAL NOT NULL DEFAULT 0.0,
                offset_y REAL NOT NULL DEFAULT 0.0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, canvas_id)
            );

            CREATE TABLE IF NOT EXISTS active_transactions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                canvas_id INTEGER NOT NULL REFERENCES canvases(id),
                source TEXT NOT NULL,
                started_at TEXT NOT NULL,
                state TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tx_user_canvas ON active_transactions(user_id, canvas_id, state);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Fetch a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, display_name, color, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
            color: row.get("color"),
            created_at: parse_dt(&row.get::<String, _>("created_at")),
        }))
    }

    /// Fetch a user by id.
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, display_name, color, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
            color: row.get("color"),
            created_at: parse_dt(&row.get::<String, _>("created_at")),
        }))
    }

    /// Total number of registered users (used to cycle the color palette).
    pub async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("c"))
    }

    /// Insert a new user row.
    pub async fn create_user(&self, username: &str, display_name: &str, color: &str) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, display_name, color, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(display_name)
        .bind(color)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            color: color.to_string(),
            created_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Canvases
    // ------------------------------------------------------------------

    /// Create a new canvas with an empty scene.
    pub async fn create_canvas(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: i64,
        initial_canvas_data: &str,
    ) -> Result<Canvas> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO canvases (name, description, owner_id, canvas_data, last_modified) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(initial_canvas_data)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Canvas {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            owner_id,
            canvas_data: initial_canvas_data.to_string(),
            last_modified: now,
        })
    }

    fn row_to_canvas(row: &sqlx::sqlite::SqliteRow) -> Canvas {
        Canvas {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            owner_id: row.get("owner_id"),
            canvas_data: row.get("canvas_data"),
            last_modified: parse_dt(&row.get::<String, _>("last_modified")),
        }
    }

    /// Fetch a canvas by id.
    pub async fn get_canvas(&self, id: i64) -> Result<Option<Canvas>> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, canvas_data, last_modified FROM canvases WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_canvas))
    }

    /// List all canvases, most recently modified first.
    pub async fn list_canvases(&self) -> Result<Vec<Canvas>> {
        let rows = sqlx::query(
            "SELECT id, name, description, owner_id, canvas_data, last_modified FROM canvases ORDER BY last_modified DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_canvas).collect())
    }

    /// Overwrite the scene blob and bump `last_modified`. Called once per
    /// successful `executeOperation`.
    pub async fn update_canvas_data(&self, id: i64, canvas_data: &str) -> Result<()> {
        let result = sqlx::query("UPDATE canvases SET canvas_data = ?, last_modified = ? WHERE id = ?")
            .bind(canvas_data)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("canvas {id}")));
        }
        Ok(())
    }

    /// Update the editable metadata fields of a canvas.
    pub async fn update_canvas_meta(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            sqlx::query("UPDATE canvases SET name = ? WHERE id = ?")
                .bind(name)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(description) = description {
            sqlx::query("UPDATE canvases SET description = ? WHERE id = ?")
                .bind(description)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Delete a canvas row. Does not cascade; callers clean up dependent
    /// rows (operations, files) explicitly when that is desired.
    pub async fn delete_canvas(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM canvases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Canvas navigation / viewport state
    // ------------------------------------------------------------------

    /// Upsert the canvas-level viewport (`PUT/PATCH /canvases/:id/state`).
    pub async fn upsert_canvas_navigation_state(
        &self,
        canvas_id: i64,
        scale: f64,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO canvas_states (canvas_id, scale, offset_x, offset_y, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(canvas_id) DO UPDATE SET
                scale = excluded.scale,
                offset_x = excluded.offset_x,
                offset_y = excluded.offset_y,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(canvas_id)
        .bind(scale)
        .bind(offset_x)
        .bind(offset_y)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch the canvas-level viewport state, if any has been recorded.
    pub async fn get_canvas_navigation_state(
        &self,
        canvas_id: i64,
    ) -> Result<Option<CanvasNavigationState>> {
        let row = sqlx::query(
            "SELECT canvas_id, scale, offset_x, offset_y, updated_at FROM canvas_states WHERE canvas_id = ?",
        )
        .bind(canvas_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CanvasNavigationState {
            canvas_id: row.get("canvas_id"),
            scale: row.get("scale"),
            offset_x: row.get("offset_x"),
            offset_y: row.get("offset_y"),
            updated_at: parse_dt(&row.get::<String, _>("updated_at")),
        }))
    }

    /// Upsert a per-user viewport state.
    pub async fn upsert_user_viewport_state(
        &self,
        user_id: i64,
        canvas_id: i64,
        scale: f64,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_viewport_states (user_id, canvas_id, scale, offset_x, offset_y, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, canvas_id) DO UPDATE SET
                scale = excluded.scale,
                offset_x = excluded.offset_x,
                offset_y = excluded.offset_y,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(canvas_id)
        .bind(scale)
        .bind(offset_x)
        .bind(offset_y)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a per-user viewport state.
    pub async fn get_user_viewport_state(
        &self,
        user_id: i64,
        canvas_id: i64,
    ) -> Result<Option<UserViewportState>> {
        let row = sqlx::query(
            "SELECT user_id, canvas_id, scale, offset_x, offset_y, updated_at FROM user_viewport_states WHERE user_id = ? AND canvas_id = ?",
        )
        .bind(user_id)
        .bind(canvas_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserViewportState {
            user_id: row.get("user_id"),
            canvas_id: row.get("canvas_id"),
            scale: row.get("scale"),
            offset_x: row.get("offset_x"),
            offset_y: row.get("offset_y"),
            updated_at: parse_dt(&row.get::<String, _>("updated_at")),
        }))
    }

    // ------------------------------------------------------------------
    // Collaborators / versions (schema-level; no operation in the message
    // surface drives these today, but the rows are kept available for the
    // HTTP canvas CRUD surface and future restore tooling)
    // ------------------------------------------------------------------

    /// Grant (or update) a collaborator role on a canvas.
    pub async fn add_collaborator(&self, canvas_id: i64, user_id: i64, role: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO canvas_collaborators (canvas_id, user_id, role, added_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(canvas_id, user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(canvas_id)
        .bind(user_id)
        .bind(role)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List the collaborators on a canvas.
    pub async fn list_collaborators(&self, canvas_id: i64) -> Result<Vec<CanvasCollaborator>> {
        let rows = sqlx::query(
            "SELECT canvas_id, user_id, role, added_at FROM canvas_collaborators WHERE canvas_id = ?",
        )
        .bind(canvas_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CanvasCollaborator {
                canvas_id: row.get("canvas_id"),
                user_id: row.get("user_id"),
                role: row.get("role"),
                added_at: parse_dt(&row.get::<String, _>("added_at")),
            })
            .collect())
    }

    /// Record a named snapshot of the current scene blob.
    pub async fn record_canvas_version(
        &self,
        canvas_id: i64,
        canvas_data: &str,
        label: Option<&str>,
    ) -> Result<CanvasVersion> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO canvas_versions (canvas_id, canvas_data, created_at, label) VALUES (?, ?, ?, ?)",
        )
        .bind(canvas_id)
        .bind(canvas_data)
        .bind(now.to_rfc3339())
        .bind(label)
        .execute(&self.pool)
        .await?;

        Ok(CanvasVersion {
            id: result.last_insert_rowid(),
            canvas_id,
            canvas_data: canvas_data.to_string(),
            created_at: now,
            label: label.map(str::to_string),
        })
    }

    // ------------------------------------------------------------------
    // Operations (Operation History)
    // ------------------------------------------------------------------

    /// Next sequence number for a canvas (max persisted + 1, starting at 1).
    pub async fn next_sequence_number(&self, canvas_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT MAX(sequence_number) as m FROM operations WHERE canvas_id = ?")
            .bind(canvas_id)
            .fetch_one(&self.pool)
            .await?;
        let max: Option<i64> = row.get("m");
        Ok(max.unwrap_or(0) + 1)
    }

    fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> OperationRecord {
        OperationRecord {
            id: row.get("id"),
            canvas_id: row.get("canvas_id"),
            user_id: row.get("user_id"),
            op_type: row.get("op_type"),
            params: row.get("params"),
            undo_data: row.get("undo_data"),
            transaction_id: row.get("transaction_id"),
            sequence_number: row.get("sequence_number"),
            state: OperationState::from_str(&row.get::<String, _>("state")),
            timestamp: parse_dt(&row.get::<String, _>("timestamp")),
            undone_at: row
                .get::<Option<String>, _>("undone_at")
                .as_deref()
                .map(parse_dt),
            undone_by: row.get("undone_by"),
            redone_at: row
                .get::<Option<String>, _>("redone_at")
                .as_deref()
                .map(parse_dt),
            redone_by: row.get("redone_by"),
        }
    }

    /// Insert a freshly-applied operation row.
    pub async fn insert_operation(&self, op: &OperationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operations
                (id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                 sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&op.id)
        .bind(op.canvas_id)
        .bind(op.user_id)
        .bind(&op.op_type)
        .bind(&op.params)
        .bind(&op.undo_data)
        .bind(&op.transaction_id)
        .bind(op.sequence_number)
        .bind(op.state.as_str())
        .bind(op.timestamp.to_rfc3339())
        .bind(op.undone_at.map(|dt| dt.to_rfc3339()))
        .bind(op.undone_by)
        .bind(op.redone_at.map(|dt| dt.to_rfc3339()))
        .bind(op.redone_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A single operation row by id.
    pub async fn get_operation(&self, id: &str) -> Result<Option<OperationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                   sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
            FROM operations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_operation))
    }

    /// All operations for a `(user, canvas)` pair, in sequence order. Used
    /// to reconstruct the undo/redo stacks on first touch.
    pub async fn list_operations_by_user_canvas(
        &self,
        user_id: i64,
        canvas_id: i64,
    ) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                   sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
            FROM operations
            WHERE user_id = ? AND canvas_id = ?
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(user_id)
        .bind(canvas_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_operation).collect())
    }

    /// Operations on a canvas newer than `since_sequence` (`sync_check`).
    pub async fn list_operations_after(
        &self,
        canvas_id: i64,
        since_sequence: i64,
    ) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                   sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
            FROM operations
            WHERE canvas_id = ? AND sequence_number > ?
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(canvas_id)
        .bind(since_sequence)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_operation).collect())
    }

    /// Operations with sequence number greater than `after_sequence` on a
    /// canvas that are still `applied` — used for undo conflict detection.
    pub async fn list_applied_operations_after(
        &self,
        canvas_id: i64,
        after_sequence: i64,
    ) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                   sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
            FROM operations
            WHERE canvas_id = ? AND sequence_number > ? AND state = 'applied'
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(canvas_id)
        .bind(after_sequence)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_operation).collect())
    }

    /// Detailed listing used by `get_undo_history`.
    pub async fn list_operations_detailed(
        &self,
        canvas_id: i64,
        user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<OperationRecord>> {
        let rows = if let Some(user_id) = user_id {
            sqlx::query(
                r#"
                SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                       sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
                FROM operations
                WHERE canvas_id = ? AND user_id = ?
                ORDER BY sequence_number DESC
                LIMIT ?
                "#,
            )
            .bind(canvas_id)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, canvas_id, user_id, op_type, params, undo_data, transaction_id,
                       sequence_number, state, timestamp, undone_at, undone_by, redone_at, redone_by
                FROM operations
                WHERE canvas_id = ?
                ORDER BY sequence_number DESC
                LIMIT ?
                "#,
            )
            .bind(canvas_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.iter().map(Self::row_to_operation).collect())
    }

    /// Flip an operation row to `undone`.
    pub async fn mark_operation_undone(&self, id: &str, undone_by: i64) -> Result<()> {
        sqlx::query(
            "UPDATE operations SET state = 'undone', undone_at = ?, undone_by = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(undone_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip an operation row back to `applied` (redo).
    pub async fn mark_operation_redone(&self, id: &str, redone_by: i64) -> Result<()> {
        sqlx::query(
            "UPDATE operations SET state = 'applied', redone_at = ?, redone_by = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(redone_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete every operation row for a canvas (`clear_undo_history`).
    pub async fn delete_operations_for_canvas(&self, canvas_id: i64) -> Result<usize> {
        let result = sqlx::query("DELETE FROM operations WHERE canvas_id = ?")
            .bind(canvas_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Start a new transaction bundle. Callers must have already checked
    /// there is no other active transaction for this `(user, canvas)`.
    pub async fn begin_transaction(&self, tx: &TransactionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO active_transactions (id, user_id, canvas_id, source, started_at, state) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&tx.id)
        .bind(tx.user_id)
        .bind(tx.canvas_id)
        .bind(&tx.source)
        .bind(tx.started_at.to_rfc3339())
        .bind(tx.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> TransactionRecord {
        TransactionRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            canvas_id: row.get("canvas_id"),
            source: row.get("source"),
            started_at: parse_dt(&row.get::<String, _>("started_at")),
            state: TransactionState::from_str(&row.get::<String, _>("state")),
        }
    }

    /// The currently active transaction for a `(user, canvas)` pair, if any.
    pub async fn get_active_transaction(
        &self,
        user_id: i64,
        canvas_id: i64,
    ) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, canvas_id, source, started_at, state FROM active_transactions WHERE user_id = ? AND canvas_id = ? AND state = 'active'",
        )
        .bind(user_id)
        .bind(canvas_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_transaction))
    }

    /// Fetch a transaction by id regardless of state.
    pub async fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, canvas_id, source, started_at, state FROM active_transactions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_transaction))
    }

    /// Mark a transaction committed.
    pub async fn commit_transaction(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE active_transactions SET state = 'committed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a transaction aborted. Per the design notes, this does not roll
    /// back any operation already applied within the bundle.
    pub async fn abort_transaction(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE active_transactions SET state = 'aborted' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
        FileRecord {
            filename: row.get("filename"),
            original_name: row.get("original_name"),
            mime_type: row.get("mime_type"),
            size: row.get("size"),
            hash: row.get("hash"),
            user_id: row.get("user_id"),
            canvas_id: row.get("canvas_id"),
            processed_formats: row.get("processed_formats"),
            processing_status: ProcessingStatus::from_str(&row.get::<String, _>("processing_status")),
            processing_error: row.get("processing_error"),
            created_at: parse_dt(&row.get::<String, _>("created_at")),
        }
    }

    /// Insert a new file row following a successful upload.
    pub async fn insert_file(&self, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files
                (filename, original_name, mime_type, size, hash, user_id, canvas_id,
                 processed_formats, processing_status, processing_error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.filename)
        .bind(&file.original_name)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(&file.hash)
        .bind(file.user_id)
        .bind(file.canvas_id)
        .bind(&file.processed_formats)
        .bind(file.processing_status.as_str())
        .bind(&file.processing_error)
        .bind(file.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a file by its content hash (dedup).
    pub async fn get_file_by_hash(&self, hash: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT filename, original_name, mime_type, size, hash, user_id, canvas_id,
                   processed_formats, processing_status, processing_error, created_at
            FROM files WHERE hash = ? ORDER BY created_at ASC LIMIT 1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_file))
    }

    /// Look up a file by its server-assigned filename.
    pub async fn get_file_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT filename, original_name, mime_type, size, hash, user_id, canvas_id,
                   processed_formats, processing_status, processing_error, created_at
            FROM files WHERE filename = ?
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_file))
    }

    /// List all files, for the maintenance sweep.
    pub async fn list_all_files(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT filename, original_name, mime_type, size, hash, user_id, canvas_id,
                   processed_formats, processing_status, processing_error, created_at
            FROM files
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_file).collect())
    }

    /// Update the processing status (and optional error) of a file.
    pub async fn update_processing_status(
        &self,
        filename: &str,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE files SET processing_status = ?, processing_error = ? WHERE filename = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite the `processed_formats` JSON blob for a file.
    pub async fn update_processed_formats(&self, filename: &str, formats_json: &str) -> Result<()> {
        sqlx::query("UPDATE files SET processed_formats = ? WHERE filename = ?")
            .bind(formats_json)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a file row (the caller is responsible for the disk artifacts).
    pub async fn delete_file(&self, filename: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Sessions (best-effort bookkeeping)
    // ------------------------------------------------------------------

    /// Record (or refresh) a live connection.
    pub async fn upsert_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO active_sessions (socket_id, user_id, canvas_id, tab_id, joined_at, last_ping)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(socket_id) DO UPDATE SET last_ping = excluded.last_ping
            "#,
        )
        .bind(&session.socket_id)
        .bind(session.user_id)
        .bind(session.canvas_id)
        .bind(&session.tab_id)
        .bind(session.joined_at.to_rfc3339())
        .bind(session.last_ping.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a session row on disconnect.
    pub async fn remove_session(&self, socket_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM active_sessions WHERE socket_id = ?")
            .bind(socket_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Byte counts used by `GET /database/size`. Upload/thumbnail sizes are
    /// supplied by the caller, which owns the filesystem walk; this method
    /// only reports what the database itself knows.
    pub async fn total_file_bytes(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(SUM(size), 0) as total FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Drop every row in dependency order, inside a transaction. Used by
    /// `/debug/wipe-database`.
    pub async fn wipe_all(&self, include_files: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM operations").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM active_transactions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM canvas_versions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM canvas_collaborators").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM canvas_states").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM user_viewport_states").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM active_sessions").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM canvases").execute(&mut *tx).await?;
        if include_files {
            sqlx::query("DELETE FROM files").execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM users").execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}
