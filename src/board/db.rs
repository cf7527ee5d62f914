use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};

use super::feed::{ChangeEvent, ChangeOp, FeedBus};
use super::models::*;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&BoardDb) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoreError::backend(anyhow!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::backend(anyhow!("DB task panicked: {}", e)))?
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Today's date as an ISO string, for schedule comparisons.
pub fn today_iso() -> String {
    Utc::now().date_naive().to_string()
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .context("Failed to open SQLite database")
            .map_err(StoreError::backend)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory SQLite database")
            .map_err(StoreError::backend)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> StoreResult<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(StoreError::backend)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS wards (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS cleaning_schedules (
                    id TEXT PRIMARY KEY,
                    ward_id TEXT NOT NULL REFERENCES wards(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    session_date TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ward_tasks (
                    id TEXT PRIMARY KEY,
                    ward_id TEXT NOT NULL REFERENCES wards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    subtitle TEXT,
                    instructions TEXT,
                    equipment TEXT,
                    safety_notes TEXT,
                    color TEXT,
                    priority TEXT NOT NULL DEFAULT 'normal',
                    kid_friendly INTEGER NOT NULL DEFAULT 0,
                    points INTEGER NOT NULL DEFAULT 0,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profiles (
                    user_id TEXT PRIMARY KEY,
                    display_name TEXT NOT NULL,
                    avatar_url TEXT
                );

                -- UNIQUE(schedule_id) is the idempotency key for session
                -- materialization: concurrent bootstraps for one schedule
                -- converge on a single row. NULL schedule_id (ad-hoc
                -- sessions) is exempt per SQLite UNIQUE semantics.
                CREATE TABLE IF NOT EXISTS cleaning_sessions (
                    id TEXT PRIMARY KEY,
                    ward_id TEXT NOT NULL REFERENCES wards(id) ON DELETE CASCADE,
                    schedule_id TEXT UNIQUE REFERENCES cleaning_schedules(id),
                    name TEXT NOT NULL,
                    session_date TEXT NOT NULL,
                    share_code TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    completed_at TEXT,
                    created_by TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS session_tasks (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL REFERENCES cleaning_sessions(id) ON DELETE CASCADE,
                    task_id TEXT NOT NULL REFERENCES ward_tasks(id),
                    status TEXT NOT NULL DEFAULT 'todo',
                    assigned_to TEXT,
                    assigned_to_temp_user TEXT,
                    assigned_at TEXT,
                    completed_at TEXT,
                    points_awarded INTEGER,
                    created_at TEXT NOT NULL,
                    CHECK (
                        (status = 'todo'
                            AND assigned_to IS NULL
                            AND assigned_to_temp_user IS NULL
                            AND assigned_at IS NULL)
                        OR (status IN ('doing', 'done')
                            AND assigned_at IS NOT NULL
                            AND ((assigned_to IS NOT NULL AND assigned_to_temp_user IS NULL)
                                OR (assigned_to IS NULL AND assigned_to_temp_user IS NOT NULL)))
                    )
                );

                CREATE TABLE IF NOT EXISTS session_participants (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL REFERENCES cleaning_sessions(id) ON DELETE CASCADE,
                    user_id TEXT,
                    temp_user_id TEXT,
                    display_name TEXT NOT NULL,
                    is_authenticated INTEGER NOT NULL DEFAULT 0,
                    avatar_url TEXT,
                    last_active_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS task_viewers (
                    id TEXT PRIMARY KEY,
                    session_task_id TEXT NOT NULL REFERENCES session_tasks(id) ON DELETE CASCADE,
                    participant_id TEXT NOT NULL REFERENCES session_participants(id) ON DELETE CASCADE,
                    started_at TEXT NOT NULL,
                    UNIQUE(session_task_id, participant_id)
                );

                CREATE INDEX IF NOT EXISTS idx_schedules_ward_date
                    ON cleaning_schedules(ward_id, session_date);
                CREATE INDEX IF NOT EXISTS idx_ward_tasks_ward ON ward_tasks(ward_id, active);
                CREATE INDEX IF NOT EXISTS idx_session_tasks_session ON session_tasks(session_id);
                CREATE INDEX IF NOT EXISTS idx_participants_session
                    ON session_participants(session_id);
                CREATE INDEX IF NOT EXISTS idx_viewers_task ON task_viewers(session_task_id);
                ",
            )
            .context("Failed to create tables")
            .map_err(StoreError::backend)?;
        Ok(())
    }

    // ── Wards ─────────────────────────────────────────────────────────

    pub fn create_ward(&self, name: &str) -> StoreResult<Ward> {
        let ward = Ward {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now_rfc3339(),
        };
        self.conn
            .execute(
                "INSERT INTO wards (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![ward.id.to_string(), ward.name, ward.created_at],
            )
            .map_err(StoreError::from)?;
        Ok(ward)
    }

    pub fn get_ward(&self, id: Uuid) -> StoreResult<Option<Ward>> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM wards WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(WardRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_ward())
            .transpose()
    }

    pub fn list_wards(&self) -> StoreResult<Vec<Ward>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM wards ORDER BY name")
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WardRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(StoreError::from)?;
        let mut wards = Vec::new();
        for row in rows {
            wards.push(row.map_err(StoreError::from)?.into_ward()?);
        }
        Ok(wards)
    }

    // ── Schedules ─────────────────────────────────────────────────────

    pub fn create_schedule(
        &self,
        ward_id: Uuid,
        name: &str,
        session_date: &str,
    ) -> StoreResult<CleaningSchedule> {
        let schedule = CleaningSchedule {
            id: Uuid::new_v4(),
            ward_id,
            name: name.to_string(),
            session_date: session_date.to_string(),
            created_at: now_rfc3339(),
        };
        self.conn
            .execute(
                "INSERT INTO cleaning_schedules (id, ward_id, name, session_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    schedule.id.to_string(),
                    schedule.ward_id.to_string(),
                    schedule.name,
                    schedule.session_date,
                    schedule.created_at
                ],
            )
            .map_err(StoreError::from)?;
        Ok(schedule)
    }

    /// Earliest schedule entry on or after `today` for the ward, if any.
    pub fn next_schedule(&self, ward_id: Uuid, today: &str) -> StoreResult<Option<CleaningSchedule>> {
        self.conn
            .query_row(
                "SELECT id, ward_id, name, session_date, created_at
                 FROM cleaning_schedules
                 WHERE ward_id = ?1 AND session_date >= ?2
                 ORDER BY session_date ASC LIMIT 1",
                params![ward_id.to_string(), today],
                |row| {
                    Ok(ScheduleRow {
                        id: row.get(0)?,
                        ward_id: row.get(1)?,
                        name: row.get(2)?,
                        session_date: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_schedule())
            .transpose()
    }

    // ── Ward task catalog ─────────────────────────────────────────────

    pub fn create_ward_task(&self, ward_id: Uuid, input: NewWardTask) -> StoreResult<WardTask> {
        let task = WardTask {
            id: Uuid::new_v4(),
            ward_id,
            title: input.title,
            subtitle: input.subtitle,
            instructions: input.instructions,
            equipment: input.equipment,
            safety_notes: input.safety_notes,
            color: input.color,
            priority: input.priority,
            kid_friendly: input.kid_friendly,
            points: input.points,
            active: input.active,
            created_at: now_rfc3339(),
        };
        self.conn
            .execute(
                "INSERT INTO ward_tasks (id, ward_id, title, subtitle, instructions, equipment,
                    safety_notes, color, priority, kid_friendly, points, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    task.id.to_string(),
                    task.ward_id.to_string(),
                    task.title,
                    task.subtitle,
                    task.instructions,
                    task.equipment,
                    task.safety_notes,
                    task.color,
                    task.priority.as_str(),
                    task.kid_friendly,
                    task.points,
                    task.active,
                    task.created_at
                ],
            )
            .map_err(StoreError::from)?;
        Ok(task)
    }

    pub fn list_active_ward_tasks(&self, ward_id: Uuid) -> StoreResult<Vec<WardTask>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ward_id, title, subtitle, instructions, equipment, safety_notes,
                        color, priority, kid_friendly, points, active, created_at
                 FROM ward_tasks WHERE ward_id = ?1 AND active = 1 ORDER BY title",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![ward_id.to_string()], ward_task_row)
            .map_err(StoreError::from)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(StoreError::from)?.into_ward_task()?);
        }
        Ok(tasks)
    }

    fn get_ward_task(&self, id: &str) -> StoreResult<Option<WardTask>> {
        self.conn
            .query_row(
                "SELECT id, ward_id, title, subtitle, instructions, equipment, safety_notes,
                        color, priority, kid_friendly, points, active, created_at
                 FROM ward_tasks WHERE id = ?1",
                params![id],
                ward_task_row,
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_ward_task())
            .transpose()
    }

    // ── Profiles ──────────────────────────────────────────────────────

    pub fn upsert_profile(
        &self,
        user_id: Uuid,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> StoreResult<Profile> {
        self.conn
            .execute(
                "INSERT INTO profiles (user_id, display_name, avatar_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url",
                params![user_id.to_string(), display_name, avatar_url],
            )
            .map_err(StoreError::from)?;
        Ok(Profile {
            user_id,
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
        })
    }

    pub fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        self.conn
            .query_row(
                "SELECT user_id, display_name, avatar_url FROM profiles WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|(uid, display_name, avatar_url)| {
                Ok(Profile {
                    user_id: parse_uuid(&uid, "profiles.user_id")?,
                    display_name,
                    avatar_url,
                })
            })
            .transpose()
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn get_session(&self, id: Uuid) -> StoreResult<Option<CleaningSession>> {
        self.get_session_by(SESSION_BY_ID, &id.to_string())
    }

    pub fn find_session_by_schedule(&self, schedule_id: Uuid) -> StoreResult<Option<CleaningSession>> {
        self.get_session_by(SESSION_BY_SCHEDULE, &schedule_id.to_string())
    }

    fn get_session_by(&self, sql: &str, key: &str) -> StoreResult<Option<CleaningSession>> {
        self.conn
            .query_row(sql, params![key], session_row)
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_session())
            .transpose()
    }

    /// Atomically materialize the session for a schedule entry: one insert
    /// guarded by `UNIQUE(schedule_id)`, task copies only when this call won
    /// the insert. Returns the session, whether this call created it, and
    /// the tasks it created (empty when reusing).
    pub fn materialize_session(
        &self,
        schedule: &CleaningSchedule,
        share_code: &str,
        created_by: Uuid,
    ) -> StoreResult<(CleaningSession, bool, Vec<SessionTask>)> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::from)?;

        let now = now_rfc3339();
        let session_id = Uuid::new_v4();
        let inserted = tx
            .execute(
                "INSERT INTO cleaning_sessions
                    (id, ward_id, schedule_id, name, session_date, share_code, status,
                     created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8, ?8)
                 ON CONFLICT(schedule_id) DO NOTHING",
                params![
                    session_id.to_string(),
                    schedule.ward_id.to_string(),
                    schedule.id.to_string(),
                    schedule.name,
                    schedule.session_date,
                    share_code,
                    created_by.to_string(),
                    now
                ],
            )
            .map_err(StoreError::from)?;

        let mut created_tasks = Vec::new();
        if inserted == 1 {
            let catalog = self.list_active_ward_tasks(schedule.ward_id)?;
            for ward_task in &catalog {
                let task = SessionTask {
                    id: Uuid::new_v4(),
                    session_id,
                    task_id: ward_task.id,
                    status: TaskStatus::Todo,
                    assigned_to: None,
                    assigned_to_temp_user: None,
                    assigned_at: None,
                    completed_at: None,
                    points_awarded: None,
                    created_at: now.clone(),
                };
                tx.execute(
                    "INSERT INTO session_tasks (id, session_id, task_id, status, created_at)
                     VALUES (?1, ?2, ?3, 'todo', ?4)",
                    params![
                        task.id.to_string(),
                        task.session_id.to_string(),
                        task.task_id.to_string(),
                        task.created_at
                    ],
                )
                .map_err(StoreError::from)?;
                created_tasks.push(task);
            }
        }

        tx.commit().map_err(StoreError::from)?;

        let session = self
            .find_session_by_schedule(schedule.id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "session",
                id: format!("schedule {}", schedule.id),
            })?;
        Ok((session, inserted == 1, created_tasks))
    }

    pub fn complete_session(&self, id: Uuid) -> StoreResult<CleaningSession> {
        let now = now_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE cleaning_sessions
                 SET status = 'completed', completed_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'active'",
                params![now, id.to_string()],
            )
            .map_err(StoreError::from)?;
        let session = self.get_session(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "session",
            id: id.to_string(),
        })?;
        if changed == 0 {
            return Err(StoreError::Conflict("session is already completed".into()));
        }
        Ok(session)
    }

    // ── Session tasks ─────────────────────────────────────────────────

    pub fn get_session_task(&self, id: Uuid) -> StoreResult<Option<SessionTask>> {
        self.conn
            .query_row(
                "SELECT id, session_id, task_id, status, assigned_to, assigned_to_temp_user,
                        assigned_at, completed_at, points_awarded, created_at
                 FROM session_tasks WHERE id = ?1",
                params![id.to_string()],
                session_task_row,
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_session_task())
            .transpose()
    }

    pub fn list_session_tasks(&self, session_id: Uuid) -> StoreResult<Vec<SessionTask>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, session_id, task_id, status, assigned_to, assigned_to_temp_user,
                        assigned_at, completed_at, points_awarded, created_at
                 FROM session_tasks WHERE session_id = ?1 ORDER BY created_at, id",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![session_id.to_string()], session_task_row)
            .map_err(StoreError::from)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(StoreError::from)?.into_session_task()?);
        }
        Ok(tasks)
    }

    /// Conditional claim: the single place the todo→doing race is arbitrated.
    /// Exactly one concurrent caller matches the `status = 'todo'` guard.
    pub fn assign_task(&self, id: Uuid, identity: &Identity) -> StoreResult<SessionTask> {
        let (user_id, temp_user_id) = identity.columns();
        let changed = self
            .conn
            .execute(
                "UPDATE session_tasks
                 SET status = 'doing', assigned_to = ?1, assigned_to_temp_user = ?2,
                     assigned_at = ?3
                 WHERE id = ?4 AND status = 'todo'",
                params![
                    user_id.map(|u| u.to_string()),
                    temp_user_id,
                    now_rfc3339(),
                    id.to_string()
                ],
            )
            .map_err(StoreError::from)?;
        let task = self.get_session_task(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "session task",
            id: id.to_string(),
        })?;
        if changed == 0 {
            return Err(StoreError::Conflict(
                "task was already claimed by someone else".into(),
            ));
        }
        Ok(task)
    }

    /// Completion endpoint: doing→done by the current assignee only, points
    /// snapshotted from the catalog in the same statement.
    pub fn complete_task(&self, id: Uuid, identity: &Identity) -> StoreResult<SessionTask> {
        let (user_id, temp_user_id) = identity.columns();
        let changed = self
            .conn
            .execute(
                "UPDATE session_tasks
                 SET status = 'done', completed_at = ?1,
                     points_awarded = (SELECT points FROM ward_tasks
                                       WHERE ward_tasks.id = session_tasks.task_id)
                 WHERE id = ?2 AND status = 'doing'
                   AND ((?3 IS NOT NULL AND assigned_to = ?3)
                        OR (?4 IS NOT NULL AND assigned_to_temp_user = ?4))",
                params![
                    now_rfc3339(),
                    id.to_string(),
                    user_id.map(|u| u.to_string()),
                    temp_user_id
                ],
            )
            .map_err(StoreError::from)?;
        let task = self.get_session_task(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "session task",
            id: id.to_string(),
        })?;
        if changed == 0 {
            return Err(StoreError::Conflict(
                "task is not in progress for this participant".into(),
            ));
        }
        Ok(task)
    }

    /// Cancel a claim: doing→todo by the current assignee only.
    pub fn cancel_task(&self, id: Uuid, identity: &Identity) -> StoreResult<SessionTask> {
        let (user_id, temp_user_id) = identity.columns();
        let changed = self
            .conn
            .execute(
                "UPDATE session_tasks
                 SET status = 'todo', assigned_to = NULL, assigned_to_temp_user = NULL,
                     assigned_at = NULL
                 WHERE id = ?1 AND status = 'doing'
                   AND ((?2 IS NOT NULL AND assigned_to = ?2)
                        OR (?3 IS NOT NULL AND assigned_to_temp_user = ?3))",
                params![
                    id.to_string(),
                    user_id.map(|u| u.to_string()),
                    temp_user_id
                ],
            )
            .map_err(StoreError::from)?;
        let task = self.get_session_task(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "session task",
            id: id.to_string(),
        })?;
        if changed == 0 {
            return Err(StoreError::Conflict(
                "task is not in progress for this participant".into(),
            ));
        }
        Ok(task)
    }

    /// Enrich a session task with its catalog entry and resolved assignee
    /// display info.
    pub fn enrich_task(&self, task: SessionTask) -> StoreResult<BoardTask> {
        let catalog = self
            .get_ward_task(&task.task_id.to_string())?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ward task",
                id: task.task_id.to_string(),
            })?;
        let (assignee_name, assignee_avatar) = match task.assignee() {
            Some(identity) => self.resolve_display(task.session_id, &identity)?,
            None => (None, None),
        };
        Ok(BoardTask {
            task,
            catalog,
            assignee_name,
            assignee_avatar,
        })
    }

    /// Display name and avatar for an identity within a session: profile
    /// lookup for authenticated users, participant row otherwise.
    fn resolve_display(
        &self,
        session_id: Uuid,
        identity: &Identity,
    ) -> StoreResult<(Option<String>, Option<String>)> {
        if let Identity::Authenticated { user_id } = identity
            && let Some(profile) = self.get_profile(*user_id)?
        {
            return Ok((Some(profile.display_name), profile.avatar_url));
        }
        match self.find_participant(session_id, identity)? {
            Some(p) => Ok((Some(p.display_name), p.avatar_url)),
            None => Ok((None, None)),
        }
    }

    // ── Participants ──────────────────────────────────────────────────

    pub fn find_participant(
        &self,
        session_id: Uuid,
        identity: &Identity,
    ) -> StoreResult<Option<SessionParticipant>> {
        let (sql, key) = match identity {
            Identity::Authenticated { user_id } => (
                "SELECT id, session_id, user_id, temp_user_id, display_name, is_authenticated,
                        avatar_url, last_active_at, created_at
                 FROM session_participants WHERE session_id = ?1 AND user_id = ?2",
                user_id.to_string(),
            ),
            Identity::Anonymous { temp_user_id } => (
                "SELECT id, session_id, user_id, temp_user_id, display_name, is_authenticated,
                        avatar_url, last_active_at, created_at
                 FROM session_participants WHERE session_id = ?1 AND temp_user_id = ?2",
                temp_user_id.clone(),
            ),
        };
        self.conn
            .query_row(sql, params![session_id.to_string(), key], participant_row)
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_participant())
            .transpose()
    }

    pub fn get_participant(&self, id: Uuid) -> StoreResult<Option<SessionParticipant>> {
        self.conn
            .query_row(
                "SELECT id, session_id, user_id, temp_user_id, display_name, is_authenticated,
                        avatar_url, last_active_at, created_at
                 FROM session_participants WHERE id = ?1",
                params![id.to_string()],
                participant_row,
            )
            .optional()
            .map_err(StoreError::from)?
            .map(|r| r.into_participant())
            .transpose()
    }

    pub fn list_participants(&self, session_id: Uuid) -> StoreResult<Vec<SessionParticipant>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, session_id, user_id, temp_user_id, display_name, is_authenticated,
                        avatar_url, last_active_at, created_at
                 FROM session_participants WHERE session_id = ?1 ORDER BY created_at, id",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![session_id.to_string()], participant_row)
            .map_err(StoreError::from)?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row.map_err(StoreError::from)?.into_participant()?);
        }
        Ok(participants)
    }

    pub fn insert_participant(
        &self,
        session_id: Uuid,
        identity: &Identity,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> StoreResult<SessionParticipant> {
        let (user_id, temp_user_id) = identity.columns();
        let now = now_rfc3339();
        let participant = SessionParticipant {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            temp_user_id,
            display_name: display_name.to_string(),
            is_authenticated: identity.is_authenticated(),
            avatar_url: avatar_url.map(str::to_string),
            last_active_at: now.clone(),
            created_at: now,
        };
        self.conn
            .execute(
                "INSERT INTO session_participants
                    (id, session_id, user_id, temp_user_id, display_name, is_authenticated,
                     avatar_url, last_active_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    participant.id.to_string(),
                    participant.session_id.to_string(),
                    participant.user_id.map(|u| u.to_string()),
                    participant.temp_user_id,
                    participant.display_name,
                    participant.is_authenticated,
                    participant.avatar_url,
                    participant.last_active_at,
                    participant.created_at
                ],
            )
            .map_err(StoreError::from)?;
        Ok(participant)
    }

    pub fn heartbeat_participant(&self, id: Uuid) -> StoreResult<SessionParticipant> {
        self.conn
            .execute(
                "UPDATE session_participants SET last_active_at = ?1 WHERE id = ?2",
                params![now_rfc3339(), id.to_string()],
            )
            .map_err(StoreError::from)?;
        self.get_participant(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "participant",
            id: id.to_string(),
        })
    }

    // ── Task viewers ──────────────────────────────────────────────────

    /// Upsert the (task, participant) viewing marker; a repeat open
    /// refreshes `started_at` instead of duplicating the row.
    pub fn upsert_viewer(
        &self,
        session_task_id: Uuid,
        participant_id: Uuid,
    ) -> StoreResult<(TaskViewer, bool)> {
        let existing = self
            .conn
            .query_row(
                "SELECT id FROM task_viewers WHERE session_task_id = ?1 AND participant_id = ?2",
                params![session_task_id.to_string(), participant_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        let created = existing.is_none();

        let now = now_rfc3339();
        self.conn
            .execute(
                "INSERT INTO task_viewers (id, session_task_id, participant_id, started_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_task_id, participant_id)
                 DO UPDATE SET started_at = excluded.started_at",
                params![
                    Uuid::new_v4().to_string(),
                    session_task_id.to_string(),
                    participant_id.to_string(),
                    now
                ],
            )
            .map_err(StoreError::from)?;

        let viewer = self
            .conn
            .query_row(
                "SELECT id, session_task_id, participant_id, started_at
                 FROM task_viewers WHERE session_task_id = ?1 AND participant_id = ?2",
                params![session_task_id.to_string(), participant_id.to_string()],
                viewer_row,
            )
            .map_err(StoreError::from)?
            .into_viewer()?;
        Ok((viewer, created))
    }

    /// Remove the (task, participant) viewing marker(s). Returns the removed
    /// rows so the caller can announce them.
    pub fn delete_viewer(
        &self,
        session_task_id: Uuid,
        participant_id: Uuid,
    ) -> StoreResult<Vec<TaskViewer>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, session_task_id, participant_id, started_at
                 FROM task_viewers WHERE session_task_id = ?1 AND participant_id = ?2",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(
                params![session_task_id.to_string(), participant_id.to_string()],
                viewer_row,
            )
            .map_err(StoreError::from)?;
        let mut removed = Vec::new();
        for row in rows {
            removed.push(row.map_err(StoreError::from)?.into_viewer()?);
        }

        self.conn
            .execute(
                "DELETE FROM task_viewers WHERE session_task_id = ?1 AND participant_id = ?2",
                params![session_task_id.to_string(), participant_id.to_string()],
            )
            .map_err(StoreError::from)?;
        Ok(removed)
    }

    pub fn list_viewers(&self, session_id: Uuid) -> StoreResult<Vec<TaskViewer>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT v.id, v.session_task_id, v.participant_id, v.started_at
                 FROM task_viewers v
                 JOIN session_tasks t ON t.id = v.session_task_id
                 WHERE t.session_id = ?1 ORDER BY v.started_at",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![session_id.to_string()], viewer_row)
            .map_err(StoreError::from)?;
        let mut viewers = Vec::new();
        for row in rows {
            viewers.push(row.map_err(StoreError::from)?.into_viewer()?);
        }
        Ok(viewers)
    }
}

const SESSION_BY_ID: &str = "SELECT id, ward_id, schedule_id, name, session_date, share_code,
        status, completed_at, created_by, created_at, updated_at
 FROM cleaning_sessions WHERE id = ?1";

const SESSION_BY_SCHEDULE: &str = "SELECT id, ward_id, schedule_id, name, session_date, share_code,
        status, completed_at, created_by, created_at, updated_at
 FROM cleaning_sessions WHERE schedule_id = ?1";

/// Input for a new catalog entry.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewWardTask {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub safety_notes: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default)]
    pub kid_friendly: bool,
    #[serde(default)]
    pub points: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Normal
}

fn default_active() -> bool {
    true
}

// ── Store facade ──────────────────────────────────────────────────────

/// The board's storage service: database access plus the change feed.
/// Every mutation of a feed-scoped table publishes exactly one event,
/// after the write committed.
#[derive(Clone)]
pub struct BoardStore {
    db: DbHandle,
    feed: FeedBus,
}

impl BoardStore {
    pub fn new(db: DbHandle, feed: FeedBus) -> Self {
        Self { db, feed }
    }

    pub fn feed(&self) -> &FeedBus {
        &self.feed
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn get_session(&self, id: Uuid) -> StoreResult<Option<CleaningSession>> {
        self.db.call(move |db| db.get_session(id)).await
    }

    pub async fn find_session_by_schedule(
        &self,
        schedule_id: Uuid,
    ) -> StoreResult<Option<CleaningSession>> {
        self.db
            .call(move |db| db.find_session_by_schedule(schedule_id))
            .await
    }

    pub async fn next_schedule(
        &self,
        ward_id: Uuid,
        today: String,
    ) -> StoreResult<Option<CleaningSchedule>> {
        self.db
            .call(move |db| db.next_schedule(ward_id, &today))
            .await
    }

    pub async fn get_board_task(&self, id: Uuid) -> StoreResult<Option<BoardTask>> {
        self.db
            .call(move |db| match db.get_session_task(id)? {
                Some(task) => Ok(Some(db.enrich_task(task)?)),
                None => Ok(None),
            })
            .await
    }

    pub async fn get_participant(&self, id: Uuid) -> StoreResult<Option<SessionParticipant>> {
        self.db.call(move |db| db.get_participant(id)).await
    }

    pub async fn find_participant(
        &self,
        session_id: Uuid,
        identity: Identity,
    ) -> StoreResult<Option<SessionParticipant>> {
        self.db
            .call(move |db| db.find_participant(session_id, &identity))
            .await
    }

    pub async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        self.db.call(move |db| db.get_profile(user_id)).await
    }

    pub async fn list_wards(&self) -> StoreResult<Vec<Ward>> {
        self.db.call(|db| db.list_wards()).await
    }

    pub async fn get_ward(&self, id: Uuid) -> StoreResult<Option<Ward>> {
        self.db.call(move |db| db.get_ward(id)).await
    }

    /// Full board payload for a session; also the resync source of truth.
    pub async fn board_view(&self, session_id: Uuid) -> StoreResult<BoardView> {
        self.db
            .call(move |db| {
                let session = db.get_session(session_id)?.ok_or_else(|| StoreError::NotFound {
                    entity: "session",
                    id: session_id.to_string(),
                })?;
                let mut tasks = Vec::new();
                for task in db.list_session_tasks(session_id)? {
                    tasks.push(db.enrich_task(task)?);
                }
                Ok(BoardView {
                    session,
                    tasks,
                    participants: db.list_participants(session_id)?,
                    viewers: db.list_viewers(session_id)?,
                })
            })
            .await
    }

    // ── Ward administration ───────────────────────────────────────────

    pub async fn create_ward(&self, name: String) -> StoreResult<Ward> {
        self.db.call(move |db| db.create_ward(&name)).await
    }

    pub async fn create_schedule(
        &self,
        ward_id: Uuid,
        name: String,
        session_date: String,
    ) -> StoreResult<CleaningSchedule> {
        self.db
            .call(move |db| db.create_schedule(ward_id, &name, &session_date))
            .await
    }

    pub async fn create_ward_task(
        &self,
        ward_id: Uuid,
        input: NewWardTask,
    ) -> StoreResult<WardTask> {
        self.db
            .call(move |db| db.create_ward_task(ward_id, input))
            .await
    }

    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        display_name: String,
        avatar_url: Option<String>,
    ) -> StoreResult<Profile> {
        self.db
            .call(move |db| db.upsert_profile(user_id, &display_name, avatar_url.as_deref()))
            .await
    }

    // ── Session lifecycle ─────────────────────────────────────────────

    pub async fn materialize_session(
        &self,
        schedule: CleaningSchedule,
        share_code: String,
        created_by: Uuid,
    ) -> StoreResult<(CleaningSession, bool)> {
        let (session, created, tasks) = self
            .db
            .call(move |db| db.materialize_session(&schedule, &share_code, created_by))
            .await?;
        if created {
            self.feed.publish(ChangeEvent::CleaningSessions {
                op: ChangeOp::Insert,
                session_id: session.id,
                new: Some(session.clone()),
                old: None,
            });
            for task in tasks {
                self.feed.publish(ChangeEvent::SessionTasks {
                    op: ChangeOp::Insert,
                    session_id: session.id,
                    new: Some(task),
                    old: None,
                });
            }
        }
        Ok((session, created))
    }

    pub async fn complete_session(&self, id: Uuid) -> StoreResult<CleaningSession> {
        let old = self.get_session(id).await?;
        let session = self.db.call(move |db| db.complete_session(id)).await?;
        self.feed.publish(ChangeEvent::CleaningSessions {
            op: ChangeOp::Update,
            session_id: session.id,
            new: Some(session.clone()),
            old,
        });
        Ok(session)
    }

    // ── Task transitions ──────────────────────────────────────────────

    pub async fn assign_task(&self, id: Uuid, identity: Identity) -> StoreResult<BoardTask> {
        self.task_transition(id, move |db| db.assign_task(id, &identity))
            .await
    }

    pub async fn complete_task(&self, id: Uuid, identity: Identity) -> StoreResult<BoardTask> {
        self.task_transition(id, move |db| db.complete_task(id, &identity))
            .await
    }

    pub async fn cancel_task(&self, id: Uuid, identity: Identity) -> StoreResult<BoardTask> {
        self.task_transition(id, move |db| db.cancel_task(id, &identity))
            .await
    }

    async fn task_transition<F>(&self, id: Uuid, f: F) -> StoreResult<BoardTask>
    where
        F: FnOnce(&BoardDb) -> StoreResult<SessionTask> + Send + 'static,
    {
        let (old, enriched) = self
            .db
            .call(move |db| {
                let old = db.get_session_task(id)?;
                let updated = f(db)?;
                Ok((old, db.enrich_task(updated)?))
            })
            .await?;
        self.feed.publish(ChangeEvent::SessionTasks {
            op: ChangeOp::Update,
            session_id: enriched.task.session_id,
            new: Some(enriched.task.clone()),
            old,
        });
        Ok(enriched)
    }

    // ── Participants ──────────────────────────────────────────────────

    pub async fn insert_participant(
        &self,
        session_id: Uuid,
        identity: Identity,
        display_name: String,
        avatar_url: Option<String>,
    ) -> StoreResult<SessionParticipant> {
        let participant = self
            .db
            .call(move |db| {
                db.insert_participant(session_id, &identity, &display_name, avatar_url.as_deref())
            })
            .await?;
        self.feed.publish(ChangeEvent::SessionParticipants {
            op: ChangeOp::Insert,
            session_id,
            new: Some(participant.clone()),
            old: None,
        });
        Ok(participant)
    }

    pub async fn heartbeat_participant(&self, id: Uuid) -> StoreResult<SessionParticipant> {
        let old = self.get_participant(id).await?;
        let participant = self.db.call(move |db| db.heartbeat_participant(id)).await?;
        self.feed.publish(ChangeEvent::SessionParticipants {
            op: ChangeOp::Update,
            session_id: participant.session_id,
            new: Some(participant.clone()),
            old,
        });
        Ok(participant)
    }

    // ── Presence ──────────────────────────────────────────────────────

    pub async fn upsert_viewer(
        &self,
        session_task_id: Uuid,
        participant_id: Uuid,
    ) -> StoreResult<TaskViewer> {
        let (viewer, session_id, created) = self
            .db
            .call(move |db| {
                let task = db.get_session_task(session_task_id)?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "session task",
                        id: session_task_id.to_string(),
                    }
                })?;
                let (viewer, created) = db.upsert_viewer(session_task_id, participant_id)?;
                Ok((viewer, task.session_id, created))
            })
            .await?;
        self.feed.publish(ChangeEvent::TaskViewers {
            op: if created {
                ChangeOp::Insert
            } else {
                ChangeOp::Update
            },
            session_id,
            new: Some(viewer.clone()),
            old: None,
        });
        Ok(viewer)
    }

    pub async fn delete_viewer(
        &self,
        session_task_id: Uuid,
        participant_id: Uuid,
    ) -> StoreResult<()> {
        let (removed, session_id) = self
            .db
            .call(move |db| {
                let task = db.get_session_task(session_task_id)?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "session task",
                        id: session_task_id.to_string(),
                    }
                })?;
                let removed = db.delete_viewer(session_task_id, participant_id)?;
                Ok((removed, task.session_id))
            })
            .await?;
        for viewer in removed {
            self.feed.publish(ChangeEvent::TaskViewers {
                op: ChangeOp::Delete,
                session_id,
                new: None,
                old: Some(viewer),
            });
        }
        Ok(())
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

fn parse_uuid(s: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::backend(anyhow!("corrupt {}: {}", column, e)))
}

fn parse_opt_uuid(s: Option<String>, column: &'static str) -> StoreResult<Option<Uuid>> {
    s.map(|v| parse_uuid(&v, column)).transpose()
}

struct WardRow {
    id: String,
    name: String,
    created_at: String,
}

impl WardRow {
    fn into_ward(self) -> StoreResult<Ward> {
        Ok(Ward {
            id: parse_uuid(&self.id, "wards.id")?,
            name: self.name,
            created_at: self.created_at,
        })
    }
}

struct ScheduleRow {
    id: String,
    ward_id: String,
    name: String,
    session_date: String,
    created_at: String,
}

impl ScheduleRow {
    fn into_schedule(self) -> StoreResult<CleaningSchedule> {
        Ok(CleaningSchedule {
            id: parse_uuid(&self.id, "cleaning_schedules.id")?,
            ward_id: parse_uuid(&self.ward_id, "cleaning_schedules.ward_id")?,
            name: self.name,
            session_date: self.session_date,
            created_at: self.created_at,
        })
    }
}

struct WardTaskRow {
    id: String,
    ward_id: String,
    title: String,
    subtitle: Option<String>,
    instructions: Option<String>,
    equipment: Option<String>,
    safety_notes: Option<String>,
    color: Option<String>,
    priority: String,
    kid_friendly: bool,
    points: i64,
    active: bool,
    created_at: String,
}

fn ward_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WardTaskRow> {
    Ok(WardTaskRow {
        id: row.get(0)?,
        ward_id: row.get(1)?,
        title: row.get(2)?,
        subtitle: row.get(3)?,
        instructions: row.get(4)?,
        equipment: row.get(5)?,
        safety_notes: row.get(6)?,
        color: row.get(7)?,
        priority: row.get(8)?,
        kid_friendly: row.get(9)?,
        points: row.get(10)?,
        active: row.get(11)?,
        created_at: row.get(12)?,
    })
}

impl WardTaskRow {
    fn into_ward_task(self) -> StoreResult<WardTask> {
        let priority = TaskPriority::from_str(&self.priority)
            .map_err(|e| StoreError::backend(anyhow!("corrupt ward_tasks.priority: {}", e)))?;
        Ok(WardTask {
            id: parse_uuid(&self.id, "ward_tasks.id")?,
            ward_id: parse_uuid(&self.ward_id, "ward_tasks.ward_id")?,
            title: self.title,
            subtitle: self.subtitle,
            instructions: self.instructions,
            equipment: self.equipment,
            safety_notes: self.safety_notes,
            color: self.color,
            priority,
            kid_friendly: self.kid_friendly,
            points: self.points,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

struct SessionRow {
    id: String,
    ward_id: String,
    schedule_id: Option<String>,
    name: String,
    session_date: String,
    share_code: String,
    status: String,
    completed_at: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        ward_id: row.get(1)?,
        schedule_id: row.get(2)?,
        name: row.get(3)?,
        session_date: row.get(4)?,
        share_code: row.get(5)?,
        status: row.get(6)?,
        completed_at: row.get(7)?,
        created_by: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl SessionRow {
    fn into_session(self) -> StoreResult<CleaningSession> {
        let status = SessionStatus::from_str(&self.status)
            .map_err(|e| StoreError::backend(anyhow!("corrupt cleaning_sessions.status: {}", e)))?;
        Ok(CleaningSession {
            id: parse_uuid(&self.id, "cleaning_sessions.id")?,
            ward_id: parse_uuid(&self.ward_id, "cleaning_sessions.ward_id")?,
            schedule_id: parse_opt_uuid(self.schedule_id, "cleaning_sessions.schedule_id")?,
            name: self.name,
            session_date: self.session_date,
            share_code: self.share_code,
            status,
            completed_at: self.completed_at,
            created_by: parse_opt_uuid(self.created_by, "cleaning_sessions.created_by")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct SessionTaskRow {
    id: String,
    session_id: String,
    task_id: String,
    status: String,
    assigned_to: Option<String>,
    assigned_to_temp_user: Option<String>,
    assigned_at: Option<String>,
    completed_at: Option<String>,
    points_awarded: Option<i64>,
    created_at: String,
}

fn session_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionTaskRow> {
    Ok(SessionTaskRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        task_id: row.get(2)?,
        status: row.get(3)?,
        assigned_to: row.get(4)?,
        assigned_to_temp_user: row.get(5)?,
        assigned_at: row.get(6)?,
        completed_at: row.get(7)?,
        points_awarded: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl SessionTaskRow {
    fn into_session_task(self) -> StoreResult<SessionTask> {
        let status = TaskStatus::from_str(&self.status)
            .map_err(|e| StoreError::backend(anyhow!("corrupt session_tasks.status: {}", e)))?;
        Ok(SessionTask {
            id: parse_uuid(&self.id, "session_tasks.id")?,
            session_id: parse_uuid(&self.session_id, "session_tasks.session_id")?,
            task_id: parse_uuid(&self.task_id, "session_tasks.task_id")?,
            status,
            assigned_to: parse_opt_uuid(self.assigned_to, "session_tasks.assigned_to")?,
            assigned_to_temp_user: self.assigned_to_temp_user,
            assigned_at: self.assigned_at,
            completed_at: self.completed_at,
            points_awarded: self.points_awarded,
            created_at: self.created_at,
        })
    }
}

struct ParticipantRow {
    id: String,
    session_id: String,
    user_id: Option<String>,
    temp_user_id: Option<String>,
    display_name: String,
    is_authenticated: bool,
    avatar_url: Option<String>,
    last_active_at: String,
    created_at: String,
}

fn participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        temp_user_id: row.get(3)?,
        display_name: row.get(4)?,
        is_authenticated: row.get(5)?,
        avatar_url: row.get(6)?,
        last_active_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl ParticipantRow {
    fn into_participant(self) -> StoreResult<SessionParticipant> {
        Ok(SessionParticipant {
            id: parse_uuid(&self.id, "session_participants.id")?,
            session_id: parse_uuid(&self.session_id, "session_participants.session_id")?,
            user_id: parse_opt_uuid(self.user_id, "session_participants.user_id")?,
            temp_user_id: self.temp_user_id,
            display_name: self.display_name,
            is_authenticated: self.is_authenticated,
            avatar_url: self.avatar_url,
            last_active_at: self.last_active_at,
            created_at: self.created_at,
        })
    }
}

struct ViewerRow {
    id: String,
    session_task_id: String,
    participant_id: String,
    started_at: String,
}

fn viewer_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ViewerRow> {
    Ok(ViewerRow {
        id: row.get(0)?,
        session_task_id: row.get(1)?,
        participant_id: row.get(2)?,
        started_at: row.get(3)?,
    })
}

impl ViewerRow {
    fn into_viewer(self) -> StoreResult<TaskViewer> {
        Ok(TaskViewer {
            id: parse_uuid(&self.id, "task_viewers.id")?,
            session_task_id: parse_uuid(&self.session_task_id, "task_viewers.session_task_id")?,
            participant_id: parse_uuid(&self.participant_id, "task_viewers.participant_id")?,
            started_at: self.started_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
