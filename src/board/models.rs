use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A congregational unit; the tenant boundary for schedules, catalog tasks,
/// and sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ward {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
}

/// One planned cleaning date for a ward. Sessions are materialized from
/// schedule entries on first visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSchedule {
    pub id: Uuid,
    pub ward_id: Uuid,
    pub name: String,
    /// ISO date (YYYY-MM-DD); string ordering is date ordering.
    pub session_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    DoFirst,
    Normal,
    DoLast,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoFirst => "do_first",
            Self::Normal => "normal",
            Self::DoLast => "do_last",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "do_first" => Ok(Self::DoFirst),
            "normal" => Ok(Self::Normal),
            "do_last" => Ok(Self::DoLast),
            _ => Err(format!("Invalid task priority: {}", s)),
        }
    }
}

/// Catalog entry owned by ward administrators. Read-only from the board's
/// perspective; `active` controls whether new sessions pick it up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardTask {
    pub id: Uuid,
    pub ward_id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub instructions: Option<String>,
    pub equipment: Option<String>,
    pub safety_notes: Option<String>,
    pub color: Option<String>,
    pub priority: TaskPriority,
    pub kid_friendly: bool,
    pub points: i64,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

/// One concrete cleaning event with its own task board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSession {
    pub id: Uuid,
    pub ward_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub name: String,
    pub session_date: String,
    pub share_code: String,
    pub status: SessionStatus,
    pub completed_at: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Who is acting: a signed-in user or an anonymous guest carrying a
/// client-persisted pseudo id. Exactly one of the two, by construction —
/// there is no state where both or neither are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Authenticated { user_id: Uuid },
    Anonymous { temp_user_id: String },
}

impl Identity {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Authenticated { user_id } => Some(*user_id),
            Self::Anonymous { .. } => None,
        }
    }

    pub fn temp_user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Anonymous { temp_user_id } => Some(temp_user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Split into the (user_id, temp_user_id) column pair stored on
    /// assignment and participant rows.
    pub fn columns(&self) -> (Option<Uuid>, Option<String>) {
        match self {
            Self::Authenticated { user_id } => (Some(*user_id), None),
            Self::Anonymous { temp_user_id } => (None, Some(temp_user_id.clone())),
        }
    }

    /// Rebuild from a column pair, preferring the stable user id.
    pub fn from_columns(user_id: Option<Uuid>, temp_user_id: Option<String>) -> Option<Self> {
        match (user_id, temp_user_id) {
            (Some(user_id), _) => Some(Self::Authenticated { user_id }),
            (None, Some(temp_user_id)) => Some(Self::Anonymous { temp_user_id }),
            (None, None) => None,
        }
    }

    /// Stable dedup key: user id wins over temp id.
    pub fn key(&self) -> String {
        match self {
            Self::Authenticated { user_id } => format!("u:{}", user_id),
            Self::Anonymous { temp_user_id } => format!("t:{}", temp_user_id),
        }
    }
}

/// One catalog task's instance inside a session; the hot mutable row of the
/// board. Assignee columns and `assigned_at` are populated iff status is
/// doing or done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTask {
    pub id: Uuid,
    pub session_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub assigned_to: Option<Uuid>,
    pub assigned_to_temp_user: Option<String>,
    pub assigned_at: Option<String>,
    pub completed_at: Option<String>,
    pub points_awarded: Option<i64>,
    pub created_at: String,
}

impl SessionTask {
    pub fn assignee(&self) -> Option<Identity> {
        Identity::from_columns(self.assigned_to, self.assigned_to_temp_user.clone())
    }

    pub fn is_assigned_to(&self, identity: &Identity) -> bool {
        self.assignee().as_ref() == Some(identity)
    }
}

/// An actor registered as present in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParticipant {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub temp_user_id: Option<String>,
    pub display_name: String,
    pub is_authenticated: bool,
    /// Stored only for anonymous participants; authenticated avatars come
    /// from the profile lookup.
    pub avatar_url: Option<String>,
    pub last_active_at: String,
    pub created_at: String,
}

impl SessionParticipant {
    pub fn identity(&self) -> Option<Identity> {
        Identity::from_columns(self.user_id, self.temp_user_id.clone())
    }

    /// Dedup key for display: identity if present, else the row id.
    pub fn identity_key(&self) -> String {
        self.identity()
            .map(|i| i.key())
            .unwrap_or_else(|| format!("p:{}", self.id))
    }
}

/// Ephemeral marker that a participant has a task's detail view open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskViewer {
    pub id: Uuid,
    pub session_task_id: Uuid,
    pub participant_id: Uuid,
    pub started_at: String,
}

/// Display info for an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

// ── View types ────────────────────────────────────────────────────────

/// A session task joined with its catalog entry and resolved assignee
/// display info. This is what the board renders and what the synchronizer
/// keeps in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardTask {
    #[serde(flatten)]
    pub task: SessionTask,
    pub catalog: WardTask,
    pub assignee_name: Option<String>,
    pub assignee_avatar: Option<String>,
}

/// Full board payload for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub session: CleaningSession,
    pub tasks: Vec<BoardTask>,
    pub participants: Vec<SessionParticipant>,
    pub viewers: Vec<TaskViewer>,
}
