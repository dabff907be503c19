use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Create,
    Edit,
    Delete,
    CreateThread,
    DeleteThread,
    Reply,
}

impl ItemAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::CreateThread => "create_thread",
            Self::DeleteThread => "delete_thread",
            Self::Reply => "reply",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Applied,
    Planned,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Planned => "planned",
            Self::Failed => "failed",
        }
    }
}

/// One attempted operation against the remote platform. A failed item
/// never aborts the surrounding loop; it is recorded and the run moves on.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub name: String,
    pub action: ItemAction,
    pub status: ItemStatus,
    pub detail: Option<String>,
}

impl ItemResult {
    pub fn applied(name: impl Into<String>, action: ItemAction) -> Self {
        Self {
            name: name.into(),
            action,
            status: ItemStatus::Applied,
            detail: None,
        }
    }

    pub fn planned(name: impl Into<String>, action: ItemAction) -> Self {
        Self {
            name: name.into(),
            action,
            status: ItemStatus::Planned,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, action: ItemAction, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action,
            status: ItemStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FlatReport {
    pub created: usize,
    pub edited: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
    pub items: Vec<ItemResult>,
}

impl FlatReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ForumReport {
    pub threads_deleted: usize,
    pub threads_created: usize,
    pub replies_posted: usize,
    pub errors: Vec<String>,
    pub items: Vec<ItemResult>,
}

impl ForumReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderOutcome {
    Flat(FlatReport),
    Forum(ForumReport),
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub folder: String,
    pub outcome: FolderOutcome,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RunReport {
    pub success: bool,
    pub dry_run: bool,
    pub folders_processed: usize,
    pub folders_skipped: usize,
    pub failed_items: usize,
    pub request_count: usize,
    pub folders: Vec<FolderReport>,
}
