//! File-based session store: one JSON document per conversation.
//!
//! Storage location: `<dir>/<session_id>.json`, by default under
//! `~/.taor/sessions/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taor_core::error::SessionError;
use taor_core::message::Conversation;
use taor_core::session::SessionStore;
use tracing::debug;

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store sessions under `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a session id. Ids that could escape the directory are rejected.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SessionError::Storage(format!(
                "Invalid session id '{session_id}'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, conversation: &Conversation) -> Result<(), SessionError> {
        let path = self.path_for(&conversation.id.0)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SessionError::Storage(format!("Failed to create sessions directory: {e}"))
        })?;

        let content = serde_json::to_string_pretty(conversation)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {e}")))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {e}")))?;

        debug!(
            path = %path.display(),
            messages = conversation.messages.len(),
            "Session saved"
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Conversation, SessionError> {
        let path = self.path_for(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(session_id.to_string()));
            }
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read session file: {e}"
                )));
            }
        };
        let conversation: Conversation = serde_json::from_str(&content)
            .map_err(|e| SessionError::Storage(format!("Corrupted session file: {e}")))?;
        debug!(session_id, messages = conversation.messages.len(), "Session loaded");
        Ok(conversation)
    }
}
