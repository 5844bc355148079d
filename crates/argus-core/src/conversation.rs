//! Conversation transcript model and store
//!
//! The transcript store is an external collaborator; this module fixes its
//! interface and ships an in-memory implementation for the server default and
//! for tests. Durable backends plug in behind [`ConversationStore`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Role of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End-user input
    User,
    /// Assistant output (text, reasoning, tool-call declarations)
    Assistant,
    /// Result of one tool invocation, keyed by `tool_call_id`
    Tool,
}

/// A tool call declared by an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDecl {
    /// Invocation id, matched against tool-result messages
    pub id: String,
    /// Tool name
    pub name: String,
    /// Invocation arguments
    pub args: Value,
}

/// One message of a persisted transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Who produced the message
    pub role: MessageRole,
    /// Message text (tool results store their output here)
    pub content: String,
    /// Reasoning text attached to an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Tool calls declared by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDecl>,
    /// For tool messages: the invocation this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool messages: the structured final result, distinct from the
    /// streamed output kept in `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    /// When the message was stored
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_result: None,
            created_at: Utc::now(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_result: None,
            created_at: Utc::now(),
        }
    }

    /// A tool-result message for the given invocation id.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_result: None,
            created_at: Utc::now(),
        }
    }

    /// Attach reasoning text (assistant messages).
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Attach tool-call declarations (assistant messages).
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallDecl>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Attach a structured final result (tool messages).
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.tool_result = Some(result);
        self
    }
}

/// A conversation snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    /// Conversation id
    pub id: Uuid,
    /// Selected model
    pub model_name: String,
    /// Optional working directory for tool execution
    pub base_dir: Option<String>,
    /// Ordered transcript
    pub messages: Vec<StoredMessage>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// Summary view of a conversation (for list endpoints).
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: Uuid,
    /// Selected model
    pub model_name: String,
    /// Number of stored messages
    pub message_count: usize,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// Transcript storage boundary.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its id.
    async fn create(&self, model_name: String, base_dir: Option<String>) -> Result<Uuid>;

    /// Fetch a full snapshot.
    async fn get(&self, id: Uuid) -> Result<Conversation>;

    /// List summaries of all conversations, newest first.
    async fn list(&self) -> Vec<ConversationSummary>;

    /// Remove a conversation.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Append a message to the transcript.
    async fn append(&self, id: Uuid, message: StoredMessage) -> Result<()>;

    /// Update the working directory; `None` clears it.
    async fn set_base_dir(&self, id: Uuid, base_dir: Option<String>) -> Result<()>;

    /// Update the selected model.
    async fn set_model(&self, id: Uuid, model_name: String) -> Result<()>;
}

/// In-memory conversation store.
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl MemoryConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, model_name: String, base_dir: Option<String>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conversation = Conversation {
            id,
            model_name,
            base_dir,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.conversations.write().await.insert(id, conversation);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Conversation> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn list(&self) -> Vec<ConversationSummary> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .values()
            .map(|c| ConversationSummary {
                id: c.id,
                model_name: c.model_name.clone(),
                message_count: c.messages.len(),
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.conversations
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound(id))
    }

    async fn append(&self, id: Uuid, message: StoredMessage) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(Error::NotFound(id))?;
        conversation.messages.push(message);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_base_dir(&self, id: Uuid, base_dir: Option<String>) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(Error::NotFound(id))?;
        conversation.base_dir = base_dir;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_model(&self, id: Uuid, model_name: String) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&id).ok_or(Error::NotFound(id))?;
        conversation.model_name = model_name;
        conversation.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryConversationStore::new();
        let id = store.create("gpt-test".to_string(), None).await.unwrap();

        let conversation = store.get(id).await.unwrap();
        assert_eq!(conversation.model_name, "gpt-test");
        assert!(conversation.base_dir.is_none());
        assert!(conversation.messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = MemoryConversationStore::new();
        let id = store.create("m".to_string(), None).await.unwrap();

        store.append(id, StoredMessage::user("hi")).await.unwrap();
        store
            .append(id, StoredMessage::assistant("hello"))
            .await
            .unwrap();

        let conversation = store.get(id).await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, MessageRole::User);
        assert_eq!(conversation.messages[1].content, "hello");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryConversationStore::new();
        let id = store.create("m".to_string(), None).await.unwrap();

        store.delete(id).await.unwrap();
        assert!(matches!(store.get(id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_base_dir_roundtrip() {
        let store = MemoryConversationStore::new();
        let id = store.create("m".to_string(), None).await.unwrap();

        store
            .set_base_dir(id, Some("/tmp/work".to_string()))
            .await
            .unwrap();
        assert_eq!(
            store.get(id).await.unwrap().base_dir.as_deref(),
            Some("/tmp/work")
        );

        store.set_base_dir(id, None).await.unwrap();
        assert!(store.get(id).await.unwrap().base_dir.is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = MemoryConversationStore::new();
        let missing = Uuid::new_v4();
        assert!(matches!(store.get(missing).await, Err(Error::NotFound(_))));
        assert!(matches!(
            store.append(missing, StoredMessage::user("x")).await,
            Err(Error::NotFound(_))
        ));
    }
}
