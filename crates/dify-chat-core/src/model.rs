use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Longest conversation title derived from a query, in characters.
pub const TITLE_MAX_CHARS: usize = 30;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh random identifier for locally created records.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Signed-in local user. `id` is what the backend sees as `user`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// A configured Dify app endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group_name: String,
    pub api_url: String,
    pub api_key: String,
    #[serde(default)]
    pub visual_enabled: bool,
}

impl App {
    pub fn new(
        name: impl Into<String>,
        group_name: impl Into<String>,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            group_name: group_name.into(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            visual_enabled: false,
        }
    }

    /// Checks required fields and strips a trailing `/` from `api_url`.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        self.name = self.name.trim().to_string();
        self.group_name = self.group_name.trim().to_string();
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        self.api_key = self.api_key.trim().to_string();
        for (field, value) in [
            ("name", &self.name),
            ("group_name", &self.group_name),
            ("api_url", &self.api_url),
            ("api_key", &self.api_key),
        ] {
            if value.is_empty() {
                return Err(CoreError::Validation(format!("{field} must not be empty")));
            }
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "api_url must start with http:// or https://, got {:?}",
                self.api_url
            )));
        }
        Ok(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// File attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
    pub created_at: i64,
}

impl Message {
    /// Message stamped now, with a fresh local id.
    pub fn new(role: Role, conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            files: Vec::new(),
            created_at: now_millis(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileRef>) -> Self {
        self.files = files;
        self
    }
}

/// Locally stored conversation with its full message history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Backend conversation id.
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    /// New conversation titled after its first query.
    pub fn new(
        id: impl Into<String>,
        app_id: impl Into<String>,
        user_id: impl Into<String>,
        first_query: &str,
    ) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            name: title_from_query(first_query),
            app_id: app_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// First [`TITLE_MAX_CHARS`] characters of `query`, with `...` when cut.
pub fn title_from_query(query: &str) -> String {
    let query = query.trim();
    let mut chars = query.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_truncated_on_char_boundaries() {
        assert_eq!(title_from_query("short"), "short");
        let long = "你".repeat(31);
        assert_eq!(title_from_query(&long), format!("{}...", "你".repeat(30)));
        assert_eq!(title_from_query(&"a".repeat(30)), "a".repeat(30));
    }

    #[test]
    fn app_normalization_strips_slash_and_requires_fields() {
        let app = App::new("Bot", "Team", "https://api.dify.ai/v1/", "app-key")
            .normalized()
            .expect("valid");
        assert_eq!(app.api_url, "https://api.dify.ai/v1");

        let err = App::new("Bot", "", "https://x", "k").normalized().unwrap_err();
        assert_eq!(err, CoreError::Validation("group_name must not be empty".into()));
        assert!(App::new("Bot", "T", "api.dify.ai", "k").normalized().is_err());
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let msg = Message::new(Role::Assistant, "c-1", "hi");
        let json = serde_json::to_value(&msg).expect("json");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("files").is_none());
    }
}
