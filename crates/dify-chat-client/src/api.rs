//! Request and response bodies of the Dify app API.
//!
//! Response types default every field so that older or newer backends with
//! a slightly different shape still decode.

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// A user query for `POST /chat-messages`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub query: String,
    pub user: String,
    /// Continue this conversation; `None` starts a new one.
    pub conversation_id: Option<String>,
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub files: Vec<ChatFile>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user: user.into(),
            conversation_id: None,
            inputs: serde_json::Map::new(),
            files: Vec::new(),
        }
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.conversation_id = (!id.trim().is_empty()).then_some(id);
        self
    }

    pub fn input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn file(mut self, file: ChatFile) -> Self {
        self.files.push(file);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.query.trim().is_empty() && self.files.is_empty() {
            return Err(ClientError::Validation(
                "query must not be empty when no files are attached".into(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(ClientError::Validation("user must not be empty".into()));
        }
        Ok(())
    }

    /// JSON body with `response_mode` fixed to `streaming`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "inputs": self.inputs,
            "query": self.query,
            "response_mode": "streaming",
            "conversation_id": self.conversation_id.as_deref().unwrap_or(""),
            "user": self.user,
            "files": self.files,
        })
    }
}

/// File reference attached to a chat request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

impl ChatFile {
    /// Image reachable by URL.
    pub fn remote_image(url: impl Into<String>) -> Self {
        Self {
            kind: "image".into(),
            transfer_method: TransferMethod::RemoteUrl,
            url: Some(url.into()),
            upload_file_id: None,
        }
    }

    /// Image previously sent through `POST /files/upload`.
    pub fn uploaded_image(upload_file_id: impl Into<String>) -> Self {
        Self {
            kind: "image".into(),
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: Some(upload_file_id.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    RemoteUrl,
    LocalFile,
}

/// Response of `GET /parameters`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppParameters {
    #[serde(default)]
    pub opening_statement: Option<String>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    #[serde(default)]
    pub file_upload: Option<FileUploadSettings>,
    #[serde(default)]
    pub user_input_form: Vec<serde_json::Value>,
    #[serde(default)]
    pub system_parameters: Option<SystemParameters>,
}

impl AppParameters {
    /// Whether the app accepts image attachments.
    pub fn image_upload_enabled(&self) -> bool {
        self.file_upload
            .as_ref()
            .and_then(|f| f.image.as_ref())
            .is_some_and(|image| image.enabled)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUploadSettings {
    #[serde(default)]
    pub image: Option<ImageUploadSettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageUploadSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub number_limits: u32,
    #[serde(default)]
    pub transfer_methods: Vec<String>,
}

/// Size limits in megabytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemParameters {
    #[serde(default)]
    pub file_size_limit: u64,
    #[serde(default)]
    pub image_file_size_limit: u64,
    #[serde(default)]
    pub audio_file_size_limit: u64,
    #[serde(default)]
    pub video_file_size_limit: u64,
}

/// Response of `POST /files/upload`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Conversation as listed by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConversation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// One query/answer pair from `GET /messages`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub message_files: Vec<serde_json::Value>,
}

/// Paged list envelope used by the listing endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_is_streaming_with_empty_conversation_for_new_chats() {
        let body = ChatRequest::new("hello", "u-1").to_body();
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["conversation_id"], "");
        assert_eq!(body["user"], "u-1");
        assert_eq!(body["inputs"], serde_json::json!({}));
        assert_eq!(body["files"], serde_json::json!([]));
    }

    #[test]
    fn chat_body_serializes_files_and_conversation() {
        let body = ChatRequest::new("what is this", "u-1")
            .conversation_id("c-9")
            .file(ChatFile::uploaded_image("f-1"))
            .file(ChatFile::remote_image("https://img/x.png"))
            .to_body();
        assert_eq!(body["conversation_id"], "c-9");
        assert_eq!(
            body["files"],
            serde_json::json!([
                {"type": "image", "transfer_method": "local_file", "upload_file_id": "f-1"},
                {"type": "image", "transfer_method": "remote_url", "url": "https://img/x.png"}
            ])
        );
    }

    #[test]
    fn blank_conversation_id_means_new_conversation() {
        let req = ChatRequest::new("q", "u").conversation_id("  ");
        assert_eq!(req.conversation_id, None);
    }

    #[test]
    fn validation_requires_query_or_files_and_user() {
        assert!(ChatRequest::new(" ", "u").validate().is_err());
        assert!(
            ChatRequest::new(" ", "u")
                .file(ChatFile::uploaded_image("f"))
                .validate()
                .is_ok()
        );
        assert!(ChatRequest::new("q", "").validate().is_err());
    }

    #[test]
    fn parameters_decode_partial_payload() {
        let params: AppParameters = serde_json::from_str(
            r#"{"opening_statement":"hi","file_upload":{"image":{"enabled":true,"number_limits":3,"transfer_methods":["local_file"]}}}"#,
        )
        .expect("decode");
        assert!(params.image_upload_enabled());
        assert_eq!(params.opening_statement.as_deref(), Some("hi"));
        assert!(params.system_parameters.is_none());
    }
}
