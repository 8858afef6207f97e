use std::pin::Pin;

use futures::{Stream, TryStreamExt as _};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    AppParameters, ChatRequest, Page, RemoteConversation, RemoteMessage, UploadedFile,
};
use crate::config::ClientConfig;
use crate::errors::ClientError;

/// Raw response body of a streaming chat request.
pub type ByteStream =
    Pin<Box<dyn Stream<Item = Result<bytes::Bytes, ClientError>> + Send + 'static>>;

/// HTTP client for one Dify app.
#[derive(Clone)]
pub struct DifyClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DifyClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client from `DIFY_API_URL` / `DIFY_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET /parameters`.
    pub async fn parameters(&self) -> Result<AppParameters, ClientError> {
        let response = self
            .client
            .get(self.config.endpoint("parameters"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| ClientError::transport("parameters", e))?;
        read_json("parameters", response).await
    }

    /// `POST /chat-messages` in streaming mode.
    ///
    /// Returns the undecoded event stream; feed it to
    /// [`crate::processor::StreamProcessor`].
    pub async fn send_chat_message(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        request.validate()?;
        debug!(
            user = %request.user,
            conversation_id = request.conversation_id.as_deref().unwrap_or(""),
            files = request.files.len(),
            "sending chat message"
        );
        let response = self
            .client
            .post(self.config.endpoint("chat-messages"))
            .bearer_auth(&self.config.api_key)
            .json(&request.to_body())
            .send()
            .await
            .map_err(|e| ClientError::transport("chat-messages", e))?;
        let response = ensure_success("chat-messages", response).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| ClientError::transport("chat-messages body", e));
        Ok(Box::pin(stream))
    }

    /// `POST /chat-messages/{task_id}/stop`.
    pub async fn stop_response(&self, task_id: &str, user: &str) -> Result<(), ClientError> {
        if task_id.trim().is_empty() {
            return Err(ClientError::Validation("task_id must not be empty".into()));
        }
        let response = self
            .client
            .post(self.config.endpoint_segments(&["chat-messages", task_id, "stop"])?)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&serde_json::json!({ "user": user }))
            .send()
            .await
            .map_err(|e| ClientError::transport("stop", e))?;
        ensure_success("stop", response).await?;
        Ok(())
    }

    /// `POST /files/upload` as multipart form data.
    pub async fn upload_file(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        user: &str,
    ) -> Result<UploadedFile, ClientError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| ClientError::Validation(format!("invalid mime type {mime_type:?}: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("user", user.to_string());
        let response = self
            .client
            .post(self.config.endpoint("files/upload"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport("upload", e))?;
        read_json("upload", response).await
    }

    /// `GET /conversations?user=`.
    pub async fn conversations(&self, user: &str) -> Result<Page<RemoteConversation>, ClientError> {
        let response = self
            .client
            .get(self.config.endpoint("conversations"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .query(&[("user", user)])
            .send()
            .await
            .map_err(|e| ClientError::transport("conversations", e))?;
        read_json("conversations", response).await
    }

    /// `GET /messages?conversation_id=&user=`.
    pub async fn messages(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> Result<Page<RemoteMessage>, ClientError> {
        let response = self
            .client
            .get(self.config.endpoint("messages"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .query(&[("conversation_id", conversation_id), ("user", user)])
            .send()
            .await
            .map_err(|e| ClientError::transport("messages", e))?;
        read_json("messages", response).await
    }

    /// `DELETE /conversations/{id}`.
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.config.endpoint_segments(&["conversations", conversation_id])?)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&serde_json::json!({ "user": user }))
            .send()
            .await
            .map_err(|e| ClientError::transport("delete conversation", e))?;
        ensure_success("delete conversation", response).await?;
        Ok(())
    }

    /// `POST /conversations/{id}/name` with an explicit name.
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        user: &str,
    ) -> Result<RemoteConversation, ClientError> {
        if name.trim().is_empty() {
            return Err(ClientError::Validation("name must not be empty".into()));
        }
        self.post_name(
            conversation_id,
            serde_json::json!({ "name": name, "auto_generate": false, "user": user }),
        )
        .await
    }

    /// `POST /conversations/{id}/name` asking the backend to pick a name.
    pub async fn auto_generate_name(
        &self,
        conversation_id: &str,
        user: &str,
    ) -> Result<RemoteConversation, ClientError> {
        self.post_name(
            conversation_id,
            serde_json::json!({ "auto_generate": true, "user": user }),
        )
        .await
    }

    async fn post_name(
        &self,
        conversation_id: &str,
        body: serde_json::Value,
    ) -> Result<RemoteConversation, ClientError> {
        let response = self
            .client
            .post(self.config.endpoint_segments(&["conversations", conversation_id, "name"])?)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::transport("rename conversation", e))?;
        read_json("rename conversation", response).await
    }
}

async fn ensure_success(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(api_error(operation, status, body))
}

async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = ensure_success(operation, response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::transport(operation, e))?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
        operation,
        message: e.to_string(),
    })
}

fn api_error(operation: &'static str, status: StatusCode, body: String) -> ClientError {
    ClientError::Api {
        operation,
        status: status.as_u16(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Callbacks, StreamProcessor};
    use crate::stream::{MessageEndEvent, MessageEvent};
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the raw request it got.
    async fn serve_once(status: &'static str, content_type: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.expect("read");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(head_end) = find(&request, b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[tokio::test]
    async fn streams_chat_message_through_processor() {
        let (url, server) = serve_once(
            "200 OK",
            "text/event-stream",
            concat!(
                "data: {\"event\":\"message\",\"conversation_id\":\"c-1\",\"task_id\":\"t-1\",\"answer\":\"\\\\u4f60\"}\n\n",
                "event: ping\n\n",
                "data: {\"event\":\"message_end\",\"conversation_id\":\"c-1\",\"id\":\"m-1\"}\n\n",
            ),
        )
        .await;
        let client = DifyClient::new(ClientConfig::new(url, "secret")).expect("client");
        let body = client
            .send_chat_message(&ChatRequest::new("hi", "u-1"))
            .await
            .expect("stream");

        let mut answers = Vec::new();
        let mut ends = Vec::new();
        let mut handler = Callbacks::new(
            |m: MessageEvent| answers.push(m.answer),
            |e: MessageEndEvent| ends.push(e.final_message_id().to_string()),
            |_| {},
        );
        StreamProcessor::new()
            .process(Some(body), &mut handler)
            .await
            .expect("process");
        drop(handler);
        assert_eq!(answers, vec!["\\u4f60"]);
        assert_eq!(ends, vec!["m-1"]);

        let request = server.await.expect("server");
        assert!(request.starts_with("POST /v1/chat-messages "));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains("\"response_mode\":\"streaming\""));
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let (url, server) = serve_once(
            "400 Bad Request",
            "application/json",
            r#"{"code":"invalid_param","message":"bad"}"#,
        )
        .await;
        let client = DifyClient::new(ClientConfig::new(url, "secret")).expect("client");
        let err = match client.send_chat_message(&ChatRequest::new("hi", "u-1")).await {
            Ok(_) => panic!("expected api error"),
            Err(err) => err,
        };
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("invalid_param"));
        server.await.expect("server");
    }

    #[tokio::test]
    async fn conversations_are_listed_with_user_query() {
        let (url, server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"data":[{"id":"c-1","name":"Greeting","created_at":1}],"has_more":false,"limit":20}"#,
        )
        .await;
        let client = DifyClient::new(ClientConfig::new(url, "secret")).expect("client");
        let page = client.conversations("u 1").await.expect("page");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Greeting");
        let request = server.await.expect("server");
        assert!(request.starts_with("GET /v1/conversations?user=u+1 "));
    }

    #[tokio::test]
    async fn conversation_id_stays_one_path_segment() {
        let (url, server) = serve_once("200 OK", "application/json", r#"{"result":"success"}"#).await;
        let client = DifyClient::new(ClientConfig::new(url, "secret")).expect("client");
        client
            .delete_conversation("c/1?x=1", "u-1")
            .await
            .expect("delete");
        let request = server.await.expect("server");
        assert!(request.starts_with("DELETE /v1/conversations/c%2F1%3Fx=1 "));
    }

    #[tokio::test]
    async fn invalid_request_fails_before_any_io() {
        let client =
            DifyClient::new(ClientConfig::new("http://127.0.0.1:9/v1", "k")).expect("client");
        let err = match client.send_chat_message(&ChatRequest::new("  ", "u")).await {
            Ok(_) => panic!("expected validation error"),
            Err(err) => err,
        };
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(matches!(
            client.stop_response("", "u").await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn env_gated_smoke_parameters_if_key_present() {
        if std::env::var("DIFY_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping Dify smoke test (DIFY_API_KEY missing)");
            return;
        }
        let client = DifyClient::from_env().expect("client");
        let result = client.parameters().await;
        assert!(result.is_ok(), "parameters failed: {result:?}");
    }
}
