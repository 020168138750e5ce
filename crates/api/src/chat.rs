use crate::client::{BackendClient, Body};
use crate::error::ApiResult;
use crate::types::{unwrap_envelope, ChatMessage, ChatReply, ChatSession};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<ChatSession>,
}

#[derive(Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

impl BackendClient {
    fn chat_path(&self, suffix: &str) -> String {
        format!("{}{}", self.config().chat_base_path.trim_end_matches('/'), suffix)
    }

    fn session_path(&self, session_id: &str, suffix: &str) -> String {
        let id = urlencoding::encode(session_id);
        self.chat_path(&format!("/chat/sessions/{id}/{suffix}"))
    }

    pub async fn create_chat_session(&self, title: &str) -> ApiResult<String> {
        let body = json!({ "title": title });
        let data = self
            .send_authed(
                Method::POST,
                &self.chat_path("/chat/sessions/create/"),
                Body::Json(&body),
            )
            .await?;
        let created: SessionCreated = unwrap_envelope(data, "Failed to create chat session")?;
        info!("Created chat session {}", created.session_id);
        Ok(created.session_id)
    }

    pub async fn send_chat_message(&self, message: &str, session_id: &str) -> ApiResult<ChatReply> {
        let body = json!({ "message": message, "session_id": session_id });
        let data = self
            .send_authed(Method::POST, &self.chat_path("/chat/message/"), Body::Json(&body))
            .await?;
        let reply: ChatReply = unwrap_envelope(data, "Failed to send message")?;
        debug!(
            session = %reply.session_id,
            blocks = reply.effective_response().blocks.len(),
            "Chat reply received"
        );
        Ok(reply)
    }

    pub async fn list_chat_sessions(&self) -> ApiResult<Vec<ChatSession>> {
        let data = self
            .send_authed(Method::GET, &self.chat_path("/chat/sessions/"), Body::Empty)
            .await?;
        let list: SessionList = unwrap_envelope(data, "Failed to list chat sessions")?;
        Ok(list.sessions)
    }

    pub async fn chat_history(&self, session_id: &str) -> ApiResult<Vec<ChatMessage>> {
        let path = self.session_path(session_id, "");
        let data = self.send_authed(Method::GET, &path, Body::Empty).await?;
        let history: History = unwrap_envelope(data, "Failed to load chat history")?;
        Ok(history.messages)
    }

    pub async fn delete_chat_session(&self, session_id: &str) -> ApiResult<()> {
        let path = self.session_path(session_id, "delete/");
        let data = self.send_authed(Method::DELETE, &path, Body::Empty).await?;
        let _: serde_json::Value = unwrap_envelope(data, "Failed to delete chat session")?;
        info!("Deleted chat session {}", session_id);
        Ok(())
    }
}
