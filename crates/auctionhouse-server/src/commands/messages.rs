use axum::extract::{
    Path,
    Query,
    State,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    auth::Authenticated,
    error::DomainError,
    event_bus::EventPayload,
    ids::ChannelId,
    metrics as m,
    state::AppState,
    store::Message,
};

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    content: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    message: Message,
}

/// Validates chat content per the message content rules: trimmed, rejected
/// if empty, too long, or consisting solely of control characters.
/// HTML-sensitive characters are escaped before publication.
fn validate_and_sanitize(raw: &str, max_len: usize) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::bad_request("message content must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::bad_request("message content too long"));
    }
    if trimmed.chars().all(char::is_control) {
        return Err(DomainError::bad_request(
            "message content must not be only control characters",
        ));
    }
    Ok(escape_html(trimmed))
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub async fn send(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(channel_id): Path<ChannelId>,
    axum::Json(req): axum::Json<SendRequest>,
) -> Result<axum::Json<SendResponse>, DomainError> {
    if !state.bus.is_participant(channel_id, claims.sub).await {
        return Err(DomainError::forbidden("must be an active participant"));
    }
    if let Err(error) = state.rate_limiter.check(claims.sub) {
        metrics::counter!(m::MESSAGES_RATE_LIMITED).increment(1);
        return Err(error);
    }

    let content = validate_and_sanitize(&req.content, state.message_max_len)?;
    let message = state
        .store
        .insert_message(channel_id, claims.sub, &content, chrono::Utc::now())
        .await?;

    state
        .bus
        .publish(
            channel_id,
            EventPayload::ChatMessage {
                author_id: claims.sub,
                content: message.content.clone(),
            },
            message.created_at,
        )
        .await;

    Ok(axum::Json(SendResponse { message }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(_claims): Authenticated,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<ListQuery>,
) -> Result<axum::Json<Vec<Message>>, DomainError> {
    let limit = query.limit.clamp(1, 100);
    let messages = state.store.recent_messages(channel_id, limit).await?;
    Ok(axum::Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_after_trim() {
        assert!(validate_and_sanitize("   ", 500).is_err());
    }

    #[test]
    fn rejects_control_characters_only() {
        assert!(validate_and_sanitize("\u{0007}\u{0007}", 500).is_err());
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(501);
        assert!(validate_and_sanitize(&long, 500).is_err());
    }

    #[test]
    fn escapes_html_sensitive_characters() {
        let out = validate_and_sanitize("<script>&'\"</script>", 500).unwrap();
        assert_eq!(out, "&lt;script&gt;&amp;&#39;&quot;&lt;/script&gt;");
    }
}
