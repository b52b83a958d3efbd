use serde::{Deserialize, Serialize};

/// One chat entry as stored under `messages/<push key>`.
///
/// The record keeps the backend's shape field for field: `text` for text
/// messages, `photoUrl` for photo messages. Use [`Message::content`] to
/// decide how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub name: String,
    #[serde(
        rename = "photoUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Photo(&'a str),
    Empty,
}

impl Message {
    pub fn new(text: Option<String>, name: impl Into<String>, photo_url: Option<String>) -> Self {
        Self {
            text,
            name: name.into(),
            photo_url,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Some(text.into()), name, None)
    }

    pub fn photo(name: impl Into<String>, photo_url: impl Into<String>) -> Self {
        Self::new(None, name, Some(photo_url.into()))
    }

    pub fn author(&self) -> &str {
        &self.name
    }

    // A photo URL wins over text when a record carries both.
    pub fn content(&self) -> MessageContent<'_> {
        match (&self.photo_url, &self.text) {
            (Some(url), _) => MessageContent::Photo(url),
            (None, Some(text)) => MessageContent::Text(text),
            (None, None) => MessageContent::Empty,
        }
    }
}

/// Identity reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthUser {
    /// Name shown on this user's messages: display name, then email.
    pub fn chat_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref().filter(|e| !e.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_message_omits_photo_url() {
        let value = serde_json::to_value(Message::text("Alice", "hi")).unwrap();
        assert_eq!(value, json!({"text": "hi", "name": "Alice"}));
    }

    #[test]
    fn decodes_backend_record_with_nulls() {
        let msg: Message = serde_json::from_value(json!({
            "text": null,
            "name": "Bob",
            "photoUrl": "https://example.com/cat.jpg"
        }))
        .unwrap();
        assert_eq!(msg, Message::photo("Bob", "https://example.com/cat.jpg"));
        assert_eq!(
            msg.content(),
            MessageContent::Photo("https://example.com/cat.jpg")
        );
    }

    #[test]
    fn photo_wins_when_both_fields_present() {
        let msg = Message::new(Some("caption".into()), "Eve", Some("u".into()));
        assert_eq!(msg.content(), MessageContent::Photo("u"));
        assert_eq!(
            Message::new(None, "Eve", None).content(),
            MessageContent::Empty
        );
    }

    #[test]
    fn chat_name_falls_back_to_email() {
        let user = AuthUser {
            uid: "u1".into(),
            email: Some("alice@example.com".into()),
            display_name: Some("  ".into()),
        };
        assert_eq!(user.chat_name(), Some("alice@example.com"));
    }
}
