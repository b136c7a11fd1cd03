use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two accounts the application knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
pub enum Partner {
    Wendy,
    Daniel,
}

impl Partner {
    pub const ALL: [Partner; 2] = [Partner::Wendy, Partner::Daniel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partner::Wendy => "Wendy",
            Partner::Daniel => "Daniel",
        }
    }
}

impl fmt::Display for Partner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPartner;

impl FromStr for Partner {
    type Err = UnknownPartner;

    // Exact match only: "wendy" is not a valid login name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Wendy" => Ok(Partner::Wendy),
            "Daniel" => Ok(Partner::Daniel),
            _ => Err(UnknownPartner),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserModel {
    pub id: String,
    pub name: Partner,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user, returned on login and by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: String,
    pub name: Partner,
}

#[derive(Debug, Clone)]
pub struct SessionModel {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NoteModel {
    pub id: String,
    pub author_id: String,
    pub author_name: Partner,
    pub content: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConversationModel {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageModel {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A single chat turn, either to be stored or to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LoginModel {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NoteModelCreate {
    pub content: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationModelSave {
    pub conversation_id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatModelRequest {
    pub message: Option<String>,
    pub notes_context: Option<String>,
    pub current_user: Option<String>,
    pub conversation_id: Option<String>,
    pub save_to_db: Option<bool>,
    pub conversation_history: Option<Vec<ChatTurn>>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatModelResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct IdQuery {
    pub id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_names_are_case_sensitive() {
        assert_eq!("Wendy".parse::<Partner>(), Ok(Partner::Wendy));
        assert_eq!("Daniel".parse::<Partner>(), Ok(Partner::Daniel));
        assert_eq!("wendy".parse::<Partner>(), Err(UnknownPartner));
        assert_eq!("Alice".parse::<Partner>(), Err(UnknownPartner));
    }

    #[test]
    fn chat_request_tolerates_missing_optionals() {
        let request: ChatModelRequest =
            serde_json::from_str(r#"{"message":"Salut","currentUser":"Wendy","userId":"ignored"}"#)
                .unwrap();
        assert_eq!(request.message.as_deref(), Some("Salut"));
        assert_eq!(request.save_to_db, None);
        assert_eq!(request.conversation_history, None);
    }

    #[test]
    fn roles_use_lowercase_on_the_wire() {
        let turn: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(turn, ChatTurn::assistant("ok"));
        assert!(serde_json::from_str::<ChatTurn>(r#"{"role":"system","content":"x"}"#).is_err());
    }
}
