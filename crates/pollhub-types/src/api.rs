use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims issued at login/registration and checked on every
/// authenticated request. The username travels in the token so resolving a
/// caller never touches the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Polls --

/// Options may be sent as bare strings or as `{ "text": ... }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    Object { text: String },
}

impl OptionInput {
    pub fn into_text(self) -> String {
        match self {
            OptionInput::Text(text) | OptionInput::Object { text } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    /// Signed so that a negative index reaches validation instead of failing
    /// deserialization.
    #[serde(default)]
    pub option_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptionRequest {
    #[serde(default)]
    pub new_option_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOptionResponse {
    pub text: String,
    pub votes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatorResponse {
    pub id: Uuid,
    pub username: String,
}

/// Public projection of a poll. Recorded voter identities are never exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<PollOptionResponse>,
    pub created_by: CreatorResponse,
    pub created_at: DateTime<Utc>,
    pub total_votes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub message: String,
    pub poll: PollResponse,
}

/// Body for acknowledgements and every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_accept_strings_and_objects() {
        let req: CreatePollRequest = serde_json::from_str(
            r#"{"question":"Best editor?","options":["vim",{"text":"emacs"}]}"#,
        )
        .unwrap();

        let texts: Vec<String> = req.options.into_iter().map(OptionInput::into_text).collect();
        assert_eq!(texts, vec!["vim", "emacs"]);
    }

    #[test]
    fn vote_request_uses_camel_case() {
        let req: VoteRequest = serde_json::from_str(r#"{"optionIndex":-1}"#).unwrap();
        assert_eq!(req.option_index, Some(-1));

        let req: VoteRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.option_index, None);
    }

    #[test]
    fn poll_response_serializes_camel_case() {
        let poll = PollResponse {
            id: Uuid::nil(),
            question: "Tabs or spaces?".into(),
            options: vec![PollOptionResponse { text: "tabs".into(), votes: 2 }],
            created_by: CreatorResponse { id: Uuid::nil(), username: "ada".into() },
            created_at: DateTime::<Utc>::default(),
            total_votes: 2,
        };

        let json = serde_json::to_value(&poll).unwrap();
        assert_eq!(json["createdBy"]["username"], "ada");
        assert_eq!(json["totalVotes"], 2);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("votedBy").is_none());
    }
}
