use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ==================================================================================================
// Request Models
// ==================================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ==================================================================================================
// Response Models
// ==================================================================================================

/// Body returned by login, register and refresh
///
/// The refresh token itself travels in an HTTP-only cookie and never shows up here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default, alias = "access_token", alias = "token")]
    pub access_token: Option<String>,

    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,

    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_field_aliases() {
        let camel: TokenResponse = serde_json::from_value(json!({"accessToken": "a"})).unwrap();
        let snake: TokenResponse = serde_json::from_value(json!({"access_token": "b"})).unwrap();
        let bare: TokenResponse = serde_json::from_value(json!({"token": "c"})).unwrap();

        assert_eq!(camel.access_token.as_deref(), Some("a"));
        assert_eq!(snake.access_token.as_deref(), Some("b"));
        assert_eq!(bare.access_token.as_deref(), Some("c"));
    }

    #[test]
    fn test_token_response_with_user() {
        let resp: TokenResponse = serde_json::from_value(json!({
            "accessToken": "a",
            "user": {"id": 7, "email": "ana@example.com", "firstName": "Ana", "agency": "North"}
        }))
        .unwrap();

        let user = resp.user.unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Ana"));
        assert_eq!(user.extra["agency"], "North");
    }

    #[test]
    fn test_register_request_skips_missing_fields() {
        let req = RegisterRequest {
            email: "ana@example.com".to_string(),
            password: "pw".to_string(),
            first_name: Some("Ana".to_string()),
            last_name: None,
            phone: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"email": "ana@example.com", "password": "pw", "firstName": "Ana"})
        );
    }
}
