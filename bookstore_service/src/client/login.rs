use serde_json::Value;

const TOKEN_FIELDS: [&str; 2] = ["token", "access_token"];

/// Where a login response carried its token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginShape {
    /// `{"token": ..}` or `{"access_token": ..}`
    Direct(String),
    /// The same fields nested under `data`
    Wrapped(String),
}

impl LoginShape {
    /// Top-level fields are tried before the `data` wrapper
    pub fn detect(raw: &Value) -> Option<Self> {
        token_field(raw)
            .map(LoginShape::Direct)
            .or_else(|| raw.get("data").and_then(token_field).map(LoginShape::Wrapped))
    }

    pub fn into_token(self) -> String {
        match self {
            LoginShape::Direct(token) | LoginShape::Wrapped(token) => token,
        }
    }
}

fn token_field(value: &Value) -> Option<String> {
    TOKEN_FIELDS
        .iter()
        .filter_map(|field| value.get(field).and_then(Value::as_str))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| !value.is_null())
}

/// Normalized result of a login, whatever shape the backend answered with
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSession {
    pub user: Option<Value>,
    pub token: String,
    pub raw: Value,
}

impl LoginSession {
    pub fn from_response(raw: Value) -> Option<Self> {
        let token = LoginShape::detect(&raw)?.into_token();
        let user = present(raw.get("user"))
            .or_else(|| present(raw.get("data").and_then(|data| data.get("user"))))
            .cloned();
        Some(Self { user, token, raw })
    }
}
