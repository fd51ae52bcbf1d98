use charger_monitor_domain::model::{Station, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "emailOrPhone")]
    pub email_or_phone: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    pub id: String,
}

/// Error body returned by the API on non-success responses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiErrorBody {
    pub message: ApiMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiMessage {
    Detailed {
        #[serde(default)]
        message: String,
        #[serde(default)]
        error: String,
    },
    Text(String),
}

impl Default for ApiMessage {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ApiMessage {
    pub fn text(&self) -> &str {
        match self {
            Self::Detailed { message, error } if message.is_empty() => error,
            Self::Detailed { message, .. } => message,
            Self::Text(text) => text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GetStationsResponse {
    #[serde(default)]
    pub stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
pub struct GetTransactionsResponse {
    #[serde(default, rename = "data")]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct GetTransactionResponse {
    pub transaction: Transaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_error_message() {
        let body = r#"{"statusCode":401,"timestamp":"t","path":"/client/auth/login",
            "message":{"statusCode":401,"message":"Invalid credentials","error":"Unauthorized"}}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).expect("error body parses");
        assert_eq!(parsed.message.text(), "Invalid credentials");
    }

    #[test]
    fn reads_plain_error_message() {
        let body = r#"{"statusCode":400,"message":"Bad request"}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).expect("error body parses");
        assert_eq!(parsed.message.text(), "Bad request");
    }

    #[test]
    fn transaction_page_reads_data_field() {
        let body = r#"{"data":[{"_id":"trans1"},{"_id":"trans2","stopAt":"2024-05-01T14:30:00Z"}]}"#;
        let parsed: GetTransactionsResponse = serde_json::from_str(body).expect("page parses");
        assert_eq!(parsed.transactions.len(), 2);
        assert!(parsed.transactions[1].is_final());
    }
}
