use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result codes meaning the statement is still executing.
pub(super) const QUERY_IN_PROGRESS: &str = "333333";
pub(super) const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

#[derive(Debug, Serialize)]
pub(super) struct LoginRequest {
    pub data: LoginData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(super) struct LoginData {
    pub client_app_id: String,
    pub client_app_version: String,
    pub account_name: String,
    pub login_name: String,
    pub password: String,
    pub session_parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponseData {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct QueryRequest<'a> {
    pub sql_text: &'a str,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub query_submission_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Chunk {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct QueryResponseData {
    #[serde(default)]
    pub rowtype: Vec<RowType>,
    #[serde(default)]
    pub rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    pub chunk_headers: Option<HashMap<String, String>>,
    pub qrmk: Option<String>,
    pub query_result_format: Option<String>,
    pub query_id: Option<String>,
    pub get_result_url: Option<String>,
}
