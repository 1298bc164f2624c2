mod decode;
mod protocol;

use super::snapshot::{InsertBatch, TableSnapshot};
use super::sql_builder::{build_insert_sql, build_select_sql, build_truncate_sql};
use super::table_ref::TableRef;
use super::{Connection, Warehouse};
use crate::error::{HarnessError, Result};
use crate::profile::ConnectionParams;
use async_trait::async_trait;
use protocol::{
    ApiResponse, Chunk, LoginData, LoginRequest, LoginResponseData, QueryRequest,
    QueryResponseData, RowType, QUERY_IN_PROGRESS, QUERY_IN_PROGRESS_ASYNC,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const CLIENT_APP_ID: &str = "dbtspec";
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct SnowflakeWarehouse {
    params: ConnectionParams,
    http: reqwest::Client,
}

impl SnowflakeWarehouse {
    pub fn new(params: ConnectionParams) -> Result<Self> {
        let http = reqwest::Client::builder().gzip(true).build()?;
        Ok(Self { params, http })
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    fn default_schema(&self) -> &str {
        &self.params.schema
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let base_url = self.params.base_url();
        debug!(url = %self.params.redacted_url(), "Opening Snowflake session");

        let mut query: Vec<(&str, String)> = vec![
            ("databaseName", self.params.database.clone()),
            ("schemaName", self.params.schema.clone()),
            ("requestId", uuid::Uuid::new_v4().to_string()),
        ];
        if let Some(warehouse) = &self.params.warehouse {
            query.push(("warehouse", warehouse.clone()));
        }
        if let Some(role) = &self.params.role {
            query.push(("roleName", role.clone()));
        }

        let request = LoginRequest {
            data: LoginData {
                client_app_id: CLIENT_APP_ID.to_string(),
                client_app_version: env!("CARGO_PKG_VERSION").to_string(),
                account_name: self.params.account.clone(),
                login_name: self.params.user.clone(),
                password: self.params.password.clone(),
                session_parameters: HashMap::from([(
                    "AUTOCOMMIT".to_string(),
                    serde_json::Value::Bool(true),
                )]),
            },
        };

        let response = self
            .http
            .post(format!("{}/session/v1/login-request", base_url))
            .query(&query)
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let login: LoginResponseData = unwrap_response(response.json().await?, "login")?;

        Ok(Box::new(SnowflakeConnection {
            http: self.http.clone(),
            base_url,
            token: login.token,
            sequence_id: 0,
        }))
    }
}

#[derive(Debug)]
struct QueryResult {
    row_types: Vec<RowType>,
    rows: Vec<Vec<Option<String>>>,
}

pub struct SnowflakeConnection {
    http: reqwest::Client,
    base_url: String,
    token: String,
    sequence_id: u64,
}

impl SnowflakeConnection {
    fn auth_header(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.sequence_id += 1;
        debug!(sql = %sql.trim(), "Executing statement");

        let request = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id: self.sequence_id,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };
        let request_id = uuid::Uuid::new_v4().to_string();

        let mut response: ApiResponse<QueryResponseData> = self
            .http
            .post(format!("{}/queries/v1/query-request", self.base_url))
            .query(&[("requestId", request_id.as_str())])
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        while is_in_progress(&response) {
            let result_url = response
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| {
                    HarnessError::Warehouse("query in progress without result url".to_string())
                })?;
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
            response = self
                .http
                .get(format!("{}{}", self.base_url, result_url))
                .header(AUTHORIZATION, self.auth_header())
                .header(ACCEPT, "application/json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }

        let data = unwrap_response(response, "query")?;
        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(HarnessError::Warehouse(format!(
                    "unsupported result format '{}'",
                    format
                )));
            }
        }

        let mut rows = data.rowset;
        for chunk in &data.chunks {
            let chunk_rows = self
                .fetch_chunk(chunk, data.chunk_headers.as_ref(), data.qrmk.as_deref())
                .await?;
            rows.extend(chunk_rows);
        }

        debug!(
            query_id = data.query_id.as_deref().unwrap_or("-"),
            rows = rows.len(),
            "Statement finished"
        );

        Ok(QueryResult {
            row_types: data.rowtype,
            rows,
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &Chunk,
        chunk_headers: Option<&HashMap<String, String>>,
        qrmk: Option<&str>,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let mut headers = HeaderMap::new();
        match (chunk_headers, qrmk) {
            (Some(custom), _) => {
                for (name, value) in custom {
                    headers.insert(header_name(name)?, header_value(value)?);
                }
            }
            (None, Some(key)) => {
                headers.insert(
                    header_name("x-amz-server-side-encryption-customer-algorithm")?,
                    HeaderValue::from_static("AES256"),
                );
                headers.insert(
                    header_name("x-amz-server-side-encryption-customer-key")?,
                    header_value(key)?,
                );
            }
            (None, None) => {}
        }

        let body = self
            .http
            .get(&chunk.url)
            .headers(headers)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        // chunk bodies are a comma separated list of row arrays
        Ok(serde_json::from_str(&format!("[{}]", body))?)
    }
}

fn is_in_progress(response: &ApiResponse<QueryResponseData>) -> bool {
    matches!(
        response.code.as_deref(),
        Some(QUERY_IN_PROGRESS) | Some(QUERY_IN_PROGRESS_ASYNC)
    )
}

fn unwrap_response<T: DeserializeOwned>(response: ApiResponse<T>, action: &str) -> Result<T> {
    if !response.success {
        return Err(HarnessError::Warehouse(format!(
            "{} failed (code {}): {}",
            action,
            response.code.as_deref().unwrap_or("-"),
            response.message.as_deref().unwrap_or("no message")
        )));
    }
    response
        .data
        .ok_or_else(|| HarnessError::Warehouse(format!("{} returned no data", action)))
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| HarnessError::Warehouse(format!("invalid header name '{}': {}", name, e)))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| HarnessError::Warehouse(format!("invalid header value: {}", e)))
}

#[async_trait]
impl Connection for SnowflakeConnection {
    async fn truncate_table(&mut self, table: &str) -> Result<()> {
        self.query(&build_truncate_sql(table)).await?;
        Ok(())
    }

    async fn insert_rows(&mut self, table: &TableRef, batch: &InsertBatch) -> Result<u64> {
        let result = self.query(&build_insert_sql(table, batch)).await?;
        let inserted = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_deref())
            .and_then(|count| count.parse().ok())
            .unwrap_or(batch.len() as u64);
        debug!(table = %table, rows = inserted, "Inserted fixture rows");
        Ok(inserted)
    }

    async fn read_table(&mut self, table: &TableRef) -> Result<TableSnapshot> {
        let result = self.query(&build_select_sql(table)).await?;
        let columns = decode::columns(&result.row_types);
        let rows = result
            .rows
            .iter()
            .map(|row| decode::decode_row(&columns, &result.row_types, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(TableSnapshot::new(columns, rows))
    }

    async fn commit(&mut self) -> Result<()> {
        self.query("COMMIT").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.http
            .post(format!("{}/session", self.base_url))
            .query(&[("delete", "true")])
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        debug!("Closed Snowflake session");
        Ok(())
    }
}
