//! [`ValidationEngine`] over the TypeDB 3 HTTP API.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::engine::{EngineError, QueryOutcome, ValidationEngine};

#[derive(Debug, Serialize)]
struct SignIn<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct Token {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    database_name: &'a str,
    transaction_type: &'a str,
    query: &'a str,
    commit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    answers: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

fn connectivity(err: reqwest::Error) -> EngineError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        EngineError::Connectivity(err.to_string())
    } else {
        EngineError::Protocol(err.to_string())
    }
}

async fn error_text(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            code: Some(code),
            message,
        }) => format!("[{}] {}", code, message),
        Ok(ErrorBody { message, .. }) => message,
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body,
    }
}

pub struct TypeDbHttpEngine {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl TypeDbHttpEngine {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        TypeDbHttpEngine {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn sign_in(&self) -> Result<String, EngineError> {
        let response = self
            .client
            .post(self.url("/v1/signin"))
            .json(&SignIn {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(connectivity)?;
        if !response.status().is_success() {
            return Err(EngineError::Protocol(format!(
                "sign-in failed: {}",
                error_text(response).await
            )));
        }
        let token: Token = response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(format!("sign-in response: {}", e)))?;
        *self.token.write().await = Some(token.token.clone());
        Ok(token.token)
    }

    async fn token(&self) -> Result<String, EngineError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.sign_in().await
    }

    /// Send an authenticated request, signing in again once on 401.
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, EngineError> {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let mut request = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(connectivity)?;
            match response.status() {
                StatusCode::UNAUTHORIZED if !retried => {
                    log::debug!("TypeDB token expired, signing in again");
                    *self.token.write().await = None;
                    retried = true;
                }
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                    return Err(EngineError::Connectivity(error_text(response).await));
                }
                _ => return Ok(response),
            }
        }
    }

    /// Database names currently on the server.
    pub async fn list_databases(&self) -> Result<Vec<String>, EngineError> {
        let response = self.send::<()>(Method::GET, "/v1/databases", None).await?;
        if !response.status().is_success() {
            return Err(EngineError::Protocol(error_text(response).await));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(body["databases"]
            .as_array()
            .map(|dbs| {
                dbs.iter()
                    .filter_map(|db| db["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// True when the server answers an authenticated request.
    pub async fn ping(&self) -> bool {
        self.list_databases().await.is_ok()
    }

    async fn run(
        &self,
        database: &str,
        transaction_type: &str,
        query: &str,
        commit: bool,
    ) -> Result<QueryResponse, EngineError> {
        let request = QueryRequest {
            database_name: database,
            transaction_type,
            query,
            commit,
        };
        let response = self
            .send(Method::POST, "/v1/query", Some(&request))
            .await?;
        if !response.status().is_success() {
            return Err(EngineError::Rejected(error_text(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(format!("query response: {}", e)))
    }
}

#[async_trait]
impl ValidationEngine for TypeDbHttpEngine {
    async fn create_database(&self, name: &str) -> Result<(), EngineError> {
        let path = format!("/v1/databases/{}", name);
        let response = self.send::<()>(Method::POST, &path, None).await?;
        if !response.status().is_success() {
            return Err(EngineError::Rejected(error_text(response).await));
        }
        log::debug!("Created database {}", name);
        Ok(())
    }

    async fn delete_database(&self, name: &str) -> Result<(), EngineError> {
        let path = format!("/v1/databases/{}", name);
        let response = self.send::<()>(Method::DELETE, &path, None).await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let text = error_text(response).await;
        // 3.x reports a missing database as a 400 with this message
        if text.contains("not found") || text.contains("does not exist") {
            return Ok(());
        }
        Err(EngineError::Rejected(text))
    }

    async fn run_schema(&self, database: &str, schema: &str) -> Result<(), EngineError> {
        self.run(database, "schema", schema, true).await?;
        Ok(())
    }

    async fn run_query(&self, database: &str, query: &str) -> Result<QueryOutcome, EngineError> {
        let response = self.run(database, "read", query, false).await?;
        Ok(QueryOutcome {
            answers_drawn: response.answers.map_or(0, |a| a.len()),
        })
    }
}
