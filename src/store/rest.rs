//! Hosted user table behind a PostgREST endpoint.

use super::row::{decode_rows, UserRow, USER_COLUMNS};
use super::{StoreError, UserQuery, UserStore, USERS_TABLE};
use crate::model::{UserRecord, UserUpdate};
use crate::server::metrics;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct RestUserStore {
    client: reqwest::Client,
    /// `<project url>/rest/v1`
    rest_url: String,
    service_key: String,
}

impl RestUserStore {
    pub fn new(project_url: &str, service_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            service_key: service_key.to_string(),
        })
    }

    fn table_url(&self, filters: &[String]) -> String {
        let mut url = format!("{}/{}", self.rest_url, USERS_TABLE);
        let mut separator = '?';
        for filter in filters {
            url.push(separator);
            url.push_str(filter);
            separator = '&';
        }
        url
    }

    fn select_filter() -> String {
        format!("select={}", USER_COLUMNS.join(","))
    }

    fn key_filter(key: &str) -> String {
        format!("user_email=eq.{}", urlencoding::encode(key))
    }

    fn query_filters(query: UserQuery) -> Vec<String> {
        let mut filters = vec![Self::select_filter(), "ispro=eq.true".to_string()];
        if query == UserQuery::ProUsersWithMessaging {
            filters.push("telegramid=not.is.null".to_string());
        }
        filters
    }

    fn update_body(update: &UserUpdate) -> Value {
        let body: Map<String, Value> = update
            .to_columns()
            .into_iter()
            .map(|(column, value)| (column.to_string(), Value::String(value)))
            .collect();
        Value::Object(body)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn get_rows(&self, url: &str) -> Result<Vec<UserRow>, StoreError> {
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn patch(&self, url: &str, body: &Value) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.patch(url))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }
}

async fn api_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Api {
        status,
        message: body.chars().take(300).collect(),
    }
}

#[async_trait]
impl UserStore for RestUserStore {
    async fn fetch_users(&self, query: UserQuery) -> Result<Vec<UserRecord>, StoreError> {
        let url = self.table_url(&Self::query_filters(query));
        let started = Instant::now();
        let result = self.get_rows(&url).await;
        metrics::record_collaborator_request("rest_store", "fetch_users", result.is_ok(), started.elapsed());
        Ok(decode_rows(result?))
    }

    async fn fetch_user(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        let url = self.table_url(&[
            Self::select_filter(),
            Self::key_filter(key),
            "limit=1".to_string(),
        ]);
        let started = Instant::now();
        let result = self.get_rows(&url).await;
        metrics::record_collaborator_request("rest_store", "fetch_user", result.is_ok(), started.elapsed());
        result?
            .into_iter()
            .next()
            .map(UserRow::into_record)
            .transpose()
    }

    async fn apply_update(&self, key: &str, update: &UserUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        let url = self.table_url(&[Self::key_filter(key)]);
        let started = Instant::now();
        let result = self.patch(&url, &Self::update_body(update)).await;
        metrics::record_collaborator_request("rest_store", "apply_update", result.is_ok(), started.elapsed());
        result
    }
}
