//! Supabase (PostgREST) backed note store.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::NoteStore;
use crate::models::{Note, NoteId, NotePatch};
use crate::util::{error_excerpt, is_http_url, non_blank};
use crate::{Error, Result};

const NOTES_TABLE: &str = "notes";

/// Connection settings for the hosted `notes` table.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseStoreConfig {
    pub url: String,
    pub anon_key: String,
    /// User access token; row-level security decides what it can read.
    pub access_token: Option<String>,
}

impl fmt::Debug for SupabaseStoreConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseStoreConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Clone)]
pub struct SupabaseNoteStore {
    rest_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: Client,
}

impl SupabaseNoteStore {
    pub fn new(config: SupabaseStoreConfig) -> Result<Self> {
        let rest_url = normalize_rest_url(&config.url)?;
        let anon_key = non_blank(&config.anon_key)
            .ok_or_else(|| Error::InvalidInput("Supabase anon key must not be empty".into()))?;

        Ok(Self {
            rest_url,
            anon_key,
            access_token: config.access_token.as_deref().and_then(non_blank),
            client: Client::builder().build()?,
        })
    }

    fn notes_url(&self) -> String {
        format!("{}/{NOTES_TABLE}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }
}

#[async_trait]
impl NoteStore for SupabaseNoteStore {
    async fn get(&self, id: &NoteId) -> Result<Note> {
        let request = self.authorized(
            self.client
                .get(self.notes_url())
                .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())]),
        );

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            return Err(if is_access_denied(status) {
                Error::NotFound(message)
            } else {
                Error::InvalidInput(message)
            });
        }

        let rows = response.json::<Vec<Note>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn update(&self, id: &NoteId, patch: &NotePatch) -> Result<Note> {
        let request = self.authorized(
            self.client
                .patch(self.notes_url())
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(patch),
        );

        let response = request
            .send()
            .await
            .map_err(|error| Error::Write(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Write(parse_api_error(status, &body)));
        }

        let rows = response
            .json::<Vec<Note>>()
            .await
            .map_err(|error| Error::Write(format!("unreadable update response: {error}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Write(format!("note {id} was not updated (missing or read-only)")))
    }
}

/// Normalize a project URL into its PostgREST base.
pub fn normalize_rest_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Supabase URL must not be empty".into()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::InvalidInput(
            "Supabase URL must include http:// or https://".into(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

fn is_access_denied(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    )
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let excerpt = error_excerpt(body);
    if excerpt.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", excerpt, status.as_u16())
    }
}
