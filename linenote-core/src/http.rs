//! Comment store reached over HTTP, in the shape the course web application
//! exposes it.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RemoteError;
use crate::sync::CommentTransport;
use crate::types::{Comment, CommentId, CommonComment, CreateAck, CreateBody, FileId, LineNumber};

pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport for the application rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Failure>(&body)
                .map(|f| f.msg)
                .unwrap_or(body);
            return Err(RemoteError::Status { status: status.as_u16(), message });
        }
        serde_json::from_str(&body).map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

/// Error body the application sends with a non-2xx status.
#[derive(Debug, Deserialize)]
struct Failure {
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    act: &'static str,
    solution_id: &'a str,
    kind: &'static str,
    line: LineNumber,
    comment: serde_json::Value,
}

/// `success` arrives as `"true"`/`"false"` strings or as booleans.
#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(deserialize_with = "lenient_bool")]
    success: bool,
    #[serde(default)]
    id: Option<CommentId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

fn lenient_bool<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
        _ => Ok(false),
    }
}

impl Ack {
    fn check(self) -> Result<Self, RemoteError> {
        if self.success {
            Ok(self)
        } else {
            Err(RemoteError::Rejected(
                self.msg.unwrap_or_else(|| "request refused".to_string()),
            ))
        }
    }
}

/// Numeric ids go over the wire as numbers, anything else as a string.
fn id_value(id: &CommentId) -> serde_json::Value {
    id.as_str()
        .parse::<i64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::from(id.as_str()))
}

#[async_trait]
impl CommentTransport for HttpTransport {
    async fn fetch(&self, file: &FileId) -> Result<Vec<Comment>, RemoteError> {
        let response = self
            .client
            .get(self.url("comments"))
            .query(&[("act", "fetch"), ("solutionId", file.0.as_str())])
            .send()
            .await?;
        let comments: Vec<Comment> = Self::decode(response).await?;
        debug!(file = %file, count = comments.len(), "fetched comments");
        Ok(comments)
    }

    async fn create(
        &self,
        file: &FileId,
        line: LineNumber,
        body: CreateBody,
    ) -> Result<CreateAck, RemoteError> {
        let (kind, comment) = match &body {
            CreateBody::Text(text) => ("text", serde_json::Value::from(text.as_str())),
            CreateBody::StoredText(id) => ("id", id_value(id)),
        };
        let request = CreateRequest {
            act: "create",
            solution_id: &file.0,
            kind,
            line,
            comment,
        };
        let response = self
            .client
            .post(self.url("comments"))
            .json(&request)
            .send()
            .await?;
        let ack: Ack = Self::decode::<Ack>(response).await?.check()?;
        let id = ack
            .id
            .ok_or_else(|| RemoteError::Decode("create acknowledgment without id".into()))?;
        let (text, text_id) = match (ack.text, body) {
            (Some(text), CreateBody::Text(_)) => (text, None),
            (None, CreateBody::Text(text)) => (text, None),
            (Some(text), CreateBody::StoredText(text_id)) => (text, Some(text_id)),
            (None, CreateBody::StoredText(_)) => {
                return Err(RemoteError::Decode("create acknowledgment without text".into()));
            }
        };
        Ok(CreateAck { id, text, text_id })
    }

    async fn delete(&self, file: &FileId, id: &CommentId) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(self.url("comments"))
            .query(&[("act", "delete"), ("solutionId", file.0.as_str()), ("commentId", id.as_str())])
            .send()
            .await?;
        Self::decode::<Ack>(response).await?.check()?;
        Ok(())
    }

    async fn common_comments(&self, exercise: Option<i64>) -> Result<Vec<CommonComment>, RemoteError> {
        let path = match exercise {
            Some(exercise) => format!("common_comments/{exercise}"),
            None => "common_comments".to_string(),
        };
        let response = self.client.get(self.url(&path)).send().await?;
        Self::decode(response).await
    }
}
