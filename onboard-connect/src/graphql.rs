use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::rest::RestSession;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persistent GraphQL client: every query is POSTed to the session's base
/// URL as `{"query": ..., "variables": ...}`.
#[derive(Debug, Clone)]
pub struct GraphQlSession {
    session: RestSession,
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl GraphQlSession {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let config = config
            .clone()
            .header("Content-Type", "application/json");
        Ok(Self {
            session: RestSession::new(&config)?,
        })
    }

    /// The underlying HTTP session, for the odd non-GraphQL request.
    pub fn rest(&self) -> &RestSession {
        &self.session
    }

    pub fn execute<T: DeserializeOwned>(&self, query: &str, variables: &Value) -> Result<T> {
        let envelope: Envelope<T> = self.session.post_json("", &Request { query, variables })?;
        unwrap_envelope(envelope)
    }
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T> {
    if !envelope.errors.is_empty() {
        let messages: Vec<&str> = envelope.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(Error::invalid_data("graphql", messages.join("; ")));
    }
    envelope
        .data
        .ok_or_else(|| Error::invalid_data("graphql", "response carries no data"))
}
