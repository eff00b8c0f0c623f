//! Wire request construction and header decoration.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use sc_protocol::{ChatMessage, CompletionRequest, StreamError};
use serde::Serialize;

/// JSON body of a streaming chat-completion call.
#[derive(Debug, Serialize, PartialEq)]
pub struct WireBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub stream: bool,
    pub messages: &'a [ChatMessage],
}

/// Build the wire body. The request's own model wins over `default_model`;
/// `stream` is always true on this path.
pub fn build_body<'a>(
    request: &'a CompletionRequest,
    default_model: Option<&'a str>,
) -> WireBody<'a> {
    WireBody {
        model: request.model.as_deref().or(default_model),
        stream: true,
        messages: &request.messages,
    }
}

/// Attach the SSE accept header, bearer credential and JSON content type.
pub fn decorate(builder: RequestBuilder, credential: &str) -> RequestBuilder {
    builder
        .header(ACCEPT, "text/event-stream")
        .header(AUTHORIZATION, format!("Bearer {credential}"))
        .header(CONTENT_TYPE, "application/json")
}

/// Build the full POST request for `request`.
pub fn build_request(
    http: &Client,
    endpoint: &str,
    credential: &str,
    default_model: Option<&str>,
    request: &CompletionRequest,
) -> Result<reqwest::Request, StreamError> {
    let body = serde_json::to_vec(&build_body(request, default_model))
        .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;

    decorate(http.post(endpoint), credential)
        .body(body)
        .build()
        .map_err(|e| StreamError::InvalidRequest(e.to_string()))
}
