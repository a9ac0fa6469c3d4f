//! Backend adapters: request bodies, stream decoders and the transport seam.

pub mod format;
pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "openai")]
pub mod openai_responses;

#[cfg(feature = "openai-compatible")]
pub mod openai_chat;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::config::DecoderConfig;
use crate::error::SluiceError;
use crate::stream::{ByteStream, EventStream, StreamDecoder};
use crate::types::{Backend, StreamEvent, StreamOptions};

/// Bytes of a failed response body kept for the error message.
const ERROR_BODY_LIMIT: usize = 4096;

/// A request ready to be posted.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Path appended to the transport's base URL.
    pub path: String,
    pub body: Value,
}

/// The response as handed to the decoder.
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<ByteStream>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Sends a request and returns the status, headers and body stream.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SluiceError>;
}

/// Build the request for `options.backend`.
pub fn build_request(options: &StreamOptions) -> Result<HttpRequest, SluiceError> {
    if options.model.trim().is_empty() {
        return Err(SluiceError::InvalidArgument("model must not be empty".into()));
    }
    let body = match options.backend {
        #[cfg(feature = "anthropic")]
        Backend::Anthropic => anthropic::build_request_body(options),
        #[cfg(feature = "openai")]
        Backend::OpenAiResponses => openai_responses::build_request_body(options),
        #[cfg(feature = "openai-compatible")]
        Backend::OpenAiChat => openai_chat::build_request_body(options),
        #[allow(unreachable_patterns)]
        other => return Err(not_enabled(other)),
    };
    Ok(HttpRequest {
        path: options.backend.endpoint().to_string(),
        body,
    })
}

/// Create the decoder for `backend`.
#[allow(unused_variables)]
pub fn create_decoder(
    backend: Backend,
    config: &DecoderConfig,
) -> Result<Box<dyn StreamDecoder>, SluiceError> {
    match backend {
        #[cfg(feature = "anthropic")]
        Backend::Anthropic => Ok(Box::new(anthropic::AnthropicDecoder::new())),
        #[cfg(feature = "openai")]
        Backend::OpenAiResponses => Ok(Box::new(openai_responses::ResponsesDecoder::new())),
        #[cfg(feature = "openai-compatible")]
        Backend::OpenAiChat => Ok(Box::new(openai_chat::ChatDecoder::new(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(not_enabled(other)),
    }
}

fn not_enabled(backend: Backend) -> SluiceError {
    SluiceError::UnsupportedBackend(format!("backend '{backend}' not enabled via feature flags"))
}

/// Decode an HTTP response. A non-success status or a missing body yields a
/// single `Error` without reading any frame.
pub fn decode_response(
    response: HttpResponse,
    decoder: Box<dyn StreamDecoder>,
    config: &DecoderConfig,
) -> EventStream {
    if !response.is_success() {
        let err = http::status_to_error(response.status, &response.headers, "");
        return EventStream::failed(decoder, err);
    }
    match response.body {
        Some(body) => EventStream::new(body, decoder, config),
        None => EventStream::failed(
            decoder,
            SluiceError::Transport("response has no body".into()),
        ),
    }
}

/// Send `options` through `transport` and decode the response.
///
/// Every failure, including request building, surfaces as a single `Error`
/// event.
pub fn stream_events<'a, T>(
    transport: &'a T,
    options: &StreamOptions,
    config: &DecoderConfig,
) -> BoxStream<'a, StreamEvent>
where
    T: HttpTransport + ?Sized,
{
    let prepared = build_request(options)
        .and_then(|request| Ok((request, create_decoder(options.backend, config)?)));
    let config = config.clone();
    let backend = options.backend;
    let model = options.model.clone();

    async_stream::stream! {
        match prepared {
            Err(err) => yield StreamEvent::error(err.to_string(), Some(err)),
            Ok((request, decoder)) => {
                debug!(%backend, model = %model, "stream_events");
                match transport.send(request).await {
                    Err(err) => yield StreamEvent::error(err.to_string(), Some(err)),
                    Ok(response) if !response.is_success() => {
                        let status = response.status;
                        let headers = response.headers;
                        let detail = read_error_body(response.body).await;
                        let err = http::status_to_error(status, &headers, &detail);
                        yield StreamEvent::error(err.to_string(), Some(err));
                    }
                    Ok(response) => {
                        let mut events = decode_response(response, decoder, &config);
                        while let Some(event) = events.next().await {
                            yield event;
                        }
                    }
                }
            }
        }
    }
    .boxed()
}

async fn read_error_body(body: Option<ByteStream>) -> String {
    let Some(mut body) = body else {
        return String::new();
    };
    let mut collected = Vec::new();
    while collected.len() < ERROR_BODY_LIMIT {
        match body.next().await {
            Some(Ok(chunk)) => collected.extend_from_slice(&chunk),
            _ => break,
        }
    }
    collected.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&collected).trim().to_string()
}
