//! Sluice: streaming provider adapter.
//!
//! Turns the event streams of LLM backends into one canonical sequence of
//! [`StreamEvent`](types::StreamEvent)s. Three wire protocols are supported:
//! Anthropic block events, OpenAI Responses output items and chat-completion
//! delta arrays (OpenAI and the many servers that mimic it).
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
//! use sluice::prelude::*;
//!
//! # async fn example() -> sluice::error::Result<()> {
//! let config = SluiceConfig::from_env();
//! let mut headers = HeaderMap::new();
//! headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-..."));
//! let transport = ReqwestTransport::new(config.base_url(Backend::OpenAiChat), headers);
//!
//! let options = StreamOptions::builder()
//!     .backend(Backend::OpenAiChat)
//!     .model("gpt-4o-mini")
//!     .messages(vec![ModelMessage::user("Hello!")])
//!     .build();
//!
//! let mut events = stream_events(&transport, &options, &config.decoder_config());
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::Delta { text } = event {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod types;

pub use config::{DecoderConfig, SluiceConfig};
pub use error::{Result, SluiceError};
pub use provider::http::ReqwestTransport;
pub use provider::{
    build_request, create_decoder, decode_response, stream_events, HttpRequest, HttpResponse,
    HttpTransport,
};
pub use stream::{DecodeIter, EventStream, StreamDecoder, StreamTextResult};
pub use types::{Backend, StreamEvent, StreamOptions};
