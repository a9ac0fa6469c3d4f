//! Convenience re-exports for common use.

pub use crate::config::{DecoderConfig, SluiceConfig};
pub use crate::error::{Result, SluiceError};
pub use crate::provider::http::ReqwestTransport;
pub use crate::provider::{stream_events, HttpTransport};
pub use crate::stream::{EventStream, StreamTextResult};
pub use crate::types::{
    Backend, ContentPart, EndEvent, ModelMessage, ResponseFormat, Role, StreamEvent,
    StreamOptions, ToolCallEvent, ToolDefinition, Usage,
};
