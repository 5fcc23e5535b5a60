//! # mailagent-core
//!
//! Foundation types shared by every mailagent crate:
//!
//! - **Branded IDs**: [`RequestId`], [`EmailId`] as newtypes over UUID v7 strings
//! - **Protocol**: [`OutboundFrame`] / [`InboundFrame`] for the realtime JSON wire format
//! - **Errors**: [`ErrorCategory`] classification used for logging and retry decisions
//! - **Retry**: backoff math for the reconnect supervisor
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod retry;

pub use errors::ErrorCategory;
pub use ids::{EmailId, MessageId, RequestId};
pub use protocol::{
    ChatResponse, EmailResponse, FrameDecodeError, FrameType, GeneratedEmail, InboundFrame,
    OutboundFrame,
};
pub use retry::RetryConfig;
