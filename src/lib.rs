//! Twilio Chat provider
//!
//! A plugin for the Hemmer infrastructure tool that manages Twilio
//! Programmable Chat:
//!
//! - `twilio_chat_service`: a Chat service with its `roles`, `limits`,
//!   `additional_settings`, `webhooks` and `notifications` settings
//! - `twilio_chat_fcm_credential`: a Firebase Cloud Messaging push credential
//! - `twilio_chat_services` (data source): the account's Chat services
//!
//! The binary speaks the host's gRPC provider protocol. On startup it prints
//! a handshake line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! and the host connects to that address. Everything else goes to stderr.
//!
//! # Configuration
//!
//! ```hcl
//! provider "twilio" {
//!   account_sid = "AC..."   # or $TWILIO_ACCOUNT_SID
//!   auth_token  = "..."     # or $TWILIO_AUTH_TOKEN
//!
//!   # Optional, defaults to https://chat.twilio.com
//!   chat_base_url = "https://chat.twilio.com"
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod server;
pub mod state;
pub mod testing;
pub mod twilio;
pub mod types;
pub mod validation;
pub mod validators;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use provider::TwilioProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};
pub use validation::{validate, validate_result};
