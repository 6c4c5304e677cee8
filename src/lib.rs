//! Async-Smtp-Send sends an email over SMTP in one async call.
//!
//! [`send`] takes either a structured [`Message`], whose headers provide the envelope, or raw
//! message data with an explicit sender and recipients. It connects to the server, upgrades
//! to TLS and authenticates as configured in [`SendParameters`], runs one mail transaction
//! and always closes the connection afterwards.
//!
//! The result is the reply of the server to each recipient, keyed by address, together with
//! the text of its final reply. Recipients refused by the server show up in the map; the
//! call only fails when the whole transaction does.
//!
//! The connection itself is handled by a [`Transport`]. [`Client`] talks SMTP over TCP with
//! `tokio` and `async-native-tls`; [`StubTransport`] records calls for tests.

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]

pub mod authentication;
pub mod client;
mod codec;
pub mod commands;
pub mod error;
pub mod extension;
pub mod message;
pub mod mock;
pub mod net;
pub mod response;
pub mod send;
pub mod smtp_client;
pub mod stream;
pub mod stub;
mod types;

pub use types::*;

pub use crate::client::{Client, ClientConfig, TlsConfig};
pub use crate::message::Message;
pub use crate::net::ClientTlsParameters;
pub use crate::send::{send, send_with, Content, MessageInput, Recipients, SendParameters};
pub use crate::smtp_client::{SmtpClient, SmtpTransport};
pub use crate::stub::StubTransport;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Error;
use crate::response::Response;

/// Replies of a successful transaction: one per recipient, keyed by address, and the text
/// of the reply to the message data
pub type SendResult = (HashMap<String, Response>, String);

/// A connection able to run one mail transaction
#[async_trait]
pub trait Transport: Send {
    /// Opens the connection, including TLS and authentication.
    ///
    /// On failure nothing is left open.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Closes the connection. Errors are not reported.
    async fn quit(&mut self);

    /// Sends a structured message. Without overrides, sender and recipients come from the
    /// message headers.
    async fn send_message(
        &mut self,
        message: &Message,
        sender: Option<&str>,
        recipients: Option<&[String]>,
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error>;

    /// Sends raw message data
    async fn sendmail(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error>;
}
