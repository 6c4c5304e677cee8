//! Sending one message in one call.
//!
//! [`send`] opens a connection, runs a single mail transaction and closes the connection
//! again, whatever the outcome of the transaction:
//!
//! ```no_run
//! use async_smtp_send::{send, SendParameters};
//!
//! # async fn run() -> Result<(), async_smtp_send::error::Error> {
//! let (replies, text) = send(
//!     "Subject: hello\r\n\r\nHi there",
//!     SendParameters::new()
//!         .hostname("smtp.example.com")
//!         .start_tls(true)
//!         .sender("root@example.com")
//!         .recipients("someone@example.com"),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! A structured [`Message`] carries its own envelope in its headers, so sender and recipients
//! are optional for it. Raw message data needs both.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_native_tls::TlsConnector;
use log::{debug, warn};

use crate::authentication::Credentials;
use crate::client::{Client, ClientConfig, TlsConfig};
use crate::error::Error;
use crate::message::Message;
use crate::{SendResult, Transport};

/// Port for TLS on connect
pub const SMTP_TLS_PORT: u16 = 465;
/// Port for message submission with `STARTTLS`
pub const SUBMISSION_PORT: u16 = 587;
/// Default smtp port
pub const SMTP_PORT: u16 = 25;

/// Default limit for each network wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The message to send
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Content {
    /// A message whose headers provide the sender and recipients
    Structured(Message),
    /// Message data sent as is
    Raw(Vec<u8>),
}

impl From<Message> for Content {
    fn from(message: Message) -> Self {
        Content::Structured(message)
    }
}

impl From<&str> for Content {
    fn from(data: &str) -> Self {
        Content::Raw(data.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(data: String) -> Self {
        Content::Raw(data.into_bytes())
    }
}

impl From<Vec<u8>> for Content {
    fn from(data: Vec<u8>) -> Self {
        Content::Raw(data)
    }
}

impl From<&[u8]> for Content {
    fn from(data: &[u8]) -> Self {
        Content::Raw(data.to_vec())
    }
}

/// One recipient address or several, in order
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Recipients(Vec<String>);

impl Recipients {
    /// Tells if there is no address at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The addresses
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Takes the addresses
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Recipients::from(address.to_string())
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        if address.is_empty() {
            Recipients(Vec::new())
        } else {
            Recipients(vec![address])
        }
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Recipients(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Recipients::from(addresses.as_slice())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addresses: &[&str]) -> Self {
        Recipients(addresses.iter().map(|address| address.to_string()).collect())
    }
}

/// The message together with the envelope information it needs
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum MessageInput {
    /// Sender and recipients given here override the message headers
    Structured {
        /// The message
        message: Message,
        /// Sender override
        sender: Option<String>,
        /// Recipients override
        recipients: Option<Vec<String>>,
    },
    /// Message data with its mandatory envelope
    Raw {
        /// Envelope sender
        sender: String,
        /// Envelope recipients, never empty
        recipients: Vec<String>,
        /// Message data
        payload: Vec<u8>,
    },
}

impl MessageInput {
    /// Pairs the content with its envelope.
    ///
    /// Raw content fails with `Error::InvalidArguments` without recipients or without a
    /// sender. Structured content is never checked here.
    pub fn resolve(
        content: Content,
        sender: Option<String>,
        recipients: Option<Recipients>,
    ) -> Result<MessageInput, Error> {
        match content {
            Content::Structured(message) => Ok(MessageInput::Structured {
                message,
                sender,
                recipients: recipients.map(Recipients::into_vec),
            }),
            Content::Raw(payload) => {
                let recipients = match recipients {
                    Some(recipients) if !recipients.is_empty() => recipients.into_vec(),
                    _ => {
                        return Err(Error::InvalidArguments(
                            "recipients must be provided with raw messages",
                        ))
                    }
                };
                let sender = match sender {
                    Some(sender) if !sender.is_empty() => sender,
                    _ => {
                        return Err(Error::InvalidArguments(
                            "sender must be provided with raw messages",
                        ))
                    }
                };
                Ok(MessageInput::Raw {
                    sender,
                    recipients,
                    payload,
                })
            }
        }
    }
}

/// Everything `send` needs besides the message
#[derive(Clone, Debug)]
pub struct SendParameters {
    sender: Option<String>,
    recipients: Option<Recipients>,
    hostname: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    mail_options: Vec<String>,
    rcpt_options: Vec<String>,
    timeout: Option<Duration>,
    source_address: Option<String>,
    use_tls: bool,
    start_tls: bool,
    tls: TlsConfig,
}

impl Default for SendParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl SendParameters {
    /// Creates parameters with the defaults:
    ///
    /// * host `localhost`, port from the TLS settings
    /// * no TLS, certificates validated when TLS is enabled
    /// * no authentication
    /// * 60 seconds for each network wait
    pub fn new() -> Self {
        SendParameters {
            sender: None,
            recipients: None,
            hostname: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            mail_options: Vec::new(),
            rcpt_options: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            source_address: None,
            use_tls: false,
            start_tls: false,
            tls: TlsConfig::default(),
        }
    }

    /// Envelope sender
    pub fn sender<S: Into<String>>(self, sender: S) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self
        }
    }

    /// Envelope recipients
    pub fn recipients<R: Into<Recipients>>(self, recipients: R) -> Self {
        Self {
            recipients: Some(recipients.into()),
            ..self
        }
    }

    /// Server host name or address
    pub fn hostname<S: Into<String>>(self, hostname: S) -> Self {
        Self {
            hostname: hostname.into(),
            ..self
        }
    }

    /// Server port, overriding the default
    pub fn port(self, port: u16) -> Self {
        Self {
            port: Some(port),
            ..self
        }
    }

    /// User name to authenticate with
    pub fn username<S: Into<String>>(self, username: S) -> Self {
        Self {
            username: Some(username.into()),
            ..self
        }
    }

    /// Password to authenticate with
    pub fn password<S: Into<String>>(self, password: S) -> Self {
        Self {
            password: Some(password.into()),
            ..self
        }
    }

    /// `MAIL FROM` options, as `KEYWORD[=VALUE]`
    pub fn mail_options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mail_options: options.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// `RCPT TO` options, as `KEYWORD[=VALUE]`
    pub fn rcpt_options<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rcpt_options: options.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Limit for each network wait, `None` to wait forever
    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Host name of this client, sent with `EHLO`. Defaults to the local host name.
    pub fn source_address<S: Into<String>>(self, name: S) -> Self {
        Self {
            source_address: Some(name.into()),
            ..self
        }
    }

    /// Start TLS as soon as connected
    pub fn use_tls(self, enabled: bool) -> Self {
        Self {
            use_tls: enabled,
            ..self
        }
    }

    /// Upgrade to TLS with `STARTTLS`
    pub fn start_tls(self, enabled: bool) -> Self {
        Self {
            start_tls: enabled,
            ..self
        }
    }

    /// Verify the server certificate and host name
    pub fn validate_certs(mut self, enabled: bool) -> Self {
        self.tls.validate_certs = enabled;
        self
    }

    /// Client certificate, a PEM file
    pub fn client_cert<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tls.client_cert = Some(path.into());
        self
    }

    /// Key of the client certificate, a PEM PKCS #8 file
    pub fn client_key<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tls.client_key = Some(path.into());
        self
    }

    /// Ready-made TLS connector
    pub fn tls_context(mut self, connector: TlsConnector) -> Self {
        self.tls.tls_context = Some(Arc::new(connector));
        self
    }

    /// Additional trusted root certificate, a PEM file
    pub fn cert_bundle<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tls.cert_bundle = Some(path.into());
        self
    }

    /// The port to connect to: the one given, else 465 with `use_tls`, 587 with
    /// `start_tls` and 25 otherwise
    pub fn resolved_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.use_tls => SMTP_TLS_PORT,
            None if self.start_tls => SUBMISSION_PORT,
            None => SMTP_PORT,
        }
    }

    /// Connection settings for the client
    pub fn client_config(&self) -> ClientConfig {
        let credentials = self.username.as_ref().map(|username| {
            Credentials::new(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            )
        });

        ClientConfig {
            hostname: self.hostname.clone(),
            port: self.resolved_port(),
            credentials,
            timeout: self.timeout,
            source_address: self.source_address.clone(),
            use_tls: self.use_tls,
            start_tls: self.start_tls,
            tls: self.tls.clone(),
        }
    }
}

/// Sends one message: connects, runs the transaction and disconnects.
///
/// Returns the reply to each recipient, keyed by address, and the text of the final reply.
/// The connection is closed on every exit path once established.
pub async fn send<M: Into<Content>>(
    message: M,
    parameters: SendParameters,
) -> Result<SendResult, Error> {
    send_with(message, parameters, Client::new).await
}

/// Same as [`send`], with the client built by `build`
pub async fn send_with<M, T, F>(
    message: M,
    parameters: SendParameters,
    build: F,
) -> Result<SendResult, Error>
where
    M: Into<Content>,
    T: Transport + 'static,
    F: FnOnce(ClientConfig) -> Result<T, Error>,
{
    let input = MessageInput::resolve(
        message.into(),
        parameters.sender.clone(),
        parameters.recipients.clone(),
    )?;
    let config = parameters.client_config();
    debug!("sending through {}:{}", config.hostname, config.port);

    let mut session = Session::open(build(config)?).await?;
    let result = match input {
        MessageInput::Structured {
            message,
            sender,
            recipients,
        } => {
            session
                .transport()?
                .send_message(
                    &message,
                    sender.as_deref(),
                    recipients.as_deref(),
                    &parameters.mail_options,
                    &parameters.rcpt_options,
                )
                .await
        }
        MessageInput::Raw {
            sender,
            recipients,
            payload,
        } => {
            session
                .transport()?
                .sendmail(
                    &sender,
                    &recipients,
                    &payload,
                    &parameters.mail_options,
                    &parameters.rcpt_options,
                )
                .await
        }
    };
    session.release().await;

    result
}

/// A connected transport, released exactly once.
///
/// Dropping it while still connected, when the sending future is cancelled, spawns the
/// release on the current runtime.
struct Session<T: Transport + 'static> {
    transport: Option<T>,
}

impl<T: Transport + 'static> Session<T> {
    async fn open(mut transport: T) -> Result<Session<T>, Error> {
        transport.connect().await?;
        Ok(Session {
            transport: Some(transport),
        })
    }

    fn transport(&mut self) -> Result<&mut T, Error> {
        self.transport.as_mut().ok_or(Error::NoStream)
    }

    async fn release(mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.quit().await;
        }
    }
}

impl<T: Transport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    warn!("send interrupted, closing the connection in the background");
                    handle.spawn(async move { transport.quit().await });
                }
                Err(_) => warn!("send interrupted outside of a runtime, dropping the connection"),
            }
        }
    }
}
