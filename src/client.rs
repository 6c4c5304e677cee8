//! SMTP client owning one connection from `connect` to `quit`

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_native_tls::{Certificate, Identity, TlsConnector};
use async_trait::async_trait;
use log::{debug, info, warn};

use crate::authentication::{Credentials, DEFAULT_MECHANISMS};
use crate::error::Error;
use crate::extension::{ClientId, MailParameter, RcptParameter};
use crate::message::Message;
use crate::net::{ClientTlsParameters, NetworkStream};
use crate::smtp_client::{SmtpClient, SmtpTransport};
use crate::types::{EmailAddress, Envelope};
use crate::{SendResult, Transport};

/// Upper bound for the `QUIT` exchange
const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS options of a connection
#[derive(Clone)]
pub struct TlsConfig {
    /// Verify the server certificate and host name
    pub validate_certs: bool,
    /// PEM client certificate presented to the server
    pub client_cert: Option<PathBuf>,
    /// PEM PKCS #8 key of `client_cert`
    pub client_key: Option<PathBuf>,
    /// Ready-made connector, used instead of building one
    pub tls_context: Option<Arc<TlsConnector>>,
    /// PEM certificate of an additional trusted root
    pub cert_bundle: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            validate_certs: true,
            client_cert: None,
            client_key: None,
            tls_context: None,
            cert_bundle: None,
        }
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("TlsConfig")
            .field("validate_certs", &self.validate_certs)
            .field("client_cert", &self.client_cert)
            .field("client_key", &self.client_key)
            .field("tls_context", &self.tls_context.as_ref().map(|_| "TlsConnector"))
            .field("cert_bundle", &self.cert_bundle)
            .finish()
    }
}

/// Everything needed to open and run one connection
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server host name or address
    pub hostname: String,
    /// Server port
    pub port: u16,
    /// Credentials to authenticate with, if any
    pub credentials: Option<Credentials>,
    /// Limit for each network wait
    pub timeout: Option<Duration>,
    /// Host name of this client, sent with `EHLO`. The local host name when unset.
    pub source_address: Option<String>,
    /// Start TLS as soon as connected
    pub use_tls: bool,
    /// Upgrade to TLS with `STARTTLS` after the greeting
    pub start_tls: bool,
    /// TLS options, used by `use_tls` and `start_tls`
    pub tls: TlsConfig,
}

/// An SMTP client for one connection.
///
/// Nothing happens on the network until `connect`. After `quit` the client is done.
pub struct Client {
    config: ClientConfig,
    transport: Option<SmtpTransport<NetworkStream>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Client")
            .field("config", &self.config)
            .field("connected", &self.transport.is_some())
            .finish()
    }
}

impl Client {
    /// Creates a client, checking that the TLS options do not conflict
    pub fn new(config: ClientConfig) -> Result<Client, Error> {
        let tls = &config.tls;
        if tls.tls_context.is_some() && (tls.client_cert.is_some() || tls.client_key.is_some()) {
            return Err(Error::Configuration(
                "tls_context and client_cert/client_key are mutually exclusive",
            ));
        }
        if tls.client_cert.is_some() != tls.client_key.is_some() {
            return Err(Error::Configuration(
                "client_cert and client_key must be given together",
            ));
        }

        Ok(Client {
            config,
            transport: None,
        })
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Tells if `connect` succeeded and `quit` was not called yet
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Opens the connection, with TLS and authentication as configured.
    ///
    /// On failure the partially opened connection is dropped, which closes it.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.transport.is_some() {
            return Err(Error::Client("already connected"));
        }
        let config = &self.config;
        let timeout = config.timeout;

        let tls_on_connect = if config.use_tls {
            Some(tls_parameters(config).await?)
        } else {
            None
        };
        let stream = NetworkStream::connect(
            &config.hostname,
            config.port,
            timeout,
            tls_on_connect.as_ref(),
        )
        .await?;
        debug!(
            "connected to {}:{} (encrypted: {})",
            config.hostname,
            config.port,
            stream.is_encrypted()
        );

        let hello_name = match config.source_address {
            Some(ref name) => ClientId::new(name.clone()),
            None => ClientId::default(),
        };
        let client = SmtpClient::new().hello_name(hello_name).timeout(timeout);
        let mut transport = SmtpTransport::new(client.clone(), stream).await?;

        if needs_starttls(config, transport.get_ref().is_encrypted()) {
            let parameters = tls_parameters(config).await?;
            let stream = transport.starttls().await?;
            let stream = stream.upgrade_tls(&parameters, timeout).await?;
            transport = SmtpTransport::new(client.without_greeting(), stream).await?;
        }

        if let Some(ref credentials) = config.credentials {
            transport.try_login(credentials, DEFAULT_MECHANISMS).await?;
        }

        self.transport = Some(transport);
        Ok(())
    }

    /// Ends the session. Failures are logged and the connection is dropped anyway.
    pub async fn quit(&mut self) {
        let mut transport = match self.transport.take() {
            Some(transport) => transport,
            None => return,
        };

        let result = tokio::time::timeout(QUIT_TIMEOUT, async {
            transport.quit().await?;
            transport.close().await
        })
        .await;
        match result {
            Ok(Ok(())) => debug!("connection to {} closed", self.config.hostname),
            Ok(Err(err)) => warn!("error while closing connection: {}", err),
            Err(_) => warn!("QUIT timed out, dropping connection"),
        }
    }

    /// Sends a raw message to the given recipients
    pub async fn sendmail(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        let from = if sender.is_empty() {
            None
        } else {
            Some(EmailAddress::new(sender.to_string())?)
        };
        let to = recipients
            .iter()
            .map(|recipient| EmailAddress::new(recipient.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(from, to)?;

        let mail_options: Vec<MailParameter> = mail_options
            .iter()
            .map(|option| MailParameter::from(option.as_str()))
            .collect();
        let rcpt_options: Vec<RcptParameter> = rcpt_options
            .iter()
            .map(|option| RcptParameter::from(option.as_str()))
            .collect();

        let transport = self.transport.as_mut().ok_or(Error::NoStream)?;
        let (replies, text) = transport
            .send(&envelope, message, &mail_options, &rcpt_options)
            .await?;
        info!(
            "message from <{}> accepted for {} of {} recipients",
            sender,
            replies.values().filter(|reply| reply.is_completion()).count(),
            replies.len()
        );
        Ok((replies, text))
    }

    /// Sends a structured message.
    ///
    /// Sender and recipients not given are taken from the message headers.
    pub async fn send_message(
        &mut self,
        message: &Message,
        sender: Option<&str>,
        recipients: Option<&[String]>,
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        let (sender, recipients) = match (sender, recipients) {
            (Some(sender), Some(recipients)) => (sender.to_string(), recipients.to_vec()),
            (sender, recipients) => {
                let (header_sender, header_recipients) = message.envelope_addresses()?;
                let sender = match sender {
                    Some(sender) => sender.to_string(),
                    None => header_sender.ok_or(Error::MissingFrom)?,
                };
                let recipients = match recipients {
                    Some(recipients) => recipients.to_vec(),
                    None => header_recipients,
                };
                (sender, recipients)
            }
        };

        self.sendmail(
            &sender,
            &recipients,
            &message.to_bytes(),
            mail_options,
            rcpt_options,
        )
        .await
    }
}

#[async_trait]
impl Transport for Client {
    async fn connect(&mut self) -> Result<(), Error> {
        Client::connect(self).await
    }

    async fn quit(&mut self) {
        Client::quit(self).await
    }

    async fn send_message(
        &mut self,
        message: &Message,
        sender: Option<&str>,
        recipients: Option<&[String]>,
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        Client::send_message(self, message, sender, recipients, mail_options, rcpt_options).await
    }

    async fn sendmail(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        Client::sendmail(self, sender, recipients, message, mail_options, rcpt_options).await
    }
}

/// Tells if `STARTTLS` has to be sent on a connection in the given state
fn needs_starttls(config: &ClientConfig, encrypted: bool) -> bool {
    if config.start_tls && encrypted {
        debug!("connection already encrypted, skipping STARTTLS");
    }
    config.start_tls && !encrypted
}

/// Builds the TLS parameters, reading certificate files as needed
async fn tls_parameters(config: &ClientConfig) -> Result<ClientTlsParameters, Error> {
    let tls = &config.tls;
    let connector = match tls.tls_context {
        Some(ref connector) => Arc::clone(connector),
        None => {
            let mut connector = TlsConnector::new()
                .danger_accept_invalid_certs(!tls.validate_certs)
                .danger_accept_invalid_hostnames(!tls.validate_certs);

            if let Some(ref bundle) = tls.cert_bundle {
                let pem = tokio::fs::read(bundle).await?;
                connector = connector.add_root_certificate(Certificate::from_pem(&pem)?);
            }
            if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
                let cert = tokio::fs::read(cert).await?;
                let key = tokio::fs::read(key).await?;
                connector = connector.identity(Identity::from_pkcs8(&cert, &key)?);
            }
            Arc::new(connector)
        }
    };

    Ok(ClientTlsParameters::new(config.hostname.clone(), connector))
}
