use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};

use crate::authentication::{Credentials, Mechanism};
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::{
    ClientId, Extension, MailParameter, RcptParameter, ServerInfo,
};
use crate::response::{Response, Severity};
use crate::stream::SmtpStream;
use crate::types::Envelope;
use crate::SendResult;

/// Contains client configuration
#[derive(Clone, Debug)]
pub struct SmtpClient {
    /// Name sent during EHLO
    hello_name: ClientId,
    /// Always announce SMTPUTF8 when the server supports it
    smtp_utf8: bool,
    /// Whether to expect greeting.
    /// Normally the server sends a greeting after connection,
    /// but not after STARTTLS.
    expect_greeting: bool,
    /// Limit for each network wait
    timeout: Option<Duration>,
}

impl Default for SmtpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the SMTP `SmtpTransport`
impl SmtpClient {
    /// Creates a new SMTP client.
    ///
    /// It does not connect to the server, but only creates the `SmtpTransport`.
    ///
    /// Defaults are:
    ///
    /// * Local host name as EHLO name
    /// * SMTPUTF8 only for international addresses
    /// * No timeout
    pub fn new() -> Self {
        SmtpClient {
            smtp_utf8: false,
            hello_name: Default::default(),
            expect_greeting: true,
            timeout: None,
        }
    }

    /// Enable SMTPUTF8 if the server supports it
    pub fn smtp_utf8(self, enabled: bool) -> SmtpClient {
        Self {
            smtp_utf8: enabled,
            ..self
        }
    }

    /// Set the name used during EHLO
    pub fn hello_name(self, name: ClientId) -> SmtpClient {
        Self {
            hello_name: name,
            ..self
        }
    }

    /// Set the limit for each network wait
    pub fn timeout(self, timeout: Option<Duration>) -> SmtpClient {
        Self { timeout, ..self }
    }

    /// Do not expect greeting.
    ///
    /// Could be used for STARTTLS connections.
    pub fn without_greeting(self) -> SmtpClient {
        Self {
            expect_greeting: false,
            ..self
        }
    }
}

/// Structure that implements the high level SMTP client
#[derive(Debug)]
pub struct SmtpTransport<S: Read + Write + Unpin> {
    /// Information about the server
    server_info: ServerInfo,
    /// Information about the client
    client_info: SmtpClient,
    /// Low level client
    stream: SmtpStream<S>,
}

impl<S: Read + Write + Unpin> SmtpTransport<S> {
    /// Creates a new SMTP transport: reads the greeting and introduces the client.
    pub async fn new(builder: SmtpClient, stream: S) -> Result<Self, Error> {
        let mut stream = SmtpStream::new(stream, builder.timeout);
        if builder.expect_greeting {
            let _greeting = stream.read_response().await?;
        }
        let server_info = hello(&mut stream, &builder.hello_name).await?;

        // Print server information
        debug!("server {}", server_info);

        Ok(SmtpTransport {
            server_info,
            client_info: builder,
            stream,
        })
    }

    /// Information the server gave in its EHLO reply
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Gets a reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Try to login with the given accepted mechanisms.
    ///
    /// Fails when the server advertises none of them.
    pub async fn try_login(
        &mut self,
        credentials: &Credentials,
        accepted_mechanisms: &[Mechanism],
    ) -> Result<(), Error> {
        match accepted_mechanisms
            .iter()
            .find(|mechanism| self.server_info.supports_auth_mechanism(**mechanism))
        {
            Some(mechanism) => {
                self.auth(*mechanism, credentials).await?;
                info!("authenticated as {}", credentials.username());
                Ok(())
            }
            None => Err(Error::Client(
                "no supported authentication mechanisms available",
            )),
        }
    }

    /// Sends STARTTLS command if the server supports it.
    ///
    /// Returns inner stream which should be upgraded to TLS.
    pub async fn starttls(mut self) -> Result<S, Error> {
        if !self.supports_feature(Extension::StartTls) {
            return Err(From::from("server does not support STARTTLS"));
        }

        self.stream.command(StarttlsCommand).await?;

        // Return the stream, so the caller can upgrade it to TLS.
        Ok(self.stream.into_inner())
    }

    /// Checks the EHLO reply for a feature
    pub fn supports_feature(&self, keyword: Extension) -> bool {
        self.server_info.supports_feature(keyword)
    }

    /// Closes the SMTP session.
    pub async fn quit(&mut self) -> Result<(), Error> {
        self.stream.command(QuitCommand).await?;

        Ok(())
    }

    /// Shuts down the connection
    pub async fn close(&mut self) -> Result<(), Error> {
        self.stream.shutdown().await
    }

    /// Aborts the current transaction, ignoring the outcome
    pub async fn reset(&mut self) {
        if let Err(err) = self.stream.command(RsetCommand).await {
            debug!("RSET failed: {}", err);
        }
    }

    /// Sends an AUTH command with the given mechanism, and handles challenge if needed
    pub async fn auth(&mut self, mechanism: Mechanism, credentials: &Credentials) -> SmtpResult {
        let mut challenges = 10;
        let mut response = self
            .stream
            .command(AuthCommand::new(mechanism, credentials.clone(), None)?)
            .await?;

        while challenges > 0 && response.has_code(334) {
            challenges -= 1;
            response = self
                .stream
                .command(AuthCommand::new_from_response(
                    mechanism,
                    credentials.clone(),
                    &response,
                )?)
                .await?;
        }

        if response.has_code(334) {
            Err(Error::ResponseParsing("Unexpected number of challenges"))
        } else {
            Ok(response)
        }
    }

    /// Runs one mail transaction.
    ///
    /// Refused recipients are recorded in the returned map with their reply. The transaction
    /// only fails as a whole when the sender, the data or every recipient is refused.
    pub async fn send(
        &mut self,
        envelope: &Envelope,
        message: &[u8],
        mail_options: &[MailParameter],
        rcpt_options: &[RcptParameter],
    ) -> Result<SendResult, Error> {
        let mail_options = self.mail_parameters(envelope, message, mail_options)?;

        // Mail
        let reply = self
            .stream
            .command_reply(MailCommand::new(envelope.from().cloned(), mail_options))
            .await?;
        if !reply.is_completion() {
            self.reset().await;
            return Err(match reply.code().severity {
                Severity::PositiveIntermediate => {
                    Error::ResponseParsing("unexpected reply to MAIL")
                }
                _ => reply.into(),
            });
        }

        // Recipient
        let mut recipient_replies: HashMap<String, Response> = HashMap::new();
        let mut accepted = 0;
        for to_address in envelope.to() {
            let reply = self
                .stream
                .command_reply(RcptCommand::new(to_address.clone(), rcpt_options.to_vec()))
                .await?;
            // Log the rcpt command
            debug!("to=<{}> ({})", to_address, reply.code());
            if reply.is_completion() {
                accepted += 1;
            }
            recipient_replies.insert(to_address.to_string(), reply);
        }

        if accepted == 0 {
            self.reset().await;
            return Err(Error::RecipientsRefused(recipient_replies));
        }

        // Data
        let reply = self.stream.command_reply(DataCommand).await?;
        if !reply.has_code(354) {
            self.reset().await;
            return Err(match reply.code().severity {
                Severity::TransientNegativeCompletion | Severity::PermanentNegativeCompletion => {
                    reply.into()
                }
                _ => Error::ResponseParsing("unexpected reply to DATA"),
            });
        }

        // Message content
        let result = self.stream.message(message).await?;
        let text = result.text();

        // Log the message
        debug!(
            "status=sent ({})",
            result.first_line().unwrap_or("no response")
        );

        Ok((recipient_replies, text))
    }

    /// Options sent with `MAIL FROM`: the caller's, then the ones the payload requires
    fn mail_parameters(
        &self,
        envelope: &Envelope,
        message: &[u8],
        mail_options: &[MailParameter],
    ) -> Result<Vec<MailParameter>, Error> {
        let mut parameters = mail_options.to_vec();
        let given = |keyword: &str| mail_options.iter().any(|option| option.is_keyword(keyword));

        if self.supports_feature(Extension::Size) && !given("SIZE") {
            parameters.push(MailParameter::Size(message.len()));
        }

        if self.supports_feature(Extension::EightBitMime)
            && !message.is_ascii()
            && !given("BODY")
        {
            parameters.push(MailParameter::EightBitMime);
        }

        let utf8_needed = envelope.is_international();
        if utf8_needed && !self.supports_feature(Extension::SmtpUtfEight) {
            return Err(Error::Client(
                "server does not support SMTPUTF8 for international addresses",
            ));
        }
        if (utf8_needed || self.client_info.smtp_utf8)
            && self.supports_feature(Extension::SmtpUtfEight)
            && !given("SMTPUTF8")
        {
            parameters.push(MailParameter::SmtpUtfEight);
        }

        Ok(parameters)
    }
}

/// Introduces the client with EHLO, falling back to HELO when the server refuses it
async fn hello<S: Read + Write + Unpin>(
    stream: &mut SmtpStream<S>,
    hello_name: &ClientId,
) -> Result<ServerInfo, Error> {
    let reply = stream
        .command_reply(EhloCommand::new(hello_name.clone()))
        .await?;
    if reply.is_positive() {
        return ServerInfo::from_response(&reply);
    }
    if reply.code().severity != Severity::PermanentNegativeCompletion {
        return Err(reply.into());
    }

    debug!("EHLO refused, falling back to HELO");
    let reply = stream.command(HeloCommand::new(hello_name.clone())).await?;
    Ok(ServerInfo {
        name: reply.first_word().unwrap_or_default().to_string(),
        features: Default::default(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::authentication::DEFAULT_MECHANISMS;
    use crate::mock::MockStream;
    use crate::types::EmailAddress;

    fn client() -> SmtpClient {
        SmtpClient::new().hello_name(ClientId::new("client.test".to_string()))
    }

    fn envelope(from: &str, to: &[&str]) -> Envelope {
        Envelope::new(
            Some(EmailAddress::new(from.to_string()).unwrap()),
            to.iter()
                .map(|to| EmailAddress::new(to.to_string()).unwrap())
                .collect(),
        )
        .unwrap()
    }

    async fn session(server: &[u8]) -> SmtpTransport<MockStream> {
        SmtpTransport::new(client(), MockStream::with_vec(server.to_vec()))
            .await
            .unwrap()
    }

    fn written(transport: SmtpTransport<MockStream>) -> String {
        let mut mock = transport.stream.into_inner();
        String::from_utf8(mock.take_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_greeting_and_ehlo() {
        let transport = session(b"220 ready\r\n250-mx.test\r\n250-SIZE 100\r\n250 AUTH PLAIN\r\n").await;

        assert_eq!(transport.server_info().name, "mx.test");
        assert!(transport.supports_feature(Extension::Size));
        assert!(transport.server_info().supports_auth_mechanism(Mechanism::Plain));
        assert_eq!(written(transport), "EHLO client.test\r\n");
    }

    #[tokio::test]
    async fn test_helo_fallback() {
        let transport = session(b"220 ready\r\n502 no\r\n250 old.test\r\n").await;

        assert_eq!(transport.server_info().name, "old.test");
        assert!(transport.server_info().features.is_empty());
        assert_eq!(written(transport), "EHLO client.test\r\nHELO client.test\r\n");
    }

    #[tokio::test]
    async fn test_ehlo_transient_refusal() {
        let result = SmtpTransport::new(
            client(),
            MockStream::with_vec(b"220 ready\r\n421 busy\r\n".to_vec()),
        )
        .await;
        assert!(matches!(result, Err(Error::Transient(_))));
    }

    #[tokio::test]
    async fn test_without_greeting() {
        let transport = SmtpTransport::new(
            client().without_greeting(),
            MockStream::with_vec(b"250 mx.test\r\n".to_vec()),
        )
        .await
        .unwrap();
        assert_eq!(written(transport), "EHLO client.test\r\n");
    }

    #[tokio::test]
    async fn test_starttls() {
        let transport = session(b"220 ready\r\n250 mx.test\r\n").await;
        assert!(matches!(transport.starttls().await, Err(Error::Client(_))));

        let transport = session(b"220 ready\r\n250-mx.test\r\n250 STARTTLS\r\n220 go\r\n").await;
        let mut mock = transport.starttls().await.unwrap();
        assert_eq!(
            String::from_utf8(mock.take_vec()).unwrap(),
            "EHLO client.test\r\nSTARTTLS\r\n"
        );
    }

    #[tokio::test]
    async fn test_login() {
        let credentials = Credentials::new("user".to_string(), "password".to_string());

        let mut transport = session(
            b"220 ready\r\n250-mx.test\r\n250 AUTH LOGIN\r\n334 VXNlcm5hbWU6\r\n334 UGFzc3dvcmQ6\r\n235 ok\r\n",
        )
        .await;
        transport
            .try_login(&credentials, DEFAULT_MECHANISMS)
            .await
            .unwrap();
        assert_eq!(
            written(transport),
            "EHLO client.test\r\nAUTH LOGIN\r\ndXNlcg==\r\ncGFzc3dvcmQ=\r\n"
        );

        let mut transport = session(b"220 ready\r\n250-mx.test\r\n250 AUTH CRAM-MD5\r\n").await;
        assert!(transport
            .try_login(&credentials, DEFAULT_MECHANISMS)
            .await
            .is_err());

        let mut transport =
            session(b"220 ready\r\n250-mx.test\r\n250 AUTH PLAIN\r\n535 bad credentials\r\n").await;
        assert!(matches!(
            transport.try_login(&credentials, DEFAULT_MECHANISMS).await,
            Err(Error::Permanent(_))
        ));
    }

    #[tokio::test]
    async fn test_send() {
        let mut transport = session(
            b"220 ready\r\n250-mx.test\r\n250-SIZE\r\n250 8BITMIME\r\n\
              250 sender ok\r\n250 a ok\r\n550 no such user\r\n354 go ahead\r\n250-queued\r\n250 as 42\r\n",
        )
        .await;

        let (replies, text) = transport
            .send(
                &envelope("x@example.com", &["a@example.com", "b@example.com"]),
                "héllo\n".as_bytes(),
                &[],
                &[RcptParameter::from("NOTIFY=NEVER")],
            )
            .await
            .unwrap();

        assert_eq!(text, "queued\nas 42");
        assert_eq!(replies.len(), 2);
        assert!(replies["a@example.com"].is_positive());
        assert!(replies["b@example.com"].has_code(550));
        assert_eq!(
            written(transport),
            "EHLO client.test\r\n\
             MAIL FROM:<x@example.com> SIZE=7 BODY=8BITMIME\r\n\
             RCPT TO:<a@example.com> NOTIFY=NEVER\r\n\
             RCPT TO:<b@example.com> NOTIFY=NEVER\r\n\
             DATA\r\n\
             héllo\r\n.\r\n"
        );
    }

    #[tokio::test]
    async fn test_send_keeps_caller_body_option() {
        let mut transport =
            session(b"220 ready\r\n250-mx.test\r\n250 8BITMIME\r\n250 ok\r\n250 ok\r\n354 go\r\n250 ok\r\n").await;

        transport
            .send(
                &envelope("x@example.com", &["a@example.com"]),
                "é".as_bytes(),
                &[MailParameter::from("BODY=7BIT")],
                &[],
            )
            .await
            .unwrap();

        assert!(written(transport).contains("MAIL FROM:<x@example.com> BODY=7BIT\r\n"));
    }

    #[tokio::test]
    async fn test_all_recipients_refused() {
        let mut transport =
            session(b"220 ready\r\n250 mx.test\r\n250 ok\r\n550 unknown\r\n451 later\r\n250 reset\r\n").await;

        match transport
            .send(
                &envelope("x@example.com", &["a@example.com", "b@example.com"]),
                b"hello",
                &[],
                &[],
            )
            .await
        {
            Err(Error::RecipientsRefused(replies)) => {
                assert!(replies["a@example.com"].has_code(550));
                assert!(replies["b@example.com"].has_code(451));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(written(transport).ends_with("RSET\r\n"));
    }

    #[tokio::test]
    async fn test_intermediate_recipient_reply_is_not_accepted() {
        let mut transport =
            session(b"220 ready\r\n250 mx.test\r\n250 ok\r\n354 odd\r\n250 reset\r\n").await;

        match transport
            .send(&envelope("x@example.com", &["a@example.com"]), b"hello", &[], &[])
            .await
        {
            Err(Error::RecipientsRefused(replies)) => {
                assert!(replies["a@example.com"].has_code(354))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let written = written(transport);
        assert!(!written.contains("DATA"));
        assert!(written.ends_with("RSET\r\n"));
    }

    #[tokio::test]
    async fn test_sender_refused() {
        let mut transport =
            session(b"220 ready\r\n250 mx.test\r\n553 sender rejected\r\n250 reset\r\n").await;

        let result = transport
            .send(&envelope("x@example.com", &["a@example.com"]), b"hello", &[], &[])
            .await;
        match result {
            Err(Error::Permanent(reply)) => assert_eq!(reply.text(), "sender rejected"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            written(transport),
            "EHLO client.test\r\nMAIL FROM:<x@example.com>\r\nRSET\r\n"
        );
    }

    #[tokio::test]
    async fn test_data_refused() {
        let mut transport = session(
            b"220 ready\r\n250 mx.test\r\n250 ok\r\n250 ok\r\n452 storage full\r\n250 reset\r\n",
        )
        .await;

        let result = transport
            .send(&envelope("x@example.com", &["a@example.com"]), b"hello", &[], &[])
            .await;
        assert!(matches!(result, Err(Error::Transient(_))));
        assert!(written(transport).ends_with("DATA\r\nRSET\r\n"));
    }

    #[tokio::test]
    async fn test_international_address() {
        let mut transport = session(b"220 ready\r\n250 mx.test\r\n").await;
        let result = transport
            .send(&envelope("jörg@example.com", &["a@example.com"]), b"hello", &[], &[])
            .await;
        assert!(matches!(result, Err(Error::Client(_))));

        let mut transport = session(
            b"220 ready\r\n250-mx.test\r\n250 SMTPUTF8\r\n250 ok\r\n250 ok\r\n354 go\r\n250 ok\r\n",
        )
        .await;
        transport
            .send(&envelope("jörg@example.com", &["a@example.com"]), b"hello", &[], &[])
            .await
            .unwrap();
        assert!(written(transport).contains("MAIL FROM:<jörg@example.com> SMTPUTF8\r\n"));
    }

    #[tokio::test]
    async fn test_quit() {
        let mut transport = session(b"220 ready\r\n250 mx.test\r\n221 bye\r\n").await;
        transport.quit().await.unwrap();
        transport.close().await.unwrap();
        assert!(written(transport).ends_with("QUIT\r\n"));
    }
}
