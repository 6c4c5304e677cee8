use std::fmt::Display;
use std::future::Future;
use std::string::String;
use std::time::Duration;

use log::debug;
use tokio::io::{
    AsyncBufReadExt, AsyncRead as Read, AsyncReadExt, AsyncWrite as Write, AsyncWriteExt,
    BufReader,
};

use crate::codec::{normalize_line_endings, ClientCodec};
use crate::error::{Error, SmtpResult};
use crate::response::parse_response;

/// Longest reply accepted from the server, all lines included
pub const MAX_REPLY_LENGTH: usize = 8192;

/// SMTP stream.
#[derive(Debug)]
pub struct SmtpStream<S: Read + Write + Unpin> {
    /// Inner stream.
    inner: BufReader<S>,
    /// Limit for every single read or write.
    timeout: Option<Duration>,
}

impl<S: Read + Write + Unpin> SmtpStream<S> {
    /// Creates new SMTP stream.
    pub fn new(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            inner: BufReader::new(stream),
            timeout,
        }
    }

    /// Returns inner stream.
    ///
    /// Should only be used when there are no unread responses,
    /// because the buffer of `BufReader` may be lost.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    /// Gets a reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Send the given SMTP command to the server.
    ///
    /// Negative replies are turned into errors.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Send the given SMTP command to the server and return the reply,
    /// whatever its code.
    pub async fn command_reply(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_reply().await
    }

    /// Sends the given SMTP command to the server without waiting for response.
    pub async fn send_command(&mut self, command: impl Display) -> Result<(), Error> {
        self.write(command.to_string().as_bytes()).await?;
        Ok(())
    }

    /// Writes the given data to the server.
    async fn write(&mut self, string: &[u8]) -> Result<(), Error> {
        let timeout = self.timeout;
        let stream = self.inner.get_mut();
        within(timeout, async move {
            stream.write_all(string).await?;
            stream.flush().await?;
            Ok::<(), Error>(())
        })
        .await?;

        debug!(
            ">> {}",
            escape_crlf(String::from_utf8_lossy(string).as_ref())
        );
        Ok(())
    }

    /// Read an SMTP response from the wire.
    pub async fn read_response(&mut self) -> SmtpResult {
        let response = self.read_reply().await?;
        if response.is_positive() {
            return Ok(response);
        }

        Err(response.into())
    }

    /// Read an SMTP reply from the wire, positive or not.
    ///
    /// Replies longer than `MAX_REPLY_LENGTH` are rejected.
    pub async fn read_reply(&mut self) -> SmtpResult {
        let timeout = self.timeout;
        let reader = &mut self.inner;
        let mut buffer = String::with_capacity(100);

        loop {
            let limit = (MAX_REPLY_LENGTH + 1 - buffer.len()) as u64;
            let read = within(timeout, async {
                Ok::<_, Error>((&mut *reader).take(limit).read_line(&mut buffer).await?)
            })
            .await?;
            if buffer.len() > MAX_REPLY_LENGTH {
                debug!("<< reply longer than {} bytes", MAX_REPLY_LENGTH);
                return Err(Error::ResponseParsing("response too long"));
            }
            if read == 0 {
                break;
            }
            debug!("<< {}", escape_crlf(&buffer));
            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    return Ok(response);
                }
                Err(nom::Err::Failure(e)) => {
                    return Err(Error::Parsing(e.code));
                }
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Error(e)) => {
                    return Err(Error::Parsing(e.code));
                }
            }
        }

        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "incomplete").into())
    }

    /// Sends the message content and reads the final reply.
    pub(crate) async fn message(&mut self, message: &[u8]) -> SmtpResult {
        let mut codec = ClientCodec::new();
        let message = normalize_line_endings(message);
        let len = message.len();
        let timeout = self.timeout;
        let stream = self.inner.get_mut();

        within(timeout, async move {
            codec.encode(&message, &mut *stream).await?;
            // an empty frame writes the final dot
            codec.encode(&[], &mut *stream).await?;
            stream.flush().await?;
            Ok::<(), Error>(())
        })
        .await?;
        debug!(">> <{} bytes of message data><CRLF>.<CRLF>", len);

        self.read_response().await
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        let timeout = self.timeout;
        let stream = self.inner.get_mut();
        within(timeout, async move { Ok::<(), Error>(stream.shutdown().await?) }).await
    }
}

/// Runs `future`, failing with `Error::Timeout` when it takes longer than `duration`.
pub(crate) async fn within<T, F>(duration: Option<Duration>, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match duration {
        Some(duration) => tokio::time::timeout(duration, future).await?,
        None => future.await,
    }
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}
