//! The stub transport records what it is asked to do and answers with a fixed result,
//! without any network access. It can be useful for testing purposes.
//!

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::info;

use crate::error::Error;
use crate::message::Message;
use crate::response::Response;
use crate::{SendResult, Transport};

/// One call received by a `StubTransport`
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum StubCall {
    /// `connect`
    Connect,
    /// `send_message`, with the overrides it was given
    SendMessage {
        /// Sender override
        sender: Option<String>,
        /// Recipients override
        recipients: Option<Vec<String>>,
        /// Flattened message
        message: Vec<u8>,
        /// `MAIL FROM` options
        mail_options: Vec<String>,
        /// `RCPT TO` options
        rcpt_options: Vec<String>,
    },
    /// `sendmail`
    Sendmail {
        /// Envelope sender
        sender: String,
        /// Envelope recipients
        recipients: Vec<String>,
        /// Message data
        message: Vec<u8>,
        /// `MAIL FROM` options
        mail_options: Vec<String>,
        /// `RCPT TO` options
        rcpt_options: Vec<String>,
    },
    /// `quit`
    Quit,
}

/// This transport records its calls and returns the given result
#[derive(Debug, Clone)]
pub struct StubTransport {
    result: SendResult,
    connect_failure: Option<Response>,
    send_failure: Option<Response>,
    calls: Arc<Mutex<Vec<StubCall>>>,
}

impl StubTransport {
    /// Creates a new transport whose sends always return `result`
    pub fn new(result: SendResult) -> StubTransport {
        StubTransport {
            result,
            connect_failure: None,
            send_failure: None,
            calls: Default::default(),
        }
    }

    /// Creates a new transport whose sends always succeed, with no recipient replies
    pub fn new_positive() -> StubTransport {
        StubTransport::new((HashMap::new(), "OK".to_string()))
    }

    /// Makes `connect` fail with the given server reply
    pub fn failing_connect(self, reply: Response) -> StubTransport {
        StubTransport {
            connect_failure: Some(reply),
            ..self
        }
    }

    /// Makes both send operations fail with the given server reply
    pub fn failing_send(self, reply: Response) -> StubTransport {
        StubTransport {
            send_failure: Some(reply),
            ..self
        }
    }

    /// Calls received so far, shared by every clone of this transport
    pub fn calls(&self) -> Vec<StubCall> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<StubCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer(&self) -> Result<SendResult, Error> {
        match self.send_failure {
            Some(ref reply) => Err(reply.clone().into()),
            None => Ok(self.result.clone()),
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn connect(&mut self) -> Result<(), Error> {
        self.log().push(StubCall::Connect);
        match self.connect_failure {
            Some(ref reply) => Err(reply.clone().into()),
            None => Ok(()),
        }
    }

    async fn quit(&mut self) {
        self.log().push(StubCall::Quit);
    }

    async fn send_message(
        &mut self,
        message: &Message,
        sender: Option<&str>,
        recipients: Option<&[String]>,
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        info!(
            "stub: message from=<{}> to=<{:?}>",
            sender.unwrap_or("(headers)"),
            recipients
        );
        self.log().push(StubCall::SendMessage {
            sender: sender.map(str::to_string),
            recipients: recipients.map(<[String]>::to_vec),
            message: message.to_bytes(),
            mail_options: mail_options.to_vec(),
            rcpt_options: rcpt_options.to_vec(),
        });
        self.answer()
    }

    async fn sendmail(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
        mail_options: &[String],
        rcpt_options: &[String],
    ) -> Result<SendResult, Error> {
        info!("stub: from=<{}> to=<{:?}>", sender, recipients);
        self.log().push(StubCall::Sendmail {
            sender: sender.to_string(),
            recipients: recipients.to_vec(),
            message: message.to_vec(),
            mail_options: mail_options.to_vec(),
            rcpt_options: rcpt_options.to_vec(),
        });
        self.answer()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_records_calls() {
        let stub = StubTransport::new_positive();
        let mut transport = stub.clone();

        transport.connect().await.unwrap();
        let (replies, text) = transport
            .sendmail("x@example.com", &["a@example.com".to_string()], b"hi", &[], &[])
            .await
            .unwrap();
        transport.quit().await;

        assert!(replies.is_empty());
        assert_eq!(text, "OK");
        assert_eq!(stub.calls().len(), 3);
        assert_eq!(stub.calls()[0], StubCall::Connect);
        assert_eq!(stub.calls()[2], StubCall::Quit);
    }

    #[tokio::test]
    async fn test_failures() {
        let reply: Response = "554 go away\r\n".parse().unwrap();
        let mut transport = StubTransport::new_positive().failing_connect(reply.clone());
        assert!(matches!(transport.connect().await, Err(Error::Permanent(_))));

        let mut transport = StubTransport::new_positive().failing_send(reply);
        let message = Message::new().header("From", "x@example.com");
        assert!(transport
            .send_message(&message, None, None, &[], &[])
            .await
            .is_err());
    }
}
