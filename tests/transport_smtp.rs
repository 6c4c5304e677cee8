use std::time::Duration;

use async_smtp_send::error::Error;
use async_smtp_send::{send, Message, SendParameters};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Accepts one connection and answers like a small mail server.
///
/// Returns every command line received, and the message data as one entry per message.
async fn scripted_server() -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut transcript = Vec::new();
        let mut data: Option<String> = None;

        write.write_all(b"220 mx.test ESMTP ready\r\n").await.unwrap();
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(ref mut content) = data {
                if line == "." {
                    transcript.push(content.clone());
                    data = None;
                    write
                        .write_all(b"250-2.0.0 ok\r\n250 queued as 1234\r\n")
                        .await
                        .unwrap();
                } else {
                    content.push_str(&line);
                    content.push('\n');
                }
                continue;
            }

            transcript.push(line.clone());
            let command = line.to_ascii_uppercase();
            let reply: &[u8] = if command.starts_with("EHLO") {
                b"250-mx.test\r\n250-SIZE 1000000\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if command.starts_with("AUTH PLAIN") {
                b"235 2.7.0 authenticated\r\n"
            } else if command.starts_with("MAIL FROM:") {
                b"250 2.1.0 sender ok\r\n"
            } else if command.starts_with("RCPT TO:<NOBODY@") {
                b"550 5.1.1 no such user\r\n"
            } else if command.starts_with("RCPT TO:") {
                b"250 2.1.5 recipient ok\r\n"
            } else if command == "DATA" {
                data = Some(String::new());
                b"354 end with <CRLF>.<CRLF>\r\n"
            } else if command == "RSET" {
                b"250 2.0.0 reset\r\n"
            } else if command == "QUIT" {
                write.write_all(b"221 2.0.0 bye\r\n").await.unwrap();
                break;
            } else {
                b"500 5.5.2 unknown command\r\n"
            };
            write.write_all(reply).await.unwrap();
        }

        transcript
    });

    (port, server)
}

fn parameters(port: u16) -> SendParameters {
    SendParameters::new()
        .hostname("127.0.0.1")
        .port(port)
        .source_address("client.test")
        .timeout(Some(Duration::from_secs(5)))
}

#[tokio::test]
async fn raw_message_with_refused_recipient() {
    init_logger();
    let (port, server) = scripted_server().await;

    let (replies, text) = send(
        "Subject: hi\r\n\r\nHello\r\n",
        parameters(port)
            .sender("x@example.com")
            .recipients(vec!["a@example.com", "nobody@example.com"]),
    )
    .await
    .unwrap();

    assert_eq!(text, "2.0.0 ok\nqueued as 1234");
    assert_eq!(replies.len(), 2);
    assert!(replies["a@example.com"].is_positive());
    assert!(replies["nobody@example.com"].has_code(550));

    let transcript = server.await.unwrap();
    assert_eq!(
        transcript,
        vec![
            "EHLO client.test",
            "MAIL FROM:<x@example.com> SIZE=22",
            "RCPT TO:<a@example.com>",
            "RCPT TO:<nobody@example.com>",
            "DATA",
            "Subject: hi\n\nHello\n",
            "QUIT",
        ]
    );
}

#[tokio::test]
async fn structured_message_with_authentication() {
    init_logger();
    let (port, server) = scripted_server().await;

    let message = Message::new()
        .header("From", "Jane <jane@example.com>")
        .header("To", "a@example.com")
        .header("Bcc", "b@example.com")
        .header("Subject", "greetings")
        .body(".leading dot\r\n");

    let (replies, _) = send(
        message,
        parameters(port).username("user").password("secret"),
    )
    .await
    .unwrap();
    assert_eq!(replies.len(), 2);

    let transcript = server.await.unwrap();
    assert_eq!(transcript[0], "EHLO client.test");
    assert_eq!(transcript[1], "AUTH PLAIN AHVzZXIAc2VjcmV0");
    assert!(transcript[2].starts_with("MAIL FROM:<jane@example.com> SIZE="));
    assert_eq!(transcript[3], "RCPT TO:<a@example.com>");
    assert_eq!(transcript[4], "RCPT TO:<b@example.com>");
    assert_eq!(transcript[5], "DATA");
    assert_eq!(
        transcript[6],
        "From: Jane <jane@example.com>\nTo: a@example.com\nSubject: greetings\n\n..leading dot\n"
    );
    assert_eq!(transcript.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn every_recipient_refused() {
    init_logger();
    let (port, server) = scripted_server().await;

    let result = send(
        "hello",
        parameters(port)
            .sender("x@example.com")
            .recipients("nobody@example.com"),
    )
    .await;

    match result {
        Err(Error::RecipientsRefused(replies)) => {
            assert!(replies["nobody@example.com"].has_code(550))
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let transcript = server.await.unwrap();
    assert_eq!(
        &transcript[transcript.len() - 2..],
        &["RSET".to_string(), "QUIT".to_string()]
    );
}

#[tokio::test]
async fn connection_refused() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = send(
        "hello",
        parameters(port)
            .sender("x@example.com")
            .recipients("a@example.com"),
    )
    .await;
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn use_tls_with_start_tls_handshakes_on_connect() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut first = [0u8; 1];
        socket.read_exact(&mut first).await.unwrap();
        first[0]
    });

    let result = send(
        "hello",
        parameters(port)
            .use_tls(true)
            .start_tls(true)
            .sender("x@example.com")
            .recipients("a@example.com"),
    )
    .await;
    assert!(result.is_err());

    // a TLS handshake record, not a greeting exchange
    assert_eq!(server.await.unwrap(), 0x16);
}
