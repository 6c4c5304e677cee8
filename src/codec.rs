use std::borrow::Cow;
use std::io;

use tokio::io::{AsyncWrite as Write, AsyncWriteExt};

/// The codec used for transparency
#[derive(Clone, Copy, Debug)]
pub struct ClientCodec {
    escape_count: u8,
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientCodec {
    /// Creates a new client codec
    ///
    /// Message data starts at the beginning of a line, so a leading dot is escaped too.
    pub fn new() -> Self {
        ClientCodec { escape_count: 2 }
    }
}

impl ClientCodec {
    /// Adds transparency. An empty frame writes the end of data marker.
    #[allow(clippy::bool_to_int_with_if)]
    pub async fn encode<W: Write + Unpin>(&mut self, frame: &[u8], mut buf: W) -> io::Result<()> {
        match frame.len() {
            0 => {
                match self.escape_count {
                    0 => buf.write_all(b"\r\n.\r\n").await?,
                    1 => buf.write_all(b"\n.\r\n").await?,
                    2 => buf.write_all(b".\r\n").await?,
                    _ => unreachable!(),
                }
                self.escape_count = 0;
                Ok(())
            }
            _ => {
                let mut start = 0;
                for (idx, byte) in frame.iter().enumerate() {
                    match self.escape_count {
                        0 => self.escape_count = if *byte == b'\r' { 1 } else { 0 },
                        1 => self.escape_count = if *byte == b'\n' { 2 } else { 0 },
                        2 => {
                            self.escape_count = if *byte == b'.' {
                                3
                            } else if *byte == b'\r' {
                                1
                            } else {
                                0
                            }
                        }
                        _ => unreachable!(),
                    }
                    if self.escape_count == 3 {
                        self.escape_count = 0;
                        buf.write_all(&frame[start..idx]).await?;
                        buf.write_all(b".").await?;
                        start = idx;
                    }
                }
                buf.write_all(&frame[start..]).await?;
                Ok(())
            }
        }
    }
}

/// Replaces every bare `CR` or bare `LF` with `CRLF`
pub fn normalize_line_endings(message: &[u8]) -> Cow<[u8]> {
    let is_normalized = message.iter().enumerate().all(|(idx, byte)| match *byte {
        b'\r' => message.get(idx + 1) == Some(&b'\n'),
        b'\n' => idx > 0 && message[idx - 1] == b'\r',
        _ => true,
    });
    if is_normalized {
        return Cow::Borrowed(message);
    }

    let mut normalized = Vec::with_capacity(message.len() + message.len() / 16);
    let mut bytes = message.iter().peekable();
    while let Some(byte) = bytes.next() {
        match *byte {
            b'\r' => {
                if bytes.peek() == Some(&&b'\n') {
                    bytes.next();
                }
                normalized.extend_from_slice(b"\r\n");
            }
            b'\n' => normalized.extend_from_slice(b"\r\n"),
            other => normalized.push(other),
        }
    }
    Cow::Owned(normalized)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_codec() {
        let mut codec = ClientCodec::new();
        let mut buf: Vec<u8> = vec![];

        assert!(codec.encode(b"test\r\n", &mut buf).await.is_ok());
        assert!(codec.encode(b".\r\n", &mut buf).await.is_ok());
        assert!(codec.encode(b"\r\ntest", &mut buf).await.is_ok());
        assert!(codec.encode(b"te\r\n.\r\nst", &mut buf).await.is_ok());
        assert!(codec.encode(b"test", &mut buf).await.is_ok());
        assert!(codec.encode(b"test.", &mut buf).await.is_ok());
        assert!(codec.encode(b"test\n", &mut buf).await.is_ok());
        assert!(codec.encode(b".test\n", &mut buf).await.is_ok());
        assert!(codec.encode(b"test", &mut buf).await.is_ok());
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "test\r\n..\r\n\r\ntestte\r\n..\r\nsttesttest.test\n.test\ntest"
        );
    }

    #[tokio::test]
    async fn test_codec_end_of_data() {
        let mut codec = ClientCodec::new();
        let mut buf: Vec<u8> = vec![];
        codec.encode(b"hello", &mut buf).await.unwrap();
        codec.encode(b"", &mut buf).await.unwrap();
        assert_eq!(buf, b"hello\r\n.\r\n");

        let mut codec = ClientCodec::new();
        let mut buf: Vec<u8> = vec![];
        codec.encode(b"hello\r\n", &mut buf).await.unwrap();
        codec.encode(b"", &mut buf).await.unwrap();
        assert_eq!(buf, b"hello\r\n.\r\n");

        let mut codec = ClientCodec::new();
        let mut buf: Vec<u8> = vec![];
        codec.encode(b"", &mut buf).await.unwrap();
        assert_eq!(buf, b".\r\n");
    }

    #[tokio::test]
    async fn test_codec_leading_dot() {
        let mut codec = ClientCodec::new();
        let mut buf: Vec<u8> = vec![];
        codec.encode(b".start", &mut buf).await.unwrap();
        assert_eq!(buf, b"..start");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert!(matches!(
            normalize_line_endings(b"a\r\nb\r\n"),
            Cow::Borrowed(_)
        ));
        assert_eq!(&*normalize_line_endings(b"a\nb\rc\r\nd"), b"a\r\nb\r\nc\r\nd");
        assert_eq!(&*normalize_line_endings(b"\n\n"), b"\r\n\r\n");
        assert_eq!(&*normalize_line_endings(b""), b"");
    }
}
