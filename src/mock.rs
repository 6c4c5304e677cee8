//! In-memory stream standing in for a server connection

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write, ReadBuf};

pub type MockCursor = Cursor<Vec<u8>>;

/// Reads from a prepared buffer, records everything written to it
#[pin_project]
#[derive(Clone, Debug)]
pub struct MockStream {
    #[pin]
    reader: MockCursor,
    #[pin]
    writer: MockCursor,
}

impl Default for MockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream {
            reader: MockCursor::new(Vec::new()),
            writer: MockCursor::new(Vec::new()),
        }
    }

    /// Creates a stream that will read `vec`, typically scripted server replies
    pub fn with_vec(vec: Vec<u8>) -> MockStream {
        MockStream {
            reader: MockCursor::new(vec),
            writer: MockCursor::new(Vec::new()),
        }
    }

    /// Takes everything written so far
    pub fn take_vec(&mut self) -> Vec<u8> {
        let vec = self.writer.get_ref().to_vec();
        self.writer.set_position(0);
        self.writer.get_mut().clear();
        vec
    }

    /// Replaces the data left to read
    pub fn next_vec(&mut self, vec: &[u8]) {
        let cursor = &mut self.reader;
        cursor.set_position(0);
        cursor.get_mut().clear();
        cursor.get_mut().extend_from_slice(vec);
    }
}

impl Read for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let _: Pin<&mut _> = this.reader;
        this.reader.poll_read(cx, buf)
    }
}

impl Write for MockStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        let _: Pin<&mut _> = this.writer;
        this.writer.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        let this = self.project();
        let _: Pin<&mut _> = this.writer;
        this.writer.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        let this = self.project();
        let _: Pin<&mut _> = this.writer;
        this.writer.poll_shutdown(cx)
    }
}
