use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN};

/// The receiving end handle of the communication.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Creates a new `FrameReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits to receive a new message from the inner reader.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure. A peer that
    /// closed the connection surfaces as `io::ErrorKind::UnexpectedEof`.
    pub async fn recv<T: Deserialize>(&mut self) -> io::Result<T> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("incoming frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
            ));
        }

        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        T::deserialize(&self.buf)
    }

    /// Resolves once the peer closes its writing half.
    ///
    /// Any bytes that arrive in the meantime are discarded, callers use this on
    /// connections where the peer is not expected to talk anymore.
    pub async fn closed(&mut self) -> io::Result<()> {
        let mut scratch = [0; 64];

        while self.rx.read(&mut scratch).await? != 0 {}

        Ok(())
    }
}
