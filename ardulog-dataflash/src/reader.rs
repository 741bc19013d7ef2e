//! Async reader
//!
//! Decodes records from an [`AsyncRead`], e.g. a file that is still being
//! downloaded or stdin.

use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::{
    Stream,
    TryStreamExt,
};
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    decoder::{
        Decoder,
        Frame,
    },
    log::{
        Log,
        LogBuilder,
    },
    options::ParseOptions,
    record::Record,
};

// records are at most 255 bytes long, so this always has room for a complete one.
const RECEIVE_BUFFER_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
#[error("dataflash read error")]
pub enum Error {
    Io(#[from] std::io::Error),
}

pin_project! {
    #[derive(Debug)]
    pub struct Reader<R> {
        #[pin]
        reader: R,
        receive_buffer: ReceiveBuffer,
        decoder: Decoder,
        eof: bool,
    }
}

impl<R: AsyncRead> Reader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, &ParseOptions::default())
    }

    pub fn with_options(reader: R, options: &ParseOptions) -> Self {
        Self {
            reader,
            receive_buffer: ReceiveBuffer::default(),
            decoder: Decoder::new(options),
            eof: false,
        }
    }
}

impl<R> Reader<R> {
    /// The decoder state. Its diagnostics are complete once the stream ended.
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn into_decoder(self) -> Decoder {
        self.decoder
    }
}

impl<R: AsyncRead> Stream for Reader<R> {
    type Item = Result<Record, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if *this.eof {
                return Poll::Ready(None);
            }

            let (record, consumed) = match this.decoder.decode_next(this.receive_buffer.unread()) {
                Frame::Record { record, consumed } => (Some(record.into_record()), consumed),
                Frame::Incomplete { consumed } => (None, consumed),
            };
            this.receive_buffer.consume(consumed);

            if let Some(record) = record {
                return Poll::Ready(Some(Ok(record)));
            }

            this.receive_buffer.prepare_read();
            let mut read_buf = ReadBuf::new(this.receive_buffer.free_space());
            match this.reader.poll_read(cx, &mut read_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                Poll::Ready(Ok(())) => {
                    let num_bytes_read = read_buf.filled().len();
                    if num_bytes_read == 0 {
                        // whatever is left is a truncated record
                        *this.eof = true;
                        this.decoder.finish(this.receive_buffer.unread().len());
                        return Poll::Ready(None);
                    }

                    this.receive_buffer.write_pos += num_bytes_read;
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReceiveBuffer {
    buffer: Box<[u8; RECEIVE_BUFFER_SIZE]>,
    read_pos: usize,
    write_pos: usize,
}

impl ReceiveBuffer {
    fn unread(&self) -> &[u8] {
        &self.buffer[self.read_pos..self.write_pos]
    }

    fn consume(&mut self, num_bytes: usize) {
        self.read_pos += num_bytes;
        debug_assert!(self.read_pos <= self.write_pos);
    }

    fn free_space(&mut self) -> &mut [u8] {
        &mut self.buffer[self.write_pos..]
    }

    fn prepare_read(&mut self) {
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
        else if self.read_pos > 0 {
            // move data
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.write_pos -= self.read_pos;
            self.read_pos = 0;
        }
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            buffer: Box::new([0; RECEIVE_BUFFER_SIZE]),
            read_pos: 0,
            write_pos: 0,
        }
    }
}

impl Log {
    /// Decodes a log from an async reader.
    ///
    /// This produces the same [`Log`] as [`Log::parse_with`] on the whole
    /// input.
    pub async fn read<R: AsyncRead>(reader: R, options: &ParseOptions) -> Result<Self, crate::Error> {
        let mut builder = LogBuilder::new(options.clone());
        let mut reader = std::pin::pin!(Reader::with_options(reader, options));

        while let Some(record) = reader.try_next().await? {
            builder.push_record(&record);
        }

        let diagnostics = reader.decoder().diagnostics().clone();
        Ok(builder.finish(diagnostics).check()?)
    }
}
