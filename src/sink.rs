//! A reference `RecordWriter` that frames records onto any `std::io::Write`.
//!
//! Frame layout, all integers little-endian:
//! `[4-byte frame length | 2-byte namespace length | namespace | 2-byte name length | name | 8-byte emitted_at | payload]`
//!
//! The frame length counts every byte after itself. The underlying writer is
//! flushed after each batch, so a successful `write` means the batch reached
//! the sink.

use crate::error::{BoxError, Error, Result};
use crate::message::{Record, StreamId};
use crate::traits::RecordWriter;
use std::io::Write;

const LEN_BYTES: usize = 4;
const KEY_LEN_BYTES: usize = 2;
const TIMESTAMP_BYTES: usize = 8;

/// Writes length-prefixed record frames.
#[derive(Debug)]
pub struct FramedRecordWriter<W: Write> {
    writer: W,
    frames_written: u64,
}

impl<W: Write> FramedRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Consumes the writer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_frame(&mut self, stream: &StreamId, record: &Record) -> Result<()> {
        let namespace = key_bytes(&stream.namespace)?;
        let name = key_bytes(&stream.name)?;
        let frame_len = KEY_LEN_BYTES
            + namespace.len()
            + KEY_LEN_BYTES
            + name.len()
            + TIMESTAMP_BYTES
            + record.data.len();
        // Enforce 32-bit length header contract to avoid truncation on cast
        let frame_len = u32::try_from(frame_len)
            .map_err(|_| Error::invalid_frame("frame length exceeds 32-bit header limit"))?;

        self.writer.write_all(&frame_len.to_le_bytes())?;
        self.writer.write_all(&(namespace.len() as u16).to_le_bytes())?;
        self.writer.write_all(namespace)?;
        self.writer.write_all(&(name.len() as u16).to_le_bytes())?;
        self.writer.write_all(name)?;
        self.writer.write_all(&record.emitted_at.to_le_bytes())?;
        self.writer.write_all(&record.data)?;
        self.frames_written += 1;
        Ok(())
    }
}

fn key_bytes(key: &str) -> Result<&[u8]> {
    if key.len() > u16::MAX as usize {
        return Err(Error::invalid_frame("stream key exceeds 16-bit header limit"));
    }
    Ok(key.as_bytes())
}

impl<W: Write + Send> RecordWriter for FramedRecordWriter<W> {
    fn write(&mut self, stream: &StreamId, batch: &[Record]) -> std::result::Result<(), BoxError> {
        if batch.is_empty() {
            return Ok(());
        }
        for record in batch {
            self.write_frame(stream, record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Decodes every frame in `bytes` back into records.
pub fn decode_frames(mut bytes: &[u8]) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        let frame_len = u32::from_le_bytes(take::<LEN_BYTES>(&mut bytes)?) as usize;
        if frame_len > bytes.len() {
            return Err(Error::invalid_frame(format!(
                "frame declares {frame_len} bytes but only {} remain",
                bytes.len()
            )));
        }
        let (mut frame, rest) = bytes.split_at(frame_len);
        bytes = rest;

        let namespace = take_key(&mut frame)?;
        let name = take_key(&mut frame)?;
        let emitted_at = i64::from_le_bytes(take::<TIMESTAMP_BYTES>(&mut frame)?);
        records.push(Record::new(StreamId::new(namespace, name), frame, emitted_at));
    }
    Ok(records)
}

fn take<const N: usize>(bytes: &mut &[u8]) -> Result<[u8; N]> {
    if bytes.len() < N {
        return Err(Error::invalid_frame("truncated frame header"));
    }
    let (head, rest) = bytes.split_at(N);
    *bytes = rest;
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    Ok(out)
}

fn take_key(bytes: &mut &[u8]) -> Result<String> {
    let len = u16::from_le_bytes(take::<KEY_LEN_BYTES>(bytes)?) as usize;
    if bytes.len() < len {
        return Err(Error::invalid_frame("truncated stream key"));
    }
    let (key, rest) = bytes.split_at(len);
    *bytes = rest;
    String::from_utf8(key.to_vec()).map_err(|_| Error::invalid_frame("stream key is not UTF-8"))
}
