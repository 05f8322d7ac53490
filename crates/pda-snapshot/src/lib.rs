//! Save-state plumbing shared by the device models in this workspace.
//!
//! Every device exposes its state as a flat, header-less byte blob (no versioning at this
//! layer — that is the caller's job, same as the container format this subsystem plugs into).
//! `ByteWriter`/`ByteReader` exist so a device's `save_state`/`load_state` reads as an ordered
//! list of field copies instead of hand-rolled offset arithmetic at every call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot buffer too short: needed at least {needed} bytes, got {got}")]
    UnexpectedEof { needed: usize, got: usize },
}

/// Implemented by every device model that can be saved/restored independently of the others.
///
/// There is deliberately no single flattened "machine" byte stream: each device round-trips
/// through its own blob, and the caller decides how (or whether) to bundle them together.
pub trait IoSnapshot {
    fn state_size(&self) -> usize;
    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError>;
}

/// Appends fields to a growing snapshot buffer in a fixed order.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back out of a snapshot buffer in the same order they were written.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(SnapshotError::UnexpectedEof { needed: end, got: self.data.len() });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        self.take(len)
    }

    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), SnapshotError> {
        let slice = self.take(out.len())?;
        out.copy_from_slice(slice);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, SnapshotError> {
        let slice = self.take(2)?;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, SnapshotError> {
        let slice = self.take(4)?;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, SnapshotError> {
        let slice = self.take(8)?;
        Ok(u64::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_fields() {
        let mut w = ByteWriter::with_capacity(16);
        w.write_u8(0x42);
        w.write_u16_le(0xBEEF);
        w.write_u32_le(0xCAFE_F00D);
        w.write_bytes(&[1, 2, 3]);
        let buf = w.into_vec();

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0x42);
        assert_eq!(r.read_u16_le().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32_le().unwrap(), 0xCAFE_F00D);
        assert_eq!(r.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_buffer_is_unexpected_eof() {
        let mut r = ByteReader::new(&[0x01]);
        assert!(r.read_u32_le().is_err());
    }
}
