//! Entry serialization callbacks.
//!
//! The journal never interprets payloads. Callers hand it a
//! [`ToBytesMapper`] to serialize an entry straight into segment storage and
//! a [`FromBytesMapper`] to turn stored bytes back into a value.

use crate::error::{JournalError, JournalResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Cursor, ErrorKind};
use std::marker::PhantomData;

/// Serializes entries of type `T` into a caller-provided buffer.
pub trait ToBytesMapper<T: ?Sized> {
    /// Writes `entry` to the start of `buf`.
    ///
    /// Returns the number of bytes written, or `None` if `buf` is too small.
    /// Running out of room is not an error: the journal retries in a fresh
    /// segment or reports the entry as too large.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be serialized at all.
    fn to_bytes(&self, entry: &T, buf: &mut [u8]) -> JournalResult<Option<usize>>;
}

/// Deserializes stored entries into values of type `T`.
pub trait FromBytesMapper<T> {
    /// Decodes the entry stored at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode.
    fn from_bytes(&self, index: u64, bytes: &[u8]) -> JournalResult<T>;
}

/// An entry together with its journal index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed<T> {
    /// Journal index of the entry.
    pub index: u64,
    /// The entry.
    pub entry: T,
}

impl<T> Indexed<T> {
    /// Pairs `entry` with `index`.
    pub const fn new(index: u64, entry: T) -> Self {
        Self { index, entry }
    }

    /// Maps the entry, keeping the index.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Indexed<U> {
        Indexed {
            index: self.index,
            entry: f(self.entry),
        }
    }
}

/// Stores raw byte payloads unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesMapper;

impl ToBytesMapper<[u8]> for BytesMapper {
    fn to_bytes(&self, entry: &[u8], buf: &mut [u8]) -> JournalResult<Option<usize>> {
        if entry.len() > buf.len() {
            return Ok(None);
        }
        buf[..entry.len()].copy_from_slice(entry);
        Ok(Some(entry.len()))
    }
}

impl ToBytesMapper<Vec<u8>> for BytesMapper {
    fn to_bytes(&self, entry: &Vec<u8>, buf: &mut [u8]) -> JournalResult<Option<usize>> {
        <Self as ToBytesMapper<[u8]>>::to_bytes(self, entry, buf)
    }
}

impl FromBytesMapper<Vec<u8>> for BytesMapper {
    fn from_bytes(&self, _index: u64, bytes: &[u8]) -> JournalResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Stores any `serde` type as CBOR.
pub struct CborMapper<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborMapper<T> {
    /// Creates a mapper for `T`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CborMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CborMapper<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CborMapper<T> {}

impl<T> std::fmt::Debug for CborMapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CborMapper")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize> ToBytesMapper<T> for CborMapper<T> {
    fn to_bytes(&self, entry: &T, buf: &mut [u8]) -> JournalResult<Option<usize>> {
        let mut cursor = Cursor::new(buf);
        match ciborium::into_writer(entry, &mut cursor) {
            Ok(()) => Ok(Some(cursor.position() as usize)),
            Err(ciborium::ser::Error::Io(e)) if e.kind() == ErrorKind::WriteZero => Ok(None),
            Err(e) => Err(JournalError::codec(format!("{e:?}"))),
        }
    }
}

impl<T: DeserializeOwned> FromBytesMapper<T> for CborMapper<T> {
    fn from_bytes(&self, index: u64, bytes: &[u8]) -> JournalResult<T> {
        ciborium::from_reader(bytes)
            .map_err(|e| JournalError::codec(format!("entry {index}: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Command {
        term: u64,
        op: String,
    }

    #[test]
    fn bytes_mapper_copies_payload() {
        let mut buf = [0u8; 8];
        assert_eq!(BytesMapper.to_bytes(&b"abc"[..], &mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(BytesMapper.from_bytes(1, b"abc").unwrap(), b"abc");
    }

    #[test]
    fn bytes_mapper_reports_short_buffer() {
        let mut buf = [0u8; 2];
        assert_eq!(BytesMapper.to_bytes(&b"abc"[..], &mut buf).unwrap(), None);
        assert_eq!(BytesMapper.to_bytes(&vec![1u8, 2], &mut buf).unwrap(), Some(2));
    }

    #[test]
    fn cbor_mapper_encodes_and_decodes() {
        let mapper = CborMapper::<Command>::new();
        let command = Command {
            term: 3,
            op: "set x 1".to_string(),
        };

        let mut buf = [0u8; 64];
        let len = mapper.to_bytes(&command, &mut buf).unwrap().unwrap();
        assert!(len > 0);
        assert_eq!(mapper.from_bytes(1, &buf[..len]).unwrap(), command);
    }

    #[test]
    fn cbor_mapper_reports_short_buffer() {
        let mapper = CborMapper::<Command>::new();
        let command = Command {
            term: 3,
            op: "a fairly long operation string".to_string(),
        };

        let mut buf = [0u8; 8];
        assert_eq!(mapper.to_bytes(&command, &mut buf).unwrap(), None);
    }

    #[test]
    fn cbor_mapper_decode_failure_is_codec_error() {
        let mapper = CborMapper::<Command>::new();
        let result = mapper.from_bytes(9, &[0xFF, 0x00]);
        assert!(matches!(result, Err(JournalError::Codec { .. })));
    }

    #[test]
    fn indexed_map_keeps_index() {
        let indexed = Indexed::new(4, 10u32).map(|v| v * 2);
        assert_eq!(indexed, Indexed::new(4, 20));
    }
}
