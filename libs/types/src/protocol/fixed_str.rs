//! Fixed-capacity inline string
//!
//! Node names and the strings an event keeps after its receive buffer is
//! released live in inline storage so nothing on the connection path allocates.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FixedStrError {
    #[error("string of {got} bytes exceeds capacity {capacity}")]
    TooLong { capacity: usize, got: usize },
}

/// Byte string stored inline with capacity `N`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize> {
    len: u16,
    data: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    /// Create new empty string
    pub const fn new() -> Self {
        Self { len: 0, data: [0; N] }
    }

    /// Copy `bytes` in, failing when they do not fit
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FixedStrError> {
        if bytes.len() > N || bytes.len() > u16::MAX as usize {
            return Err(FixedStrError::TooLong {
                capacity: N,
                got: bytes.len(),
            });
        }

        let mut result = Self::new();
        result.len = bytes.len() as u16;
        result.data[..bytes.len()].copy_from_slice(bytes);
        Ok(result)
    }

    /// Writable backing storage, used to fill the string in place
    ///
    /// Call [`FixedStr::set_len`] afterwards with the number of bytes written.
    pub fn storage_mut(&mut self) -> &mut [u8; N] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) -> Result<(), FixedStrError> {
        if len > N {
            return Err(FixedStrError::TooLong { capacity: N, got: len });
        }
        self.len = len as u16;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity() -> usize {
        N
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TryFrom<&str> for FixedStr<N> {
    type Error = FixedStrError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_bytes(s.as_bytes())
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}
