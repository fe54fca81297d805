//! Bounded credential buffer
//!
//! Holds the secret while it is being typed. Appends that would not leave
//! room for a terminator are rejected whole, never truncated.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Capacity of the credential buffer in bytes
pub const CREDENTIAL_CAPACITY: usize = 256;

/// Fixed-size, self-wiping byte buffer for the in-progress secret
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CredentialBuffer {
    bytes: [u8; CREDENTIAL_CAPACITY],
    len: usize,
}

impl CredentialBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0u8; CREDENTIAL_CAPACITY],
            len: 0,
        }
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        CREDENTIAL_CAPACITY
    }

    /// Logical contents (the bytes below the current length)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Append `input` if it fits, returning whether it was accepted.
    ///
    /// One byte is always kept free, so at most `CREDENTIAL_CAPACITY - 1`
    /// bytes can be held.
    pub fn push(&mut self, input: &[u8]) -> bool {
        if input.is_empty() || self.len + input.len() >= CREDENTIAL_CAPACITY {
            return false;
        }
        self.bytes[self.len..self.len + input.len()].copy_from_slice(input);
        self.len += input.len();
        true
    }

    /// Drop the last byte; no-op when empty
    pub fn backspace(&mut self) {
        self.len = self.len.saturating_sub(1);
    }

    /// Empty the buffer and wipe its storage
    pub fn clear(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }
}

impl Default for CredentialBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBuffer")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
