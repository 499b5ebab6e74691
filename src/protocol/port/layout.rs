//! Little-endian cursor over fixed-layout account images.

use crate::core::error::{Error, Result};
use solana_sdk::pubkey::Pubkey;

pub const PUBKEY_LEN: usize = 32;
pub const COPTION_PUBKEY_LEN: usize = 4 + PUBKEY_LEN;

pub struct ByteReader<'a> {
    src: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        ByteReader { src, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.src.len())
            .ok_or_else(|| {
                Error::Decode(format!(
                    "unexpected end of data reading {} at offset {} (len {})",
                    field,
                    self.offset,
                    self.src.len()
                ))
            })?;
        let bytes = &self.src[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        self.take(N, field)?
            .try_into()
            .map_err(|_| Error::Decode(format!("failed to read {}", field)))
    }

    pub fn u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    /// Any non-zero byte reads as true, as the on-chain program does.
    pub fn bool(&mut self, field: &str) -> Result<bool> {
        Ok(self.u8(field)? != 0)
    }

    pub fn u32(&mut self, field: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    pub fn u64(&mut self, field: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(field)?))
    }

    pub fn u128(&mut self, field: &str) -> Result<u128> {
        Ok(u128::from_le_bytes(self.array(field)?))
    }

    pub fn pubkey(&mut self, field: &str) -> Result<Pubkey> {
        Ok(Pubkey::new_from_array(self.array(field)?))
    }

    /// `COption<Pubkey>`: a u32 tag (0 = none, 1 = some) followed by 32 bytes either way.
    pub fn coption_pubkey(&mut self, field: &str) -> Result<Option<Pubkey>> {
        let tag = self.u32(field)?;
        let key = self.pubkey(field)?;
        match tag {
            0 => Ok(None),
            1 => Ok(Some(key)),
            other => Err(Error::Decode(format!("invalid COption tag {} for {}", other, field))),
        }
    }

    pub fn skip(&mut self, len: usize, field: &str) -> Result<()> {
        self.take(len, field).map(|_| ())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.src[self.offset..];
        self.offset = self.src.len();
        bytes
    }
}

/// Counterpart of [`ByteReader`], used for instruction payloads and test fixtures.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u128(&mut self, value: u128) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn pubkey(&mut self, value: &Pubkey) -> &mut Self {
        self.buf.extend_from_slice(value.as_ref());
        self
    }

    pub fn coption_pubkey(&mut self, value: Option<&Pubkey>) -> &mut Self {
        match value {
            Some(key) => self.u32(1).pubkey(key),
            None => self.u32(0).pubkey(&Pubkey::default()),
        }
    }

    pub fn zeros(&mut self, len: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
