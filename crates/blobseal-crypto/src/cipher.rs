//! AES-256-CBC stream transforms with PKCS#7 padding.
//!
//! Both transforms are pull-based readers over the source: nothing is buffered
//! beyond one chunk plus a partial block.

use std::io::{self, ErrorKind, Read};

use aes::{Aes256, Block};
use cbc::cipher::{
    block_padding::{Padding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use blobseal_core::error::{CryptoError, Result};

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

const CHUNK_SIZE: usize = 8 * 1024;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub type Iv = [u8; BLOCK_SIZE];
pub type SymmetricKey = Zeroizing<[u8; KEY_SIZE]>;

pub fn random_iv() -> Iv {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

pub fn random_key() -> SymmetricKey {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut *key);
    key
}

/// Ciphertext length for `plain_len` bytes of input.
pub fn encrypted_len(plain_len: u64) -> u64 {
    (plain_len / BLOCK_SIZE as u64 + 1) * BLOCK_SIZE as u64
}

/// Reader yielding the CBC encryption of everything `inner` produces.
pub struct EncryptingReader<R> {
    inner: R,
    encryptor: Aes256CbcEnc,
    carry: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> EncryptingReader<R> {
    pub fn new(inner: R, key: &[u8], iv: &Iv) -> Result<Self> {
        let encryptor = Aes256CbcEnc::new_from_slices(key, iv).map_err(CryptoError::crypto)?;
        Ok(Self {
            inner,
            encryptor,
            carry: Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE),
            out: Vec::new(),
            pos: 0,
            finished: false,
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        let at_end = read_into(&mut self.inner, &mut self.carry, CHUNK_SIZE)?;

        let full = self.carry.len() - self.carry.len() % BLOCK_SIZE;
        let mut ready: Vec<u8> = self.carry.drain(..full).collect();
        for block in ready.chunks_exact_mut(BLOCK_SIZE) {
            self.encryptor.encrypt_block_mut(Block::from_mut_slice(block));
        }

        if at_end {
            // Source is exhausted: pad whatever is left into the final block.
            let mut last = Block::default();
            let tail = self.carry.len();
            last[..tail].copy_from_slice(&self.carry);
            Pkcs7::pad(&mut last, tail);
            self.encryptor.encrypt_block_mut(&mut last);
            ready.extend_from_slice(&last);
            self.carry.clear();
            self.finished = true;
        }

        self.out = ready;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.out.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }

        let len = buf.len().min(self.out.len() - self.pos);
        buf[..len].copy_from_slice(&self.out[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }
}

/// Reader yielding the plaintext of a CBC ciphertext produced by [`EncryptingReader`].
///
/// The final block is held back until the source ends so its padding can be removed.
pub struct DecryptingReader<R> {
    inner: R,
    decryptor: Aes256CbcDec,
    carry: Vec<u8>,
    out: Zeroizing<Vec<u8>>,
    pos: usize,
    finished: bool,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(inner: R, key: &[u8], iv: &Iv) -> Result<Self> {
        let decryptor = Aes256CbcDec::new_from_slices(key, iv).map_err(CryptoError::crypto)?;
        Ok(Self {
            inner,
            decryptor,
            carry: Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE),
            out: Zeroizing::new(Vec::new()),
            pos: 0,
            finished: false,
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        let at_end = read_into(&mut self.inner, &mut self.carry, CHUNK_SIZE)?;

        let ready_len = if at_end {
            if self.carry.is_empty() || self.carry.len() % BLOCK_SIZE != 0 {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    "ciphertext is not a whole number of blocks",
                ));
            }
            self.carry.len()
        } else {
            let full = self.carry.len() - self.carry.len() % BLOCK_SIZE;
            if full == self.carry.len() {
                full - BLOCK_SIZE
            } else {
                full
            }
        };

        let mut ready = Zeroizing::new(self.carry.drain(..ready_len).collect::<Vec<u8>>());
        for block in ready.chunks_exact_mut(BLOCK_SIZE) {
            self.decryptor.decrypt_block_mut(Block::from_mut_slice(block));
        }

        if at_end {
            let last_start = ready.len() - BLOCK_SIZE;
            let unpadded = Pkcs7::unpad(Block::from_slice(&ready[last_start..]))
                .map_err(|_| io::Error::new(ErrorKind::InvalidData, "invalid padding"))?
                .len();
            ready.truncate(last_start + unpadded);
            self.finished = true;
        }

        self.out = ready;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.out.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }

        let len = buf.len().min(self.out.len() - self.pos);
        buf[..len].copy_from_slice(&self.out[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }
}

/// Append up to `want` bytes from `reader` to `buf`; returns true once the source has ended.
///
/// Bytes read before an error stay in `buf`, so a retried call picks up where this one stopped.
fn read_into<R: Read + ?Sized>(reader: &mut R, buf: &mut Vec<u8>, want: usize) -> io::Result<bool> {
    let start = buf.len();
    buf.resize(start + want, 0);
    let mut filled = 0usize;
    let result = loop {
        if filled == want {
            break Ok(false);
        }
        match reader.read(&mut buf[start + filled..]) {
            Ok(0) => break Ok(true),
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => break Err(err),
        }
    };
    buf.truncate(start + filled);
    result
}

/// Read until `buf` is full or the source ends; returns the byte count.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0usize;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(read) => total += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Read one fixed-size header segment, failing if the source ends early.
pub(crate) fn read_header<R: Read + ?Sized>(
    reader: &mut R,
    segment: &'static str,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    let found = read_full(reader, &mut buf)?;
    if found < len {
        return Err(CryptoError::TruncatedStreamHeader {
            segment,
            expected: len,
            found,
        });
    }
    Ok(buf)
}
