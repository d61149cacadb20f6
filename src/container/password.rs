use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{truncated, Error, Result};

/// SHA-256 of a password's UTF-8 bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PasswordHash([u8; 32]);

impl PasswordHash {
    pub fn of(password: &str) -> Self {
        Self(Sha256::digest(password.as_bytes()).into())
    }

    /// Hash the password if one was given. An empty string counts as no password.
    pub fn from_option(password: Option<&str>) -> Option<Self> {
        password.filter(|p| !p.is_empty()).map(Self::of)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// Write the `hasPassword` flag byte, followed by the hash when there is one.
pub fn write_gate<W: Write>(w: &mut W, hash: Option<&PasswordHash>) -> Result<u64> {
    match hash {
        Some(hash) => {
            w.write_u8(1)?;
            w.write_all(hash.as_bytes())?;
            Ok(33)
        }
        None => {
            w.write_u8(0)?;
            Ok(1)
        }
    }
}

/// Read the flag byte and the hash that may follow it.
pub fn read_gate<R: Read>(r: &mut R) -> Result<Option<PasswordHash>> {
    match r.read_u8().map_err(truncated("password flag"))? {
        0 => Ok(None),
        1 => {
            let mut hash = [0_u8; 32];
            r.read_exact(&mut hash).map_err(truncated("password hash"))?;
            Ok(Some(PasswordHash(hash)))
        }
        flag => Err(Error::corrupt(format!("invalid password flag {}", flag))),
    }
}

/// Check a supplied password against the stored hash. Without a stored hash anything passes.
pub fn verify(stored: Option<&PasswordHash>, supplied: Option<&str>) -> Result<()> {
    let stored = match stored {
        Some(stored) => stored,
        None => return Ok(()),
    };
    match PasswordHash::from_option(supplied) {
        None => Err(Error::MissingPassword),
        Some(hash) if hash == *stored => {
            debug!("Password accepted.");
            Ok(())
        }
        Some(_) => Err(Error::IncorrectPassword),
    }
}
