use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::aspect::Orientation;

const TOKEN_BYTES: usize = 32;

/// Object key of an uploaded video: `{orientation}/{64 hex chars}.{ext}`.
///
/// The token is drawn from the OS CSPRNG and never checked against existing
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn generate(orientation: Orientation, extension: &str) -> Result<Self, rand::Error> {
        let mut token = [0u8; TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut token)?;
        Ok(Self::from_parts(orientation, &token, extension))
    }

    fn from_parts(orientation: Orientation, token: &[u8], extension: &str) -> Self {
        Self(format!("{}/{}.{}", orientation, hex::encode(token), extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
