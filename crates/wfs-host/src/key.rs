//! Key material selection for encrypted images.

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::{Error, Result};

/// How an image is encrypted, as chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionKind {
    #[default]
    Plain,
    Mlc,
    Usb,
}

/// Key inputs gathered by the UI, validated for the selected [`EncryptionKind`].
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    Plain,
    Mlc { otp: Vec<u8> },
    Usb { otp: Vec<u8>, seeprom: Vec<u8> },
}

impl KeySource {
    /// Builds a key source from whatever files the user supplied.
    ///
    /// Extra inputs are ignored (an OTP supplied for a plain image is not an error).
    pub fn from_parts(
        kind: EncryptionKind,
        otp: Option<Vec<u8>>,
        seeprom: Option<Vec<u8>>,
    ) -> Result<Self> {
        match kind {
            EncryptionKind::Plain => Ok(KeySource::Plain),
            EncryptionKind::Mlc => {
                let otp = otp.ok_or(Error::MissingKeyMaterial("otp"))?;
                Ok(KeySource::Mlc { otp })
            }
            EncryptionKind::Usb => {
                let otp = otp.ok_or(Error::MissingKeyMaterial("otp"))?;
                let seeprom = seeprom.ok_or(Error::MissingKeyMaterial("seeprom"))?;
                Ok(KeySource::Usb { otp, seeprom })
            }
        }
    }

    pub fn kind(&self) -> EncryptionKind {
        match self {
            KeySource::Plain => EncryptionKind::Plain,
            KeySource::Mlc { .. } => EncryptionKind::Mlc,
            KeySource::Usb { .. } => EncryptionKind::Usb,
        }
    }

    /// Derives the image key. Plain images use an empty key.
    pub fn resolve<E: Engine + ?Sized>(&self, engine: &E) -> Result<Vec<u8>> {
        let key = match self {
            KeySource::Plain => Vec::new(),
            KeySource::Mlc { otp } => engine.mlc_key_from_otp(otp)?,
            KeySource::Usb { otp, seeprom } => engine.usb_key(otp, seeprom)?,
        };
        Ok(key)
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Plain => f.write_str("KeySource::Plain"),
            KeySource::Mlc { otp } => f
                .debug_struct("KeySource::Mlc")
                .field("otp_len", &otp.len())
                .finish(),
            KeySource::Usb { otp, seeprom } => f
                .debug_struct("KeySource::Usb")
                .field("otp_len", &otp.len())
                .field("seeprom_len", &seeprom.len())
                .finish(),
        }
    }
}
