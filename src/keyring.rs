// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! OpenPGP trust material. */

use {
    crate::error::{Result, RootfsError},
    pgp::{Deserializable, SignedPublicKey},
    pgp_cleartext::CleartextSignatures,
    std::io::{Read, Seek},
    tracing::debug,
};

/// A collection of trusted OpenPGP public keys.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: Vec<SignedPublicKey>,
}

impl Keyring {
    /// A keyring holding no keys. Nothing verifies against it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse ASCII armored key material, which may hold multiple keys.
    pub fn from_armored_reader(reader: impl Read + Seek) -> Result<Self> {
        let (keys, _) = SignedPublicKey::from_armor_many(reader)
            .map_err(|e| RootfsError::BadKeyring(e.to_string()))?;

        let keys = keys
            .collect::<pgp::errors::Result<Vec<_>>>()
            .map_err(|e| RootfsError::BadKeyring(e.to_string()))?;

        Ok(Self { keys })
    }

    /// Load a keyring from a local file path or an HTTPS URL.
    ///
    /// An empty location yields an empty keyring. URLs must use HTTPS;
    /// repository content itself may travel over plain HTTP because the
    /// signed release manifest provides integrity, but trust anchors may
    /// not.
    pub async fn load(client: &reqwest::Client, location: &str) -> Result<Self> {
        if location.is_empty() {
            return Ok(Self::empty());
        }

        if location.contains("://") {
            if !location.starts_with("https://") {
                return Err(RootfsError::BadKeyring(format!(
                    "key URL must be HTTPS: {}",
                    location
                )));
            }

            debug!(url = location, "downloading key");

            let response = client
                .get(location)
                .send()
                .await
                .map_err(|e| RootfsError::from_fetch(location, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RootfsError::HttpStatus {
                    status: status.as_u16(),
                    url: location.to_string(),
                });
            }

            let data = response
                .bytes()
                .await
                .map_err(|e| RootfsError::from_fetch(location, e))?;

            Self::from_armored_reader(std::io::Cursor::new(data))
        } else {
            debug!(path = location, "reading key file");

            let file = std::fs::File::open(location)
                .map_err(|e| RootfsError::IoPath(location.to_string(), e))?;

            Self::from_armored_reader(file)
        }
    }

    /// The keys held by this keyring.
    pub fn keys(&self) -> &[SignedPublicKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether at least one signature in `signatures` validates against a
    /// key in this keyring.
    pub fn verifies(&self, signatures: &CleartextSignatures) -> bool {
        self.keys.iter().any(|key| signatures.verify(key).is_ok())
    }
}
