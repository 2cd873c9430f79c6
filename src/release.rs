// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `InRelease` file primitives.

An `InRelease` file is the clear-signed manifest of a distribution. It
names the available architectures and components and carries the SHA-256
digest of every index file beneath the distribution directory.
*/

use {
    crate::{
        control::{ControlParagraph, ControlParagraphReader},
        error::{Result, RootfsError},
        keyring::Keyring,
    },
    pgp_cleartext::{CleartextSignatureReader, CleartextSignatures},
    std::{
        io::{BufRead, Read},
        str::FromStr,
    },
};

/// An entry of the SHA-256 manifest in a release file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseFileEntry {
    /// Path of the file, relative to the distribution directory.
    pub path: String,
    /// Hex SHA-256 digest of the file.
    pub digest: String,
    /// Size of the file in bytes.
    pub size: u64,
}

/// A parsed distribution release manifest.
pub struct ReleaseFile {
    paragraph: ControlParagraph,
    signatures: Option<CleartextSignatures>,
}

impl ReleaseFile {
    /// Construct an instance from an unsigned control document holding
    /// exactly one paragraph.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        if paragraphs.len() != 1 {
            return Err(RootfsError::ReleaseParagraphMismatch(paragraphs.len()));
        }

        Ok(Self {
            paragraph: paragraphs.into_iter().next().expect("count checked"),
            signatures: None,
        })
    }

    /// Construct an instance from a PGP clear-signed document, as served at
    /// `dists/{distribution}/InRelease`.
    ///
    /// Signatures are extracted but not yet validated; call
    /// [Self::require_signed_by] before trusting the content.
    pub fn from_armored_reader<R: Read + BufRead>(reader: R) -> Result<Self> {
        let reader = CleartextSignatureReader::new(reader);
        let mut reader = std::io::BufReader::new(reader);

        let mut slf = Self::from_reader(&mut reader)?;
        slf.signatures = Some(reader.into_inner().finalize());

        Ok(slf)
    }

    /// Require at least one valid signature from the given keyring.
    pub fn require_signed_by(&self, keyring: &Keyring) -> Result<()> {
        match &self.signatures {
            Some(signatures) if keyring.verifies(signatures) => Ok(()),
            _ => Err(RootfsError::UnsignedRelease),
        }
    }

    /// Machine architectures named by the release.
    pub fn architectures(&self) -> Vec<&str> {
        self.paragraph
            .field("Architectures")
            .map(|f| f.iter_words().collect())
            .unwrap_or_default()
    }

    /// Component names within the release.
    pub fn components(&self) -> Vec<&str> {
        self.paragraph
            .field("Components")
            .map(|f| f.iter_words().collect())
            .unwrap_or_default()
    }

    /// The SHA-256 manifest entries.
    ///
    /// Each line has the form `<digest> <size> <path>`.
    pub fn sha256_entries(&self) -> Result<Vec<ReleaseFileEntry>> {
        let field = match self.paragraph.field("SHA256") {
            Some(field) => field,
            None => return Ok(vec![]),
        };

        field
            .iter_lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut parts = line.split_ascii_whitespace();

                let (digest, size, path) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(digest), Some(size), Some(path)) => (digest, size, path),
                    _ => {
                        return Err(RootfsError::ReleaseManifestEntryMalformed(line.to_string()));
                    }
                };

                if parts.next().is_some() {
                    return Err(RootfsError::ReleaseManifestEntryMalformed(line.to_string()));
                }

                Ok(ReleaseFileEntry {
                    path: path.to_string(),
                    digest: digest.to_string(),
                    size: u64::from_str(size)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil, indoc::indoc, std::io::Cursor};

    const RELEASE_BODY: &str = indoc! {"
        Origin: Debian
        Suite: stable
        Codename: bookworm
        Architectures: all amd64 arm64
        Components: main contrib
        Date: Sat, 10 Feb 2024 10:06:25 UTC
        SHA256:
         3957f28db16e3f28c7b34ae84f1c929c567de6970f3f1b95dac9b498dd80fe63 738242 contrib/binary-amd64/Packages
         3e9a121d599b56c08bc8f144e4830807c77c29d7114316d6984ba54695d3db7b 57319 contrib/binary-amd64/Packages.gz
         48cfe101cd84f16baf720b99e8f2ff89fd7e063553966d8536b472677acb82f0 103223 main/binary-amd64/Packages
         86057fcd3eff667ec8e3fbabb2a75e229f5e99f39ace67ff0db4a8509d0707e4 27334 main/binary-amd64/Packages.gz
         706c840235798e098d4d6013d1dabbc967f894d0ffa02c92ac959dcea85ddf54 23912 main/binary-amd64/Packages.xz
         e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 0 main/binary-all/Packages
    "};

    #[test]
    fn parse_unsigned_body() -> Result<()> {
        let release = ReleaseFile::from_reader(Cursor::new(RELEASE_BODY.as_bytes()))?;

        assert_eq!(release.architectures(), vec!["all", "amd64", "arm64"]);
        assert_eq!(release.components(), vec!["main", "contrib"]);

        let entries = release.sha256_entries()?;
        assert_eq!(entries.len(), 6);
        assert_eq!(
            entries[0],
            ReleaseFileEntry {
                path: "contrib/binary-amd64/Packages".to_string(),
                digest: "3957f28db16e3f28c7b34ae84f1c929c567de6970f3f1b95dac9b498dd80fe63"
                    .to_string(),
                size: 738242,
            }
        );

        Ok(())
    }

    #[test]
    fn signature_verification() -> Result<()> {
        let (secret_key, public_key) = testutil::signing_key();

        let signed = testutil::clearsign(&secret_key, RELEASE_BODY);
        assert!(signed.starts_with("-----BEGIN PGP SIGNED MESSAGE-----"));

        let release = ReleaseFile::from_armored_reader(Cursor::new(signed.as_bytes()))?;

        let mut keyring = Keyring::empty();
        assert!(matches!(
            release.require_signed_by(&keyring),
            Err(RootfsError::UnsignedRelease)
        ));

        keyring = Keyring::from_armored_reader(Cursor::new(
            public_key
                .to_armored_string(None)
                .expect("armoring should succeed")
                .into_bytes(),
        ))?;
        release.require_signed_by(&keyring)?;

        Ok(())
    }

    #[test]
    fn signature_from_unrelated_key_is_rejected() -> Result<()> {
        let (secret_key, _) = testutil::signing_key();
        let (_, other_public) = testutil::signing_key();

        let signed = testutil::clearsign(&secret_key, RELEASE_BODY);
        let release = ReleaseFile::from_armored_reader(Cursor::new(signed.as_bytes()))?;

        let keyring = Keyring::from_armored_reader(Cursor::new(
            other_public
                .to_armored_string(None)
                .expect("armoring should succeed")
                .into_bytes(),
        ))?;

        assert!(matches!(
            release.require_signed_by(&keyring),
            Err(RootfsError::UnsignedRelease)
        ));

        Ok(())
    }

    #[test]
    fn unsigned_body_never_verifies() -> Result<()> {
        let (_, public_key) = testutil::signing_key();

        let release = ReleaseFile::from_reader(Cursor::new(RELEASE_BODY.as_bytes()))?;

        let keyring = Keyring::from_armored_reader(Cursor::new(
            public_key
                .to_armored_string(None)
                .expect("armoring should succeed")
                .into_bytes(),
        ))?;

        assert!(matches!(
            release.require_signed_by(&keyring),
            Err(RootfsError::UnsignedRelease)
        ));

        Ok(())
    }

    #[test]
    fn malformed_manifest_entry() {
        let body = "Suite: stable\nSHA256:\n aabb 123\n";

        let release = ReleaseFile::from_reader(Cursor::new(body.as_bytes())).unwrap();

        assert!(matches!(
            release.sha256_entries(),
            Err(RootfsError::ReleaseManifestEntryMalformed(_))
        ));
    }
}
