// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {crate::package_version::VersionError, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RootfsError {
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("date parsing error: {0:?}")]
    DateParse(#[from] mailparse::MailParseError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, #[source] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("failed to parse dependency expression: {0}")]
    DependencyParse(String),

    #[error("unknown version relation operator: {0}")]
    UnknownVersionOperator(String),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("required control field missing: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("release file does not contain exactly 1 paragraph; got {0}")]
    ReleaseParagraphMismatch(usize),

    #[error("malformed release manifest entry: {0}")]
    ReleaseManifestEntryMalformed(String),

    #[error("release file is not signed by a trusted key")]
    UnsignedRelease,

    #[error("keyring error: {0}")]
    BadKeyring(String),

    #[error("digest mismatch for {path}: expected {expected}, got {got}")]
    HashMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("no digest recorded for index file: {0}")]
    MissingIndexDigest(String),

    #[error("HTTP status {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("network error fetching {url}: {source:?}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request cancelled or timed out: {0}")]
    Cancelled(String),

    #[error("unable to locate package: {0}")]
    PackageNotFound(String),

    #[error("virtual package with multiple installation candidates: {0}")]
    AmbiguousVirtual(String),

    #[error("unsatisfiable dependency: {0}")]
    Unsatisfiable(String),

    #[error("requested package {0} is not selected")]
    RequestedLost(String),

    #[error("invalid account name: {0:?}")]
    InvalidName(String),

    #[error("malformed account entry: {0:?}")]
    MalformedAccountEntry(String),

    #[error("user {0} must belong to at least one group")]
    NoGroups(String),

    #[error("user {user} references unknown group {group}")]
    GroupNotFound { user: String, group: String },

    #[error("no free id available in the requested range")]
    IdExhausted,

    #[error("a shadow file is required to store password hashes")]
    ShadowRequired,

    #[error("password hashing error: {0:?}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("bad slim pattern {0:?}: {1}")]
    BadPattern(String, glob::PatternError),

    #[error("all candidates failed: {}", format_aggregate(.0))]
    Aggregate(Vec<RootfsError>),
}

impl RootfsError {
    /// Classify a transport failure for the given URL.
    pub(crate) fn from_fetch(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Cancelled(url.to_string())
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

fn format_aggregate(errors: &[RootfsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RootfsError>;
