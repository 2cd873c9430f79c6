// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers: streaming digest computation and transparent decompression. */

use {
    crate::error::{Result, RootfsError},
    async_compression::futures::bufread::{GzipDecoder, XzDecoder},
    futures::{AsyncBufRead, AsyncRead},
    pin_project::pin_project,
    sha2::{Digest, Sha256},
    std::{
        pin::Pin,
        task::{Context, Poll},
    },
};

/// Compression formats used by repository index files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// Gzip compression (`.gz` extension).
    Gzip,

    /// XZ compression (`.xz` extension).
    Xz,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
        }
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed<'a>(
    stream: impl AsyncBufRead + Send + Unpin + 'a,
    compression: Compression,
) -> Pin<Box<dyn AsyncRead + Send + 'a>> {
    match compression {
        Compression::None => Box::pin(stream),
        Compression::Gzip => Box::pin(GzipDecoder::new(stream)),
        Compression::Xz => Box::pin(XzDecoder::new(stream)),
    }
}

/// An [AsyncRead] adapter that computes the SHA-256 digest of everything
/// read through it.
///
/// The digest covers the raw bytes as read from the source, so placing this
/// under a decompressor digests the compressed representation. Verification
/// is meaningful only once the source has been read to completion.
#[pin_project]
pub struct HashingReader<R> {
    hasher: Sha256,
    #[pin]
    source: R,
}

impl<R> HashingReader<R> {
    /// Construct a new instance from a source reader.
    pub fn new(source: R) -> Self {
        Self {
            hasher: Sha256::new(),
            source,
        }
    }

    /// Finish the stream, returning the source reader and the digest.
    pub fn finish(self) -> (R, Vec<u8>) {
        (self.source, self.hasher.finalize().to_vec())
    }

    /// Consume the reader and compare its digest against a hex-encoded
    /// expectation. `name` identifies the content in the error.
    pub fn verify(self, name: &str, expected_hex: &str) -> Result<()> {
        let expected = hex::decode(expected_hex)?;
        let (_, got) = self.finish();

        if got != expected {
            return Err(RootfsError::HashMismatch {
                path: name.to_string(),
                expected: expected_hex.to_string(),
                got: hex::encode(got),
            });
        }

        Ok(())
    }
}

impl<R> AsyncRead for HashingReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        let mut this = self.project();

        match this.source.as_mut().poll_read(cx, buf) {
            Poll::Ready(Ok(size)) => {
                if size > 0 {
                    this.hasher.update(&buf[0..size]);
                }

                Poll::Ready(Ok(size))
            }
            res => res,
        }
    }
}
