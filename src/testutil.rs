// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Shared test fixtures. */

use {
    pgp::{
        crypto::{hash::HashAlgorithm, sym::SymmetricKeyAlgorithm},
        types::{CompressionAlgorithm, SecretKeyTrait},
        KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey,
    },
    smallvec::smallvec,
};

/// Generate a throwaway self-signed signing key pair.
pub(crate) fn signing_key() -> (SignedSecretKey, SignedPublicKey) {
    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::EdDSA)
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_create_certificates(false)
        .can_sign(true)
        .primary_user_id("Test Repository <repo@example.com>".to_string());

    let secret_key = params
        .build()
        .expect("key params should build")
        .generate()
        .expect("key generation should succeed");

    let secret_key_signed = secret_key
        .sign(String::new)
        .expect("secret key signing should succeed");

    let public_key_signed = secret_key_signed
        .public_key()
        .sign(&secret_key_signed, String::new)
        .expect("public key signing should succeed");

    (secret_key_signed, public_key_signed)
}

/// Produce a cleartext-signed document over `content`.
pub(crate) fn clearsign(key: &SignedSecretKey, content: &str) -> String {
    pgp_cleartext::cleartext_sign(
        key,
        String::new,
        HashAlgorithm::SHA2_256,
        std::io::Cursor::new(content.as_bytes().to_vec()),
    )
    .expect("cleartext signing should succeed")
}
