// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The PKCS#7 SignedData document that becomes the `.RSA` entry of a v1
//! signature, built directly from DER primitives.
//!
//! The signature is detached: content-info carries no content, and the
//! RSA signature covers the raw `.SF` bytes with no signed attributes,
//! which is the form the Android JAR verifier expects.

use seal_common::{der, der::Der, Result};
use seal_keys::Keys;

use crate::crypto::sign_bytes;

const OID_PKCS7_SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
const OID_PKCS7_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];

/// Builds the complete `.RSA` document: an outer ContentInfo wrapping a
/// SignedData with one certificate and one SignerInfo.
pub fn create_signature_block(sf_bytes: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let signature = sign_bytes(sf_bytes, keys)?;
    // issuer and serial are lifted out of the certificate as raw TLVs and
    // spliced back in, so they match the certificate byte for byte.
    let cert = der::cert_fields(&keys.certificate)?;

    let sha256_algorithm = Der::Sequence(vec![Der::Oid(OID_SHA256), Der::Null]);
    let rsa_algorithm = Der::Sequence(vec![Der::Oid(OID_RSA_ENCRYPTION), Der::Null]);

    let signer_info = Der::Sequence(vec![
        Der::Integer(1),
        Der::Sequence(vec![Der::Raw(cert.issuer), Der::Raw(cert.serial)]),
        sha256_algorithm.clone(),
        rsa_algorithm,
        Der::OctetString(signature),
    ]);

    let signed_data = Der::Sequence(vec![
        Der::Integer(1),
        Der::Set(vec![sha256_algorithm]),
        // Detached: the content the signature covers lives in the .SF
        // entry, not here.
        Der::Sequence(vec![Der::Oid(OID_PKCS7_DATA)]),
        Der::ContextConstructed(0, vec![Der::Raw(keys.certificate.clone())]),
        Der::Set(vec![signer_info]),
    ]);

    let content_info = Der::Sequence(vec![
        Der::Oid(OID_PKCS7_SIGNED_DATA),
        Der::ContextConstructed(0, vec![signed_data]),
    ]);

    Ok(content_info.encode())
}
