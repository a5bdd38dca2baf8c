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

//! In-process verification of a v2-signed container. Not a substitute for
//! the platform verifier; used to sanity-check freshly signed output and
//! to detect post-signing tampering in tests and tooling.

use byteorder::{ByteOrder, LittleEndian};
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Sign, RsaPublicKey};
use seal_common::{Result, SealError};
use sha2::Sha256;
use tracing::debug;

use crate::{
    hasher::{compute_top_level_hash_of_ranges, sha256, Sha256Hash},
    signed_data_block::{APK_SIGNING_BLOCK_MAGIC, SIGNATURE_SCHEME_V2_BLOCK_ID},
};

/// The pieces of a v2 signature pulled back out of a signed container.
pub struct V2SignatureInfo {
    /// The raw signed-data bytes the RSA signature covers.
    pub signed_data: Vec<u8>,
    /// The top-level content digest embedded in signed-data.
    pub content_digest: Sha256Hash,
    /// The signer's certificate, ASN.1 DER.
    pub certificate: Vec<u8>,
    /// The RSA-PKCS1v1.5 signature bytes.
    pub signature: Vec<u8>,
    /// SubjectPublicKeyInfo, ASN.1 DER.
    pub public_key_der: Vec<u8>,
    /// Where the signing block starts in the container.
    pub block_start: usize,
}

fn bad(context: &str) -> SealError {
    SealError::SignatureVerificationFailed(context.to_string())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u32(&mut self) -> Result<u32> {
        if self.pos + 4 > self.buf.len() {
            return Err(bad("signing block structure truncated"));
        }
        let value = LittleEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(value)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(bad("signing block structure truncated"));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }
}

/// Locates the APK Signing Block in front of the central directory and
/// extracts the single v2 signer.
pub fn extract_v2_signature(apk_buf: &[u8]) -> Result<V2SignatureInfo> {
    let layout = seal_zip::parse(apk_buf)?;
    let block_end = layout.cd_start;
    if block_end < 24 + 8 || &apk_buf[block_end - 16..block_end] != APK_SIGNING_BLOCK_MAGIC {
        return Err(bad("no APK Signing Block before the central directory"));
    }
    let size = LittleEndian::read_u64(&apk_buf[block_end - 24..]) as usize;
    let block_start = block_end
        .checked_sub(size + 8)
        .ok_or_else(|| bad("signing block size exceeds the container"))?;

    // Walk the u64-length-prefixed id/value pairs for the v2 scheme.
    let mut pos = block_start + 8;
    let pairs_end = block_end - 24;
    let mut v2_value = None;
    while pos + 12 <= pairs_end {
        let pair_len = LittleEndian::read_u64(&apk_buf[pos..]) as usize;
        // The declared length covers the 4-byte id plus the value.
        if pair_len < 4 {
            return Err(bad("signing block pair length too small"));
        }
        let value_end = pos
            .checked_add(8)
            .and_then(|header_end| header_end.checked_add(pair_len))
            .filter(|&end| end <= pairs_end)
            .ok_or_else(|| bad("signing block pair overruns the block"))?;
        let id = LittleEndian::read_u32(&apk_buf[pos + 8..]);
        if id == SIGNATURE_SCHEME_V2_BLOCK_ID {
            v2_value = Some(&apk_buf[pos + 12..value_end]);
        } else {
            debug!("skipping signing block pair {id:#x}");
        }
        pos = value_end;
    }
    let v2_value = v2_value.ok_or_else(|| bad("no v2 scheme pair in the signing block"))?;

    // signers -> signer -> { signed-data, signatures, public key }
    let mut reader = Reader {
        buf: v2_value,
        pos: 0,
    };
    let signers = reader.length_prefixed()?;
    let mut reader = Reader {
        buf: signers,
        pos: 0,
    };
    let signer = reader.length_prefixed()?;
    let mut reader = Reader {
        buf: signer,
        pos: 0,
    };
    let signed_data = reader.length_prefixed()?.to_vec();
    let signatures = reader.length_prefixed()?;
    let public_key_der = reader.length_prefixed()?.to_vec();

    let mut reader = Reader {
        buf: signatures,
        pos: 0,
    };
    let signature_entry = reader.length_prefixed()?;
    let mut reader = Reader {
        buf: signature_entry,
        pos: 0,
    };
    if reader.u32()? != 0x0103 {
        return Err(bad("unsupported signature algorithm"));
    }
    let signature = reader.length_prefixed()?.to_vec();

    // Inside signed-data: digests, then certificates.
    let mut reader = Reader {
        buf: &signed_data,
        pos: 0,
    };
    let digests = reader.length_prefixed()?.to_vec();
    let certificates = reader.length_prefixed()?;
    let mut cert_reader = Reader {
        buf: certificates,
        pos: 0,
    };
    let certificate = cert_reader.length_prefixed()?.to_vec();

    let mut reader = Reader {
        buf: &digests,
        pos: 0,
    };
    let digest_entry = reader.length_prefixed()?;
    let mut reader = Reader {
        buf: digest_entry,
        pos: 0,
    };
    if reader.u32()? != 0x0103 {
        return Err(bad("unsupported digest algorithm"));
    }
    let digest = reader.length_prefixed()?;
    let content_digest: Sha256Hash = digest
        .try_into()
        .map_err(|_| bad("content digest is not 32 bytes"))?;

    Ok(V2SignatureInfo {
        signed_data,
        content_digest,
        certificate,
        signature,
        public_key_der,
        block_start,
    })
}

/// Full v2 check: the embedded content digest matches a recomputation
/// over the signed container, and the RSA signature over signed-data
/// verifies against the embedded public key.
pub fn verify_apk(apk_buf: &[u8]) -> Result<()> {
    let info = extract_v2_signature(apk_buf)?;
    let layout = seal_zip::parse(apk_buf)?;

    let recomputed = compute_top_level_hash_of_ranges(
        apk_buf,
        info.block_start,
        layout.cd_start,
        layout.eocd_start,
        info.block_start as u32,
    )?;
    if recomputed != info.content_digest {
        return Err(bad("content digest mismatch: container modified after signing"));
    }

    let public_key = RsaPublicKey::from_public_key_der(&info.public_key_der)
        .map_err(|e| bad(&format!("embedded public key invalid: {e}")))?;
    public_key
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &sha256(&info.signed_data),
            &info.signature,
        )
        .map_err(|_| bad("RSA signature over signed-data does not verify"))?;

    Ok(())
}
