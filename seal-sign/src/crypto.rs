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

use deku::DekuContainerWrite;
use rsa::Pkcs1v15Sign;
use seal_common::*;
use seal_keys::Keys;
use sha2::Sha256;

use crate::hasher::sha256;

/// RSA-PKCS1v1.5 signature over the serialised form of a signable
/// structure. The signature covers the raw bytes, not any length prefix
/// the structure is later wrapped in.
pub fn get_signature_for_signed_data<T: DekuContainerWrite>(
    signed_data: &T,
    keys: &Keys,
) -> Result<Vec<u8>> {
    sign_bytes(&signed_data.to_bytes()?, keys)
}

/// RSA-PKCS1v1.5/SHA-256 signature over a plain byte buffer.
pub fn sign_bytes(bytes: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let digest = sha256(bytes);
    let padding = Pkcs1v15Sign::new::<Sha256>();
    Ok(keys.private_key.sign(padding, &digest)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_length_matches_key_size_and_is_deterministic() {
        let keys = Keys::generate("crypto test", "SEAL", "US", 1, "CERT").unwrap();
        let signature = sign_bytes(b"some signed data", &keys).unwrap();
        // 2048-bit key -> 256-byte PKCS1v1.5 signature
        assert_eq!(signature.len(), 256);
        // PKCS1v1.5 padding is deterministic, which is what makes the
        // whole signing pipeline reproducible.
        assert_eq!(signature, sign_bytes(b"some signed data", &keys).unwrap());
    }

    #[test]
    fn signature_verifies_with_public_key() {
        let keys = Keys::generate("crypto test", "SEAL", "US", 1, "CERT").unwrap();
        let message = b"some signed data";
        let signature = sign_bytes(message, &keys).unwrap();
        let padding = Pkcs1v15Sign::new::<Sha256>();
        keys.public_key
            .verify(padding, &sha256(message), &signature)
            .unwrap();
    }
}
