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

use seal_common::Result;
use seal_keys::Keys;

use crate::{
    crypto::get_signature_for_signed_data,
    signing_types::{ApkSigningBlock, SignatureSchemeV2Block, SignedData},
};

pub fn compute_signing_block(top_level_hash: [u8; 32], keys: &Keys) -> Result<ApkSigningBlock> {
    // Construct the data block that we're going to sign
    // NOTE: The signature does NOT include the length prefix
    let signed_data = SignedData::new(top_level_hash, keys);
    // Sign it with RSA
    let signature = get_signature_for_signed_data(&signed_data, keys)?;
    // Create the whole APK Signature Scheme block
    let scheme_block = SignatureSchemeV2Block::new(signed_data, signature, keys)?;
    // Create the entire APK Signing Block that goes straight into the zip file
    ApkSigningBlock::new(scheme_block)
}
