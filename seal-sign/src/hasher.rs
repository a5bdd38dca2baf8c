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

use byteorder::{ByteOrder, LittleEndian};
use seal_common::Result;
use seal_zip::Layout;
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

pub const BYTES_IN_1MB: u32 = 1024 * 1024;
pub const FIRST_LEVEL_CHUNK_MAGIC: &[u8] = &[0xa5];
pub const SECOND_LEVEL_CHUNK_MAGIC: &[u8] = &[0x5a];

/// Streaming SHA-256 over a buffer, fed in 8 KiB sub-chunks so arbitrarily
/// large inputs never require a single-shot pass.
pub fn sha256(bytes: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    for sub_chunk in bytes.chunks(8 * 1024) {
        hasher.update(sub_chunk);
    }
    hasher.finalize().into()
}

/// The v2 scheme's content digest over the three protected ranges of the
/// container: entries, central directory and EOCD.
///
/// The EOCD is digested with its central-directory-offset field pinned to
/// the position the signing block will occupy, which for an unsigned
/// container is the offset it already holds. The Android verifier
/// substitutes the block's start offset the same way, so signing leaves
/// the input untouched and still verifies after insertion.
pub fn compute_top_level_hash(apk_buf: &[u8], layout: &Layout) -> Result<Sha256Hash> {
    compute_top_level_hash_of_ranges(
        apk_buf,
        layout.cd_start,
        layout.cd_start,
        layout.eocd_start,
        layout.cd_start as u32,
    )
}

/// Range-explicit form shared with the verifier, where the signing block
/// already sits between `entries_end` and `cd_start`.
pub fn compute_top_level_hash_of_ranges(
    apk_buf: &[u8],
    entries_end: usize,
    cd_start: usize,
    eocd_start: usize,
    pinned_cd_offset: u32,
) -> Result<Sha256Hash> {
    // The Android Developer documentation calls these chunks 1, 3 and 4
    // because the APK Signing Block is chunk 2.
    let mut first_level_hashes = vec![];

    // Chunk 1: APK contents before the signing block / central directory
    first_level_hashes.extend(hash_chunk(&apk_buf[..entries_end]));

    // Chunk 3: Central directory
    first_level_hashes.extend(hash_chunk(&apk_buf[cd_start..eocd_start]));

    // Chunk 4: EOCD, digested from a scratch copy with the offset field
    // pinned to where the signing block starts.
    let mut eocd = apk_buf[eocd_start..].to_vec();
    LittleEndian::write_u32(&mut eocd[16..20], pinned_cd_offset);
    first_level_hashes.extend(hash_chunk(&eocd));

    let mut hasher = Sha256::new();
    hasher.update(SECOND_LEVEL_CHUNK_MAGIC);
    hasher.update((first_level_hashes.len() as u32).to_le_bytes());
    for hash in &first_level_hashes {
        hasher.update(hash);
    }
    Ok(hasher.finalize().into())
}

fn hash_chunk(chunk: &[u8]) -> Vec<Sha256Hash> {
    let mut hasher = Sha256::new();
    let mut chunk_hashes = vec![];
    let mut pos = 0;

    while pos < chunk.len() {
        // Each chunk is 1MB OR whatever's left in the buffer
        let end = (pos + BYTES_IN_1MB as usize).min(chunk.len());
        let chunk_size = end - pos;
        hasher.update(FIRST_LEVEL_CHUNK_MAGIC);
        hasher.update((chunk_size as u32).to_le_bytes());
        hasher.update(&chunk[pos..end]);
        chunk_hashes.push(hasher.finalize_reset().into());
        pos = end;
    }

    chunk_hashes
}
