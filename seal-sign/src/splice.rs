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
use seal_zip::{patch_cd_offset, Layout};

/// Rebuilds the container with the serialised signing block inserted
/// between the entries and the central directory, and the EOCD's
/// central-directory offset patched to the directory's new position.
pub fn splice_signing_block(
    apk_buf: &[u8],
    layout: &Layout,
    signing_block_bytes: &[u8],
) -> Result<Vec<u8>> {
    let mut final_apk = Vec::with_capacity(apk_buf.len() + signing_block_bytes.len());

    final_apk.extend_from_slice(&apk_buf[..layout.cd_start]);
    final_apk.extend_from_slice(signing_block_bytes);
    final_apk.extend_from_slice(&apk_buf[layout.cd_start..]);

    let new_eocd_start = layout.eocd_start + signing_block_bytes.len();
    let new_cd_start = (layout.cd_start + signing_block_bytes.len()) as u32;
    patch_cd_offset(&mut final_apk, new_eocd_start, new_cd_start);

    Ok(final_apk)
}
