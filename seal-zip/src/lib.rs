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

//! Byte-level access to ZIP containers: locating and walking the central
//! directory, patching offsets, realigning stored entries (zipalign) and
//! rewriting entry sets.
//!
//! 32-bit ZIP only. Containers that need ZIP64 fail fast rather than
//! being silently truncated.

mod align;
mod parser;
mod rewrite;

pub use align::{data_start, zipalign, ALIGNMENT};
pub use parser::{locate_eocd, parse, patch_cd_offset, Layout, ZipEntry};
pub use rewrite::{is_signature_metadata, read_files, strip_and_append};

/// One file to be placed into (or read out of) a container.
pub struct File {
    pub path: String,
    pub data: Vec<u8>,
}
