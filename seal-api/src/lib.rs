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

//! # SEAL API
//!
//! This crate exposes the main public API through which other projects can
//! use SEAL's APK signing features: take unsigned APK bytes, produce
//! signed, aligned, installable APK bytes.
//!
//! ## Signing an APK
//!
//! ```no_run
//! use seal_api::{sign_apk, Keys};
//!
//! let unsigned = std::fs::read("app-unsigned.apk").unwrap();
//! let keys = Keys::generate("My App", "Example Org", "US", 25, "mykey").unwrap();
//! let signed = sign_apk(&unsigned, &keys).unwrap();
//! std::fs::write("app-signed.apk", signed).unwrap();
//! ```
//!
//! ## Persisting the signing identity
//!
//! Android refuses app updates signed with a different key, so the key
//! used for the first signing should be kept. [Keystore] stores one
//! identity as a password-protected PKCS#12 blob:
//!
//! ```no_run
//! use seal_api::{Keys, Keystore};
//!
//! let store = Keystore::open(std::path::Path::new("/home/me/.seal")).unwrap();
//! # let keys = Keys::generate("My App", "Example Org", "US", 25, "mykey").unwrap();
//! store.save(&keys, "passphrase").unwrap();
//! let keys_again = store.load("passphrase").unwrap();
//! ```
//!
//! Everything runs synchronously over in-memory buffers; callers with
//! large APKs should run [sign_apk] as one blocking call off their main
//! thread.

use tracing::info;

pub use seal_common::{ErrorCategory, Result, SealError};
pub use seal_keys::{export_pkcs12, import_pkcs12, Keys, Keystore, StoredKeyInfo};
pub use seal_sign::verify::verify_apk;
pub use seal_zip::zipalign;

/// Performs all the steps in signing an APK.
///
/// This includes:
///
///  - Adding a v1 (JAR) signature: manifest, signature file and PKCS#7
///    signature block entries under `META-INF/`
///  - Realigning every uncompressed entry to a 4-byte data offset
///  - Adding an APK Signature Scheme v2 signing block before the central
///    directory
///
/// The order matters: the v1 entries change the container so they must
/// land before alignment, and the v2 digest covers the aligned bytes so
/// it must come last.
///
/// Returns a new buffer; the input is left untouched. Signing the same
/// input with the same keys twice produces identical bytes.
pub fn sign_apk(unsigned_apk: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let v1_signed = seal_sign::add_v1_signature(unsigned_apk, keys)?;
    let aligned = zipalign(&v1_signed)?;
    let signed = seal_sign::sign_apk_buffer(&aligned, keys)?;
    info!(
        input_size = unsigned_apk.len(),
        output_size = signed.len(),
        "APK signed"
    );
    Ok(signed)
}
