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

use std::{io, rc::Rc};

use deku::prelude::*;
use rsa::pkcs8;
use zip::result::ZipError;

pub mod der;

/// Common error type making it easier to share `Result`s between SEAL crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum SealError {
    /// seal-cli encountered an error while processing something specific to
    /// the command line implementation. For example, not enough arguments
    /// were passed via the shell.
    Cli(String),
    /// No End Of Central Directory record was found within the trailer
    /// window of the ZIP file. The buffer is not a ZIP file, or it is
    /// truncated.
    ZipEocdMissing,
    /// A central directory record did not start with the expected
    /// `0x02014b50` signature. The offset is where the record was expected.
    ZipBadCentralDirectory { offset: usize },
    /// A local file header did not start with the expected `0x04034b50`
    /// signature. The offset is where the header was expected.
    ZipBadLocalHeader { offset: usize },
    /// A ZIP structure extended past the end of the buffer.
    ZipTruncated { offset: usize },
    /// The container uses ZIP64 sentinels (`0xFFFF` entry count or
    /// `0xFFFFFFFF` sizes/offsets). SEAL only supports 32-bit containers
    /// and refuses to guess rather than silently truncate.
    Zip64Unsupported,
    /// The entry count changed across a rewrite that must preserve it.
    /// **If you experience this, it is considered an internal bug in SEAL.
    /// Please report it.**
    ZipEntryCountMismatch { before: usize, after: usize },
    /// The assembled APK Signing Block did not match the size predicted
    /// before digesting, which would embed a stale EOCD offset in the
    /// signature.
    /// **If you experience this, it is considered an internal bug in SEAL.
    /// Please report it.**
    SigningBlockSizeMismatch { predicted: usize, actual: usize },
    /// `seal-zip` failed to read or rewrite a zip file in-memory.
    ZipRewriteFailed(Rc<ZipError>),
    /// A structure inside an ASN.1 DER document (certificate, PKCS#7,
    /// PKCS#12) could not be walked. The offset is relative to the start
    /// of the document.
    DerParsingFailed { offset: usize },
    /// An error occurred while a package or keystore record was written to
    /// or read from disk.
    FileIoError(Rc<io::Error>),
    /// The binary signing block structures couldn't be serialised. See
    /// [DekuError].
    ByteSerialisationFailed(DekuError),
    /// An error occurred while trying to instantiate a `Keys` object from a
    /// `.pem` string.
    PemParsingFailed(Rc<pem::PemError>),
    /// The `.pem` file or PKCS#12 container was valid, but it was missing
    /// either a certificate or private key.
    NoKeys,
    /// The `PRIVATE KEY` material was present, but it wasn't an RSA
    /// private key.
    RsaPrivateKeyParsingFailed(pkcs8::Error),
    /// An error occurred while signing a hash, see [rsa::Error].
    RsaSigningFailed(Rc<rsa::Error>),
    /// An error occurred while serialising the RSA key, see
    /// [pkcs8::spki::Error].
    RsaKeySerialisationFailed(pkcs8::spki::Error),
    /// Self-signed certificate generation failed.
    CertificateGenerationFailed(String),
    /// The PKCS#12 container parsed, but its encrypted bags could not be
    /// decrypted with the supplied password.
    KeystoreWrongPassword,
    /// The keystore bytes are not a decodable PKCS#12 container.
    KeystoreCorrupt(String),
    /// The keystore is in a recognised but unsupported container format,
    /// e.g. a legacy JKS keystore. The message explains what was detected
    /// and what to convert it with.
    KeystoreUnsupportedFormat(String),
    /// The persisted keystore record couldn't be decoded as JSON.
    KeystoreRecordCorrupt(Rc<serde_json::Error>),
    /// Base64 content inside a persisted keystore record was invalid.
    Base64DecodingFailed(base64::DecodeError),
    /// A signed APK failed in-process signature verification. Only
    /// produced by the verification helpers used in tests and tooling.
    SignatureVerificationFailed(String),
}

/// Result type where the error is always [SealError].
pub type Result<T> = std::result::Result<T, SealError>;

/// Broad classification of a [SealError], so a caller rendering failures
/// can distinguish "try another password" from "this file is corrupt" from
/// "this is a SEAL bug" without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or unsupported input. Retrying the same bytes won't help.
    Format,
    /// A cryptographic operation failed, most commonly a wrong password.
    Crypto,
    /// An internal consistency check failed. Indicates a SEAL bug; no
    /// artifact was produced.
    Invariant,
    /// The surrounding filesystem failed, not the input itself.
    Io,
}

impl SealError {
    pub fn category(&self) -> ErrorCategory {
        use SealError::*;
        match self {
            ZipEocdMissing
            | ZipBadCentralDirectory { .. }
            | ZipBadLocalHeader { .. }
            | ZipTruncated { .. }
            | Zip64Unsupported
            | ZipRewriteFailed(_)
            | DerParsingFailed { .. }
            | PemParsingFailed(_)
            | NoKeys
            | KeystoreCorrupt(_)
            | KeystoreUnsupportedFormat(_)
            | KeystoreRecordCorrupt(_)
            | Base64DecodingFailed(_)
            | Cli(_) => ErrorCategory::Format,
            KeystoreWrongPassword
            | RsaPrivateKeyParsingFailed(_)
            | RsaSigningFailed(_)
            | RsaKeySerialisationFailed(_)
            | CertificateGenerationFailed(_)
            | SignatureVerificationFailed(_) => ErrorCategory::Crypto,
            ZipEntryCountMismatch { .. }
            | SigningBlockSizeMismatch { .. }
            | ByteSerialisationFailed(_) => ErrorCategory::Invariant,
            FileIoError(_) => ErrorCategory::Io,
        }
    }
}

/// This makes it easier for Result<Something, SealError> to be returned
/// across FFI-ish seams that only carry strings.
impl From<SealError> for String {
    fn from(value: SealError) -> Self {
        format!("{:?}", value)
    }
}

// Automatic conversion from other types of error to SealError makes the rest of the code cleaner
impl From<io::Error> for SealError {
    fn from(value: io::Error) -> Self {
        SealError::FileIoError(value.into())
    }
}

impl From<DekuError> for SealError {
    fn from(value: DekuError) -> Self {
        SealError::ByteSerialisationFailed(value)
    }
}

impl From<ZipError> for SealError {
    fn from(value: ZipError) -> Self {
        SealError::ZipRewriteFailed(value.into())
    }
}

impl From<pem::PemError> for SealError {
    fn from(value: pem::PemError) -> Self {
        SealError::PemParsingFailed(value.into())
    }
}

impl From<pkcs8::Error> for SealError {
    fn from(value: pkcs8::Error) -> Self {
        SealError::RsaPrivateKeyParsingFailed(value)
    }
}

impl From<rsa::Error> for SealError {
    fn from(value: rsa::Error) -> Self {
        SealError::RsaSigningFailed(value.into())
    }
}

impl From<pkcs8::spki::Error> for SealError {
    fn from(value: pkcs8::spki::Error) -> Self {
        SealError::RsaKeySerialisationFailed(value)
    }
}

impl From<serde_json::Error> for SealError {
    fn from(value: serde_json::Error) -> Self {
        SealError::KeystoreRecordCorrupt(value.into())
    }
}

impl From<base64::DecodeError> for SealError {
    fn from(value: base64::DecodeError) -> Self {
        SealError::Base64DecodingFailed(value)
    }
}
