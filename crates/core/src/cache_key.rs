//! Deterministic cache keys for validation requests.
//!
//! A key names every artifact stored for one request inside a project
//! namespace (`{key}.ifc`, `{key}.ids`, `{key}.json`), so it must be stable
//! across restarts and safe to use as a file name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters of the SHA-256 digest kept by [`KeyScheme::Digest`].
const DIGEST_HEX_LEN: usize = 32;

/// Longest filename stem kept in front of the digest.
const DIGEST_STEM_MAX: usize = 64;

/// How a [`CacheKey`] is derived from request metadata.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// `{filename}_{spec}_{upload_date}_{file_size}` with every character
    /// outside `[A-Za-z0-9]` replaced by `_`.
    ///
    /// Tuples that differ only in punctuation map to the same key
    /// (`a.ifc` and `a-ifc` both become `a_ifc`).
    #[default]
    Sanitized,
    /// Sanitized filename, cut to 64 characters, followed by a SHA-256
    /// prefix over the full tuple.
    Digest,
}

/// Request metadata a key is derived from.
#[derive(Debug, Clone, Copy)]
pub struct KeyInputs<'a> {
    pub filename: &'a str,
    pub spec_filename: Option<&'a str>,
    pub upload_date: &'a str,
    pub file_size: &'a str,
}

/// Filesystem-safe identifier for one validation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `inputs` under `scheme`.
    pub fn derive(scheme: KeyScheme, inputs: &KeyInputs<'_>) -> Self {
        match scheme {
            KeyScheme::Sanitized => {
                let mut raw = String::from(inputs.filename);
                if let Some(spec) = inputs.spec_filename {
                    raw.push('_');
                    raw.push_str(spec);
                }
                raw.push('_');
                raw.push_str(inputs.upload_date);
                raw.push('_');
                raw.push_str(inputs.file_size);
                Self(sanitize(&raw))
            }
            KeyScheme::Digest => {
                let mut hasher = Sha256::new();
                update_field(&mut hasher, inputs.filename);
                match inputs.spec_filename {
                    Some(spec) => {
                        hasher.update([1u8]);
                        update_field(&mut hasher, spec);
                    }
                    None => hasher.update([0u8]),
                }
                update_field(&mut hasher, inputs.upload_date);
                update_field(&mut hasher, inputs.file_size);
                let digest = format!("{:x}", hasher.finalize());
                let mut stem = sanitize(inputs.filename);
                stem.truncate(DIGEST_STEM_MAX);
                Self(format!("{}_{}", stem, &digest[..DIGEST_HEX_LEN]))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace every character outside `[A-Za-z0-9]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn update_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
