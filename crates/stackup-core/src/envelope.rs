use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, StackupError};

/// Envelope magic: "SBK" + format version byte.
const MAGIC: [u8; 4] = *b"SBK\x01";

const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 32;

/// KDF parameters stored in the envelope header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KdfParams {
    algorithm: String,
    time_cost: u32,
    memory_cost: u32,
    parallelism: u32,
    salt: Vec<u8>,
}

impl KdfParams {
    fn fresh() -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self {
            algorithm: "argon2id".to_string(),
            time_cost: 3,
            memory_cost: 65536, // 64 MiB
            parallelism: 4,
            salt,
        }
    }
}

/// Header prepended to the ciphertext. Serialized with msgpack and bound as
/// AAD so the KDF parameters cannot be swapped without detection.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    kdf: KdfParams,
    nonce: Vec<u8>,
}

/// Whether the file at `path` starts with the envelope magic.
pub fn is_envelope(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut prefix = [0u8; 4];
    match file.read_exact(&mut prefix) {
        Ok(()) => Ok(prefix == MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Encrypt `plain` into an envelope file at `sealed`, written atomically.
/// The plaintext file is left in place; callers decide when to remove it.
pub fn seal_file(plain: &Path, sealed: &Path, passphrase: &str) -> Result<()> {
    let plaintext = fs::read(plain)?;

    let kdf = KdfParams::fresh();
    let key = derive_key(passphrase, &kdf)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let header = EnvelopeHeader {
        kdf,
        nonce: nonce_bytes.to_vec(),
    };
    let header_bytes = rmp_serde::to_vec(&header)
        .map_err(|e| StackupError::EncryptionFailed(format!("header serialize: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| StackupError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: &header_bytes,
            },
        )
        .map_err(|e| StackupError::EncryptionFailed(format!("encrypt: {e}")))?;

    let dir = sealed.parent().ok_or_else(|| {
        StackupError::EncryptionFailed(format!("no parent directory for {}", sealed.display()))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&MAGIC)?;
    tmp.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
    tmp.write_all(&header_bytes)?;
    tmp.write_all(&ciphertext)?;
    tmp.persist(sealed).map_err(|e| e.error)?;
    Ok(())
}

/// Decrypt an envelope file into `plain_out`, written atomically.
/// Any authentication failure maps to [`StackupError::DecryptionFailed`].
pub fn open_file(sealed: &Path, plain_out: &Path, passphrase: &str) -> Result<()> {
    let data = fs::read(sealed)?;
    if data.len() < MAGIC.len() + 4 || data[..MAGIC.len()] != MAGIC {
        return Err(StackupError::InvalidFormat(format!(
            "{} is not an encrypted backup envelope",
            sealed.display()
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[MAGIC.len()..MAGIC.len() + 4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_start = MAGIC.len() + 4;
    let body_start = header_start
        .checked_add(header_len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            StackupError::InvalidFormat(format!(
                "truncated envelope header in {}",
                sealed.display()
            ))
        })?;

    let header_bytes = &data[header_start..body_start];
    let header: EnvelopeHeader =
        rmp_serde::from_slice(header_bytes).map_err(|_| StackupError::DecryptionFailed)?;
    if header.nonce.len() != NONCE_LEN {
        return Err(StackupError::DecryptionFailed);
    }

    let key = derive_key(passphrase, &header.kdf)?;
    let cipher =
        Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| StackupError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&header.nonce),
            Payload {
                msg: &data[body_start..],
                aad: header_bytes,
            },
        )
        .map_err(|_| StackupError::DecryptionFailed)?;

    let dir = plain_out.parent().ok_or_else(|| {
        StackupError::InvalidFormat(format!("no parent directory for {}", plain_out.display()))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&plaintext)?;
    tmp.persist(plain_out).map_err(|e| e.error)?;
    Ok(())
}

/// Derive a 32-byte wrapping key from a passphrase with Argon2id.
fn derive_key(passphrase: &str, kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    if kdf.algorithm != "argon2id" {
        return Err(StackupError::InvalidFormat(format!(
            "unsupported KDF algorithm: {}",
            kdf.algorithm
        )));
    }
    let params = argon2::Params::new(kdf.memory_cost, kdf.time_cost, kdf.parallelism, Some(32))
        .map_err(|e| StackupError::EncryptionFailed(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &kdf.salt, output.as_mut())
        .map_err(|e| StackupError::EncryptionFailed(format!("argon2 hash: {e}")))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data.tar.zst");
        let sealed = dir.path().join("data.tar.zst.enc");
        let out = dir.path().join("recovered.tar.zst");
        fs::write(&plain, b"archive bytes go here").unwrap();

        seal_file(&plain, &sealed, "correct horse").unwrap();
        assert!(is_envelope(&sealed).unwrap());
        assert!(!is_envelope(&plain).unwrap());

        open_file(&sealed, &out, "correct horse").unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"archive bytes go here");
    }

    #[test]
    fn wrong_passphrase_is_decryption_failed() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data");
        let sealed = dir.path().join("data.enc");
        fs::write(&plain, b"secret").unwrap();
        seal_file(&plain, &sealed, "right").unwrap();

        let err = open_file(&sealed, &dir.path().join("out"), "wrong").unwrap_err();
        assert!(matches!(err, StackupError::DecryptionFailed));
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data");
        let sealed = dir.path().join("data.enc");
        fs::write(&plain, b"secret").unwrap();
        seal_file(&plain, &sealed, "pass").unwrap();

        let mut bytes = fs::read(&sealed).unwrap();
        bytes.truncate(10);
        let cut = dir.path().join("cut.enc");
        fs::write(&cut, &bytes).unwrap();
        assert!(open_file(&cut, &dir.path().join("out"), "pass").is_err());
    }

    #[test]
    fn non_envelope_file_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.tar.zst");
        fs::write(&file, b"just a tarball").unwrap();
        let err = open_file(&file, &dir.path().join("out"), "pass").unwrap_err();
        assert!(matches!(err, StackupError::InvalidFormat(_)));
    }

    #[test]
    fn tampered_ciphertext_is_decryption_failed() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data");
        let sealed = dir.path().join("data.enc");
        fs::write(&plain, b"secret payload").unwrap();
        seal_file(&plain, &sealed, "pass").unwrap();

        let mut bytes = fs::read(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&sealed, &bytes).unwrap();

        let err = open_file(&sealed, &dir.path().join("out"), "pass").unwrap_err();
        assert!(matches!(err, StackupError::DecryptionFailed));
    }
}
