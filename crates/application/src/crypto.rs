//! 第三方凭证的静态加密
//!
//! 需要落盘的第三方密钥（OAuth access/refresh token 等）统一经过这里加密，
//! 只在使用点解密。算法为 AES-256-GCM，密文格式为
//! `iv:authTag:ciphertext`（十六进制）。GCM 认证标签保证篡改检测：
//! 解密先验证标签，格式损坏或标签不符都会失败，绝不返回垃圾明文。

use std::num::NonZeroU32;

use data_encoding::HEXLOWER;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;

use config::EncryptionConfig;

/// 从主密钥派生时的 PBKDF2 迭代次数
const PBKDF2_ITERATIONS: u32 = 100_000;
/// 派生盐。密钥派生必须是确定性的（同一主密钥总是得到同一数据密钥），
/// 所以盐是固定的应用级常量而非随机值。
const KEY_DERIVATION_SALT: &[u8] = b"livechat.secret-cipher.v1";

/// 加解密错误
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid encryption key configuration: {0}")]
    KeyConfig(String),
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is malformed")]
    Malformed,
    #[error("decryption failed: authentication tag mismatch")]
    Decrypt,
}

/// 认证加密工具。无共享可变状态，加解密可任意并发。
pub struct SecretCipher {
    key: LessSafeKey,
}

impl SecretCipher {
    /// 优先使用显式配置的 256 位密钥；缺省时通过 PBKDF2 从主密钥派生。
    pub fn new(config: &EncryptionConfig) -> Result<Self, CryptoError> {
        let key_bytes = match (&config.key_hex, &config.master_secret) {
            (Some(hex), _) => {
                let decoded = HEXLOWER
                    .decode(hex.to_ascii_lowercase().as_bytes())
                    .map_err(|_| {
                        CryptoError::KeyConfig("encryption key is not valid hex".to_string())
                    })?;
                decoded.try_into().map_err(|_| {
                    CryptoError::KeyConfig("encryption key must be 32 bytes".to_string())
                })?
            }
            (None, Some(master)) => derive_key(master),
            (None, None) => {
                return Err(CryptoError::KeyConfig(
                    "no encryption key or master secret configured".to_string(),
                ))
            }
        };
        Self::from_key(key_bytes)
    }

    pub fn from_key(key_bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| CryptoError::KeyConfig("failed to build AES-256-GCM key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// 加密明文，返回 `iv:authTag:ciphertext`。每次调用生成新的随机 nonce，
    /// 同一明文两次加密产生不同密文。
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(format!(
            "{}:{}:{}",
            HEXLOWER.encode(&nonce_bytes),
            HEXLOWER.encode(tag.as_ref()),
            HEXLOWER.encode(&in_out)
        ))
    }

    /// 解密 `iv:authTag:ciphertext`。标签验证失败或格式损坏时报错。
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        let mut parts = value.splitn(3, ':');
        let (Some(iv_hex), Some(tag_hex), Some(ciphertext_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::Malformed);
        };

        let iv = decode_hex(iv_hex)?;
        let tag = decode_hex(tag_hex)?;
        let ciphertext = decode_hex(ciphertext_hex)?;

        if iv.len() != NONCE_LEN || tag.len() != AES_256_GCM.tag_len() {
            return Err(CryptoError::Malformed);
        }

        let nonce = Nonce::try_assume_unique_for_key(&iv).map_err(|_| CryptoError::Malformed)?;
        let mut in_out = ciphertext;
        in_out.extend_from_slice(&tag);

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::Decrypt)
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>, CryptoError> {
    HEXLOWER
        .decode(value.to_ascii_lowercase().as_bytes())
        .map_err(|_| CryptoError::Malformed)
}

/// 从主密钥确定性派生 256 位数据密钥
fn derive_key(master_secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("iterations is non-zero"),
        KEY_DERIVATION_SALT,
        master_secret.as_bytes(),
        &mut key,
    );
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::from_key([7u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        for plaintext in ["", "hello", "oauth-token-абв-你好-🔐"] {
            let encrypted = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_format() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("secret").unwrap();
        let parts: Vec<&str> = encrypted.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), AES_256_GCM.tag_len() * 2);
        assert!(parts
            .iter()
            .all(|p| p.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_nonce_never_reused() {
        let cipher = cipher();
        let a = cipher.encrypt("same plaintext").unwrap();
        let b = cipher.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.split(':').next(), b.split(':').next());
    }

    #[test]
    fn test_tampered_tag_rejected() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("secret").unwrap();
        let parts: Vec<&str> = encrypted.split(':').collect();

        let mut tag: Vec<char> = parts[1].chars().collect();
        tag[0] = if tag[0] == '0' { '1' } else { '0' };
        let tampered_tag: String = tag.into_iter().collect();

        let tampered = format!("{}:{}:{}", parts[0], tampered_tag, parts[2]);
        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("secret payload").unwrap();
        let parts: Vec<&str> = encrypted.split(':').collect();

        let mut body: Vec<char> = parts[2].chars().collect();
        body[0] = if body[0] == '0' { '1' } else { '0' };
        let tampered_body: String = body.into_iter().collect();

        let tampered = format!("{}:{}:{}", parts[0], parts[1], tampered_body);
        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn test_malformed_input_rejected() {
        let cipher = cipher();
        for input in ["", "abc", "aa:bb", "zz:zz:zz", "aa:bb:cc:dd-extra"] {
            assert!(
                matches!(cipher.decrypt(input), Err(CryptoError::Malformed)),
                "input {:?} should be malformed",
                input
            );
        }
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let config = EncryptionConfig {
            key_hex: None,
            master_secret: Some("master".to_string()),
        };
        let a = SecretCipher::new(&config).unwrap();
        let b = SecretCipher::new(&config).unwrap();

        let encrypted = a.encrypt("shared secret").unwrap();
        assert_eq!(b.decrypt(&encrypted).unwrap(), "shared secret");
    }

    #[test]
    fn test_explicit_key_configuration() {
        let config = EncryptionConfig {
            key_hex: Some("ab".repeat(32)),
            master_secret: None,
        };
        let cipher = SecretCipher::new(&config).unwrap();
        let encrypted = cipher.encrypt("x").unwrap();
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "x");

        let bad = EncryptionConfig {
            key_hex: Some("abcd".to_string()),
            master_secret: None,
        };
        assert!(matches!(
            SecretCipher::new(&bad),
            Err(CryptoError::KeyConfig(_))
        ));
    }
}
