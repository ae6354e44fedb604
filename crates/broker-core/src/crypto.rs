//! # 봉투 암호화 모듈
//!
//! AES-256-GCM으로 거래소 API 키/시크릿, TOTP 시드 같은 비밀 문자열을
//! 저장 가능한 단일 문자열로 변환합니다.
//!
//! ## Blob 형식
//! `base64( nonce(12) || ciphertext || tag(16) )`
//!
//! ## 보안 고려사항
//! - 마스터 키는 시작 시 한 번 설정에서 해석되어 주입됨 (호출마다 환경변수 읽지 않음)
//! - 각 암호화마다 고유한 nonce (12바이트) 사용
//! - 태그 검증 실패 시 항상 에러 반환, 손상된 평문을 돌려주지 않음

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::config::EncryptionSettings;
use crate::error::{CryptoError, CryptoResult};

/// AES-256-GCM nonce 크기 (바이트)
pub const NONCE_SIZE: usize = 12;

/// AES-256 키 크기 (바이트)
pub const KEY_SIZE: usize = 32;

/// GCM 인증 태그 크기 (바이트)
pub const TAG_SIZE: usize = 16;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// 프로세스 전역 마스터 키.
///
/// 설정 값을 32바이트로 자르거나 0으로 채워 만듭니다.
/// 키 바이트는 drop 시 zeroize 됩니다.
pub struct MasterKey(SecretBox<[u8; KEY_SIZE]>);

impl MasterKey {
    /// 운영자가 제공한 키 재료로 마스터 키 생성.
    ///
    /// 32바이트보다 길면 잘라내고, 짧으면 뒤를 0으로 채웁니다.
    pub fn from_material(material: &str) -> CryptoResult<Self> {
        if material.is_empty() {
            return Err(CryptoError::Configuration(
                "master key material is empty".to_string(),
            ));
        }

        let mut bytes = Box::new([0u8; KEY_SIZE]);
        let source = material.as_bytes();
        let len = source.len().min(KEY_SIZE);
        bytes[..len].copy_from_slice(&source[..len]);

        Ok(Self(SecretBox::new(bytes)))
    }

    /// 암호화 설정에서 마스터 키 해석.
    pub fn from_settings(settings: &EncryptionSettings) -> CryptoResult<Self> {
        let material = settings
            .master_key
            .as_ref()
            .ok_or_else(|| CryptoError::Configuration("master key not configured".to_string()))?;

        Self::from_material(material.expose_secret())
    }

    fn bytes(&self) -> &[u8; KEY_SIZE] {
        self.0.expose_secret()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(***REDACTED***)")
    }
}

/// 비밀 문자열 암호화/복호화 인터페이스.
///
/// 테스트에서는 가짜 구현을 주입할 수 있습니다.
pub trait CredentialCipher: Send + Sync {
    /// 평문을 저장 가능한 blob으로 암호화.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// blob을 복호화하여 원래 평문 반환.
    fn decrypt(&self, blob: &str) -> CryptoResult<String>;
}

/// AES-256-GCM 봉투 암호기.
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("suite", &"AES-256-GCM")
            .finish()
    }
}

impl EnvelopeCipher {
    /// 마스터 키로 암호기 생성.
    ///
    /// # Example
    /// ```
    /// use broker_core::crypto::{EnvelopeCipher, MasterKey};
    ///
    /// let key = MasterKey::from_material("operator-supplied-key").unwrap();
    /// let cipher = EnvelopeCipher::new(&key);
    /// let blob = cipher.encrypt("AKIAEXAMPLE123").unwrap();
    /// assert_eq!(cipher.decrypt(&blob).unwrap(), "AKIAEXAMPLE123");
    /// ```
    pub fn new(master_key: &MasterKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(master_key.bytes());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// 설정에서 바로 암호기 생성.
    ///
    /// 마스터 키가 없으면 `CryptoError::Configuration`을 반환합니다.
    pub fn from_settings(settings: &EncryptionSettings) -> CryptoResult<Self> {
        let key = MasterKey::from_settings(settings)?;
        Ok(Self::new(&key))
    }

    /// 랜덤 nonce 생성
    pub fn generate_nonce() -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// 문자열 암호화.
    ///
    /// # Returns
    /// * `nonce || ciphertext+tag`를 base64 인코딩한 문자열
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce_bytes = Self::generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);

        Ok(BASE64.encode(blob))
    }

    /// blob 복호화.
    ///
    /// base64 형식 오류, 길이 부족, 태그 불일치는 모두 `CryptoError::Decryption`.
    pub fn decrypt(&self, blob: &str) -> CryptoResult<String> {
        let raw = BASE64.decode(blob)?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "blob too short: {} bytes, need at least {}",
                raw.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }

    /// JSON 암호화 (자격증명 구조체용)
    pub fn encrypt_json<T: serde::Serialize>(&self, data: &T) -> CryptoResult<String> {
        let json = serde_json::to_string(data)?;
        self.encrypt(&json)
    }

    /// 암호화된 JSON 복호화
    pub fn decrypt_json<T: serde::de::DeserializeOwned>(&self, blob: &str) -> CryptoResult<T> {
        let json = self.decrypt(blob)?;
        serde_json::from_str(&json).map_err(CryptoError::from)
    }
}

impl CredentialCipher for EnvelopeCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        EnvelopeCipher::encrypt(self, plaintext)
    }

    fn decrypt(&self, blob: &str) -> CryptoResult<String> {
        EnvelopeCipher::decrypt(self, blob)
    }
}

/// 새로운 마스터 키 재료 생성 (초기 설정용)
///
/// # Example
/// ```
/// let key = broker_core::crypto::generate_master_key();
/// println!("ENCRYPTION_MASTER_KEY={}", key);
/// ```
pub fn generate_master_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}
