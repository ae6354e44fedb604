//! 거래소 자격증명 레코드.
//!
//! 저장소에는 `EncryptedCredentials`(두 개의 blob)만 기록되고,
//! 복호화된 `ExchangeCredentials`는 요청 처리 동안에만 메모리에 존재합니다.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::CredentialCipher;
use crate::error::CryptoResult;

/// 복호화된 거래소 API 키 쌍.
///
/// # 보안
/// - `Debug` 구현은 API 키를 마스킹하고 시크릿은 출력하지 않습니다.
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

impl ExchangeCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::new(api_secret.into().into_boxed_str()),
        }
    }

    /// 시크릿 원문 참조 (서명 계산 전용).
    pub fn secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}

/// 저장소에 기록되는 암호화된 자격증명.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredentials {
    /// API 키 blob
    pub api_key: String,
    /// API 시크릿 blob
    pub api_secret: String,
}

impl EncryptedCredentials {
    /// 평문 자격증명을 암호화하여 저장 형태로 변환.
    pub fn seal(
        cipher: &dyn CredentialCipher,
        credentials: &ExchangeCredentials,
    ) -> CryptoResult<Self> {
        Ok(Self {
            api_key: cipher.encrypt(&credentials.api_key)?,
            api_secret: cipher.encrypt(credentials.secret())?,
        })
    }

    /// 저장된 blob을 복호화.
    ///
    /// 둘 중 하나라도 실패하면 자격증명 전체를 사용할 수 없는 것으로 취급합니다.
    pub fn open(&self, cipher: &dyn CredentialCipher) -> CryptoResult<ExchangeCredentials> {
        let api_key = cipher.decrypt(&self.api_key)?;
        let api_secret = cipher.decrypt(&self.api_secret)?;
        Ok(ExchangeCredentials::new(api_key, api_secret))
    }
}

/// API 키 마스킹.
///
/// # Examples
/// ```
/// use broker_core::credentials::mask_api_key;
///
/// assert_eq!(mask_api_key("abcd1234efgh5678"), "abcd...5678");
/// assert_eq!(mask_api_key("short"), "*****");
/// ```
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
