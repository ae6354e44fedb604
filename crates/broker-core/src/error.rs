//! 자격증명 암호화 에러 타입.
//!
//! 암호화 계층에서 발생하는 모든 실패는 이 타입으로 호출자에게 전달됩니다.
//! 부분적으로 복호화된 값이 에러와 함께 반환되는 경우는 없습니다.

use thiserror::Error;

/// 암호화/복호화 에러.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// 마스터 키 누락 또는 사용 불가 (ConfigurationError)
    #[error("설정 에러: {0}")]
    Configuration(String),

    /// 태그 검증 실패, 잘못된 blob, 다른 키로 암호화된 데이터 (DecryptionError)
    #[error("복호화 실패: {0}")]
    Decryption(String),

    /// 암호화 실패
    #[error("암호화 실패: {0}")]
    Encryption(String),

    /// 자격증명 구조체 직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 암호화 작업을 위한 Result 타입.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl CryptoError {
    /// 저장된 자격증명을 더 이상 사용할 수 없는 에러인지 확인합니다.
    ///
    /// 이 경우 사용자에게 거래소 계정 재연결을 안내해야 합니다.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, CryptoError::Decryption(_))
    }

    /// 프로세스 설정 문제로 요청 전체를 실패시켜야 하는 에러인지 확인합니다.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, CryptoError::Configuration(_))
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::Decryption(format!("base64 디코딩 실패: {}", err))
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Serialization(err.to_string())
    }
}
