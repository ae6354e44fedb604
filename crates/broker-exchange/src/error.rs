//! 거래소 에러 타입.

use broker_core::CryptoError;
use thiserror::Error;

/// 자격증명 거부를 의미하는 거래소 에러 코드.
///
/// - `-1022`: 서명 불일치
/// - `-2014`: API 키 형식 오류
/// - `-2015`: 잘못된 API 키, IP 또는 권한
const CREDENTIAL_REJECTION_CODES: [i64; 3] = [-1022, -2014, -2015];

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// upstream 비-2xx 응답 (UpstreamError)
    #[error("Upstream error {status}: {body}")]
    Upstream {
        /// HTTP 상태 코드
        status: u16,
        /// 거래소 에러 코드 (`{"code": .., "msg": ..}` 본문인 경우)
        code: Option<i64>,
        /// 응답 본문 원문
        body: String,
    },

    /// 요청 타임아웃 (UpstreamError)
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 네트워크/연결 에러 (UpstreamError)
    #[error("Network error: {0}")]
    Network(String),

    /// 정규화 불가능한 파라미터 (SignatureError)
    #[error("Signature error: {0}")]
    Signature(String),

    /// 잘못된 요청 인자 (예: 수량 0인 포지션 종료)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 캐시 백엔드 에러
    #[error("Cache error: {0}")]
    Cache(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 자격증명 복호화/설정 에러
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 응답 상태와 본문으로 upstream 에러 생성.
    ///
    /// 본문이 `{"code": .., "msg": ..}` 형식이면 거래소 코드를 함께 보관합니다.
    pub fn upstream(status: u16, body: String) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            code: i64,
        }

        let code = serde_json::from_str::<ErrorBody>(&body).ok().map(|e| e.code);
        ExchangeError::Upstream { status, code, body }
    }

    /// HTTP 상태 코드 (upstream 응답인 경우).
    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// upstream과의 통신 실패인지 확인 (UpstreamError 계열).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ExchangeError::Upstream { .. } | ExchangeError::Timeout(_) | ExchangeError::Network(_)
        )
    }

    /// 호출자가 (서명을 새로 만들어) 재시도해 볼 수 있는 에러인지 확인.
    ///
    /// 이 크레이트는 스스로 재시도하지 않습니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Timeout(_) | ExchangeError::Network(_) => true,
            ExchangeError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// 사용자를 "거래소 계정 재연결" 흐름으로 보내야 하는 에러인지 확인.
    pub fn requires_reconnect(&self) -> bool {
        match self {
            ExchangeError::Crypto(err) => err.is_credential_error(),
            ExchangeError::Upstream { status, code, .. } => {
                matches!(status, 401 | 403)
                    || code.is_some_and(|c| CREDENTIAL_REJECTION_CODES.contains(&c))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}
