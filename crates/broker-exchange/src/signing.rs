//! 요청 서명.
//!
//! 서명 대상 문자열과 실제로 전송되는 문자열은 모두
//! [`QueryParams::to_canonical_string`] 하나에서 만들어집니다.
//!
//! 정규화 규칙은 **삽입 순서 유지**입니다. 키를 정렬하지 않으므로
//! `{a:1, b:2}`와 `{b:2, a:1}`은 서로 다른 문자열이 되고, 각각 독립적으로
//! 유효한 서명을 가집니다. 값은 인코딩하지 않고 그대로 보내므로
//! 인코딩이 필요한 문자는 서명 전에 거부합니다.

use broker_core::{ExchangeCredentials, ExchangeSettings};
use hmac::{Hmac, Mac};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256으로 정규화된 쿼리 문자열 서명.
///
/// 결과는 소문자 16진수 64자입니다.
pub fn sign_query(secret: &str, canonical_query: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signature(e.to_string()))?;
    mac.update(canonical_query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 순서가 보존되는 쿼리 파라미터 목록.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파라미터 추가 (빌더 형태).
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// 파라미터를 끝에 추가.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.push((key.into(), value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `key=value&...` 형식의 정규화된 쿼리 문자열.
    ///
    /// 키는 비어 있지 않은 ASCII 영숫자여야 하고, 값에는 `& = # % +`,
    /// 공백, 제어 문자, 비 ASCII 문자가 올 수 없습니다.
    pub fn to_canonical_string(&self) -> ExchangeResult<String> {
        let mut out = String::new();

        for (i, (key, value)) in self.pairs.iter().enumerate() {
            validate_key(key)?;
            validate_value(key, value)?;

            if i > 0 {
                out.push('&');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }

        Ok(out)
    }
}

fn validate_key(key: &str) -> ExchangeResult<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ExchangeError::Signature(format!(
            "invalid parameter name: {:?}",
            key
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> ExchangeResult<()> {
    let bad = value
        .chars()
        .find(|c| !c.is_ascii_graphic() || matches!(c, '&' | '=' | '#' | '%' | '+'));

    match bad {
        Some(c) => Err(ExchangeError::Signature(format!(
            "parameter {} contains character {:?} that would need encoding",
            key, c
        ))),
        None => Ok(()),
    }
}

/// 전송 준비가 끝난 서명된 요청.
///
/// 네트워크 I/O 없이 만들어지며, `Debug` 출력은 API 키를 마스킹합니다.
#[derive(Clone)]
pub struct SignedRequest {
    pub method: Method,
    /// 전체 URL (GET/DELETE는 서명 포함 쿼리까지)
    pub url: String,
    /// form 본문 (POST 전용)
    pub body: Option<String>,
    /// API 키 헤더 이름
    pub api_key_header: String,
    /// API 키 헤더 값
    pub api_key: String,
    /// 서명에 사용된 타임스탬프
    pub timestamp_ms: u64,
    /// 서명 (16진수)
    pub signature: String,
}

impl SignedRequest {
    /// 쿼리 문자열을 제외한 URL (로그용).
    pub fn endpoint(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint())
            .field("has_body", &self.body.is_some())
            .field("api_key_header", &self.api_key_header)
            .field("api_key", &broker_core::credentials::mask_api_key(&self.api_key))
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// 사용자 한 명의 API 키 쌍으로 요청을 서명하는 빌더.
pub struct RequestSigner {
    api_key: String,
    api_secret: SecretString,
    base_url: String,
    api_key_header: String,
    recv_window_ms: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &broker_core::credentials::mask_api_key(&self.api_key))
            .field("api_secret", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

impl RequestSigner {
    pub fn new(
        credentials: ExchangeCredentials,
        settings: &ExchangeSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            base_url: settings.rest_base_url().trim_end_matches('/').to_string(),
            api_key_header: settings.api_key_header.clone(),
            recv_window_ms: settings.recv_window_ms,
            clock,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recv_window_ms(&self) -> u64 {
        self.recv_window_ms
    }

    /// 이 사용자의 시크릿으로 쿼리 문자열 서명.
    pub fn sign(&self, canonical_query: &str) -> ExchangeResult<String> {
        sign_query(self.api_secret.expose_secret(), canonical_query)
    }

    /// 인증 요청 생성.
    ///
    /// `params` 뒤에 `timestamp`(현재 epoch 밀리초)와 `recvWindow`를 붙이고,
    /// 그 문자열 그대로 서명한 뒤 `signature`를 마지막에 추가합니다.
    /// GET/DELETE는 쿼리 문자열에, 그 외 메서드는 form 본문에 싣습니다.
    pub fn build_authenticated_request(
        &self,
        method: Method,
        path: &str,
        params: QueryParams,
    ) -> ExchangeResult<SignedRequest> {
        self.build_signed(method, path, params, true)
    }

    /// 주문 요청 생성 (POST form 본문).
    ///
    /// 본문은 `...&timestamp=..&signature=..` 형식이며 `recvWindow`를 포함하지 않습니다.
    pub fn build_order_request(
        &self,
        path: &str,
        params: QueryParams,
    ) -> ExchangeResult<SignedRequest> {
        self.build_signed(Method::POST, path, params, false)
    }

    fn build_signed(
        &self,
        method: Method,
        path: &str,
        mut params: QueryParams,
        include_recv_window: bool,
    ) -> ExchangeResult<SignedRequest> {
        let timestamp_ms = self.clock.now_ms();
        params.push("timestamp", timestamp_ms);
        if include_recv_window {
            params.push("recvWindow", self.recv_window_ms);
        }

        let query = params.to_canonical_string()?;
        let signature = self.sign(&query)?;
        let signed_query = format!("{}&signature={}", query, signature);
        let endpoint = format!("{}{}", self.base_url, path);

        let (url, body) = if method == Method::GET || method == Method::DELETE {
            (format!("{}?{}", endpoint, signed_query), None)
        } else {
            (endpoint, Some(signed_query))
        };

        Ok(SignedRequest {
            method,
            url,
            body,
            api_key_header: self.api_key_header.clone(),
            api_key: self.api_key.clone(),
            timestamp_ms,
            signature,
        })
    }
}
