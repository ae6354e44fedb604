//! 설정 관리.
//!
//! 파일(TOML)과 `BROKER__` 접두사 환경 변수에서 브로커 설정을 로드합니다.
//! 마스터 키는 이 구조체를 통해 시작 시 한 번만 해석됩니다.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 마스터 키 폴백 환경 변수.
pub const MASTER_KEY_ENV: &str = "ENCRYPTION_MASTER_KEY";

/// 브로커 설정.
#[derive(Debug, Default, Deserialize)]
pub struct BrokerConfig {
    /// 암호화 설정
    #[serde(default)]
    pub encryption: EncryptionSettings,
    /// 거래소 REST 설정
    #[serde(default)]
    pub exchange: ExchangeSettings,
    /// 응답 캐시 설정
    #[serde(default)]
    pub cache: CacheSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// 암호화 설정.
///
/// `Debug` 출력에서 마스터 키는 가려집니다.
#[derive(Debug, Default, Deserialize)]
pub struct EncryptionSettings {
    /// 마스터 키 재료 (길이 무관, 32바이트로 정규화됨)
    #[serde(default)]
    pub master_key: Option<SecretString>,
}

impl EncryptionSettings {
    /// 키 재료로 직접 생성 (테스트, CLI 용).
    pub fn with_master_key(material: impl Into<String>) -> Self {
        Self {
            master_key: Some(SecretString::new(material.into().into_boxed_str())),
        }
    }
}

/// 거래소 REST 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    /// REST 기본 URL 오버라이드
    #[serde(default)]
    pub rest_base_url: Option<String>,
    /// 테스트넷 사용
    #[serde(default)]
    pub testnet: bool,
    /// 수신 윈도우 (밀리초)
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// 수신 윈도우에 더하는 네트워크 여유 시간 (밀리초)
    #[serde(default = "default_network_allowance")]
    pub network_allowance_ms: u64,
    /// API 키 헤더 이름
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

fn default_recv_window() -> u64 {
    5000
}
fn default_network_allowance() -> u64 {
    2000
}
fn default_api_key_header() -> String {
    "X-MBX-APIKEY".to_string()
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_base_url: None,
            testnet: false,
            recv_window_ms: default_recv_window(),
            network_allowance_ms: default_network_allowance(),
            api_key_header: default_api_key_header(),
        }
    }
}

impl ExchangeSettings {
    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match &self.rest_base_url {
            Some(url) => url.as_str(),
            None if self.testnet => "https://testnet.binancefuture.com",
            None => "https://fapi.binance.com",
        }
    }

    /// HTTP 요청 타임아웃 (수신 윈도우 + 네트워크 여유).
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_window_ms + self.network_allowance_ms)
    }
}

/// 응답 캐시 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// 캐시 항목 유효 시간 (초)
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// 만료 항목 정리 주기 (초)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// 같은 사용자의 동시 요청을 하나의 upstream 호출로 합침
    #[serde(default = "default_true")]
    pub dedupe_in_flight: bool,
    /// 다중 인스턴스 배포용 Redis URL
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_ttl() -> u64 {
    8
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            dedupe_in_flight: true,
            redis_url: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// 로그 레벨
    #[serde(default = "default_level")]
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl BrokerConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(Self::env_source());

        Self::finish(builder.build()?)
    }

    /// TOML 문자열에서 설정을 로드합니다.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/broker.toml")
    }

    /// 환경 변수 값은 문자열 그대로 전달됩니다.
    ///
    /// 숫자와 불리언 필드는 역직렬화 단계에서 변환되므로, 숫자처럼 보이는
    /// 마스터 키(`007123` 등)도 앞자리 0을 잃지 않습니다.
    fn env_source() -> config::Environment {
        config::Environment::with_prefix("BROKER").separator("__")
    }

    fn finish(config: config::Config) -> Result<Self, config::ConfigError> {
        let mut broker: BrokerConfig = config.try_deserialize()?;

        if broker.encryption.master_key.is_none() {
            if let Ok(material) = std::env::var(MASTER_KEY_ENV) {
                if !material.is_empty() {
                    broker.encryption = EncryptionSettings::with_master_key(material);
                }
            }
        }

        Ok(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();

        assert!(config.encryption.master_key.is_none());
        assert_eq!(config.exchange.rest_base_url(), "https://fapi.binance.com");
        assert_eq!(config.exchange.recv_window_ms, 5000);
        assert_eq!(config.exchange.request_timeout(), Duration::from_millis(7000));
        assert_eq!(config.cache.ttl(), Duration::from_secs(8));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(30));
        assert!(config.cache.dedupe_in_flight);
    }

    #[test]
    fn test_from_toml() {
        let config = BrokerConfig::from_toml_str(
            r#"
            [encryption]
            master_key = "from-file"

            [exchange]
            testnet = true
            recv_window_ms = 3000

            [cache]
            ttl_secs = 4
            "#,
        )
        .unwrap();

        let key = config.encryption.master_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "from-file");
        assert_eq!(
            config.exchange.rest_base_url(),
            "https://testnet.binancefuture.com"
        );
        assert_eq!(config.exchange.recv_window_ms, 3000);
        assert_eq!(config.exchange.api_key_header, "X-MBX-APIKEY");
        assert_eq!(config.cache.ttl_secs, 4);
        assert_eq!(config.cache.sweep_interval_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_debug_hides_master_key() {
        let settings = EncryptionSettings::with_master_key("do-not-print-me");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("do-not-print-me"));
    }

    #[test]
    fn test_env_master_key_kept_verbatim() {
        std::env::set_var("BROKER__ENCRYPTION__MASTER_KEY", "007123");
        std::env::set_var("BROKER__EXCHANGE__RECV_WINDOW_MS", "2500");
        std::env::set_var("BROKER__CACHE__DEDUPE_IN_FLIGHT", "false");

        let loaded = BrokerConfig::load("/nonexistent/broker.toml");

        std::env::remove_var("BROKER__ENCRYPTION__MASTER_KEY");
        std::env::remove_var("BROKER__EXCHANGE__RECV_WINDOW_MS");
        std::env::remove_var("BROKER__CACHE__DEDUPE_IN_FLIGHT");

        let config = loaded.unwrap();
        let key = config.encryption.master_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "007123");
        assert_eq!(config.exchange.recv_window_ms, 2500);
        assert!(!config.cache.dedupe_in_flight);
    }

    #[test]
    fn test_base_url_override() {
        let settings = ExchangeSettings {
            rest_base_url: Some("http://127.0.0.1:9000".to_string()),
            testnet: true,
            ..Default::default()
        };
        assert_eq!(settings.rest_base_url(), "http://127.0.0.1:9000");
    }
}
