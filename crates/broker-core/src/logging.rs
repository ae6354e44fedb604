//! tracing 구독자 초기화.
//!
//! 로그는 표준 에러로 출력되며 표준 출력은 명령 결과에 사용합니다.
//! 자격증명 관련 코드는 API 키 원문, 시크릿, 서명을 필드로 남기지 않습니다.

use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingSettings;

/// 초기화 실패.
pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

/// 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 여러 줄, 색상 (로컬 개발)
    #[default]
    Pretty,
    /// 한 줄 JSON (로그 수집기)
    Json,
    /// 한 줄 텍스트
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unsupported log format '{}'", other)),
        }
    }
}

/// 구독자 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` 지시어 (예: `info,broker_exchange=debug`)
    pub filter: String,
    pub format: LogFormat,
    /// span 진입/종료 이벤트 기록
    pub span_events: bool,
    /// 소스 파일과 줄 번호 기록
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            format: LogFormat::default(),
            span_events: false,
            source_location: false,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// `[logging]` 섹션에서 생성. 알 수 없는 형식은 기본값(pretty)으로 대체.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self::new(settings.level.clone()).with_format(settings.format.parse().unwrap_or_default())
    }

    /// `RUST_LOG`, `LOG_FORMAT` 환경 변수에서 생성.
    pub fn from_env() -> Self {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self::new(filter).with_format(format)
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = match self.span_events {
            true => FmtSpan::NEW | FmtSpan::CLOSE,
            false => FmtSpan::NONE,
        };

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(spans)
            .with_file(self.source_location)
            .with_line_number(self.source_location);

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }
}

/// 전역 구독자 설치.
///
/// `RUST_LOG`가 있으면 `config.filter`보다 우선합니다. 두 번째 호출은 에러입니다.
///
/// ```no_run
/// use broker_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig::new("debug").with_format(LogFormat::Json)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    tracing_subscriber::registry()
        .with(config.layer().with_filter(filter))
        .try_init()?;

    tracing::debug!(format = ?config.format, filter = %config.filter, "Logging initialized");
    Ok(())
}

/// `RUST_LOG` / `LOG_FORMAT`만으로 초기화.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(LogConfig::from_env())
}
