//! # Broker Core
//!
//! 자격증명 브로커의 기반 크레이트입니다.
//!
//! - 봉투 암호화 (AES-256-GCM, 단일 마스터 키)
//! - 거래소 자격증명 레코드와 레거시 평문 마이그레이션
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod migration;

pub use self::config::*;
pub use credentials::{EncryptedCredentials, ExchangeCredentials};
pub use crypto::{CredentialCipher, EnvelopeCipher, MasterKey};
pub use error::*;
pub use logging::*;
pub use migration::{
    migrate_value, probe_stored_value, AmbiguousPolicy, MigrationOutcome, StoredValueKind,
};
