//! 레거시 평문 자격증명 마이그레이션.
//!
//! 암호화 도입 이전에 저장된 평문 값과 이미 암호화된 blob을 구분합니다.
//! 구분은 휴리스틱입니다. 64자 영숫자 API 키처럼 평문이 우연히
//! 유효한 base64이면서 길이 조건도 만족할 수 있으므로, 이런 값은
//! 평문으로 단정하지 않고 `Ambiguous`로 보고합니다.

use base64::Engine;
use tracing::{debug, warn};

use crate::crypto::{CredentialCipher, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};

/// 저장된 값의 판정 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredValueKind {
    /// 현재 마스터 키로 복호화 성공
    Encrypted,
    /// blob 구조가 아님 (base64가 아니거나 너무 짧음)
    Plaintext,
    /// blob 구조이지만 인증 실패 (다른 키로 암호화됐거나 평문이 우연히 blob 형태)
    Ambiguous,
}

/// `Ambiguous` 값 처리 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousPolicy {
    /// 에러로 보고하고 운영자가 직접 확인
    #[default]
    Reject,
    /// 평문으로 간주하고 암호화
    TreatAsPlaintext,
}

/// 마이그레이션 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// 이미 암호화되어 있어 변경 없음
    AlreadyEncrypted,
    /// 새로 암호화된 blob (저장소에 기록해야 함)
    Migrated(String),
}

/// 저장된 값이 암호화된 blob인지 추측.
pub fn probe_stored_value(cipher: &dyn CredentialCipher, value: &str) -> StoredValueKind {
    let raw = match base64::engine::general_purpose::STANDARD.decode(value) {
        Ok(raw) => raw,
        Err(_) => return StoredValueKind::Plaintext,
    };

    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return StoredValueKind::Plaintext;
    }

    match cipher.decrypt(value) {
        Ok(_) => StoredValueKind::Encrypted,
        Err(_) => StoredValueKind::Ambiguous,
    }
}

/// 평문 값을 암호화하고, 기록 전에 새 blob이 원래 값으로 복호화되는지 검증합니다.
pub fn migrate_value(
    cipher: &dyn CredentialCipher,
    value: &str,
    policy: AmbiguousPolicy,
) -> CryptoResult<MigrationOutcome> {
    match probe_stored_value(cipher, value) {
        StoredValueKind::Encrypted => {
            debug!("Value already encrypted, skipping");
            Ok(MigrationOutcome::AlreadyEncrypted)
        }
        StoredValueKind::Ambiguous if policy == AmbiguousPolicy::Reject => {
            warn!("Value has blob shape but fails authentication, manual review required");
            Err(CryptoError::Decryption(
                "value looks encrypted but does not authenticate under the current key".to_string(),
            ))
        }
        StoredValueKind::Plaintext | StoredValueKind::Ambiguous => {
            let blob = cipher.encrypt(value)?;
            let check = cipher.decrypt(&blob)?;
            if check != value {
                return Err(CryptoError::Encryption(
                    "re-encrypted value failed verification".to_string(),
                ));
            }
            Ok(MigrationOutcome::Migrated(blob))
        }
    }
}
