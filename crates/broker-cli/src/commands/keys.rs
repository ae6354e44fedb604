//! 마스터 키와 저장 값 관리 명령.

use anyhow::{bail, Context, Result};
use broker_core::crypto::generate_master_key;
use broker_core::{
    migrate_value, probe_stored_value, AmbiguousPolicy, EncryptedCredentials, EnvelopeCipher,
    ExchangeCredentials, MigrationOutcome, StoredValueKind,
};
use tracing::info;

/// 새 마스터 키 재료 (base64).
pub fn generate_key() -> String {
    generate_master_key()
}

/// 값 암호화.
///
/// `json`이면 입력을 JSON으로 검증한 뒤 직렬화된 형태로 암호화합니다.
pub fn encrypt(cipher: &EnvelopeCipher, plaintext: &str, json: bool) -> Result<String> {
    if json {
        let value: serde_json::Value =
            serde_json::from_str(plaintext).context("Input is not valid JSON")?;
        return Ok(cipher.encrypt_json(&value)?);
    }
    Ok(cipher.encrypt(plaintext)?)
}

/// blob 복호화.
pub fn decrypt(cipher: &EnvelopeCipher, blob: &str) -> Result<String> {
    cipher
        .decrypt(blob)
        .context("Decryption failed (wrong key or corrupted value)")
}

/// 저장 값 판정 결과를 사람이 읽을 수 있는 문자열로.
pub fn probe(cipher: &EnvelopeCipher, value: &str) -> &'static str {
    match probe_stored_value(cipher, value) {
        StoredValueKind::Encrypted => "encrypted",
        StoredValueKind::Plaintext => "plaintext",
        StoredValueKind::Ambiguous => "ambiguous",
    }
}

/// 레거시 평문 값 마이그레이션.
///
/// 이미 암호화된 값이면 `None`을 반환합니다.
pub fn migrate(
    cipher: &EnvelopeCipher,
    value: &str,
    treat_ambiguous_as_plaintext: bool,
) -> Result<Option<String>> {
    let policy = if treat_ambiguous_as_plaintext {
        AmbiguousPolicy::TreatAsPlaintext
    } else {
        AmbiguousPolicy::Reject
    };

    match migrate_value(cipher, value, policy)? {
        MigrationOutcome::AlreadyEncrypted => {
            info!("Value is already encrypted under the current key");
            Ok(None)
        }
        MigrationOutcome::Migrated(blob) => Ok(Some(blob)),
    }
}

/// API 키 쌍을 저장 형태(JSON)로 봉인.
pub fn seal(cipher: &EnvelopeCipher, api_key: &str, api_secret: &str) -> Result<String> {
    if api_key.is_empty() || api_secret.is_empty() {
        bail!("API key and secret must not be empty");
    }

    let credentials = ExchangeCredentials::new(api_key, api_secret);
    let sealed = EncryptedCredentials::seal(cipher, &credentials)?;
    Ok(serde_json::to_string_pretty(&sealed)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::MasterKey;

    fn cipher() -> EnvelopeCipher {
        EnvelopeCipher::new(&MasterKey::from_material("cli-test-master-key").unwrap())
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = cipher();
        let blob = encrypt(&cipher, "my-api-secret", false).unwrap();
        assert_eq!(decrypt(&cipher, &blob).unwrap(), "my-api-secret");
        assert_eq!(probe(&cipher, &blob), "encrypted");
    }

    #[test]
    fn test_encrypt_json_validates_input() {
        let cipher = cipher();
        assert!(encrypt(&cipher, "{not json", true).is_err());

        let blob = encrypt(&cipher, r#"{"api_key":"k"}"#, true).unwrap();
        let value: serde_json::Value = cipher.decrypt_json(&blob).unwrap();
        assert_eq!(value["api_key"], "k");
    }

    #[test]
    fn test_migrate() {
        let cipher = cipher();
        let blob = migrate(&cipher, "legacy-secret", false).unwrap().unwrap();
        assert_eq!(decrypt(&cipher, &blob).unwrap(), "legacy-secret");
        assert!(migrate(&cipher, &blob, false).unwrap().is_none());
    }

    #[test]
    fn test_seal_round_trip() {
        let cipher = cipher();
        let json = seal(&cipher, "key", "secret").unwrap();
        let sealed: EncryptedCredentials = serde_json::from_str(&json).unwrap();
        let opened = sealed.open(&cipher).unwrap();
        assert_eq!(opened.api_key, "key");
        assert_eq!(opened.secret(), "secret");

        assert!(seal(&cipher, "", "secret").is_err());
    }

    #[test]
    fn test_generated_key_is_usable() {
        let material = generate_key();
        assert!(MasterKey::from_material(&material).is_ok());
    }
}
