//! 쿼리 문자열 서명 확인.

use anyhow::{anyhow, Result};
use broker_exchange::{sign_query, QueryParams};

/// 쿼리 문자열을 정규화 규칙으로 검증한 뒤 서명합니다.
///
/// 입력 순서를 그대로 유지하며, 인코딩이 필요한 값이 있으면 거부합니다.
pub fn sign(secret: &str, query: &str) -> Result<String> {
    let params = parse_query(query)?;
    let canonical = params.to_canonical_string()?;
    Ok(sign_query(secret, &canonical)?)
}

fn parse_query(query: &str) -> Result<QueryParams> {
    let mut params = QueryParams::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Malformed parameter (expected key=value): {}", pair))?;
        params.push(key, value);
    }
    Ok(params)
}
