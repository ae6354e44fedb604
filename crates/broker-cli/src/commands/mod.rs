//! CLI 명령어 구현 모듈.

pub mod account;
pub mod keys;
pub mod sign;

use anyhow::{Context, Result};
use std::io::Read;

/// 인자 값 또는 표준 입력에서 값 읽기.
///
/// 인자가 없거나 `-`이면 표준 입력을 읽어 쉘 기록에 비밀 값이 남지 않도록 합니다.
/// 끝의 줄바꿈은 제거합니다.
pub fn read_input(arg: Option<String>) -> Result<String> {
    match arg {
        Some(value) if value != "-" => Ok(value),
        _ => read_from(std::io::stdin().lock()),
    }
}

fn read_from<R: Read>(mut reader: R) -> Result<String> {
    let mut buffer = String::new();
    reader
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer.trim_end_matches(['\r', '\n']).to_string())
}
