//! 자격증명 브로커 운영 도구.
//!
//! - 마스터 키 생성
//! - 값 암호화/복호화, 레거시 평문 판정 및 마이그레이션
//! - 쿼리 서명 확인
//! - 계좌 스냅샷 조회와 포지션 종료

pub mod commands;
