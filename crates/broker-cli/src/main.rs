//! 자격증명 브로커 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 마스터 키 생성
//! broker gen-key
//!
//! # 표준 입력으로 값 암호화 (쉘 기록에 남지 않음)
//! printf '%s' "$API_SECRET" | broker encrypt
//!
//! # 레거시 값 판정
//! broker probe "<stored value>"
//!
//! # API 키 쌍 봉인 후 스냅샷 조회
//! printf '%s' "$API_SECRET" | broker seal --api-key "$API_KEY" > creds.json
//! broker snapshot --user user-1 --credentials creds.json
//!
//! # BTCUSDT 롱 0.01 종료
//! broker close --user user-1 --credentials creds.json --symbol BTCUSDT --amount 0.01
//! ```

use anyhow::{anyhow, bail, Result};
use broker_cli::commands::{self, account, keys, read_input};
use broker_core::{init_logging, BrokerConfig, EnvelopeCipher, LogConfig};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "broker")]
#[command(about = "Credential broker CLI - 거래소 API 키 암호화 및 서명 요청 도구", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = "config/broker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 새 마스터 키 생성 (base64, 32바이트)
    GenKey,

    /// 값 암호화 (인자가 없으면 표준 입력)
    Encrypt {
        /// 평문
        value: Option<String>,

        /// 입력을 JSON으로 검증 후 암호화
        #[arg(long)]
        json: bool,
    },

    /// blob 복호화 (인자가 없으면 표준 입력)
    Decrypt {
        /// base64 blob
        blob: Option<String>,
    },

    /// 저장된 값이 암호문인지 판정 (encrypted / plaintext / ambiguous)
    Probe {
        value: Option<String>,
    },

    /// 레거시 평문 값을 암호화 (이미 암호화된 값은 그대로)
    Migrate {
        value: Option<String>,

        /// 인증에 실패하는 blob 형태 값도 평문으로 간주
        #[arg(long)]
        treat_ambiguous_as_plaintext: bool,
    },

    /// API 키 쌍을 저장 형태(JSON)로 봉인 (시크릿은 표준 입력)
    Seal {
        /// API 키
        #[arg(long)]
        api_key: String,
    },

    /// 쿼리 문자열 서명 (시크릿은 표준 입력)
    Sign {
        /// 정규화된 쿼리 문자열 (예: symbol=BTCUSDT&timestamp=1700000000000)
        #[arg(short, long)]
        query: String,
    },

    /// 계좌 스냅샷 조회 (잔고 + 열린 포지션)
    Snapshot {
        /// 사용자 ID (캐시 키)
        #[arg(short, long)]
        user: String,

        /// `seal`로 만든 자격증명 파일
        #[arg(long)]
        credentials: PathBuf,
    },

    /// 수익 내역 조회
    Income {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        credentials: PathBuf,

        /// 수익 유형 (REALIZED_PNL, FUNDING_FEE, COMMISSION 등)
        #[arg(short = 't', long)]
        income_type: Option<String>,

        /// 조회 기간 (일, 1~3650)
        #[arg(long, default_value = "7", value_parser = clap::value_parser!(i64).range(1..=3650))]
        days: i64,
    },

    /// 포지션 종료 (시장가 반대 주문)
    Close {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        credentials: PathBuf,

        /// 심볼 (예: BTCUSDT)
        #[arg(short, long)]
        symbol: String,

        /// 현재 포지션 수량 (숏은 음수)
        #[arg(short, long, allow_hyphen_values = true)]
        amount: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env 파일이 없어도 무시
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = BrokerConfig::load(&cli.config)?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::GenKey => {
            println!("{}", keys::generate_key());
        }

        Commands::Encrypt { value, json } => {
            let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
            let plaintext = read_input(value)?;
            println!("{}", keys::encrypt(&cipher, &plaintext, json)?);
        }

        Commands::Decrypt { blob } => {
            let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
            let blob = read_input(blob)?;
            println!("{}", keys::decrypt(&cipher, &blob)?);
        }

        Commands::Probe { value } => {
            let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
            let value = read_input(value)?;
            println!("{}", keys::probe(&cipher, &value));
        }

        Commands::Migrate {
            value,
            treat_ambiguous_as_plaintext,
        } => {
            let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
            let value = read_input(value)?;
            match keys::migrate(&cipher, &value, treat_ambiguous_as_plaintext)? {
                Some(blob) => println!("{}", blob),
                None => println!("{}", value),
            }
        }

        Commands::Seal { api_key } => {
            let cipher = EnvelopeCipher::from_settings(&config.encryption)?;
            let api_secret = read_input(None)?;
            println!("{}", keys::seal(&cipher, &api_key, &api_secret)?);
        }

        Commands::Sign { query } => {
            let secret = read_input(None)?;
            if secret.is_empty() {
                bail!("API secret must be provided on stdin");
            }
            println!("{}", commands::sign::sign(&secret, &query)?);
        }

        Commands::Snapshot { user, credentials } => {
            let stored = account::load_credentials(&credentials)?;
            println!("{}", account::snapshot(&config, &user, &stored).await?);
        }

        Commands::Income {
            user,
            credentials,
            income_type,
            days,
        } => {
            let stored = account::load_credentials(&credentials)?;
            println!(
                "{}",
                account::income(&config, &user, &stored, income_type, days).await?
            );
        }

        Commands::Close {
            user,
            credentials,
            symbol,
            amount,
        } => {
            let stored = account::load_credentials(&credentials)?;
            info!(symbol = %symbol, "Closing position");
            println!(
                "{}",
                account::close(&config, &user, &stored, &symbol, amount).await?
            );
        }
    }

    Ok(())
}
