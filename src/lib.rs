//! Amazon 請求書ダウンローダー
//!
//! - ブラウザでサインイン（ボットチェック・2段階認証は人が対応）
//! - 注文履歴を年 → ページ → 注文の順に巡回
//! - 請求書を `{YYYYMMDD}_{amount}_amazon_{order_id}.pdf` として保存（既存ファイルはスキップ）
//!
//! # 使用例
//!
//! ```rust,ignore
//! use amazon_invoice_downloader::{DateSelector, DownloadRequest, DownloaderConfig, InvoiceDownloadService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = InvoiceDownloadService::new();
//!
//!     let config = DownloaderConfig::new()
//!         .with_email(Some("user@example.com".into()))
//!         .with_password(Some("password".into()))
//!         .with_download_path("./downloads");
//!     let request = DownloadRequest::new(config).with_selector(DateSelector::Year(2023));
//!
//!     let report = service.call(request).await.unwrap();
//!     println!("Saved: {:?}", report.saved);
//! }
//! ```

pub mod amazon;
pub mod browser;
pub mod config;
pub mod error;
pub mod pacing;
pub mod service;
pub mod traits;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

// 主要な型をリエクスポート
pub use amazon::{CrawlReport, Credentials, OrderRecord};
pub use browser::ChromeDriver;
pub use config::DownloaderConfig;
pub use error::DownloaderError;
pub use pacing::{Pacer, RandomPacer};
pub use service::{DownloadRequest, InvoiceDownloadService};
pub use traits::PageDriver;
pub use window::{DateSelector, TimeWindow};
