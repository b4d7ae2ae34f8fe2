//! Amazon 注文履歴スクレイパーモジュール
//!
//! サインイン → 年ごとの注文履歴巡回 → 請求書PDF保存

mod auth;
mod crawler;
mod invoice;
mod order;
pub mod selectors;

pub use auth::{Credentials, SessionAuthenticator};
pub use crawler::{CrawlReport, OrderCrawler};
pub use invoice::{InvoiceMaterializer, InvoiceSink, Materialized};
pub use order::{invoice_file_name, OrderRecord, OrderStatus};
