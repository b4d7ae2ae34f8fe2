//! 注文カードの解析

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::DownloaderError;
use crate::traits::CardSnapshot;

use super::selectors::INVOICE_LINK_TEXT;

/// カード内 span の固定位置
const DATE_SPAN: usize = 1;
const TOTAL_SPAN: usize = 3;
const ORDER_ID_SPAN: usize = 9;

/// 例: "July 4, 2022"
const ORDER_DATE_FORMAT: &str = "%B %d, %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Active,
    Cancelled,
}

impl OrderStatus {
    /// 日付などを解析する前に判定する（キャンセル注文はレイアウトが異なる場合がある）
    pub fn of(card: &CardSnapshot) -> Self {
        let cancelled = card.spans.iter().any(|text| {
            matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "cancelled" | "canceled" | "order cancelled" | "order canceled"
            )
        });
        if cancelled {
            OrderStatus::Cancelled
        } else {
            OrderStatus::Active
        }
    }
}

/// 1注文分の情報（ファイル名の決定とスキップ判定にのみ使う）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub order_date: NaiveDate,
    /// "$1,234.56" → "1234.56"
    pub total: String,
    pub order_id: String,
    pub invoice_href: Option<String>,
}

impl OrderRecord {
    pub fn parse(card: &CardSnapshot) -> Result<Self, DownloaderError> {
        if card.spans.len() <= ORDER_ID_SPAN {
            return Err(DownloaderError::MalformedOrder(format!(
                "span が {} 個しかありません（{} 個以上必要）",
                card.spans.len(),
                ORDER_ID_SPAN + 1
            )));
        }

        let order_date = parse_order_date(&card.spans[DATE_SPAN])?;
        let total = normalize_total(&card.spans[TOTAL_SPAN])?;
        let order_id = parse_order_id(&card.spans[ORDER_ID_SPAN])?;

        let invoice_href = card
            .links
            .iter()
            .find(|link| {
                link.text
                    .to_ascii_lowercase()
                    .contains(&INVOICE_LINK_TEXT.to_ascii_lowercase())
            })
            .map(|link| link.href.trim().to_string())
            .filter(|href| !href.is_empty());

        Ok(Self {
            order_date,
            total,
            order_id,
            invoice_href,
        })
    }

    pub fn file_name(&self) -> String {
        invoice_file_name(self.order_date, &self.total, &self.order_id)
    }
}

/// 請求書ファイル名 `{YYYYMMDD}_{amount}_amazon_{order_id}.pdf`
///
/// このファイルの有無でダウンロード済みかを判定する。
pub fn invoice_file_name(order_date: NaiveDate, total: &str, order_id: &str) -> String {
    format!(
        "{}_{}_amazon_{}.pdf",
        order_date.format("%Y%m%d"),
        total,
        order_id
    )
}

fn parse_order_date(text: &str) -> Result<NaiveDate, DownloaderError> {
    NaiveDate::parse_from_str(text.trim(), ORDER_DATE_FORMAT).map_err(|e| {
        DownloaderError::MalformedOrder(format!("注文日を解析できません '{}': {}", text, e))
    })
}

fn normalize_total(text: &str) -> Result<String, DownloaderError> {
    let total: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();

    let valid = !total.is_empty()
        && total.chars().any(|c| c.is_ascii_digit())
        && total.chars().all(|c| c.is_ascii_digit() || c == '.');
    if !valid {
        return Err(DownloaderError::MalformedOrder(format!(
            "合計金額を解析できません: '{}'",
            text
        )));
    }
    Ok(total)
}

fn parse_order_id(text: &str) -> Result<String, DownloaderError> {
    let order_id = text.trim();
    // ファイル名に埋め込むため英数字とハイフンのみ許可
    let valid = !order_id.is_empty()
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(DownloaderError::MalformedOrder(format!(
            "注文番号が不正です: '{}'",
            text
        )));
    }
    Ok(order_id.to_string())
}
