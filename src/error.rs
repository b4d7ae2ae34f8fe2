use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("PDF出力エラー: {0}")]
    Render(String),

    #[error("注文カードの形式が不正です: {0}")]
    MalformedOrder(String),

    #[error("期間指定が不正です: {0}")]
    InvalidWindow(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("{position} の処理中にエラー: {source}")]
    Crawl {
        position: CrawlPosition,
        #[source]
        source: Box<DownloaderError>,
    },
}

impl DownloaderError {
    /// 処理中の位置情報を付与（既に付与済みなら外側を優先しない）
    pub fn at(self, position: CrawlPosition) -> Self {
        match self {
            already @ DownloaderError::Crawl { .. } => already,
            other => DownloaderError::Crawl {
                position,
                source: Box::new(other),
            },
        }
    }

    pub fn position(&self) -> Option<&CrawlPosition> {
        match self {
            DownloaderError::Crawl { position, .. } => Some(position),
            _ => None,
        }
    }
}

/// エラー発生時のクロール位置（再実行時の目安）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlPosition {
    pub year: i32,
    pub page: Option<u32>,
    pub card: Option<usize>,
    pub order_id: Option<String>,
}

impl CrawlPosition {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_card(mut self, card: usize) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

impl fmt::Display for CrawlPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "year={}", self.year)?;
        if let Some(page) = self.page {
            write!(f, " page={}", page)?;
        }
        if let Some(card) = self.card {
            write!(f, " card={}", card)?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, " order={}", order_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let position = CrawlPosition::year(2023)
            .with_page(2)
            .with_card(5)
            .with_order_id("111-2223334");
        assert_eq!(
            position.to_string(),
            "year=2023 page=2 card=5 order=111-2223334"
        );
        assert_eq!(CrawlPosition::year(2021).to_string(), "year=2021");
    }

    #[test]
    fn test_at_keeps_innermost_position() {
        let inner = DownloaderError::MalformedOrder("spans".into())
            .at(CrawlPosition::year(2023).with_page(3).with_card(1));
        let outer = inner.at(CrawlPosition::year(2023));

        let position = outer.position().expect("position attached");
        assert_eq!(position.page, Some(3));
        assert_eq!(position.card, Some(1));
        assert!(outer.to_string().contains("year=2023 page=3 card=1"));
    }
}
