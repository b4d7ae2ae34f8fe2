use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::error::DownloaderError;

/// ページ上の要素の指定方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator<'a> {
    /// CSSセレクタ
    Css(&'a str),
    /// タグ名 + 表示テキスト（部分一致・大文字小文字無視）
    Text { tag: &'a str, text: &'a str },
}

impl fmt::Display for Locator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={}", selector),
            Locator::Text { tag, text } => write!(f, "{} >> text={}", tag, text),
        }
    }
}

/// 注文カード1件分のスナップショット
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardSnapshot {
    /// カード内の span 要素のテキスト（出現順）
    pub spans: Vec<String>,
    pub links: Vec<CardLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardLink {
    pub text: String,
    pub href: String,
}

/// PDF出力のページ設定（インチ単位）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfLayout {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
}

impl PdfLayout {
    /// US Letter、上下左右 0.5 インチ
    pub fn letter() -> Self {
        Self {
            paper_width: 8.5,
            paper_height: 11.0,
            margin: 0.5,
        }
    }
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self::letter()
    }
}

/// ブラウザ操作の抽象化
///
/// クロール処理はこのトレイトだけに依存し、バックエンド（CDP など）を差し替えられる。
/// 要素が見つからない操作は `Ok(false)` を返し、エラーにするかは呼び出し側が決める。
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError>;

    async fn current_url(&self) -> Result<String, DownloaderError>;

    async fn exists(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError>;

    async fn click(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError>;

    async fn fill(&self, locator: &Locator<'_>, value: &str) -> Result<bool, DownloaderError>;

    /// `<select>` の値を変更して change イベントを発火
    async fn select_option(
        &self,
        locator: &Locator<'_>,
        value: &str,
    ) -> Result<bool, DownloaderError>;

    /// 一致する要素（select なら option）のテキスト一覧
    async fn option_texts(&self, locator: &Locator<'_>) -> Result<Vec<String>, DownloaderError>;

    async fn order_cards(&self, locator: &Locator<'_>)
        -> Result<Vec<CardSnapshot>, DownloaderError>;

    /// ページ遷移・再描画が落ち着くまで待機
    async fn wait_settled(&self) -> Result<(), DownloaderError>;

    /// 新しいタブで `url` を開き、PDFに変換してタブを閉じる
    async fn render_pdf(&self, url: &str, layout: &PdfLayout) -> Result<Vec<u8>, DownloaderError>;

    async fn screenshot(&self) -> Result<Vec<u8>, DownloaderError>;

    async fn close(&self) -> Result<(), DownloaderError>;

    /// 要素が現れるまで無期限に待機（ボットチェック等は人が解決する）
    ///
    /// 待機中のページ遷移で確認が失敗しても、未表示として待ち続ける。
    async fn wait_for(&self, locator: &Locator<'_>, poll_interval: Duration) {
        loop {
            match self.exists(locator).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => debug!("Waiting for {}: {}", locator, e),
            }
            sleep(poll_interval).await;
        }
    }
}
