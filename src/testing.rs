//! テスト用のインメモリ実装

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::amazon::selectors::{NEXT_PAGE, VERIFICATION_PROMPTS, YEAR_FILTER, YEAR_OPTIONS};
use crate::amazon::{InvoiceSink, Materialized, OrderRecord};
use crate::error::DownloaderError;
use crate::pacing::Pacer;
use crate::traits::{CardLink, CardSnapshot, Locator, PageDriver, PdfLayout};

pub(crate) const FAKE_PDF: &[u8] = b"%PDF-1.4\n% fake invoice\n";

/// 注文カード（span 配置は実ページと同じ: 日付=1, 合計=3, 注文番号=9）
pub(crate) fn order_card(date: &str, total: &str, order_id: &str) -> CardSnapshot {
    CardSnapshot {
        spans: vec![
            "Order placed".into(),
            date.into(),
            "Total".into(),
            total.into(),
            "Ship to".into(),
            "Jane Doe".into(),
            "Jane Doe".into(),
            "123 Main St".into(),
            "Order #".into(),
            order_id.into(),
        ],
        links: vec![
            CardLink {
                text: "View order details".into(),
                href: format!("/gp/your-account/order-details?orderID={}", order_id),
            },
            CardLink {
                text: "View invoice".into(),
                href: format!("/gp/css/summary/print.html?orderID={}", order_id),
            },
        ],
    }
}

/// キャンセル済み注文（合計欄のないレイアウト）
pub(crate) fn cancelled_card(date: &str, order_id: &str) -> CardSnapshot {
    CardSnapshot {
        spans: vec![
            "Order placed".into(),
            date.into(),
            "Cancelled".into(),
            "Order #".into(),
            order_id.into(),
        ],
        links: vec![],
    }
}

#[derive(Default)]
struct FakeState {
    years: BTreeMap<i32, Vec<Vec<CardSnapshot>>>,
    selected: Option<i32>,
    page_index: usize,
    missing: Vec<String>,
    delayed: HashMap<String, usize>,
    exists_failures: HashMap<String, usize>,
    verification_checks: usize,
    visited: Vec<String>,
    clicks: Vec<String>,
    filled: Vec<(String, String)>,
    selected_years: Vec<i32>,
    pages_loaded: Vec<(i32, usize)>,
    rendered: Vec<String>,
    screenshots: usize,
    closed: bool,
    fail_render: bool,
}

impl FakeState {
    fn has_next_page(&self) -> bool {
        self.selected
            .and_then(|year| self.years.get(&year))
            .map(|pages| self.page_index + 1 < pages.len())
            .unwrap_or(false)
    }

    fn present(&self, locator: &Locator<'_>) -> bool {
        let key = locator.to_string();
        if self.missing.contains(&key) {
            return false;
        }
        !self.delayed.get(&key).is_some_and(|remaining| *remaining > 0)
    }
}

/// 注文履歴を模したページドライバ
#[derive(Default)]
pub(crate) struct FakeStorefront {
    state: Mutex<FakeState>,
}

impl FakeStorefront {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 年ごとのページ（各ページは新しい順の注文カード）
    pub(crate) fn with_year(self, year: i32, pages: Vec<Vec<CardSnapshot>>) -> Self {
        self.state.lock().unwrap().years.insert(year, pages);
        self
    }

    pub(crate) fn with_missing(self, locator: Locator<'_>) -> Self {
        self.state.lock().unwrap().missing.push(locator.to_string());
        self
    }

    /// `checks` 回の存在確認の後に現れる要素
    pub(crate) fn with_delayed(self, locator: Locator<'_>, checks: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .delayed
            .insert(locator.to_string(), checks);
        self
    }

    /// 最初の `times` 回の存在確認を失敗させる（遷移中のコンテキスト破棄）
    pub(crate) fn with_failing_exists(self, locator: Locator<'_>, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .exists_failures
            .insert(locator.to_string(), times);
        self
    }

    pub(crate) fn with_verification_checks(self, checks: usize) -> Self {
        self.state.lock().unwrap().verification_checks = checks;
        self
    }

    pub(crate) fn with_failing_render(self) -> Self {
        self.state.lock().unwrap().fail_render = true;
        self
    }

    pub(crate) fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub(crate) fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub(crate) fn filled(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().filled.clone()
    }

    pub(crate) fn selected_years(&self) -> Vec<i32> {
        self.state.lock().unwrap().selected_years.clone()
    }

    /// (年, ページ番号) の読み込み履歴
    pub(crate) fn pages_loaded(&self) -> Vec<(i32, usize)> {
        self.state.lock().unwrap().pages_loaded.clone()
    }

    pub(crate) fn rendered(&self) -> Vec<String> {
        self.state.lock().unwrap().rendered.clone()
    }

    pub(crate) fn screenshots(&self) -> usize {
        self.state.lock().unwrap().screenshots
    }

    pub(crate) fn remaining_verification_checks(&self) -> usize {
        self.state.lock().unwrap().verification_checks
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl PageDriver for FakeStorefront {
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError> {
        self.state.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DownloaderError> {
        let state = self.state.lock().unwrap();
        Ok(state.visited.last().cloned().unwrap_or_default())
    }

    async fn exists(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError> {
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.exists_failures.get_mut(&locator.to_string()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DownloaderError::JavaScript(
                    "Execution context was destroyed".to_string(),
                ));
            }
        }

        if *locator == NEXT_PAGE {
            return Ok(state.has_next_page());
        }
        if VERIFICATION_PROMPTS.iter().any(|prompt| prompt == locator) {
            // 先頭のプロンプトだけで表示中を表現する
            if *locator == VERIFICATION_PROMPTS[0] && state.verification_checks > 0 {
                state.verification_checks -= 1;
                return Ok(true);
            }
            return Ok(false);
        }

        let key = locator.to_string();
        if let Some(remaining) = state.delayed.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.present(locator))
    }

    async fn click(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError> {
        let mut state = self.state.lock().unwrap();

        if *locator == NEXT_PAGE {
            if !state.has_next_page() {
                return Ok(false);
            }
            state.page_index += 1;
            state.clicks.push(locator.to_string());
            return Ok(true);
        }
        if !state.present(locator) {
            return Ok(false);
        }
        state.clicks.push(locator.to_string());
        Ok(true)
    }

    async fn fill(&self, locator: &Locator<'_>, value: &str) -> Result<bool, DownloaderError> {
        let mut state = self.state.lock().unwrap();
        if !state.present(locator) {
            return Ok(false);
        }
        state.filled.push((locator.to_string(), value.to_string()));
        Ok(true)
    }

    async fn select_option(
        &self,
        locator: &Locator<'_>,
        value: &str,
    ) -> Result<bool, DownloaderError> {
        let mut state = self.state.lock().unwrap();
        if *locator != YEAR_FILTER || !state.present(locator) {
            return Ok(false);
        }
        let year = value
            .strip_prefix("year-")
            .and_then(|year| year.parse::<i32>().ok())
            .filter(|year| state.years.contains_key(year));
        match year {
            Some(year) => {
                state.selected = Some(year);
                state.page_index = 0;
                state.selected_years.push(year);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn option_texts(&self, locator: &Locator<'_>) -> Result<Vec<String>, DownloaderError> {
        let state = self.state.lock().unwrap();
        if *locator != YEAR_OPTIONS {
            return Ok(Vec::new());
        }
        let mut options = vec!["last 30 days".to_string(), "past 3 months".to_string()];
        options.extend(state.years.keys().rev().map(|year| year.to_string()));
        Ok(options)
    }

    async fn order_cards(
        &self,
        _locator: &Locator<'_>,
    ) -> Result<Vec<CardSnapshot>, DownloaderError> {
        let mut state = self.state.lock().unwrap();
        let Some(year) = state.selected else {
            return Ok(Vec::new());
        };
        let page_index = state.page_index;
        state.pages_loaded.push((year, page_index + 1));
        Ok(state
            .years
            .get(&year)
            .and_then(|pages| pages.get(page_index))
            .cloned()
            .unwrap_or_default())
    }

    async fn wait_settled(&self) -> Result<(), DownloaderError> {
        Ok(())
    }

    async fn render_pdf(&self, url: &str, _layout: &PdfLayout) -> Result<Vec<u8>, DownloaderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_render {
            return Err(DownloaderError::Render(format!("fake render failure: {}", url)));
        }
        state.rendered.push(url.to_string());
        Ok(FAKE_PDF.to_vec())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DownloaderError> {
        self.state.lock().unwrap().screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(&self) -> Result<(), DownloaderError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// 保存せずに対象注文を記録する
#[derive(Default)]
pub(crate) struct RecordingSink {
    orders: Mutex<Vec<OrderRecord>>,
    fail: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn order_ids(&self) -> Vec<String> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .map(|order| order.order_id.clone())
            .collect()
    }
}

#[async_trait]
impl InvoiceSink for RecordingSink {
    async fn materialize(
        &self,
        order: &OrderRecord,
        _driver: &dyn PageDriver,
    ) -> Result<Materialized, DownloaderError> {
        if self.fail {
            return Err(DownloaderError::FileIO(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        self.orders.lock().unwrap().push(order.clone());
        Ok(Materialized::Saved(PathBuf::from(order.file_name())))
    }
}

/// 待機回数だけ数える
#[derive(Default)]
pub(crate) struct CountingPacer {
    waits: AtomicUsize,
}

impl CountingPacer {
    pub(crate) fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn wait(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}
