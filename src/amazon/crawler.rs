//! 注文履歴の巡回
//!
//! 年（新しい順）→ ページ → 注文カードの順に走査する。注文は全体として
//! 日付の降順に並ぶ前提で、期間の開始日より古い注文に達した時点で
//! 以降の年も含めて巡回を終了する。

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CrawlPosition, DownloaderError};
use crate::pacing::Pacer;
use crate::traits::{CardSnapshot, PageDriver};
use crate::window::{parse_year_options, TimeWindow, WindowPosition};

use super::invoice::{InvoiceSink, Materialized};
use super::order::{OrderRecord, OrderStatus};
use super::selectors::{year_filter_value, NEXT_PAGE, ORDER_CARD, YEAR_FILTER, YEAR_OPTIONS};

/// 巡回結果のサマリ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub years: Vec<i32>,
    pub pages_visited: u32,
    pub saved: Vec<PathBuf>,
    pub already_present: usize,
    pub cancelled: usize,
    pub newer_than_window: usize,
    /// 開始日より古い注文に達して打ち切った
    pub reached_window_start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearOutcome {
    Exhausted,
    ReachedWindowStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardOutcome {
    Continue,
    Stop,
}

pub struct OrderCrawler<'a> {
    driver: &'a dyn PageDriver,
    pacer: &'a dyn Pacer,
    sink: &'a dyn InvoiceSink,
    window: TimeWindow,
}

impl<'a> OrderCrawler<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        pacer: &'a dyn Pacer,
        sink: &'a dyn InvoiceSink,
        window: TimeWindow,
    ) -> Self {
        Self {
            driver,
            pacer,
            sink,
            window,
        }
    }

    /// 注文履歴ページ上から巡回を開始する
    pub async fn run(&self) -> Result<CrawlReport, DownloaderError> {
        let options = self.driver.option_texts(&YEAR_OPTIONS).await?;
        let years = self.window.overlapping_years(parse_year_options(&options));
        info!(
            "注文履歴の巡回開始: {} 〜 {} (対象年: {:?})",
            self.window.start(),
            self.window.end(),
            years
        );

        let mut report = CrawlReport::default();
        for year in years {
            report.years.push(year);
            let outcome = self
                .crawl_year(year, &mut report)
                .await
                .map_err(|e| e.at(CrawlPosition::year(year)))?;

            if outcome == YearOutcome::ReachedWindowStart {
                info!("{} より前の注文に到達したため巡回を終了", self.window.start());
                report.reached_window_start = true;
                break;
            }
        }

        info!(
            "巡回完了: 保存 {} 件, 保存済み {} 件, キャンセル {} 件, {} ページ",
            report.saved.len(),
            report.already_present,
            report.cancelled,
            report.pages_visited
        );
        Ok(report)
    }

    async fn crawl_year(
        &self,
        year: i32,
        report: &mut CrawlReport,
    ) -> Result<YearOutcome, DownloaderError> {
        info!("{}年の注文を表示", year);
        if !self
            .driver
            .select_option(&YEAR_FILTER, &year_filter_value(year))
            .await?
        {
            return Err(DownloaderError::ElementNotFound(format!(
                "年フィルター ({})",
                YEAR_FILTER
            )));
        }
        self.driver.wait_settled().await?;
        self.pacer.wait().await;

        let mut page: u32 = 1;
        loop {
            if page > 1 {
                // 「次へ」がなければこの年は終わり
                if !self.driver.click(&NEXT_PAGE).await? {
                    debug!("No next page after page {} of {}", page - 1, year);
                    return Ok(YearOutcome::Exhausted);
                }
                self.driver.wait_settled().await?;
            }
            self.pacer.wait().await;
            report.pages_visited += 1;

            let cards = self.driver.order_cards(&ORDER_CARD).await?;
            debug!("Year {} page {}: {} order cards", year, page, cards.len());

            for (index, card) in cards.iter().enumerate() {
                let position = CrawlPosition::year(year)
                    .with_page(page)
                    .with_card(index + 1);
                let outcome = self
                    .scan_card(card, report, &position)
                    .await
                    .map_err(|e| e.at(position.clone()))?;

                if outcome == CardOutcome::Stop {
                    return Ok(YearOutcome::ReachedWindowStart);
                }
            }

            page += 1;
        }
    }

    async fn scan_card(
        &self,
        card: &CardSnapshot,
        report: &mut CrawlReport,
        position: &CrawlPosition,
    ) -> Result<CardOutcome, DownloaderError> {
        if OrderStatus::of(card) == OrderStatus::Cancelled {
            debug!("{}: cancelled order, skipping", position);
            report.cancelled += 1;
            return Ok(CardOutcome::Continue);
        }

        let order = OrderRecord::parse(card)?;

        match self.window.position_of(order.order_date) {
            WindowPosition::Newer => {
                debug!(
                    "{}: order {} on {} is after the window",
                    position, order.order_id, order.order_date
                );
                report.newer_than_window += 1;
                Ok(CardOutcome::Continue)
            }
            WindowPosition::Older => {
                debug!(
                    "{}: order {} on {} is before the window",
                    position, order.order_id, order.order_date
                );
                Ok(CardOutcome::Stop)
            }
            WindowPosition::Within => {
                let outcome = self
                    .sink
                    .materialize(&order, self.driver)
                    .await
                    .map_err(|e| e.at(position.clone().with_order_id(&order.order_id)))?;

                match outcome {
                    Materialized::Saved(path) => {
                        report.saved.push(path);
                        self.pacer.wait().await;
                    }
                    Materialized::AlreadyPresent(_) => report.already_present += 1,
                }
                Ok(CardOutcome::Continue)
            }
        }
    }
}
