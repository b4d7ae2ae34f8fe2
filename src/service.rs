use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine;
use chrono::Local;
use tower::Service;
use tracing::{debug, error, info, warn};

use crate::amazon::{CrawlReport, InvoiceMaterializer, OrderCrawler, SessionAuthenticator};
use crate::browser::ChromeDriver;
use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::pacing::{Pacer, RandomPacer};
use crate::traits::PageDriver;
use crate::window::{DateSelector, TimeWindow};

/// ダウンロードリクエスト
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub config: DownloaderConfig,
    pub selector: DateSelector,
}

impl DownloadRequest {
    pub fn new(config: DownloaderConfig) -> Self {
        Self {
            config,
            selector: DateSelector::CurrentYear,
        }
    }

    pub fn with_selector(mut self, selector: DateSelector) -> Self {
        self.selector = selector;
        self
    }
}

/// tower::Serviceを実装した請求書ダウンロードサービス
#[derive(Debug, Clone, Default)]
pub struct InvoiceDownloadService {}

impl InvoiceDownloadService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<DownloadRequest> for InvoiceDownloadService {
    type Response = CrawlReport;
    type Error = DownloaderError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DownloadRequest) -> Self::Future {
        info!("ダウンロードリクエスト受信: {:?}", req.selector);

        Box::pin(async move {
            // ブラウザ起動前に期間を確定
            let window = TimeWindow::resolve(req.selector, Local::now().date_naive())?;
            run(&req.config, window).await
        })
    }
}

/// ブラウザを起動して1回分の巡回を行う（結果に関わらずブラウザは終了する）
pub async fn run(
    config: &DownloaderConfig,
    window: TimeWindow,
) -> Result<CrawlReport, DownloaderError> {
    tokio::fs::create_dir_all(&config.download_path).await?;

    let driver = ChromeDriver::launch(config).await?;
    let pacer = RandomPacer::new(config.pacing_min, config.pacing_max);

    run_session(&driver, &pacer, config, window).await
}

/// 既存のドライバで巡回し、最後に必ずドライバを閉じる
pub async fn run_session(
    driver: &dyn PageDriver,
    pacer: &dyn Pacer,
    config: &DownloaderConfig,
    window: TimeWindow,
) -> Result<CrawlReport, DownloaderError> {
    let result = crawl_with(driver, pacer, config, window).await;

    if let Err(e) = &result {
        error!("Crawl failed: {}", e);
        if config.debug {
            capture_failure(driver).await;
        }
    }

    if let Err(e) = driver.close().await {
        warn!("Failed to close browser: {}", e);
    }
    result
}

/// サインイン → 巡回
pub async fn crawl_with(
    driver: &dyn PageDriver,
    pacer: &dyn Pacer,
    config: &DownloaderConfig,
    window: TimeWindow,
) -> Result<CrawlReport, DownloaderError> {
    SessionAuthenticator::new(driver, pacer, &config.base_url)
        .with_poll_interval(config.poll_interval)
        .authenticate(&config.credentials())
        .await?;

    let materializer = InvoiceMaterializer::new(&config.download_path, &config.base_url)?;
    OrderCrawler::new(driver, pacer, &materializer, window)
        .run()
        .await
}

/// デバッグスクリーンショット
async fn capture_failure(driver: &dyn PageDriver) {
    if let Ok(url) = driver.current_url().await {
        debug!("Failure URL: {}", url);
    }
    match driver.screenshot().await {
        Ok(screenshot) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("Failure screenshot: data:image/png;base64,{}", encoded);
        }
        Err(e) => debug!("Failed to capture screenshot: {}", e),
    }
}
