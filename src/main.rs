use std::path::PathBuf;

use amazon_invoice_downloader::config::DEFAULT_BASE_URL;
use amazon_invoice_downloader::{
    DateSelector, DownloadRequest, DownloaderConfig, InvoiceDownloadService,
};
use anyhow::Context;
use clap::Parser;
use tower::Service;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Amazon の注文履歴から請求書PDFをダウンロード
#[derive(Parser, Debug)]
#[command(name = "amazon-invoice-downloader", version, about)]
struct Cli {
    /// Amazon login email
    #[arg(long, env = "AMAZON_EMAIL")]
    email: Option<String>,

    /// Amazon login password
    #[arg(long, env = "AMAZON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Year, formatted as YYYY (defaults to the current year)
    #[arg(long, value_name = "YYYY", value_parser = DateSelector::parse_year, conflicts_with = "date_range")]
    year: Option<DateSelector>,

    /// Start and end date range, inclusive
    #[arg(long, value_name = "YYYYMMDD-YYYYMMDD", value_parser = DateSelector::parse_range)]
    date_range: Option<DateSelector>,

    /// Directory the invoices are saved to
    #[arg(long, default_value = "downloads")]
    download_dir: PathBuf,

    /// Run Chrome without a window (bot checks cannot be solved by hand)
    #[arg(long)]
    headless: bool,

    /// Do not hide automation signals from the storefront
    #[arg(long)]
    no_stealth: bool,

    /// Do not register the virtual passkey authenticator
    #[arg(long)]
    no_virtual_authenticator: bool,

    /// Storefront root URL (invoice links are resolved against it)
    #[arg(long, default_value = DEFAULT_BASE_URL, value_parser = parse_base_url)]
    base_url: String,

    /// Chrome / Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Verbose logging and a screenshot on failure
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn selector(&self) -> DateSelector {
        self.date_range
            .or(self.year)
            .unwrap_or(DateSelector::CurrentYear)
    }

    fn into_request(self) -> DownloadRequest {
        let selector = self.selector();
        let config = DownloaderConfig::new()
            .with_email(self.email)
            .with_password(self.password)
            .with_download_path(self.download_dir)
            .with_headless(self.headless)
            .with_stealth(!self.no_stealth)
            .with_virtual_authenticator(!self.no_virtual_authenticator)
            .with_base_url(self.base_url)
            .with_chrome_path(self.chrome_path)
            .with_debug(self.debug);
        DownloadRequest::new(config).with_selector(selector)
    }
}

fn parse_base_url(value: &str) -> Result<String, String> {
    url::Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|e| format!("invalid URL '{}': {}", value, e))
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "info,amazon_invoice_downloader=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env は既存の環境変数を上書きしない（フラグ > 環境変数 > .env）
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let request = cli.into_request();
    let download_dir = request.config.download_path.clone();

    let mut service = InvoiceDownloadService::new();
    let report = service
        .call(request)
        .await
        .context("請求書のダウンロードに失敗しました（再実行すると続きから再開します）")?;

    info!(
        "完了: 保存 {} 件, 保存済み {} 件, キャンセル {} 件 -> {}",
        report.saved.len(),
        report.already_present,
        report.cancelled,
        download_dir.display()
    );
    Ok(())
}
