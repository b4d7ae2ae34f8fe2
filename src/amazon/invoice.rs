//! 請求書PDFの保存

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::info;
use url::Url;

use crate::error::DownloaderError;
use crate::traits::{PageDriver, PdfLayout};

use super::order::OrderRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Saved(PathBuf),
    AlreadyPresent(PathBuf),
}

/// 対象注文1件ごとに呼ばれる保存先
#[async_trait]
pub trait InvoiceSink: Send + Sync {
    async fn materialize(
        &self,
        order: &OrderRecord,
        driver: &dyn PageDriver,
    ) -> Result<Materialized, DownloaderError>;
}

/// 請求書ページをPDF化してダウンロードディレクトリに保存する
#[derive(Debug, Clone)]
pub struct InvoiceMaterializer {
    target_dir: PathBuf,
    base_url: Url,
    layout: PdfLayout,
}

impl InvoiceMaterializer {
    pub fn new(target_dir: impl Into<PathBuf>, base_url: &str) -> Result<Self, DownloaderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DownloaderError::Navigation(format!("ベースURLが不正です {}: {}", base_url, e)))?;
        Ok(Self {
            target_dir: target_dir.into(),
            base_url,
            layout: PdfLayout::letter(),
        })
    }

    pub fn path_for(&self, order: &OrderRecord) -> PathBuf {
        self.target_dir.join(order.file_name())
    }

    /// カード内の相対リンクをストアのURLで解決
    pub fn invoice_url(&self, href: &str) -> Result<Url, DownloaderError> {
        self.base_url
            .join(href)
            .map_err(|e| DownloaderError::Navigation(format!("請求書URLが不正です {}: {}", href, e)))
    }
}

#[async_trait]
impl InvoiceSink for InvoiceMaterializer {
    async fn materialize(
        &self,
        order: &OrderRecord,
        driver: &dyn PageDriver,
    ) -> Result<Materialized, DownloaderError> {
        let path = self.path_for(order);

        if tokio::fs::try_exists(&path).await? {
            info!("保存済みのためスキップ: [{}]", path.display());
            return Ok(Materialized::AlreadyPresent(path));
        }

        let href = order.invoice_href.as_deref().ok_or_else(|| {
            DownloaderError::ElementNotFound(format!("請求書リンク (order={})", order.order_id))
        })?;
        let url = self.invoice_url(href)?;

        info!("ファイルを保存: [{}]", path.display());
        let pdf = driver.render_pdf(url.as_str(), &self.layout).await?;
        write_new(&self.target_dir, &path, &pdf)?;

        Ok(Materialized::Saved(path))
    }
}

/// 一時ファイルに書き切ってから最終名へ移す（既存ファイルは上書きしない）
///
/// ファイル名の存在が保存済みの印なので、書きかけのファイルを最終名で残してはいけない。
fn write_new(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), DownloaderError> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}
