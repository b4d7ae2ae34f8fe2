//! Chrome DevTools Protocol によるページドライバ
//!
//! ページ上の操作はすべて JavaScript の評価で行い、要素がなければ `false` を返す。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, PrintToPdfParams,
};
use chromiumoxide::cdp::browser_protocol::web_authn::{
    AddVirtualAuthenticatorParams, AuthenticatorProtocol, AuthenticatorTransport,
    EnableParams as WebAuthnEnableParams, VirtualAuthenticatorOptions,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::traits::{CardSnapshot, Locator, PageDriver, PdfLayout};

/// ページロード待機のタイムアウト（秒）
const PAGE_LOAD_TIMEOUT_SECS: u64 = 30;
/// ページ安定待機のタイムアウト（ミリ秒）
const PAGE_STABLE_TIMEOUT_MS: u64 = 10000;
const PAGE_STABLE_CHECK_INTERVAL_MS: u64 = 300;
const REQUIRED_STABLE_CHECKS: u32 = 3;

/// navigator.webdriver などの自動化シグナルを隠す
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) { window.chrome.runtime = {}; }
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}
"#;

pub struct ChromeDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    /// ブラウザを起動して空のタブを1つ開く
    pub async fn launch(config: &DownloaderConfig) -> Result<Self, DownloaderError> {
        info!("ブラウザを起動中...");

        let mut builder = BrowserConfig::builder().window_size(1280, 900);

        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(|| std::env::var_os("CHROME_PATH").map(Into::into));
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }

        if !config.headless {
            builder = builder.with_head();
        }

        if config.stealth {
            builder = builder.arg("--disable-blink-features=AutomationControlled");
        }

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| DownloaderError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DownloaderError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DownloaderError::BrowserInit(e.to_string()))?;

        if config.stealth {
            debug!("Injecting stealth script");
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
                .await
                .map_err(|e| DownloaderError::BrowserInit(format!("stealth script: {}", e)))?;
        }

        if config.virtual_authenticator {
            install_virtual_authenticator(&page).await?;
        }

        info!("ブラウザ起動完了");
        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, DownloaderError> {
        evaluate(&self.page, script).await
    }

    /// ページの読み込み完了と HTML サイズの安定を待つ
    async fn wait_stable(&self) -> Result<(), DownloaderError> {
        let start = Instant::now();
        let load_timeout = Duration::from_secs(PAGE_LOAD_TIMEOUT_SECS);
        while start.elapsed() < load_timeout {
            let state: String = self
                .eval("document.readyState")
                .await
                .unwrap_or_default();
            if state == "complete" {
                break;
            }
            sleep(Duration::from_millis(PAGE_STABLE_CHECK_INTERVAL_MS)).await;
        }

        let start = Instant::now();
        let timeout = Duration::from_millis(PAGE_STABLE_TIMEOUT_MS);
        let mut last_html_len: Option<usize> = None;
        let mut stable_count = 0;

        while start.elapsed() < timeout {
            match self
                .eval::<usize>("document.documentElement.outerHTML.length")
                .await
            {
                Ok(current_len) => {
                    match last_html_len {
                        Some(last) if last == current_len => {
                            stable_count += 1;
                            if stable_count >= REQUIRED_STABLE_CHECKS {
                                debug!("Page stable after {:?}", start.elapsed());
                                return Ok(());
                            }
                        }
                        _ => stable_count = 0,
                    }
                    last_html_len = Some(current_len);
                }
                Err(e) => {
                    // 遷移中はコンテキストが破棄されて失敗することがある
                    debug!("Page stable check error: {}", e);
                    stable_count = 0;
                }
            }
            sleep(Duration::from_millis(PAGE_STABLE_CHECK_INTERVAL_MS)).await;
        }

        warn!(
            "Page stable timeout after {:?}, proceeding anyway",
            start.elapsed()
        );
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DownloaderError::Navigation(format!("{}: {}", url, e)))?;
        self.wait_stable().await
    }

    async fn current_url(&self) -> Result<String, DownloaderError> {
        self.eval("window.location.href").await
    }

    async fn exists(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError> {
        self.eval(&format!("({}).length > 0", locate_all(locator)))
            .await
    }

    async fn click(&self, locator: &Locator<'_>) -> Result<bool, DownloaderError> {
        let script = format!(
            r#"
            (function() {{
                var el = ({})[0];
                if (!el) {{ return false; }}
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return true;
            }})()
            "#,
            locate_all(locator)
        );
        let clicked: bool = self.eval(&script).await?;
        debug!("click {} -> {}", locator, clicked);
        Ok(clicked)
    }

    async fn fill(&self, locator: &Locator<'_>, value: &str) -> Result<bool, DownloaderError> {
        // React 等の制御コンポーネントでも反映されるようネイティブの setter を使う
        let script = format!(
            r#"
            (function() {{
                var el = ({})[0];
                if (!el) {{ return false; }}
                el.focus();
                var setter = Object.getOwnPropertyDescriptor(window.HTMLInputElement.prototype, 'value').set;
                setter.call(el, {});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            locate_all(locator),
            js_string(value)
        );
        let filled: bool = self.eval(&script).await?;
        debug!("fill {} -> {}", locator, filled);
        Ok(filled)
    }

    async fn select_option(
        &self,
        locator: &Locator<'_>,
        value: &str,
    ) -> Result<bool, DownloaderError> {
        let script = format!(
            r#"
            (function() {{
                var el = ({})[0];
                if (!el) {{ return false; }}
                var value = {};
                var found = Array.from(el.options || []).some(function(o) {{ return o.value === value; }});
                if (!found) {{ return false; }}
                el.value = value;
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            locate_all(locator),
            js_string(value)
        );
        let selected: bool = self.eval(&script).await?;
        debug!("select {}={} -> {}", locator, value, selected);
        Ok(selected)
    }

    async fn option_texts(&self, locator: &Locator<'_>) -> Result<Vec<String>, DownloaderError> {
        self.eval(&format!(
            "({}).map(function(e) {{ return (e.innerText || e.textContent || '').trim(); }})",
            locate_all(locator)
        ))
        .await
    }

    async fn order_cards(
        &self,
        locator: &Locator<'_>,
    ) -> Result<Vec<CardSnapshot>, DownloaderError> {
        let script = format!(
            r#"
            ({}).map(function(card) {{
                var text = function(e) {{ return (e.innerText || e.textContent || '').trim(); }};
                return {{
                    spans: Array.from(card.querySelectorAll('span')).map(text),
                    links: Array.from(card.querySelectorAll('a')).map(function(a) {{
                        return {{ text: text(a), href: a.getAttribute('href') || '' }};
                    }})
                }};
            }})
            "#,
            locate_all(locator)
        );
        self.eval(&script).await
    }

    async fn wait_settled(&self) -> Result<(), DownloaderError> {
        // クリック直後はまだ旧ページの readyState が返るため少し待つ
        sleep(Duration::from_millis(500)).await;
        self.wait_stable().await
    }

    async fn render_pdf(&self, url: &str, layout: &PdfLayout) -> Result<Vec<u8>, DownloaderError> {
        let invoice_page = {
            let browser = self.browser.lock().await;
            browser
                .new_page(url)
                .await
                .map_err(|e| DownloaderError::Navigation(format!("{}: {}", url, e)))?
        };

        if let Err(e) = invoice_page.wait_for_navigation().await {
            debug!("Invoice page navigation wait failed: {}", e);
        }

        let params = PrintToPdfParams::builder()
            .paper_width(layout.paper_width)
            .paper_height(layout.paper_height)
            .margin_top(layout.margin)
            .margin_bottom(layout.margin)
            .margin_left(layout.margin)
            .margin_right(layout.margin)
            .print_background(true)
            .build();

        let pdf = invoice_page
            .pdf(params)
            .await
            .map_err(|e| DownloaderError::Render(format!("{}: {}", url, e)));

        // 失敗してもタブは閉じる
        if let Err(e) = invoice_page.close().await {
            debug!("Failed to close invoice tab: {}", e);
        }

        pdf
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DownloaderError> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| DownloaderError::Render(format!("screenshot: {}", e)))
    }

    async fn close(&self) -> Result<(), DownloaderError> {
        info!("ブラウザを終了中...");
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map_err(|e| DownloaderError::BrowserInit(format!("ブラウザ終了エラー: {}", e)));
        if let Err(e) = browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}

/// パスキーのダイアログを自動承認する仮想認証器を登録
async fn install_virtual_authenticator(page: &Page) -> Result<(), DownloaderError> {
    debug!("Installing virtual authenticator");
    page.execute(WebAuthnEnableParams::default())
        .await
        .map_err(|e| DownloaderError::BrowserInit(format!("WebAuthn.enable: {}", e)))?;

    let options = VirtualAuthenticatorOptions::builder()
        .protocol(AuthenticatorProtocol::Ctap2)
        .transport(AuthenticatorTransport::Internal)
        .has_resident_key(true)
        .has_user_verification(true)
        .is_user_verified(true)
        .automatic_presence_simulation(true)
        .build()
        .map_err(|e| DownloaderError::BrowserInit(format!("仮想認証器設定エラー: {}", e)))?;

    page.execute(AddVirtualAuthenticatorParams::new(options))
        .await
        .map_err(|e| DownloaderError::BrowserInit(format!("WebAuthn.addVirtualAuthenticator: {}", e)))?;
    Ok(())
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T, DownloaderError> {
    page.evaluate(script)
        .await
        .map_err(|e| DownloaderError::JavaScript(e.to_string()))?
        .into_value::<T>()
        .map_err(|e| DownloaderError::JavaScript(format!("結果の変換に失敗: {}", e)))
}

/// JavaScript の文字列リテラルに変換
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// ロケータに一致する要素の配列を返す JavaScript 式
fn locate_all(locator: &Locator<'_>) -> String {
    match locator {
        Locator::Css(selector) => {
            format!("Array.from(document.querySelectorAll({}))", js_string(selector))
        }
        // 改行を含む表示テキストにも一致するよう空白を正規化して比較
        Locator::Text { tag, text } => format!(
            "Array.from(document.querySelectorAll({})).filter(function(e) {{ \
             var norm = function(s) {{ return s.replace(/\\s+/g, ' ').trim().toLowerCase(); }}; \
             return norm(e.innerText || e.textContent || '').indexOf(norm({})) >= 0; }})",
            js_string(tag),
            js_string(text)
        ),
    }
}
