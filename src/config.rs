use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::amazon::Credentials;

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.com/";

#[derive(Clone)]
pub struct DownloaderConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    pub download_path: PathBuf,
    /// ボットチェックを人が解けるようデフォルトは表示モード
    pub headless: bool,
    pub stealth: bool,
    /// パスキーダイアログ抑止用の仮想認証器
    pub virtual_authenticator: bool,
    pub base_url: String,
    pub chrome_path: Option<PathBuf>,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub poll_interval: Duration,
    pub debug: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            download_path: PathBuf::from("./downloads"),
            headless: false,
            stealth: true,
            virtual_authenticator: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            chrome_path: None,
            pacing_min: Duration::from_secs(2),
            pacing_max: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            debug: false,
        }
    }
}

// パスワードをログに出さない
impl fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("download_path", &self.download_path)
            .field("headless", &self.headless)
            .field("stealth", &self.stealth)
            .field("virtual_authenticator", &self.virtual_authenticator)
            .field("base_url", &self.base_url)
            .field("chrome_path", &self.chrome_path)
            .field("pacing_min", &self.pacing_min)
            .field("pacing_max", &self.pacing_max)
            .field("poll_interval", &self.poll_interval)
            .field("debug", &self.debug)
            .finish()
    }
}

impl DownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|e| !e.is_empty());
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }

    pub fn with_virtual_authenticator(mut self, enabled: bool) -> Self {
        self.virtual_authenticator = enabled;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    /// 操作間のランダム待機幅（min > max の場合は入れ替え）
    pub fn with_pacing(mut self, min: Duration, max: Duration) -> Self {
        if min <= max {
            self.pacing_min = min;
            self.pacing_max = max;
        } else {
            self.pacing_min = max;
            self.pacing_max = min;
        }
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}
