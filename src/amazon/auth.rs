//! サインイン処理
//!
//! ボットチェック・2段階認証は人がブラウザ上で解決するまで待ち続ける（タイムアウトなし）。

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::DownloaderError;
use crate::pacing::Pacer;
use crate::traits::{Locator, PageDriver};

use super::selectors::{
    CONTINUE_BUTTON, EMAIL_FIELD, KEEP_SIGNED_IN, ORDERS_ENTRY, PASSWORD_FIELD, SIGN_IN_BUTTON,
    SIGN_IN_ENTRY, VERIFICATION_PROMPTS,
};

/// 認証情報（それぞれ省略時はブラウザ上で人が入力する）
#[derive(Clone, Default)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

pub struct SessionAuthenticator<'a> {
    driver: &'a dyn PageDriver,
    pacer: &'a dyn Pacer,
    base_url: &'a str,
    poll_interval: Duration,
}

impl<'a> SessionAuthenticator<'a> {
    pub fn new(driver: &'a dyn PageDriver, pacer: &'a dyn Pacer, base_url: &'a str) -> Self {
        Self {
            driver,
            pacer,
            base_url,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// サインインして注文履歴ページまで進める
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<(), DownloaderError> {
        info!("トップページを開く: {}", self.base_url);
        self.driver.navigate(self.base_url).await?;

        info!("サインインリンクを待機中...（ボットチェックはブラウザ上で解決してください）");
        self.driver
            .wait_for(&SIGN_IN_ENTRY, self.poll_interval)
            .await;
        self.click_required(&SIGN_IN_ENTRY, "サインインリンク").await?;
        self.driver.wait_settled().await?;

        if let Some(email) = &credentials.email {
            self.fill_required(&EMAIL_FIELD, email, "メールアドレス入力欄")
                .await?;
            self.click_required(&CONTINUE_BUTTON, "続行ボタン").await?;
            self.driver.wait_settled().await?;
            self.pacer.wait().await;
            debug!("Email submitted");
        }

        if let Some(password) = &credentials.password {
            if credentials.email.is_none() {
                info!("メールアドレスの入力待ち（ブラウザ上で入力してください）...");
                self.driver
                    .wait_for(&PASSWORD_FIELD, self.poll_interval)
                    .await;
            }
            self.fill_required(&PASSWORD_FIELD, password, "パスワード入力欄")
                .await?;
            if !self.driver.click(&KEEP_SIGNED_IN).await? {
                debug!("'Keep me signed in' は表示されていないか既にチェック済み");
            }
            self.click_required(&SIGN_IN_BUTTON, "サインインボタン")
                .await?;
            self.driver.wait_settled().await?;
            self.pacer.wait().await;
            debug!("Password submitted");
        }

        self.wait_for_verification().await;

        info!("注文履歴リンクを待機中...");
        self.driver
            .wait_for(&ORDERS_ENTRY, self.poll_interval)
            .await;
        self.click_required(&ORDERS_ENTRY, "注文履歴リンク").await?;
        self.driver.wait_settled().await?;
        self.pacer.wait().await;

        info!("サインイン完了、注文履歴を表示");
        Ok(())
    }

    /// 2段階認証ページが消えるまで待機（タイムアウトなし）
    async fn wait_for_verification(&self) {
        let mut announced = false;
        while self.verification_pending().await {
            if !announced {
                info!("2段階認証が必要です。ブラウザ上で完了してください...");
                announced = true;
            }
            sleep(self.poll_interval).await;
        }
        if announced {
            info!("2段階認証完了");
        }
    }

    /// 確認に失敗した場合（認証中のページ遷移など）は表示中とみなして再確認する
    async fn verification_pending(&self) -> bool {
        for prompt in VERIFICATION_PROMPTS {
            match self.driver.exists(prompt).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    debug!("Verification check failed ({}): {}", prompt, e);
                    return true;
                }
            }
        }
        false
    }

    async fn click_required(&self, locator: &Locator<'_>, name: &str) -> Result<(), DownloaderError> {
        if self.driver.click(locator).await? {
            Ok(())
        } else {
            Err(DownloaderError::Login(format!("{}が見つかりません ({})", name, locator)))
        }
    }

    async fn fill_required(
        &self,
        locator: &Locator<'_>,
        value: &str,
        name: &str,
    ) -> Result<(), DownloaderError> {
        if self.driver.fill(locator, value).await? {
            Ok(())
        } else {
            Err(DownloaderError::Login(format!("{}が見つかりません ({})", name, locator)))
        }
    }
}
