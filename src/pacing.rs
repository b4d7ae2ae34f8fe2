//! 操作間のランダム待機
//!
//! ナビゲーション・年選択・ページ送りのたびに呼び、人間らしい間隔で操作する。

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn wait(&self);
}

/// `[min, max]` の一様分布から待機時間を選ぶ
#[derive(Debug, Clone)]
pub struct RandomPacer {
    min: Duration,
    max: Duration,
}

impl RandomPacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

impl Default for RandomPacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

#[async_trait]
impl Pacer for RandomPacer {
    async fn wait(&self) {
        let delay = self.next_delay();
        debug!("Pacing for {:?}", delay);
        sleep(delay).await;
    }
}

/// 待機なし（テスト用）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn wait(&self) {}
}
