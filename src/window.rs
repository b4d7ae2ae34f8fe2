//! 対象期間の解決
//!
//! `--year` / `--date-range` の指定から閉区間 `[start, end]` を求め、
//! 注文履歴の年フィルターで巡回する年を新しい順に並べる。

use chrono::{Datelike, NaiveDate};

use crate::error::DownloaderError;

const DATE_FORMAT: &str = "%Y%m%d";

/// コマンドラインの期間指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSelector {
    #[default]
    CurrentYear,
    Year(i32),
    Range(NaiveDate, NaiveDate),
}

impl DateSelector {
    /// `YYYY` 形式
    pub fn parse_year(value: &str) -> Result<Self, DownloaderError> {
        let value = value.trim();
        if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(DownloaderError::InvalidWindow(format!(
                "年は YYYY 形式で指定してください: {}",
                value
            )));
        }
        let year: i32 = value
            .parse()
            .map_err(|e| DownloaderError::InvalidWindow(format!("{}: {}", value, e)))?;
        Ok(DateSelector::Year(year))
    }

    /// `YYYYMMDD-YYYYMMDD` 形式
    pub fn parse_range(value: &str) -> Result<Self, DownloaderError> {
        let (start, end) = value.trim().split_once('-').ok_or_else(|| {
            DownloaderError::InvalidWindow(format!(
                "期間は YYYYMMDD-YYYYMMDD 形式で指定してください: {}",
                value
            ))
        })?;
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        TimeWindow::new(start, end)?;
        Ok(DateSelector::Range(start, end))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, DownloaderError> {
    if value.len() != 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(DownloaderError::InvalidWindow(format!(
            "日付は YYYYMMDD 形式で指定してください: {}",
            value
        )));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| DownloaderError::InvalidWindow(format!("{}: {}", value, e)))
}

/// 注文日と期間の位置関係
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// end より新しい（スキップして走査継続）
    Newer,
    Within,
    /// start より古い（走査終了）
    Older,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DownloaderError> {
        if start > end {
            return Err(DownloaderError::InvalidWindow(format!(
                "開始日 {} が終了日 {} より後です",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn for_year(year: i32) -> Result<Self, DownloaderError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| DownloaderError::InvalidWindow(format!("年が範囲外です: {}", year)))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| DownloaderError::InvalidWindow(format!("年が範囲外です: {}", year)))?;
        Self::new(start, end)
    }

    /// `today` は指定なしの場合の基準日
    pub fn resolve(selector: DateSelector, today: NaiveDate) -> Result<Self, DownloaderError> {
        match selector {
            DateSelector::CurrentYear => Self::for_year(today.year()),
            DateSelector::Year(year) => Self::for_year(year),
            DateSelector::Range(start, end) => Self::new(start, end),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn position_of(&self, date: NaiveDate) -> WindowPosition {
        if date > self.end {
            WindowPosition::Newer
        } else if date < self.start {
            WindowPosition::Older
        } else {
            WindowPosition::Within
        }
    }

    /// 選択可能な年のうち期間と重なるものを新しい順に返す
    pub fn overlapping_years<I>(&self, available: I) -> Vec<i32>
    where
        I: IntoIterator<Item = i32>,
    {
        let mut years: Vec<i32> = available
            .into_iter()
            .filter(|year| (self.start.year()..=self.end.year()).contains(year))
            .collect();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        years
    }
}

/// 年フィルターの選択肢テキストから数値の年だけを取り出す
///
/// "past 3 months" などの相対期間は無視する。
pub fn parse_year_options<S: AsRef<str>>(options: &[S]) -> Vec<i32> {
    options
        .iter()
        .flat_map(|text| text.as_ref().lines())
        .map(str::trim)
        .filter(|text| text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|text| text.parse().ok())
        .collect()
}
