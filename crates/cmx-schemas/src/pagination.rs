//! Pagination contract.
//!
//! `page >= 1` (default 1), `limit` in `[1, MAX_LIMIT]` (default 10).
//! Out-of-range or unparseable input clamps to the default; it never errors.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Clamp raw numeric input. Note that an oversized limit falls back to
    /// the default, not to `MAX_LIMIT`.
    pub fn clamped(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 && p <= u32::MAX as i64 => p as u32,
            _ => DEFAULT_PAGE,
        };
        let limit = match limit {
            Some(l) if l >= 1 && l <= MAX_LIMIT as i64 => l as u32,
            _ => DEFAULT_LIMIT,
        };
        Self { page, limit }
    }

    /// Clamp raw query-string input. Unparseable values count as absent.
    pub fn from_raw(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |s: &str| s.trim().parse::<i64>().ok();
        Self::clamped(page.and_then(parse), limit.and_then(parse))
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, page: Page) -> Self {
        let limit = u64::from(page.limit.max(1));
        Self {
            data,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}
