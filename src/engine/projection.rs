use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::availability::daily_status;
use super::EngineError;

// ── Calendar / time-grid projection ───────────────────────────────

/// The slice of calendar a grid covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Month { year: i32, month: u32 },
    Day { date: CalendarDate },
}

impl Window {
    pub fn month(year: i32, month: u32) -> Result<Self, EngineError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(EngineError::InvalidWindow(format!("{year}-{month:02}")));
        }
        Ok(Window::Month { year, month })
    }

    pub fn day(date: CalendarDate) -> Self {
        Window::Day { date }
    }

    /// The month containing `date`.
    pub fn month_of(date: CalendarDate) -> Self {
        Window::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Inclusive date range the window covers (padding days excluded).
    pub fn range(&self) -> (CalendarDate, CalendarDate) {
        match *self {
            Window::Month { year, month } => {
                let first = first_of_month(year, month);
                (first, last_of_month(first))
            }
            Window::Day { date } => (date, date),
        }
    }

    /// Following month or day.
    pub fn next(&self) -> Self {
        match *self {
            Window::Month { year, month } if month == 12 => Window::Month {
                year: year + 1,
                month: 1,
            },
            Window::Month { year, month } => Window::Month {
                year,
                month: month + 1,
            },
            Window::Day { date } => Window::Day {
                date: date.succ_opt().unwrap_or(date),
            },
        }
    }

    /// Preceding month or day.
    pub fn prev(&self) -> Self {
        match *self {
            Window::Month { year, month } if month == 1 => Window::Month {
                year: year - 1,
                month: 12,
            },
            Window::Month { year, month } => Window::Month {
                year,
                month: month - 1,
            },
            Window::Day { date } => Window::Day {
                date: date.pred_opt().unwrap_or(date),
            },
        }
    }

    /// Navigating back is allowed while the previous window still has a day
    /// that is today or later.
    pub fn can_go_back(&self, today: CalendarDate) -> bool {
        let (_, last) = self.prev().range();
        last >= today
    }
}

fn first_of_month(year: i32, month: u32) -> CalendarDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn last_of_month(first: CalendarDate) -> CalendarDate {
    first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellStatus {
    Free,
    Pending,
    Confirmed,
    /// Padding day belonging to the neighbouring month.
    OutOfMonth,
}

impl From<SlotStatus> for CellStatus {
    fn from(status: SlotStatus) -> Self {
        match status {
            SlotStatus::Free => CellStatus::Free,
            SlotStatus::Pending => CellStatus::Pending,
            SlotStatus::Confirmed => CellStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub date: CalendarDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<TimeBlock>,
    pub status: CellStatus,
    pub is_today: bool,
    pub is_past: bool,
    pub is_clickable: bool,
    pub display_label: String,
}

impl Cell {
    fn new(
        date: CalendarDate,
        block: Option<TimeBlock>,
        status: CellStatus,
        today: CalendarDate,
    ) -> Self {
        let is_past = date < today;
        let is_clickable = !is_past
            && !matches!(status, CellStatus::Confirmed | CellStatus::OutOfMonth);
        let display_label = match block {
            Some(b) => b.label(),
            None => date.day().to_string(),
        };
        Self {
            date,
            block,
            status,
            is_today: date == today,
            is_past,
            is_clickable,
            display_label,
        }
    }
}

/// Render-ready rows of cells. Month grids have Monday-first week rows; day grids
/// have one row per time block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub window: Window,
    pub rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }
}

/// Map resolver output onto a window. Pure: no ledger access, no rendering.
pub fn project(
    statuses: &BTreeMap<SlotKey, SlotStatus>,
    window: &Window,
    today: CalendarDate,
) -> Grid {
    let rows = match *window {
        Window::Month { .. } => month_rows(statuses, window, today),
        Window::Day { date } => day_rows(statuses, date, today),
    };
    Grid {
        window: *window,
        rows,
    }
}

fn month_rows(
    statuses: &BTreeMap<SlotKey, SlotStatus>,
    window: &Window,
    today: CalendarDate,
) -> Vec<Vec<Cell>> {
    let (first, last) = window.range();
    let days = daily_status(statuses);

    let lead = u64::from(first.weekday().num_days_from_monday());
    let trail = u64::from(6 - last.weekday().num_days_from_monday());
    let grid_start = first.checked_sub_days(Days::new(lead)).unwrap_or(first);
    let grid_end = last.checked_add_days(Days::new(trail)).unwrap_or(last);

    let cells: Vec<Cell> = grid_start
        .iter_days()
        .take_while(|d| *d <= grid_end)
        .map(|date| {
            let status = if date < first || date > last {
                CellStatus::OutOfMonth
            } else {
                days.get(&date)
                    .copied()
                    .map(CellStatus::from)
                    .unwrap_or(CellStatus::Free)
            };
            Cell::new(date, None, status, today)
        })
        .collect();

    cells.chunks(7).map(<[Cell]>::to_vec).collect()
}

fn day_rows(
    statuses: &BTreeMap<SlotKey, SlotStatus>,
    date: CalendarDate,
    today: CalendarDate,
) -> Vec<Vec<Cell>> {
    statuses
        .iter()
        .filter(|(slot, _)| slot.date == date)
        .map(|(slot, status)| vec![Cell::new(date, slot.block, CellStatus::from(*status), today)])
        .collect()
}
