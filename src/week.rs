/*
 *  Salesboard - Discord bot for weekly sales leaderboards from Google Sheets.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */
use crate::activity::{ActivityRecord, Metric};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::BTreeMap;

/**
 * The 7-day span treated as "this week". Both ends are inclusive.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /**
     * The week containing `today`, starting on `week_start`.
     */
    pub fn containing(today: NaiveDate, week_start: Weekday) -> WeekWindow {
        let offset = (7 + today.weekday().num_days_from_monday()
            - week_start.num_days_from_monday())
            % 7;
        let start = today - Days::new(offset as u64);

        WeekWindow {
            start,
            end: start + Days::new(6),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/**
 * Summed metrics of one salesperson.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricTotals {
    pub dials: u64,
    pub doorknocks: u64,
    pub appointments: u64,
    pub presentations: u64,
}

impl MetricTotals {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Dials => self.dials,
            Metric::Doorknocks => self.doorknocks,
            Metric::Appointments => self.appointments,
            Metric::Presentations => self.presentations,
        }
    }

    fn add(&mut self, record: &ActivityRecord) {
        self.dials += u64::from(record.dials());
        self.doorknocks += u64::from(record.doorknocks());
        self.appointments += u64::from(record.appointments());
        self.presentations += u64::from(record.presentations());
    }
}

/**
 * Sums the metrics of every record inside `window`, per salesperson.
 *
 * Names are compared case-sensitively, after trimming surrounding whitespace.
 */
pub fn aggregate(records: &[ActivityRecord], window: &WeekWindow) -> BTreeMap<String, MetricTotals> {
    let mut totals: BTreeMap<String, MetricTotals> = BTreeMap::new();

    for record in records.iter().filter(|r| window.contains(r.date())) {
        totals
            .entry(record.name().trim().to_string())
            .or_default()
            .add(record);
    }

    totals
}
