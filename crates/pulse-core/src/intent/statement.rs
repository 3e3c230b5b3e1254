//! Bank-statement text: detection and line extraction

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::extract::month_number;
use crate::error::Result;
use crate::models::Direction;

/// One movement read from a statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub direction: Direction,
}

pub struct StatementParser {
    day_month: Regex,
    iso_date: Regex,
    slash_date: Regex,
    amount: Regex,
    transaction_keyword: Regex,
    header_keyword: Regex,
    credit_marker: Regex,
    debit_marker: Regex,
}

impl StatementParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            day_month: Regex::new(
                r"\b(\d{1,2})[\s-](Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\b(?:[\s-](\d{4}|\d{2})\b)?",
            )?,
            iso_date: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b")?,
            slash_date: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")?,
            amount: Regex::new(r"(?:^|[\s(])(-?)(?:[A-Z]{3}\s?|[$€£]\s?)?(\d{1,3}(?:,\d{3})*|\d+)\.(\d{2})\b")?,
            transaction_keyword: Regex::new(
                r"(?i)\b(debit|credit|withdrawal|deposit|transfer|payment|purchase|pos|atm|paybill|till|received|paid)\b",
            )?,
            header_keyword: Regex::new(
                r"(?i)\b(statement|account number|opening balance|closing balance|transaction date|value date)\b",
            )?,
            credit_marker: Regex::new(r"(?i)\b(cr|credit|deposit|received|refund|salary in)\b")?,
            debit_marker: Regex::new(r"(?i)\b(dr|debit|withdrawal|purchase|paid to|payment to|pos|atm|charge|fee)\b")?,
        })
    }

    fn amount_count(&self, text: &str) -> usize {
        self.amount.find_iter(text).count()
    }

    /// Heuristic on original-case text
    pub fn looks_like_statement(&self, text: &str) -> bool {
        let dates = self.day_month.find_iter(text).count();
        let amounts = self.amount_count(text);
        let has_keyword = self.transaction_keyword.is_match(text);

        (dates >= 2 && has_keyword && amounts >= 3)
            || (self.header_keyword.is_match(text) && amounts >= 2 && has_keyword)
    }

    fn line_date(&self, line: &str, today: NaiveDate) -> Option<(NaiveDate, String)> {
        if let Some(c) = self.iso_date.captures(line) {
            let date = NaiveDate::from_ymd_opt(
                c[1].parse().ok()?,
                c[2].parse().ok()?,
                c[3].parse().ok()?,
            )?;
            return Some((date, c[0].to_string()));
        }
        if let Some(c) = self.slash_date.captures(line) {
            let date = NaiveDate::from_ymd_opt(
                c[3].parse().ok()?,
                c[2].parse().ok()?,
                c[1].parse().ok()?,
            )?;
            return Some((date, c[0].to_string()));
        }
        let c = self.day_month.captures(line)?;
        let day: u32 = c[1].parse().ok()?;
        let month = month_number(&c[2])?;
        let date = match c.get(3) {
            Some(y) => {
                let mut year: i32 = y.as_str().parse().ok()?;
                if year < 100 {
                    year += 2000;
                }
                NaiveDate::from_ymd_opt(year, month, day)?
            }
            // No year: the most recent such date not after today
            None => {
                let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
                if this_year > today {
                    NaiveDate::from_ymd_opt(today.year() - 1, month, day)?
                } else {
                    this_year
                }
            }
        };
        Some((date, c[0].to_string()))
    }

    /// Extract dated movements; lines without a date or amount are skipped
    ///
    /// The first amount on a line is the movement; a trailing second amount is
    /// taken as the running balance and ignored.
    pub fn parse(&self, text: &str, today: NaiveDate) -> Vec<StatementLine> {
        let mut lines = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || self.header_keyword.is_match(line) {
                continue;
            }
            let Some((date, date_text)) = self.line_date(line, today) else {
                continue;
            };
            let Some(first) = self.amount.captures(line) else {
                continue;
            };

            let negative = &first[1] == "-";
            let whole = first[2].replace(',', "");
            let Ok(amount) = format!("{}.{}", whole, &first[3]).parse::<f64>() else {
                continue;
            };
            if amount <= 0.0 {
                continue;
            }

            let direction = if negative || self.debit_marker.is_match(line) {
                Direction::Expense
            } else if self.credit_marker.is_match(line) {
                Direction::Income
            } else {
                Direction::Expense
            };

            let without_date = line.replacen(&date_text, " ", 1);
            let without_amounts = self.amount.replace_all(&without_date, " ");
            let description = without_amounts
                .split_whitespace()
                .filter(|w| !matches!(w.to_ascii_uppercase().as_str(), "CR" | "DR"))
                .collect::<Vec<_>>()
                .join(" ");

            lines.push(StatementLine {
                date,
                description: if description.is_empty() {
                    "Statement entry".to_string()
                } else {
                    description
                },
                amount,
                direction,
            });
        }
        lines
    }
}
