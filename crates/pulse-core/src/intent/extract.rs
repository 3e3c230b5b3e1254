//! Entity extraction from free text: customers, amounts, dates, periods, limits

use chrono::{Duration, NaiveDate};
use regex::Regex;

use crate::error::Result;
use crate::period::ReportPeriod;

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("sept", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Month number for a full or abbreviated English month name
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    MONTHS.iter().find(|(m, _)| *m == lower).map(|(_, n)| *n)
}

/// Capitalized words that are never customer names
const NAME_STOP_WORDS: &[&str] = &[
    "a", "all", "an", "any", "customer", "customers", "each", "every", "her", "him", "invoice",
    "invoices", "it", "last", "me", "my", "next", "our", "overdue", "the", "them", "this",
    "today", "tomorrow", "us", "yesterday", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday",
];

/// Vocabulary checked in order; the first phrase found wins
const PERIOD_VOCABULARY: &[(&str, ReportPeriod)] = &[
    ("today", ReportPeriod::Today),
    ("yesterday", ReportPeriod::Yesterday),
    ("this week", ReportPeriod::ThisWeek),
    ("last week", ReportPeriod::LastWeek),
    ("this month", ReportPeriod::ThisMonth),
    ("last month", ReportPeriod::LastMonth),
    ("this quarter", ReportPeriod::ThisQuarter),
    ("this year", ReportPeriod::ThisYear),
    ("last year", ReportPeriod::LastYear),
];

pub struct Extractor {
    iso_date: Regex,
    slash_date: Regex,
    named_date: Regex,
    currency_amount: Regex,
    plain_amount: Regex,
    invoice_number: Regex,
    customer: Regex,
    last_days: Regex,
    limit: Regex,
    due_in: Regex,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            iso_date: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b")?,
            slash_date: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")?,
            named_date: Regex::new(
                r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?,?\s+(\d{4})\b",
            )?,
            currency_amount: Regex::new(
                r"(?i)(?:[$€£]|\b(?:kes|ksh|usd|eur|gbp)\.?)\s?(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?",
            )?,
            plain_amount: Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?\b")?,
            invoice_number: Regex::new(r"(?i)\binv[-\s#]?(\d+)\b")?,
            customer: Regex::new(
                r"\b(?:for|to|from)\s+([A-Z][\w&'.-]*(?:\s+[A-Z][\w&'.-]*)*)",
            )?,
            last_days: Regex::new(r"\b(?:last|past)\s+(\d+)\s+days?\b")?,
            limit: Regex::new(r"\b(?:last|latest|recent|top|first)\s+(\d+)\s+([a-z]+)")?,
            due_in: Regex::new(r"(?i)\bdue\s+in\s+(\d+)\s+days?\b")?,
        })
    }

    /// First explicit date: ISO, then DD/MM/YYYY, then "<day> <month> <year>"
    pub fn date(&self, text: &str) -> Option<NaiveDate> {
        if let Some(c) = self.iso_date.captures(text) {
            if let Some(d) = NaiveDate::from_ymd_opt(
                c[1].parse().ok()?,
                c[2].parse().ok()?,
                c[3].parse().ok()?,
            ) {
                return Some(d);
            }
        }
        if let Some(c) = self.slash_date.captures(text) {
            if let Some(d) = NaiveDate::from_ymd_opt(
                c[3].parse().ok()?,
                c[2].parse().ok()?,
                c[1].parse().ok()?,
            ) {
                return Some(d);
            }
        }
        let c = self.named_date.captures(text)?;
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month_number(&c[2])?, c[1].parse().ok()?)
    }

    /// Text with date spans and invoice numbers blanked out
    fn without_dates(&self, text: &str) -> String {
        let mut out = self.iso_date.replace_all(text, " ").into_owned();
        out = self.slash_date.replace_all(&out, " ").into_owned();
        out = self.named_date.replace_all(&out, " ").into_owned();
        out = self.due_in.replace_all(&out, " ").into_owned();
        out = self.last_days.replace_all(&out, " ").into_owned();
        self.invoice_number.replace_all(&out, " ").into_owned()
    }

    fn parse_amount(whole: &str, fraction: Option<&str>) -> Option<f64> {
        let mut s = whole.replace(',', "");
        if let Some(f) = fraction {
            s.push_str(f);
        }
        s.parse().ok()
    }

    /// Money amount: currency-prefixed first, then separated or decimal figures,
    /// then any bare number
    pub fn amount(&self, text: &str) -> Option<f64> {
        let cleaned = self.without_dates(text);

        if let Some(c) = self.currency_amount.captures(&cleaned) {
            return Self::parse_amount(&c[1], c.get(2).map(|m| m.as_str()));
        }

        let candidates: Vec<(bool, f64)> = self
            .plain_amount
            .captures_iter(&cleaned)
            .filter_map(|c| {
                let formatted = c[1].contains(',') || c.get(2).is_some();
                Self::parse_amount(&c[1], c.get(2).map(|m| m.as_str())).map(|v| (formatted, v))
            })
            .collect();

        candidates
            .iter()
            .find(|(formatted, _)| *formatted)
            .or_else(|| candidates.first())
            .map(|(_, v)| *v)
    }

    /// Capitalized name after `for`, `to` or `from`, on original-case text
    pub fn customer(&self, text: &str) -> Option<String> {
        for c in self.customer.captures_iter(text) {
            let candidate = c[1].trim_end_matches(['.', ',', '\'', '-']);
            let candidate = candidate.strip_suffix("'s").unwrap_or(candidate);
            let first = candidate.split_whitespace().next().unwrap_or_default();
            let first_lower = first.to_lowercase();
            if NAME_STOP_WORDS.contains(&first_lower.as_str()) || month_number(first).is_some() {
                continue;
            }
            if first_lower.starts_with("inv") && first.chars().any(|ch| ch.is_ascii_digit()) {
                continue;
            }
            if !candidate.is_empty() {
                return Some(candidate.to_string());
            }
        }
        None
    }

    /// Normalized invoice number, e.g. "inv 7" -> "INV-0007"
    pub fn invoice_number(&self, text: &str) -> Option<String> {
        let c = self.invoice_number.captures(text)?;
        let n: u32 = c[1].parse().ok()?;
        Some(format!("INV-{:04}", n))
    }

    /// Reporting period named in the text, else a specific date as a one-day period
    pub fn period(&self, lower: &str, original: &str) -> Option<ReportPeriod> {
        if let Some((_, period)) = PERIOD_VOCABULARY.iter().find(|(p, _)| lower.contains(p)) {
            return Some(*period);
        }
        if let Some(c) = self.last_days.captures(lower) {
            let days: i64 = c[1].parse().ok()?;
            return Some(ReportPeriod::LastDays { days: days.max(1) });
        }
        self.date(original).map(|date| ReportPeriod::Day { date })
    }

    /// "last N <things>" listing limit; calendar units are periods, not limits
    pub fn limit(&self, lower: &str) -> Option<i64> {
        self.limit.captures_iter(lower).find_map(|c| {
            let noun = &c[2];
            let calendar = ["day", "days", "week", "weeks", "month", "months", "year", "years"];
            if calendar.contains(&noun) {
                return None;
            }
            c[1].parse().ok().filter(|n: &i64| *n > 0)
        })
    }

    /// Due date from "due in N days" relative to `issue`
    pub fn due_in(&self, text: &str, issue: NaiveDate) -> Option<NaiveDate> {
        let c = self.due_in.captures(text)?;
        let days: i64 = c[1].parse().ok()?;
        Duration::try_days(days).and_then(|d| issue.checked_add_signed(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn extractor() -> Extractor {
        Extractor::new().unwrap()
    }

    #[test]
    fn test_dates() {
        let e = extractor();
        assert_eq!(e.date("on 2025-03-01 please"), Some(d(2025, 3, 1)));
        // Slash dates are day first
        assert_eq!(e.date("paid 05/04/2025"), Some(d(2025, 4, 5)));
        assert_eq!(e.date("on the 3rd March 2025"), Some(d(2025, 3, 3)));
        assert_eq!(e.date("on 14 Sept 2025"), Some(d(2025, 9, 14)));
        assert_eq!(e.date("no date here"), None);
    }

    #[test]
    fn test_amounts() {
        let e = extractor();
        assert_eq!(e.amount("invoice Acme KES 45,000 due in 14 days"), Some(45000.0));
        assert_eq!(e.amount("invoice for $1,250.50"), Some(1250.5));
        // Separated figure preferred over a bare number
        assert_eq!(e.amount("3 units at 12,500"), Some(12500.0));
        // Date spans and invoice numbers are not amounts
        assert_eq!(e.amount("record payment on 2025-03-01 for INV-0042 of 900"), Some(900.0));
        assert_eq!(e.amount("nothing numeric"), None);
    }

    #[test]
    fn test_customer_names() {
        let e = extractor();
        assert_eq!(e.customer("Create an invoice for Acme Ltd for 5000"), Some("Acme Ltd".into()));
        assert_eq!(e.customer("send reminders to Jua Kali Traders."), Some("Jua Kali Traders".into()));
        assert_eq!(e.customer("invoice for March"), None);
        assert_eq!(e.customer("remind them for the overdue ones"), None);
        assert_eq!(e.customer("payment from Zawadi's"), Some("Zawadi".into()));
    }

    #[test]
    fn test_periods() {
        let e = extractor();
        assert_eq!(e.period("what did we spend today", ""), Some(ReportPeriod::Today));
        assert_eq!(e.period("sales last month", ""), Some(ReportPeriod::LastMonth));
        assert_eq!(
            e.period("expenses over the last 10 days", ""),
            Some(ReportPeriod::LastDays { days: 10 })
        );
        assert_eq!(
            e.period("expenses on 2025-03-01", "expenses on 2025-03-01"),
            Some(ReportPeriod::Day { date: d(2025, 3, 1) })
        );
        assert_eq!(e.period("expenses", "expenses"), None);
    }

    #[test]
    fn test_limits() {
        let e = extractor();
        assert_eq!(e.limit("show me the last 3 transactions"), Some(3));
        assert_eq!(e.limit("expenses for the last 7 days"), None);
        assert_eq!(e.limit("top 5 expenses"), Some(5));
    }

    #[test]
    fn test_invoice_number_and_due() {
        let e = extractor();
        assert_eq!(e.invoice_number("mark inv 7 as paid"), Some("INV-0007".into()));
        assert_eq!(e.invoice_number("INV-0042 paid"), Some("INV-0042".into()));
        assert_eq!(e.due_in("due in 14 days", d(2025, 3, 14)), Some(d(2025, 3, 28)));
        assert_eq!(e.due_in("due in 9999999999 days", d(2025, 3, 14)), None);
    }
}
