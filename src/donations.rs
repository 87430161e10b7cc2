// Donation classification and monthly giving summaries.
//
// Every contribution gets one general type: cash and in-kind come straight
// from the payment fields, anything else from the shared source-code lookup.
// Sums, counts and means are then taken per month and type.
use crate::config::SourceOverride;
use crate::types::{DonationRow, DonationSummaryRow, RawDonationRow, RawSourceGroupRow};
use crate::util::{format_number, parse_date_safe, parse_f64_safe};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const CASH: &str = "Cash";
pub const IN_KIND: &str = "In-Kind";
pub const UNKNOWN: &str = "Other or Unknown";

#[derive(Debug, Clone, Default)]
pub struct Donation {
    pub contribution_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub source_code: String,
    pub source_code_path: String,
    pub payment_method: String,
    pub kind: String,
}

type GroupKey = (String, String);

pub fn group_lookup(rows: &[RawSourceGroupRow]) -> HashMap<GroupKey, String> {
    rows.iter()
        .filter_map(|r| {
            let code = r.source_code.as_deref()?.trim().to_string();
            let path = r.source_code_path.as_deref().unwrap_or("").trim().to_string();
            let group = r.group.as_deref()?.trim();
            (!group.is_empty()).then(|| ((code, path), group.to_string()))
        })
        .collect()
}

/// Payment fields win over the source-code lookup.
pub fn classify(
    payment_method: &str,
    contribution_type: &str,
    source: &GroupKey,
    groups: &HashMap<GroupKey, String>,
) -> String {
    if payment_method == CASH {
        return CASH.to_string();
    }
    if payment_method == IN_KIND || contribution_type == "In-kind Contribution" {
        return IN_KIND.to_string();
    }
    groups.get(source).cloned().unwrap_or_else(|| UNKNOWN.to_string())
}

/// Parse, correct, date-filter and classify the export. Returns the kept
/// donations and the number of rows without a usable date or amount.
pub fn clean_donations(
    rows: &[RawDonationRow],
    groups: &HashMap<GroupKey, String>,
    overrides: &[SourceOverride],
    end_date: Option<NaiveDate>,
) -> (Vec<Donation>, usize) {
    let text = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();
    let mut skipped = 0;
    let mut out = Vec::new();
    for r in rows {
        let (Some(date), Some(amount)) = (
            parse_date_safe(r.date_received.as_deref()),
            parse_f64_safe(r.amount.as_deref()),
        ) else {
            skipped += 1;
            continue;
        };
        if end_date.is_some_and(|end| date >= end) {
            continue;
        }
        let contribution_id = text(&r.contribution_id);
        let mut source = (text(&r.source_code), text(&r.source_code_path));
        if let Some(o) = overrides.iter().find(|o| o.contribution_id == contribution_id) {
            source = (o.source_code.clone(), o.source_code_path.clone());
        }
        let payment_method = text(&r.payment_method);
        let kind = classify(&payment_method, &text(&r.contribution_type), &source, groups);
        out.push(Donation {
            contribution_id,
            date,
            amount,
            source_code: source.0,
            source_code_path: source.1,
            payment_method,
            kind,
        });
    }
    (out, skipped)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyStats {
    pub year: i32,
    pub month: u32,
    pub kind: String,
    pub sum: f64,
    pub count: usize,
}

impl MonthlyStats {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Sum and count per (year, month, type), in that order.
pub fn monthly_summary(donations: &[Donation]) -> Vec<MonthlyStats> {
    let mut acc: BTreeMap<(i32, u32, &str), (f64, usize)> = BTreeMap::new();
    for d in donations {
        let e = acc.entry((d.date.year(), d.date.month(), d.kind.as_str())).or_default();
        e.0 += d.amount;
        e.1 += 1;
    }
    acc.into_iter()
        .map(|((year, month, kind), (sum, count))| MonthlyStats {
            year,
            month,
            kind: kind.to_string(),
            sum,
            count,
        })
        .collect()
}

/// Month-by-type table with the cash totals: everything except in-kind
/// gifts counts as cash on hand.
#[derive(Debug, Clone, Default)]
pub struct MonthlyPivot {
    pub kinds: Vec<String>,
    /// (year, month) -> type -> (sum, count)
    pub months: BTreeMap<(i32, u32), BTreeMap<String, (f64, usize)>>,
}

impl MonthlyPivot {
    pub fn new(summary: &[MonthlyStats]) -> Self {
        let kinds: BTreeSet<&str> = summary.iter().map(|s| s.kind.as_str()).collect();
        let mut months: BTreeMap<(i32, u32), BTreeMap<String, (f64, usize)>> = BTreeMap::new();
        for s in summary {
            months
                .entry((s.year, s.month))
                .or_default()
                .insert(s.kind.clone(), (s.sum, s.count));
        }
        MonthlyPivot { kinds: kinds.into_iter().map(String::from).collect(), months }
    }

    /// Cash on hand and the number of cash donations for one month.
    pub fn cash(&self, year: i32, month: u32) -> (f64, usize) {
        let Some(by_kind) = self.months.get(&(year, month)) else { return (0.0, 0) };
        by_kind
            .iter()
            .filter(|(kind, _)| kind.as_str() != IN_KIND)
            .fold((0.0, 0), |(s, c), (_, (sum, count))| (s + sum, c + count))
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["date".to_string()];
        header.extend(self.kinds.iter().map(|k| format!("count_{}", k)));
        header.extend(self.kinds.iter().map(|k| format!("sum_{}", k)));
        header.push("Total_Cash_onhand".to_string());
        header.push("Count_Cash_Donation".to_string());
        header
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        self.months
            .iter()
            .map(|(&(year, month), by_kind)| {
                let get = |k: &String| by_kind.get(k).copied().unwrap_or((0.0, 0));
                let mut rec = vec![format!("{:04}-{:02}-01", year, month)];
                rec.extend(self.kinds.iter().map(|k| get(k).1.to_string()));
                rec.extend(self.kinds.iter().map(|k| get(k).0.to_string()));
                let (cash, count) = self.cash(year, month);
                rec.push(cash.to_string());
                rec.push(count.to_string());
                rec
            })
            .collect()
    }

    /// Cash on hand by calendar month for each year in `years`; months
    /// without gifts are zero.
    pub fn year_comparison(&self, years: &[i32]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header = vec!["month".to_string()];
        header.extend(years.iter().map(|y| y.to_string()));
        let records = (1..=12)
            .map(|month| {
                let mut rec = vec![month.to_string()];
                rec.extend(years.iter().map(|&y| self.cash(y, month).0.to_string()));
                rec
            })
            .collect();
        (header, records)
    }
}

pub fn donation_row(d: &Donation) -> DonationRow {
    DonationRow {
        contribution_id: d.contribution_id.clone(),
        date: d.date.format("%Y-%m-%d").to_string(),
        amount: format!("{:.2}", d.amount),
        source_code: d.source_code.clone(),
        source_code_path: d.source_code_path.clone(),
        payment_method: d.payment_method.clone(),
        kind: d.kind.clone(),
        year: d.date.year(),
        month: d.date.month(),
    }
}

pub fn summary_row(s: &MonthlyStats) -> DonationSummaryRow {
    DonationSummaryRow {
        date: format!("{:04}-{:02}-01", s.year, s.month),
        year: s.year,
        month: s.month,
        kind: s.kind.clone(),
        sum: format_number(s.sum, 2),
        count: s.count,
        mean: format_number(s.mean(), 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, amount: &str, date: &str, code: &str, method: &str) -> RawDonationRow {
        RawDonationRow {
            contribution_id: Some(id.into()),
            amount: Some(amount.into()),
            date_received: Some(date.into()),
            source_code: Some(code.into()),
            source_code_path: Some(format!("Path/{}", code)),
            payment_method: Some(method.into()),
            contribution_type: None,
        }
    }

    fn groups() -> HashMap<GroupKey, String> {
        group_lookup(&[RawSourceGroupRow {
            source_code: Some("Web".into()),
            source_code_path: Some("Path/Web".into()),
            group: Some("Online".into()),
        }])
    }

    #[test]
    fn payment_fields_take_priority() {
        let g = groups();
        let web = ("Web".to_string(), "Path/Web".to_string());
        assert_eq!(classify("Cash", "", &web, &g), CASH);
        assert_eq!(classify("In-Kind", "", &web, &g), IN_KIND);
        assert_eq!(classify("Check", "In-kind Contribution", &web, &g), IN_KIND);
        assert_eq!(classify("Check", "", &web, &g), "Online");
        let other = ("Mail".to_string(), String::new());
        assert_eq!(classify("Check", "", &other, &g), UNKNOWN);
    }

    #[test]
    fn cleaning_applies_overrides_and_end_date() {
        let rows = vec![
            raw("1", "$25.00", "2021-03-04", "Web", "Credit Card"),
            raw("2", "100", "2021-03-10", "Misc", "Check"),
            raw("3", "10", "2021-10-01", "Web", "Credit Card"),
            raw("4", "abc", "2021-03-10", "Web", "Credit Card"),
        ];
        let overrides = vec![SourceOverride {
            contribution_id: "2".into(),
            source_code: "Web".into(),
            source_code_path: "Path/Web".into(),
        }];
        let end = NaiveDate::from_ymd_opt(2021, 10, 1);
        let (donations, skipped) = clean_donations(&rows, &groups(), &overrides, end);
        assert_eq!(skipped, 1);
        assert_eq!(donations.len(), 2);
        assert!(donations.iter().all(|d| d.kind == "Online"));
        assert_eq!(donations[1].source_code, "Web");
    }

    fn donation(date: (i32, u32, u32), amount: f64, kind: &str) -> Donation {
        Donation {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            amount,
            kind: kind.into(),
            ..Donation::default()
        }
    }

    #[test]
    fn monthly_summary_and_cash_on_hand() {
        let donations = vec![
            donation((2021, 1, 5), 10.0, CASH),
            donation((2021, 1, 20), 30.0, CASH),
            donation((2021, 1, 7), 500.0, IN_KIND),
            donation((2021, 1, 9), 60.0, "Online"),
            donation((2021, 3, 1), 5.0, "Online"),
        ];
        let summary = monthly_summary(&donations);
        assert_eq!(summary.len(), 4);
        assert_eq!(summary[0].kind, CASH);
        assert_eq!((summary[0].sum, summary[0].count), (40.0, 2));
        assert_eq!(summary[0].mean(), 20.0);

        let pivot = MonthlyPivot::new(&summary);
        assert_eq!(pivot.cash(2021, 1), (100.0, 3));
        assert_eq!(pivot.cash(2021, 2), (0.0, 0));
        assert_eq!(
            pivot.header(),
            vec![
                "date",
                "count_Cash",
                "count_In-Kind",
                "count_Online",
                "sum_Cash",
                "sum_In-Kind",
                "sum_Online",
                "Total_Cash_onhand",
                "Count_Cash_Donation",
            ]
        );
        let records = pivot.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], vec!["2021-03-01", "0", "0", "1", "0", "0", "5", "5", "1"]);

        let (header, rows) = pivot.year_comparison(&[2019, 2021]);
        assert_eq!(header, vec!["month", "2019", "2021"]);
        assert_eq!(rows[0], vec!["1", "0", "100"]);
        assert_eq!(rows.len(), 12);
    }

    #[test]
    fn summary_rows_format_money() {
        let s = MonthlyStats { year: 2021, month: 2, kind: CASH.into(), sum: 1234.5, count: 3 };
        let row = summary_row(&s);
        assert_eq!(row.date, "2021-02-01");
        assert_eq!(row.sum, "1,234.50");
        assert_eq!(row.mean, "411.50");
    }
}
