// Two-source contribution reconciliation.
//
// The CRM and the payment processor share no identifier, so rows are joined
// on a composite key of amount, last name and date. Every row of either
// source ends up in exactly one class: matched, CRM-only or processor-only.
use crate::types::{RawCrmRow, RawProcessorRow, RawSourceCodeRow, ReconcileSummary, ReconciledRow};
use crate::util::{parse_date_safe, parse_f64_safe};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Matched,
    CrmOnly,
    ProcessorOnly,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Matched => write!(f, "both"),
            MatchStatus::CrmOnly => write!(f, "CRM_only"),
            MatchStatus::ProcessorOnly => write!(f, "Processor_only"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub date: NaiveDate,
    pub cents: i64,
    pub last_name: String,
}

/// Upper-cased first word of a last name. The CRM stores compound names
/// inconsistently, so only the first word is compared.
pub fn truncate_last_name(name: &str) -> String {
    name.split_whitespace().next().unwrap_or("").to_uppercase()
}

pub fn match_key(amount: f64, last_name: &str, date: NaiveDate) -> MatchKey {
    MatchKey {
        date,
        cents: (amount * 100.0).round() as i64,
        last_name: truncate_last_name(last_name),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrmContribution {
    pub contribution_id: String,
    pub vanid: String,
    pub first_name: String,
    pub last_name: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub source_code: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorContribution {
    pub receipt_id: String,
    pub first_name: String,
    pub last_name: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub fundraiser_recipient_id: String,
    pub reference_code: String,
    pub source_code: String,
    pub tags: String,
}

fn text(s: &Option<String>) -> String {
    s.as_deref().unwrap_or("").trim().to_string()
}

/// `"Last, First"`; a name without a comma is all last name.
fn split_contact_name(name: &str) -> (String, String) {
    match name.split_once(',') {
        Some((last, first)) => (first.trim().to_uppercase(), last.trim().to_uppercase()),
        None => (String::new(), name.trim().to_uppercase()),
    }
}

pub fn clean_crm(rows: &[RawCrmRow]) -> (Vec<CrmContribution>, usize) {
    let mut skipped = 0;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let amount = parse_f64_safe(row.amount.as_deref());
        let date = parse_date_safe(row.date_received.as_deref());
        let (Some(amount), Some(date)) = (amount, date) else {
            skipped += 1;
            continue;
        };
        let (first_name, last_name) = split_contact_name(&text(&row.contact_name));
        out.push(CrmContribution {
            contribution_id: text(&row.contribution_id),
            vanid: text(&row.vanid),
            first_name,
            last_name,
            amount,
            date,
            source_code: text(&row.source_code),
        });
    }
    (out, skipped)
}

/// Clean processor rows and attach the campaign's source code and tags by
/// (fundraiser recipient, reference code).
pub fn clean_processor(
    rows: &[RawProcessorRow],
    codes: &[RawSourceCodeRow],
) -> (Vec<ProcessorContribution>, usize) {
    let lookup: HashMap<(String, String), (String, String)> = codes
        .iter()
        .map(|c| {
            (
                (text(&c.fundraiser_recipient_id), text(&c.reference_code)),
                (text(&c.source_code), text(&c.tags)),
            )
        })
        .collect();

    let mut skipped = 0;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let amount = parse_f64_safe(row.amount.as_deref());
        let date = parse_date_safe(row.date.as_deref());
        let (Some(amount), Some(date)) = (amount, date) else {
            skipped += 1;
            continue;
        };
        let recipient = text(&row.fundraiser_recipient_id);
        let reference = text(&row.reference_code);
        let (source_code, tags) = lookup
            .get(&(recipient.clone(), reference.clone()))
            .cloned()
            .unwrap_or_default();
        out.push(ProcessorContribution {
            receipt_id: text(&row.receipt_id),
            first_name: text(&row.donor_first_name).to_uppercase(),
            last_name: text(&row.donor_last_name).to_uppercase(),
            amount,
            date,
            fundraiser_recipient_id: recipient,
            reference_code: reference,
            source_code,
            tags,
        });
    }
    (out, skipped)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<'a> {
    pub key: MatchKey,
    pub status: MatchStatus,
    pub crm: Option<&'a CrmContribution>,
    pub processor: Option<&'a ProcessorContribution>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Rows dated on or after this are dropped from both sources.
    pub cutoff: Option<NaiveDate>,
    /// CRM source codes that mark processor-originated contributions.
    pub codes: Vec<String>,
}

type Group<'a> = (Vec<&'a CrmContribution>, Vec<&'a ProcessorContribution>);

/// Full outer join of the two sources on `MatchKey`. Keys present on both
/// sides pair every CRM row with every processor row for that key.
pub fn outer_join<'a>(
    crm: &'a [CrmContribution],
    processor: &'a [ProcessorContribution],
    cutoff: Option<NaiveDate>,
) -> Vec<Reconciled<'a>> {
    let before_cutoff = |d: NaiveDate| cutoff.map_or(true, |c| d < c);

    let mut groups: BTreeMap<MatchKey, Group<'a>> = BTreeMap::new();
    for c in crm.iter().filter(|c| before_cutoff(c.date)) {
        groups
            .entry(match_key(c.amount, &c.last_name, c.date))
            .or_default()
            .0
            .push(c);
    }
    for p in processor.iter().filter(|p| before_cutoff(p.date)) {
        groups
            .entry(match_key(p.amount, &p.last_name, p.date))
            .or_default()
            .1
            .push(p);
    }

    let mut out = Vec::new();
    for (key, (left, right)) in groups {
        match (left.is_empty(), right.is_empty()) {
            (false, false) => {
                for &c in &left {
                    for &p in &right {
                        out.push(Reconciled {
                            key: key.clone(),
                            status: MatchStatus::Matched,
                            crm: Some(c),
                            processor: Some(p),
                        });
                    }
                }
            }
            (false, true) => out.extend(left.into_iter().map(|c| Reconciled {
                key: key.clone(),
                status: MatchStatus::CrmOnly,
                crm: Some(c),
                processor: None,
            })),
            (true, false) => out.extend(right.into_iter().map(|p| Reconciled {
                key: key.clone(),
                status: MatchStatus::ProcessorOnly,
                crm: None,
                processor: Some(p),
            })),
            (true, true) => {}
        }
    }
    out
}

/// Keep processor-only rows and rows whose CRM source code is one of the
/// processor codes; the rest are CRM contributions from other channels.
pub fn filter_codes<'a>(rows: Vec<Reconciled<'a>>, codes: &[String]) -> Vec<Reconciled<'a>> {
    rows.into_iter()
        .filter(|r| {
            r.status == MatchStatus::ProcessorOnly
                || r.crm.is_some_and(|c| codes.iter().any(|code| *code == c.source_code))
        })
        .collect()
}

pub fn to_row(r: &Reconciled<'_>) -> ReconciledRow {
    let crm = r.crm;
    let p = r.processor;
    let last_name = crm
        .map(|c| c.last_name.clone())
        .or_else(|| p.map(|p| p.last_name.clone()))
        .unwrap_or_default();
    ReconciledRow {
        date: r.key.date.format("%Y-%m-%d").to_string(),
        amount: format!("{:.2}", r.key.cents as f64 / 100.0),
        last_name,
        status: r.status.to_string(),
        contribution_id: crm.map(|c| c.contribution_id.clone()).unwrap_or_default(),
        vanid: crm.map(|c| c.vanid.clone()).unwrap_or_default(),
        crm_first_name: crm.map(|c| c.first_name.clone()).unwrap_or_default(),
        crm_source_code: crm.map(|c| c.source_code.clone()).unwrap_or_default(),
        receipt_id: p.map(|p| p.receipt_id.clone()).unwrap_or_default(),
        processor_first_name: p.map(|p| p.first_name.clone()).unwrap_or_default(),
        reference_code: p.map(|p| p.reference_code.clone()).unwrap_or_default(),
        processor_source_code: p.map(|p| p.source_code.clone()).unwrap_or_default(),
        tags: p.map(|p| p.tags.clone()).unwrap_or_default(),
    }
}

/// Join, filter to the configured codes, sort by date and summarise.
pub fn reconcile(
    crm: &[CrmContribution],
    processor: &[ProcessorContribution],
    options: &ReconcileOptions,
) -> (Vec<ReconciledRow>, ReconcileSummary) {
    let joined = outer_join(crm, processor, options.cutoff);
    let count = |s: MatchStatus| joined.iter().filter(|r| r.status == s).count();
    let mut summary = ReconcileSummary {
        crm_rows: crm.len(),
        processor_rows: processor.len(),
        skipped_rows: 0,
        matched: count(MatchStatus::Matched),
        crm_only: count(MatchStatus::CrmOnly),
        processor_only: count(MatchStatus::ProcessorOnly),
        exported_rows: 0,
    };
    let mut kept = filter_codes(joined, &options.codes);
    kept.sort_by(|a, b| a.key.date.cmp(&b.key.date));
    let rows: Vec<ReconciledRow> = kept.iter().map(to_row).collect();
    summary.exported_rows = rows.len();
    (rows, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn crm(id: &str, last: &str, amount: f64, d: &str, code: &str) -> CrmContribution {
        CrmContribution {
            contribution_id: id.into(),
            last_name: last.into(),
            amount,
            date: date(d),
            source_code: code.into(),
            ..CrmContribution::default()
        }
    }

    fn proc_row(id: &str, last: &str, amount: f64, d: &str) -> ProcessorContribution {
        ProcessorContribution {
            receipt_id: id.into(),
            last_name: last.into(),
            amount,
            date: date(d),
            ..ProcessorContribution::default()
        }
    }

    #[test]
    fn key_truncates_and_normalises() {
        let a = match_key(25.0, "van dyke", date("2020-03-02"));
        let b = match_key(25.004, "VAN", date("2020-03-02"));
        assert_eq!(a, b);
        assert_ne!(a, match_key(25.01, "VAN", date("2020-03-02")));
    }

    #[test]
    fn splits_contact_names() {
        assert_eq!(split_contact_name("Smith, Jane"), ("JANE".to_string(), "SMITH".to_string()));
        assert_eq!(split_contact_name("Acme PAC"), (String::new(), "ACME PAC".to_string()));
    }

    #[test]
    fn every_row_lands_in_one_class() {
        let crm_rows = vec![
            crm("c1", "SMITH", 25.0, "2020-03-02", "ActBlue"),
            crm("c2", "JONES", 10.0, "2020-03-03", "Check"),
        ];
        let proc_rows = vec![
            proc_row("p1", "Smith", 25.0, "2020-03-02"),
            proc_row("p2", "Brown", 50.0, "2020-03-04"),
        ];
        let joined = outer_join(&crm_rows, &proc_rows, None);
        assert_eq!(joined.len(), 3);

        let crm_seen: HashSet<&str> =
            joined.iter().filter_map(|r| r.crm).map(|c| c.contribution_id.as_str()).collect();
        let proc_seen: HashSet<&str> =
            joined.iter().filter_map(|r| r.processor).map(|p| p.receipt_id.as_str()).collect();
        assert_eq!(crm_seen.len(), crm_rows.len());
        assert_eq!(proc_seen.len(), proc_rows.len());

        let status_of = |id: &str| {
            joined
                .iter()
                .find(|r| r.crm.map(|c| c.contribution_id.as_str()) == Some(id))
                .unwrap()
                .status
        };
        assert_eq!(status_of("c1"), MatchStatus::Matched);
        assert_eq!(status_of("c2"), MatchStatus::CrmOnly);
        assert!(joined.iter().any(|r| {
            r.status == MatchStatus::ProcessorOnly && r.processor.unwrap().receipt_id == "p2"
        }));
    }

    #[test]
    fn duplicate_keys_pair_every_row() {
        let crm_rows = vec![
            crm("c1", "LEE", 5.0, "2020-01-01", "ActBlue"),
            crm("c2", "LEE", 5.0, "2020-01-01", "ActBlue"),
        ];
        let proc_rows = vec![
            proc_row("p1", "Lee", 5.0, "2020-01-01"),
            proc_row("p2", "Lee", 5.0, "2020-01-01"),
        ];
        let joined = outer_join(&crm_rows, &proc_rows, None);
        assert_eq!(joined.len(), 4);
        assert!(joined.iter().all(|r| r.status == MatchStatus::Matched));
    }

    #[test]
    fn cutoff_and_code_filter() {
        let crm_rows = vec![
            crm("c1", "SMITH", 25.0, "2020-03-02", "ActBlue"),
            crm("c2", "JONES", 10.0, "2020-03-03", "Check"),
            crm("c3", "DIAZ", 10.0, "2021-02-01", "ActBlue"),
        ];
        let proc_rows = vec![
            proc_row("p1", "Smith", 25.0, "2020-03-02"),
            proc_row("p2", "Brown", 50.0, "2020-01-04"),
        ];
        let options = ReconcileOptions {
            cutoff: Some(date("2021-01-01")),
            codes: vec!["ActBlue".to_string(), "ActBlue General".to_string()],
        };
        let (rows, summary) = reconcile(&crm_rows, &proc_rows, &options);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.crm_only, 1);
        assert_eq!(summary.processor_only, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "Processor_only");
        assert_eq!(rows[0].date, "2020-01-04");
        assert_eq!(rows[1].status, "both");
        assert_eq!(rows[1].receipt_id, "p1");
    }

    #[test]
    fn processor_rows_pick_up_source_codes() {
        let raw = vec![RawProcessorRow {
            receipt_id: Some("r1".into()),
            date: Some("2020-05-01 10:00:00".into()),
            amount: Some("20".into()),
            fundraiser_recipient_id: Some("42".into()),
            reference_code: Some("email".into()),
            donor_first_name: Some("Ana".into()),
            donor_last_name: Some("Muñoz".into()),
        }];
        let codes = vec![RawSourceCodeRow {
            fundraiser_recipient_id: Some("42".into()),
            reference_code: Some("email".into()),
            source_code: Some("Email Program".into()),
            tags: Some("digital".into()),
        }];
        let (rows, skipped) = clean_processor(&raw, &codes);
        assert_eq!(skipped, 0);
        assert_eq!(rows[0].source_code, "Email Program");
        assert_eq!(rows[0].last_name, "MUÑOZ");
    }
}
