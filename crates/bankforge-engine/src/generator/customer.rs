//! Customers and their fund accounts.

use bankforge_types::cursor::StageCursor;
use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use chrono::{Duration, NaiveDate};
use rand::Rng;

use super::reference::person_name;
use super::{
    draw_amount, draw_count, draw_date, keyed_rng, offset_batch, offset_window, pick,
    window_batch, EntityGenerator, GeneratedBatch, ReferenceNeed, UpstreamRefs,
};
use crate::config::types::CountRange;
use crate::error::GeneratorError;

const CITIES: &[&str] = &[
    "Beijing", "Shanghai", "Guangzhou", "Shenzhen", "Hangzhou", "Chengdu", "Wuhan", "Nanjing",
    "Suzhou", "Xi'an",
];

const OCCUPATIONS: &[&str] = &[
    "engineer", "teacher", "doctor", "civil servant", "self-employed", "sales", "accountant",
    "student", "retired", "designer",
];

/// Customer tiers with cumulative weights out of 100.
const TIERS: &[(&str, u32)] = &[("regular", 70), ("silver", 88), ("gold", 97), ("private", 100)];

#[must_use]
pub fn customer_key(index: u64) -> String {
    format!("C{:08}", index + 1)
}

#[must_use]
pub fn account_key(customer: &str, seq: u32) -> String {
    format!("FA-{customer}-{seq:02}")
}

/// Prefix shared by every account key of `customer`.
#[must_use]
pub fn account_prefix(customer: &str) -> String {
    format!("FA-{customer}-")
}

/// `customer`: retail bank customers, each assigned a manager.
pub struct CustomerGenerator {
    seed: u64,
    total: u64,
    registered_from: NaiveDate,
    registered_days: i64,
}

impl CustomerGenerator {
    /// Customers register at some point in the ten years before
    /// `period_start`.
    #[must_use]
    pub fn new(seed: u64, total: u64, period_start: NaiveDate) -> Self {
        Self {
            seed,
            total,
            registered_from: period_start - Duration::days(3650),
            registered_days: 3650,
        }
    }
}

impl EntityGenerator for CustomerGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![ReferenceNeed::Lookup(StageName::new("bank_manager"))]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let managers = refs.lookup("bank_manager")?;
        let window = offset_window(cursor, self.total, batch_size)?;
        if !window.is_empty() && managers.is_empty() {
            return Err(GeneratorError::EmptyReference(StageName::new("bank_manager")));
        }

        let mut rows = Vec::with_capacity(usize::try_from(window.end - window.start).unwrap_or(0));
        for i in window.clone() {
            let key = customer_key(i);
            let mut rng = keyed_rng(self.seed, "customer", &key);
            let manager = managers
                .choose(&mut rng)
                .ok_or_else(|| GeneratorError::EmptyReference(StageName::new("bank_manager")))?;
            let roll = rng.gen_range(0..100u32);
            let tier = TIERS
                .iter()
                .find(|(_, cum)| roll < *cum)
                .map_or("regular", |(t, _)| *t);
            let birth_year = rng.gen_range(1950..=2004);
            rows.push(
                Row::new(key)
                    .with("name", person_name(&mut rng))
                    .with("gender", if rng.gen_bool(0.5) { "F" } else { "M" })
                    .with("birth_year", birth_year)
                    .with("city", *pick(&mut rng, CITIES))
                    .with("occupation", *pick(&mut rng, OCCUPATIONS))
                    .with("tier", tier)
                    .with("manager_id", manager)
                    .with(
                        "registered_on",
                        draw_date(&mut rng, self.registered_from, self.registered_days)
                            .to_string(),
                    ),
            );
        }
        Ok(offset_batch(rows, &window, self.total))
    }
}

/// `fund_account`: one to a few deposit accounts per customer.
pub struct FundAccountGenerator {
    seed: u64,
    per_customer: CountRange,
    opened_from: NaiveDate,
}

impl FundAccountGenerator {
    #[must_use]
    pub fn new(seed: u64, per_customer: CountRange, period_start: NaiveDate) -> Self {
        Self {
            seed,
            per_customer,
            opened_from: period_start - Duration::days(1825),
        }
    }
}

impl EntityGenerator for FundAccountGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Lookup(StageName::new("deposit_type")),
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let deposit_types = refs.lookup("deposit_type")?;
        let customers = refs.window();
        if !customers.is_empty() && deposit_types.is_empty() {
            return Err(GeneratorError::EmptyReference(StageName::new("deposit_type")));
        }

        let mut rows = Vec::new();
        for customer in customers {
            let mut rng = keyed_rng(self.seed, "fund_account", customer);
            let count = draw_count(&mut rng, self.per_customer);
            for seq in 1..=count {
                let deposit_type = deposit_types.choose(&mut rng).ok_or_else(|| {
                    GeneratorError::EmptyReference(StageName::new("deposit_type"))
                })?;
                let status = if rng.gen_bool(0.95) { "active" } else { "frozen" };
                rows.push(
                    Row::new(account_key(customer, seq))
                        .with("customer_id", customer.as_str())
                        .with("deposit_type_id", deposit_type)
                        .with("currency", "CNY")
                        .with("balance", draw_amount(&mut rng, 100.0, 500_000.0))
                        .with("status", status)
                        .with(
                            "opened_on",
                            draw_date(&mut rng, self.opened_from, 1825).to_string(),
                        ),
                );
            }
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ReferenceSet;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn refs_with(stage: &str, keys: &[&str]) -> UpstreamRefs {
        let mut refs = UpstreamRefs::new();
        refs.insert_lookup(
            StageName::new(stage),
            ReferenceSet::new(keys.iter().map(|k| (*k).to_string()).collect()),
        );
        refs
    }

    #[test]
    fn customers_reference_loaded_managers() {
        let refs = refs_with("bank_manager", &["BM00001", "BM00002"]);
        let gen = CustomerGenerator::new(42, 25, start());
        let batch = gen.produce_batch(&refs, &StageCursor::Start, 10).unwrap();
        assert_eq!(batch.rows.len(), 10);
        assert_eq!(batch.rows[0].key, "C00000001");
        for row in &batch.rows {
            let manager = row.get_str("manager_id").unwrap();
            assert!(manager == "BM00001" || manager == "BM00002");
        }
        assert_eq!(batch.next_cursor, StageCursor::offset(10));
    }

    #[test]
    fn customers_need_managers() {
        let refs = refs_with("bank_manager", &[]);
        let gen = CustomerGenerator::new(42, 5, start());
        let err = gen.produce_batch(&refs, &StageCursor::Start, 10).unwrap_err();
        assert!(matches!(err, GeneratorError::EmptyReference(_)));
    }

    #[test]
    fn customer_lookup_must_be_loaded() {
        let gen = CustomerGenerator::new(42, 5, start());
        let err = gen
            .produce_batch(&UpstreamRefs::new(), &StageCursor::Start, 10)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::MissingReference(_)));
    }

    #[test]
    fn accounts_follow_customer_window() {
        let mut refs = refs_with("deposit_type", &["DT001", "DT002"]);
        refs.set_window(vec!["C00000001".into(), "C00000002".into()]);
        let gen = FundAccountGenerator::new(42, CountRange::new(1, 3), start());

        let batch = gen.produce_batch(&refs, &StageCursor::Start, 2).unwrap();
        assert_eq!(batch.next_cursor, StageCursor::last_key("C00000002"));
        assert!(!batch.exhausted);
        assert!(batch.rows.len() >= 2 && batch.rows.len() <= 6);
        for row in &batch.rows {
            let customer = row.get_str("customer_id").unwrap();
            assert!(row.key.starts_with(&account_prefix(customer)));
        }
    }

    #[test]
    fn accounts_are_stable_for_a_customer() {
        let gen = FundAccountGenerator::new(42, CountRange::new(1, 3), start());
        let mut solo = refs_with("deposit_type", &["DT001", "DT002"]);
        solo.set_window(vec!["C00000002".into()]);
        let mut pair = refs_with("deposit_type", &["DT001", "DT002"]);
        pair.set_window(vec!["C00000001".into(), "C00000002".into()]);

        let solo_rows = gen.produce_batch(&solo, &StageCursor::Start, 10).unwrap().rows;
        let pair_rows = gen.produce_batch(&pair, &StageCursor::Start, 10).unwrap().rows;
        let from_pair: Vec<_> = pair_rows
            .into_iter()
            .filter(|r| r.get_str("customer_id") == Some("C00000002"))
            .collect();
        assert_eq!(solo_rows, from_pair);
    }

    #[test]
    fn empty_window_is_exhausted() {
        let refs = refs_with("deposit_type", &["DT001"]);
        let gen = FundAccountGenerator::new(42, CountRange::new(1, 3), start());
        let cursor = StageCursor::last_key("C00000009");
        let batch = gen.produce_batch(&refs, &cursor, 10).unwrap();
        assert!(batch.rows.is_empty());
        assert!(batch.exhausted);
        assert_eq!(batch.next_cursor, cursor);
    }
}
