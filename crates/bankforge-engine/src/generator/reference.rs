//! Fixed-volume reference entities: bank managers, deposit types and
//! products. All three page by row offset.

use bankforge_types::cursor::StageCursor;
use bankforge_types::row::Row;
use rand::Rng;

use super::{
    draw_amount, keyed_rng, offset_batch, offset_window, pick, EntityGenerator, GeneratedBatch,
    UpstreamRefs,
};
use crate::error::GeneratorError;

const SURNAMES: &[&str] = &[
    "Wang", "Li", "Zhang", "Liu", "Chen", "Yang", "Zhao", "Huang", "Zhou", "Wu", "Xu", "Sun",
    "Hu", "Zhu", "Gao", "Lin", "He", "Guo", "Ma", "Luo",
];

const GIVEN_NAMES: &[&str] = &[
    "Wei", "Fang", "Na", "Min", "Jing", "Li", "Qiang", "Lei", "Jun", "Yang", "Yong", "Yan",
    "Jie", "Tao", "Ming", "Chao", "Xiu", "Hui", "Ping", "Gang",
];

const BRANCHES: &[&str] = &[
    "Head Office",
    "Downtown",
    "High-Tech Zone",
    "Riverside",
    "Airport",
    "University Town",
    "Financial Street",
    "Port District",
];

const MANAGER_TITLES: &[&str] = &[
    "Relationship Manager",
    "Senior Relationship Manager",
    "Wealth Advisor",
    "Branch Manager",
];

/// Deposit products: (name, term in months, annual rate %).
const DEPOSIT_CATALOGUE: &[(&str, u32, f64)] = &[
    ("Demand Deposit", 0, 0.20),
    ("Time Deposit 3M", 3, 1.05),
    ("Time Deposit 6M", 6, 1.25),
    ("Time Deposit 1Y", 12, 1.45),
    ("Time Deposit 2Y", 24, 1.65),
    ("Time Deposit 3Y", 36, 1.95),
    ("Time Deposit 5Y", 60, 2.00),
    ("Notice Deposit 1D", 0, 0.45),
    ("Notice Deposit 7D", 0, 1.00),
    ("Large Certificate of Deposit", 36, 2.35),
];

const PRODUCT_TYPES: &[&str] = &["wealth", "fund", "insurance", "bond", "loan"];
const RISK_LEVELS: &[&str] = &["R1", "R2", "R3", "R4", "R5"];

pub(crate) fn person_name(rng: &mut impl Rng) -> String {
    let surname = SURNAMES[rng.gen_range(0..SURNAMES.len())];
    let given = GIVEN_NAMES[rng.gen_range(0..GIVEN_NAMES.len())];
    format!("{surname} {given}")
}

#[must_use]
pub fn manager_key(index: u64) -> String {
    format!("BM{:05}", index + 1)
}

#[must_use]
pub fn deposit_type_key(index: u64) -> String {
    format!("DT{:03}", index + 1)
}

#[must_use]
pub fn product_key(index: u64) -> String {
    format!("PR{:04}", index + 1)
}

/// `bank_manager`: relationship managers customers are assigned to.
pub struct BankManagerGenerator {
    seed: u64,
    total: u64,
}

impl BankManagerGenerator {
    #[must_use]
    pub fn new(seed: u64, total: u64) -> Self {
        Self { seed, total }
    }
}

impl EntityGenerator for BankManagerGenerator {
    fn produce_batch(
        &self,
        _refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let window = offset_window(cursor, self.total, batch_size)?;
        let rows = window
            .clone()
            .map(|i| {
                let key = manager_key(i);
                let mut rng = keyed_rng(self.seed, "bank_manager", &key);
                Row::new(key)
                    .with("name", person_name(&mut rng))
                    .with("title", *pick(&mut rng, MANAGER_TITLES))
                    .with("branch", *pick(&mut rng, BRANCHES))
                    .with("phone", format!("138{:08}", rng.gen_range(0..100_000_000u32)))
                    .with("max_customers", rng.gen_range(150..=400u32))
            })
            .collect();
        Ok(offset_batch(rows, &window, self.total))
    }
}

/// `deposit_type`: deposit product catalogue.
pub struct DepositTypeGenerator {
    total: u64,
}

impl DepositTypeGenerator {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self { total }
    }
}

impl EntityGenerator for DepositTypeGenerator {
    fn produce_batch(
        &self,
        _refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let window = offset_window(cursor, self.total, batch_size)?;
        let rows = window
            .clone()
            .map(|i| {
                let len = DEPOSIT_CATALOGUE.len() as u64;
                #[allow(clippy::cast_possible_truncation)]
                let (name, term, rate) = DEPOSIT_CATALOGUE[(i % len) as usize];
                let series = i / len;
                let name = if series == 0 {
                    name.to_string()
                } else {
                    format!("{name} (Series {})", series + 1)
                };
                Row::new(deposit_type_key(i))
                    .with("name", name)
                    .with("term_months", term)
                    .with("annual_rate", rate)
                    .with("min_amount", if term == 0 { 0.0 } else { 50.0 })
            })
            .collect();
        Ok(offset_batch(rows, &window, self.total))
    }
}

/// `product`: wealth, fund, insurance, bond and loan products.
pub struct ProductGenerator {
    seed: u64,
    total: u64,
}

impl ProductGenerator {
    #[must_use]
    pub fn new(seed: u64, total: u64) -> Self {
        Self { seed, total }
    }
}

impl EntityGenerator for ProductGenerator {
    fn produce_batch(
        &self,
        _refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let window = offset_window(cursor, self.total, batch_size)?;
        let rows = window
            .clone()
            .map(|i| {
                let key = product_key(i);
                let mut rng = keyed_rng(self.seed, "product", &key);
                let product_type = *pick(&mut rng, PRODUCT_TYPES);
                let risk = *pick(&mut rng, RISK_LEVELS);
                Row::new(key)
                    .with("name", format!("{} Product {:03}", capitalize(product_type), i + 1))
                    .with("product_type", product_type)
                    .with("risk_level", risk)
                    .with("expected_yield", draw_amount(&mut rng, 1.5, 6.5))
                    .with("min_investment", f64::from(rng.gen_range(1..=100u32)) * 1000.0)
                    .with("term_days", *pick(&mut rng, &[30u32, 90, 180, 365, 730]))
            })
            .collect();
        Ok(offset_batch(rows, &window, self.total))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
