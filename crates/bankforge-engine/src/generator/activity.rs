//! Customer activity: loans, investments, behavioural events and account
//! transactions.

use bankforge_types::cursor::StageCursor;
use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use chrono::{Duration, NaiveDate};
use rand::Rng;

use super::customer::account_prefix;
use super::{
    draw_amount, draw_count, draw_date, keyed_rng, pick, window_batch, EntityGenerator,
    GeneratedBatch, ReferenceNeed, UpstreamRefs,
};
use crate::config::types::{CountRange, PeriodConfig};
use crate::error::GeneratorError;

const LOAN_TYPES: &[(&str, f64, f64)] = &[
    ("mortgage", 300_000.0, 3_000_000.0),
    ("car", 50_000.0, 400_000.0),
    ("consumer", 5_000.0, 200_000.0),
    ("business", 100_000.0, 2_000_000.0),
];
const LOAN_TERMS: &[u32] = &[12, 24, 36, 60, 120, 240, 360];
const EVENT_TYPES: &[&str] = &[
    "login",
    "page_view",
    "product_view",
    "consultation",
    "complaint",
    "campaign_click",
    "branch_visit",
];
const EVENT_CHANNELS: &[&str] = &["app", "wechat", "work_wechat", "branch", "call_center"];
const TX_TYPES: &[(&str, bool)] = &[
    ("salary", true),
    ("transfer_in", true),
    ("interest", true),
    ("transfer_out", false),
    ("card_payment", false),
    ("withdrawal", false),
    ("utility_bill", false),
];

#[must_use]
pub fn loan_key(customer: &str, seq: u32) -> String {
    format!("LN-{customer}-{seq}")
}

#[must_use]
pub fn investment_key(customer: &str, seq: u32) -> String {
    format!("IV-{customer}-{seq}")
}

#[must_use]
pub fn event_key(customer: &str, seq: u32) -> String {
    format!("EV-{customer}-{seq}")
}

#[must_use]
pub fn transaction_key(account: &str, seq: u32) -> String {
    format!("TX-{account}-{seq:04}")
}

/// `loan_record`: loans disbursed into one of the customer's accounts.
/// Customers without an account get none.
pub struct LoanRecordGenerator {
    seed: u64,
    per_customer: CountRange,
    period: PeriodConfig,
}

impl LoanRecordGenerator {
    #[must_use]
    pub fn new(seed: u64, per_customer: CountRange, period: PeriodConfig) -> Self {
        Self {
            seed,
            per_customer,
            period,
        }
    }
}

impl EntityGenerator for LoanRecordGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Scoped {
                stage: StageName::new("fund_account"),
                prefix: "FA-",
            },
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let accounts = refs.lookup("fund_account")?;
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let owned = accounts.with_prefix(&account_prefix(customer));
            if owned.is_empty() {
                continue;
            }
            let mut rng = keyed_rng(self.seed, "loan_record", customer);
            for seq in 1..=draw_count(&mut rng, self.per_customer) {
                let (loan_type, low, high) = *pick(&mut rng, LOAN_TYPES);
                let term = *pick(&mut rng, LOAN_TERMS);
                let issued = draw_date(&mut rng, self.period.start_date, self.period.days());
                let maturity = issued + Duration::days(i64::from(term) * 30);
                rows.push(
                    Row::new(loan_key(customer, seq))
                        .with("customer_id", customer.as_str())
                        .with("account_id", pick(&mut rng, owned).as_str())
                        .with("loan_type", loan_type)
                        .with("principal", draw_amount(&mut rng, low, high))
                        .with("annual_rate", draw_amount(&mut rng, 3.0, 7.5))
                        .with("term_months", term)
                        .with("issued_on", issued.to_string())
                        .with("matures_on", maturity.to_string())
                        .with("status", if rng.gen_bool(0.9) { "performing" } else { "overdue" }),
                );
            }
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `investment_record`: product purchases funded from a customer account.
pub struct InvestmentRecordGenerator {
    seed: u64,
    per_customer: CountRange,
    period: PeriodConfig,
}

impl InvestmentRecordGenerator {
    #[must_use]
    pub fn new(seed: u64, per_customer: CountRange, period: PeriodConfig) -> Self {
        Self {
            seed,
            per_customer,
            period,
        }
    }
}

impl EntityGenerator for InvestmentRecordGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Scoped {
                stage: StageName::new("fund_account"),
                prefix: "FA-",
            },
            ReferenceNeed::Lookup(StageName::new("product")),
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let accounts = refs.lookup("fund_account")?;
        let products = refs.lookup("product")?;
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let owned = accounts.with_prefix(&account_prefix(customer));
            if owned.is_empty() {
                continue;
            }
            let mut rng = keyed_rng(self.seed, "investment_record", customer);
            for seq in 1..=draw_count(&mut rng, self.per_customer) {
                let product = products
                    .choose(&mut rng)
                    .ok_or_else(|| GeneratorError::EmptyReference(StageName::new("product")))?;
                rows.push(
                    Row::new(investment_key(customer, seq))
                        .with("customer_id", customer.as_str())
                        .with("account_id", pick(&mut rng, owned).as_str())
                        .with("product_id", product)
                        .with("amount", draw_amount(&mut rng, 1_000.0, 1_000_000.0))
                        .with(
                            "purchased_on",
                            draw_date(&mut rng, self.period.start_date, self.period.days())
                                .to_string(),
                        )
                        .with("status", if rng.gen_bool(0.8) { "holding" } else { "redeemed" }),
                );
            }
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `customer_event`: behavioural events, some tied to a product.
pub struct CustomerEventGenerator {
    seed: u64,
    per_customer: CountRange,
    period: PeriodConfig,
}

impl CustomerEventGenerator {
    #[must_use]
    pub fn new(seed: u64, per_customer: CountRange, period: PeriodConfig) -> Self {
        Self {
            seed,
            per_customer,
            period,
        }
    }
}

impl EntityGenerator for CustomerEventGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Lookup(StageName::new("product")),
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let products = refs.lookup("product")?;
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let mut rng = keyed_rng(self.seed, "customer_event", customer);
            for seq in 1..=draw_count(&mut rng, self.per_customer) {
                let event_type = *pick(&mut rng, EVENT_TYPES);
                let day = draw_date(&mut rng, self.period.start_date, self.period.days());
                let at = day.and_hms_opt(rng.gen_range(7..23), rng.gen_range(0..60), 0);
                let mut row = Row::new(event_key(customer, seq))
                    .with("customer_id", customer.as_str())
                    .with("event_type", event_type)
                    .with("channel", *pick(&mut rng, EVENT_CHANNELS))
                    .with(
                        "occurred_at",
                        at.map_or_else(|| day.to_string(), |t| t.to_string()),
                    );
                if event_type == "product_view" || event_type == "campaign_click" {
                    if let Some(product) = products.choose(&mut rng) {
                        row = row.with("product_id", product);
                    }
                }
                rows.push(row);
            }
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `account_transaction`: ledger entries per fund account, driven by the
/// account key window rather than by customers.
pub struct AccountTransactionGenerator {
    seed: u64,
    per_account: CountRange,
    period: PeriodConfig,
}

impl AccountTransactionGenerator {
    #[must_use]
    pub fn new(seed: u64, per_account: CountRange, period: PeriodConfig) -> Self {
        Self {
            seed,
            per_account,
            period,
        }
    }
}

impl EntityGenerator for AccountTransactionGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![ReferenceNeed::Window(StageName::new("fund_account"))]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let accounts = refs.window();
        let mut rows = Vec::new();
        for account in accounts {
            let mut rng = keyed_rng(self.seed, "account_transaction", account);
            let count = draw_count(&mut rng, self.per_account);
            let mut dates: Vec<NaiveDate> = (0..count)
                .map(|_| draw_date(&mut rng, self.period.start_date, self.period.days()))
                .collect();
            dates.sort_unstable();

            let mut balance = draw_amount(&mut rng, 0.0, 50_000.0);
            for (seq, date) in (1..=count).zip(dates) {
                let (tx_type, credit) = *pick(&mut rng, TX_TYPES);
                let mut amount = draw_amount(&mut rng, 1.0, 20_000.0);
                if !credit {
                    amount = amount.min(balance);
                }
                balance = if credit { balance + amount } else { balance - amount };
                let signed = if credit { amount } else { -amount };
                rows.push(
                    Row::new(transaction_key(account, seq))
                        .with("account_id", account.as_str())
                        .with("tx_type", tx_type)
                        .with("amount", signed)
                        .with("balance_after", (balance * 100.0).round() / 100.0)
                        .with("booked_on", date.to_string()),
                );
            }
        }
        Ok(window_batch(rows, accounts, cursor, batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ReferenceSet;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| (*k).to_string()).collect()
    }

    fn refs(window: &[&str], lookups: &[(&str, &[&str])]) -> UpstreamRefs {
        let mut refs = UpstreamRefs::new();
        for (stage, ks) in lookups {
            refs.insert_lookup(StageName::new(*stage), ReferenceSet::new(keys(ks)));
        }
        refs.set_window(keys(window));
        refs
    }

    #[test]
    fn loans_use_the_borrowers_own_accounts() {
        let refs = refs(
            &["C00000001", "C00000002", "C00000003"],
            &[(
                "fund_account",
                &["FA-C00000001-01", "FA-C00000001-02", "FA-C00000003-01"],
            )],
        );
        let gen = LoanRecordGenerator::new(3, CountRange::new(2, 2), PeriodConfig::default());
        let batch = gen.produce_batch(&refs, &StageCursor::Start, 3).unwrap();

        // C00000002 has no account.
        assert_eq!(batch.rows.len(), 4);
        for row in &batch.rows {
            let customer = row.get_str("customer_id").unwrap();
            let account = row.get_str("account_id").unwrap();
            assert!(account.starts_with(&account_prefix(customer)));
            assert_ne!(customer, "C00000002");
        }
        assert!(!batch.exhausted);
    }

    #[test]
    fn investments_reference_products() {
        let refs = refs(
            &["C00000001"],
            &[
                ("fund_account", &["FA-C00000001-01"]),
                ("product", &["PR0001", "PR0002"]),
            ],
        );
        let gen =
            InvestmentRecordGenerator::new(3, CountRange::new(3, 3), PeriodConfig::default());
        let batch = gen.produce_batch(&refs, &StageCursor::Start, 5).unwrap();
        assert_eq!(batch.rows.len(), 3);
        for row in &batch.rows {
            assert!(row.get_str("product_id").unwrap().starts_with("PR000"));
        }
        assert!(batch.exhausted);
    }

    #[test]
    fn events_fall_inside_the_period() {
        let period = PeriodConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        };
        let refs = refs(&["C00000001", "C00000002"], &[("product", &["PR0001"])]);
        let gen = CustomerEventGenerator::new(9, CountRange::new(5, 10), period);
        let batch = gen.produce_batch(&refs, &StageCursor::Start, 2).unwrap();
        assert!(batch.rows.len() >= 10);
        for row in &batch.rows {
            let at = row.get_str("occurred_at").unwrap();
            assert!(at.starts_with("2024-03-"), "got {at}");
        }
    }

    #[test]
    fn transactions_keep_balance_non_negative() {
        let refs = refs(&["FA-C00000001-01", "FA-C00000001-02"], &[]);
        let gen =
            AccountTransactionGenerator::new(5, CountRange::new(20, 20), PeriodConfig::default());
        let batch = gen.produce_batch(&refs, &StageCursor::Start, 10).unwrap();
        assert_eq!(batch.rows.len(), 40);
        assert_eq!(batch.rows[0].key, "TX-FA-C00000001-01-0001");
        for row in &batch.rows {
            let balance = row.get("balance_after").and_then(serde_json::Value::as_f64);
            assert!(balance.unwrap() >= 0.0);
        }
        assert_eq!(batch.next_cursor, StageCursor::last_key("FA-C00000001-02"));
        assert!(batch.exhausted);
    }

    #[test]
    fn transactions_resume_mid_window_identically() {
        let gen =
            AccountTransactionGenerator::new(5, CountRange::new(1, 5), PeriodConfig::default());
        let all = refs(&["FA-C1-01", "FA-C2-01"], &[]);
        let tail = refs(&["FA-C2-01"], &[]);
        let full = gen.produce_batch(&all, &StageCursor::Start, 2).unwrap().rows;
        let resumed = gen
            .produce_batch(&tail, &StageCursor::last_key("FA-C1-01"), 2)
            .unwrap()
            .rows;
        let expected: Vec<_> = full
            .into_iter()
            .filter(|r| r.get_str("account_id") == Some("FA-C2-01"))
            .collect();
        assert_eq!(resumed, expected);
    }
}
