//! Digital-channel identities: app users, WeChat followers, WeCom
//! contacts and the per-customer channel profile that ties them together.
//!
//! Every stage here is driven by the customer key window. Identity keys
//! embed the customer key, so a downstream stage can test membership with
//! [`ReferenceSet::contains`](super::ReferenceSet::contains) instead of
//! reading row bodies.

use bankforge_types::cursor::StageCursor;
use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use chrono::NaiveDate;
use rand::Rng;

use super::{
    draw_date, keyed_rng, pick, window_batch, EntityGenerator, GeneratedBatch, ReferenceNeed,
    UpstreamRefs,
};
use crate::error::GeneratorError;

const DEVICES: &[&str] = &["ios", "android", "harmonyos"];
const APP_VERSIONS: &[&str] = &["5.2.0", "5.3.1", "6.0.0", "6.1.2"];
const FOLLOW_SOURCES: &[&str] = &["qr_code", "article", "branch_poster", "search", "referral"];
const CONTACT_TAGS: &[&str] = &["new", "wealth_interest", "loan_interest", "vip", "dormant"];

/// Probability that a customer holds each identity.
const APP_USER_RATE: f64 = 0.70;
const WECHAT_RATE_WITH_APP: f64 = 0.75;
const WECHAT_RATE_WITHOUT_APP: f64 = 0.40;
const WORK_WECHAT_RATE: f64 = 0.55;

#[must_use]
pub fn app_user_key(customer: &str) -> String {
    format!("AU-{customer}")
}

#[must_use]
pub fn wechat_follower_key(customer: &str) -> String {
    format!("WF-{customer}")
}

#[must_use]
pub fn work_wechat_key(customer: &str) -> String {
    format!("WW-{customer}")
}

#[must_use]
pub fn channel_profile_key(customer: &str) -> String {
    format!("CP-{customer}")
}

fn open_id(rng: &mut impl Rng) -> String {
    format!("o{:016x}", rng.gen::<u64>())
}

/// `app_user`: mobile banking registrations.
pub struct AppUserGenerator {
    seed: u64,
    period_start: NaiveDate,
    period_days: i64,
}

impl AppUserGenerator {
    #[must_use]
    pub fn new(seed: u64, period_start: NaiveDate, period_days: i64) -> Self {
        Self {
            seed,
            period_start,
            period_days,
        }
    }
}

impl EntityGenerator for AppUserGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![ReferenceNeed::Window(StageName::new("customer"))]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let mut rng = keyed_rng(self.seed, "app_user", customer);
            if !rng.gen_bool(APP_USER_RATE) {
                continue;
            }
            rows.push(
                Row::new(app_user_key(customer))
                    .with("customer_id", customer.as_str())
                    .with("device", *pick(&mut rng, DEVICES))
                    .with("app_version", *pick(&mut rng, APP_VERSIONS))
                    .with("biometric_enabled", rng.gen_bool(0.6))
                    .with(
                        "registered_on",
                        draw_date(&mut rng, self.period_start, self.period_days).to_string(),
                    ),
            );
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `wechat_follower`: official-account followers. App users follow more
/// often and get their app account bound.
pub struct WechatFollowerGenerator {
    seed: u64,
    period_start: NaiveDate,
    period_days: i64,
}

impl WechatFollowerGenerator {
    #[must_use]
    pub fn new(seed: u64, period_start: NaiveDate, period_days: i64) -> Self {
        Self {
            seed,
            period_start,
            period_days,
        }
    }
}

impl EntityGenerator for WechatFollowerGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Scoped {
                stage: StageName::new("app_user"),
                prefix: "AU-",
            },
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let app_users = refs.lookup("app_user")?;
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let app_user = app_user_key(customer);
            let has_app = app_users.contains(&app_user);
            let mut rng = keyed_rng(self.seed, "wechat_follower", customer);
            let rate = if has_app {
                WECHAT_RATE_WITH_APP
            } else {
                WECHAT_RATE_WITHOUT_APP
            };
            if !rng.gen_bool(rate) {
                continue;
            }
            let mut row = Row::new(wechat_follower_key(customer))
                .with("customer_id", customer.as_str())
                .with("open_id", open_id(&mut rng))
                .with("source", *pick(&mut rng, FOLLOW_SOURCES))
                .with(
                    "followed_on",
                    draw_date(&mut rng, self.period_start, self.period_days).to_string(),
                );
            if has_app {
                row = row.with("app_user_id", app_user);
            }
            rows.push(row);
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `work_wechat_contact`: customers added as WeCom contacts by a manager.
pub struct WorkWechatContactGenerator {
    seed: u64,
    period_start: NaiveDate,
    period_days: i64,
}

impl WorkWechatContactGenerator {
    #[must_use]
    pub fn new(seed: u64, period_start: NaiveDate, period_days: i64) -> Self {
        Self {
            seed,
            period_start,
            period_days,
        }
    }
}

impl EntityGenerator for WorkWechatContactGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Lookup(StageName::new("bank_manager")),
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let managers = refs.lookup("bank_manager")?;
        let customers = refs.window();
        let mut rows = Vec::new();
        for customer in customers {
            let mut rng = keyed_rng(self.seed, "work_wechat_contact", customer);
            if !rng.gen_bool(WORK_WECHAT_RATE) {
                continue;
            }
            let manager = managers
                .choose(&mut rng)
                .ok_or_else(|| GeneratorError::EmptyReference(StageName::new("bank_manager")))?;
            rows.push(
                Row::new(work_wechat_key(customer))
                    .with("customer_id", customer.as_str())
                    .with("manager_id", manager)
                    .with("external_user_id", format!("wm{:014x}", rng.gen::<u64>() >> 8))
                    .with("tag", *pick(&mut rng, CONTACT_TAGS))
                    .with(
                        "added_on",
                        draw_date(&mut rng, self.period_start, self.period_days).to_string(),
                    ),
            );
        }
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

/// `channel_profile`: one row per customer summarising channel reach.
pub struct ChannelProfileGenerator;

impl EntityGenerator for ChannelProfileGenerator {
    fn references(&self) -> Vec<ReferenceNeed> {
        vec![
            ReferenceNeed::Window(StageName::new("customer")),
            ReferenceNeed::Scoped {
                stage: StageName::new("app_user"),
                prefix: "AU-",
            },
            ReferenceNeed::Scoped {
                stage: StageName::new("wechat_follower"),
                prefix: "WF-",
            },
            ReferenceNeed::Scoped {
                stage: StageName::new("work_wechat_contact"),
                prefix: "WW-",
            },
        ]
    }

    fn produce_batch(
        &self,
        refs: &UpstreamRefs,
        cursor: &StageCursor,
        batch_size: usize,
    ) -> Result<GeneratedBatch, GeneratorError> {
        let app_users = refs.lookup("app_user")?;
        let followers = refs.lookup("wechat_follower")?;
        let contacts = refs.lookup("work_wechat_contact")?;
        let customers = refs.window();

        let rows = customers
            .iter()
            .map(|customer| {
                let app = app_users.contains(&app_user_key(customer));
                let wechat = followers.contains(&wechat_follower_key(customer));
                let work = contacts.contains(&work_wechat_key(customer));
                let preferred = if app {
                    "app"
                } else if work {
                    "work_wechat"
                } else if wechat {
                    "wechat"
                } else {
                    "branch"
                };
                Row::new(channel_profile_key(customer))
                    .with("customer_id", customer.as_str())
                    .with("has_app", app)
                    .with("has_wechat", wechat)
                    .with("has_work_wechat", work)
                    .with("channel_count", u32::from(app) + u32::from(wechat) + u32::from(work))
                    .with("preferred_channel", preferred)
            })
            .collect();
        Ok(window_batch(rows, customers, cursor, batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ReferenceSet;

    fn customers(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("C{i:08}")).collect()
    }

    fn period() -> (NaiveDate, i64) {
        (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 366)
    }

    #[test]
    fn app_users_cover_a_share_of_customers() {
        let (start, days) = period();
        let mut refs = UpstreamRefs::new();
        refs.set_window(customers(200));
        let batch = AppUserGenerator::new(42, start, days)
            .produce_batch(&refs, &StageCursor::Start, 200)
            .unwrap();
        assert!(batch.rows.len() > 100 && batch.rows.len() < 190);
        assert!(batch.exhausted);
        assert_eq!(batch.next_cursor, StageCursor::last_key("C00000200"));
    }

    #[test]
    fn followers_bind_existing_app_users_only() {
        let (start, days) = period();
        let window = customers(50);
        let app_keys: Vec<String> = window.iter().step_by(2).map(|c| app_user_key(c)).collect();
        let mut refs = UpstreamRefs::new();
        refs.insert_lookup(StageName::new("app_user"), ReferenceSet::new(app_keys.clone()));
        refs.set_window(window);

        let batch = WechatFollowerGenerator::new(7, start, days)
            .produce_batch(&refs, &StageCursor::Start, 100)
            .unwrap();
        assert!(!batch.rows.is_empty());
        for row in &batch.rows {
            if let Some(bound) = row.get_str("app_user_id") {
                assert!(app_keys.iter().any(|k| k == bound));
            }
        }
    }

    #[test]
    fn contacts_need_manager_lookup() {
        let (start, days) = period();
        let mut refs = UpstreamRefs::new();
        refs.set_window(customers(3));
        let err = WorkWechatContactGenerator::new(1, start, days)
            .produce_batch(&refs, &StageCursor::Start, 10)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::MissingReference(_)));
    }

    #[test]
    fn profile_reflects_identities() {
        let mut refs = UpstreamRefs::new();
        refs.insert_lookup(
            StageName::new("app_user"),
            ReferenceSet::new(vec![app_user_key("C00000001")]),
        );
        refs.insert_lookup(
            StageName::new("wechat_follower"),
            ReferenceSet::new(vec![wechat_follower_key("C00000002")]),
        );
        refs.insert_lookup(StageName::new("work_wechat_contact"), ReferenceSet::default());
        refs.set_window(customers(3));

        let batch = ChannelProfileGenerator
            .produce_batch(&refs, &StageCursor::Start, 3)
            .unwrap();
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(batch.rows[0].get_str("preferred_channel"), Some("app"));
        assert_eq!(batch.rows[1].get_str("preferred_channel"), Some("wechat"));
        assert_eq!(batch.rows[2].get_str("preferred_channel"), Some("branch"));
        assert!(!batch.exhausted);
    }
}
