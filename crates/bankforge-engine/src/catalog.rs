//! The bank stage catalogue.

use crate::config::types::GenerationConfig;
use crate::error::RegistryError;
use crate::generator::activity::{
    AccountTransactionGenerator, CustomerEventGenerator, InvestmentRecordGenerator,
    LoanRecordGenerator,
};
use crate::generator::channel::{
    AppUserGenerator, ChannelProfileGenerator, WechatFollowerGenerator,
    WorkWechatContactGenerator,
};
use crate::generator::customer::{CustomerGenerator, FundAccountGenerator};
use crate::generator::reference::{BankManagerGenerator, DepositTypeGenerator, ProductGenerator};
use crate::registry::{StageRegistry, StageRegistryBuilder};
use crate::validate::{FieldKind, ValidationRules};

/// Build the thirteen bank stages from `config`.
///
/// Dependencies mirror the foreign keys between the generated tables.
///
/// # Errors
///
/// Returns [`RegistryError`] if the catalogue fails validation.
pub fn bank_registry(config: &GenerationConfig) -> Result<StageRegistry, RegistryError> {
    let seed = config.run.seed;
    let volumes = &config.volumes;
    let period = &config.period;
    let (start, days) = (period.start_date, period.days());

    StageRegistryBuilder::new()
        .register(
            "bank_manager",
            &[],
            BankManagerGenerator::new(seed, volumes.bank_managers),
        )
        .register(
            "deposit_type",
            &[],
            DepositTypeGenerator::new(volumes.deposit_types),
        )
        .register("product", &[], ProductGenerator::new(seed, volumes.products))
        .register(
            "customer",
            &["bank_manager"],
            CustomerGenerator::new(seed, volumes.customers, start),
        )
        .register(
            "fund_account",
            &["customer", "deposit_type"],
            FundAccountGenerator::new(seed, volumes.accounts_per_customer, start),
        )
        .register(
            "app_user",
            &["customer"],
            AppUserGenerator::new(seed, start, days),
        )
        .register(
            "wechat_follower",
            &["customer", "app_user"],
            WechatFollowerGenerator::new(seed, start, days),
        )
        .register(
            "work_wechat_contact",
            &["customer", "bank_manager"],
            WorkWechatContactGenerator::new(seed, start, days),
        )
        .register(
            "channel_profile",
            &["customer", "app_user", "wechat_follower", "work_wechat_contact"],
            ChannelProfileGenerator,
        )
        .register(
            "loan_record",
            &["customer", "fund_account"],
            LoanRecordGenerator::new(seed, volumes.loans_per_customer, period.clone()),
        )
        .register(
            "investment_record",
            &["customer", "fund_account", "product"],
            InvestmentRecordGenerator::new(seed, volumes.investments_per_customer, period.clone()),
        )
        .register(
            "customer_event",
            &["customer", "product"],
            CustomerEventGenerator::new(seed, volumes.events_per_customer, period.clone()),
        )
        .register(
            "account_transaction",
            &["fund_account"],
            AccountTransactionGenerator::new(
                seed,
                volumes.transactions_per_account,
                period.clone(),
            ),
        )
        .build()
}

/// Integrity rules for the thirteen bank tables.
#[must_use]
pub fn bank_validation_rules(config: &GenerationConfig) -> ValidationRules {
    use FieldKind::{Bool, Number, Text};

    let volumes = &config.volumes;
    ValidationRules::new()
        .expect_rows("bank_manager", volumes.bank_managers)
        .expect_rows("deposit_type", volumes.deposit_types)
        .expect_rows("product", volumes.products)
        .expect_rows("customer", volumes.customers)
        .expect_rows("channel_profile", volumes.customers)
        .field("bank_manager", "name", Text)
        .field("bank_manager", "branch", Text)
        .field("bank_manager", "max_customers", Number)
        .field("deposit_type", "name", Text)
        .field("deposit_type", "term_months", Number)
        .field("deposit_type", "annual_rate", Number)
        .field("product", "name", Text)
        .field("product", "product_type", Text)
        .field("product", "expected_yield", Number)
        .field("customer", "name", Text)
        .field("customer", "birth_year", Number)
        .field("customer", "manager_id", Text)
        .field("customer", "registered_on", Text)
        .field("fund_account", "customer_id", Text)
        .field("fund_account", "deposit_type_id", Text)
        .field("fund_account", "balance", Number)
        .field("fund_account", "status", Text)
        .field("app_user", "customer_id", Text)
        .field("app_user", "device", Text)
        .field("app_user", "biometric_enabled", Bool)
        .field("wechat_follower", "customer_id", Text)
        .field("wechat_follower", "open_id", Text)
        .optional_field("wechat_follower", "app_user_id", Text)
        .field("work_wechat_contact", "customer_id", Text)
        .field("work_wechat_contact", "manager_id", Text)
        .field("channel_profile", "customer_id", Text)
        .field("channel_profile", "has_app", Bool)
        .field("channel_profile", "channel_count", Number)
        .field("channel_profile", "preferred_channel", Text)
        .field("loan_record", "customer_id", Text)
        .field("loan_record", "account_id", Text)
        .field("loan_record", "principal", Number)
        .field("loan_record", "issued_on", Text)
        .field("investment_record", "customer_id", Text)
        .field("investment_record", "account_id", Text)
        .field("investment_record", "product_id", Text)
        .field("investment_record", "amount", Number)
        .field("customer_event", "customer_id", Text)
        .field("customer_event", "event_type", Text)
        .field("customer_event", "occurred_at", Text)
        .optional_field("customer_event", "product_id", Text)
        .field("account_transaction", "account_id", Text)
        .field("account_transaction", "amount", Number)
        .field("account_transaction", "booked_on", Text)
        .foreign_key("customer", "manager_id", "bank_manager")
        .foreign_key("fund_account", "customer_id", "customer")
        .foreign_key("fund_account", "deposit_type_id", "deposit_type")
        .foreign_key("app_user", "customer_id", "customer")
        .foreign_key("wechat_follower", "customer_id", "customer")
        .foreign_key("wechat_follower", "app_user_id", "app_user")
        .foreign_key("work_wechat_contact", "customer_id", "customer")
        .foreign_key("work_wechat_contact", "manager_id", "bank_manager")
        .foreign_key("channel_profile", "customer_id", "customer")
        .foreign_key("loan_record", "customer_id", "customer")
        .foreign_key("loan_record", "account_id", "fund_account")
        .foreign_key("investment_record", "customer_id", "customer")
        .foreign_key("investment_record", "account_id", "fund_account")
        .foreign_key("investment_record", "product_id", "product")
        .foreign_key("customer_event", "customer_id", "customer")
        .foreign_key("customer_event", "product_id", "product")
        .foreign_key("account_transaction", "account_id", "fund_account")
}
