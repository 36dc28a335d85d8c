use rust_decimal::Decimal;

/// Prefix inserted between the store prefix and the base name of a backup table.
pub const BACKUP_PREFIX: &str = "backup_";

/// Prefix of the holding name a live table is parked under during a restore swap.
pub const HOLDING_PREFIX: &str = "old_";

/// Settings key recording that a commit-mode recalculation completed.
pub const CONVERSION_FLAG_KEY: &str = "bgn_eur_converted";

/// Settings key listing the live tables a partially failed restore already put back.
pub const RESTORE_PROGRESS_KEY: &str = "bgn_eur_restore_progress";

pub const MAINTENANCE_KEY: &str = "config_maintenance";

/// Settings group written alongside keys this tool inserts.
pub const SETTING_GROUP: &str = "bgn2eur";

pub const BASE_CURRENCY: &str = "BGN";
pub const TARGET_CURRENCY: &str = "EUR";

/// Which stored prices are worth converting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceFilter {
    /// `price > 0`
    Positive,
    /// `price <> 0`; option adjustments may be negative.
    NonZero,
}

impl PriceFilter {
    pub fn matches(&self, price: Decimal) -> bool {
        match self {
            PriceFilter::Positive => price > Decimal::ZERO,
            PriceFilter::NonZero => !price.is_zero(),
        }
    }

    /// SQL comparison applied to the price column.
    pub fn sql(&self) -> &'static str {
        match self {
            PriceFilter::Positive => "> 0",
            PriceFilter::NonZero => "<> 0",
        }
    }
}

/// One of the catalog tables holding a price subject to conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonetaryTable {
    pub name: &'static str,
    pub id_column: &'static str,
    pub price_column: &'static str,
    pub filter: PriceFilter,
    /// Human readable name used in reports.
    pub label: &'static str,
}

pub const PRODUCT: MonetaryTable = MonetaryTable {
    name: "product",
    id_column: "product_id",
    price_column: "price",
    filter: PriceFilter::Positive,
    label: "product prices",
};

pub const PRODUCT_OPTION_VALUE: MonetaryTable = MonetaryTable {
    name: "product_option_value",
    id_column: "product_option_value_id",
    price_column: "price",
    filter: PriceFilter::NonZero,
    label: "option prices",
};

pub const PRODUCT_DISCOUNT: MonetaryTable = MonetaryTable {
    name: "product_discount",
    id_column: "product_discount_id",
    price_column: "price",
    filter: PriceFilter::Positive,
    label: "quantity discounts",
};

pub const PRODUCT_SPECIAL: MonetaryTable = MonetaryTable {
    name: "product_special",
    id_column: "product_special_id",
    price_column: "price",
    filter: PriceFilter::Positive,
    label: "special prices",
};

/// The monetary tables in catalog order. Every lifecycle operation walks them in this order.
pub const MONETARY_TABLES: [MonetaryTable; 4] = [
    PRODUCT,
    PRODUCT_OPTION_VALUE,
    PRODUCT_DISCOUNT,
    PRODUCT_SPECIAL,
];

/// Derives physical table names from the installation's table prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableNames {
    prefix: String,
}

impl TableNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn live(&self, base: &str) -> String {
        format!("{}{}", self.prefix, base)
    }

    pub fn backup(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, BACKUP_PREFIX, base)
    }

    pub fn holding(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, HOLDING_PREFIX, base)
    }

    pub fn setting(&self) -> String {
        self.live("setting")
    }

    pub fn currency(&self) -> String {
        self.live("currency")
    }

    pub fn language(&self) -> String {
        self.live("language")
    }

    pub fn product_description(&self) -> String {
        self.live("product_description")
    }
}

/// A table prefix is spliced into SQL identifiers, so only word characters are accepted.
pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
