use std::fmt::{self, Display};

use prettytable::{row, Table};

use bgn2eur_core::{
    catalog::{PRODUCT, PRODUCT_DISCOUNT, PRODUCT_OPTION_VALUE, PRODUCT_SPECIAL},
    TableNames,
};

use crate::{
    error::ConvertError,
    flag::{ConversionFlag, FlagState},
    storage::Connector,
};

const KB_PER_PRODUCT: f64 = 0.5;
const KB_PER_VARIATION: f64 = 0.3;
/// Above this the `list` output is large enough to warn about.
pub const LISTING_WARN_MB: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStatistics {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub option_values: u64,
    pub discounts: u64,
    pub specials: u64,
    pub flag: FlagState,
}

impl CatalogStatistics {
    pub fn variations(&self) -> u64 {
        self.option_values + self.discounts + self.specials
    }

    /// Rough memory needed to render the product listing, in megabytes.
    pub fn estimated_listing_mb(&self) -> f64 {
        let kb = self.total as f64 * KB_PER_PRODUCT + self.variations() as f64 * KB_PER_VARIATION;
        kb / 1024.0
    }
}

impl Display for CatalogStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["Products", self.total]);
        table.add_row(row!["  active", self.active]);
        table.add_row(row!["  inactive", self.inactive]);
        table.add_row(row!["Option values", self.option_values]);
        table.add_row(row!["Quantity discounts", self.discounts]);
        table.add_row(row!["Special prices", self.specials]);
        write!(f, "{}", table)?;

        writeln!(f, "Conversion status: {}", self.flag)?;
        let estimate = self.estimated_listing_mb();
        writeln!(f, "Estimated memory for `list`: {:.2} MB", estimate)?;
        if estimate > LISTING_WARN_MB {
            writeln!(f, "Warning: the product listing may need more than {} MB", LISTING_WARN_MB)?;
        }
        Ok(())
    }
}

/// Read-only counts over the catalog plus the conversion flag.
pub fn collect_statistics(connector: &dyn Connector, names: &TableNames) -> Result<CatalogStatistics, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let products = names.live(PRODUCT.name);

    let total = conn.count_rows(&products)?;
    let active = conn.count_by_status(&products, true)?;
    let inactive = conn.count_by_status(&products, false)?;
    let option_values = conn.count_rows(&names.live(PRODUCT_OPTION_VALUE.name))?;
    let discounts = conn.count_rows(&names.live(PRODUCT_DISCOUNT.name))?;
    let specials = conn.count_rows(&names.live(PRODUCT_SPECIAL.name))?;
    let flag = ConversionFlag::new(conn.settings()).read()?;

    Ok(CatalogStatistics {
        total,
        active,
        inactive,
        option_values,
        discounts,
        specials,
        flag,
    })
}
