use std::fmt::{self, Debug, Display};

use prettytable::{row, Table};
use rust_decimal::Decimal;

/// Database connection parameters extracted from an installation's `config.php`.
#[derive(Clone, PartialEq, Eq)]
pub struct DbCredentials {
    /// `DB_DRIVER` as written in `config.php`, e.g. `mysqli`, `mpdo` or `pgsql`.
    pub driver: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub port: u16,
    pub prefix: String,
}

impl Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("driver", &self.driver)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRow {
    pub id: i64,
    pub price: Decimal,
}

/// A row of the store's currency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRecord {
    pub code: String,
    pub value: Decimal,
    pub status: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductListing {
    pub product_id: i64,
    pub model: String,
    pub name: String,
    pub price: Decimal,
    pub status: bool,
    pub options: u64,
    pub discounts: u64,
    pub specials: u64,
}

/// Renders a product listing as a table, the way `list` prints it.
pub struct ListingTable<'a>(pub &'a [ProductListing]);

const MODEL_WIDTH: usize = 30;

impl Display for ListingTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["ID", "Status", "Price", "Model", "Name", "Options", "Discounts", "Specials"]);
        table.add_empty_row();

        for item in self.0 {
            let model: String = item.model.chars().take(MODEL_WIDTH).collect();
            let status = if item.status { "active" } else { "inactive" };
            table.add_row(row![
                item.product_id,
                status,
                item.price,
                model,
                item.name,
                item.options,
                item.discounts,
                item.specials
            ]);
        }

        write!(f, "\n{}\n", table)
    }
}
