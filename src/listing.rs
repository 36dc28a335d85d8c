use std::fmt::{self, Display};

use bgn2eur_core::{ListingTable, ProductListing};

use crate::{
    error::ConvertError,
    flag::{ConversionFlag, FlagState},
    storage::Connector,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductList {
    pub flag: FlagState,
    pub products: Vec<ProductListing>,
}

impl Display for ProductList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversion status: {}", self.flag)?;
        if self.flag.is_converted() {
            writeln!(f, "Prices below are in EUR.")?;
        }
        write!(f, "{}", ListingTable(&self.products))?;
        writeln!(f, "{} products", self.products.len())
    }
}

/// Products with their names in the first active language, ordered by id.
pub fn list_products(connector: &dyn Connector) -> Result<ProductList, ConvertError> {
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;
    let language = conn.active_language()?.ok_or_else(|| {
        ConvertError::ConfigurationMissing("no active language is configured in the store".to_string())
    })?;
    let products = conn.product_listing(language)?;
    let flag = ConversionFlag::new(conn.settings()).read()?;
    tracing::debug!(language, count = products.len(), "Product listing loaded");
    Ok(ProductList { flag, products })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgn2eur_memory::{MemoryCatalog, Value};
    use rust_decimal_macros::dec;

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::with_catalog("oc_");
        catalog.insert(
            "product",
            vec![("product_id", Value::Int(2)), ("model", "CH-2".into()), ("price", dec!(40.00).into()), ("status", Value::Int(1))],
        );
        catalog.insert(
            "product",
            vec![("product_id", Value::Int(1)), ("model", "TB-1".into()), ("price", dec!(120.00).into()), ("status", Value::Int(0))],
        );
        catalog.insert("product_description", vec![("product_id", Value::Int(1)), ("language_id", Value::Int(2)), ("name", "Table".into())]);
        catalog.insert("product_description", vec![("product_id", Value::Int(2)), ("language_id", Value::Int(2)), ("name", "Chair".into())]);
        catalog.insert("product_description", vec![("product_id", Value::Int(2)), ("language_id", Value::Int(1)), ("name", "Stol".into())]);
        catalog.insert(
            "product_option_value",
            vec![("product_option_value_id", Value::Int(1)), ("product_id", Value::Int(2)), ("price", dec!(3.00).into())],
        );
        catalog
    }

    #[test]
    fn test_listing_uses_active_language() {
        let catalog = catalog();
        catalog.insert("language", vec![("language_id", Value::Int(1)), ("status", Value::Int(0))]);
        catalog.insert("language", vec![("language_id", Value::Int(2)), ("status", Value::Int(1))]);

        let list = list_products(&catalog).unwrap();

        let names: Vec<_> = list.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Table", "Chair"]);
        assert_eq!(list.products[1].options, 1);
        assert_eq!(list.flag, FlagState::Absent);
        assert!(list.to_string().contains("2 products"));
    }

    #[test]
    fn test_no_active_language() {
        let catalog = catalog();
        let err = list_products(&catalog).unwrap_err();
        assert!(matches!(err, ConvertError::ConfigurationMissing(_)));
    }
}
