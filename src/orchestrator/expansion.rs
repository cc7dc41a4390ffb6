use std::collections::HashSet;

use crate::schema::{SchemaElement, split_table_column};

/// Locale variants of "name", "title" and "label". Matched as whole
/// `_`-separated tokens since most are short enough to appear inside
/// unrelated words.
const LOCALE_LABEL_TOKENS: &[&str] = &[
    "isim",
    "ad",
    "adi",
    "baslik",
    "etiket",
    "nombre",
    "titulo",
    "nom",
    "titre",
    "bezeichnung",
    "titel",
];

/// True for key columns (`id`, `*_id`) and human-readable label columns.
pub fn is_identifier_column(column: &str) -> bool {
    let column = column.to_lowercase();
    if column == "id" || column.ends_with("_id") {
        return true;
    }
    if ["name", "title", "label"].iter().any(|k| column.contains(k)) {
        return true;
    }
    column
        .split('_')
        .any(|token| LOCALE_LABEL_TOKENS.contains(&token))
}

/// Adds identifier columns of every table touched by `relevant`.
///
/// The result keeps the order of `all`, so tables and columns render in the
/// same order as the full schema.
pub fn expand_with_identifiers(
    all: &[SchemaElement],
    relevant: &[SchemaElement],
) -> Vec<SchemaElement> {
    let selected: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let tables: HashSet<&str> = relevant
        .iter()
        .filter_map(|e| split_table_column(e).map(|(table, _)| table))
        .collect();

    all.iter()
        .filter(|element| {
            if selected.contains(element.as_str()) {
                return true;
            }
            match split_table_column(element) {
                Some((table, column)) => tables.contains(table) && is_identifier_column(column),
                None => false,
            }
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(names: &[&str]) -> Vec<SchemaElement> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identifier_columns() {
        for column in [
            "id",
            "ID",
            "customer_id",
            "product_name",
            "Title",
            "display_label",
            "urun_adi",
            "kategori_isim",
            "nombre",
            "titre_livre",
        ] {
            assert!(is_identifier_column(column), "{column}");
        }
        for column in ["amount", "idea", "address", "status", "created_at", "nomination_date"] {
            assert!(!is_identifier_column(column), "{column}");
        }
    }

    #[test]
    fn adds_keys_of_relevant_tables_only() {
        let all = elements(&[
            "shop.customers.id",
            "shop.customers.name",
            "shop.customers.email",
            "shop.orders.id",
            "shop.orders.customer_id",
            "shop.orders.amount",
            "shop.products.id",
            "shop.products.title",
        ]);
        let relevant = elements(&["shop.orders.amount", "shop.customers.email"]);

        let expanded = expand_with_identifiers(&all, &relevant);
        assert_eq!(
            expanded,
            elements(&[
                "shop.customers.id",
                "shop.customers.name",
                "shop.customers.email",
                "shop.orders.id",
                "shop.orders.customer_id",
                "shop.orders.amount",
            ])
        );
    }

    #[test]
    fn dotted_table_names_match_on_full_prefix() {
        let all = elements(&["a.b.c.id", "a.b.c.v", "a.b.id"]);
        let expanded = expand_with_identifiers(&all, &elements(&["a.b.c.v"]));
        assert_eq!(expanded, elements(&["a.b.c.id", "a.b.c.v"]));
    }

    #[test]
    fn nothing_relevant_means_nothing_added() {
        let all = elements(&["t.id", "t.name"]);
        assert!(expand_with_identifiers(&all, &[]).is_empty());
    }
}
