//! Filter and pagination parameters for transaction listings.

use rusqlite::types::Value;
use time::Date;

use crate::{database_id::DatabaseId, money::Money};

use super::{cursor::Cursor, core::TransactionType};

/// The page size used when a query does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Filters and pagination for a transaction listing.
///
/// Filters are conjunctive: a row is returned only if it matches every
/// filter that is set. All filters apply before pagination, so page
/// boundaries are stable no matter which filters are active.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    /// Case-insensitive substring match against name, merchant, or notes.
    pub search: Option<String>,
    /// Inclusive lower bound on the transaction date.
    pub start_date: Option<Date>,
    /// Inclusive upper bound on the transaction date.
    pub end_date: Option<Date>,
    /// Keep only transactions whose type is in this set. Empty means all.
    pub types: Vec<TransactionType>,
    /// Keep only transactions whose category is in this set. Empty means all.
    pub category_ids: Vec<DatabaseId>,
    /// Inclusive lower bound on the amount magnitude.
    pub amount_min: Option<Money>,
    /// Inclusive upper bound on the amount magnitude.
    pub amount_max: Option<Money>,
    /// Resume after this position; `None` starts from the newest row.
    pub cursor: Option<Cursor>,
    /// Rows per page. `None` means [DEFAULT_PAGE_SIZE].
    pub limit: Option<u32>,
}

impl TransactionQuery {
    /// The effective page size.
    pub fn page_size(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Append one WHERE clause per active filter, with positional
    /// parameters numbered after the ones already collected.
    ///
    /// `prefix` qualifies column names when the listing joins other tables
    /// (e.g. `"t."`), and is empty for single-table queries.
    pub(crate) fn push_clauses(
        &self,
        prefix: &str,
        clauses: &mut Vec<String>,
        parameters: &mut Vec<Value>,
    ) {
        if let Some(search) = &self.search {
            let pattern = format!("%{search}%");
            clauses.push(format!(
                "({prefix}name LIKE ?{} OR {prefix}merchant LIKE ?{} OR {prefix}notes LIKE ?{})",
                parameters.len() + 1,
                parameters.len() + 2,
                parameters.len() + 3,
            ));
            for _ in 0..3 {
                parameters.push(Value::Text(pattern.clone()));
            }
        }

        if let Some(start_date) = self.start_date {
            clauses.push(format!("{prefix}date >= ?{}", parameters.len() + 1));
            parameters.push(Value::Text(start_date.to_string()));
        }

        if let Some(end_date) = self.end_date {
            clauses.push(format!("{prefix}date <= ?{}", parameters.len() + 1));
            parameters.push(Value::Text(end_date.to_string()));
        }

        if !self.types.is_empty() {
            clauses.push(format!(
                "{prefix}type IN ({})",
                placeholders(parameters.len(), self.types.len())
            ));
            for transaction_type in &self.types {
                parameters.push(Value::Text(transaction_type.as_str().to_owned()));
            }
        }

        if !self.category_ids.is_empty() {
            clauses.push(format!(
                "{prefix}category_id IN ({})",
                placeholders(parameters.len(), self.category_ids.len())
            ));
            for category_id in &self.category_ids {
                parameters.push(Value::Integer(*category_id));
            }
        }

        if let Some(amount_min) = self.amount_min {
            clauses.push(format!(
                "CAST({prefix}amount AS REAL) >= ?{}",
                parameters.len() + 1
            ));
            parameters.push(Value::Real(amount_min.approx_f64()));
        }

        if let Some(amount_max) = self.amount_max {
            clauses.push(format!(
                "CAST({prefix}amount AS REAL) <= ?{}",
                parameters.len() + 1
            ));
            parameters.push(Value::Real(amount_max.approx_f64()));
        }

        // The keyset boundary: strictly after the cursor row in
        // (date DESC, id DESC) order.
        if let Some(cursor) = &self.cursor {
            clauses.push(format!(
                "({prefix}date < ?{} OR ({prefix}date = ?{} AND {prefix}id < ?{}))",
                parameters.len() + 1,
                parameters.len() + 2,
                parameters.len() + 3,
            ));
            parameters.push(Value::Text(cursor.date.to_string()));
            parameters.push(Value::Text(cursor.date.to_string()));
            parameters.push(Value::Integer(cursor.id));
        }
    }
}

fn placeholders(offset: usize, count: usize) -> String {
    (1..=count)
        .map(|position| format!("?{}", offset + position))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod push_clauses_tests {
    use rusqlite::types::Value;
    use time::macros::date;

    use crate::{money::Money, transaction::Cursor};

    use super::{TransactionQuery, TransactionType};

    fn clauses_for(query: &TransactionQuery) -> (Vec<String>, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut parameters = Vec::new();
        query.push_clauses("", &mut clauses, &mut parameters);
        (clauses, parameters)
    }

    #[test]
    fn empty_query_adds_nothing() {
        let (clauses, parameters) = clauses_for(&TransactionQuery::default());

        assert!(clauses.is_empty());
        assert!(parameters.is_empty());
    }

    #[test]
    fn search_matches_three_columns() {
        let query = TransactionQuery {
            search: Some("cafe".to_owned()),
            ..Default::default()
        };

        let (clauses, parameters) = clauses_for(&query);

        assert_eq!(
            clauses,
            vec!["(name LIKE ?1 OR merchant LIKE ?2 OR notes LIKE ?3)".to_owned()]
        );
        assert_eq!(parameters, vec![Value::Text("%cafe%".to_owned()); 3]);
    }

    #[test]
    fn date_range_is_inclusive_bounds() {
        let query = TransactionQuery {
            start_date: Some(date!(2026 - 01 - 01)),
            end_date: Some(date!(2026 - 01 - 31)),
            ..Default::default()
        };

        let (clauses, parameters) = clauses_for(&query);

        assert_eq!(clauses, vec!["date >= ?1".to_owned(), "date <= ?2".to_owned()]);
        assert_eq!(
            parameters,
            vec![
                Value::Text("2026-01-01".to_owned()),
                Value::Text("2026-01-31".to_owned())
            ]
        );
    }

    #[test]
    fn type_set_uses_in_clause() {
        let query = TransactionQuery {
            types: vec![TransactionType::Income, TransactionType::Expense],
            ..Default::default()
        };

        let (clauses, parameters) = clauses_for(&query);

        assert_eq!(clauses, vec!["type IN (?1, ?2)".to_owned()]);
        assert_eq!(
            parameters,
            vec![
                Value::Text("income".to_owned()),
                Value::Text("expense".to_owned())
            ]
        );
    }

    #[test]
    fn cursor_becomes_keyset_boundary() {
        let query = TransactionQuery {
            cursor: Some(Cursor {
                date: date!(2026 - 01 - 15),
                id: 99,
            }),
            ..Default::default()
        };

        let (clauses, parameters) = clauses_for(&query);

        assert_eq!(
            clauses,
            vec!["(date < ?1 OR (date = ?2 AND id < ?3))".to_owned()]
        );
        assert_eq!(parameters.len(), 3);
    }

    #[test]
    fn filters_compose_with_running_parameter_numbers() {
        let query = TransactionQuery {
            types: vec![TransactionType::Expense],
            amount_min: Some(Money::parse("100000").unwrap()),
            amount_max: Some(Money::parse("200000").unwrap()),
            ..Default::default()
        };

        let (clauses, parameters) = clauses_for(&query);

        assert_eq!(
            clauses,
            vec![
                "type IN (?1)".to_owned(),
                "CAST(amount AS REAL) >= ?2".to_owned(),
                "CAST(amount AS REAL) <= ?3".to_owned(),
            ]
        );
        assert_eq!(parameters.len(), 3);
    }

    #[test]
    fn prefix_qualifies_columns() {
        let query = TransactionQuery {
            start_date: Some(date!(2026 - 01 - 01)),
            ..Default::default()
        };

        let mut clauses = Vec::new();
        let mut parameters = Vec::new();
        query.push_clauses("t.", &mut clauses, &mut parameters);

        assert_eq!(clauses, vec!["t.date >= ?1".to_owned()]);
    }
}
