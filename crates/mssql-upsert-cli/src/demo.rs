//! Customer scenario run by the `demo` command.
//!
//! 1. Upsert two customers by primary key (one existing, one new).
//! 2. Move Joseph to Pittsburgh, add Betsy, and upsert by first and last name.
//! 3. Delete every customer whose first name starts with "J", by id.

use mssql_upsert::{Field, Record, Result, SyncTarget, Syncer};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Customer {
    pub customer_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl Customer {
    fn new(id: i32, first: &str, last: &str, city: &str, state: &str) -> Self {
        Self {
            customer_id: id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            city: Some(city.to_string()),
            state: Some(state.to_string()),
        }
    }
}

impl Record for Customer {
    fn fields() -> Vec<Field<Self>> {
        vec![
            Field::new("CustomerID", |c: &Customer| c.customer_id),
            Field::new("FirstName", |c: &Customer| c.first_name.clone()),
            Field::new("LastName", |c: &Customer| c.last_name.clone()),
            Field::new("City", |c: &Customer| c.city.clone()),
            Field::new("State", |c: &Customer| c.state.clone()),
        ]
    }
}

/// Key projection matching customers by name.
pub struct CustomerName;

impl Record for CustomerName {
    fn fields() -> Vec<Field<Self>> {
        vec![
            Field::new("FirstName", |_: &CustomerName| ""),
            Field::new("LastName", |_: &CustomerName| ""),
        ]
    }
}

/// Key projection holding only the id.
pub struct CustomerKey {
    pub id: i32,
}

impl Record for CustomerKey {
    fn fields() -> Vec<Field<Self>> {
        vec![Field::new("id", |k: &CustomerKey| k.id).column("CustomerID")]
    }
}

#[derive(Debug, Serialize)]
pub struct DemoStep {
    pub step: &'static str,
    pub rows_affected: u64,
}

pub fn initial_customers() -> Vec<Customer> {
    vec![
        Customer::new(1, "Joseph", "Smith", "Philadelphia", "PA"),
        Customer::new(4, "Jane", "West", "Denver", "CO"),
    ]
}

/// Keys of customers whose first name starts with "J".
pub fn j_keys(customers: &[Customer]) -> Vec<CustomerKey> {
    customers
        .iter()
        .filter(|c| c.first_name.starts_with('J'))
        .map(|c| CustomerKey { id: c.customer_id })
        .collect()
}

pub async fn run<T: SyncTarget>(
    syncer: &Syncer<T>,
    schema: &str,
    table: &str,
) -> Result<Vec<DemoStep>> {
    let mut steps = Vec::new();
    let mut customers = initial_customers();

    let outcome = syncer.upsert(&customers, schema, table).await?;
    steps.push(DemoStep {
        step: "upsert by primary key",
        rows_affected: outcome.rows_affected,
    });

    customers[0].city = Some("Pittsburgh".to_string());
    customers.push(Customer::new(5, "Betsy", "Collins", "Denver", "CO"));

    let outcome = syncer
        .upsert_with_key::<Customer, CustomerName>(&customers, schema, table)
        .await?;
    steps.push(DemoStep {
        step: "upsert by name",
        rows_affected: outcome.rows_affected,
    });

    let keys = j_keys(&customers);
    let outcome = syncer.delete(&keys, schema, table).await?;
    steps.push(DemoStep {
        step: "delete by id",
        rows_affected: outcome.rows_affected,
    });

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_upsert::record::property_names;

    #[test]
    fn test_customer_fields_in_column_order() {
        assert_eq!(
            property_names::<Customer>(),
            vec!["CustomerID", "FirstName", "LastName", "City", "State"]
        );
        assert_eq!(property_names::<CustomerName>(), vec!["FirstName", "LastName"]);
        assert_eq!(property_names::<CustomerKey>(), vec!["CustomerID"]);
    }

    #[test]
    fn test_j_keys() {
        let mut customers = initial_customers();
        customers.push(Customer::new(5, "Betsy", "Collins", "Denver", "CO"));
        let ids: Vec<i32> = j_keys(&customers).iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }
}
