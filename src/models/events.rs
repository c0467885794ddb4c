use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event published when a customer places an order: the order fields
/// flattened together with the identity of the customer who placed it.
///
/// Field names are serialized in camelCase because downstream consumers
/// decode the JSON by those names.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub uid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub item_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub price: f64,
    pub credit_card_info: String,
    pub created_at: DateTime<Utc>,
}

impl OrderPlaced {
    /// Stamps the event with the current time.
    pub fn new(
        uid: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        quantity: u32,
        price: f64,
        credit_card_info: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            item_id: item_id.into(),
            item_name: item_name.into(),
            quantity,
            price,
            credit_card_info: credit_card_info.into(),
            created_at: Utc::now(),
        }
    }
}

/// Event published when a placed order is ready for pickup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReady {
    pub name: String,
    pub email: String,
    pub item_name: String,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_placed_serializes_to_camel_case() {
        let order = OrderPlaced {
            uid: "u1".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john@example.com".to_string(),
            item_id: "pizza123".to_string(),
            item_name: "Pepperoni Pizza".to_string(),
            quantity: 2,
            price: 15.99,
            credit_card_info: "1234-5678-9012-3456".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };

        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains(r#""firstName":"John""#));
        assert!(json.contains(r#""itemName":"Pepperoni Pizza""#));
        assert!(json.contains(r#""creditCardInfo":"1234-5678-9012-3456""#));
        assert!(json.contains(r#""createdAt":"2024-01-01T12:00:00Z""#));
    }

    #[test]
    fn order_ready_round_trips() {
        let order = OrderReady {
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            item_name: "Burger".to_string(),
            quantity: 1,
        };

        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(
            json,
            r#"{"name":"Jane Smith","email":"jane@example.com","itemName":"Burger","quantity":1}"#
        );

        let decoded: OrderReady = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.item_name, "Burger");
        assert_eq!(decoded.quantity, 1);
    }
}
