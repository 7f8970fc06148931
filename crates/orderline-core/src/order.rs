//! Order record model
//!
//! Field names follow the JSON payloads published to the orders topic. Every
//! struct defaults missing fields and fields set to `null`, so a payload only
//! has to be well-formed JSON to decode; key validation happens in
//! [`Order::from_payload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// A complete order: header, shipping destination, payment, and line items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    /// Unique order identifier (store and cache key)
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery: Delivery,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: Payment,
    /// Line items, in the order they were published
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub date_created: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

/// Shipping destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
}

/// Payment block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub transaction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    /// Unix timestamp of the payment
    #[serde(deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_cost: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub goods_total: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fee: i64,
}

/// Order line item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    #[serde(deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Discount percentage
    #[serde(deserialize_with = "null_as_default")]
    pub sale: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    /// Price after discount
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i64,
}

/// Treat an explicit `null` like an absent field
///
/// Binary formats (the cache snapshot) never encode `null` here and read the
/// value directly.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    if deserializer.is_human_readable() {
        Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
    } else {
        T::deserialize(deserializer)
    }
}

impl Order {
    /// Decode an order from a raw message payload
    ///
    /// # Errors
    /// - `Error::MalformedPayload` if the bytes are not an order-shaped JSON object
    /// - `Error::MissingKey` if `order_uid` is absent, `null`, or empty
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let order: Order = serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedPayload(e.to_string()))?;

        if order.order_uid.is_empty() {
            return Err(Error::MissingKey);
        }

        Ok(order)
    }

    /// The cache and store key for this order
    pub fn key(&self) -> &str {
        &self.order_uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_full_order() {
        let payload = br#"{
            "order_uid": "b563feb7b2b84b6test",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "b563feb7b2b84b6test",
                "request_id": "",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1637907727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [{
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }],
            "locale": "en",
            "internal_signature": "",
            "customer_id": "test",
            "delivery_service": "meest",
            "shardkey": "9",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z",
            "oof_shard": "1"
        }"#;

        let order = Order::from_payload(payload).unwrap();
        assert_eq!(order.key(), "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(order.items[0].total_price, 317);
        assert_eq!(order.date_created.timestamp(), 1637907739);
    }

    #[test]
    fn test_from_payload_empty_uid_is_missing_key() {
        let result = Order::from_payload(br#"{"order_uid":""}"#);
        assert!(matches!(result, Err(Error::MissingKey)));
    }

    #[test]
    fn test_from_payload_absent_uid_is_missing_key() {
        let result = Order::from_payload(br#"{"track_number":"WBILMTESTTRACK"}"#);
        assert!(matches!(result, Err(Error::MissingKey)));
    }

    #[test]
    fn test_from_payload_null_uid_is_missing_key() {
        let result = Order::from_payload(br#"{"order_uid":null}"#);
        assert!(matches!(result, Err(Error::MissingKey)));
    }

    #[test]
    fn test_from_payload_whitespace_uid_is_a_key() {
        let order = Order::from_payload(br#"{"order_uid":" "}"#).unwrap();
        assert_eq!(order.key(), " ");
    }

    #[test]
    fn test_from_payload_null_fields_take_defaults() {
        let order = Order::from_payload(
            br#"{
                "order_uid": "abc",
                "track_number": null,
                "items": null,
                "delivery": null,
                "payment": {"amount": null, "currency": "USD"},
                "sm_id": null,
                "date_created": null
            }"#,
        )
        .unwrap();

        assert_eq!(order.key(), "abc");
        assert!(order.items.is_empty());
        assert_eq!(order.delivery, Delivery::default());
        assert_eq!(order.payment.amount, 0);
        assert_eq!(order.payment.currency, "USD");
        assert_eq!(order.track_number, "");
        assert_eq!(order.date_created, DateTime::<Utc>::default());
    }

    #[test]
    fn test_from_payload_null_inside_items() {
        let order =
            Order::from_payload(br#"{"order_uid":"abc","items":[{"name":null,"price":5}]}"#)
                .unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].name, "");
        assert_eq!(order.items[0].price, 5);
    }

    #[test]
    fn test_from_payload_not_json() {
        let result = Order::from_payload(b"definitely not json");
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_from_payload_wrong_shape() {
        let result = Order::from_payload(br#"{"order_uid": 42}"#);
        assert!(matches!(result, Err(Error::MalformedPayload(_))));

        let result = Order::from_payload(br#"["order_uid"]"#);
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_item_order() {
        let order = Order {
            order_uid: "ord-1".to_string(),
            items: vec![
                Item {
                    chrt_id: 2,
                    name: "second".to_string(),
                    ..Default::default()
                },
                Item {
                    chrt_id: 1,
                    name: "first".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let json = serde_json::to_vec(&order).unwrap();
        let decoded = Order::from_payload(&json).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.items[0].chrt_id, 2);
    }
}
