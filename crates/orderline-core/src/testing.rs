//! Order fixtures for tests

use chrono::{TimeZone, Utc};

use crate::order::{Delivery, Item, Order, Payment};

/// A fully populated order with two line items
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![
            Item {
                chrt_id: 9_934_930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            },
            Item {
                chrt_id: 9_934_931,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 120,
                rid: "ab4219087a764ae0btest2".to_string(),
                name: "Lipstick".to_string(),
                sale: 0,
                size: "S".to_string(),
                total_price: 120,
                nm_id: 2_389_213,
                brand: "Essence".to_string(),
                status: 202,
            },
        ],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_string(),
    }
}

/// JSON payload bytes for `sample_order(order_uid)`
pub fn sample_payload(order_uid: &str) -> Vec<u8> {
    serde_json::to_vec(&sample_order(order_uid)).expect("sample order serializes")
}
