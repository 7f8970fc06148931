//! Row to model conversion

use orderline_core::{Delivery, Error, Item, Order, Payment, Result};
use sqlx::Row;
use sqlx::postgres::PgRow;

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| Error::Database(format!("column {}: {}", name, e)))
}

/// Header columns, with delivery and payment left at their defaults
pub(crate) fn order_header(row: &PgRow) -> Result<Order> {
    Ok(Order {
        order_uid: col(row, "order_uid")?,
        track_number: col(row, "track_number")?,
        entry: col(row, "entry")?,
        locale: col(row, "locale")?,
        internal_signature: col(row, "internal_signature")?,
        customer_id: col(row, "customer_id")?,
        delivery_service: col(row, "delivery_service")?,
        shardkey: col(row, "shardkey")?,
        sm_id: col(row, "sm_id")?,
        date_created: col(row, "date_created")?,
        oof_shard: col(row, "oof_shard")?,
        ..Order::default()
    })
}

pub(crate) fn delivery(row: &PgRow) -> Result<Delivery> {
    Ok(Delivery {
        name: col(row, "name")?,
        phone: col(row, "phone")?,
        zip: col(row, "zip")?,
        city: col(row, "city")?,
        address: col(row, "address")?,
        region: col(row, "region")?,
        email: col(row, "email")?,
    })
}

pub(crate) fn payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        transaction: col(row, "transaction_id")?,
        request_id: col(row, "request_id")?,
        currency: col(row, "currency")?,
        provider: col(row, "provider")?,
        amount: col(row, "amount")?,
        payment_dt: col(row, "payment_dt")?,
        bank: col(row, "bank")?,
        delivery_cost: col(row, "delivery_cost")?,
        goods_total: col(row, "goods_total")?,
        custom_fee: col(row, "custom_fee")?,
    })
}

pub(crate) fn item(row: &PgRow) -> Result<Item> {
    Ok(Item {
        chrt_id: col(row, "chrt_id")?,
        track_number: col(row, "track_number")?,
        price: col(row, "price")?,
        rid: col(row, "rid")?,
        name: col(row, "name")?,
        sale: col(row, "sale")?,
        size: col(row, "size")?,
        total_price: col(row, "total_price")?,
        nm_id: col(row, "nm_id")?,
        brand: col(row, "brand")?,
        status: col(row, "status")?,
    })
}
