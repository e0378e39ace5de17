//! Identifier generation

use bech32::Bech32m;
use chrono::Utc;
use uuid7::uuid7;

pub const USER_HRP: &str = "user";
pub const BEAT_HRP: &str = "beat";
pub const MERCH_HRP: &str = "merch";
pub const ORDER_HRP: &str = "order";
pub const SESSION_HRP: &str = "session";
pub const MESSAGE_HRP: &str = "msg";

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Record id for one of the fixed prefixes above. The prefixes are valid hrps,
/// so the fallback to the bare uuid is never taken in practice.
pub fn new_record_id(hrp: &str) -> String {
    new_uuid_to_bech32(hrp).unwrap_or_else(|_| format!("{hrp}_{}", uuid7()))
}

/// External transaction reference handed to the payment processor.
pub fn new_transaction_id() -> String {
    uuid7().to_string()
}

/// `DR` + UTC timestamp at minute precision + 3 random bytes as hex.
/// Collisions are refused by the order number index at checkout.
pub fn new_order_number() -> String {
    let suffix: [u8; 3] = rand::random();
    format!(
        "DR{}{}",
        Utc::now().format("%Y%m%d%H%M"),
        hex::encode(suffix)
    )
}
