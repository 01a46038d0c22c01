//! Determinism verification utilities.
//!
//! Replaying an audit log must rebuild exactly the same book and trade
//! history. These digests make that comparison cheap: two engines with the
//! same digest hold the same resting orders in the same queue positions.

use sha2::{Digest, Sha256};
use tapeline_types::constants::BOOK_DIGEST_TAG;
use tapeline_types::{Order, Trade};

use crate::orderbook::OrderBook;
use crate::price_level::PriceLevel;

/// Compute the trade root hash over a sequence of trades.
///
/// The same trades in the same order always produce the same root.
#[must_use]
pub fn compute_trade_root(trades: &[Trade]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"tapeline:trade_root:v1:");
    hasher.update((trades.len() as u64).to_le_bytes());

    for trade in trades {
        hasher.update(trade.id.0.as_bytes());
        hasher.update(trade.sequence.to_le_bytes());
        hasher.update(trade.taker_order_id.0.as_bytes());
        hasher.update(trade.maker_order_id.0.as_bytes());
        hasher.update(trade.taker_account_id.0.as_bytes());
        hasher.update(trade.maker_account_id.0.as_bytes());
        hasher.update(trade.price.0.to_le_bytes());
        hasher.update(trade.quantity.0.to_le_bytes());
    }

    hasher.finalize().into()
}

/// Verify that a given trade root matches the expected hash.
#[must_use]
pub fn verify_trade_root(trades: &[Trade], expected_root: &[u8; 32]) -> bool {
    compute_trade_root(trades) == *expected_root
}

/// Digest of the resting book: every level in priority order and every
/// order in queue order, with its open quantities.
#[must_use]
pub fn book_digest(book: &OrderBook) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BOOK_DIGEST_TAG);
    hasher.update(book.symbol.as_str().as_bytes());
    hasher.update([0u8]);
    hash_side(&mut hasher, b"B", book.bid_levels());
    hash_side(&mut hasher, b"A", book.ask_levels());
    hasher.finalize().into()
}

fn hash_side<'a>(hasher: &mut Sha256, tag: &[u8], levels: impl Iterator<Item = &'a PriceLevel>) {
    hasher.update(tag);
    for level in levels {
        hasher.update(level.price.0.to_le_bytes());
        hasher.update((level.len() as u64).to_le_bytes());
        for order in &level.orders {
            hash_order(hasher, order);
        }
    }
}

fn hash_order(hasher: &mut Sha256, order: &Order) {
    hasher.update(order.id.0.as_bytes());
    hasher.update(order.account_id.0.as_bytes());
    hasher.update(order.remaining.0.to_le_bytes());
    hasher.update(order.hidden.0.to_le_bytes());
    hasher.update(order.arrival.to_le_bytes());
}

/// Hex form for logs and CLI output.
#[must_use]
pub fn digest_hex(digest: &[u8; 32]) -> String {
    hex::encode(digest)
}
