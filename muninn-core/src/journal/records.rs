//! Journal record codec
//!
//! Every record payload is little-endian:
//!
//! ```text
//! [u8 schema version][i64 timestamp_nanos][body...]
//! ```
//!
//! and is framed by the append log with a length prefix and a CRC32.
//! Strings are u32-length-prefixed UTF-8; optional fields carry a
//! presence byte. A stored `price_scale` of 0 is coerced to 100 on read
//! (legacy records predate per-symbol scales); this is the only implicit
//! coercion anywhere in the codec.

use super::JournalError;
use crate::algo::definition::{AlgoState, StrategyDefinition};
use crate::core::audit::{AuditEvent, AuditKind};
use crate::core::types::{
    Exchange, Order, OrderStatus, OrderType, Side, Symbol, TimeInForce, Trade,
};
use crate::positions::Position;

pub const SCHEMA_VERSION: u8 = 1;

/// Fallback applied when a stored record carries `price_scale = 0`.
const LEGACY_PRICE_SCALE: i64 = 100;

// ─── byte-level helpers ─────────────────────────────────────────────────────

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_header(timestamp_nanos: i64) -> Self {
        let mut w = Self {
            buf: Vec::with_capacity(128),
        };
        w.put_u8(SCHEMA_VERSION);
        w.put_i64(timestamp_nanos);
        w
    }

    #[inline]
    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    #[inline]
    fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_str(&mut self, s: &str) {
        self.put_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn put_opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.put_u8(1);
                self.put_str(s);
            }
            None => self.put_u8(0),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JournalError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| JournalError::Malformed("record body truncated".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, JournalError> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> Result<i32, JournalError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Result<u32, JournalError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, JournalError> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn str(&mut self) -> Result<String, JournalError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| JournalError::Malformed("invalid utf-8 in record".to_string()))
    }

    fn opt_str(&mut self) -> Result<Option<String>, JournalError> {
        if self.u8()? == 0 {
            Ok(None)
        } else {
            Ok(Some(self.str()?))
        }
    }
}

fn read_header(r: &mut Reader<'_>) -> Result<i64, JournalError> {
    let version = r.u8()?;
    if version != SCHEMA_VERSION {
        return Err(JournalError::UnsupportedVersion(version));
    }
    r.i64()
}

fn read_symbol(r: &mut Reader<'_>) -> Result<Symbol, JournalError> {
    let ticker = r.str()?;
    let exchange = read_enum(r, Exchange::from_u8, "exchange")?;
    Ok(Symbol::new(ticker, exchange))
}

fn read_enum<T>(
    r: &mut Reader<'_>,
    parse: fn(u8) -> Option<T>,
    what: &str,
) -> Result<T, JournalError> {
    let tag = r.u8()?;
    parse(tag).ok_or_else(|| JournalError::Malformed(format!("bad {} tag {}", what, tag)))
}

#[inline]
fn coerce_scale(scale: i32) -> i64 {
    if scale == 0 {
        LEGACY_PRICE_SCALE
    } else {
        scale as i64
    }
}

// ─── order records ──────────────────────────────────────────────────────────

pub fn encode_order(order: &Order, timestamp_nanos: i64) -> Vec<u8> {
    let mut w = Writer::with_header(timestamp_nanos);
    w.put_i64(order.client_order_id);
    w.put_opt_str(order.exchange_order_id.as_deref());
    w.put_str(&order.symbol.ticker);
    w.put_u8(order.symbol.exchange as u8);
    w.put_u8(order.side as u8);
    w.put_u8(order.order_type as u8);
    w.put_u8(order.time_in_force as u8);
    w.put_i32(order.price_scale as i32);
    w.put_i64(order.quantity);
    w.put_i64(order.price);
    w.put_i64(order.stop_price);
    w.put_i64(order.filled_quantity);
    w.put_i64(order.average_filled_price);
    w.put_u8(order.status as u8);
    w.put_opt_str(order.reject_reason.as_deref());
    w.put_opt_str(order.strategy_id.as_deref());
    w.put_i64(order.created_at);
    w.put_i64(order.last_updated_at);
    w.finish()
}

pub fn decode_order(payload: &[u8]) -> Result<(i64, Order), JournalError> {
    let mut r = Reader::new(payload);
    let ts = read_header(&mut r)?;

    let client_order_id = r.i64()?;
    let exchange_order_id = r.opt_str()?;
    let ticker = r.str()?;
    let exchange = read_enum(&mut r, Exchange::from_u8, "exchange")?;
    let side = read_enum(&mut r, Side::from_u8, "side")?;
    let order_type = read_enum(&mut r, OrderType::from_u8, "order type")?;
    let time_in_force = read_enum(&mut r, TimeInForce::from_u8, "time in force")?;
    let price_scale = coerce_scale(r.i32()?);
    let quantity = r.i64()?;
    let price = r.i64()?;
    let stop_price = r.i64()?;
    let filled_quantity = r.i64()?;
    let average_filled_price = r.i64()?;
    let status = read_enum(&mut r, OrderStatus::from_u8, "status")?;
    let reject_reason = r.opt_str()?;
    let strategy_id = r.opt_str()?;
    let created_at = r.i64()?;
    let last_updated_at = r.i64()?;

    Ok((
        ts,
        Order {
            client_order_id,
            exchange_order_id,
            symbol: Symbol::new(ticker, exchange),
            side,
            order_type,
            time_in_force,
            quantity,
            price,
            stop_price,
            price_scale,
            filled_quantity,
            average_filled_price,
            status,
            reject_reason,
            strategy_id,
            created_at,
            submitted_at: 0,
            last_updated_at,
            submit_latency_ns: 0,
            ack_latency_ns: 0,
        },
    ))
}

// ─── trade records ──────────────────────────────────────────────────────────

pub fn encode_trade(trade: &Trade, timestamp_nanos: i64) -> Vec<u8> {
    let mut w = Writer::with_header(timestamp_nanos);
    w.put_i64(trade.client_order_id);
    w.put_str(&trade.exchange_trade_id);
    w.put_str(&trade.symbol.ticker);
    w.put_u8(trade.symbol.exchange as u8);
    w.put_u8(trade.side as u8);
    w.put_i64(trade.quantity);
    w.put_i64(trade.price);
    w.put_i64(trade.executed_at);
    w.put_i32(trade.price_scale as i32);
    w.finish()
}

pub fn decode_trade(payload: &[u8]) -> Result<(i64, Trade), JournalError> {
    let mut r = Reader::new(payload);
    let ts = read_header(&mut r)?;

    let client_order_id = r.i64()?;
    let exchange_trade_id = r.str()?;
    let ticker = r.str()?;
    let exchange = read_enum(&mut r, Exchange::from_u8, "exchange")?;
    let side = read_enum(&mut r, Side::from_u8, "side")?;
    let quantity = r.i64()?;
    let price = r.i64()?;
    let executed_at = r.i64()?;
    let price_scale = coerce_scale(r.i32()?);

    Ok((
        ts,
        Trade {
            symbol: Symbol::new(ticker, exchange),
            side,
            quantity,
            price,
            client_order_id,
            exchange_trade_id,
            executed_at,
            price_scale,
        },
    ))
}

// ─── position snapshot records ──────────────────────────────────────────────

pub fn encode_position(position: &Position, timestamp_nanos: i64) -> Vec<u8> {
    let mut w = Writer::with_header(timestamp_nanos);
    w.put_str(&position.symbol.ticker);
    w.put_u8(position.symbol.exchange as u8);
    w.put_i64(position.quantity);
    w.put_i64(position.average_entry_price);
    w.put_i64(position.total_cost);
    w.put_i64(position.realized_pnl);
    w.put_i64(position.current_price);
    w.put_i64(position.market_value);
    w.put_i64(position.unrealized_pnl);
    w.put_i64(position.max_drawdown);
    w.put_i64(position.opened_at);
    w.put_i32(position.price_scale as i32);
    w.finish()
}

pub fn decode_position(payload: &[u8]) -> Result<(i64, Position), JournalError> {
    let mut r = Reader::new(payload);
    let ts = read_header(&mut r)?;

    let symbol = read_symbol(&mut r)?;
    let quantity = r.i64()?;
    let average_entry_price = r.i64()?;
    let total_cost = r.i64()?;
    let realized_pnl = r.i64()?;
    let current_price = r.i64()?;
    let market_value = r.i64()?;
    let unrealized_pnl = r.i64()?;
    let max_drawdown = r.i64()?;
    let opened_at = r.i64()?;
    let price_scale = coerce_scale(r.i32()?);

    Ok((
        ts,
        Position {
            symbol,
            quantity,
            average_entry_price,
            total_cost,
            realized_pnl,
            current_price,
            market_value,
            unrealized_pnl,
            max_drawdown,
            opened_at,
            price_scale,
        },
    ))
}

// ─── strategy records ───────────────────────────────────────────────────────

/// A strategy record is either a definition upsert or a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyRecord {
    Upsert(StrategyDefinition),
    Tombstone { id: String },
}

pub fn encode_strategy(record: &StrategyRecord, timestamp_nanos: i64) -> Vec<u8> {
    let mut w = Writer::with_header(timestamp_nanos);
    match record {
        StrategyRecord::Tombstone { id } => {
            w.put_u8(1);
            w.put_str(id);
        }
        StrategyRecord::Upsert(def) => {
            w.put_u8(0);
            w.put_str(&def.id);
            w.put_str(&def.display_name);
            w.put_str(&def.algo_type);
            w.put_u32(def.symbols.len() as u32);
            for symbol in &def.symbols {
                w.put_str(&symbol.ticker);
                w.put_u8(symbol.exchange as u8);
            }
            w.put_u8(def.exchange as u8);
            w.put_str(&def.parameters.to_string());
            w.put_u8(def.state as u8);
        }
    }
    w.finish()
}

pub fn decode_strategy(payload: &[u8]) -> Result<(i64, StrategyRecord), JournalError> {
    let mut r = Reader::new(payload);
    let ts = read_header(&mut r)?;

    if r.u8()? == 1 {
        return Ok((ts, StrategyRecord::Tombstone { id: r.str()? }));
    }

    let id = r.str()?;
    let display_name = r.str()?;
    let algo_type = r.str()?;
    let count = r.u32()? as usize;
    let mut symbols = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        symbols.push(read_symbol(&mut r)?);
    }
    let exchange = read_enum(&mut r, Exchange::from_u8, "exchange")?;
    let raw_parameters = r.str()?;
    let parameters = serde_json::from_str(&raw_parameters)
        .map_err(|e| JournalError::Malformed(format!("bad strategy parameters: {}", e)))?;
    let state = read_enum(&mut r, AlgoState::from_u8, "algo state")?;

    Ok((
        ts,
        StrategyRecord::Upsert(StrategyDefinition {
            id,
            display_name,
            algo_type,
            symbols,
            exchange,
            parameters,
            state,
        }),
    ))
}

// ─── audit records ──────────────────────────────────────────────────────────

pub fn encode_audit(event: &AuditEvent) -> Vec<u8> {
    let mut w = Writer::with_header(event.timestamp_nanos);
    w.put_u8(event.kind as u8);
    w.put_str(&event.message);
    w.put_str(&event.details.to_string());
    w.finish()
}

pub fn decode_audit(payload: &[u8]) -> Result<AuditEvent, JournalError> {
    let mut r = Reader::new(payload);
    let timestamp_nanos = read_header(&mut r)?;

    let kind = read_enum(&mut r, AuditKind::from_u8, "audit kind")?;
    let message = r.str()?;
    let raw_details = r.str()?;
    let details = serde_json::from_str(&raw_details)
        .map_err(|e| JournalError::Malformed(format!("bad audit details: {}", e)))?;

    Ok(AuditEvent {
        timestamp_nanos,
        kind,
        message,
        details,
    })
}
