//! Binary framing for the market-data socket.
//!
//! Every packet starts with a 2-byte big-endian length (the number of bytes
//! that follow it) and a one-byte packet type. Several packets may share a
//! single WebSocket binary message.
//!
//! # Outbound packets
//!
//! | Type | Name        | Body after the type byte                          |
//! |------|-------------|---------------------------------------------------|
//! | 1    | auth        | `field_count:u8`, fields 1 token, 2 mode, 3 channel, 4 source |
//! | 3    | ack         | `msg_num:u32`                                     |
//! | 4/5  | (un)sub     | `2`, field 1 `count:u16 [len:u8 symbol]*`, field 2 channel |
//! | 11   | ping        | (empty)                                           |
//! | 12   | full mode   | `2`, field 1 channel, field 2 `'F'`               |
//!
//! A field is `id:u8 | len:u16 | bytes`.
//!
//! # Inbound packets
//!
//! | Type | Name          | Body after the type byte                                  |
//! |------|---------------|-----------------------------------------------------------|
//! | 1    | auth ack      | `field_count:u8`, field 1 status (`'K'`), field 2 `ack_threshold:u32` |
//! | 4    | subscribe ack | `count:u16 [token:u32 len:u8 symbol]*`                    |
//! | 6    | data ack      | `msg_num:u32`                                             |
//! | 7    | tick          | `token:u32 ltp open high low close:i32 volume:u32 ts:u32` |
//! | 8    | quote         | `token:u32 bid ask:i32 bid_size ask_size:u32 ts:u32`      |
//!
//! Prices are integers in paise (divide by 100). Timestamps are Unix seconds.

use fy_core::FyError;

pub const TYPE_AUTH: u8 = 1;
pub const TYPE_ACK: u8 = 3;
pub const TYPE_SUBSCRIBE: u8 = 4;
pub const TYPE_UNSUBSCRIBE: u8 = 5;
pub const TYPE_DATA_ACK: u8 = 6;
pub const TYPE_TICK: u8 = 7;
pub const TYPE_QUOTE: u8 = 8;
pub const TYPE_PING: u8 = 11;
pub const TYPE_FULL_MODE: u8 = 12;

/// Channel number this adapter streams on.
pub const CHANNEL: &[u8] = b"1";

/// Auth success status byte.
pub const AUTH_OK: u8 = b'K';

/// Upper bound on symbols carried by one (un)subscribe packet.
pub const MAX_SYMBOLS_PER_FRAME: usize = 50;

const PRICE_SCALE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Cursor reader
// ---------------------------------------------------------------------------

/// Bounds-checked big-endian reader over a byte slice.
///
/// Every read either advances the cursor or fails with [`FyError::Parse`];
/// nothing indexes past the end of the buffer.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FyError> {
        if self.remaining() < n {
            return Err(FyError::Parse(format!(
                "need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FyError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, FyError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FyError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FyError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, FyError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Fixed-point price: i32 paise → rupees.
    pub fn read_price(&mut self) -> Result<f64, FyError> {
        Ok(self.read_i32()? as f64 / PRICE_SCALE)
    }

    /// `len:u8` followed by that many UTF-8 bytes.
    pub fn read_short_str(&mut self) -> Result<String, FyError> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| FyError::Parse(format!("symbol: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// Assemble `len | type | field_count | fields`.
fn build_fielded(msg_type: u8, fields: &[(u8, &[u8])]) -> Result<Vec<u8>, FyError> {
    let mut body = vec![msg_type, fields.len() as u8];
    for (id, data) in fields {
        let len = u16::try_from(data.len())
            .map_err(|_| FyError::InvalidArgument(format!("field {id} too long ({} bytes)", data.len())))?;
        body.push(*id);
        body.extend_from_slice(&len.to_be_bytes());
        body.extend_from_slice(data);
    }
    prefix_len(body)
}

fn prefix_len(body: Vec<u8>) -> Result<Vec<u8>, FyError> {
    let len = u16::try_from(body.len())
        .map_err(|_| FyError::InvalidArgument(format!("packet too long ({} bytes)", body.len())))?;
    let mut out = Vec::with_capacity(body.len() + 2);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Auth packet carrying the session token and source tag.
pub fn auth_frame(token: &str, source: &str) -> Result<Vec<u8>, FyError> {
    build_fielded(
        TYPE_AUTH,
        &[
            (1, token.as_bytes()),
            (2, &b"P"[..]),
            (3, CHANNEL),
            (4, source.as_bytes()),
        ],
    )
}

/// Switch the channel to full streaming mode.
pub fn full_mode_frame() -> Result<Vec<u8>, FyError> {
    build_fielded(TYPE_FULL_MODE, &[(1, CHANNEL), (2, &b"F"[..])])
}

fn symbol_list(symbols: &[String]) -> Result<Vec<u8>, FyError> {
    let count = u16::try_from(symbols.len())
        .map_err(|_| FyError::InvalidArgument("too many symbols".into()))?;
    let mut out = count.to_be_bytes().to_vec();
    for symbol in symbols {
        let len = u8::try_from(symbol.len())
            .map_err(|_| FyError::InvalidArgument(format!("symbol too long: {symbol}")))?;
        out.push(len);
        out.extend_from_slice(symbol.as_bytes());
    }
    Ok(out)
}

/// Subscribe packets for `symbols`, split into batches of
/// [`MAX_SYMBOLS_PER_FRAME`].
pub fn subscribe_frames(symbols: &[String]) -> Result<Vec<Vec<u8>>, FyError> {
    list_frames(TYPE_SUBSCRIBE, symbols)
}

pub fn unsubscribe_frames(symbols: &[String]) -> Result<Vec<Vec<u8>>, FyError> {
    list_frames(TYPE_UNSUBSCRIBE, symbols)
}

fn list_frames(msg_type: u8, symbols: &[String]) -> Result<Vec<Vec<u8>>, FyError> {
    symbols
        .chunks(MAX_SYMBOLS_PER_FRAME)
        .map(|batch| build_fielded(msg_type, &[(1, symbol_list(batch)?.as_slice()), (2, CHANNEL)]))
        .collect()
}

pub fn ping_frame() -> Vec<u8> {
    vec![0, 1, TYPE_PING]
}

/// Acknowledge data packets up to `msg_num`.
pub fn ack_frame(msg_num: u32) -> Vec<u8> {
    let mut out = vec![0, 5, TYPE_ACK];
    out.extend_from_slice(&msg_num.to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Inbound packets
// ---------------------------------------------------------------------------

/// Trade update as it arrives on the wire (symbol still a token).
#[derive(Debug, Clone, PartialEq)]
pub struct RawTick {
    pub token: u32,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u32,
    pub exchange_time_s: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub token: u32,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: u32,
    pub ask_size: u32,
    pub exchange_time_s: u32,
}

/// One decoded inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    AuthAck { success: bool, ack_threshold: u32 },
    SubscribeAck { tokens: Vec<(u32, String)> },
    DataAck { msg_num: u32 },
    Tick(RawTick),
    Quote(RawQuote),
    Unknown { packet_type: u8 },
}

/// Split one WebSocket message into packets and decode each.
///
/// A packet whose body is malformed yields an `Err` entry and decoding moves
/// on to the next packet. A length prefix that overruns the message ends
/// decoding with a final `Err`.
pub fn decode_message(data: &[u8]) -> Vec<Result<Packet, FyError>> {
    let mut out = Vec::new();
    let mut reader = Reader::new(data);
    while !reader.is_empty() {
        let body = match reader.read_u16().and_then(|len| reader.read_bytes(len as usize)) {
            Ok(b) => b,
            Err(e) => {
                out.push(Err(e));
                break;
            }
        };
        out.push(decode_packet(body));
    }
    out
}

/// Decode a single packet body (type byte onwards).
pub fn decode_packet(body: &[u8]) -> Result<Packet, FyError> {
    let mut r = Reader::new(body);
    let packet_type = r.read_u8()?;
    match packet_type {
        TYPE_AUTH => decode_auth_ack(&mut r),
        TYPE_SUBSCRIBE => {
            let count = r.read_u16()?;
            let mut tokens = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let token = r.read_u32()?;
                tokens.push((token, r.read_short_str()?));
            }
            Ok(Packet::SubscribeAck { tokens })
        }
        TYPE_DATA_ACK => Ok(Packet::DataAck {
            msg_num: r.read_u32()?,
        }),
        TYPE_TICK => Ok(Packet::Tick(RawTick {
            token: r.read_u32()?,
            last_price: r.read_price()?,
            open: r.read_price()?,
            high: r.read_price()?,
            low: r.read_price()?,
            close: r.read_price()?,
            volume: r.read_u32()?,
            exchange_time_s: r.read_u32()?,
        })),
        TYPE_QUOTE => Ok(Packet::Quote(RawQuote {
            token: r.read_u32()?,
            bid_price: r.read_price()?,
            ask_price: r.read_price()?,
            bid_size: r.read_u32()?,
            ask_size: r.read_u32()?,
            exchange_time_s: r.read_u32()?,
        })),
        other => Ok(Packet::Unknown { packet_type: other }),
    }
}

fn decode_auth_ack(r: &mut Reader<'_>) -> Result<Packet, FyError> {
    let field_count = r.read_u8()?;
    let mut success = false;
    let mut ack_threshold = 0;
    for _ in 0..field_count {
        let id = r.read_u8()?;
        let len = r.read_u16()? as usize;
        let value = r.read_bytes(len)?;
        match id {
            1 => success = value.first() == Some(&AUTH_OK),
            2 if len == 4 => {
                ack_threshold = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
            }
            _ => {}
        }
    }
    Ok(Packet::AuthAck {
        success,
        ack_threshold,
    })
}
