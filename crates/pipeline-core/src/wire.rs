//! Control-channel wire format: the subset of OpenFlow 1.3 the pipeline speaks.
//!
//! Every control message starts with the 8-byte OpenFlow header. Script
//! uploads travel as Big Switch Networks experimenter messages
//! (`bsn_lua_upload`): experimenter header, a flags word, a 64-byte
//! NUL-terminated filename, then raw script bytes up to the end of the frame.
//!
//! All on-wire structs are `#[repr(C)]` over big-endian zerocopy integers, so
//! layout is fixed and there is no unsafe code in this module.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Headers ───────────────────────────────────────────────────────────────────

/// OpenFlow common header. `length` covers the whole frame, header included.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct OfHeader {
    pub version: u8,
    pub msg_type: u8,
    pub length: U16<BigEndian>,
    pub xid: U32<BigEndian>,
}

assert_eq_size!(OfHeader, [u8; 8]);

/// Follows `OfHeader` on every `OFPT_EXPERIMENTER` message.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ExperimenterHeader {
    pub experimenter: U32<BigEndian>,
    pub subtype: U32<BigEndian>,
}

assert_eq_size!(ExperimenterHeader, [u8; 8]);

/// Fixed part of a `bsn_lua_upload` body. Script bytes follow.
///
/// Wire size: 66 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct LuaUploadHeader {
    /// Bit 0: more fragments follow (`LUA_UPLOAD_MORE`).
    pub flags: U16<BigEndian>,
    /// NUL-terminated fragment name. Byte 63 is always forced to NUL on receipt.
    pub filename: [u8; FILENAME_LEN],
}

assert_eq_size!(LuaUploadHeader, [u8; 66]);

/// Body of an `OFPT_ERROR` message. Up to 64 bytes of the offending request follow.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ErrorHeader {
    pub err_type: U16<BigEndian>,
    pub code: U16<BigEndian>,
}

assert_eq_size!(ErrorHeader, [u8; 4]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// OpenFlow 1.3.
pub const OFP_VERSION: u8 = 0x04;

pub const OFPT_ERROR: u8 = 1;
pub const OFPT_ECHO_REQUEST: u8 = 2;
pub const OFPT_ECHO_REPLY: u8 = 3;
pub const OFPT_EXPERIMENTER: u8 = 4;
pub const OFPT_BARRIER_REQUEST: u8 = 20;
pub const OFPT_BARRIER_REPLY: u8 = 21;

/// Big Switch Networks experimenter id.
pub const BSN_EXPERIMENTER: u32 = 0x005c_16c7;
pub const BSN_LUA_UPLOAD: u32 = 64;

/// `bsn_lua_upload` flag: more fragments follow, do not install yet.
pub const LUA_UPLOAD_MORE: u16 = 0x1;

/// Size of the on-wire filename field, terminator included.
pub const FILENAME_LEN: usize = 64;

pub const OFPET_BAD_REQUEST: u16 = 1;
pub const OFPBRC_BAD_TYPE: u16 = 1;
pub const OFPBRC_BAD_EXPERIMENTER: u16 = 3;
pub const OFPBRC_EPERM: u16 = 5;
pub const OFPBRC_BAD_LEN: u16 = 6;

pub const HEADER_LEN: usize = 8;
/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME: usize = u16::MAX as usize;
/// Bytes in front of the script data in a `bsn_lua_upload`.
pub const LUA_UPLOAD_OVERHEAD: usize = HEADER_LEN + 8 + 66;
/// Largest script fragment a single upload message can carry.
pub const MAX_UPLOAD_DATA: usize = MAX_FRAME - LUA_UPLOAD_OVERHEAD;
/// How much of an offending request an error reply echoes back.
pub const ERROR_DATA_LEN: usize = 64;

// ── Decoded messages ──────────────────────────────────────────────────────────

/// One script fragment as carried by `bsn_lua_upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaUpload {
    pub flags: u16,
    pub filename: String,
    pub data: Bytes,
}

impl LuaUpload {
    /// True when further fragments follow and installation must wait.
    pub fn has_more(&self) -> bool {
        self.flags & LUA_UPLOAD_MORE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Error { err_type: u16, code: u16, data: Bytes },
    EchoRequest(Bytes),
    EchoReply(Bytes),
    BarrierRequest,
    BarrierReply,
    LuaUpload(LuaUpload),
    /// Experimenter message we do not understand.
    Experimenter { experimenter: u32, subtype: u32 },
    /// Any other OpenFlow message type.
    Unknown(u8),
}

/// A decoded control message. `raw` keeps the full frame so replies can
/// reference the original request.
#[derive(Debug, Clone)]
pub struct Message {
    pub xid: u32,
    pub msg_type: u8,
    pub body: MessageBody,
    pub raw: Bytes,
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Total frame length announced by a header, or `None` if `prefix` is too short.
pub fn frame_len(prefix: &[u8]) -> Option<usize> {
    OfHeader::read_from_prefix(prefix).map(|h| h.length.get() as usize)
}

/// Decode one complete frame.
pub fn decode(frame: Bytes) -> Result<Message, WireError> {
    let header = OfHeader::read_from_prefix(&frame[..]).ok_or(WireError::Truncated {
        need: HEADER_LEN,
        have: frame.len(),
    })?;
    if header.version != OFP_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    let length = header.length.get() as usize;
    if length != frame.len() {
        return Err(WireError::LengthMismatch {
            header: length,
            frame: frame.len(),
        });
    }

    let body = frame.slice(HEADER_LEN..);
    let parsed = match header.msg_type {
        OFPT_ERROR => {
            let eh = ErrorHeader::read_from_prefix(&body[..]).ok_or(WireError::Truncated {
                need: HEADER_LEN + 4,
                have: frame.len(),
            })?;
            MessageBody::Error {
                err_type: eh.err_type.get(),
                code: eh.code.get(),
                data: body.slice(4..),
            }
        }
        OFPT_ECHO_REQUEST => MessageBody::EchoRequest(body),
        OFPT_ECHO_REPLY => MessageBody::EchoReply(body),
        OFPT_BARRIER_REQUEST => MessageBody::BarrierRequest,
        OFPT_BARRIER_REPLY => MessageBody::BarrierReply,
        OFPT_EXPERIMENTER => decode_experimenter(&body, frame.len())?,
        other => MessageBody::Unknown(other),
    };

    Ok(Message {
        xid: header.xid.get(),
        msg_type: header.msg_type,
        body: parsed,
        raw: frame,
    })
}

fn decode_experimenter(body: &Bytes, frame_len: usize) -> Result<MessageBody, WireError> {
    let eh = ExperimenterHeader::read_from_prefix(&body[..]).ok_or(WireError::Truncated {
        need: HEADER_LEN + 8,
        have: frame_len,
    })?;
    let experimenter = eh.experimenter.get();
    let subtype = eh.subtype.get();
    if experimenter != BSN_EXPERIMENTER || subtype != BSN_LUA_UPLOAD {
        return Ok(MessageBody::Experimenter {
            experimenter,
            subtype,
        });
    }

    let rest = body.slice(8..);
    let uh = LuaUploadHeader::read_from_prefix(&rest[..]).ok_or(WireError::Truncated {
        need: LUA_UPLOAD_OVERHEAD,
        have: frame_len,
    })?;
    Ok(MessageBody::LuaUpload(LuaUpload {
        flags: uh.flags.get(),
        filename: decode_filename(&uh.filename),
        data: rest.slice(66..),
    }))
}

/// Force NUL termination at the last byte, then cut at the first NUL.
pub fn decode_filename(raw: &[u8; FILENAME_LEN]) -> String {
    let mut name = *raw;
    name[FILENAME_LEN - 1] = 0;
    let end = name.iter().position(|&b| b == 0).unwrap_or(FILENAME_LEN - 1);
    String::from_utf8_lossy(&name[..end]).into_owned()
}

/// Copy a name into the fixed field, truncating to 63 bytes.
pub fn encode_filename(name: &str) -> [u8; FILENAME_LEN] {
    let mut out = [0u8; FILENAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(FILENAME_LEN - 1);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn header(msg_type: u8, length: usize, xid: u32) -> OfHeader {
    OfHeader {
        version: OFP_VERSION,
        msg_type,
        length: U16::new(length as u16),
        xid: U32::new(xid),
    }
}

fn simple(msg_type: u8, xid: u32, data: &[u8]) -> Result<Bytes, WireError> {
    let length = HEADER_LEN + data.len();
    if length > MAX_FRAME {
        return Err(WireError::PayloadTooLarge(data.len()));
    }
    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(header(msg_type, length, xid).as_bytes());
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// Build a `bsn_lua_upload` frame.
pub fn encode_lua_upload(
    xid: u32,
    flags: u16,
    filename: &str,
    data: &[u8],
) -> Result<Bytes, WireError> {
    if data.len() > MAX_UPLOAD_DATA {
        return Err(WireError::PayloadTooLarge(data.len()));
    }
    let length = LUA_UPLOAD_OVERHEAD + data.len();
    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(header(OFPT_EXPERIMENTER, length, xid).as_bytes());
    buf.put_slice(
        ExperimenterHeader {
            experimenter: U32::new(BSN_EXPERIMENTER),
            subtype: U32::new(BSN_LUA_UPLOAD),
        }
        .as_bytes(),
    );
    buf.put_slice(
        LuaUploadHeader {
            flags: U16::new(flags),
            filename: encode_filename(filename),
        }
        .as_bytes(),
    );
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// Build an `OFPT_ERROR` reply to `request`, echoing its first 64 bytes.
pub fn encode_error(request: &Message, err_type: u16, code: u16) -> Bytes {
    error_reply(request.xid, &request.raw, err_type, code)
}

/// Build an `OFPT_ERROR` reply to a frame that did not decode. The xid is
/// taken from the header when there is one, zero otherwise.
pub fn encode_error_for_frame(frame: &[u8], err_type: u16, code: u16) -> Bytes {
    let xid = OfHeader::read_from_prefix(frame).map_or(0, |h| h.xid.get());
    error_reply(xid, frame, err_type, code)
}

fn error_reply(xid: u32, request: &[u8], err_type: u16, code: u16) -> Bytes {
    let echoed = &request[..request.len().min(ERROR_DATA_LEN)];
    let length = HEADER_LEN + 4 + echoed.len();
    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(header(OFPT_ERROR, length, xid).as_bytes());
    buf.put_slice(
        ErrorHeader {
            err_type: U16::new(err_type),
            code: U16::new(code),
        }
        .as_bytes(),
    );
    buf.put_slice(echoed);
    buf.freeze()
}

pub fn encode_echo_request(xid: u32, data: &[u8]) -> Result<Bytes, WireError> {
    simple(OFPT_ECHO_REQUEST, xid, data)
}

pub fn encode_echo_reply(xid: u32, data: &[u8]) -> Result<Bytes, WireError> {
    simple(OFPT_ECHO_REPLY, xid, data)
}

pub fn encode_barrier_request(xid: u32) -> Bytes {
    // An empty body always fits.
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_slice(header(OFPT_BARRIER_REQUEST, HEADER_LEN, xid).as_bytes());
    buf.freeze()
}

pub fn encode_barrier_reply(xid: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_slice(header(OFPT_BARRIER_REPLY, HEADER_LEN, xid).as_bytes());
    buf.freeze()
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated message: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown OpenFlow version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("header length {header} does not match frame length {frame}")]
    LengthMismatch { header: usize, frame: usize },

    #[error("payload length {0} does not fit in one message")]
    PayloadTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
