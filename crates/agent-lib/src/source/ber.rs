//! Minimal BER codec for SNMPv2c messages
//!
//! Covers what a GET exchange needs: the message envelope, GetRequest and
//! Response PDUs, and the value types IF-MIB counters come back as.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

pub const PDU_GET_REQUEST: u8 = 0xA0;
pub const PDU_RESPONSE: u8 = 0xA2;

/// Version field value for SNMPv2c
pub const VERSION_2C: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BerError {
    #[error("message truncated")]
    Truncated,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported value type {0:#04x}")]
    UnsupportedType(u8),

    #[error("unsupported length encoding")]
    BadLength,

    #[error("integer out of range")]
    IntegerOverflow,

    #[error("invalid object identifier")]
    InvalidOid,

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Object identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// The mib-2 subtree, 1.3.6.1.2.1
    pub fn mib2() -> Oid {
        Oid(vec![1, 3, 6, 1, 2, 1])
    }

    /// This OID with `arcs` appended
    pub fn extend(&self, arcs: &[u32]) -> Oid {
        let mut all = self.0.clone();
        all.extend_from_slice(arcs);
        Oid(all)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// This OID with one more arc appended
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Oid(arcs)
    }

    fn from_arcs(arcs: Vec<u32>) -> Result<Self, BerError> {
        match arcs.as_slice() {
            [first, second, ..] if *first <= 2 && (*first == 2 || *second < 40) => Ok(Oid(arcs)),
            _ => Err(BerError::InvalidOid),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let mut content = Vec::with_capacity(self.0.len() + 4);
        push_base128(&mut content, self.0[0].saturating_mul(40).saturating_add(self.0[1]));
        for arc in &self.0[2..] {
            push_base128(&mut content, *arc);
        }
        write_tlv(out, TAG_OID, &content);
    }

    fn decode(content: &[u8]) -> Result<Self, BerError> {
        if content.is_empty() || content[content.len() - 1] & 0x80 != 0 {
            return Err(BerError::InvalidOid);
        }

        let mut subids = Vec::new();
        let mut acc: u32 = 0;
        for byte in content {
            if acc > (u32::MAX >> 7) {
                return Err(BerError::InvalidOid);
            }
            acc = (acc << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                subids.push(acc);
                acc = 0;
            }
        }

        let first = subids[0];
        let (a, b) = match first {
            0..=39 => (0, first),
            40..=79 => (1, first - 40),
            _ => (2, first - 80),
        };
        let mut arcs = Vec::with_capacity(subids.len() + 1);
        arcs.push(a);
        arcs.push(b);
        arcs.extend_from_slice(&subids[1..]);
        Ok(Oid(arcs))
    }
}

impl FromStr for Oid {
    type Err = BerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .trim_start_matches('.')
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| BerError::InvalidOid))
            .collect::<Result<Vec<_>, _>>()?;
        Oid::from_arcs(arcs)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
        }
        Ok(())
    }
}

/// A varbind value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Non-negative numeric value of any integer-like type
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            SnmpValue::Integer(v) => u64::try_from(v).ok(),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Some(u64::from(v))
            }
            SnmpValue::Counter64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            SnmpValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    /// True for the v2c exception values returned in place of missing objects
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            SnmpValue::Integer(v) => write_tlv(out, TAG_INTEGER, &signed_bytes(*v)),
            SnmpValue::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
            SnmpValue::Null => write_tlv(out, TAG_NULL, &[]),
            SnmpValue::ObjectId(oid) => oid.encode(out),
            SnmpValue::IpAddress(addr) => write_tlv(out, TAG_IP_ADDRESS, addr),
            SnmpValue::Counter32(v) => {
                write_tlv(out, TAG_COUNTER32, &unsigned_bytes(u64::from(*v)))
            }
            SnmpValue::Gauge32(v) => {
                write_tlv(out, TAG_GAUGE32, &unsigned_bytes(u64::from(*v)))
            }
            SnmpValue::TimeTicks(v) => {
                write_tlv(out, TAG_TIMETICKS, &unsigned_bytes(u64::from(*v)))
            }
            SnmpValue::Counter64(v) => write_tlv(out, TAG_COUNTER64, &unsigned_bytes(*v)),
            SnmpValue::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
            SnmpValue::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
            SnmpValue::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
        }
    }

    fn decode(tag: u8, content: &[u8]) -> Result<Self, BerError> {
        Ok(match tag {
            TAG_INTEGER => SnmpValue::Integer(decode_signed(content)?),
            TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
            TAG_NULL => SnmpValue::Null,
            TAG_OID => SnmpValue::ObjectId(Oid::decode(content)?),
            TAG_IP_ADDRESS => SnmpValue::IpAddress(
                content.try_into().map_err(|_| BerError::BadLength)?,
            ),
            TAG_COUNTER32 => SnmpValue::Counter32(decode_u32(content)?),
            TAG_GAUGE32 => SnmpValue::Gauge32(decode_u32(content)?),
            TAG_TIMETICKS => SnmpValue::TimeTicks(decode_u32(content)?),
            TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
            TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
            other => return Err(BerError::UnsupportedType(other)),
        })
    }
}

/// Protocol data unit of a v2c message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub tag: u8,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(Oid, SnmpValue)>,
}

/// A complete v2c message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    /// GetRequest for `oids` with NULL placeholder values
    pub fn get_request(community: &str, request_id: i32, oids: &[Oid]) -> Self {
        Self {
            version: VERSION_2C,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                tag: PDU_GET_REQUEST,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: oids.iter().map(|oid| (oid.clone(), SnmpValue::Null)).collect(),
            },
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut varbinds = Vec::new();
        for (oid, value) in &self.pdu.varbinds {
            let mut vb = Vec::new();
            oid.encode(&mut vb);
            value.encode(&mut vb);
            write_tlv(&mut varbinds, TAG_SEQUENCE, &vb);
        }

        let mut pdu = Vec::new();
        write_tlv(&mut pdu, TAG_INTEGER, &signed_bytes(i64::from(self.pdu.request_id)));
        write_tlv(&mut pdu, TAG_INTEGER, &signed_bytes(self.pdu.error_status));
        write_tlv(&mut pdu, TAG_INTEGER, &signed_bytes(self.pdu.error_index));
        write_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

        let mut body = Vec::new();
        write_tlv(&mut body, TAG_INTEGER, &signed_bytes(self.version));
        write_tlv(&mut body, TAG_OCTET_STRING, &self.community);
        write_tlv(&mut body, self.pdu.tag, &pdu);

        let mut out = Vec::with_capacity(body.len() + 4);
        write_tlv(&mut out, TAG_SEQUENCE, &body);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, BerError> {
        let mut outer = Reader::new(buf);
        let mut body = Reader::new(outer.expect(TAG_SEQUENCE)?);
        if !outer.is_empty() {
            return Err(BerError::TrailingBytes(outer.remaining()));
        }

        let version = decode_signed(body.expect(TAG_INTEGER)?)?;
        let community = body.expect(TAG_OCTET_STRING)?.to_vec();

        let (tag, pdu_content) = body.read_tlv()?;
        if tag & 0xE0 != 0xA0 {
            return Err(BerError::UnexpectedTag {
                expected: PDU_RESPONSE,
                found: tag,
            });
        }

        let mut pdu = Reader::new(pdu_content);
        let request_id = i32::try_from(decode_signed(pdu.expect(TAG_INTEGER)?)?)
            .map_err(|_| BerError::IntegerOverflow)?;
        let error_status = decode_signed(pdu.expect(TAG_INTEGER)?)?;
        let error_index = decode_signed(pdu.expect(TAG_INTEGER)?)?;

        let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut vb = Reader::new(list.expect(TAG_SEQUENCE)?);
            let oid = Oid::decode(vb.expect(TAG_OID)?)?;
            let (value_tag, value) = vb.read_tlv()?;
            varbinds.push((oid, SnmpValue::decode(value_tag, value)?));
        }

        Ok(Self {
            version,
            community,
            pdu: Pdu {
                tag,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), BerError> {
        let (&tag, rest) = self.buf.split_first().ok_or(BerError::Truncated)?;
        let (&first, mut rest) = rest.split_first().ok_or(BerError::Truncated)?;

        let len = if first < 0x80 {
            usize::from(first)
        } else {
            let n = usize::from(first & 0x7f);
            if n == 0 || n > 4 {
                return Err(BerError::BadLength);
            }
            if rest.len() < n {
                return Err(BerError::Truncated);
            }
            let len = rest[..n]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            rest = &rest[n..];
            len
        };

        if rest.len() < len {
            return Err(BerError::Truncated);
        }
        let (content, remaining) = rest.split_at(len);
        self.buf = remaining;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], BerError> {
        let (found, content) = self.read_tlv()?;
        if found != expected {
            return Err(BerError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
}

fn push_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut tmp = [0u8; 5];
    let mut start = tmp.len();
    loop {
        start -= 1;
        tmp[start] = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = tmp.len() - 1;
    for byte in &mut tmp[start..last] {
        *byte |= 0x80;
    }
    out.extend_from_slice(&tmp[start..]);
}

/// Minimal two's complement encoding
fn signed_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Unsigned encoding with a leading zero when the high bit is set
fn unsigned_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(bytes.len() - 1);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn decode_signed(content: &[u8]) -> Result<i64, BerError> {
    if content.is_empty() {
        return Err(BerError::Truncated);
    }
    if content.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let init: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(content
        .iter()
        .fold(init, |acc, b| (acc << 8) | i64::from(*b)))
}

fn decode_u32(content: &[u8]) -> Result<u32, BerError> {
    u32::try_from(decode_unsigned(content)?).map_err(|_| BerError::IntegerOverflow)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, BerError> {
    if content.is_empty() {
        return Err(BerError::Truncated);
    }
    let skip = content.iter().take_while(|b| **b == 0).count();
    let significant = &content[skip..];
    if significant.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    Ok(significant
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
