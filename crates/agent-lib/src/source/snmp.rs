//! SNMPv2c counter source
//!
//! Reads one row of the IF-MIB interface table with a single GetRequest.
//! With 64-bit counters configured, octets come from the ifXTable
//! high-capacity columns and speed falls back to ifHighSpeed when ifSpeed
//! is saturated.

use super::ber::{Message, Oid, SnmpValue, PDU_RESPONSE};
use super::CounterSource;
use crate::config::MonitorConfig;
use crate::error::SourceError;
use crate::models::{IfIndex, IfStatus, RawCounters};
use crate::rate::CounterWidth;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// ifTable.ifEntry under mib-2
const IF_ENTRY: [u32; 3] = [2, 2, 1];
/// ifXTable.ifXEntry under mib-2
const IF_X_ENTRY: [u32; 4] = [31, 1, 1, 1];

const IF_DESCR: u32 = 2;
const IF_SPEED: u32 = 5;
const IF_ADMIN_STATUS: u32 = 7;
const IF_OPER_STATUS: u32 = 8;
const IF_IN_OCTETS: u32 = 10;
const IF_IN_ERRORS: u32 = 14;
const IF_OUT_OCTETS: u32 = 16;
const IF_OUT_ERRORS: u32 = 20;
const IF_HC_IN_OCTETS: u32 = 6;
const IF_HC_OUT_OCTETS: u32 = 10;
const IF_HIGH_SPEED: u32 = 15;

// Varbind positions in the request
const DESCR: usize = 0;
const SPEED: usize = 1;
const ADMIN: usize = 2;
const OPER: usize = 3;
const IN_OCTETS: usize = 4;
const IN_ERRORS: usize = 5;
const OUT_OCTETS: usize = 6;
const OUT_ERRORS: usize = 7;
const HIGH_SPEED: usize = 8;

const MAX_DATAGRAM: usize = 65_535;

/// Connection settings of the polled device
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpTarget {
    /// `host:port`
    pub address: String,
    pub community: String,
    /// Wait per attempt
    pub timeout: Duration,
    /// Additional attempts after the first
    pub retries: u32,
    pub width: CounterWidth,
}

impl SnmpTarget {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            address: config.target(),
            community: config.community.clone(),
            timeout: config.snmp_timeout,
            retries: config.snmp_retries,
            width: config.counter_width(),
        }
    }
}

#[derive(Debug)]
pub struct SnmpSource {
    target: SnmpTarget,
    next_request_id: AtomicI32,
}

impl SnmpSource {
    pub fn new(target: SnmpTarget) -> Self {
        Self {
            target,
            next_request_id: AtomicI32::new(1),
        }
    }

    pub fn target(&self) -> &SnmpTarget {
        &self.target
    }

    fn request_id(&self) -> i32 {
        // Stay positive; some agents mishandle negative request ids
        self.next_request_id.fetch_add(1, Ordering::Relaxed) & i32::MAX
    }

    fn request_oids(&self, if_index: IfIndex) -> Vec<Oid> {
        let entry = Oid::mib2().extend(&IF_ENTRY);
        let column = |c: u32| entry.extend(&[c, if_index]);
        let mut oids = vec![
            column(IF_DESCR),
            column(IF_SPEED),
            column(IF_ADMIN_STATUS),
            column(IF_OPER_STATUS),
            column(IF_IN_OCTETS),
            column(IF_IN_ERRORS),
            column(IF_OUT_OCTETS),
            column(IF_OUT_ERRORS),
        ];

        if self.target.width == CounterWidth::Bits64 {
            let x_entry = Oid::mib2().extend(&IF_X_ENTRY);
            let x_column = |c: u32| x_entry.extend(&[c, if_index]);
            oids[IN_OCTETS] = x_column(IF_HC_IN_OCTETS);
            oids[OUT_OCTETS] = x_column(IF_HC_OUT_OCTETS);
            oids.push(x_column(IF_HIGH_SPEED));
        }
        oids
    }

    fn unreachable(&self, reason: impl ToString) -> SourceError {
        SourceError::Unreachable {
            target: self.target.address.clone(),
            reason: reason.to_string(),
        }
    }

    /// Send the request until a matching response arrives or attempts run out
    async fn exchange(&self, if_index: IfIndex, oids: &[Oid]) -> Result<Message, SourceError> {
        let addr = lookup_host(self.target.address.as_str())
            .await
            .map_err(|e| self.unreachable(e))?
            .next()
            .ok_or_else(|| self.unreachable("address resolved to nothing"))?;

        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).await.map_err(|e| self.unreachable(e))?;
        socket.connect(addr).await.map_err(|e| self.unreachable(e))?;

        let request_id = self.request_id();
        let request = Message::get_request(&self.target.community, request_id, oids).encode();
        let attempts = self.target.retries.saturating_add(1);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut undecodable = None;

        for attempt in 1..=attempts {
            socket.send(&request).await.map_err(|e| self.unreachable(e))?;
            let deadline = Instant::now() + self.target.timeout;

            loop {
                let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                    Err(_) => {
                        debug!(
                            device = %self.target.address,
                            if_index,
                            attempt,
                            "SNMP request timed out"
                        );
                        break;
                    }
                    Ok(result) => result.map_err(|e| self.unreachable(e))?,
                };

                let message = match Message::decode(&buf[..len]) {
                    Ok(message) => message,
                    Err(e) => {
                        // Stray or corrupt datagram; a valid answer may still follow
                        debug!(
                            device = %self.target.address,
                            error = %e,
                            "Ignoring undecodable datagram"
                        );
                        undecodable = Some(e.to_string());
                        continue;
                    }
                };
                if message.pdu.request_id != request_id {
                    // Late answer to an earlier request
                    debug!(
                        expected = request_id,
                        received = message.pdu.request_id,
                        "Ignoring SNMP response with foreign request id"
                    );
                    continue;
                }
                return Ok(message);
            }
        }

        match undecodable {
            Some(reason) => Err(SourceError::malformed(if_index, reason)),
            None => Err(SourceError::Timeout {
                target: self.target.address.clone(),
                attempts,
            }),
        }
    }

    fn parse(
        &self,
        if_index: IfIndex,
        oids: &[Oid],
        response: Message,
    ) -> Result<RawCounters, SourceError> {
        let malformed = |reason: String| SourceError::malformed(if_index, reason);
        let pdu = response.pdu;

        if pdu.tag != PDU_RESPONSE {
            return Err(malformed(format!("unexpected PDU type {:#04x}", pdu.tag)));
        }
        if pdu.error_status != 0 {
            return Err(malformed(format!(
                "agent returned error-status {} at index {}",
                pdu.error_status, pdu.error_index
            )));
        }
        if pdu.varbinds.len() != oids.len() {
            return Err(malformed(format!(
                "expected {} varbinds, got {}",
                oids.len(),
                pdu.varbinds.len()
            )));
        }

        let mut values = Vec::with_capacity(oids.len());
        for (requested, (oid, value)) in oids.iter().zip(pdu.varbinds) {
            if *requested != oid {
                return Err(malformed(format!("expected {}, got {}", requested, oid)));
            }
            if value.is_exception() {
                return Err(malformed(format!("{} not available: {:?}", oid, value)));
            }
            values.push(value);
        }

        let if_name = match &values[DESCR] {
            SnmpValue::OctetString(bytes) => String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .to_string(),
            other => return Err(malformed(format!("ifDescr has type {:?}", other))),
        };
        let status = |pos: usize, column: &str| {
            values[pos]
                .as_i64()
                .and_then(IfStatus::from_code)
                .ok_or_else(|| {
                    malformed(format!("{} is not a valid status: {:?}", column, values[pos]))
                })
        };
        let counter = |pos: usize, column: &str| match values[pos] {
            SnmpValue::Counter32(v) => Ok(u64::from(v)),
            SnmpValue::Counter64(v) => Ok(self.target.width.reduce(u128::from(v))),
            ref other => Err(malformed(format!("{} is not a counter: {:?}", column, other))),
        };
        let gauge = |pos: usize, column: &str| match values[pos] {
            SnmpValue::Gauge32(v) => Ok(u64::from(v)),
            ref other => Err(malformed(format!("{} is not a gauge: {:?}", column, other))),
        };

        let mut if_speed_bps = gauge(SPEED, "ifSpeed")?;
        if values.len() > HIGH_SPEED && if_speed_bps == u64::from(u32::MAX) {
            if_speed_bps = gauge(HIGH_SPEED, "ifHighSpeed")?.saturating_mul(1_000_000);
        }

        Ok(RawCounters {
            if_index,
            if_name,
            admin_status: status(ADMIN, "ifAdminStatus")?,
            oper_status: status(OPER, "ifOperStatus")?,
            in_octets: counter(IN_OCTETS, "ifInOctets")?,
            out_octets: counter(OUT_OCTETS, "ifOutOctets")?,
            in_errors: counter(IN_ERRORS, "ifInErrors")?,
            out_errors: counter(OUT_ERRORS, "ifOutErrors")?,
            if_speed_bps,
        })
    }
}

#[async_trait]
impl CounterSource for SnmpSource {
    async fn snapshot(&self, if_index: IfIndex) -> Result<RawCounters, SourceError> {
        let oids = self.request_oids(if_index);
        let response = self.exchange(if_index, &oids).await?;
        self.parse(if_index, &oids, response)
    }

    fn kind(&self) -> &'static str {
        "snmp"
    }
}
