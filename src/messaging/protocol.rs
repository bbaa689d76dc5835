//! NATS text protocol framing.
//!
//! # Responsibilities
//! - Decode server operations from a byte stream (`INFO`, `MSG`, `PING`,
//!   `PONG`, `+OK`, `-ERR`)
//! - Encode client operations (`CONNECT`, `SUB`, `UNSUB`, `PUB`, `PING`,
//!   `PONG`)
//!
//! # Design Decisions
//! - Decoding is incremental: a WebSocket frame may hold several operations
//!   or only part of one
//! - Headers are never negotiated, so `HMSG` is rejected as a protocol error

use serde::Serialize;

use crate::messaging::types::{BrokerError, Message, ServerInfo};

/// Longest control line accepted before giving up on finding `\r\n`.
pub const MAX_CONTROL_LINE: usize = 4096;

/// Payload limit used until the server announces its own in `INFO`.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// An operation sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOp {
    Info(ServerInfo),
    Msg(Message),
    Ping,
    Pong,
    Ok,
    Err(String),
}

/// An operation sent by the client.
#[derive(Debug, Clone, Copy)]
pub enum ClientOp<'a> {
    Connect(&'a ConnectOptions),
    Sub {
        subject: &'a str,
        queue_group: Option<&'a str>,
        sid: u64,
    },
    Unsub {
        sid: u64,
    },
    Pub {
        subject: &'a str,
        reply_to: Option<&'a str>,
        payload: &'a [u8],
    },
    Ping,
    Pong,
}

/// Payload of `CONNECT`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectOptions {
    pub verbose: bool,
    pub pedantic: bool,
    pub lang: &'static str,
    pub version: &'static str,
    pub protocol: u8,
    pub name: String,
    pub headers: bool,
}

impl ConnectOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            verbose: false,
            pedantic: false,
            lang: "rust",
            version: env!("CARGO_PKG_VERSION"),
            protocol: 1,
            name: name.into(),
            headers: false,
        }
    }
}

impl ClientOp<'_> {
    /// Encode the operation as wire bytes, including the trailing `\r\n`.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientOp::Connect(options) => {
                // Serializing a struct of plain fields cannot fail.
                let json = serde_json::to_string(options).unwrap_or_else(|_| "{}".to_string());
                format!("CONNECT {}\r\n", json).into_bytes()
            }
            ClientOp::Sub {
                subject,
                queue_group: Some(group),
                sid,
            } => format!("SUB {} {} {}\r\n", subject, group, sid).into_bytes(),
            ClientOp::Sub {
                subject,
                queue_group: None,
                sid,
            } => format!("SUB {} {}\r\n", subject, sid).into_bytes(),
            ClientOp::Unsub { sid } => format!("UNSUB {}\r\n", sid).into_bytes(),
            ClientOp::Pub {
                subject,
                reply_to,
                payload,
            } => {
                let mut out = match reply_to {
                    Some(reply) => format!("PUB {} {} {}\r\n", subject, reply, payload.len()),
                    None => format!("PUB {} {}\r\n", subject, payload.len()),
                }
                .into_bytes();
                out.extend_from_slice(payload);
                out.extend_from_slice(CRLF);
                out
            }
            ClientOp::Ping => b"PING\r\n".to_vec(),
            ClientOp::Pong => b"PONG\r\n".to_vec(),
        }
    }
}

/// Incremental decoder for server operations.
#[derive(Debug)]
pub struct Decoder {
    buf: Vec<u8>,
    max_payload: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest `MSG` payload accepted. Larger announced sizes are a protocol
    /// error, which also bounds how much is buffered for one message.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Append bytes received from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete operation, if the buffer holds one.
    pub fn next_op(&mut self) -> Result<Option<ServerOp>, BrokerError> {
        let Some(line_end) = find_crlf(&self.buf) else {
            if self.buf.len() > MAX_CONTROL_LINE {
                return Err(BrokerError::Protocol("control line too long".to_string()));
            }
            return Ok(None);
        };

        let line = std::str::from_utf8(&self.buf[..line_end])
            .map_err(|_| BrokerError::Protocol("control line is not UTF-8".to_string()))?
            .to_string();
        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (line.as_str(), ""),
        };
        let body_start = line_end + CRLF.len();

        let op = match verb.to_ascii_uppercase().as_str() {
            "MSG" => {
                let (subject, sid, reply_to, len) = parse_msg_args(args)?;
                if len > self.max_payload {
                    return Err(BrokerError::Protocol(format!(
                        "payload of {} bytes exceeds limit of {}",
                        len, self.max_payload
                    )));
                }
                let (body_end, frame_end) = body_start
                    .checked_add(len)
                    .and_then(|end| Some((end, end.checked_add(CRLF.len())?)))
                    .ok_or_else(|| BrokerError::Protocol(format!("bad MSG size {}", len)))?;
                if self.buf.len() < frame_end {
                    return Ok(None);
                }
                if &self.buf[body_end..frame_end] != CRLF {
                    return Err(BrokerError::Protocol(format!(
                        "payload of {} bytes not terminated by CRLF",
                        len
                    )));
                }
                let payload = self.buf[body_start..body_end].to_vec();
                self.buf.drain(..frame_end);
                return Ok(Some(ServerOp::Msg(Message {
                    subject,
                    sid,
                    reply_to,
                    payload,
                })));
            }
            "INFO" => {
                let info: ServerInfo = serde_json::from_str(args)
                    .map_err(|e| BrokerError::Protocol(format!("bad INFO payload: {}", e)))?;
                ServerOp::Info(info)
            }
            "PING" => ServerOp::Ping,
            "PONG" => ServerOp::Pong,
            "+OK" => ServerOp::Ok,
            "-ERR" => ServerOp::Err(args.trim_matches('\'').to_string()),
            other => {
                return Err(BrokerError::Protocol(format!("unknown operation '{}'", other)));
            }
        };

        self.buf.drain(..body_start);
        Ok(Some(op))
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// `MSG <subject> <sid> [reply-to] <#bytes>`
fn parse_msg_args(args: &str) -> Result<(String, u64, Option<String>, usize), BrokerError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let (subject, sid, reply_to, len) = match parts.as_slice() {
        [subject, sid, len] => (*subject, *sid, None, *len),
        [subject, sid, reply, len] => (*subject, *sid, Some(*reply), *len),
        _ => return Err(BrokerError::Protocol(format!("bad MSG arguments '{}'", args))),
    };

    let sid = sid
        .parse()
        .map_err(|_| BrokerError::Protocol(format!("bad MSG sid '{}'", sid)))?;
    let len = len
        .parse()
        .map_err(|_| BrokerError::Protocol(format!("bad MSG size '{}'", len)))?;

    Ok((subject.to_string(), sid, reply_to.map(String::from), len))
}
