//! Network firmware-update listener.
//!
//! Implements [`UpdatePort`].  A sender connects to `ota_port` over TCP
//! and streams a one-line header followed by the raw image:
//!
//! ```text
//! → SMOTA <size> <password>\n
//! → <size bytes of application image>
//! ← OK\n                      image verified and set as boot partition
//! ← ERR <reason>\n            any failure; the connection is then closed
//! ```
//!
//! One session at a time.  Each [`service`](UpdatePort::service) call
//! moves at most [`BYTES_PER_SERVICE`] bytes, so the meter loop keeps
//! draining the optical head during a transfer.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

use heapless::{String, Vec};
use log::{debug, info, warn};

use crate::app::ports::{UpdatePort, UpdateStatus};
use crate::error::UpdateError;
use crate::ota::{OtaManager, OtaState};

/// First word of the session header.
pub const HEADER_MAGIC: &str = "SMOTA";
const HEADER_CAP: usize = 80;
const CHUNK: usize = 1024;
/// Upper bound on image bytes taken per loop iteration.
pub const BYTES_PER_SERVICE: usize = 4 * CHUNK;
/// A session that sends nothing for this long is dropped.
pub const IDLE_TIMEOUT_MS: u64 = 10_000;

// ───────────────────────────────────────────────────────────────
// Session protocol
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// Header not complete yet.
    AwaitingHeader,
    Receiving { written: u32, total: u32 },
    /// Image written and accepted; `OK` sent.
    Complete,
}

/// One sender connection, generic over the byte stream.
pub struct UpdateSession<S> {
    stream: S,
    header: Vec<u8, HEADER_CAP>,
    header_accepted: bool,
    last_activity_ms: u64,
}

impl<S: Read + Write> UpdateSession<S> {
    pub fn new(stream: S, now_ms: u64) -> Self {
        Self {
            stream,
            header: Vec::new(),
            header_accepted: false,
            last_activity_ms: now_ms,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Move whatever the sender has delivered into `ota`.
    pub fn pump(
        &mut self,
        ota: &mut OtaManager,
        password: &str,
        now_ms: u64,
    ) -> Result<SessionStep, UpdateError> {
        let mut buf = [0u8; CHUNK];
        let mut moved = 0;
        while moved < BYTES_PER_SERVICE {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Err(UpdateError::Disconnected),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("OTA: read failed: {}", e);
                    return Err(UpdateError::Io);
                }
            };
            moved += n;
            self.last_activity_ms = now_ms;

            let mut body = &buf[..n];
            if !self.header_accepted {
                let Some(consumed) = self.take_header(body)? else {
                    continue;
                };
                let size = parse_header(&self.header, password)?;
                ota.begin(size)?;
                self.header_accepted = true;
                body = &body[consumed..];
            }
            if !body.is_empty() {
                ota.write(body)?;
            }
            if let OtaState::Receiving {
                expected_size,
                bytes_written,
            } = ota.state()
            {
                if bytes_written == expected_size {
                    ota.finalize()?;
                    self.reply(format_args!("OK"));
                    return Ok(SessionStep::Complete);
                }
            }
        }

        if now_ms.saturating_sub(self.last_activity_ms) > IDLE_TIMEOUT_MS {
            return Err(UpdateError::Timeout);
        }
        Ok(match ota.state() {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } => SessionStep::Receiving {
                written: bytes_written,
                total: expected_size,
            },
            _ => SessionStep::AwaitingHeader,
        })
    }

    /// Tell the sender why the session ends.
    pub fn reject(&mut self, err: UpdateError) {
        self.reply(format_args!("ERR {err}"));
    }

    /// Buffer header bytes up to the newline.  Returns how many bytes of
    /// `data` the header consumed once the newline is seen.
    fn take_header(&mut self, data: &[u8]) -> Result<Option<usize>, UpdateError> {
        let end = data.iter().position(|b| *b == b'\n');
        let line = &data[..end.unwrap_or(data.len())];
        self.header
            .extend_from_slice(line)
            .map_err(|_| UpdateError::BadHeader)?;
        Ok(end.map(|i| i + 1))
    }

    fn reply(&mut self, msg: core::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.stream, "{msg}").and_then(|()| self.stream.flush()) {
            debug!("OTA: reply not delivered: {}", e);
        }
    }
}

/// `SMOTA <size> <password>` → declared image size.
fn parse_header(header: &[u8], password: &str) -> Result<u32, UpdateError> {
    let line = core::str::from_utf8(header).map_err(|_| UpdateError::BadHeader)?;
    let mut words = line.split_ascii_whitespace();
    if words.next() != Some(HEADER_MAGIC) {
        return Err(UpdateError::BadHeader);
    }
    let size = words
        .next()
        .and_then(|w| w.parse::<u32>().ok())
        .ok_or(UpdateError::BadHeader)?;
    let offered = words.next().ok_or(UpdateError::BadHeader)?;
    if words.next().is_some() {
        return Err(UpdateError::BadHeader);
    }
    if !secrets_match(offered.as_bytes(), password.as_bytes()) {
        return Err(UpdateError::AuthFailed);
    }
    Ok(size)
}

/// Length-checked comparison that inspects every byte.
fn secrets_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ───────────────────────────────────────────────────────────────
// TCP listener
// ───────────────────────────────────────────────────────────────

pub struct OtaServer {
    listener: Option<TcpListener>,
    password: String<32>,
    ota: OtaManager,
    session: Option<UpdateSession<TcpStream>>,
}

impl OtaServer {
    /// Listen on `port`.  An empty password leaves updates disabled.
    pub fn bind(port: u16, password: &str) -> Result<Self, UpdateError> {
        if password.is_empty() {
            info!("OTA: no password configured, updates disabled");
            return Ok(Self::disabled());
        }
        let mut secret = String::new();
        secret.push_str(password).map_err(|_| UpdateError::AuthFailed)?;

        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|e| {
            warn!("OTA: bind to port {} failed: {}", port, e);
            UpdateError::Io
        })?;
        listener.set_nonblocking(true).map_err(|_| UpdateError::Io)?;
        info!("OTA: listening on port {}", port);
        Ok(Self {
            listener: Some(listener),
            password: secret,
            ota: OtaManager::new(),
            session: None,
        })
    }

    pub fn disabled() -> Self {
        Self {
            listener: None,
            password: String::new(),
            ota: OtaManager::new(),
            session: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.listener.is_some()
    }

    /// Bound port, useful when binding to port 0.
    pub fn local_port(&self) -> Option<u16> {
        let addr = self.listener.as_ref()?.local_addr().ok()?;
        Some(addr.port())
    }

    pub fn manager(&self) -> &OtaManager {
        &self.ota
    }

    #[cfg(feature = "espidf")]
    pub fn reboot(&self) -> ! {
        self.ota.reboot()
    }

    fn accept(&mut self, now_ms: u64) {
        let Some(listener) = &self.listener else {
            return;
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("OTA: cannot configure session from {}: {}", peer, e);
                    return;
                }
                info!("OTA: session from {}", peer);
                self.session = Some(UpdateSession::new(stream, now_ms));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("OTA: accept failed: {}", e),
        }
    }
}

impl UpdatePort for OtaServer {
    fn service(&mut self, now_ms: u64) -> UpdateStatus {
        if self.ota.state() == OtaState::ReadyToReboot {
            return UpdateStatus::ReadyToReboot;
        }
        if self.session.is_none() {
            self.accept(now_ms);
        }
        let Some(session) = self.session.as_mut() else {
            return UpdateStatus::Idle;
        };
        match session.pump(&mut self.ota, &self.password, now_ms) {
            Ok(SessionStep::AwaitingHeader) => UpdateStatus::Idle,
            Ok(SessionStep::Receiving { written, total }) => {
                UpdateStatus::Receiving { written, total }
            }
            Ok(SessionStep::Complete) => {
                self.session = None;
                UpdateStatus::ReadyToReboot
            }
            Err(e) => {
                warn!("OTA: session failed: {}", e);
                session.reject(e);
                self.ota.abort();
                self.session = None;
                UpdateStatus::Idle
            }
        }
    }
}
