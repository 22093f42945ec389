//! The handshake-driven TLS record engine, `spec.md` §4.C component E.
//!
//! Unlike the teacher's `TlsChannel` (`tokio_rustls::server::TlsStream`
//! wrapped behind an async mutex, driven by the Tokio executor),
//! `TlsSession` is built directly on `rustls::{ClientConnection,
//! ServerConnection}` and driven by hand: the reactor thread pumps
//! ciphertext in and out via `pull_tls`/`push_tls` and re-polls
//! `direction()` after every I/O step, because there is no async
//! runtime underneath this reactor to await on.

use crate::credentials::{Credentials, CredentialsSlot};
use crate::verify::VerifyResult;
use eventdance_core::error::{codes, CoreError, ErrorCategory};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsMode {
    Client,
    Server,
}

/// What the handshake (or a post-handshake record read/write) wants
/// from the owning socket next. `spec.md` §4.C: "the owning socket
/// translates each hint into a readiness-mask update".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    NeedRead,
    NeedWrite,
    /// The handshake is blocked on `CredentialsSlot::on_ready`; the
    /// socket should disarm both bits until the session calls back.
    WaitingOnCredentials,
    None,
}

enum Inner {
    Client(Box<ClientConnection>),
    Server(Box<ServerConnection>),
}

/// One TLS session over one socket. `spec.md` §4.C: "a single
/// handshake per session" — `TlsSession` does not support renegotiation,
/// matching modern TLS 1.3 practice and the spec's own wording.
pub struct TlsSession {
    mode: TlsMode,
    credentials: CredentialsSlot,
    server_name: Option<ServerName<'static>>,
    require_peer_cert: bool,
    inner: Option<Inner>,
    handshake_complete: bool,
}

impl TlsSession {
    pub fn new_client(credentials: CredentialsSlot, server_name: ServerName<'static>) -> Self {
        Self {
            mode: TlsMode::Client,
            credentials,
            server_name: Some(server_name),
            require_peer_cert: false,
            inner: None,
            handshake_complete: false,
        }
    }

    pub fn new_server(credentials: CredentialsSlot) -> Self {
        Self {
            mode: TlsMode::Server,
            credentials,
            server_name: None,
            require_peer_cert: false,
            inner: None,
            handshake_complete: false,
        }
    }

    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    pub fn set_require_peer_cert(&mut self, require: bool) {
        self.require_peer_cert = require;
    }

    /// `spec.md` §4.C `starttls`: begins the handshake, returning the
    /// first direction hint. If credentials are not yet loaded,
    /// subscribes to `CredentialsSlot` and reports
    /// `Direction::WaitingOnCredentials` instead of failing.
    pub fn starttls(&mut self) -> Result<Direction, CoreError> {
        match self.credentials.get() {
            Some(credentials) => {
                self.build_connection(credentials)?;
                Ok(self.direction())
            }
            None => Ok(Direction::WaitingOnCredentials),
        }
    }

    /// Call from the `CredentialsSlot::on_ready` callback once
    /// credentials arrive after a `WaitingOnCredentials` result.
    pub fn resume_after_credentials(&mut self) -> Result<Direction, CoreError> {
        let credentials = self.credentials.get().ok_or_else(|| {
            CoreError::new(codes::TLS_CREDENTIALS_NOT_READY, "resumed without credentials present")
                .with_category(ErrorCategory::Programmer)
        })?;
        self.build_connection(credentials)?;
        Ok(self.direction())
    }

    fn build_connection(&mut self, credentials: Credentials) -> Result<(), CoreError> {
        self.inner = Some(match self.mode {
            TlsMode::Client => {
                // `Credentials` doubles as the trust anchor here: EventDance's
                // `set-credentials` is a single call installing "the chain
                // this session is willing to present *and* trust", matching
                // `evd_tls_session_set_credentials`'s one `credentials` object
                // for both roles. A deployment needing a separate CA bundle
                // layers it by constructing a second `CredentialsSlot` from
                // the CA file and feeding it into a distinct `RootCertStore`
                // builder step — out of scope for this engine.
                let mut roots = RootCertStore::empty();
                for cert in &credentials.cert_chain {
                    let _ = roots.add(cert.clone());
                }
                let config = ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                let name = self
                    .server_name
                    .clone()
                    .ok_or_else(|| CoreError::programmer(codes::TLS_HANDSHAKE_FAILED, "client session missing server name"))?;
                let conn = ClientConnection::new(Arc::new(config), name)
                    .map_err(|err| CoreError::new(codes::TLS_HANDSHAKE_FAILED, err.to_string()).with_category(ErrorCategory::Resource))?;
                Inner::Client(Box::new(conn))
            }
            TlsMode::Server => {
                let config = ServerConfig::builder()
                    .with_no_client_auth()
                    .with_single_cert(credentials.cert_chain.clone(), credentials.private_key.clone_key())
                    .map_err(|err| CoreError::new(codes::TLS_HANDSHAKE_FAILED, err.to_string()).with_category(ErrorCategory::Resource))?;
                let conn = ServerConnection::new(Arc::new(config))
                    .map_err(|err| CoreError::new(codes::TLS_HANDSHAKE_FAILED, err.to_string()).with_category(ErrorCategory::Resource))?;
                Inner::Server(Box::new(conn))
            }
        });
        Ok(())
    }

    /// What the session wants next: a read, a write, or (pre-handshake
    /// with no credentials yet) nothing until credentials arrive.
    pub fn direction(&self) -> Direction {
        let Some(inner) = &self.inner else {
            return Direction::WaitingOnCredentials;
        };
        let (wants_read, wants_write) = match inner {
            Inner::Client(conn) => (conn.wants_read(), conn.wants_write()),
            Inner::Server(conn) => (conn.wants_read(), conn.wants_write()),
        };
        if wants_write {
            Direction::NeedWrite
        } else if wants_read {
            Direction::NeedRead
        } else {
            Direction::None
        }
    }

    pub fn is_handshaking(&self) -> bool {
        match &self.inner {
            Some(Inner::Client(conn)) => conn.is_handshaking(),
            Some(Inner::Server(conn)) => conn.is_handshaking(),
            None => true,
        }
    }

    /// Pulls ciphertext from `source` into the session's TLS record
    /// buffer, then processes any newly-complete records (which may
    /// advance the handshake or surface plaintext for `read`).
    pub fn pull_tls(&mut self, source: &mut dyn Read) -> Result<usize, CoreError> {
        let inner = self.inner_mut()?;
        let read = match inner {
            Inner::Client(conn) => conn.read_tls(source),
            Inner::Server(conn) => conn.read_tls(source),
        }
        .map_err(|err| CoreError::from_io(codes::TLS_HANDSHAKE_FAILED, err))?;

        let state = match inner {
            Inner::Client(conn) => conn.process_new_packets(),
            Inner::Server(conn) => conn.process_new_packets(),
        };
        state.map_err(|err| CoreError::new(codes::TLS_HANDSHAKE_FAILED, err.to_string()).with_category(ErrorCategory::Resource))?;

        if !self.is_handshaking() {
            self.handshake_complete = true;
        }
        Ok(read)
    }

    /// Pushes any pending ciphertext (handshake flight or encrypted
    /// application data) out to `sink`.
    pub fn push_tls(&mut self, sink: &mut dyn Write) -> Result<usize, CoreError> {
        let inner = self.inner_mut()?;
        let written = match inner {
            Inner::Client(conn) => conn.write_tls(sink),
            Inner::Server(conn) => conn.write_tls(sink),
        }
        .map_err(|err| CoreError::from_io(codes::TLS_HANDSHAKE_FAILED, err))?;
        Ok(written)
    }

    /// Reads decrypted application data. Only meaningful once the
    /// handshake has completed; callers should consult `direction()`
    /// and keep pumping `pull_tls`/`push_tls` until it is.
    pub fn read_plaintext(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        let inner = self.inner_mut()?;
        let mut reader = match inner {
            Inner::Client(conn) => conn.reader(),
            Inner::Server(conn) => conn.reader(),
        };
        match reader.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(CoreError::from_io(codes::STREAM_IO, err)),
        }
    }

    /// Queues plaintext for encryption; actual bytes go out on the wire
    /// via a subsequent `push_tls`.
    pub fn write_plaintext(&mut self, buf: &[u8]) -> Result<usize, CoreError> {
        let inner = self.inner_mut()?;
        let mut writer = match inner {
            Inner::Client(conn) => conn.writer(),
            Inner::Server(conn) => conn.writer(),
        };
        writer.write(buf).map_err(|err| CoreError::from_io(codes::STREAM_IO, err))
    }

    /// `spec.md` §4.C `close`: bidirectional close-notify.
    pub fn close(&mut self) -> Result<(), CoreError> {
        let inner = self.inner_mut()?;
        match inner {
            Inner::Client(conn) => conn.send_close_notify(),
            Inner::Server(conn) => conn.send_close_notify(),
        }
        Ok(())
    }

    /// `spec.md` §4.C `shutdown-write`: write-side close-notify only,
    /// read half stays open until the peer closes. `rustls` exposes a
    /// single `send_close_notify`; EventDance-rs distinguishes the two
    /// at the `Socket`/`Connection` layer by not tearing down the read
    /// stack until a subsequent `Eof`.
    pub fn shutdown_write(&mut self) -> Result<(), CoreError> {
        self.close()
    }

    /// `spec.md` §4.C `get-peer-certificates`.
    pub fn peer_certificates(&self) -> Vec<CertificateDer<'static>> {
        match &self.inner {
            Some(Inner::Client(conn)) => conn.peer_certificates().map(|c| c.to_vec()).unwrap_or_default(),
            Some(Inner::Server(conn)) => conn.peer_certificates().map(|c| c.to_vec()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// `spec.md` §4.C `verify-peer`: a basic chain check (did `rustls`
    /// complete the handshake at all, i.e. did it accept the chain)
    /// plus a per-certificate not-before/not-after window check.
    /// `rustls` itself refuses to complete a handshake with an invalid
    /// chain, so by the time this is callable the chain-validity bit is
    /// already `Ok`; this method adds the expiry check the handshake
    /// does not perform against the caller's own wall clock.
    pub fn verify_peer(&self) -> VerifyResult {
        let certs = self.peer_certificates();
        if certs.is_empty() {
            return if self.require_peer_cert {
                VerifyResult::NO_CERT
            } else {
                VerifyResult::OK
            };
        }

        let now = SystemTime::now();
        let mut result = VerifyResult::OK;
        for cert in &certs {
            match parse_validity_window(cert) {
                Some((not_before, not_after)) => {
                    if now < not_before {
                        result |= VerifyResult::NOT_ACTIVATED;
                    }
                    if now > not_after {
                        result |= VerifyResult::EXPIRED;
                    }
                }
                None => result |= VerifyResult::INVALID,
            }
        }
        result
    }

    fn inner_mut(&mut self) -> Result<&mut Inner, CoreError> {
        self.inner.as_mut().ok_or_else(|| {
            CoreError::new(codes::TLS_NOT_ESTABLISHED, "TLS session has no active connection")
                .with_category(ErrorCategory::Programmer)
        })
    }
}

/// Extracts a certificate's not-before/not-after window by parsing its
/// X.509 `Validity` field. `rustls` deliberately exposes certificates
/// only as opaque DER — it has no ASN.1 decoder of its own — so this
/// reaches for `x509-parser`, the same way any TLS-adjacent consumer of
/// `rustls` that needs to inspect certificate fields does.
fn parse_validity_window(cert: &CertificateDer<'static>) -> Option<(SystemTime, SystemTime)> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    let validity = parsed.validity();
    let not_before = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(validity.not_before.timestamp().try_into().ok()?);
    let not_after = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(validity.not_after.timestamp().try_into().ok()?);
    Some((not_before, not_after))
}
