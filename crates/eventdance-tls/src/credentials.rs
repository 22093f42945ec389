//! TLS credentials and the "ready" subscription `spec.md` §4.C
//! requires: if a session's credentials are not yet loaded when
//! `starttls` is called, the session subscribes to this notification
//! and suspends the handshake rather than failing outright.

use eventdance_core::error::{codes, CoreError, ErrorCategory};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;
use std::sync::{Arc, Mutex};

/// A certificate chain plus private key, parsed once and shared by
/// every session built from the same `Credentials`.
#[derive(Clone)]
pub struct Credentials {
    pub(crate) cert_chain: Vec<CertificateDer<'static>>,
    pub(crate) private_key: Arc<PrivateKeyDer<'static>>,
}

impl Credentials {
    /// Parses PEM-encoded certificate chain and private key bytes.
    /// `spec.md` §4.C's `set-credentials` operation is the caller-facing
    /// entry point; this is the loader it calls.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, CoreError> {
        let mut cert_reader = BufReader::new(cert_pem);
        let cert_chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<_, _>>()
            .map_err(|err| CoreError::from_io(codes::TLS_HANDSHAKE_FAILED, err))?;
        if cert_chain.is_empty() {
            return Err(CoreError::new(codes::TLS_HANDSHAKE_FAILED, "no certificates found in PEM input")
                .with_category(ErrorCategory::Resource));
        }

        let mut key_reader = BufReader::new(key_pem);
        let private_key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|err| CoreError::from_io(codes::TLS_HANDSHAKE_FAILED, err))?
            .ok_or_else(|| {
                CoreError::new(codes::TLS_HANDSHAKE_FAILED, "no private key found in PEM input")
                    .with_category(ErrorCategory::Resource)
            })?;

        Ok(Self {
            cert_chain,
            private_key: Arc::new(private_key),
        })
    }
}

type ReadyCallback = Box<dyn FnOnce() + Send>;

/// A slot that may or may not hold [`Credentials`] yet, with a list of
/// callbacks to run the moment they are installed. Shared (via `Arc`)
/// between a socket's TLS session and whatever code eventually calls
/// `set_credentials` (for example a hot-reload watcher).
#[derive(Clone, Default)]
pub struct CredentialsSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    credentials: Option<Credentials>,
    waiters: Vec<ReadyCallback>,
}

impl CredentialsSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        let slot = Self::new();
        slot.set(credentials);
        slot
    }

    pub fn get(&self) -> Option<Credentials> {
        self.inner.lock().expect("credentials slot mutex poisoned").credentials.clone()
    }

    /// Installs credentials and fires every pending `on_ready` waiter
    /// (in subscription order) exactly once.
    pub fn set(&self, credentials: Credentials) {
        let waiters = {
            let mut state = self.inner.lock().expect("credentials slot mutex poisoned");
            state.credentials = Some(credentials);
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter();
        }
    }

    /// Subscribes to the "ready" notification. If credentials are
    /// already present, `on_ready` runs immediately and synchronously.
    pub fn on_ready(&self, on_ready: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.lock().expect("credentials slot mutex poisoned");
        if state.credentials.is_some() {
            drop(state);
            on_ready();
        } else {
            state.waiters.push(Box::new(on_ready));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn dummy_credentials() -> Credentials {
        Credentials {
            cert_chain: vec![CertificateDer::from(vec![0u8; 4])],
            private_key: Arc::new(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0u8; 4]))),
        }
    }

    #[test]
    fn ready_waiter_runs_immediately_when_already_set() {
        let slot = CredentialsSlot::with_credentials(dummy_credentials());
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        slot.on_ready(move || fired_clone.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn ready_waiters_fire_once_credentials_are_set() {
        let slot = CredentialsSlot::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        slot.on_ready(move || fired_clone.store(true, Ordering::SeqCst));
        assert!(!fired.load(Ordering::SeqCst));

        slot.set(dummy_credentials());
        assert!(fired.load(Ordering::SeqCst));
    }
}
