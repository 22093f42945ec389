//! The JSON-RPC engine, `spec.md` §4.F: framing, id correlation, and
//! transport binding layered over any [`Transport`].
//!
//! An engine holds at most one free-form write callback plus any
//! number of weakly-referenced attached transports (§4.F "Transport
//! binding" / "Lifetime"). A call's `CallTarget` picks the write path:
//! a `Peer` target is routed to whichever attached transport reports
//! it connected; `FreeForm` goes through the write callback.

use crate::boundary::JsonFrameDecoder;
use crate::message::{RequestMessage, ResponseMessage, ResponseShape};
use bytes::Bytes;
use eventdance_core::error::{codes, CoreError, ErrorCategory};
use eventdance_peer::{Peer, PeerId, Transport, TransportEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Where an outbound call is written, and what an inbound request's
/// response is written back through.
#[derive(Clone)]
pub enum CallTarget {
    Peer(Arc<Peer>),
    FreeForm,
}

/// How an outbound call finished. `spec.md` §4.F: "if both or neither
/// [result/error] are present, complete with a protocol-error".
pub enum CallCompletion {
    Result(Value),
    Error(Value),
    /// The response was malformed (both/neither of result+error set).
    Protocol(CoreError),
    /// The owning transport was reaped before a response arrived.
    TransportClosed,
}

type CompletionFn = Box<dyn FnOnce(CallCompletion) + Send>;
type WriteCallback = Box<dyn Fn(&[u8]) -> Result<(), CoreError> + Send + Sync>;
type MethodHandler = Box<dyn Fn(&str, Value, u64, CallTarget) + Send + Sync>;

struct OutboundRecord {
    completion: CompletionFn,
    transport_id: Option<u64>,
}

struct TransportBinding {
    transport: Weak<dyn Transport>,
}

/// A single JSON-RPC engine instance. `prefix` scopes outbound ids so
/// two engines sharing one transport never mint colliding ids.
pub struct JsonRpcEngine {
    prefix: String,
    next_counter: AtomicU64,
    next_handle: AtomicU64,
    next_transport_id: AtomicU64,
    outbound: Mutex<HashMap<String, OutboundRecord>>,
    inbound: Mutex<HashMap<u64, (Value, CallTarget)>>,
    transports: Mutex<HashMap<u64, TransportBinding>>,
    write_callback: Mutex<Option<WriteCallback>>,
    method_handler: Mutex<Option<MethodHandler>>,
    peer_decoders: Mutex<HashMap<PeerId, JsonFrameDecoder>>,
    free_decoder: Mutex<JsonFrameDecoder>,
}

impl JsonRpcEngine {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_counter: AtomicU64::new(0),
            // Handle 0 is reserved for notifications (SPEC_FULL.md §4.F
            // resolving spec.md's open question on the null-id branch).
            next_handle: AtomicU64::new(1),
            next_transport_id: AtomicU64::new(0),
            outbound: Mutex::new(HashMap::new()),
            inbound: Mutex::new(HashMap::new()),
            transports: Mutex::new(HashMap::new()),
            write_callback: Mutex::new(None),
            method_handler: Mutex::new(None),
            peer_decoders: Mutex::new(HashMap::new()),
            free_decoder: Mutex::new(JsonFrameDecoder::new()),
        }
    }

    pub fn set_write_callback<F>(&self, callback: F)
    where
        F: Fn(&[u8]) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        *self.write_callback.lock().expect("write callback mutex poisoned") = Some(Box::new(callback));
    }

    pub fn set_method_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Value, u64, CallTarget) + Send + Sync + 'static,
    {
        *self.method_handler.lock().expect("method handler mutex poisoned") = Some(Box::new(handler));
    }

    /// Registers `transport` weakly. Returns a stable id the caller
    /// can later pass to [`JsonRpcEngine::detach_transport`].
    pub fn attach_transport(&self, transport: &Arc<dyn Transport>) -> u64 {
        let id = self.next_transport_id.fetch_add(1, Ordering::SeqCst);
        self.transports.lock().expect("transport table mutex poisoned").insert(
            id,
            TransportBinding {
                transport: Arc::downgrade(transport),
            },
        );
        id
    }

    pub fn detach_transport(&self, transport_id: u64) {
        self.transports.lock().expect("transport table mutex poisoned").remove(&transport_id);
        self.complete_transport_closed(transport_id);
    }

    /// Drops bindings whose transport has already been dropped
    /// elsewhere, completing their in-flight outbound calls with
    /// [`CallCompletion::TransportClosed`]. `spec.md` §4.F "Lifetime".
    pub fn reap_dead_transports(&self) {
        let dead: Vec<u64> = {
            let transports = self.transports.lock().expect("transport table mutex poisoned");
            transports
                .iter()
                .filter(|(_, binding)| binding.transport.upgrade().is_none())
                .map(|(id, _)| *id)
                .collect()
        };
        for id in dead {
            self.transports.lock().expect("transport table mutex poisoned").remove(&id);
            self.complete_transport_closed(id);
        }
    }

    fn complete_transport_closed(&self, transport_id: u64) {
        let mut outbound = self.outbound.lock().expect("outbound map mutex poisoned");
        let stale: Vec<String> = outbound
            .iter()
            .filter(|(_, record)| record.transport_id == Some(transport_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(record) = outbound.remove(&id) {
                (record.completion)(CallCompletion::TransportClosed);
            }
        }
    }

    fn next_id(&self) -> String {
        let counter = self.next_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}.{}", self.prefix, counter)
    }

    /// Writes `bytes` via `target`, returning the transport id that
    /// carried it (if any) so the caller can later complete the
    /// in-flight record if that transport goes away.
    fn deliver(&self, target: &CallTarget, bytes: Bytes) -> Result<Option<u64>, CoreError> {
        match target {
            CallTarget::Peer(peer) => {
                let transports = self.transports.lock().expect("transport table mutex poisoned");
                for (id, binding) in transports.iter() {
                    if let Some(transport) = binding.transport.upgrade() {
                        if transport.peer_is_connected(peer) {
                            if !transport.send(peer, &bytes)? {
                                peer.backlog_push(bytes);
                            }
                            return Ok(Some(*id));
                        }
                    }
                }
                Err(CoreError::new(codes::TRANSPORT_NOT_ASSOCIATED, "no attached transport owns this peer")
                    .with_category(ErrorCategory::PeerLocal))
            }
            CallTarget::FreeForm => {
                let guard = self.write_callback.lock().expect("write callback mutex poisoned");
                match guard.as_ref() {
                    Some(callback) => {
                        callback(&bytes)?;
                        Ok(None)
                    }
                    None => Err(CoreError::new(codes::TRANSPORT_NOT_ASSOCIATED, "no free-form write callback set")
                        .with_category(ErrorCategory::Programmer)),
                }
            }
        }
    }

    /// Issues an outbound call. `completion` fires exactly once, from
    /// whatever thread eventually feeds the matching response (or from
    /// [`JsonRpcEngine::reap_dead_transports`] if the owning transport
    /// is dropped first).
    pub fn call(
        &self,
        method: &str,
        params: Value,
        target: CallTarget,
        completion: CompletionFn,
    ) -> Result<(), CoreError> {
        self.reap_dead_transports();
        let id = self.next_id();
        let message = RequestMessage {
            id: Some(id.clone()),
            method: method.to_string(),
            params,
        };
        let bytes = Bytes::from(serde_json::to_vec(&message).expect("RequestMessage always serializes"));
        let transport_id = self.deliver(&target, bytes)?;
        self.outbound
            .lock()
            .expect("outbound map mutex poisoned")
            .insert(id, OutboundRecord { completion, transport_id });
        Ok(())
    }

    /// Issues a notification: a request with a null id, for which no
    /// response is ever expected or recorded.
    pub fn notify(&self, method: &str, params: Value, target: CallTarget) -> Result<(), CoreError> {
        let message = RequestMessage {
            id: None,
            method: method.to_string(),
            params,
        };
        let bytes = Bytes::from(serde_json::to_vec(&message).expect("RequestMessage always serializes"));
        self.deliver(&target, bytes)?;
        Ok(())
    }

    /// Completes and removes the outbound record matching `response.id`
    /// by invoking its completion. A response with no matching id is
    /// silently dropped (the call may have already been abandoned by
    /// the caller, or a transport-closed completion already fired).
    fn handle_response(&self, response: ResponseMessage) {
        let record = self.outbound.lock().expect("outbound map mutex poisoned").remove(&response.id);
        let Some(record) = record else { return };
        let completion = match response.outcome() {
            Ok(result) => CallCompletion::Result(result.clone()),
            Err(ResponseShape::Error(error)) => CallCompletion::Error(error.clone()),
            Err(ResponseShape::Empty) | Err(ResponseShape::Both) => CallCompletion::Protocol(
                CoreError::new(codes::RPC_PROTOCOL, "response had both or neither of result/error")
                    .with_category(ErrorCategory::PeerLocal),
            ),
        };
        (record.completion)(completion);
    }

    /// Assigns a fresh invocation handle, records the original id and
    /// reply target, and invokes the method-call handler. `request` has
    /// already been confirmed to carry a `method` field by the caller.
    fn handle_request(&self, request: RequestMessage, target: CallTarget) {
        let handle = if request.is_notification() {
            0
        } else {
            self.next_handle.fetch_add(1, Ordering::SeqCst)
        };
        if handle != 0 {
            let original_id = Value::String(request.id.clone().expect("non-notification request carries an id"));
            self.inbound
                .lock()
                .expect("inbound map mutex poisoned")
                .insert(handle, (original_id, target.clone()));
        }
        let guard = self.method_handler.lock().expect("method handler mutex poisoned");
        if let Some(handler) = guard.as_ref() {
            handler(&request.method, request.params, handle, target);
        }
    }

    /// Completes an inbound call with a success result. A no-op for
    /// `handle == 0` (the notification sentinel) per `spec.md` §4.F.
    pub fn respond(&self, handle: u64, result: Value) -> Result<(), CoreError> {
        if handle == 0 {
            return Ok(());
        }
        let (id, target) = self
            .inbound
            .lock()
            .expect("inbound map mutex poisoned")
            .remove(&handle)
            .ok_or_else(|| CoreError::new(codes::RPC_UNKNOWN_ID, "no inbound call with this handle").with_category(ErrorCategory::Programmer))?;
        let id = match id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let message = ResponseMessage::success(id, result);
        let bytes = Bytes::from(serde_json::to_vec(&message).expect("ResponseMessage always serializes"));
        self.deliver(&target, bytes)?;
        Ok(())
    }

    /// Completes an inbound call with an error. Mirrors
    /// [`JsonRpcEngine::respond`]; `code`/`message` are wrapped in the
    /// JSON-RPC `error` object.
    pub fn respond_error(&self, handle: u64, code: i64, message: &str) -> Result<(), CoreError> {
        if handle == 0 {
            return Ok(());
        }
        let (id, target) = self
            .inbound
            .lock()
            .expect("inbound map mutex poisoned")
            .remove(&handle)
            .ok_or_else(|| CoreError::new(codes::RPC_UNKNOWN_ID, "no inbound call with this handle").with_category(ErrorCategory::Programmer))?;
        let id = match id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let error = serde_json::json!({ "code": code, "message": message });
        let response = ResponseMessage::failure(id, error);
        let bytes = Bytes::from(serde_json::to_vec(&response).expect("ResponseMessage always serializes"));
        self.deliver(&target, bytes)?;
        Ok(())
    }

    /// Feeds raw bytes received through `target` (a peer's current
    /// message, or a free-form channel's inbound bytes) through the
    /// per-target JSON object boundary detector and dispatches every
    /// complete frame.
    pub fn feed(&self, target: CallTarget, bytes: &[u8]) -> Result<(), CoreError> {
        let frames = match &target {
            CallTarget::Peer(peer) => {
                let mut decoders = self.peer_decoders.lock().expect("peer decoder map mutex poisoned");
                let decoder = decoders.entry(peer.id().clone()).or_insert_with(JsonFrameDecoder::new);
                decoder.feed(bytes)?
            }
            CallTarget::FreeForm => {
                let mut decoder = self.free_decoder.lock().expect("free-form decoder mutex poisoned");
                decoder.feed(bytes)?
            }
        };
        for frame in frames {
            self.dispatch_frame(&frame, target.clone())?;
        }
        Ok(())
    }

    fn dispatch_frame(&self, frame: &[u8], target: CallTarget) -> Result<(), CoreError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| CoreError::new(codes::RPC_MALFORMED, e.to_string()).with_category(ErrorCategory::PeerLocal))?;
        if value.get("method").is_some() {
            let request: RequestMessage = serde_json::from_value(value)
                .map_err(|e| CoreError::new(codes::RPC_MALFORMED, e.to_string()).with_category(ErrorCategory::PeerLocal))?;
            self.handle_request(request, target);
        } else {
            let response: ResponseMessage = serde_json::from_value(value)
                .map_err(|e| CoreError::new(codes::RPC_MALFORMED, e.to_string()).with_category(ErrorCategory::PeerLocal))?;
            self.handle_response(response);
        }
        Ok(())
    }

    /// Drains a transport's `Receive` event into [`JsonRpcEngine::feed`],
    /// and drops the peer's decoder on `PeerClosed` so a long-running
    /// engine does not accumulate one decoder per peer forever.
    pub fn on_transport_event(&self, event: TransportEvent) -> Result<(), CoreError> {
        match event {
            TransportEvent::Receive(peer) => {
                if let Some(bytes) = peer.receive() {
                    self.feed(CallTarget::Peer(peer), &bytes)?;
                }
                Ok(())
            }
            TransportEvent::PeerClosed(peer, _gracefully) => {
                self.peer_decoders.lock().expect("peer decoder map mutex poisoned").remove(peer.id());
                Ok(())
            }
            TransportEvent::NewPeer(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdance_core::time::MockClock;
    use eventdance_peer::PeerId;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct LoopbackTransport {
        peer: Arc<Peer>,
        inbox: Mutex<Vec<Bytes>>,
    }

    impl Transport for LoopbackTransport {
        fn send(&self, _peer: &Arc<Peer>, buf: &Bytes) -> Result<bool, CoreError> {
            self.inbox.lock().unwrap().push(buf.clone());
            Ok(true)
        }

        fn peer_is_connected(&self, peer: &Peer) -> bool {
            std::ptr::eq(peer, self.peer.as_ref())
        }

        fn close_peer(&self, peer: &Arc<Peer>, _gracefully: bool) -> Result<(), CoreError> {
            peer.begin_close();
            Ok(())
        }
    }

    fn test_peer() -> Arc<Peer> {
        let clock = Arc::new(MockClock::new());
        Peer::new(PeerId::generate(), clock)
    }

    #[test]
    fn call_without_any_transport_fails_fast() {
        let engine = JsonRpcEngine::new("x");
        let peer = test_peer();
        let result = engine.call("ping", json!([]), CallTarget::Peer(peer), Box::new(|_| {}));
        assert!(result.is_err());
    }

    #[test]
    fn request_response_round_trip_over_a_loopback_transport() {
        let engine = Arc::new(JsonRpcEngine::new("x"));
        let peer = test_peer();
        let transport = Arc::new(LoopbackTransport {
            peer: peer.clone(),
            inbox: Mutex::new(Vec::new()),
        });
        let transport_dyn: Arc<dyn Transport> = transport.clone();
        engine.attach_transport(&transport_dyn);

        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = completed.clone();
        engine
            .call(
                "add",
                json!([2, 3]),
                CallTarget::Peer(peer.clone()),
                Box::new(move |outcome| {
                    completed_clone.store(true, Ordering::SeqCst);
                    match outcome {
                        CallCompletion::Result(v) => assert_eq!(v, json!(5)),
                        _ => panic!("expected a success result"),
                    }
                }),
            )
            .unwrap();

        let sent = transport.inbox.lock().unwrap().last().unwrap().clone();
        let request: Value = serde_json::from_slice(&sent).unwrap();
        let id = request["id"].as_str().unwrap().to_string();

        engine
            .feed(CallTarget::Peer(peer), &serde_json::to_vec(&json!({"id": id, "result": 5})).unwrap())
            .unwrap();

        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn inbound_request_assigns_handle_and_respond_writes_back() {
        let engine = Arc::new(JsonRpcEngine::new("y"));
        let written = Arc::new(Mutex::new(Vec::new()));
        let written_clone = written.clone();
        engine.set_write_callback(move |bytes| {
            written_clone.lock().unwrap().push(bytes.to_vec());
            Ok(())
        });

        let engine_for_handler = engine.clone();
        engine.set_method_handler(move |method, params, handle, _target| {
            assert_eq!(method, "add");
            let sum = params[0].as_i64().unwrap() + params[1].as_i64().unwrap();
            engine_for_handler.respond(handle, json!(sum)).unwrap();
        });

        let request = json!({"id": "peer.0", "method": "add", "params": [2, 3]});
        engine.feed(CallTarget::FreeForm, &serde_json::to_vec(&request).unwrap()).unwrap();

        let response: Value = serde_json::from_slice(&written.lock().unwrap()[0]).unwrap();
        assert_eq!(response["result"], json!(5));
    }

    #[test]
    fn notification_request_dispatches_with_handle_zero_and_respond_is_a_no_op() {
        let engine = Arc::new(JsonRpcEngine::new("z"));
        let seen_handle = Arc::new(Mutex::new(None));
        let seen_handle_clone = seen_handle.clone();
        engine.set_method_handler(move |_method, _params, handle, _target| {
            *seen_handle_clone.lock().unwrap() = Some(handle);
        });

        let notification = json!({"id": null, "method": "ping", "params": []});
        engine.feed(CallTarget::FreeForm, &serde_json::to_vec(&notification).unwrap()).unwrap();

        assert_eq!(*seen_handle.lock().unwrap(), Some(0));
        assert!(engine.respond(0, json!(null)).is_ok());
    }

    #[test]
    fn detaching_a_transport_completes_in_flight_calls_as_transport_closed() {
        let engine = JsonRpcEngine::new("w");
        let peer = test_peer();
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport {
            peer: peer.clone(),
            inbox: Mutex::new(Vec::new()),
        });
        let transport_id = engine.attach_transport(&transport);

        let completed_as_closed = Arc::new(AtomicBool::new(false));
        let flag = completed_as_closed.clone();
        engine
            .call(
                "slow",
                json!([]),
                CallTarget::Peer(peer),
                Box::new(move |outcome| {
                    flag.store(matches!(outcome, CallCompletion::TransportClosed), Ordering::SeqCst);
                }),
            )
            .unwrap();

        engine.detach_transport(transport_id);
        assert!(completed_as_closed.load(Ordering::SeqCst));
    }
}
