//! D-Bus bridge wire framing, `spec.md` §6: "Each frame is a JSON array
//! of exactly four elements: `[cmd:uint8, serial:uint64, subject:uint32,
//! args:string]`... `args` is a JSON-escaped string whose decoded
//! content is a typed tuple matching the command."
//!
//! Grounded on `original_source/evd-dbus-bridge.c`'s
//! `evd_dbus_agent_send_msg`, which builds the frame with
//! `g_strdup_printf ("[%u,%lu,%u,\"[%s]\"]", cmd, serial, subject,
//! args)` — the fourth element is literally JSON array *source text*
//! (e.g. `"[0,\"boom\"]"` for an error reply), re-escaped as a JSON
//! string when the outer array is itself serialized. [`Frame::encode`]
//! reproduces that double-encoding with `serde_json` instead of
//! `g_strescape`. Dispatch of the decoded command is out of scope here
//! — this module only encodes/decodes the wire frame.

use eventdance_core::error::{codes, CoreError, ErrorCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `spec.md` §6 "Commands (selected)".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Error = 1,
    Reply = 2,
    NewConnection = 3,
    CloseConnection = 4,
    OwnName = 5,
    UnownName = 6,
    NameAcquired = 7,
    NameLost = 8,
    RegisterObject = 9,
    UnregisterObject = 10,
    NewProxy = 11,
    CloseProxy = 12,
    CallMethod = 13,
    CallMethodReturn = 14,
    EmitSignal = 15,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Error,
            2 => Self::Reply,
            3 => Self::NewConnection,
            4 => Self::CloseConnection,
            5 => Self::OwnName,
            6 => Self::UnownName,
            7 => Self::NameAcquired,
            8 => Self::NameLost,
            9 => Self::RegisterObject,
            10 => Self::UnregisterObject,
            11 => Self::NewProxy,
            12 => Self::CloseProxy,
            13 => Self::CallMethod,
            14 => Self::CallMethodReturn,
            15 => Self::EmitSignal,
            _ => return None,
        })
    }
}

/// `spec.md` §6 "Errors (selected)".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeError {
    Failed = 0,
    InvalidMsg = 1,
    UnknownCommand = 2,
    InvalidSubject = 3,
    InvalidArgs = 4,
    ConnectionFailed = 5,
    AlreadyRegistered = 6,
    ProxyFailed = 7,
    UnknownMethod = 8,
}

/// The raw four-element wire frame. `cmd`/`serial`/`subject` carry
/// JSON's usual number representation; `args` is the doubly-encoded
/// tuple string described above.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub cmd: u8,
    pub serial: u64,
    pub subject: u32,
    pub args: String,
}

impl Frame {
    /// Builds a frame whose `args` field is `tuple` serialized to JSON
    /// array text, matching `evd_dbus_agent_send_msg`'s
    /// comma-joined-then-bracketed argument string.
    pub fn new(cmd: Command, serial: u64, subject: u32, tuple: &[Value]) -> Result<Self, CoreError> {
        let args = serde_json::to_string(&Value::Array(tuple.to_vec()))
            .map_err(|e| CoreError::new(codes::DBUS_INVALID_FRAME, e.to_string()).with_category(ErrorCategory::Programmer))?;
        Ok(Self {
            cmd: cmd as u8,
            serial,
            subject,
            args,
        })
    }

    /// Serializes the frame as the four-element JSON array.
    /// `serde`'s own string escaping reproduces the effect of the
    /// original's `g_strescape` + surrounding quotes.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(&(self.cmd, self.serial, self.subject, &self.args))
            .map_err(|e| CoreError::new(codes::DBUS_INVALID_FRAME, e.to_string()).with_category(ErrorCategory::Programmer))
    }

    /// Parses a four-element `[cmd, serial, subject, args]` array.
    /// Any other shape, or a non-string `args` element, is
    /// `DBUS_INVALID_FRAME`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::new(codes::DBUS_INVALID_FRAME, e.to_string()).with_category(ErrorCategory::PeerLocal))?;
        let elements = value.as_array().ok_or_else(|| {
            CoreError::new(codes::DBUS_INVALID_FRAME, "frame is not a JSON array").with_category(ErrorCategory::PeerLocal)
        })?;
        if elements.len() != 4 {
            return Err(CoreError::new(codes::DBUS_INVALID_FRAME, "frame does not have exactly four elements")
                .with_category(ErrorCategory::PeerLocal));
        }
        let cmd = elements[0]
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| CoreError::new(codes::DBUS_INVALID_FRAME, "cmd is not a u8").with_category(ErrorCategory::PeerLocal))?;
        let serial = elements[1]
            .as_u64()
            .ok_or_else(|| CoreError::new(codes::DBUS_INVALID_FRAME, "serial is not a u64").with_category(ErrorCategory::PeerLocal))?;
        let subject = elements[2]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| CoreError::new(codes::DBUS_INVALID_FRAME, "subject is not a u32").with_category(ErrorCategory::PeerLocal))?;
        let args = elements[3]
            .as_str()
            .ok_or_else(|| CoreError::new(codes::DBUS_INVALID_FRAME, "args is not a string").with_category(ErrorCategory::PeerLocal))?
            .to_string();
        Ok(Self { cmd, serial, subject, args })
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.cmd)
    }

    /// Parses `args` as JSON, yielding the typed tuple the command
    /// signature expects.
    pub fn args_as_tuple(&self) -> Result<Vec<Value>, CoreError> {
        let value: Value = serde_json::from_str(&self.args)
            .map_err(|e| CoreError::new(codes::DBUS_INVALID_FRAME, e.to_string()).with_category(ErrorCategory::PeerLocal))?;
        value.as_array().cloned().ok_or_else(|| {
            CoreError::new(codes::DBUS_INVALID_FRAME, "args does not decode to a JSON array").with_category(ErrorCategory::PeerLocal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_frame_round_trips_cmd_serial_subject_and_args() {
        let frame = Frame::new(Command::Error, 7, 0, &[json!(4), json!("invalid_args")]).unwrap();
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();

        assert_eq!(decoded.cmd, Command::Error as u8);
        assert_eq!(decoded.serial, 7);
        assert_eq!(decoded.subject, 0);
        assert_eq!(decoded.command(), Some(Command::Error));
        assert_eq!(decoded.args_as_tuple().unwrap(), vec![json!(4), json!("invalid_args")]);
    }

    #[test]
    fn args_containing_quotes_and_newlines_survive_double_encoding() {
        let frame = Frame::new(Command::CallMethod, 1, 42, &[json!("line one\nline \"two\"")]).unwrap();
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.args_as_tuple().unwrap(), vec![json!("line one\nline \"two\"")]);
    }

    #[test]
    fn wrong_element_count_is_invalid_frame() {
        let err = Frame::decode(b"[1,2,3]").unwrap_err();
        assert_eq!(err.code(), codes::DBUS_INVALID_FRAME);
    }

    #[test]
    fn non_string_args_element_is_invalid_frame() {
        let err = Frame::decode(b"[1,2,3,4]").unwrap_err();
        assert_eq!(err.code(), codes::DBUS_INVALID_FRAME);
    }

    #[test]
    fn command_from_u8_rejects_unknown_values() {
        assert!(Command::from_u8(0).is_none());
        assert!(Command::from_u8(16).is_none());
        assert_eq!(Command::from_u8(13), Some(Command::CallMethod));
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `spec.md` §8's D-Bus round-trip property: encoding then
        /// decoding a frame reproduces `cmd`/`serial`/`subject` exactly
        /// and the `args` tuple's string elements verbatim, regardless
        /// of what characters (quotes, newlines, control bytes) they
        /// contain.
        #[test]
        fn frame_round_trips_for_arbitrary_string_args(
            cmd in 1u8..=15,
            serial in any::<u64>(),
            subject in any::<u32>(),
            args in proptest::collection::vec(any::<String>(), 0..6),
        ) {
            let tuple: Vec<Value> = args.iter().map(|s| Value::String(s.clone())).collect();
            let frame = Frame::new(Command::from_u8(cmd).unwrap(), serial, subject, &tuple).unwrap();

            let bytes = frame.encode().unwrap();
            let decoded = Frame::decode(&bytes).unwrap();

            prop_assert_eq!(decoded.cmd, cmd);
            prop_assert_eq!(decoded.serial, serial);
            prop_assert_eq!(decoded.subject, subject);
            let round_tripped = decoded.args_as_tuple().unwrap();
            let expected: Vec<Value> = args.into_iter().map(Value::String).collect();
            prop_assert_eq!(round_tripped, expected);
        }
    }
}
