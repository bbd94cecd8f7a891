//! # TAOR Protocol
//!
//! The wire contract between a TAOR backend and an out-of-process renderer.
//!
//! Messages are JSON-RPC 2.0 shaped objects, one per line, UTF-8,
//! newline-delimited:
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"initialize","params":{"provider":"anthropic"}}
//! ← {"jsonrpc":"2.0","id":1,"result":{"protocol_version":1,"session_id":"…",…}}
//! → {"jsonrpc":"2.0","id":2,"method":"message/send","params":{"text":"hi"}}
//! ← {"jsonrpc":"2.0","id":2,"result":{"accepted":true}}
//! ← {"jsonrpc":"2.0","method":"turn/started","params":{}}
//! ← {"jsonrpc":"2.0","method":"text/delta","params":{"text":"Hello!"}}
//! ← {"jsonrpc":"2.0","method":"turn/completed","params":{…}}
//! ```
//!
//! The method vocabulary is closed: [`ClientRequest`] lists every request a
//! renderer may send, [`ServerNotification`] every notification it may
//! receive.

pub mod cards;
pub mod envelope;
pub mod error;
pub mod methods;
pub mod notifications;

pub use cards::Card;
pub use envelope::{Envelope, JSONRPC_VERSION, Notification, Request, Response, to_line};
pub use error::{ProtocolError, RpcError, codes};
pub use methods::{
    ClientRequest, Command, CommandSendParams, InitializeParams, InitializeResult,
    MessageSendParams, PromptAnswerParams, SessionLoadParams, SessionLoadResult,
};
pub use notifications::{CostUpdate, Prompt, PromptKind, ServerNotification};

/// Protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: u32 = 1;
