//! In-memory fakes shared by the unit tests of this crate.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use hassflow_domain::discovery::{Ack, DiscoveryPayload, HubCommand};
use hassflow_domain::error::{CommandError, CommandRejected, TransportUnavailable};
use hassflow_domain::id::ServerId;
use hassflow_domain::message::Outputs;

use crate::ports::{Connection, NodeOutput};

// ── Spy connection ─────────────────────────────────────────────

pub struct SpyConnection {
    server_id: ServerId,
    open: AtomicBool,
    reject: Mutex<Option<CommandRejected>>,
    sent: Mutex<Vec<HubCommand>>,
}

impl SpyConnection {
    pub fn new(server_id: &str, open: bool) -> Self {
        Self {
            server_id: ServerId::new(server_id),
            open: AtomicBool::new(open),
            reject: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn reject_with(&self, code: &str, message: &str) {
        *self.reject.lock().unwrap() = Some(CommandRejected {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    pub fn sent(&self) -> Vec<HubCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn discoveries(&self) -> Vec<DiscoveryPayload> {
        self.sent()
            .into_iter()
            .filter_map(|cmd| match cmd {
                HubCommand::Discover(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }
}

impl Connection for SpyConnection {
    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, command: HubCommand) -> impl Future<Output = Result<Ack, CommandError>> + Send {
        let result = if !self.is_open() {
            Err(TransportUnavailable {
                server_id: self.server_id.to_string(),
            }
            .into())
        } else if let Some(rejection) = self.reject.lock().unwrap().clone() {
            Err(rejection.into())
        } else {
            self.sent.lock().unwrap().push(command);
            Ok(Ack::default())
        };
        async { result }
    }
}

// ── Recording output ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingOutput {
    emitted: Mutex<Vec<Outputs>>,
}

impl RecordingOutput {
    pub fn emitted(&self) -> MutexGuard<'_, Vec<Outputs>> {
        self.emitted.lock().unwrap()
    }
}

impl NodeOutput for RecordingOutput {
    fn send(&self, outputs: Outputs) {
        self.emitted.lock().unwrap().push(outputs);
    }
}

/// Let spawned tasks on the current-thread test runtime run to completion.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
