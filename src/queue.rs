//! Inbound application queue (spec §3 `InboundQueue`, §5).
//!
//! Single-producer (the Routing task), single-consumer (the
//! application via `mesh_recv`), so `std::sync::mpsc::sync_channel`'s
//! bounded SPSC channel is a direct fit rather than something
//! hand-rolled.

use crate::packet::DataPacket;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

const QUEUE_CAPACITY: usize = 32;

pub struct InboundQueue {
    tx: SyncSender<DataPacket>,
    rx: Mutex<Receiver<DataPacket>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        let (tx, rx) = sync_channel(QUEUE_CAPACITY);
        InboundQueue {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue a packet for the application. Drops and logs on a full
    /// queue rather than blocking the Routing task.
    pub fn push(&self, packet: DataPacket) {
        match self.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("queue: inbound queue full, dropping packet"),
            Err(TrySendError::Disconnected(_)) => {
                error!("queue: inbound queue receiver gone")
            }
        }
    }

    /// Non-blocking dequeue for `mesh_recv` (spec §4.5).
    pub fn try_pop(&self) -> Option<DataPacket> {
        self.rx.lock().unwrap().try_recv().ok()
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
