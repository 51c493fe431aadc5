use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, unbounded};
use smallvec::SmallVec;

use crate::descriptor::HeapKind;

/// Something whose release has to wait for the GPU.
#[derive(Debug, PartialEq, Eq)]
pub enum Release<R> {
    Resource(R),
    Descriptor { kind: HeapKind, index: u32 },
}

struct Pending<R> {
    fence_value: u64,
    release: Release<R>,
}

/// Fence-gated release queue.
///
/// Registration only needs `&self` and never fails: the entry is tagged with the
/// fence value of the batch currently being recorded and sent into the queue.
/// An entry comes back out of [`drain_completed`](Self::drain_completed) once
/// the GPU reports that fence value as completed.
pub struct DeferredDestructionQueue<R> {
    current_fence: u64,
    sender: Sender<Pending<R>>,
    receiver: Receiver<Pending<R>>,
    pending: VecDeque<Pending<R>>,
}

impl<R> DeferredDestructionQueue<R> {
    /// `first_fence` is the value the first submitted batch will signal.
    pub fn new(first_fence: u64) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            current_fence: first_fence,
            sender,
            receiver,
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub fn current_fence(&self) -> u64 {
        self.current_fence
    }

    pub fn register_resource(&self, resource: R) {
        self.register(Release::Resource(resource));
    }

    pub fn register_slot(&self, kind: HeapKind, index: u32) {
        self.register(Release::Descriptor { kind, index });
    }

    fn register(&self, release: Release<R>) {
        // the receiver lives in `self`, so the channel is never disconnected
        let _ = self.sender.send(Pending {
            fence_value: self.current_fence,
            release,
        });
    }

    /// Closes the batch being recorded. Returns the fence value it will signal.
    pub fn advance(&mut self) -> u64 {
        let submitted = self.current_fence;
        self.current_fence += 1;
        submitted
    }

    /// Removes every entry whose batch is covered by `completed_fence`.
    pub fn drain_completed(&mut self, completed_fence: u64) -> SmallVec<[Release<R>; 8]> {
        self.pending.extend(self.receiver.try_iter());

        let mut released = SmallVec::new();
        // fence values are registered in non-decreasing order
        while let Some(front) = self.pending.front() {
            if front.fence_value > completed_fence {
                break;
            }
            if let Some(entry) = self.pending.pop_front() {
                released.push(entry.release);
            }
        }
        released
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
