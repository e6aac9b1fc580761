pub mod dcb {
    use std::collections::VecDeque;

    use crate::device::device::DeviceId;
    use crate::memory::memory::Region;
    use crate::pcb::pcb::PcbHandle;
    use crate::syscall::syscall::{IoCompletion, IoOp, IoOutcome, UserBuffer};

    /// Fixed-capacity byte ring. head is the next byte out, len the fill.
    pub struct RingBuffer {
        buf: Box<[u8]>,
        head: usize,
        len: usize,
    }

    impl RingBuffer {
        pub fn new(capacity: usize) -> RingBuffer {
            RingBuffer {
                buf: vec![0; capacity.max(1)].into_boxed_slice(),
                head: 0,
                len: 0,
            }
        }

        /// false when full; the byte is not stored.
        pub fn push(&mut self, byte: u8) -> bool {
            if self.is_full() {
                return false;
            }
            let tail = (self.head + self.len) % self.buf.len();
            self.buf[tail] = byte;
            self.len += 1;
            true
        }

        pub fn pop(&mut self) -> Option<u8> {
            if self.len == 0 {
                return None;
            }
            let byte = self.buf[self.head];
            self.head = (self.head + 1) % self.buf.len();
            self.len -= 1;
            Some(byte)
        }

        pub fn len(&self) -> usize {
            self.len
        }

        pub fn capacity(&self) -> usize {
            self.buf.len()
        }

        pub fn is_empty(&self) -> bool {
            self.len == 0
        }

        pub fn is_full(&self) -> bool {
            self.len == self.buf.len()
        }

        pub fn clear(&mut self) {
            self.head = 0;
            self.len = 0;
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum DeviceOp {
        Idle,
        Reading,
        Writing,
    }

    /// An in-flight READ or WRITE.
    ///
    /// `target` names the owner's stack pages; the transfer borrows the
    /// caller's buffer through it and never copies it. the kernel drops
    /// the transfer before those pages are freed.
    pub struct Transfer {
        pub op: IoOp,
        pub owner: PcbHandle,
        pub buffer: UserBuffer,
        pub requested: usize,
        pub completed: usize,
        pub(crate) target: Region,
    }

    /// A finished operation waiting for the dispatcher to notice it.
    pub struct Completion {
        pub owner: PcbHandle,
        pub result: IoCompletion,
        /// processes turned away with DeviceBusy while this ran.
        pub waiters: Vec<PcbHandle>,
    }

    pub struct Dcb {
        device: DeviceId,
        pub(crate) allocated: bool,
        pub(crate) baud: u32,
        pub(crate) ring: RingBuffer,
        pub(crate) in_flight: Option<Transfer>,
        pub(crate) completions: VecDeque<Completion>,
        pub(crate) busy_waiters: Vec<PcbHandle>,
        pub(crate) dropped: usize,
    }

    impl Dcb {
        pub fn new(device: DeviceId, ring_capacity: usize) -> Dcb {
            Dcb {
                device,
                allocated: false,
                baud: 0,
                ring: RingBuffer::new(ring_capacity),
                in_flight: None,
                completions: VecDeque::new(),
                busy_waiters: Vec::new(),
                dropped: 0,
            }
        }

        pub fn device(&self) -> DeviceId {
            self.device
        }

        pub fn is_allocated(&self) -> bool {
            self.allocated
        }

        pub fn baud(&self) -> u32 {
            self.baud
        }

        pub fn current_op(&self) -> DeviceOp {
            match self.in_flight.as_ref().map(|t| t.op) {
                None => DeviceOp::Idle,
                Some(IoOp::Read) => DeviceOp::Reading,
                Some(IoOp::Write) => DeviceOp::Writing,
            }
        }

        pub fn in_flight(&self) -> Option<&Transfer> {
            self.in_flight.as_ref()
        }

        pub fn completion_flag(&self) -> bool {
            !self.completions.is_empty()
        }

        pub fn ring(&self) -> &RingBuffer {
            &self.ring
        }

        /// bytes lost to a full ring since the device was opened.
        pub fn dropped(&self) -> usize {
            self.dropped
        }

        pub(crate) fn reset(&mut self) {
            self.ring.clear();
            self.in_flight = None;
            self.completions.clear();
            self.busy_waiters.clear();
            self.dropped = 0;
        }

        // retire the in-flight transfer and raise the completion flag.
        pub(crate) fn finish(&mut self) {
            let Some(transfer) = self.in_flight.take() else {
                return;
            };
            self.completions.push_back(Completion {
                owner: transfer.owner,
                result: IoCompletion {
                    op: transfer.op,
                    device: self.device,
                    outcome: IoOutcome::Serviced,
                    transferred: transfer.completed,
                },
                waiters: std::mem::take(&mut self.busy_waiters),
            });
        }

        /// forget every trace of `owner`. returns true if its transfer was
        /// the one in flight.
        ///
        /// processes queued behind a dropped transfer still get their wake:
        /// the transfer is retired as a completion for an owner that no
        /// longer resolves.
        pub(crate) fn forget(&mut self, owner: PcbHandle) -> bool {
            self.busy_waiters.retain(|h| *h != owner);
            for completion in self.completions.iter_mut() {
                completion.waiters.retain(|h| *h != owner);
            }
            self.completions
                .retain(|c| c.owner != owner || !c.waiters.is_empty());

            if !self.in_flight.as_ref().is_some_and(|t| t.owner == owner) {
                return false;
            }
            if self.busy_waiters.is_empty() {
                self.in_flight = None;
            } else {
                self.finish();
            }
            true
        }
    }

    #[cfg(test)]
    mod tests {
        use super::RingBuffer;

        #[test]
        fn ring_wraps_and_drops_when_full() {
            let mut ring = RingBuffer::new(3);
            assert!(ring.push(b'a'));
            assert!(ring.push(b'b'));
            assert_eq!(ring.pop(), Some(b'a'));
            assert!(ring.push(b'c'));
            assert!(ring.push(b'd'));
            assert!(!ring.push(b'e'));
            assert!(ring.is_full());

            let drained: Vec<u8> = std::iter::from_fn(|| ring.pop()).collect();
            assert_eq!(drained, b"bcd");
            assert!(ring.is_empty());
        }

        #[test]
        fn clear_resets_indices() {
            let mut ring = RingBuffer::new(2);
            ring.push(1);
            ring.push(2);
            ring.clear();
            assert_eq!(ring.len(), 0);
            assert!(ring.push(9));
            assert_eq!(ring.pop(), Some(9));
        }
    }
}
