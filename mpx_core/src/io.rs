pub mod io {
    use tracing::{debug, trace, warn};

    use crate::dcb::dcb::{Completion, Dcb, Transfer};
    use crate::device::device::{baud_divisor, DeviceId, DeviceTransport};
    use crate::error::error::{KernelError, KernelResult, ValidationError};
    use crate::memory::memory::{PhysMemory, Region};
    use crate::pcb::pcb::PcbHandle;
    use crate::syscall::syscall::{IoOp, IoOutcome, UserBuffer};

    /// What the façade did with a request, and how many bytes moved
    /// synchronously.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct IoReply {
        pub outcome: IoOutcome,
        pub transferred: usize,
    }

    impl IoReply {
        fn of(outcome: IoOutcome) -> IoReply {
            IoReply {
                outcome,
                transferred: 0,
            }
        }
    }

    /// Run `f` with the device's interrupt source masked. anything the
    /// port raises meanwhile stays pending until the next service pass.
    pub fn with_irq_masked<T, R, F>(transport: &mut T, device: DeviceId, f: F) -> R
    where
        T: DeviceTransport,
        F: FnOnce(&mut T) -> R,
    {
        transport.mask_irq(device);
        let result = f(transport);
        transport.unmask_irq(device);
        result
    }

    /// The DCB table plus everything that moves bytes between ports and
    /// process buffers.
    pub struct IoSystem {
        dcbs: Vec<Dcb>,
        terminator: u8,
    }

    impl IoSystem {
        pub fn new(ring_capacity: usize, terminator: u8) -> IoSystem {
            IoSystem {
                dcbs: DeviceId::ALL
                    .into_iter()
                    .map(|dev| Dcb::new(dev, ring_capacity))
                    .collect(),
                terminator,
            }
        }

        pub fn dcb(&self, device: DeviceId) -> &Dcb {
            &self.dcbs[device.index()]
        }

        pub fn dcbs(&self) -> impl Iterator<Item = &Dcb> {
            self.dcbs.iter()
        }

        pub fn open<T: DeviceTransport>(&mut self, transport: &mut T, device: DeviceId, baud: u32) -> KernelResult<()> {
            baud_divisor(baud)?;
            let dcb = &mut self.dcbs[device.index()];
            if dcb.allocated {
                return Err(KernelError::Busy);
            }
            transport.open(device, baud)?;
            dcb.reset();
            dcb.allocated = true;
            dcb.baud = baud;
            debug!(%device, baud, "device opened");
            Ok(())
        }

        pub fn close<T: DeviceTransport>(&mut self, transport: &mut T, device: DeviceId) -> KernelResult<()> {
            let dcb = &mut self.dcbs[device.index()];
            if !dcb.allocated {
                return Err(KernelError::NotFound);
            }
            // a finished transfer still owes its owner a wake.
            if dcb.in_flight.is_some() || !dcb.completions.is_empty() {
                return Err(KernelError::Busy);
            }
            transport.close(device);
            dcb.reset();
            dcb.allocated = false;
            debug!(%device, "device closed");
            Ok(())
        }

        /// Entry point for READ/WRITE on behalf of `caller`.
        ///
        /// `stack` is the caller's own region; the buffer must lie inside
        /// it. the DCB is only touched with the port's interrupt masked.
        #[allow(clippy::too_many_arguments)]
        pub fn request<T: DeviceTransport>(
            &mut self,
            transport: &mut T,
            memory: &mut PhysMemory,
            caller: PcbHandle,
            stack: &Region,
            op: IoOp,
            device: DeviceId,
            buffer: UserBuffer,
            length: usize,
        ) -> IoReply {
            if !self.dcbs[device.index()].allocated {
                warn!(%device, "io request on closed device");
                return IoReply::of(IoOutcome::InvalidParams);
            }
            if buffer.is_empty() || length == 0 || length > buffer.size || !stack.contains(buffer.addr, length) {
                warn!(%device, ?buffer, length, "io request with bad buffer");
                return IoReply::of(IoOutcome::InvalidParams);
            }

            with_irq_masked(transport, device, |transport| {
                let dcb = &mut self.dcbs[device.index()];
                if dcb.in_flight.is_some() {
                    if !dcb.busy_waiters.contains(&caller) {
                        dcb.busy_waiters.push(caller);
                    }
                    return IoReply::of(IoOutcome::DeviceBusy);
                }
                match op {
                    IoOp::Read => start_read(dcb, memory, self.terminator, caller, stack, buffer, length),
                    IoOp::Write => start_write(dcb, transport, memory, caller, stack, buffer, length),
                }
            })
        }

        /// Interrupt service for one port: one byte in or one byte out per call.
        pub fn handle_interrupt<T: DeviceTransport>(&mut self, transport: &mut T, memory: &mut PhysMemory, device: DeviceId) {
            let terminator = self.terminator;
            let dcb = &mut self.dcbs[device.index()];

            if !dcb.allocated {
                // stray interrupt from a port nobody opened.
                while transport.recv(device).is_some() {}
                transport.set_tx_interrupt(device, false);
                return;
            }

            let status = transport.poll_status(device);
            if status.data_ready() {
                if let Some(byte) = transport.recv(device) {
                    on_input(dcb, memory, terminator, byte);
                }
                return;
            }
            if status.transmit_empty() {
                on_output_ready(dcb, transport, memory);
            }
        }

        /// first raised completion flag in device order, cleared as it is taken.
        pub fn take_completion(&mut self) -> Option<Completion> {
            self.dcbs
                .iter_mut()
                .find_map(|dcb| dcb.completions.pop_front())
        }

        /// drop all DCB state naming `owner` ahead of releasing its memory.
        pub fn cancel<T: DeviceTransport>(&mut self, transport: &mut T, owner: PcbHandle) {
            for dcb in self.dcbs.iter_mut() {
                let device = dcb.device();
                let dropped = with_irq_masked(transport, device, |transport| {
                    let dropped = dcb.forget(owner);
                    if dropped && dcb.in_flight.is_none() {
                        transport.set_tx_interrupt(device, false);
                    }
                    dropped
                });
                if dropped {
                    debug!(%device, "in-flight transfer dropped with its owner");
                }
            }
        }

        /// synchronous polled output for kernel diagnostics. refuses to
        /// interleave with an interrupt-driven transfer.
        pub fn poll_write<T: DeviceTransport>(&mut self, transport: &mut T, device: DeviceId, bytes: &[u8]) -> KernelResult<usize> {
            let dcb = &self.dcbs[device.index()];
            if !dcb.allocated {
                return Err(ValidationError::InvalidDevice.into());
            }
            if dcb.in_flight.is_some() {
                return Err(KernelError::Busy);
            }
            for byte in bytes {
                transport.send(device, *byte);
            }
            Ok(bytes.len())
        }
    }

    // drain the ring into the caller's buffer; park the rest on the DCB.
    fn start_read(
        dcb: &mut Dcb,
        memory: &mut PhysMemory,
        terminator: u8,
        caller: PcbHandle,
        stack: &Region,
        buffer: UserBuffer,
        length: usize,
    ) -> IoReply {
        let mut bytes = Vec::with_capacity(length);
        let mut terminated = false;
        while bytes.len() < length {
            let Some(byte) = dcb.ring.pop() else {
                break;
            };
            bytes.push(byte);
            if byte == terminator {
                terminated = true;
                break;
            }
        }

        if memory.write_bytes(stack, buffer.addr, &bytes).is_err() {
            return IoReply::of(IoOutcome::InvalidParams);
        }

        if terminated || bytes.len() == length {
            return IoReply {
                outcome: IoOutcome::Serviced,
                transferred: bytes.len(),
            };
        }

        dcb.in_flight = Some(Transfer {
            op: IoOp::Read,
            owner: caller,
            buffer,
            requested: length,
            completed: bytes.len(),
            target: stack.clone(),
        });
        IoReply {
            outcome: IoOutcome::PartiallyServiced,
            transferred: bytes.len(),
        }
    }

    // first byte goes out now, the rest one per transmit interrupt.
    fn start_write<T: DeviceTransport>(
        dcb: &mut Dcb,
        transport: &mut T,
        memory: &mut PhysMemory,
        caller: PcbHandle,
        stack: &Region,
        buffer: UserBuffer,
        length: usize,
    ) -> IoReply {
        let device = dcb.device();
        let first = match memory.read_u8(stack, buffer.addr) {
            Ok(byte) => byte,
            Err(_) => return IoReply::of(IoOutcome::InvalidParams),
        };
        transport.send(device, first);

        dcb.in_flight = Some(Transfer {
            op: IoOp::Write,
            owner: caller,
            buffer,
            requested: length,
            completed: 1,
            target: stack.clone(),
        });
        transport.set_tx_interrupt(device, true);
        IoReply {
            outcome: IoOutcome::PartiallyServiced,
            transferred: 1,
        }
    }

    fn on_input(dcb: &mut Dcb, memory: &mut PhysMemory, terminator: u8, byte: u8) {
        let byte = if byte == b'\r' { terminator } else { byte };
        let device = dcb.device();

        let done = match dcb.in_flight.as_mut() {
            Some(transfer) if transfer.op == IoOp::Read => {
                let addr = transfer.buffer.addr + transfer.completed as u32;
                match memory.write_u8(&transfer.target, addr, byte) {
                    Ok(()) => {
                        transfer.completed += 1;
                        trace!(%device, byte, completed = transfer.completed, "read byte");
                        byte == terminator || transfer.completed >= transfer.requested
                    }
                    Err(err) => {
                        warn!(%device, %err, "read target unwritable, ending transfer");
                        true
                    }
                }
            }
            _ => {
                if !dcb.ring.push(byte) {
                    dcb.dropped += 1;
                    warn!(%device, byte, "ring buffer full, byte dropped");
                }
                false
            }
        };

        if done {
            dcb.finish();
        }
    }

    fn on_output_ready<T: DeviceTransport>(dcb: &mut Dcb, transport: &mut T, memory: &mut PhysMemory) {
        let device = dcb.device();
        let Some(transfer) = dcb
            .in_flight
            .as_mut()
            .filter(|transfer| transfer.op == IoOp::Write)
        else {
            // nothing left to send; stop asking for transmit interrupts.
            transport.set_tx_interrupt(device, false);
            return;
        };

        if transfer.completed < transfer.requested {
            let addr = transfer.buffer.addr + transfer.completed as u32;
            match memory.read_u8(&transfer.target, addr) {
                Ok(byte) => {
                    transport.send(device, byte);
                    transfer.completed += 1;
                    trace!(%device, byte, completed = transfer.completed, "wrote byte");
                }
                Err(err) => {
                    warn!(%device, %err, "write source unreadable, ending transfer");
                    transfer.requested = transfer.completed;
                }
            }
        }

        if transfer.completed >= transfer.requested {
            transport.set_tx_interrupt(device, false);
            dcb.finish();
        }
    }
}
