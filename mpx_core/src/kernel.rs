pub mod kernel {
    use std::collections::VecDeque;

    use tracing::{debug, info, warn};

    use crate::config::config::KernelConfig;
    use crate::context::context::Context;
    use crate::device::device::{DeviceId, DeviceTransport};
    use crate::error::error::{KernelError, KernelResult, ValidationError};
    use crate::io::io::IoSystem;
    use crate::memory::memory::PhysMemory;
    use crate::pcb::pcb::{DispatchState, ExecState, Pcb, PcbClass, PcbHandle};
    use crate::registry::registry::{Registry, MAX_PRIORITY};
    use crate::syscall::syscall::{IoCompletion, IoOp, IoOutcome, SysRequest, UserBuffer};

    /// All kernel state: process registry, device table, page pool, the
    /// running PCB and the bootstrap context captured on first dispatch.
    pub struct Kernel<T: DeviceTransport> {
        config: KernelConfig,
        memory: PhysMemory,
        registry: Registry,
        io: IoSystem,
        transport: T,
        active: Option<PcbHandle>,
        bootstrap: Option<Context>,
        // completed owners noticed by check_completed, not yet switched to.
        pending_wake: VecDeque<PcbHandle>,
    }

    impl<T: DeviceTransport> Kernel<T> {
        pub fn new(config: KernelConfig, transport: T) -> Kernel<T> {
            let config = config.normalized();
            Kernel {
                memory: PhysMemory::new(config.phys_pages),
                registry: Registry::new(config.max_name_len),
                io: IoSystem::new(config.ring_capacity, config.line_terminator),
                transport,
                active: None,
                bootstrap: None,
                pending_wake: VecDeque::new(),
                config,
            }
        }

        pub fn config(&self) -> &KernelConfig {
            &self.config
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        pub fn memory(&self) -> &PhysMemory {
            &self.memory
        }

        pub fn io(&self) -> &IoSystem {
            &self.io
        }

        pub fn transport(&self) -> &T {
            &self.transport
        }

        pub fn transport_mut(&mut self) -> &mut T {
            &mut self.transport
        }

        pub fn active(&self) -> Option<PcbHandle> {
            self.active
        }

        pub fn active_pcb(&self) -> Option<&Pcb> {
            self.active.and_then(|h| self.registry.get(h))
        }

        pub fn bootstrap_context(&self) -> Option<Context> {
            self.bootstrap
        }

        pub fn pcb(&self, handle: PcbHandle) -> Option<&Pcb> {
            self.registry.get(handle)
        }

        pub fn find(&self, name: &str) -> Option<PcbHandle> {
            self.registry.find(name)
        }

        // ---- process setup ----

        /// validate and allocate a PCB; it is not queued.
        pub fn pcb_setup(&mut self, name: &str, class: PcbClass, priority: i32) -> KernelResult<PcbHandle> {
            self.registry
                .create(&mut self.memory, name, class, priority, self.config.stack_pages)
        }

        pub fn insert(&mut self, handle: PcbHandle) -> bool {
            self.registry.insert(handle)
        }

        pub fn remove(&mut self, handle: PcbHandle) -> bool {
            self.registry.remove(handle)
        }

        /// setup + initial frame at `entry` + enqueue.
        pub fn spawn(&mut self, name: &str, class: PcbClass, priority: i32, entry: u32) -> KernelResult<PcbHandle> {
            let handle = self.pcb_setup(name, class, priority)?;
            self.registry.update(handle, |pcb| {
                pcb.context = Context::initial(entry, pcb.stack.len() as u32);
            })?;
            self.registry.insert(handle);
            info!(name, ?class, priority, entry, "process spawned");
            Ok(handle)
        }

        // ---- administrative commands ----

        fn lookup(&self, name: &str) -> KernelResult<PcbHandle> {
            self.registry.find(name).ok_or(KernelError::NotFound)
        }

        fn class_of(&self, handle: PcbHandle) -> KernelResult<PcbClass> {
            self.registry
                .get(handle)
                .map(|pcb| pcb.class())
                .ok_or(KernelError::NotFound)
        }

        pub fn delete(&mut self, name: &str) -> KernelResult<()> {
            let handle = self.lookup(name)?;
            if self.class_of(handle)? == PcbClass::System {
                return Err(KernelError::Unauthorized);
            }
            if self.active == Some(handle) {
                return Err(KernelError::Busy);
            }
            self.terminate(handle);
            Ok(())
        }

        pub fn block(&mut self, name: &str) -> KernelResult<()> {
            self.set_exec_state(name, ExecState::Blocked)
        }

        pub fn unblock(&mut self, name: &str) -> KernelResult<()> {
            self.set_exec_state(name, ExecState::Ready)
        }

        fn set_exec_state(&mut self, name: &str, state: ExecState) -> KernelResult<()> {
            let handle = self.lookup(name)?;
            if self.active == Some(handle) {
                return Err(KernelError::Busy);
            }
            self.registry.update(handle, |pcb| pcb.exec_state = state)
        }

        pub fn suspend(&mut self, name: &str) -> KernelResult<()> {
            self.set_dispatch_state(name, DispatchState::Suspended)
        }

        pub fn resume(&mut self, name: &str) -> KernelResult<()> {
            self.set_dispatch_state(name, DispatchState::NotSuspended)
        }

        fn set_dispatch_state(&mut self, name: &str, state: DispatchState) -> KernelResult<()> {
            let handle = self.lookup(name)?;
            if self.class_of(handle)? == PcbClass::System {
                return Err(KernelError::Unauthorized);
            }
            if self.active == Some(handle) {
                return Err(KernelError::Busy);
            }
            self.registry.update(handle, |pcb| pcb.dispatch_state = state)
        }

        pub fn set_priority(&mut self, name: &str, priority: i32) -> KernelResult<()> {
            if !(0..=MAX_PRIORITY).contains(&priority) {
                return Err(ValidationError::InvalidPriority.into());
            }
            let handle = self.lookup(name)?;
            self.registry
                .update(handle, |pcb| pcb.set_priority(priority as u8))
        }

        // ---- devices ----

        pub fn open_device(&mut self, device: DeviceId, baud: u32) -> KernelResult<()> {
            self.io.open(&mut self.transport, device, baud)
        }

        pub fn close_device(&mut self, device: DeviceId) -> KernelResult<()> {
            self.io.close(&mut self.transport, device)
        }

        /// polled console output, bypassing the interrupt path.
        pub fn console_write(&mut self, device: DeviceId, bytes: &[u8]) -> KernelResult<usize> {
            self.io.poll_write(&mut self.transport, device, bytes)
        }

        /// the asynchronous path: run the handler for one port event.
        pub fn handle_interrupt(&mut self, device: DeviceId) {
            self.io
                .handle_interrupt(&mut self.transport, &mut self.memory, device);
        }

        /// deliver every interrupt the ports currently have pending.
        pub fn service_interrupts(&mut self) -> usize {
            let mut handled = 0;
            for device in DeviceId::ALL {
                while self.transport.irq_pending(device) {
                    self.handle_interrupt(device);
                    handled += 1;
                }
            }
            handled
        }

        /// Façade for READ/WRITE on behalf of `caller`. a synchronous
        /// outcome is recorded on the PCB right away; blocking ones get
        /// their record when the transfer completes.
        pub fn io_request(
            &mut self,
            caller: PcbHandle,
            op: IoOp,
            device: DeviceId,
            buffer: UserBuffer,
            length: usize,
        ) -> IoOutcome {
            let Some(stack) = self.registry.get(caller).map(|pcb| pcb.stack.clone()) else {
                return IoOutcome::InvalidParams;
            };
            let reply = self.io.request(
                &mut self.transport,
                &mut self.memory,
                caller,
                &stack,
                op,
                device,
                buffer,
                length,
            );
            if !reply.outcome.blocks() {
                if let Some(pcb) = self.registry.get_mut(caller) {
                    pcb.last_io = Some(IoCompletion {
                        op,
                        device,
                        outcome: reply.outcome,
                        transferred: reply.transferred,
                    });
                }
            }
            debug!(?op, %device, outcome = ?reply.outcome, "io request");
            reply.outcome
        }

        /// Pick up the next raised completion flag.
        ///
        /// the owner's result is recorded and any process that bounced off
        /// the busy device is made ready to retry. the owner itself is
        /// returned and remembered so the next dispatch switches to it.
        pub fn check_completed(&mut self) -> Option<PcbHandle> {
            while let Some(completion) = self.io.take_completion() {
                for waiter in completion.waiters {
                    let _ = self.registry.update(waiter, |pcb| {
                        pcb.last_io = Some(IoCompletion {
                            outcome: IoOutcome::DeviceBusy,
                            transferred: 0,
                            ..completion.result
                        });
                        if pcb.exec_state == ExecState::Blocked {
                            pcb.exec_state = ExecState::Ready;
                        }
                    });
                }

                let owner = completion.owner;
                let Some(pcb) = self.registry.get_mut(owner) else {
                    continue;
                };
                pcb.last_io = Some(completion.result);
                debug!(name = pcb.name(), transferred = completion.result.transferred, "io completed");
                if !self.pending_wake.contains(&owner) {
                    self.pending_wake.push_back(owner);
                }
                return Some(owner);
            }
            None
        }

        pub fn take_io_result(&mut self, handle: PcbHandle) -> Option<IoCompletion> {
            self.registry.get_mut(handle).and_then(|pcb| pcb.last_io.take())
        }

        pub fn read_user(&self, handle: PcbHandle, addr: u32, len: usize) -> KernelResult<Vec<u8>> {
            let pcb = self.registry.get(handle).ok_or(KernelError::NotFound)?;
            self.memory.read_bytes(&pcb.stack, addr, len)
        }

        pub fn write_user(&mut self, handle: PcbHandle, addr: u32, data: &[u8]) -> KernelResult<()> {
            let pcb = self.registry.get(handle).ok_or(KernelError::NotFound)?;
            self.memory.write_bytes(&pcb.stack, addr, data)
        }

        // ---- dispatcher ----

        /// System request entry. returns the context to load next; every
        /// malformed or refused request comes back as `ctx` unchanged.
        pub fn dispatch(&mut self, request: SysRequest, ctx: Context) -> Context {
            self.enter(Some(request), ctx)
        }

        /// raw entry: op code plus `[port, buffer addr, buffer size, length]`.
        pub fn dispatch_raw(&mut self, op: u32, args: [u32; 4], ctx: Context) -> Context {
            let request = SysRequest::decode(op, args);
            if request.is_none() {
                warn!(op, "undecodable system request");
            }
            self.enter(request, ctx)
        }

        fn enter(&mut self, request: Option<SysRequest>, ctx: Context) -> Context {
            let bootstrap = *self.bootstrap.get_or_insert(ctx);
            let caller = self.active;

            // a finished transfer outranks whatever the caller asked for.
            let mut out = ctx;
            let mut preempted = false;
            self.check_completed();
            if let Some(woken) = self.next_woken() {
                if let Some(current) = caller {
                    self.demote(current, ctx, ExecState::Ready);
                }
                out = self.promote(woken);
                preempted = true;
            }

            let Some(request) = request else {
                return out;
            };

            match request {
                SysRequest::Idle => {
                    if preempted {
                        out
                    } else {
                        self.switch_from_active(ctx, ExecState::Ready, bootstrap)
                    }
                }
                SysRequest::Exit => {
                    let Some(exiting) = caller else {
                        return out;
                    };
                    if preempted {
                        self.terminate(exiting);
                        return out;
                    }
                    self.exit_active(exiting, bootstrap)
                }
                SysRequest::Shutdown => {
                    let authorized = match caller {
                        None => true,
                        Some(h) => self
                            .registry
                            .get(h)
                            .is_some_and(|pcb| pcb.class() == PcbClass::System),
                    };
                    if !authorized {
                        warn!("shutdown refused for user process");
                        return out;
                    }
                    self.shutdown_all();
                    bootstrap
                }
                SysRequest::Read { device, buffer, length } => {
                    self.io_entry(caller, IoOp::Read, device, buffer, length, ctx, out, preempted, bootstrap)
                }
                SysRequest::Write { device, buffer, length } => {
                    self.io_entry(caller, IoOp::Write, device, buffer, length, ctx, out, preempted, bootstrap)
                }
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn io_entry(
            &mut self,
            caller: Option<PcbHandle>,
            op: IoOp,
            device: DeviceId,
            buffer: UserBuffer,
            length: usize,
            ctx: Context,
            out: Context,
            preempted: bool,
            bootstrap: Context,
        ) -> Context {
            let Some(requester) = caller else {
                warn!(?op, "io request without a running process");
                return out;
            };
            let outcome = self.io_request(requester, op, device, buffer, length);
            if !outcome.blocks() {
                return out;
            }
            if preempted {
                // already off the cpu and queued as ready; park it.
                let _ = self
                    .registry
                    .update(requester, |pcb| pcb.exec_state = ExecState::Blocked);
                return out;
            }
            self.switch_from_active(ctx, ExecState::Blocked, bootstrap)
        }

        // next completed owner that can actually run now. a woken PCB that
        // is suspended is marked ready but stays queued.
        fn next_woken(&mut self) -> Option<PcbHandle> {
            while let Some(handle) = self.pending_wake.pop_front() {
                if self.active == Some(handle) {
                    continue;
                }
                let Some(pcb) = self.registry.get(handle) else {
                    continue;
                };
                if pcb.dispatch_state() == DispatchState::Suspended {
                    let _ = self
                        .registry
                        .update(handle, |pcb| pcb.exec_state = ExecState::Ready);
                    continue;
                }
                self.registry.remove(handle);
                return Some(handle);
            }
            None
        }

        /// The IDLE swap. the active PCB (if any) leaves the cpu in
        /// `demoted` state and the queue front takes over. with nothing
        /// eligible, a yielding caller keeps running while a blocking one
        /// still parks and control falls back to the bootstrap context.
        fn switch_from_active(&mut self, ctx: Context, demoted: ExecState, bootstrap: Context) -> Context {
            let next = self
                .registry
                .peek_next()
                .filter(|h| self.registry.get(*h).is_some_and(|pcb| pcb.is_eligible()));

            let Some(next) = next else {
                if demoted == ExecState::Ready {
                    return ctx;
                }
                if let Some(current) = self.active.take() {
                    self.demote(current, ctx, demoted);
                }
                return bootstrap;
            };

            self.registry.poll_next();
            if let Some(current) = self.active.take() {
                self.demote(current, ctx, demoted);
            }
            self.promote(next)
        }

        fn exit_active(&mut self, exiting: PcbHandle, bootstrap: Context) -> Context {
            self.active = None;
            let next = self
                .registry
                .peek_next()
                .filter(|h| self.registry.get(*h).is_some_and(|pcb| pcb.is_eligible()));
            let out = match next {
                Some(next) => {
                    self.registry.poll_next();
                    self.promote(next)
                }
                None => bootstrap,
            };
            self.terminate(exiting);
            out
        }

        fn shutdown_all(&mut self) {
            while let Some(handle) = self.registry.poll_next() {
                self.terminate(handle);
            }
            if let Some(handle) = self.active.take() {
                self.terminate(handle);
            }
            self.pending_wake.clear();
            info!("all processes terminated");
        }

        fn promote(&mut self, handle: PcbHandle) -> Context {
            self.active = Some(handle);
            match self.registry.get_mut(handle) {
                Some(pcb) => {
                    pcb.exec_state = ExecState::Running;
                    debug!(name = pcb.name(), "switching to process");
                    pcb.context
                }
                None => self.bootstrap.unwrap_or_default(),
            }
        }

        fn demote(&mut self, handle: PcbHandle, ctx: Context, state: ExecState) {
            if self.active == Some(handle) {
                self.active = None;
            }
            if let Some(pcb) = self.registry.get_mut(handle) {
                pcb.context = ctx;
                pcb.exec_state = state;
            }
            self.registry.insert(handle);
        }

        // release a PCB and every reference the device layer holds to it.
        fn terminate(&mut self, handle: PcbHandle) {
            if self.active == Some(handle) {
                self.active = None;
            }
            self.io.cancel(&mut self.transport, handle);
            self.pending_wake.retain(|h| *h != handle);
            self.registry.destroy(&mut self.memory, handle);
        }
    }
}
