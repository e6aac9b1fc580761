pub mod programs {
    use tracing::{debug, warn};

    use mpx_core::device::device::{DeviceId, DeviceTransport};
    use mpx_core::error::error::KernelResult;
    use mpx_core::kernel::kernel::Kernel;
    use mpx_core::pcb::pcb::PcbHandle;
    use mpx_core::syscall::syscall::{IoCompletion, IoOutcome, SysRequest, UserBuffer};

    use crate::comhand::comhand::{CommandTable, Effect};

    // entry points stamped into a process's initial context. the machine
    // uses them to pick the program a fresh PCB runs.
    pub const ENTRY_COMHAND: u32 = 0x0001_0000;
    pub const ENTRY_IDLE: u32 = 0x0002_0000;
    pub const ENTRY_DEMO: u32 = 0x0003_0000;

    pub const DEMO_ITERATIONS: usize = 3;

    // layout of the buffers programs keep in their own stack page.
    const LINE_ADDR: u32 = 0x000;
    const LINE_SIZE: usize = 100;
    const OUT_ADDR: u32 = 0x100;
    const OUT_SIZE: usize = 0x400;

    /// What a program sees while it holds the cpu.
    pub struct Env<'a, T: DeviceTransport> {
        pub kernel: &'a mut Kernel<T>,
        pub handle: PcbHandle,
    }

    impl<T: DeviceTransport> Env<'_, T> {
        pub fn take_io_result(&mut self) -> Option<IoCompletion> {
            self.kernel.take_io_result(self.handle)
        }

        pub fn read_user(&self, addr: u32, len: usize) -> KernelResult<Vec<u8>> {
            self.kernel.read_user(self.handle, addr, len)
        }

        pub fn write_user(&mut self, addr: u32, data: &[u8]) -> KernelResult<()> {
            self.kernel.write_user(self.handle, addr, data)
        }

        pub fn name(&self) -> String {
            self.kernel
                .pcb(self.handle)
                .map(|pcb| pcb.name().to_string())
                .unwrap_or_default()
        }
    }

    /// A simulated process. `resume` runs it from its last system request
    /// up to the next one.
    pub trait Program<T: DeviceTransport> {
        fn resume(&mut self, env: &mut Env<'_, T>) -> SysRequest;
    }

    /// the program a PCB with initial `entry` runs. anything without a
    /// known entry point just yields forever.
    pub fn instantiate<T: DeviceTransport + 'static>(entry: u32, console: DeviceId) -> Box<dyn Program<T>> {
        match entry {
            ENTRY_COMHAND => Box::new(Comhand::new(console)),
            ENTRY_IDLE => Box::new(IdleProcess),
            ENTRY_DEMO => Box::new(DemoProcess::new(console)),
            _ => Box::new(Dormant),
        }
    }

    enum Settled {
        Done(IoCompletion),
        Retry(SysRequest),
    }

    // collect the result of `pending`. a busy device, or a wake without
    // any result, means the request goes out again.
    fn settle<T: DeviceTransport>(env: &mut Env<'_, T>, pending: SysRequest) -> Settled {
        match env.take_io_result() {
            Some(done) if done.outcome != IoOutcome::DeviceBusy => Settled::Done(done),
            _ => Settled::Retry(pending),
        }
    }

    /// Byte queue flushed to a device one buffer-sized WRITE at a time.
    #[derive(Default)]
    struct Output {
        bytes: Vec<u8>,
        sent: usize,
    }

    impl Output {
        fn set(&mut self, text: &str) {
            self.bytes = text.as_bytes().to_vec();
            self.sent = 0;
        }

        fn is_drained(&self) -> bool {
            self.sent >= self.bytes.len()
        }

        fn next_write<T: DeviceTransport>(&self, env: &mut Env<'_, T>, device: DeviceId) -> KernelResult<SysRequest> {
            let end = (self.sent + OUT_SIZE).min(self.bytes.len());
            let chunk = &self.bytes[self.sent..end];
            env.write_user(OUT_ADDR, chunk)?;
            Ok(SysRequest::Write {
                device,
                buffer: UserBuffer::new(OUT_ADDR, OUT_SIZE),
                length: chunk.len(),
            })
        }

        fn advance(&mut self, done: &IoCompletion) {
            if done.outcome == IoOutcome::InvalidParams {
                self.sent = self.bytes.len();
            } else {
                self.sent += done.transferred;
            }
        }
    }

    enum Phase {
        Prompt,
        Read,
        Reply,
        AwaitExit(Vec<PcbHandle>),
    }

    /// The command handler process: prompt, read a line, run it, print
    /// the reply.
    pub struct Comhand<T: DeviceTransport> {
        device: DeviceId,
        table: CommandTable<T>,
        phase: Phase,
        output: Output,
        pending: Option<SysRequest>,
        after_reply: Effect,
    }

    impl<T: DeviceTransport> Comhand<T> {
        pub fn new(device: DeviceId) -> Comhand<T> {
            let mut output = Output::default();
            output.set(PROMPT);
            Comhand {
                device,
                table: CommandTable::with_base_commands(),
                phase: Phase::Prompt,
                output,
                pending: None,
                after_reply: Effect::Continue,
            }
        }

        fn run_line(&mut self, env: &mut Env<'_, T>, len: usize) {
            let line = match env.read_user(LINE_ADDR, len) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
                Err(err) => {
                    warn!(%err, "command line unreadable");
                    String::new()
                }
            };
            debug!(line = %line, "command");
            let reply = self.table.execute(env.kernel, &line);
            let mut text = reply.text;
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            self.output.set(&text);
            self.after_reply = reply.effect;
            self.phase = Phase::Reply;
        }
    }

    const PROMPT: &str = "mpx> ";

    impl<T: DeviceTransport> Program<T> for Comhand<T> {
        fn resume(&mut self, env: &mut Env<'_, T>) -> SysRequest {
            if let Some(pending) = self.pending.take() {
                match settle(env, pending) {
                    Settled::Retry(request) => {
                        self.pending = Some(request);
                        return request;
                    }
                    Settled::Done(done) => match self.phase {
                        Phase::Read if done.outcome == IoOutcome::Serviced => {
                            self.run_line(env, done.transferred);
                        }
                        Phase::Read => {
                            warn!(device = %self.device, "console read failed, leaving");
                            return SysRequest::Exit;
                        }
                        _ => self.output.advance(&done),
                    },
                }
            }

            loop {
                match &self.phase {
                    Phase::Prompt | Phase::Reply if !self.output.is_drained() => {
                        return match self.output.next_write(env, self.device) {
                            Ok(request) => {
                                self.pending = Some(request);
                                request
                            }
                            Err(err) => {
                                warn!(%err, "reply does not fit the output buffer");
                                self.output.sent = self.output.bytes.len();
                                SysRequest::Idle
                            }
                        };
                    }
                    Phase::Prompt => {
                        self.phase = Phase::Read;
                    }
                    Phase::Read => {
                        let request = SysRequest::Read {
                            device: self.device,
                            buffer: UserBuffer::new(LINE_ADDR, LINE_SIZE),
                            length: LINE_SIZE,
                        };
                        self.pending = Some(request);
                        return request;
                    }
                    Phase::Reply => match std::mem::replace(&mut self.after_reply, Effect::Continue) {
                        Effect::Continue => {
                            self.output.set(PROMPT);
                            self.phase = Phase::Prompt;
                        }
                        Effect::Shutdown => return SysRequest::Shutdown,
                        Effect::AwaitExit(handles) => {
                            self.phase = Phase::AwaitExit(handles);
                        }
                    },
                    Phase::AwaitExit(handles) => {
                        if handles.iter().any(|h| env.kernel.pcb(*h).is_some()) {
                            return SysRequest::Idle;
                        }
                        self.output.set(PROMPT);
                        self.phase = Phase::Prompt;
                    }
                }
            }
        }
    }

    /// Lowest priority system process; keeps the cpu busy when nothing
    /// else can run.
    pub struct IdleProcess;

    impl<T: DeviceTransport> Program<T> for IdleProcess {
        fn resume(&mut self, _env: &mut Env<'_, T>) -> SysRequest {
            SysRequest::Idle
        }
    }

    /// Placeholder for PCBs created from the command line with no code
    /// behind them.
    pub struct Dormant;

    impl<T: DeviceTransport> Program<T> for Dormant {
        fn resume(&mut self, _env: &mut Env<'_, T>) -> SysRequest {
            SysRequest::Idle
        }
    }

    /// Prints a few numbered lines, yielding between them, then exits.
    pub struct DemoProcess {
        device: DeviceId,
        iteration: usize,
        output: Output,
        pending: Option<SysRequest>,
    }

    impl DemoProcess {
        pub fn new(device: DeviceId) -> DemoProcess {
            DemoProcess {
                device,
                iteration: 0,
                output: Output::default(),
                pending: None,
            }
        }
    }

    impl<T: DeviceTransport> Program<T> for DemoProcess {
        fn resume(&mut self, env: &mut Env<'_, T>) -> SysRequest {
            if let Some(pending) = self.pending.take() {
                match settle(env, pending) {
                    Settled::Retry(request) => {
                        self.pending = Some(request);
                        return request;
                    }
                    Settled::Done(done) => self.output.advance(&done),
                }
                if self.output.is_drained() {
                    // line finished; let someone else run before the next.
                    return SysRequest::Idle;
                }
            }

            if self.output.is_drained() {
                if self.iteration == DEMO_ITERATIONS {
                    return SysRequest::Exit;
                }
                self.iteration += 1;
                let line = format!("{} dispatched, iteration {}\n", env.name(), self.iteration);
                self.output.set(&line);
            }

            match self.output.next_write(env, self.device) {
                Ok(request) => {
                    self.pending = Some(request);
                    request
                }
                Err(_) => SysRequest::Exit,
            }
        }
    }
}
