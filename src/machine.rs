pub mod machine {
    use std::collections::HashMap;
    use std::thread;
    use std::time::Duration;

    use tracing::{debug, info};

    use mpx_core::context::context::Context;
    use mpx_core::device::device::{DeviceId, DeviceTransport};
    use mpx_core::error::error::KernelResult;
    use mpx_core::kernel::kernel::Kernel;
    use mpx_core::pcb::pcb::{PcbClass, PcbHandle};
    use mpx_core::registry::registry::MAX_PRIORITY;
    use mpx_core::syscall::syscall::SysRequest;

    use crate::programs::programs::{instantiate, Env, Program, ENTRY_COMHAND, ENTRY_IDLE};

    pub const COMHAND_NAME: &str = "comhand";
    pub const IDLE_NAME: &str = "idle";

    // entry of the boot thread itself, handed to the first dispatch.
    const BOOT_EIP: u32 = 0xb007;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum MachineExit {
        /// control came back to the boot context with no process left.
        Shutdown,
        /// the stop predicate fired at a quiet point.
        Stopped,
    }

    /// Runs simulated processes on a kernel, one system request at a time,
    /// delivering device interrupts between steps.
    pub struct Machine<T: DeviceTransport> {
        kernel: Kernel<T>,
        programs: HashMap<PcbHandle, Box<dyn Program<T>>>,
        console: DeviceId,
        idle_sleep: Duration,
        idle: Option<PcbHandle>,
        current: Context,
    }

    impl<T: DeviceTransport + 'static> Machine<T> {
        pub fn new(kernel: Kernel<T>, console: DeviceId) -> Machine<T> {
            Machine {
                kernel,
                programs: HashMap::new(),
                console,
                idle_sleep: Duration::ZERO,
                idle: None,
                current: Context {
                    eip: BOOT_EIP,
                    ..Context::default()
                },
            }
        }

        /// pause taken whenever the idle process is all that runs.
        pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Machine<T> {
            self.idle_sleep = idle_sleep;
            self
        }

        pub fn kernel(&self) -> &Kernel<T> {
            &self.kernel
        }

        pub fn kernel_mut(&mut self) -> &mut Kernel<T> {
            &mut self.kernel
        }

        /// open the console and start the system processes: the command
        /// handler and the idle process.
        pub fn boot(&mut self, baud: u32) -> KernelResult<()> {
            self.kernel.open_device(self.console, baud)?;
            self.kernel
                .spawn(COMHAND_NAME, PcbClass::System, 0, ENTRY_COMHAND)?;
            let idle = self
                .kernel
                .spawn(IDLE_NAME, PcbClass::System, MAX_PRIORITY, ENTRY_IDLE)?;
            self.idle = Some(idle);
            info!(console = %self.console, baud, "system processes started");
            Ok(())
        }

        /// drive the kernel until everything has exited or `stop` says so.
        pub fn run<F>(&mut self, mut stop: F) -> MachineExit
        where
            F: FnMut(&Kernel<T>) -> bool,
        {
            loop {
                let interrupts = self.kernel.service_interrupts();
                self.adopt_new_processes();

                let before = self.kernel.active();
                let request = match before {
                    Some(handle) => self.step(handle),
                    None => {
                        if self.kernel.registry().is_empty() {
                            info!("no processes left");
                            return MachineExit::Shutdown;
                        }
                        SysRequest::Idle
                    }
                };

                self.current = self.kernel.dispatch(request, self.current);
                let after = self.kernel.active();

                if request == SysRequest::Shutdown && after.is_none() && self.kernel.registry().is_empty() {
                    return MachineExit::Shutdown;
                }
                // a yield with no device activity is the only point where
                // nothing is half done.
                if request != SysRequest::Idle || interrupts > 0 {
                    continue;
                }
                if stop(&self.kernel) {
                    return MachineExit::Stopped;
                }
                let halted = after.is_none() || after == self.idle;
                if halted && before == after && !self.idle_sleep.is_zero() {
                    thread::sleep(self.idle_sleep);
                }
            }
        }

        // run the active program up to its next system request.
        fn step(&mut self, handle: PcbHandle) -> SysRequest {
            let Some(program) = self.programs.get_mut(&handle) else {
                return SysRequest::Exit;
            };
            let mut env = Env {
                kernel: &mut self.kernel,
                handle,
            };
            program.resume(&mut env)
        }

        // give every new PCB its program and drop the ones whose PCB is gone.
        fn adopt_new_processes(&mut self) {
            let kernel = &self.kernel;
            self.programs.retain(|handle, _| kernel.pcb(*handle).is_some());
            for (handle, pcb) in self.kernel.registry().iter() {
                if self.programs.contains_key(&handle) {
                    continue;
                }
                let entry = pcb.context().eip;
                debug!(name = pcb.name(), entry, "loading program");
                self.programs
                    .insert(handle, instantiate(entry, self.console));
            }
        }
    }
}
