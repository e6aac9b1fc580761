pub mod pcb {
    use std::fmt;
    use std::str::FromStr;

    use crate::context::context::Context;
    use crate::error::error::{KernelError, ValidationError};
    use crate::memory::memory::Region;
    use crate::syscall::syscall::IoCompletion;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PcbClass {
        User,
        System,
    }

    impl TryFrom<i32> for PcbClass {
        type Error = KernelError;

        fn try_from(value: i32) -> Result<PcbClass, KernelError> {
            match value {
                0 => Ok(PcbClass::User),
                1 => Ok(PcbClass::System),
                _ => Err(ValidationError::InvalidClass.into()),
            }
        }
    }

    impl FromStr for PcbClass {
        type Err = KernelError;

        fn from_str(s: &str) -> Result<PcbClass, KernelError> {
            match s.to_ascii_lowercase().as_str() {
                "user" | "0" => Ok(PcbClass::User),
                "system" | "1" => Ok(PcbClass::System),
                _ => Err(ValidationError::InvalidClass.into()),
            }
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ExecState {
        Ready,
        Running,
        Blocked,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum DispatchState {
        NotSuspended,
        Suspended,
    }

    /// Stable reference to a PCB slot. the generation changes every time a
    /// slot is reused, so a handle to a released PCB never resolves again.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PcbHandle {
        pub(crate) index: u32,
        pub(crate) generation: u32,
    }

    pub struct Pcb {
        name: String,
        class: PcbClass,
        priority: u8,
        pub(crate) exec_state: ExecState,
        pub(crate) dispatch_state: DispatchState,
        pub(crate) stack: Region,
        // meaningful only while the process is not running.
        pub(crate) context: Context,
        pub(crate) last_io: Option<IoCompletion>,
    }

    impl Pcb {
        pub(crate) fn new(name: &str, class: PcbClass, priority: u8, stack: Region) -> Pcb {
            let context = Context::initial(0, stack.len() as u32);
            Pcb {
                name: name.to_string(),
                class,
                priority,
                exec_state: ExecState::Ready,
                dispatch_state: DispatchState::NotSuspended,
                stack,
                context,
                last_io: None,
            }
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn class(&self) -> PcbClass {
            self.class
        }

        pub fn priority(&self) -> u8 {
            self.priority
        }

        pub(crate) fn set_priority(&mut self, priority: u8) {
            self.priority = priority;
        }

        pub fn exec_state(&self) -> ExecState {
            self.exec_state
        }

        pub fn dispatch_state(&self) -> DispatchState {
            self.dispatch_state
        }

        /// may the scheduler pick this process.
        pub fn is_eligible(&self) -> bool {
            self.exec_state != ExecState::Blocked && self.dispatch_state != DispatchState::Suspended
        }

        pub fn stack(&self) -> &Region {
            &self.stack
        }

        pub fn context(&self) -> &Context {
            &self.context
        }

        pub fn last_io(&self) -> Option<&IoCompletion> {
            self.last_io.as_ref()
        }
    }

    impl fmt::Display for Pcb {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let class = match self.class {
                PcbClass::User => "user",
                PcbClass::System => "system",
            };
            let exec = match self.exec_state {
                ExecState::Ready => "ready",
                ExecState::Running => "running",
                ExecState::Blocked => "blocked",
            };
            let dispatch = match self.dispatch_state {
                DispatchState::NotSuspended => "not suspended",
                DispatchState::Suspended => "suspended",
            };
            write!(
                f,
                "{:<8} class={:<6} priority={} state={:<7} {}",
                self.name, class, self.priority, exec, dispatch
            )
        }
    }
}
