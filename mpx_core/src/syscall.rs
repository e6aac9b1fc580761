pub mod syscall {
    use crate::device::device::DeviceId;

    // raw op codes as pushed by the user-side request stub.
    pub const OP_EXIT: u32 = 0;
    pub const OP_IDLE: u32 = 1;
    pub const OP_SHUTDOWN: u32 = 2;
    pub const OP_READ: u32 = 3;
    pub const OP_WRITE: u32 = 4;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum IoOp {
        Read,
        Write,
    }

    /// Result of handing a READ/WRITE to the device layer.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum IoOutcome {
        InvalidParams,
        Serviced,
        PartiallyServiced,
        DeviceBusy,
    }

    impl IoOutcome {
        /// the caller has to give up the cpu until a completion wakes it.
        pub fn blocks(self) -> bool {
            matches!(self, IoOutcome::PartiallyServiced | IoOutcome::DeviceBusy)
        }
    }

    /// Final word on a request, left on the PCB for the process to collect.
    ///
    /// a DeviceBusy completion means the device freed up and the request
    /// should be issued again.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct IoCompletion {
        pub op: IoOp,
        pub device: DeviceId,
        pub outcome: IoOutcome,
        pub transferred: usize,
    }

    /// A byte range inside the calling process's own stack region.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct UserBuffer {
        pub addr: u32,
        pub size: usize,
    }

    impl UserBuffer {
        pub fn new(addr: u32, size: usize) -> UserBuffer {
            UserBuffer { addr, size }
        }

        pub fn is_empty(&self) -> bool {
            self.size == 0
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum SysRequest {
        Idle,
        Exit,
        Shutdown,
        Read {
            device: DeviceId,
            buffer: UserBuffer,
            length: usize,
        },
        Write {
            device: DeviceId,
            buffer: UserBuffer,
            length: usize,
        },
    }

    impl SysRequest {
        /// decode a raw request: op code plus `[port, buffer addr, buffer size, length]`.
        /// anything unrecognised decodes to None and is treated as a no-op.
        pub fn decode(op: u32, args: [u32; 4]) -> Option<SysRequest> {
            let [port, addr, size, length] = args;
            let io_parts = || {
                let device = DeviceId::from_port(u16::try_from(port).ok()?).ok()?;
                Some((device, UserBuffer::new(addr, size as usize), length as usize))
            };
            match op {
                OP_EXIT => Some(SysRequest::Exit),
                OP_IDLE => Some(SysRequest::Idle),
                OP_SHUTDOWN => Some(SysRequest::Shutdown),
                OP_READ => io_parts().map(|(device, buffer, length)| SysRequest::Read {
                    device,
                    buffer,
                    length,
                }),
                OP_WRITE => io_parts().map(|(device, buffer, length)| SysRequest::Write {
                    device,
                    buffer,
                    length,
                }),
                _ => None,
            }
        }

        pub fn op_code(&self) -> u32 {
            match self {
                SysRequest::Exit => OP_EXIT,
                SysRequest::Idle => OP_IDLE,
                SysRequest::Shutdown => OP_SHUTDOWN,
                SysRequest::Read { .. } => OP_READ,
                SysRequest::Write { .. } => OP_WRITE,
            }
        }
    }
}
