pub mod context {
    pub const KERNEL_CODE_SEGMENT: u32 = 0x08;
    pub const KERNEL_DATA_SEGMENT: u32 = 0x10;
    // interrupt flag plus the always-set reserved bit.
    pub const INITIAL_EFLAGS: u32 = 0x0202;

    /// Saved register file of a process that is not running.
    ///
    /// the kernel never interprets it beyond building the initial frame;
    /// dispatch hands it back verbatim when the owner is resumed.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Context {
        pub gs: u32,
        pub fs: u32,
        pub es: u32,
        pub ds: u32,
        pub ss: u32,
        pub edi: u32,
        pub esi: u32,
        pub ebp: u32,
        pub esp: u32,
        pub ebx: u32,
        pub edx: u32,
        pub ecx: u32,
        pub eax: u32,
        pub eip: u32,
        pub cs: u32,
        pub eflags: u32,
    }

    impl Context {
        /// frame for a process that has never run: flat segments, stack at
        /// the top of its region, execution starting at `entry`.
        pub fn initial(entry: u32, stack_top: u32) -> Context {
            Context {
                gs: KERNEL_DATA_SEGMENT,
                fs: KERNEL_DATA_SEGMENT,
                es: KERNEL_DATA_SEGMENT,
                ds: KERNEL_DATA_SEGMENT,
                ss: KERNEL_DATA_SEGMENT,
                ebp: stack_top,
                esp: stack_top,
                eip: entry,
                cs: KERNEL_CODE_SEGMENT,
                eflags: INITIAL_EFLAGS,
                ..Context::default()
            }
        }
    }
}
