pub mod config {
    use std::env;
    use std::str::FromStr;

    use tracing::warn;

    pub const PCB_MAX_NAME_LEN: usize = 8;
    pub const PCB_STACK_PAGES: u16 = 1;
    pub const PHYS_PAGE_COUNT: usize = 0x100;
    pub const RING_CAPACITY: usize = 64;
    pub const LINE_TERMINATOR: u8 = b'\n';

    /// Tunables for a kernel instance.
    ///
    /// defaults match the classic MPX layout: 8 byte names, one 4k stack
    /// page per process, newline terminated reads.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct KernelConfig {
        pub max_name_len: usize,
        pub stack_pages: u16,
        pub phys_pages: usize,
        pub ring_capacity: usize,
        pub line_terminator: u8,
    }

    impl Default for KernelConfig {
        fn default() -> KernelConfig {
            KernelConfig {
                max_name_len: PCB_MAX_NAME_LEN,
                stack_pages: PCB_STACK_PAGES,
                phys_pages: PHYS_PAGE_COUNT,
                ring_capacity: RING_CAPACITY,
                line_terminator: LINE_TERMINATOR,
            }
        }
    }

    impl KernelConfig {
        /// defaults overridden by any MPX_* variables present in the environment.
        pub fn from_env() -> KernelConfig {
            let mut config = KernelConfig::default();
            if let Some(len) = env_value::<usize>("MPX_MAX_NAME_LEN") {
                config.max_name_len = len;
            }
            if let Some(pages) = env_value::<u16>("MPX_STACK_PAGES") {
                config.stack_pages = pages;
            }
            if let Some(pages) = env_value::<usize>("MPX_PHYS_PAGES") {
                config.phys_pages = pages;
            }
            if let Some(capacity) = env_value::<usize>("MPX_RING_CAPACITY") {
                config.ring_capacity = capacity;
            }
            config.normalized()
        }

        // zero sized stacks or rings make no sense; clamp instead of failing boot.
        pub fn normalized(mut self) -> KernelConfig {
            self.stack_pages = self.stack_pages.max(1);
            self.ring_capacity = self.ring_capacity.max(1);
            self.max_name_len = self.max_name_len.max(1);
            self
        }
    }

    fn env_value<V: FromStr>(key: &str) -> Option<V> {
        let raw = env::var(key).ok()?;
        match raw.trim().parse::<V>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable config override");
                None
            }
        }
    }
}
