pub mod config;
pub mod context;
pub mod dcb;
pub mod device;
pub mod error;
pub mod io;
pub mod kernel;
pub mod memory;
pub mod ordered_list;
pub mod pcb;
pub mod registry;
pub mod syscall;
