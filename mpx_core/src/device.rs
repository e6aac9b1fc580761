pub mod device {
    use std::collections::VecDeque;
    use std::fmt;

    use crate::error::error::{KernelResult, ValidationError};

    pub const UART_CLOCK: u32 = 115200;

    // line status register bits.
    pub const LSR_DATA_READY: u8 = 0x01;
    pub const LSR_TRANSMIT_EMPTY: u8 = 0x20;

    /// The four legacy serial ports.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum DeviceId {
        Com1,
        Com2,
        Com3,
        Com4,
    }

    impl DeviceId {
        pub const ALL: [DeviceId; 4] = [DeviceId::Com1, DeviceId::Com2, DeviceId::Com3, DeviceId::Com4];

        pub fn index(self) -> usize {
            match self {
                DeviceId::Com1 => 0,
                DeviceId::Com2 => 1,
                DeviceId::Com3 => 2,
                DeviceId::Com4 => 3,
            }
        }

        pub fn port(self) -> u16 {
            match self {
                DeviceId::Com1 => 0x3f8,
                DeviceId::Com2 => 0x2f8,
                DeviceId::Com3 => 0x3e8,
                DeviceId::Com4 => 0x2e8,
            }
        }

        pub fn from_port(port: u16) -> KernelResult<DeviceId> {
            DeviceId::ALL
                .into_iter()
                .find(|dev| dev.port() == port)
                .ok_or(ValidationError::InvalidDevice.into())
        }
    }

    impl fmt::Display for DeviceId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "COM{}", self.index() + 1)
        }
    }

    /// Snapshot of a port's line status register.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LineStatus(pub u8);

    impl LineStatus {
        pub fn data_ready(self) -> bool {
            self.0 & LSR_DATA_READY != 0
        }

        pub fn transmit_empty(self) -> bool {
            self.0 & LSR_TRANSMIT_EMPTY != 0
        }
    }

    /// Hardware-facing byte transport the interrupt handler and the I/O
    /// façade drive. one implementation per platform; the kernel only ever
    /// talks to ports through this surface.
    pub trait DeviceTransport {
        /// program the port's line settings and enable its receive interrupt.
        fn open(&mut self, device: DeviceId, baud: u32) -> KernelResult<()>;
        fn close(&mut self, device: DeviceId);
        fn send(&mut self, device: DeviceId, byte: u8);
        fn poll_status(&self, device: DeviceId) -> LineStatus;
        fn recv(&mut self, device: DeviceId) -> Option<u8>;
        /// toggle the "transmitter ready for more" interrupt.
        fn set_tx_interrupt(&mut self, device: DeviceId, enabled: bool);
        fn mask_irq(&mut self, device: DeviceId);
        fn unmask_irq(&mut self, device: DeviceId);
        /// true when the port would raise an interrupt right now.
        fn irq_pending(&self, device: DeviceId) -> bool;
    }

    pub fn baud_divisor(baud: u32) -> KernelResult<u16> {
        if baud == 0 || baud > UART_CLOCK || UART_CLOCK % baud != 0 {
            return Err(ValidationError::InvalidBaudRate.into());
        }
        Ok((UART_CLOCK / baud) as u16)
    }

    #[derive(Default)]
    struct VirtualPort {
        open: bool,
        divisor: u16,
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        tx_interrupt: bool,
        masked: bool,
    }

    /// In-memory UART bank. bytes fed from the host side show up as
    /// received data; sent bytes are captured per port. the transmitter is
    /// always ready, so an enabled tx interrupt fires on every poll.
    #[derive(Default)]
    pub struct VirtualUart {
        ports: [VirtualPort; 4],
    }

    impl VirtualUart {
        pub fn new() -> VirtualUart {
            VirtualUart::default()
        }

        pub fn feed(&mut self, device: DeviceId, bytes: &[u8]) {
            self.ports[device.index()].rx.extend(bytes.iter().copied());
        }

        pub fn output(&self, device: DeviceId) -> &[u8] {
            &self.ports[device.index()].tx
        }

        pub fn take_output(&mut self, device: DeviceId) -> Vec<u8> {
            std::mem::take(&mut self.ports[device.index()].tx)
        }

        pub fn pending_input(&self, device: DeviceId) -> usize {
            self.ports[device.index()].rx.len()
        }

        pub fn tx_interrupt_enabled(&self, device: DeviceId) -> bool {
            self.ports[device.index()].tx_interrupt
        }

        pub fn is_masked(&self, device: DeviceId) -> bool {
            self.ports[device.index()].masked
        }

        pub fn divisor(&self, device: DeviceId) -> u16 {
            self.ports[device.index()].divisor
        }
    }

    impl DeviceTransport for VirtualUart {
        fn open(&mut self, device: DeviceId, baud: u32) -> KernelResult<()> {
            let divisor = baud_divisor(baud)?;
            let port = &mut self.ports[device.index()];
            port.open = true;
            port.divisor = divisor;
            port.tx_interrupt = false;
            port.masked = false;
            Ok(())
        }

        fn close(&mut self, device: DeviceId) {
            let port = &mut self.ports[device.index()];
            port.open = false;
            port.tx_interrupt = false;
        }

        fn send(&mut self, device: DeviceId, byte: u8) {
            self.ports[device.index()].tx.push(byte);
        }

        fn poll_status(&self, device: DeviceId) -> LineStatus {
            let port = &self.ports[device.index()];
            let mut lsr = LSR_TRANSMIT_EMPTY;
            if !port.rx.is_empty() {
                lsr |= LSR_DATA_READY;
            }
            LineStatus(lsr)
        }

        fn recv(&mut self, device: DeviceId) -> Option<u8> {
            self.ports[device.index()].rx.pop_front()
        }

        fn set_tx_interrupt(&mut self, device: DeviceId, enabled: bool) {
            self.ports[device.index()].tx_interrupt = enabled;
        }

        fn mask_irq(&mut self, device: DeviceId) {
            self.ports[device.index()].masked = true;
        }

        fn unmask_irq(&mut self, device: DeviceId) {
            self.ports[device.index()].masked = false;
        }

        fn irq_pending(&self, device: DeviceId) -> bool {
            let port = &self.ports[device.index()];
            port.open && !port.masked && (!port.rx.is_empty() || port.tx_interrupt)
        }
    }
}
