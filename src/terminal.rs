pub mod terminal {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};

    use parking_lot::Mutex;
    use tracing::{debug, warn};

    use mpx_core::device::device::{
        baud_divisor, DeviceId, DeviceTransport, LineStatus, LSR_DATA_READY, LSR_TRANSMIT_EMPTY,
    };
    use mpx_core::error::error::KernelResult;

    #[derive(Copy, Clone, Default)]
    struct PortState {
        open: bool,
        tx_interrupt: bool,
        masked: bool,
    }

    /// Serial ports backed by the host process. the console port reads
    /// stdin on a helper thread and writes straight to stdout; the other
    /// ports open fine but never carry data.
    pub struct HostTerminal {
        console: DeviceId,
        ports: [PortState; 4],
        rx: Arc<Mutex<VecDeque<u8>>>,
        hung_up: Arc<AtomicBool>,
        reader: Option<JoinHandle<()>>,
    }

    impl HostTerminal {
        pub fn new(console: DeviceId) -> HostTerminal {
            HostTerminal {
                console,
                ports: [PortState::default(); 4],
                rx: Arc::new(Mutex::new(VecDeque::new())),
                hung_up: Arc::new(AtomicBool::new(false)),
                reader: None,
            }
        }

        pub fn console(&self) -> DeviceId {
            self.console
        }

        /// stdin reached end of file and every byte it produced was consumed.
        pub fn hung_up(&self) -> bool {
            self.hung_up.load(Ordering::Acquire) && self.rx.lock().is_empty()
        }

        fn start_reader(&mut self) {
            if self.reader.is_some() {
                return;
            }
            let rx = Arc::clone(&self.rx);
            let hung_up = Arc::clone(&self.hung_up);
            self.reader = Some(thread::spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; 256];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => rx.lock().extend(&buf[..n]),
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            warn!(%err, "console read failed");
                            break;
                        }
                    }
                }
                debug!("console input closed");
                hung_up.store(true, Ordering::Release);
            }));
        }
    }

    impl DeviceTransport for HostTerminal {
        fn open(&mut self, device: DeviceId, baud: u32) -> KernelResult<()> {
            baud_divisor(baud)?;
            self.ports[device.index()] = PortState {
                open: true,
                ..PortState::default()
            };
            if device == self.console {
                self.start_reader();
            }
            Ok(())
        }

        fn close(&mut self, device: DeviceId) {
            self.ports[device.index()] = PortState::default();
        }

        fn send(&mut self, device: DeviceId, byte: u8) {
            if device != self.console {
                return;
            }
            let mut out = io::stdout().lock();
            if let Err(err) = out.write_all(&[byte]).and_then(|()| out.flush()) {
                warn!(%err, "console write failed");
            }
        }

        fn poll_status(&self, device: DeviceId) -> LineStatus {
            let mut lsr = LSR_TRANSMIT_EMPTY;
            if device == self.console && !self.rx.lock().is_empty() {
                lsr |= LSR_DATA_READY;
            }
            LineStatus(lsr)
        }

        fn recv(&mut self, device: DeviceId) -> Option<u8> {
            if device != self.console {
                return None;
            }
            self.rx.lock().pop_front()
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
            let port = self.ports[device.index()];
            if !port.open || port.masked {
                return false;
            }
            port.tx_interrupt || self.poll_status(device).data_ready()
        }
    }
}
