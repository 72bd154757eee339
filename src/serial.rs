use core::fmt;
use spin::Mutex;
#[cfg(not(test))]
use uart_16550::SerialPort;

/// Under `cargo test` this crate runs as an ordinary hosted process (see
/// `lib.rs`'s `cfg_attr(not(test), no_std)`), where the `in`/`out`
/// instructions behind a real [`SerialPort`] are privileged and fault
/// outside ring 0. The logger's ring buffer capture (pure memory) still
/// runs either way; only the hardware sink is elided here.
struct SerialPortWrapper {
    #[cfg(not(test))]
    port: Option<SerialPort>,
}

impl SerialPortWrapper {
    const fn new() -> Self {
        Self {
            #[cfg(not(test))]
            port: None,
        }
    }

    #[cfg(not(test))]
    fn ensure_init(&mut self) {
        if self.port.is_none() {
            let mut port = unsafe { SerialPort::new(0x3F8) };
            port.init();
            self.port = Some(port);
        }
    }

    #[cfg(test)]
    fn ensure_init(&mut self) {}

    #[cfg(not(test))]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.ensure_init();
        if let Some(ref mut port) = self.port {
            use core::fmt::Write;
            port.write_fmt(args).ok();
        }
    }

    #[cfg(test)]
    fn write_fmt(&mut self, _args: fmt::Arguments<'_>) {}

    #[cfg(not(test))]
    fn send_byte(&mut self, byte: u8) {
        self.ensure_init();
        if let Some(ref mut port) = self.port {
            port.send(byte);
        }
    }

    #[cfg(test)]
    fn send_byte(&mut self, _byte: u8) {}
}

static SERIAL1: Mutex<SerialPortWrapper> = Mutex::new(SerialPortWrapper::new());

pub fn init() {
    SERIAL1.lock().ensure_init();
}

pub(crate) fn _print(args: fmt::Arguments<'_>) {
    SERIAL1.lock().write_fmt(args);
}

pub fn write_byte(byte: u8) {
    SERIAL1.lock().send_byte(byte);
}

pub fn write_str(s: &str) {
    write_bytes(s.as_bytes())
}

pub fn write_bytes(bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }

    let mut guard = SERIAL1.lock();
    for &byte in bytes {
        guard.send_byte(byte);
    }
}
