//! 16550 UART driver over port I/O (COM1), in the style of the teacher's
//! hand-rolled riscv64 `Uart16550Compat`, adapted from MMIO register
//! offsets to `in`/`out` on the legacy COM1 port range.

use core::fmt;

use spin::Mutex;

use super::io::Port;

const COM1_BASE: u16 = 0x3F8;

const LSR_OFFSET: u16 = 5;
const LSR_THRE: u8 = 1 << 5;

pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_status: Port::new(base + LSR_OFFSET),
        }
    }

    fn init(&mut self) {
        self.int_en.write(0x00);
        self.line_ctrl.write(0x80);
        self.data.write(0x03);
        self.int_en.write(0x00);
        self.line_ctrl.write(0x03);
        self.fifo_ctrl.write(0xC7);
        self.modem_ctrl.write(0x0B);
    }

    fn line_status(&mut self) -> u8 {
        self.line_status.read()
    }

    fn send(&mut self, byte: u8) {
        while self.line_status() & LSR_THRE == 0 {
            core::hint::spin_loop();
        }
        self.data.write(byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_BASE));

pub fn init() {
    COM1.lock().init();
    // SAFETY: called once, before any other subsystem logs; `SerialLogger`
    // has no state of its own and every call serializes through `COM1`'s
    // mutex.
    let _ = log::set_logger(&SerialLogger).map(|()| log::set_max_level(log::LevelFilter::Trace));
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        _print(format_args!(
            "[{:<5} {}] {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    COM1.lock().write_fmt(args).expect("serial write failed");
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::arch::x86::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => { $crate::serial_print!("\n") };
    ($fmt:expr) => { $crate::serial_print!(concat!($fmt, "\n")) };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::serial_print!(concat!($fmt, "\n"), $($arg)*)
    };
}
