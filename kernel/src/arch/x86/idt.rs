//! Interrupt Descriptor Table.
//!
//! One hand-written assembly stub per trap vector pushes the vector number
//! (and a dummy zero error code for vectors the CPU doesn't push one for),
//! then falls into a single common tail, `_alltraps`, that finishes
//! building a [`TrapFrame`](super::context::TrapFrame) on the current
//! kernel stack and calls into Rust with a pointer to it.

use core::{arch::global_asm, mem::size_of};

use spin::Mutex;

use super::gdt::GD_KT;

/// System-call trap vector. 48 keeps it well clear of the 0-19 exception
/// range and the legacy 0x20-0x2f PIC remap window.
pub const T_SYSCALL: u32 = 48;
pub const T_BRKPT: u32 = 3;
pub const T_DEBUG: u32 = 1;
pub const T_PGFLT: u32 = 14;

global_asm!(
    r#"
.global _alltraps
_alltraps:
    cld
    push ds
    push es
    pushad
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    push esp
    call trap_handler_rust
    add esp, 4
    popad
    pop es
    pop ds
    add esp, 8
    iretd
"#
);

macro_rules! stub_noerr {
    ($name:ident, $vec:expr) => {
        global_asm!(concat!(
            ".global ", stringify!($name), "\n",
            stringify!($name), ":\n",
            "push 0\n",
            "push ", stringify!($vec), "\n",
            "jmp _alltraps\n",
        ));
    };
}

macro_rules! stub_err {
    ($name:ident, $vec:expr) => {
        global_asm!(concat!(
            ".global ", stringify!($name), "\n",
            stringify!($name), ":\n",
            "push ", stringify!($vec), "\n",
            "jmp _alltraps\n",
        ));
    };
}

stub_noerr!(vec0, 0);
stub_noerr!(vec1, 1);
stub_noerr!(vec2, 2);
stub_noerr!(vec3, 3);
stub_noerr!(vec4, 4);
stub_noerr!(vec5, 5);
stub_noerr!(vec6, 6);
stub_noerr!(vec7, 7);
stub_err!(vec8, 8);
stub_noerr!(vec9, 9);
stub_err!(vec10, 10);
stub_err!(vec11, 11);
stub_err!(vec12, 12);
stub_err!(vec13, 13);
stub_err!(vec14, 14);
stub_noerr!(vec15, 15);
stub_noerr!(vec16, 16);
stub_err!(vec17, 17);
stub_noerr!(vec18, 18);
stub_noerr!(vec19, 19);
stub_noerr!(vec48, 48);

extern "C" {
    fn vec0();
    fn vec1();
    fn vec2();
    fn vec3();
    fn vec4();
    fn vec5();
    fn vec6();
    fn vec7();
    fn vec8();
    fn vec9();
    fn vec10();
    fn vec11();
    fn vec12();
    fn vec13();
    fn vec14();
    fn vec15();
    fn vec16();
    fn vec17();
    fn vec18();
    fn vec19();
    fn vec48();
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GateDesc {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    access: u8,
    offset_high: u16,
}

impl GateDesc {
    const fn null() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            reserved: 0,
            access: 0,
            offset_high: 0,
        }
    }

    /// `istrap`: true for a trap gate (leaves IF untouched), false for an
    /// interrupt gate (clears IF on entry). `dpl`: lowest privilege level
    /// allowed to invoke this gate via `int`.
    fn new(handler: usize, istrap: bool, dpl: u8) -> Self {
        let gate_type = if istrap { 0xF } else { 0xE };
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: GD_KT,
            reserved: 0,
            access: 0x80 | ((dpl & 0x3) << 5) | gate_type,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

const IDT_ENTRIES: usize = 256;

static IDT: Mutex<[GateDesc; IDT_ENTRIES]> = Mutex::new([GateDesc::null(); IDT_ENTRIES]);

#[repr(C, packed)]
struct Pseudodesc {
    limit: u16,
    base: u32,
}

/// Build and load the IDT. All exception vectors are interrupt gates at
/// DPL 0 except the breakpoint trap (DPL 3, so user code can `int3`); the
/// syscall vector is a trap gate at DPL 3.
pub fn init() {
    let mut idt = IDT.lock();

    let exceptions: [(u32, unsafe extern "C" fn()); 20] = [
        (0, vec0),
        (1, vec1),
        (2, vec2),
        (3, vec3),
        (4, vec4),
        (5, vec5),
        (6, vec6),
        (7, vec7),
        (8, vec8),
        (9, vec9),
        (10, vec10),
        (11, vec11),
        (12, vec12),
        (13, vec13),
        (14, vec14),
        (15, vec15),
        (16, vec16),
        (17, vec17),
        (18, vec18),
        (19, vec19),
    ];

    for (vec, handler) in exceptions {
        let dpl = if vec == T_BRKPT { 3 } else { 0 };
        idt[vec as usize] = GateDesc::new(handler as usize, false, dpl);
    }

    idt[T_SYSCALL as usize] = GateDesc::new(vec48 as usize, true, 3);

    let pd = Pseudodesc {
        limit: (IDT_ENTRIES * size_of::<GateDesc>() - 1) as u16,
        base: idt.as_ptr() as u32,
    };

    // SAFETY: `pd` describes the just-populated, `'static`-lived `IDT`
    // table. `lidt` only changes which handler future traps dispatch to;
    // no trap can be in flight on this CPU during boot-time init.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) &pd, options(nostack, preserves_flags));
    }
}

/// Entry point called by `_alltraps` with a pointer to the freshly built
/// trap frame. Bridges into the architecture-independent dispatcher.
#[no_mangle]
extern "C" fn trap_handler_rust(tf: *mut super::context::TrapFrame) {
    // SAFETY: `_alltraps` passes the address of the trap frame it just
    // built on this CPU's kernel stack; it is valid and uniquely owned by
    // this call until the function returns (at which point `_alltraps`
    // pops it back off for `iret`).
    let tf = unsafe { &mut *tf };
    crate::irq::dispatch(tf);
}
