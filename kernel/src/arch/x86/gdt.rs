//! Global Descriptor Table and Task State Segment.
//!
//! Flat segmentation: every segment base is 0 and limit is 4 GiB, so
//! protection is done entirely through paging. The only reason segments
//! exist at all is that `iret`/`int` need a code/data/TSS selector to
//! cross privilege levels, exactly as in the lineage this kernel follows.

use core::mem::size_of;

use spin::Mutex;

/// Kernel code segment selector.
pub const GD_KT: u16 = 1 << 3;
/// Kernel data segment selector.
pub const GD_KD: u16 = 2 << 3;
/// User code segment selector (RPL 3 is or'd in by callers).
pub const GD_UT: u16 = 3 << 3;
/// User data segment selector (RPL 3 is or'd in by callers).
pub const GD_UD: u16 = 4 << 3;
/// TSS selector.
pub const GD_TSS0: u16 = 5 << 3;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SegDesc {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl SegDesc {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            limit_high_flags: 0,
            base_high: 0,
        }
    }

    /// A flat 4 GiB code/data segment. `access` carries type + DPL + present.
    const fn flat(access: u8, flags: u8) -> Self {
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access,
            limit_high_flags: 0xF | (flags << 4),
            base_high: 0,
        }
    }

    fn system(base: u32, limit: u32, access: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            limit_high_flags: (((limit >> 16) & 0xF) as u8) | 0x00,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Present, DPL, descriptor type and segment-type bits for each descriptor.
const STA_X: u8 = 0x8; // executable
const STA_R: u8 = 0x2; // readable (code) / writable (data)
const STA_W: u8 = 0x2;
const ACC_PRESENT: u8 = 0x80;
const ACC_CODE_DATA: u8 = 0x10; // S bit: code or data, not a system descriptor
const DPL_KERNEL: u8 = 0x00;
const DPL_USER: u8 = 0x60;
const FLAGS_32BIT_PAGE_GRANULAR: u8 = 0b1100;

const STS_T32A: u8 = 0x9; // available 32-bit TSS

#[repr(C, packed)]
struct Tss {
    link: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    pub iomb: u16,
}

impl Tss {
    const fn new() -> Self {
        // SAFETY-relevant invariant: every field must start zeroed; only
        // esp0/ss0/iomb are meaningful for our usage (ring 0 stack pointer
        // loaded on every privilege-crossing interrupt).
        Self {
            link: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomb: size_of::<Tss>() as u16,
        }
    }
}

const GDT_ENTRIES: usize = 6;

struct Gdt {
    table: [SegDesc; GDT_ENTRIES],
    tss: Tss,
}

static GDT: Mutex<Gdt> = Mutex::new(Gdt {
    table: [SegDesc::null(); GDT_ENTRIES],
    tss: Tss::new(),
});

#[repr(C, packed)]
struct Pseudodesc {
    limit: u16,
    base: u32,
}

/// Set up the flat GDT, install the single-CPU TSS, and load both.
pub fn init() {
    let mut gdt = GDT.lock();

    gdt.table[0] = SegDesc::null();
    gdt.table[1] = SegDesc::flat(
        ACC_PRESENT | DPL_KERNEL | ACC_CODE_DATA | STA_X | STA_R,
        FLAGS_32BIT_PAGE_GRANULAR,
    );
    gdt.table[2] = SegDesc::flat(
        ACC_PRESENT | DPL_KERNEL | ACC_CODE_DATA | STA_W,
        FLAGS_32BIT_PAGE_GRANULAR,
    );
    gdt.table[3] = SegDesc::flat(
        ACC_PRESENT | DPL_USER | ACC_CODE_DATA | STA_X | STA_R,
        FLAGS_32BIT_PAGE_GRANULAR,
    );
    gdt.table[4] = SegDesc::flat(
        ACC_PRESENT | DPL_USER | ACC_CODE_DATA | STA_W,
        FLAGS_32BIT_PAGE_GRANULAR,
    );

    gdt.tss.ss0 = GD_KD as u32;
    gdt.tss.iomb = size_of::<Tss>() as u16;

    let tss_base = core::ptr::addr_of!(gdt.tss) as u32;
    let tss_limit = (size_of::<Tss>() - 1) as u32;
    gdt.table[5] = SegDesc::system(tss_base, tss_limit, ACC_PRESENT | DPL_KERNEL | STS_T32A);

    let pd = Pseudodesc {
        limit: (GDT_ENTRIES * size_of::<SegDesc>() - 1) as u16,
        base: core::ptr::addr_of!(gdt.table) as u32,
    };

    // SAFETY: `pd` describes the just-initialized `gdt.table`, which outlives
    // this function (it's a `'static` inside the locked global). `lgdt` only
    // changes which descriptors later segment loads resolve against; no
    // currently-loaded selector is invalidated by reloading the same layout.
    unsafe {
        core::arch::asm!("lgdt [{}]", in(reg) &pd, options(nostack, preserves_flags));
        reload_segments();
        core::arch::asm!("ltr {0:x}", in(reg) GD_TSS0, options(nostack, preserves_flags));
    }
}

/// Set `esp0`, the ring-0 stack pointer loaded by the CPU on every
/// privilege-crossing trap. Called once per environment switch.
pub fn set_kernel_stack(esp0: u32) {
    GDT.lock().tss.esp0 = esp0;
}

/// SAFETY: reloads every segment register to the flat kernel descriptors
/// set up by `init`. Must only run immediately after `lgdt` with that same
/// layout, and DS/ES/SS must be valid data selectors and CS a valid code
/// selector for the subsequent instructions to keep executing.
unsafe fn reload_segments() {
    core::arch::asm!(
        "mov ax, {kd:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        "push {kt}",
        "lea eax, [2f]",
        "push eax",
        "retf",
        "2:",
        kd = in(reg) GD_KD,
        kt = in(reg) GD_KT as u32,
        out("eax") _,
        options(nostack),
    );
}
