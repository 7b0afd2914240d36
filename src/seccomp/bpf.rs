//! Classic BPF instruction encoding for seccomp filters.
//!
//! Raw `struct sock_filter` / `struct sock_fprog` layouts plus the opcode and
//! `seccomp_data` constants the code generator and the simulator share.
//! No libseccomp.

// BPF instruction classes
pub const BPF_LD: u16 = 0x00;
pub const BPF_ALU: u16 = 0x04;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;

// ld/ldx fields
pub const BPF_W: u16 = 0x00;
pub const BPF_ABS: u16 = 0x20;

// alu/jmp fields
pub const BPF_AND: u16 = 0x50;
pub const BPF_JA: u16 = 0x00;
pub const BPF_JEQ: u16 = 0x10;
pub const BPF_JGT: u16 = 0x20;
pub const BPF_JGE: u16 = 0x30;
pub const BPF_JSET: u16 = 0x40;
pub const BPF_K: u16 = 0x00;

/// Kernel limit on filter length (`BPF_MAXINSNS`).
pub const BPF_MAXINSNS: usize = 4096;

// seccomp return actions
pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
pub const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
pub const SECCOMP_RET_ACTION_FULL: u32 = 0xffff_0000;
pub const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

// seccomp(2)
pub const SECCOMP_SET_MODE_FILTER: libc::c_uint = 1;
pub const SECCOMP_FILTER_FLAG_TSYNC: libc::c_uint = 1 << 0;

// seccomp_data offsets
pub const OFFSET_NR: u32 = 0;
pub const OFFSET_ARCH: u32 = 4;
pub const OFFSET_ARGS: u32 = 16;

/// Size of `struct seccomp_data` (64 bytes).
pub const SECCOMP_DATA_LEN: usize = 64;

/// Encoded size of one instruction.
pub const INSN_LEN: usize = 8;

/// Kernel struct sock_filter (8 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

/// Kernel struct sock_fprog
#[repr(C)]
pub struct SockFprog {
    pub len: u16,
    pub filter: *const SockFilter,
}

pub const fn bpf_stmt(code: u16, k: u32) -> SockFilter {
    SockFilter { code, jt: 0, jf: 0, k }
}

pub const fn bpf_jump(code: u16, k: u32, jt: u8, jf: u8) -> SockFilter {
    SockFilter { code, jt, jf, k }
}

/// Load the 32-bit word at `offset` of `seccomp_data` into the accumulator.
pub const fn load_word(offset: u32) -> SockFilter {
    bpf_stmt(BPF_LD | BPF_W | BPF_ABS, offset)
}

pub const fn ret(k: u32) -> SockFilter {
    bpf_stmt(BPF_RET | BPF_K, k)
}

/// Unconditional jump forward by `k` instructions.
pub const fn jump_always(k: u32) -> SockFilter {
    bpf_stmt(BPF_JMP | BPF_JA, k)
}

/// Offset of the low word of syscall argument `index` (little-endian ABIs).
pub const fn arg_lo(index: u8) -> u32 {
    OFFSET_ARGS + 8 * index as u32
}

/// Offset of the high word of syscall argument `index` (little-endian ABIs).
pub const fn arg_hi(index: u8) -> u32 {
    arg_lo(index) + 4
}

impl SockFilter {
    /// Native-endian encoding, as written by `seccomp_export_bpf`.
    pub fn to_bytes(self) -> [u8; INSN_LEN] {
        let mut out = [0u8; INSN_LEN];
        out[0..2].copy_from_slice(&self.code.to_ne_bytes());
        out[2] = self.jt;
        out[3] = self.jf;
        out[4..8].copy_from_slice(&self.k.to_ne_bytes());
        out
    }

    pub fn from_bytes(raw: [u8; INSN_LEN]) -> Self {
        Self {
            code: u16::from_ne_bytes([raw[0], raw[1]]),
            jt: raw[2],
            jf: raw[3],
            k: u32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }
}
