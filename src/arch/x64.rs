//! x86-64 calling conventions: System V and Microsoft x64.

use super::{Abi, NativeReg};

pub const RAX: NativeReg = NativeReg(1);
pub const RCX: NativeReg = NativeReg(2);
pub const RDX: NativeReg = NativeReg(3);
pub const RBX: NativeReg = NativeReg(4);
pub const RSP: NativeReg = NativeReg(5);
pub const RBP: NativeReg = NativeReg(6);
pub const RSI: NativeReg = NativeReg(7);
pub const RDI: NativeReg = NativeReg(8);
pub const R8: NativeReg = NativeReg(9);
pub const R9: NativeReg = NativeReg(10);
pub const R10: NativeReg = NativeReg(11);
pub const R11: NativeReg = NativeReg(12);
pub const R12: NativeReg = NativeReg(13);
pub const R13: NativeReg = NativeReg(14);
pub const R14: NativeReg = NativeReg(15);
pub const R15: NativeReg = NativeReg(16);
pub const XMM0: NativeReg = NativeReg(17);
pub const XMM1: NativeReg = NativeReg(18);
pub const XMM2: NativeReg = NativeReg(19);
pub const XMM3: NativeReg = NativeReg(20);
pub const XMM4: NativeReg = NativeReg(21);
pub const XMM5: NativeReg = NativeReg(22);
pub const XMM6: NativeReg = NativeReg(23);
pub const XMM7: NativeReg = NativeReg(24);
pub const XMM8: NativeReg = NativeReg(25);
pub const XMM9: NativeReg = NativeReg(26);
pub const XMM10: NativeReg = NativeReg(27);
pub const XMM11: NativeReg = NativeReg(28);
pub const XMM12: NativeReg = NativeReg(29);
pub const XMM13: NativeReg = NativeReg(30);
pub const XMM14: NativeReg = NativeReg(31);
pub const XMM15: NativeReg = NativeReg(32);

fn name(r: NativeReg) -> &'static str {
    match r {
        RAX => "AX",
        RCX => "CX",
        RDX => "DX",
        RBX => "BX",
        RSP => "SP",
        RBP => "BP",
        RSI => "SI",
        RDI => "DI",
        R8 => "8",
        R9 => "9",
        R10 => "10",
        R11 => "11",
        R12 => "12",
        R13 => "13",
        R14 => "14",
        R15 => "15",
        XMM0 => "X0",
        XMM1 => "X1",
        XMM2 => "X2",
        XMM3 => "X3",
        XMM4 => "X4",
        XMM5 => "X5",
        XMM6 => "X6",
        XMM7 => "X7",
        XMM8 => "X8",
        XMM9 => "X9",
        XMM10 => "X10",
        XMM11 => "X11",
        XMM12 => "X12",
        XMM13 => "X13",
        XMM14 => "X14",
        XMM15 => "X15",
        _ => "?",
    }
}

pub static SYSV64: Abi = Abi {
    name: "sysv64",
    gp_volatile: &[RAX, RDI, RSI, RDX, RCX, R8, R9, R10, R11],
    gp_nonvolatile: &[RBP, RBX, R12, R13, R14, R15],
    fp_volatile: &[
        XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13,
        XMM14, XMM15,
    ],
    fp_nonvolatile: &[],
    gp_argument: &[RDI, RSI, RDX, RCX, R8, R9],
    fp_argument: &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7],
    gp_retval: RAX,
    fp_retval: XMM0,
    sp: RSP,
    bp: RBP,
    shadow_stack: 0x20,
    combined_arg_counter: false,
    native_names: name,
};

pub static WIN64: Abi = Abi {
    name: "win64",
    gp_volatile: &[RAX, RCX, RDX, R8, R9, R10, R11],
    gp_nonvolatile: &[RBP, RSI, RDI, RBX, R12, R13, R14, R15],
    fp_volatile: &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5],
    fp_nonvolatile: &[
        XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
    ],
    gp_argument: &[RCX, RDX, R8, R9],
    fp_argument: &[XMM0, XMM1, XMM2, XMM3],
    gp_retval: RAX,
    fp_retval: XMM0,
    sp: RSP,
    bp: RBP,
    shadow_stack: 0x20,
    combined_arg_counter: true,
    native_names: name,
};
