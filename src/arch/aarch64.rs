//! AArch64 AAPCS calling convention.
//!
//! x16/x17 (the intra-procedure-call scratch pair) and x18 (platform
//! register) are left out of the allocatable sets; x29 is the frame pointer.

use super::{Abi, NativeReg};

macro_rules! xregs {
    ($($name:ident = $id:expr;)*) => {
        $(pub const $name: NativeReg = NativeReg($id);)*
    };
}

xregs! {
    X0 = 1; X1 = 2; X2 = 3; X3 = 4; X4 = 5; X5 = 6; X6 = 7; X7 = 8;
    X8 = 9; X9 = 10; X10 = 11; X11 = 12; X12 = 13; X13 = 14; X14 = 15; X15 = 16;
    X19 = 17; X20 = 18; X21 = 19; X22 = 20; X23 = 21; X24 = 22; X25 = 23; X26 = 24;
    X27 = 25; X28 = 26; X29 = 27; X30 = 28; SP = 29;
    V0 = 30; V1 = 31; V2 = 32; V3 = 33; V4 = 34; V5 = 35; V6 = 36; V7 = 37;
    V8 = 38; V9 = 39; V10 = 40; V11 = 41; V12 = 42; V13 = 43; V14 = 44; V15 = 45;
    V16 = 46; V17 = 47; V18 = 48; V19 = 49; V20 = 50; V21 = 51; V22 = 52; V23 = 53;
    V24 = 54; V25 = 55; V26 = 56; V27 = 57; V28 = 58; V29 = 59; V30 = 60; V31 = 61;
}

fn name(r: NativeReg) -> &'static str {
    match r {
        X0 => "X0",
        X1 => "X1",
        X2 => "X2",
        X3 => "X3",
        X4 => "X4",
        X5 => "X5",
        X6 => "X6",
        X7 => "X7",
        X8 => "X8",
        X9 => "X9",
        X10 => "X10",
        X11 => "X11",
        X12 => "X12",
        X13 => "X13",
        X14 => "X14",
        X15 => "X15",
        X19 => "X19",
        X20 => "X20",
        X21 => "X21",
        X22 => "X22",
        X23 => "X23",
        X24 => "X24",
        X25 => "X25",
        X26 => "X26",
        X27 => "X27",
        X28 => "X28",
        X29 => "X29",
        X30 => "X30",
        SP => "SP",
        V0 => "V0",
        V1 => "V1",
        V2 => "V2",
        V3 => "V3",
        V4 => "V4",
        V5 => "V5",
        V6 => "V6",
        V7 => "V7",
        V8 => "V8",
        V9 => "V9",
        V10 => "V10",
        V11 => "V11",
        V12 => "V12",
        V13 => "V13",
        V14 => "V14",
        V15 => "V15",
        V16 => "V16",
        V17 => "V17",
        V18 => "V18",
        V19 => "V19",
        V20 => "V20",
        V21 => "V21",
        V22 => "V22",
        V23 => "V23",
        V24 => "V24",
        V25 => "V25",
        V26 => "V26",
        V27 => "V27",
        V28 => "V28",
        V29 => "V29",
        V30 => "V30",
        V31 => "V31",
        _ => "?",
    }
}

pub static AAPCS64: Abi = Abi {
    name: "aapcs64",
    gp_volatile: &[
        X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15,
    ],
    gp_nonvolatile: &[X19, X20, X21, X22, X23, X24, X25, X26, X27, X28],
    fp_volatile: &[
        V0, V1, V2, V3, V4, V5, V6, V7, V16, V17, V18, V19, V20, V21, V22, V23, V24, V25, V26,
        V27, V28, V29, V30, V31,
    ],
    fp_nonvolatile: &[V8, V9, V10, V11, V12, V13, V14, V15],
    gp_argument: &[X0, X1, X2, X3, X4, X5, X6, X7],
    fp_argument: &[V0, V1, V2, V3, V4, V5, V6, V7],
    gp_retval: X0,
    fp_retval: V0,
    sp: SP,
    bp: X29,
    shadow_stack: 0,
    combined_arg_counter: false,
    native_names: name,
};
