//! Calling-convention descriptors and the signed register index space.
//!
//! The allocator never names native registers directly: it works in a signed
//! index space where FP registers are negative, GP registers positive, and
//! zero is the invalid/none sentinel. Within each class the volatile
//! (caller-saved) registers sit closest to zero, so a color budget of `K`
//! covers exactly the caller-saved set and widening past it starts pulling in
//! callee-saved registers. [`Abi::to_native`] / [`Abi::from_native`] are the
//! single source of truth for the mapping; downstream emitters consume it
//! unchanged.

pub mod aarch64;
pub mod x64;

/// Opaque per-ABI native register identifier. `NONE` is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeReg(pub u16);

impl NativeReg {
    pub const NONE: NativeReg = NativeReg(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A calling-convention descriptor. Plain `'static` data so targets are
/// described declaratively and tests can build synthetic conventions.
pub struct Abi {
    pub name: &'static str,
    pub gp_volatile: &'static [NativeReg],
    pub gp_nonvolatile: &'static [NativeReg],
    pub fp_volatile: &'static [NativeReg],
    pub fp_nonvolatile: &'static [NativeReg],
    pub gp_argument: &'static [NativeReg],
    pub fp_argument: &'static [NativeReg],
    pub gp_retval: NativeReg,
    pub fp_retval: NativeReg,
    pub sp: NativeReg,
    pub bp: NativeReg,
    /// Callee-reserved spill bytes below the return address, if the
    /// convention has one (Win64's home area).
    pub shadow_stack: i32,
    /// When set, GP and FP arguments consume a single shared index sequence.
    pub combined_arg_counter: bool,
    pub native_names: fn(NativeReg) -> &'static str,
}

impl Abi {
    pub fn num_gp(&self) -> usize {
        self.gp_volatile.len() + self.gp_nonvolatile.len()
    }

    pub fn num_fp(&self) -> usize {
        self.fp_volatile.len() + self.fp_nonvolatile.len()
    }

    /// Translates a signed register index to its native register.
    /// Out-of-range indices (including 0) map to [`NativeReg::NONE`].
    pub fn to_native(&self, i: i32) -> NativeReg {
        if i > 0 {
            if i as usize > self.num_gp() {
                return NativeReg::NONE;
            }
            let idx = (i - 1) as usize;
            let vol = self.gp_volatile.len();
            if idx < vol {
                self.gp_volatile[idx]
            } else {
                self.gp_nonvolatile[idx - vol]
            }
        } else if i < 0 {
            // FP indices count outward from zero through the volatile set,
            // i.e. position `num_fp + i` in fp_nonvolatile ++ fp_volatile.
            let idx = self.num_fp() as i32 + i;
            if idx < 0 {
                return NativeReg::NONE;
            }
            let idx = idx as usize;
            let nonvol = self.fp_nonvolatile.len();
            if idx < nonvol {
                self.fp_nonvolatile[idx]
            } else {
                self.fp_volatile[idx - nonvol]
            }
        } else {
            NativeReg::NONE
        }
    }

    /// Reverse of [`to_native`](Self::to_native); linear scan, 0 when the
    /// native register is not part of the convention.
    pub fn from_native(&self, n: NativeReg) -> i32 {
        if n.is_none() {
            return 0;
        }
        let lo = -(self.num_fp() as i32);
        let hi = self.num_gp() as i32;
        for i in lo..=hi {
            if i != 0 && self.to_native(i) == n {
                return i;
            }
        }
        0
    }

    /// Whether signed index `i` names a caller-saved register.
    pub fn is_volatile(&self, i: i32) -> bool {
        let (i, lim) = if i < 0 {
            (-i, self.fp_volatile.len() as i32)
        } else {
            (i, self.gp_volatile.len() as i32)
        };
        i <= lim
    }

    /// Signed index of the register receiving the `(gp_idx, fp_idx)`-th
    /// argument of the given class; 0 when the argument is not passed in a
    /// register.
    pub fn map_argument(&self, gp_idx: usize, fp_idx: usize, is_fp: bool) -> i32 {
        let n = if is_fp {
            let idx = if self.combined_arg_counter {
                gp_idx + fp_idx
            } else {
                fp_idx
            };
            self.fp_argument.get(idx).copied()
        } else {
            let idx = if self.combined_arg_counter {
                gp_idx + fp_idx
            } else {
                gp_idx
            };
            self.gp_argument.get(idx).copied()
        };
        self.from_native(n.unwrap_or(NativeReg::NONE))
    }

    pub fn native_name(&self, n: NativeReg) -> &'static str {
        (self.native_names)(n)
    }
}

/// The descriptor for the compilation host.
pub fn host() -> &'static Abi {
    #[cfg(all(target_arch = "x86_64", windows))]
    return &x64::WIN64;
    #[cfg(all(target_arch = "x86_64", not(windows)))]
    return &x64::SYSV64;
    #[cfg(target_arch = "aarch64")]
    return &aarch64::AAPCS64;
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    return &x64::SYSV64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysv64_roundtrips_the_signed_space() {
        let abi = &x64::SYSV64;
        for i in -(abi.num_fp() as i32)..=(abi.num_gp() as i32) {
            if i == 0 {
                assert!(abi.to_native(0).is_none());
                continue;
            }
            let n = abi.to_native(i);
            assert!(!n.is_none(), "index {i} has no native register");
            assert_eq!(abi.from_native(n), i);
        }
        assert!(abi.to_native(abi.num_gp() as i32 + 1).is_none());
        assert!(abi.to_native(-(abi.num_fp() as i32) - 1).is_none());
    }

    #[test]
    fn volatile_indices_sit_closest_to_zero() {
        let abi = &x64::WIN64;
        for i in 1..=abi.gp_volatile.len() as i32 {
            assert!(abi.is_volatile(i));
        }
        for i in abi.gp_volatile.len() as i32 + 1..=abi.num_gp() as i32 {
            assert!(!abi.is_volatile(i));
        }
        for i in 1..=abi.fp_volatile.len() as i32 {
            assert!(abi.is_volatile(-i));
        }
        for i in abi.fp_volatile.len() as i32 + 1..=abi.num_fp() as i32 {
            assert!(!abi.is_volatile(-i));
        }
    }

    #[test]
    fn sysv64_arguments_use_independent_counters() {
        let abi = &x64::SYSV64;
        assert_eq!(abi.to_native(abi.map_argument(0, 0, false)), x64::RDI);
        assert_eq!(abi.to_native(abi.map_argument(2, 5, false)), x64::RDX);
        assert_eq!(abi.to_native(abi.map_argument(5, 1, true)), x64::XMM1);
        // Out-of-range argument positions yield the invalid sentinel.
        assert_eq!(abi.map_argument(6, 0, false), 0);
        assert_eq!(abi.map_argument(0, 8, true), 0);
    }

    #[test]
    fn win64_arguments_share_one_counter() {
        let abi = &x64::WIN64;
        assert_eq!(abi.to_native(abi.map_argument(0, 0, false)), x64::RCX);
        // Second argument overall, even though it is the first FP argument.
        assert_eq!(abi.to_native(abi.map_argument(1, 0, true)), x64::XMM1);
        assert_eq!(abi.map_argument(3, 1, false), 0);
    }

    #[test]
    fn x64_fp_name_table_has_distinct_high_xmm_labels() {
        let abi = &x64::WIN64;
        let mut names = Vec::new();
        for i in 1..=abi.num_fp() as i32 {
            names.push(abi.native_name(abi.to_native(-i)));
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), abi.num_fp());
    }

    #[test]
    fn host_descriptor_is_usable() {
        let abi = host();
        assert!(abi.num_gp() >= 2);
        assert!(abi.gp_argument.len() >= 3);
    }
}
