//! Barrier Routine Calling Conventions
//!
//! Register roles the barrier stubs rely on for each target. The barrier runtime
//! routines follow the platform C convention for arguments and result but preserve
//! every other register, so a stub only saves the argument and return registers
//! it hands to the routine, plus the link register where the call instruction
//! writes one. Stubs are expanded inline, so the stack is aligned on entry.

use crate::aarch64::A64Reg;
use crate::amd64::X64Reg;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingConvention<R: 'static> {
    pub name: &'static str,
    /// Integer/pointer argument registers in order
    pub arg_regs: &'static [R],
    pub ret_reg: R,
    /// Holds the current thread's TLS block
    pub thread_reg: R,
    /// Freely clobbered by barrier fast paths
    pub scratch: [R; 2],
    /// Written by the call instruction itself
    pub link_reg: Option<R>,
    /// Stack bytes taken by one register push
    pub push_slot: u32,
    /// Required stack alignment at a call
    pub stack_alignment: u32,
}

impl<R: Copy + Eq + 'static> CallingConvention<R> {
    pub fn arg_register(&self, index: usize) -> Option<R> {
        self.arg_regs.get(index).copied()
    }

    /// Registers a routine taking `arg_count` arguments may overwrite
    pub fn call_clobbered(&self, arg_count: usize) -> Vec<R> {
        let mut regs: Vec<R> = self.arg_regs.iter().copied().take(arg_count).collect();
        if !regs.contains(&self.ret_reg) {
            regs.push(self.ret_reg);
        }
        regs
    }

    /// Padding that keeps the stack aligned at a call after `pushes` pushes
    pub fn call_padding(&self, pushes: usize) -> u32 {
        let used = pushes as u32 * self.push_slot % self.stack_alignment;
        if used == 0 {
            0
        } else {
            self.stack_alignment - used
        }
    }

    /// Registers a stub must not be handed as operands
    pub fn is_reserved(&self, reg: R) -> bool {
        reg == self.thread_reg || self.scratch.contains(&reg) || self.link_reg == Some(reg)
    }
}

/// AAPCS64 with `x28` as thread register and `x8`/`x9` as scratch
pub const AARCH64: CallingConvention<A64Reg> = CallingConvention {
    name: "aapcs64",
    arg_regs: &[
        A64Reg::X0,
        A64Reg(1),
        A64Reg(2),
        A64Reg(3),
        A64Reg(4),
        A64Reg(5),
        A64Reg(6),
        A64Reg(7),
    ],
    ret_reg: A64Reg::X0,
    thread_reg: A64Reg::RTHREAD,
    scratch: [A64Reg::RSCRATCH1, A64Reg::RSCRATCH2],
    link_reg: Some(A64Reg::LR),
    push_slot: 16,
    stack_alignment: 16,
};

/// System V AMD64 with `r15` as thread register and `r10`/`r11` as scratch
pub const AMD64: CallingConvention<X64Reg> = CallingConvention {
    name: "sysv64",
    arg_regs: &[
        X64Reg::Rdi,
        X64Reg::Rsi,
        X64Reg::Rdx,
        X64Reg::Rcx,
        X64Reg::R8,
        X64Reg::R9,
    ],
    ret_reg: X64Reg::Rax,
    thread_reg: X64Reg::R15,
    scratch: [X64Reg::R10, X64Reg::R11],
    link_reg: None,
    push_slot: 8,
    stack_alignment: 16,
};

#[cfg(test)]
mod abi_tests {
    use super::*;

    #[test]
    fn test_arg_registers() {
        assert_eq!(AARCH64.arg_register(0), Some(A64Reg::X0));
        assert_eq!(AARCH64.arg_register(8), None);
        assert_eq!(AMD64.arg_register(1), Some(X64Reg::Rsi));
        assert_eq!(AMD64.arg_register(6), None);
    }

    #[test]
    fn test_call_clobbered() {
        assert_eq!(AARCH64.call_clobbered(2), vec![A64Reg::X0, A64Reg(1)]);
        assert_eq!(
            AMD64.call_clobbered(2),
            vec![X64Reg::Rdi, X64Reg::Rsi, X64Reg::Rax]
        );
    }

    #[test]
    fn test_call_padding() {
        assert_eq!(AARCH64.call_padding(3), 0);
        assert_eq!(AMD64.call_padding(3), 8);
        assert_eq!(AMD64.call_padding(2), 0);
        assert_eq!(AMD64.call_padding(0), 0);
    }

    #[test]
    fn test_reserved_registers() {
        assert!(AARCH64.is_reserved(A64Reg::RTHREAD));
        assert!(AARCH64.is_reserved(A64Reg::RSCRATCH2));
        assert!(!AARCH64.is_reserved(A64Reg(19)));
        assert!(AARCH64.is_reserved(A64Reg::LR));
        assert!(AMD64.is_reserved(X64Reg::R10));
        assert!(!AMD64.is_reserved(X64Reg::Rbx));
    }
}
