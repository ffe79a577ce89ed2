#![cfg(test)]
//! Property tests for trap dispatch: frame ownership for user traps and the
//! register footprint of the system call bridge.

use proptest::prelude::*;

use super::{TrapDispatcher, TrapOutcome};
use crate::env::EnvId;
use crate::interrupts::{PushRegs, TrapFrame, TrapNumber};
use crate::testing::{FakeCpu, FakeKernel};

const ENV: EnvId = EnvId(0x1001);

fn arb_regs() -> impl Strategy<Value = PushRegs> {
    any::<[u32; 8]>().prop_map(|r| PushRegs {
        edi: r[0],
        esi: r[1],
        ebp: r[2],
        oesp: r[3],
        ebx: r[4],
        edx: r[5],
        ecx: r[6],
        eax: r[7],
    })
}

/// Every field random except the vector and the ring 3 RPL in `cs`.
fn arb_user_frame(trapno: TrapNumber) -> impl Strategy<Value = TrapFrame> {
    (
        arb_regs(),
        any::<[u16; 7]>(),
        any::<[u32; 4]>(),
        any::<u16>(),
    )
        .prop_map(move |(regs, seg, [err, eip, eflags, esp], cs)| TrapFrame {
            regs,
            es: seg[0],
            padding1: seg[1],
            ds: seg[2],
            padding2: seg[3],
            trapno: trapno.as_u32(),
            err,
            eip,
            cs: cs | 0b11,
            padding3: seg[4],
            eflags,
            esp,
            ss: seg[5],
            padding4: seg[6],
        })
}

fn dispatch(kernel: &mut FakeKernel, tf: TrapFrame) -> TrapOutcome {
    let mut live = tf;
    let mut out = String::new();
    TrapDispatcher::new().on_trap(&mut live, kernel, &FakeCpu::default(), &mut out)
}

proptest! {
    #[test]
    fn user_breakpoint_resumes_the_exact_trapped_frame(
        tf in arb_user_frame(TrapNumber::BREAKPOINT),
    ) {
        let mut kernel = FakeKernel::running(ENV);

        let outcome = dispatch(&mut kernel, tf);

        prop_assert_eq!(outcome, TrapOutcome::Resume { env: ENV, frame: tf });
        prop_assert_eq!(kernel.envs.frame(ENV), Some(tf));
    }

    #[test]
    fn syscall_bridge_writes_only_eax(
        tf in arb_user_frame(TrapNumber::SYSCALL),
        ret in any::<i32>(),
    ) {
        let mut kernel = FakeKernel::running(ENV).with_syscall_result(ret);

        let outcome = dispatch(&mut kernel, tf);

        let r = tf.regs;
        let expected_call = (r.eax, [r.edx, r.ecx, r.ebx, r.edi, r.esi]);
        prop_assert_eq!(kernel.syscalls.calls.clone(), vec![expected_call]);
        let expected = TrapFrame { regs: PushRegs { eax: ret as u32, ..r }, ..tf };
        prop_assert_eq!(outcome, TrapOutcome::Resume { env: ENV, frame: expected });
    }
}
