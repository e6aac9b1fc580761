use mpx_core::config::config::KernelConfig;
use mpx_core::context::context::Context;
use mpx_core::device::device::VirtualUart;
use mpx_core::kernel::kernel::Kernel;
use mpx_core::pcb::pcb::{ExecState, PcbClass};
use mpx_core::syscall::syscall::{OP_EXIT, OP_IDLE, SysRequest};

fn make_kernel() -> Kernel<VirtualUart> {
    Kernel::new(KernelConfig::default(), VirtualUart::new())
}

fn ctx(tag: u32) -> Context {
    Context {
        eax: tag,
        ..Context::default()
    }
}

fn running_count(kernel: &Kernel<VirtualUart>) -> usize {
    kernel
        .registry()
        .iter()
        .filter(|(_, pcb)| pcb.exec_state() == ExecState::Running)
        .count()
}

#[test]
fn first_dispatch_enters_queue_front() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 3, 0x100).unwrap();
    let boot = ctx(0xb0);

    let next = kernel.dispatch(SysRequest::Idle, boot);
    assert_eq!(next.eip, 0x100);
    assert_eq!(kernel.active(), Some(a));
    assert_eq!(kernel.bootstrap_context(), Some(boot));
    assert_eq!(kernel.pcb(a).unwrap().exec_state(), ExecState::Running);
    assert_eq!(kernel.registry().queue_len(), 0);
}

#[test]
fn idle_swaps_and_saves_caller_context() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 3, 0x100).unwrap();
    let b = kernel.spawn("b", PcbClass::User, 3, 0x200).unwrap();

    let c1 = kernel.dispatch(SysRequest::Idle, ctx(0xb0));
    let a_saved = Context { eip: 0x104, ..c1 };
    let c2 = kernel.dispatch(SysRequest::Idle, a_saved);

    assert_eq!(c2.eip, 0x200);
    assert_eq!(kernel.active(), Some(b));
    assert_eq!(*kernel.pcb(a).unwrap().context(), a_saved);
    assert_eq!(kernel.pcb(a).unwrap().exec_state(), ExecState::Ready);

    let c3 = kernel.dispatch(SysRequest::Idle, c2);
    assert_eq!(c3, a_saved);
    assert_eq!(kernel.active(), Some(a));
}

#[test]
fn idle_without_eligible_successor_keeps_running() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 3, 0x100).unwrap();
    kernel.spawn("b", PcbClass::User, 1, 0x200).unwrap();
    kernel.spawn("c", PcbClass::User, 1, 0x300).unwrap();
    kernel.block("b").unwrap();
    kernel.suspend("c").unwrap();

    let running = kernel.dispatch(SysRequest::Idle, ctx(0xb0));
    assert_eq!(kernel.active(), Some(a));

    let mine = Context { ebx: 9, ..running };
    assert_eq!(kernel.dispatch(SysRequest::Idle, mine), mine);
    assert_eq!(kernel.active(), Some(a));
    assert_eq!(kernel.registry().queue_len(), 2);
}

#[test]
fn exit_promotes_next_and_releases_caller() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    let b = kernel.spawn("b", PcbClass::User, 2, 0x200).unwrap();
    let free = kernel.memory().free_pages();

    let running = kernel.dispatch(SysRequest::Idle, ctx(0xb0));
    let next = kernel.dispatch(SysRequest::Exit, running);

    assert_eq!(next.eip, 0x200);
    assert_eq!(kernel.active(), Some(b));
    assert!(kernel.pcb(a).is_none());
    assert!(kernel.find("a").is_none());
    assert_eq!(kernel.memory().free_pages(), free + 1);
}

#[test]
fn last_exit_returns_bootstrap_context() {
    let mut kernel = make_kernel();
    kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    let boot = ctx(0xb0);

    let running = kernel.dispatch(SysRequest::Idle, boot);
    assert_eq!(kernel.dispatch(SysRequest::Exit, running), boot);
    assert_eq!(kernel.active(), None);
    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.memory().free_pages(), kernel.config().phys_pages);
}

#[test]
fn exit_without_active_process_is_ignored() {
    let mut kernel = make_kernel();
    let a = kernel.pcb_setup("a", PcbClass::User, 1).unwrap();
    kernel.insert(a);

    let given = ctx(0x42);
    assert_eq!(kernel.dispatch(SysRequest::Exit, given), given);
    assert!(kernel.pcb(a).is_some());
    assert_eq!(kernel.registry().peek_next(), Some(a));
}

#[test]
fn user_shutdown_is_refused() {
    let mut kernel = make_kernel();
    let user = kernel.spawn("user", PcbClass::User, 1, 0x100).unwrap();
    kernel.spawn("other", PcbClass::User, 5, 0x200).unwrap();

    let running = kernel.dispatch(SysRequest::Idle, ctx(0xb0));
    assert_eq!(kernel.dispatch(SysRequest::Shutdown, running), running);
    assert_eq!(kernel.active(), Some(user));
    assert_eq!(kernel.registry().len(), 2);
}

#[test]
fn system_shutdown_terminates_everything() {
    let mut kernel = make_kernel();
    kernel.spawn("sys", PcbClass::System, 0, 0x100).unwrap();
    kernel.spawn("u1", PcbClass::User, 3, 0x200).unwrap();
    kernel.spawn("u2", PcbClass::User, 4, 0x300).unwrap();
    let boot = ctx(0xb0);

    let running = kernel.dispatch(SysRequest::Idle, boot);
    assert_eq!(kernel.dispatch(SysRequest::Shutdown, running), boot);

    assert_eq!(kernel.active(), None);
    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.registry().peek_next(), None);
    assert!(kernel.find("u1").is_none());
    assert_eq!(kernel.memory().free_pages(), kernel.config().phys_pages);
}

#[test]
fn bootstrap_may_shut_down() {
    let mut kernel = make_kernel();
    kernel.spawn("u", PcbClass::User, 3, 0x200).unwrap();
    let boot = ctx(0xb0);

    assert_eq!(kernel.dispatch(SysRequest::Shutdown, boot), boot);
    assert!(kernel.registry().is_empty());
}

#[test]
fn running_process_cannot_be_administered() {
    let mut kernel = make_kernel();
    kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    kernel.dispatch(SysRequest::Idle, ctx(0xb0));

    assert!(kernel.delete("a").is_err());
    assert!(kernel.block("a").is_err());
    assert!(kernel.suspend("a").is_err());
    assert_eq!(running_count(&kernel), 1);
}

#[test]
fn malformed_raw_requests_change_nothing() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    kernel.spawn("b", PcbClass::User, 1, 0x200).unwrap();

    let running = kernel.dispatch_raw(OP_IDLE, [0; 4], ctx(0xb0));
    assert_eq!(kernel.active(), Some(a));

    assert_eq!(kernel.dispatch_raw(99, [0; 4], running), running);
    // read on a port that does not exist
    assert_eq!(kernel.dispatch_raw(3, [0x1234, 0, 16, 4], running), running);
    assert_eq!(kernel.active(), Some(a));
    assert_eq!(kernel.registry().queue_len(), 1);
}

#[test]
fn raw_exit_matches_decoded_exit() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    let boot = ctx(0xb0);

    let running = kernel.dispatch_raw(OP_IDLE, [0; 4], boot);
    assert_eq!(kernel.dispatch_raw(OP_EXIT, [0; 4], running), boot);
    assert!(kernel.pcb(a).is_none());
}

#[test]
fn at_most_one_process_runs() {
    let mut kernel = make_kernel();
    for (n, priority) in [3, 1, 4, 1, 5, 9, 2, 6].into_iter().enumerate() {
        kernel
            .spawn(&format!("p{n}"), PcbClass::User, priority, 0x100 * n as u32)
            .unwrap();
    }

    let mut current = ctx(0xb0);
    for round in 0..40 {
        let request = if round % 7 == 6 { SysRequest::Exit } else { SysRequest::Idle };
        current = kernel.dispatch(request, current);
        assert!(running_count(&kernel) <= 1);
        if let Some(active) = kernel.active() {
            assert!(!kernel.registry().is_queued(active));
        }
    }
}

#[test]
fn released_pcbs_never_come_back() {
    let mut kernel = make_kernel();
    let a = kernel.spawn("a", PcbClass::User, 1, 0x100).unwrap();
    kernel.spawn("b", PcbClass::User, 2, 0x200).unwrap();

    let running = kernel.dispatch(SysRequest::Idle, ctx(0xb0));
    let running = kernel.dispatch(SysRequest::Exit, running);
    kernel.dispatch(SysRequest::Idle, running);

    assert!(kernel.find("a").is_none());
    assert_ne!(kernel.registry().peek_next(), Some(a));
    assert_ne!(kernel.active(), Some(a));
}
