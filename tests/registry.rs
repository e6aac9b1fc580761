use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mpx_core::config::config::KernelConfig;
use mpx_core::device::device::VirtualUart;
use mpx_core::error::error::{KernelError, ValidationError};
use mpx_core::kernel::kernel::Kernel;
use mpx_core::pcb::pcb::{DispatchState, ExecState, PcbClass};

fn make_kernel() -> Kernel<VirtualUart> {
    Kernel::new(KernelConfig::default(), VirtualUart::new())
}

fn queued_names(kernel: &Kernel<VirtualUart>) -> Vec<String> {
    kernel
        .registry()
        .queued()
        .map(|(_, pcb)| pcb.name().to_string())
        .collect()
}

fn assert_queue_ordered(kernel: &Kernel<VirtualUart>) {
    let mut seen_ineligible = false;
    let mut last_priority = 0;
    for (_, pcb) in kernel.registry().queued() {
        if pcb.is_eligible() {
            assert!(!seen_ineligible, "{} queued behind an ineligible pcb", pcb.name());
            assert!(pcb.priority() >= last_priority, "{} out of priority order", pcb.name());
            last_priority = pcb.priority();
        } else {
            seen_ineligible = true;
        }
    }
}

#[test]
fn lower_priority_value_runs_first() {
    let mut kernel = make_kernel();
    let p1 = kernel.pcb_setup("p1", PcbClass::User, 5).unwrap();
    let p2 = kernel.pcb_setup("p2", PcbClass::User, 2).unwrap();
    assert!(kernel.insert(p1));
    assert!(kernel.insert(p2));

    assert_eq!(kernel.registry().peek_next(), Some(p2));
    assert_eq!(kernel.registry().queue_len(), 2);
}

#[test]
fn overlong_name_registers_nothing() {
    let mut kernel = make_kernel();
    let free = kernel.memory().free_pages();

    let err = kernel.pcb_setup("toolongname123", PcbClass::User, 3).unwrap_err();
    assert_eq!(err, KernelError::Validation(ValidationError::InvalidName));
    assert!(kernel.find("toolongname123").is_none());
    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.memory().free_pages(), free);
}

#[test]
fn setup_validates_before_allocating() {
    let mut kernel = make_kernel();
    let free = kernel.memory().free_pages();
    kernel.pcb_setup("dup", PcbClass::User, 1).unwrap();

    let cases = [
        ("", 1, ValidationError::InvalidName),
        ("dup", 1, ValidationError::InvalidName),
        ("ok", -1, ValidationError::InvalidPriority),
        ("ok", 10, ValidationError::InvalidPriority),
    ];
    for (name, priority, expected) in cases {
        assert_eq!(
            kernel.pcb_setup(name, PcbClass::User, priority),
            Err(KernelError::Validation(expected))
        );
    }
    assert_eq!(kernel.registry().len(), 1);
    assert_eq!(kernel.memory().free_pages(), free - 1);
    assert_eq!("2".parse::<PcbClass>(), Err(KernelError::Validation(ValidationError::InvalidClass)));
    assert_eq!(PcbClass::try_from(1), Ok(PcbClass::System));
}

#[test]
fn exhausted_memory_is_reported() {
    let config = KernelConfig {
        phys_pages: 2,
        ..KernelConfig::default()
    };
    let mut kernel = Kernel::new(config, VirtualUart::new());
    kernel.pcb_setup("a", PcbClass::User, 1).unwrap();
    kernel.pcb_setup("b", PcbClass::User, 1).unwrap();
    assert_eq!(
        kernel.pcb_setup("c", PcbClass::User, 1),
        Err(KernelError::ResourceExhausted)
    );
    assert!(kernel.find("c").is_none());
}

#[test]
fn insert_and_remove_report_membership() {
    let mut kernel = make_kernel();
    let p = kernel.pcb_setup("p", PcbClass::User, 4).unwrap();

    assert!(!kernel.remove(p));
    assert!(kernel.insert(p));
    assert!(!kernel.insert(p));
    assert!(kernel.remove(p));
    assert!(!kernel.remove(p));
    assert_eq!(kernel.registry().queue_len(), 0);
    // still registered, just not queued
    assert_eq!(kernel.find("p"), Some(p));
}

#[test]
fn equal_priorities_keep_arrival_order() {
    let mut kernel = make_kernel();
    for name in ["a", "b", "c"] {
        let h = kernel.pcb_setup(name, PcbClass::User, 3).unwrap();
        kernel.insert(h);
    }
    assert_eq!(queued_names(&kernel), ["a", "b", "c"]);
}

#[test]
fn admin_changes_reorder_queue() {
    let mut kernel = make_kernel();
    for (name, priority) in [("hi", 1), ("mid", 4), ("lo", 8)] {
        let h = kernel.pcb_setup(name, PcbClass::User, priority).unwrap();
        kernel.insert(h);
    }

    kernel.block("hi").unwrap();
    assert_eq!(queued_names(&kernel), ["mid", "lo", "hi"]);

    kernel.suspend("mid").unwrap();
    assert_eq!(queued_names(&kernel), ["lo", "hi", "mid"]);

    kernel.unblock("hi").unwrap();
    kernel.set_priority("lo", 9).unwrap();
    assert_eq!(queued_names(&kernel), ["hi", "lo", "mid"]);

    kernel.resume("mid").unwrap();
    assert_eq!(queued_names(&kernel), ["hi", "mid", "lo"]);

    let mid = kernel.find("mid").unwrap();
    assert_eq!(kernel.pcb(mid).unwrap().dispatch_state(), DispatchState::NotSuspended);
    assert_eq!(kernel.pcb(mid).unwrap().exec_state(), ExecState::Ready);
    assert_queue_ordered(&kernel);
}

#[test]
fn ready_and_blocked_views_follow_queue_order() {
    let mut kernel = make_kernel();
    for (name, priority) in [("a", 4), ("b", 1), ("c", 7), ("d", 2)] {
        kernel.spawn(name, PcbClass::User, priority, 0x100).unwrap();
    }
    kernel.block("c").unwrap();
    kernel.block("b").unwrap();

    let ready: Vec<String> = kernel.registry().ready().map(|(_, pcb)| pcb.name().to_string()).collect();
    let blocked: Vec<String> = kernel.registry().blocked().map(|(_, pcb)| pcb.name().to_string()).collect();
    assert_eq!(ready, ["d", "a"]);
    assert_eq!(blocked, ["c", "b"]);
    assert_eq!(queued_names(&kernel), ["d", "a", "c", "b"]);
}

#[test]
fn admin_commands_enforce_class_rules() {
    let mut kernel = make_kernel();
    let sys = kernel.pcb_setup("sys", PcbClass::System, 0).unwrap();
    kernel.insert(sys);

    assert_eq!(kernel.delete("sys"), Err(KernelError::Unauthorized));
    assert_eq!(kernel.suspend("sys"), Err(KernelError::Unauthorized));
    assert_eq!(kernel.block("nobody"), Err(KernelError::NotFound));
    assert_eq!(
        kernel.set_priority("sys", 12),
        Err(KernelError::Validation(ValidationError::InvalidPriority))
    );
    assert!(kernel.find("sys").is_some());
}

#[test]
fn deleted_pcb_handle_never_resolves_again() {
    let mut kernel = make_kernel();
    let old = kernel.pcb_setup("p", PcbClass::User, 2).unwrap();
    kernel.insert(old);
    let free = kernel.memory().free_pages();

    kernel.delete("p").unwrap();
    assert!(kernel.pcb(old).is_none());
    assert_eq!(kernel.registry().peek_next(), None);
    assert_eq!(kernel.memory().free_pages(), free + 1);

    // the slot is reused but the stale handle stays dead.
    let new = kernel.pcb_setup("p", PcbClass::User, 2).unwrap();
    assert_ne!(old, new);
    assert!(kernel.pcb(old).is_none());
    assert!(!kernel.insert(old));
}

#[test]
fn random_admin_traffic_keeps_queue_ordered() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut kernel = make_kernel();
    let names: Vec<String> = (0..12).map(|n| format!("p{n}")).collect();
    for name in &names {
        let priority = rng.random_range(0..=9);
        let h = kernel.pcb_setup(name, PcbClass::User, priority).unwrap();
        kernel.insert(h);
    }

    for _ in 0..500 {
        let name = &names[rng.random_range(0..names.len())];
        let _ = match rng.random_range(0..5) {
            0 => kernel.block(name),
            1 => kernel.unblock(name),
            2 => kernel.suspend(name),
            3 => kernel.resume(name),
            _ => kernel.set_priority(name, rng.random_range(0..=9)),
        };
        assert_queue_ordered(&kernel);
    }
    assert_eq!(kernel.registry().queue_len(), names.len());
}
