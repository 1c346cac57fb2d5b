use std::sync::Arc;

use pcie_model::board::{BOARD_REG_PCI, PCI_STATUS_INTERRUPT};
use pcie_model::{
    notification_channel, ContextHandle, DeviceConfig, DeviceContext, InterruptEvent,
    InterruptKind, TaskNotifier,
};

fn task() -> (Arc<TaskNotifier>, ContextHandle) {
    let notifier = Arc::new(TaskNotifier::new());
    (notifier.clone(), ContextHandle::from(notifier))
}

fn endpoint() -> DeviceContext<Vec<(u32, u32)>> {
    DeviceContext::with_config(&DeviceConfig::endpoint(), Vec::new())
}

#[test]
fn legacy_registration_and_msi_vector_both_fire() {
    let mut dev = endpoint();
    let (legacy, legacy_ctx) = task();
    let (msi, msi_ctx) = task();
    dev.register_interrupt(InterruptKind::Msi, 2, legacy_ctx)
        .unwrap();
    dev.configure_msi(2, msi_ctx).unwrap();

    let delivery = dev.generate_interrupt(InterruptKind::Msi, 2);
    assert_eq!(delivery.registrations, 1);
    assert!(delivery.vector_table);
    assert_eq!((legacy.take(), msi.take()), (1, 1));

    dev.set_msi_mask(2, true).unwrap();
    let delivery = dev.generate_interrupt(InterruptKind::Msi, 2);
    assert_eq!(delivery.registrations, 1);
    assert!(!delivery.vector_table);
    assert_eq!((legacy.take(), msi.take()), (1, 0));
}

#[test]
fn reconfiguring_a_vector_replaces_its_owner() {
    let mut dev = endpoint();
    let (a, ctx_a) = task();
    let (b, ctx_b) = task();

    dev.configure_msi(3, ctx_a).unwrap();
    dev.set_msi_mask(3, true).unwrap();
    dev.configure_msi(3, ctx_b.clone()).unwrap();

    let entry = dev.interrupts().msi_vector(3).unwrap();
    assert!(entry.enabled);
    assert!(!entry.masked);
    assert!(entry.context.as_ref().unwrap().same_context(&ctx_b));

    dev.generate_interrupt(InterruptKind::Msi, 3);
    assert_eq!((a.pending(), b.pending()), (0, 1));
}

#[test]
fn msix_vector_delivers_through_bounded_channel() {
    let mut dev = endpoint();
    let (tx, rx) = notification_channel(8);
    dev.configure_msix(7, ContextHandle::from(Arc::new(tx)))
        .unwrap();

    for _ in 0..3 {
        assert!(dev.simulate_event(InterruptKind::Msix, 7).vector_table);
    }

    let events: Vec<InterruptEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        events,
        vec![
            InterruptEvent {
                kind: InterruptKind::Msix,
                vector: 7,
            };
            3
        ]
    );
}

#[test]
fn legacy_kinds_never_consult_vector_tables() {
    let mut dev = endpoint();
    let (msi, msi_ctx) = task();
    dev.configure_msi(1, msi_ctx).unwrap();

    for kind in [InterruptKind::Legacy, InterruptKind::Intc, InterruptKind::None] {
        assert_eq!(dev.generate_interrupt(kind, 1).notified(), 0);
    }
    assert_eq!(msi.pending(), 0);
}

#[test]
fn every_event_writes_the_interrupt_status_code() {
    let mut dev = endpoint();
    dev.board_mut().clear();

    dev.generate_interrupt(InterruptKind::Msi, 0);
    dev.generate_interrupt(InterruptKind::Legacy, -5);
    dev.simulate_event(InterruptKind::Msix, 100);

    assert_eq!(dev.board(), &vec![(BOARD_REG_PCI, PCI_STATUS_INTERRUPT); 3]);
}

#[test]
fn contexts_can_wait_on_another_thread() {
    let mut dev = endpoint();
    let (tx, rx) = notification_channel(1);
    dev.register_interrupt(InterruptKind::Legacy, 0, ContextHandle::from(Arc::new(tx)))
        .unwrap();

    let waiter = std::thread::spawn(move || rx.recv_blocking().unwrap());
    dev.generate_interrupt(InterruptKind::Legacy, 0);

    assert_eq!(
        waiter.join().unwrap(),
        InterruptEvent {
            kind: InterruptKind::Legacy,
            vector: 0,
        }
    );
}
