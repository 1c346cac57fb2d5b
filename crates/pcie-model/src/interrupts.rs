//! Interrupt registration and delivery.
//!
//! Execution contexts are represented by [`ContextHandle`], a shared handle to anything that
//! implements [`Notify`]. The controller never blocks on a context: notification is
//! fire-and-forget.
//!
//! Generating an interrupt fans out along two independent paths:
//! 1. every registration whose `(kind, vector)` matches exactly, and
//! 2. for MSI / MSI-X, the vector-table entry for `vector` when it is enabled and unmasked.
//!
//! Both paths may fire for the same event.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};

use crate::board::{BoardRegisterWrite, BOARD_REG_PCI, PCI_STATUS_INTERRUPT};
use crate::error::{PcieError, Resource, Result, Table};

pub const INTERRUPT_REGISTRATIONS: usize = 8;
pub const MSI_VECTORS: usize = 8;
pub const MSIX_VECTORS: usize = 8;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum InterruptKind {
    #[default]
    None,
    Legacy,
    Msi,
    Msix,
    Intc,
}

impl fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Legacy => "legacy",
            Self::Msi => "msi",
            Self::Msix => "msix",
            Self::Intc => "intc",
        })
    }
}

/// Payload handed to a notified context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InterruptEvent {
    pub kind: InterruptKind,
    pub vector: i32,
}

/// Something that can be woken by an interrupt.
pub trait Notify: Send + Sync {
    fn notify(&self, event: InterruptEvent);
}

/// Shared handle identifying one execution context.
#[derive(Clone)]
pub struct ContextHandle(Arc<dyn Notify>);

impl ContextHandle {
    pub fn new(target: Arc<dyn Notify>) -> Self {
        Self(target)
    }

    pub fn notify(&self, event: InterruptEvent) {
        self.0.notify(event);
    }

    /// Whether both handles refer to the same context.
    pub fn same_context(&self, other: &ContextHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextHandle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl<N: Notify + 'static> From<Arc<N>> for ContextHandle {
    fn from(target: Arc<N>) -> Self {
        Self(target)
    }
}

/// Counting notification, the "give"/"take" pair of a task notification value.
#[derive(Debug, Default)]
pub struct TaskNotifier {
    pending: AtomicU32,
}

impl TaskNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns the number of notifications received since the last take and clears it.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

impl Notify for TaskNotifier {
    fn notify(&self, _event: InterruptEvent) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }
}

/// Sending half of a bounded notification queue. Never blocks; events that do not fit are
/// dropped.
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: Sender<InterruptEvent>,
}

impl Notify for ChannelNotifier {
    fn notify(&self, event: InterruptEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(kind = %event.kind, vector = event.vector, "notification queue full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(kind = %event.kind, vector = event.vector, "notification receiver gone, event dropped");
            }
        }
    }
}

/// Creates a bounded queue of interrupt events with `capacity` slots.
///
/// The receiver can be drained with `try_recv`, waited on with `recv_blocking` from a plain
/// thread, or awaited with `recv`.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn notification_channel(capacity: usize) -> (ChannelNotifier, Receiver<InterruptEvent>) {
    let (tx, rx) = async_channel::bounded(capacity);
    (ChannelNotifier { tx }, rx)
}

/// One registration slot. A slot is free when `context` is `None`.
#[derive(Debug, Clone, Default)]
pub struct InterruptRegistration {
    pub kind: InterruptKind,
    pub vector: i32,
    pub context: Option<ContextHandle>,
}

impl InterruptRegistration {
    pub fn is_free(&self) -> bool {
        self.context.is_none()
    }
}

/// MSI or MSI-X vector-table entry.
#[derive(Debug, Clone, Default)]
pub struct VectorEntry {
    pub enabled: bool,
    pub masked: bool,
    pub context: Option<ContextHandle>,
}

impl VectorEntry {
    fn deliverable(&self) -> Option<&ContextHandle> {
        if self.enabled && !self.masked {
            self.context.as_ref()
        } else {
            None
        }
    }
}

/// Which fan-out paths delivered an interrupt.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct InterruptDelivery {
    /// Number of matching registrations that were notified.
    pub registrations: usize,
    /// Whether the MSI / MSI-X vector-table entry was notified.
    pub vector_table: bool,
}

impl InterruptDelivery {
    pub fn notified(&self) -> usize {
        self.registrations + usize::from(self.vector_table)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    registrations: [InterruptRegistration; INTERRUPT_REGISTRATIONS],
    msi: [VectorEntry; MSI_VECTORS],
    msix: [VectorEntry; MSIX_VECTORS],
}

fn vector_index(vector: i32, len: usize) -> Option<usize> {
    usize::try_from(vector).ok().filter(|&v| v < len)
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Stores a registration in the first free slot and returns the slot index.
    pub fn register(
        &mut self,
        kind: InterruptKind,
        vector: i32,
        context: ContextHandle,
    ) -> Result<usize> {
        let Some(index) = self
            .registrations
            .iter()
            .position(InterruptRegistration::is_free)
        else {
            tracing::warn!(%kind, vector, "interrupt registration table full");
            return Err(PcieError::TableFull(Table::InterruptRegistration));
        };
        self.registrations[index] = InterruptRegistration {
            kind,
            vector,
            context: Some(context),
        };
        tracing::info!(%kind, vector, slot = index, "context registered for interrupt");
        Ok(index)
    }

    fn vector_entry_mut(&mut self, kind: InterruptKind, vector: i32) -> Result<&mut VectorEntry> {
        let (table, resource) = match kind {
            InterruptKind::Msix => (&mut self.msix[..], Resource::MsixVector),
            _ => (&mut self.msi[..], Resource::MsiVector),
        };
        let len = table.len();
        match vector_index(vector, len) {
            Some(index) => Ok(&mut table[index]),
            None => {
                tracing::warn!(%kind, vector, "vector out of range");
                Err(PcieError::vector_out_of_range(resource, vector, len))
            }
        }
    }

    fn configure_vector(
        &mut self,
        kind: InterruptKind,
        vector: i32,
        context: ContextHandle,
    ) -> Result<()> {
        let entry = self.vector_entry_mut(kind, vector)?;
        *entry = VectorEntry {
            enabled: true,
            masked: false,
            context: Some(context),
        };
        tracing::info!(%kind, vector, "vector configured");
        Ok(())
    }

    /// Enables and unmasks MSI `vector`, routing it to `context`. Reconfiguring overwrites.
    pub fn configure_msi(&mut self, vector: i32, context: ContextHandle) -> Result<()> {
        self.configure_vector(InterruptKind::Msi, vector, context)
    }

    /// Enables and unmasks MSI-X `vector`, routing it to `context`. Reconfiguring overwrites.
    pub fn configure_msix(&mut self, vector: i32, context: ContextHandle) -> Result<()> {
        self.configure_vector(InterruptKind::Msix, vector, context)
    }

    pub fn set_msi_mask(&mut self, vector: i32, masked: bool) -> Result<()> {
        self.vector_entry_mut(InterruptKind::Msi, vector)?.masked = masked;
        tracing::debug!(vector, masked, "MSI mask updated");
        Ok(())
    }

    pub fn set_msix_mask(&mut self, vector: i32, masked: bool) -> Result<()> {
        self.vector_entry_mut(InterruptKind::Msix, vector)?.masked = masked;
        tracing::debug!(vector, masked, "MSI-X mask updated");
        Ok(())
    }

    pub fn registrations(&self) -> &[InterruptRegistration; INTERRUPT_REGISTRATIONS] {
        &self.registrations
    }

    pub fn msi_vector(&self, vector: i32) -> Option<&VectorEntry> {
        vector_index(vector, MSI_VECTORS).map(|index| &self.msi[index])
    }

    pub fn msix_vector(&self, vector: i32) -> Option<&VectorEntry> {
        vector_index(vector, MSIX_VECTORS).map(|index| &self.msix[index])
    }

    /// Delivers an interrupt to every matching context and reports it on the board.
    pub fn generate<B: BoardRegisterWrite + ?Sized>(
        &self,
        kind: InterruptKind,
        vector: i32,
        board: &mut B,
    ) -> InterruptDelivery {
        tracing::debug!(%kind, vector, "interrupt generated");
        let event = InterruptEvent { kind, vector };
        let mut delivery = InterruptDelivery::default();

        for reg in &self.registrations {
            if reg.kind != kind || reg.vector != vector {
                continue;
            }
            if let Some(context) = &reg.context {
                context.notify(event);
                delivery.registrations += 1;
                tracing::debug!(%kind, vector, "notified registered context");
            }
        }

        let entry = match kind {
            InterruptKind::Msi => self.msi_vector(vector),
            InterruptKind::Msix => self.msix_vector(vector),
            _ => None,
        };
        if let Some(context) = entry.and_then(VectorEntry::deliverable) {
            context.notify(event);
            delivery.vector_table = true;
            tracing::debug!(%kind, vector, "vector delivered to context");
        }

        board.write_reg(BOARD_REG_PCI, PCI_STATUS_INTERRUPT);
        delivery
    }
}
