use crate::error::{PcieError, Result, Table};

pub const PCI_CAP_ID_MSI: u8 = 0x05;
pub const PCI_CAP_ID_PCIE: u8 = 0x10;
pub const PCI_CAP_ID_MSIX: u8 = 0x11;

/// Number of capability slots in the list.
pub const CAPABILITY_SLOTS: usize = 4;
/// Payload bytes carried by each capability.
pub const CAPABILITY_PAYLOAD_LEN: usize = 14;

/// One entry of the capability list.
///
/// A slot with `id == 0` is unused. `next` is reserved for a chain link and is always written as
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capability {
    pub id: u8,
    pub next: u8,
    pub payload: [u8; CAPABILITY_PAYLOAD_LEN],
}

impl Capability {
    pub fn is_free(&self) -> bool {
        self.id == 0
    }
}

/// Fixed-capacity capability list.
///
/// Insertion always targets the first unused slot. Entries are never removed or compacted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityList {
    slots: [Capability; CAPABILITY_SLOTS],
}

impl CapabilityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability and returns the slot it landed in.
    ///
    /// Payloads longer than [`CAPABILITY_PAYLOAD_LEN`] are truncated. Id 0 is rejected since it
    /// marks a free slot.
    pub fn add(&mut self, id: u8, payload: &[u8]) -> Result<usize> {
        if id == 0 {
            tracing::warn!("capability id 0 rejected");
            return Err(PcieError::InvalidCapabilityId(id));
        }
        let Some(index) = self.slots.iter().position(Capability::is_free) else {
            tracing::warn!(cap_id = format_args!("{id:#04x}"), "capability table full");
            return Err(PcieError::TableFull(Table::Capability));
        };

        let len = payload.len().min(CAPABILITY_PAYLOAD_LEN);
        let slot = &mut self.slots[index];
        slot.id = id;
        slot.next = 0;
        slot.payload = [0; CAPABILITY_PAYLOAD_LEN];
        slot.payload[..len].copy_from_slice(&payload[..len]);

        tracing::debug!(cap_id = format_args!("{id:#04x}"), slot = index, "capability added");
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&Capability> {
        self.slots.get(index).filter(|cap| !cap.is_free())
    }

    /// Finds the first capability with the given id.
    pub fn find(&self, id: u8) -> Option<&Capability> {
        if id == 0 {
            return None;
        }
        self.slots.iter().find(|cap| cap.id == id)
    }

    /// Occupied entries, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> + '_ {
        self.slots.iter().filter(|cap| !cap.is_free())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|cap| !cap.is_free())
    }

    pub fn slots(&self) -> &[Capability; CAPABILITY_SLOTS] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_fills_first_free_slot() {
        let mut caps = CapabilityList::new();
        assert_eq!(caps.add(PCI_CAP_ID_PCIE, &[0x10]).unwrap(), 0);
        assert_eq!(caps.add(PCI_CAP_ID_MSI, &[0x05]).unwrap(), 1);

        assert_eq!(caps.len(), 2);
        assert_eq!(caps.get(1).unwrap().id, PCI_CAP_ID_MSI);
        assert!(caps.get(2).is_none());
    }

    #[test]
    fn long_payloads_are_truncated() {
        let mut caps = CapabilityList::new();
        let payload: Vec<u8> = (1..=20).collect();
        caps.add(PCI_CAP_ID_MSIX, &payload).unwrap();

        let cap = caps.find(PCI_CAP_ID_MSIX).unwrap();
        assert_eq!(&cap.payload[..], &payload[..CAPABILITY_PAYLOAD_LEN]);
    }

    #[test]
    fn short_payloads_are_zero_padded() {
        let mut caps = CapabilityList::new();
        caps.add(0x09, &[0xaa, 0xbb]).unwrap();

        let cap = caps.get(0).unwrap();
        assert_eq!(cap.payload[..2], [0xaa, 0xbb]);
        assert!(cap.payload[2..].iter().all(|&b| b == 0));
        assert_eq!(cap.next, 0);
    }

    #[test]
    fn full_list_rejects_without_mutation() {
        let mut caps = CapabilityList::new();
        for id in 1..=CAPABILITY_SLOTS as u8 {
            caps.add(id, &[id]).unwrap();
        }
        assert!(caps.is_full());
        let before = caps.clone();

        assert_eq!(
            caps.add(0x42, &[0xff; 4]),
            Err(PcieError::TableFull(Table::Capability))
        );
        assert_eq!(caps, before);
    }

    #[test]
    fn zero_id_is_rejected() {
        let mut caps = CapabilityList::new();
        assert_eq!(caps.add(0, &[0xaa; 14]), Err(PcieError::InvalidCapabilityId(0)));
        assert_eq!(caps, CapabilityList::new());

        assert_eq!(caps.add(PCI_CAP_ID_MSI, &[0x05]), Ok(0));
        assert_eq!(caps.len(), 1);
    }

    #[test]
    fn find_ignores_free_slots() {
        let caps = CapabilityList::new();
        assert!(caps.find(0).is_none());
        assert!(caps.is_empty());
    }
}
