pub mod registry {
    use std::cmp::Ordering;

    use tracing::debug;

    use crate::error::error::{KernelError, KernelResult, ValidationError};
    use crate::memory::memory::PhysMemory;
    use crate::ordered_list::ordered_list::OrderedList;
    use crate::pcb::pcb::{ExecState, Pcb, PcbClass, PcbHandle};

    pub const MAX_PRIORITY: i32 = 9;

    // ordering key captured at insert time. every state change on a queued
    // PCB goes through remove + reinsert, so the key never goes stale.
    #[derive(Copy, Clone, Debug)]
    struct QueueEntry {
        handle: PcbHandle,
        ineligible: bool,
        priority: u8,
    }

    /// blocked/suspended entries after everything else, in arrival order;
    /// eligible entries by ascending priority, ties in arrival order.
    fn queue_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
        match (a.ineligible, b.ineligible) {
            (false, false) => a.priority.cmp(&b.priority),
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (true, true) => Ordering::Equal,
        }
    }

    struct Slot {
        generation: u32,
        pcb: Option<Pcb>,
    }

    /// Owns every PCB (arena of generation-checked slots) plus the single
    /// ordered queue of PCBs that are not running.
    pub struct Registry {
        slots: Vec<Slot>,
        queue: OrderedList<QueueEntry>,
        max_name_len: usize,
    }

    impl Registry {
        pub fn new(max_name_len: usize) -> Registry {
            Registry {
                slots: Vec::new(),
                queue: OrderedList::with_comparator(queue_order),
                max_name_len,
            }
        }

        /// validate and allocate a new PCB. the PCB is not queued yet.
        ///
        /// every check runs before the stack is allocated, so a rejected
        /// request costs nothing.
        pub fn create(
            &mut self,
            memory: &mut PhysMemory,
            name: &str,
            class: PcbClass,
            priority: i32,
            stack_pages: u16,
        ) -> KernelResult<PcbHandle> {
            if name.is_empty() || name.len() > self.max_name_len || self.find(name).is_some() {
                return Err(ValidationError::InvalidName.into());
            }
            if !(0..=MAX_PRIORITY).contains(&priority) {
                return Err(ValidationError::InvalidPriority.into());
            }

            let stack = memory.alloc(stack_pages)?;
            let pcb = Pcb::new(name, class, priority as u8, stack);

            let handle = match self.slots.iter().position(|slot| slot.pcb.is_none()) {
                Some(idx) => {
                    let slot = &mut self.slots[idx];
                    slot.generation = slot.generation.wrapping_add(1);
                    slot.pcb = Some(pcb);
                    PcbHandle {
                        index: idx as u32,
                        generation: slot.generation,
                    }
                }
                None => {
                    self.slots.push(Slot {
                        generation: 0,
                        pcb: Some(pcb),
                    });
                    PcbHandle {
                        index: (self.slots.len() - 1) as u32,
                        generation: 0,
                    }
                }
            };

            debug!(name, ?class, priority, "pcb created");
            Ok(handle)
        }

        /// drop the PCB from the queue and the arena and give its stack back.
        pub fn destroy(&mut self, memory: &mut PhysMemory, handle: PcbHandle) -> bool {
            self.remove(handle);
            let Some(slot) = self.slot_mut(handle) else {
                return false;
            };
            match slot.pcb.take() {
                Some(pcb) => {
                    debug!(name = pcb.name(), "pcb released");
                    memory.free(pcb.stack);
                    true
                }
                None => false,
            }
        }

        pub fn get(&self, handle: PcbHandle) -> Option<&Pcb> {
            self.slots
                .get(handle.index as usize)
                .filter(|slot| slot.generation == handle.generation)
                .and_then(|slot| slot.pcb.as_ref())
        }

        pub(crate) fn get_mut(&mut self, handle: PcbHandle) -> Option<&mut Pcb> {
            self.slot_mut(handle).and_then(|slot| slot.pcb.as_mut())
        }

        fn slot_mut(&mut self, handle: PcbHandle) -> Option<&mut Slot> {
            self.slots
                .get_mut(handle.index as usize)
                .filter(|slot| slot.generation == handle.generation)
        }

        pub fn find(&self, name: &str) -> Option<PcbHandle> {
            self.iter()
                .find(|(_, pcb)| pcb.name() == name)
                .map(|(handle, _)| handle)
        }

        /// queue a PCB under its current state. refuses unknown, running or
        /// already queued PCBs.
        pub fn insert(&mut self, handle: PcbHandle) -> bool {
            if self.is_queued(handle) {
                return false;
            }
            let Some(pcb) = self.get(handle) else {
                return false;
            };
            if pcb.exec_state() == ExecState::Running {
                return false;
            }
            let entry = QueueEntry {
                handle,
                ineligible: !pcb.is_eligible(),
                priority: pcb.priority(),
            };
            self.queue.insert(entry);
            true
        }

        pub fn remove(&mut self, handle: PcbHandle) -> bool {
            match self.queue.position(|entry| entry.handle == handle) {
                Some(idx) => self.queue.remove_at(idx).is_some(),
                None => false,
            }
        }

        pub fn is_queued(&self, handle: PcbHandle) -> bool {
            self.queue.position(|entry| entry.handle == handle).is_some()
        }

        pub fn peek_next(&self) -> Option<PcbHandle> {
            self.queue.first().map(|entry| entry.handle)
        }

        pub fn poll_next(&mut self) -> Option<PcbHandle> {
            self.queue.pop_front().map(|entry| entry.handle)
        }

        /// mutate a PCB's scheduling attributes without breaking the
        /// queue order: pull it out, apply the change, put it back.
        pub(crate) fn update<F: FnOnce(&mut Pcb)>(&mut self, handle: PcbHandle, f: F) -> KernelResult<()> {
            let queued = self.remove(handle);
            let pcb = self.get_mut(handle).ok_or(KernelError::NotFound)?;
            f(pcb);
            if queued {
                self.insert(handle);
            }
            Ok(())
        }

        /// queued PCBs front to back.
        pub fn queued(&self) -> impl Iterator<Item = (PcbHandle, &Pcb)> + '_ {
            self.queue
                .iter()
                .filter_map(|entry| self.get(entry.handle).map(|pcb| (entry.handle, pcb)))
        }

        pub fn ready(&self) -> impl Iterator<Item = (PcbHandle, &Pcb)> + '_ {
            self.queued_in(ExecState::Ready)
        }

        pub fn blocked(&self) -> impl Iterator<Item = (PcbHandle, &Pcb)> + '_ {
            self.queued_in(ExecState::Blocked)
        }

        fn queued_in(&self, state: ExecState) -> impl Iterator<Item = (PcbHandle, &Pcb)> + '_ {
            self.queued().filter(move |(_, pcb)| pcb.exec_state() == state)
        }

        /// every live PCB in slot order, queued or not.
        pub fn iter(&self) -> impl Iterator<Item = (PcbHandle, &Pcb)> + '_ {
            self.slots.iter().enumerate().filter_map(|(idx, slot)| {
                slot.pcb.as_ref().map(|pcb| {
                    (
                        PcbHandle {
                            index: idx as u32,
                            generation: slot.generation,
                        },
                        pcb,
                    )
                })
            })
        }

        pub fn len(&self) -> usize {
            self.iter().count()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn queue_len(&self) -> usize {
            self.queue.len()
        }
    }
}
