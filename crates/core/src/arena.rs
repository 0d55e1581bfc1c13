//! Generation-keyed texture arena.
//!
//! Every unit output texture lives in a slot owned by exactly one
//! [`TextureLease`]. Replacing a slot's texture bumps its generation and
//! moves the previous texture to a retiring list; retiring textures are
//! destroyed once the device reports that the last submission using them
//! has completed.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use dyntex_common::TextureDescriptor;
use dyntex_device::{CommandEncoder, GpuDevice, SubmissionIndex, TextureId};

use crate::error::TextureError;

/// Exclusive ownership of one arena slot.
///
/// Dropping a lease without [`TextureArena::release`] queues the slot for
/// retirement on the next [`TextureArena::collect`].
#[derive(Debug)]
pub struct TextureLease {
    slot: u32,
    orphans: Option<Sender<u32>>,
}

impl TextureLease {
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Drop for TextureLease {
    fn drop(&mut self) {
        if let Some(orphans) = self.orphans.take() {
            // The arena may already be gone; then so is the device.
            let _ = orphans.send(self.slot);
        }
    }
}

/// Snapshot of a slot's current texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentTexture {
    pub texture: TextureId,
    pub generation: u32,
    pub descriptor: TextureDescriptor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub current: usize,
    pub retiring: usize,
    pub released_total: u64,
}

struct Slot {
    generation: u32,
    current: Option<(TextureId, TextureDescriptor)>,
}

pub struct TextureArena {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    /// Last submission that referenced each arena-owned texture.
    last_use: HashMap<TextureId, Option<SubmissionIndex>>,
    retiring: Vec<TextureId>,
    orphan_tx: Sender<u32>,
    orphan_rx: Receiver<u32>,
    released_total: u64,
}

impl Default for TextureArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureArena {
    pub fn new() -> Self {
        let (orphan_tx, orphan_rx) = crossbeam_channel::unbounded();
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            last_use: HashMap::new(),
            retiring: Vec::new(),
            orphan_tx,
            orphan_rx,
            released_total: 0,
        }
    }

    /// Allocate a texture for compute output and sampling.
    pub fn create<D: GpuDevice>(
        &mut self,
        device: &mut D,
        descriptor: &TextureDescriptor,
        label: &str,
    ) -> Result<TextureLease, TextureError> {
        descriptor
            .validate_output()
            .map_err(|e| TextureError::InvalidInput(e.to_string()))?;
        let texture = device
            .create_texture(descriptor, label)
            .map_err(TextureError::AllocationFailed)?;
        self.last_use.insert(texture, None);

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.generation = entry.generation.wrapping_add(1);
                entry.current = Some((texture, *descriptor));
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    current: Some((texture, *descriptor)),
                });
                (self.slots.len() - 1) as u32
            }
        };
        tracing::debug!(slot, texture = ?texture, extent = %descriptor.extent, label, "texture created");
        Ok(TextureLease {
            slot,
            orphans: Some(self.orphan_tx.clone()),
        })
    }

    /// Swap the lease to a freshly allocated texture. The previous texture
    /// retires; on allocation failure it stays current.
    pub fn replace<D: GpuDevice>(
        &mut self,
        device: &mut D,
        lease: &TextureLease,
        descriptor: &TextureDescriptor,
        label: &str,
    ) -> Result<CurrentTexture, TextureError> {
        descriptor
            .validate_output()
            .map_err(|e| TextureError::InvalidInput(e.to_string()))?;
        let texture = device
            .create_texture(descriptor, label)
            .map_err(TextureError::AllocationFailed)?;
        self.last_use.insert(texture, None);

        let entry = &mut self.slots[lease.slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        let previous = entry.current.replace((texture, *descriptor));
        let generation = entry.generation;
        if let Some((old, old_desc)) = previous {
            tracing::debug!(
                slot = lease.slot,
                old = ?old,
                new = ?texture,
                from = %old_desc.extent,
                to = %descriptor.extent,
                "texture replaced"
            );
            self.retiring.push(old);
        }
        Ok(CurrentTexture {
            texture,
            generation,
            descriptor: *descriptor,
        })
    }

    pub fn current(&self, lease: &TextureLease) -> Option<CurrentTexture> {
        let entry = self.slots.get(lease.slot as usize)?;
        let (texture, descriptor) = entry.current?;
        Some(CurrentTexture {
            texture,
            generation: entry.generation,
            descriptor,
        })
    }

    /// The writable image for the command buffer being recorded. Each
    /// texture can be acquired once per encoder.
    pub fn acquire_writable(
        &self,
        lease: &TextureLease,
        encoder: &mut CommandEncoder,
    ) -> Result<TextureId, TextureError> {
        let current = self.current(lease).ok_or_else(|| {
            TextureError::EncodingFailed(format!("slot {} has no texture", lease.slot))
        })?;
        if !encoder.claim_writable(current.texture) {
            return Err(TextureError::EncodingFailed(format!(
                "texture {:?} already acquired for writing in `{}`",
                current.texture,
                encoder.label()
            )));
        }
        Ok(current.texture)
    }

    /// Stamp a texture with a submission that references it. Returns
    /// `false` for textures the arena does not own.
    pub fn mark_used(&mut self, texture: TextureId, submission: SubmissionIndex) -> bool {
        match self.last_use.get_mut(&texture) {
            Some(last) => {
                *last = Some(last.map_or(submission, |prev| prev.max(submission)));
                true
            }
            None => false,
        }
    }

    /// Give the lease's slot back and retire its texture.
    pub fn release(&mut self, mut lease: TextureLease) {
        lease.orphans = None;
        self.retire_slot(lease.slot);
    }

    fn retire_slot(&mut self, slot: u32) {
        let Some(entry) = self.slots.get_mut(slot as usize) else {
            return;
        };
        if let Some((texture, _)) = entry.current.take() {
            self.retiring.push(texture);
            self.free_slots.push(slot);
        }
    }

    /// Destroy retiring textures whose last use has completed. Textures that
    /// were never submitted go immediately. Returns how many were destroyed.
    pub fn collect<D: GpuDevice>(
        &mut self,
        device: &mut D,
        completed: Option<SubmissionIndex>,
    ) -> usize {
        while let Ok(slot) = self.orphan_rx.try_recv() {
            tracing::debug!(slot, "collecting dropped lease");
            self.retire_slot(slot);
        }

        let mut released = 0;
        let last_use = &mut self.last_use;
        self.retiring.retain(|texture| {
            let drained = match last_use.get(texture).copied().flatten() {
                None => true,
                Some(used) => completed.is_some_and(|done| used <= done),
            };
            if drained {
                device.destroy_texture(*texture);
                last_use.remove(texture);
                released += 1;
            }
            !drained
        });
        if released > 0 {
            tracing::debug!(released, pending = self.retiring.len(), "retired textures destroyed");
        }
        self.released_total += released as u64;
        released
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            current: self.slots.iter().filter(|s| s.current.is_some()).count(),
            retiring: self.retiring.len(),
            released_total: self.released_total,
        }
    }

    pub fn owns(&self, texture: TextureId) -> bool {
        self.last_use.contains_key(&texture)
    }
}
