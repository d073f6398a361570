//! Generational arena owning every patch mesh the manager holds.
//!
//! Draw lists store [`PatchId`]s rather than references, so a patch can sit in
//! both a terrain list and a water list while the arena stays its single owner.
//! Removing a patch bumps its slot generation; any id still pointing at the old
//! generation resolves to `None`.

use crate::mesh::PatchMesh;

/// Stable handle to a patch in a [`PatchArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatchId {
    index: u32,
    generation: u32,
}

impl PatchId {
    /// Slot index in the arena.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    mesh: Option<PatchMesh>,
}

/// Slot arena of patch meshes with free-slot reuse.
#[derive(Debug, Default)]
pub struct PatchArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl PatchArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `mesh` and return its id.
    pub fn insert(&mut self, mesh: PatchMesh) -> PatchId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.mesh = Some(mesh);
            return PatchId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            mesh: Some(mesh),
        });
        PatchId {
            index,
            generation: 0,
        }
    }

    /// Borrow the mesh behind `id`, `None` if it has been removed.
    pub fn get(&self, id: PatchId) -> Option<&PatchMesh> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.mesh.as_ref())
    }

    /// Mutably borrow the mesh behind `id`.
    pub fn get_mut(&mut self, id: PatchId) -> Option<&mut PatchMesh> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.mesh.as_mut())
    }

    /// Whether `id` still refers to a live mesh.
    pub fn contains(&self, id: PatchId) -> bool {
        self.get(id).is_some()
    }

    /// Remove and return the mesh behind `id`. The slot is reused by a later insert.
    pub fn remove(&mut self, id: PatchId) -> Option<PatchMesh> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let mesh = slot.mesh.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(mesh)
    }

    /// Number of live meshes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no meshes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live meshes and their ids.
    pub fn iter(&self) -> impl Iterator<Item = (PatchId, &PatchMesh)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.mesh.as_ref().map(|mesh| {
                (
                    PatchId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    mesh,
                )
            })
        })
    }

    /// Remove every live mesh, returning them in slot order.
    pub fn drain(&mut self) -> Vec<PatchMesh> {
        let ids: Vec<PatchId> = self.iter().map(|(id, _)| id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::BufferHandle;
    use crate::mesh::PatchBuffers;
    use glam::DVec3;
    use terra_cull::PatchBounds;

    fn mesh(x: f64) -> PatchMesh {
        PatchMesh::new(
            PatchBounds::from_center_half_extents(DVec3::new(x, 0.0, 0.0), DVec3::ONE),
            PatchBuffers {
                vertex: BufferHandle::new(0),
                index: BufferHandle::new(1),
                index_count: 6,
                surface_index_count: 6,
            },
        )
    }

    #[test]
    fn test_insert_and_get() {
        let mut arena = PatchArena::new();
        let a = arena.insert(mesh(1.0));
        let b = arena.insert(mesh(2.0));
        assert_eq!(arena.len(), 2);
        assert_ne!(a, b);
        assert_eq!(arena.get(b).unwrap().bounds().center().x, 2.0);
    }

    #[test]
    fn test_removed_id_goes_stale_and_slot_is_reused() {
        let mut arena = PatchArena::new();
        let a = arena.insert(mesh(1.0));
        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        let b = arena.insert(mesh(3.0));
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(arena.get(a).is_none());
        assert!(arena.contains(b));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_drain_empties_arena() {
        let mut arena = PatchArena::new();
        let ids: Vec<_> = (0..4).map(|i| arena.insert(mesh(i as f64))).collect();
        arena.remove(ids[1]);

        let drained = arena.drain();
        assert_eq!(drained.len(), 3);
        assert!(arena.is_empty());
        assert!(ids.iter().all(|&id| !arena.contains(id)));
    }
}
