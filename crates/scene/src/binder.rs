use std::collections::HashMap;

use dyntex_common::{QuadId, UnitId};
use dyntex_core::MaterialHandle;

use crate::quad::{QuadMaterial, QuadStore};

/// Receives unit outputs for display on renderable surfaces.
pub trait SurfaceBinder {
    /// Point `quad` at `material`. Called every sync; implementations skip
    /// work when the material is unchanged.
    fn bind(&mut self, quad: QuadId, material: MaterialHandle);

    /// The quad's unit has no output (released or never constructed).
    fn unbind(&mut self, quad: QuadId);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub bound: usize,
    pub unbound: usize,
}

/// Bind every dynamic quad to its unit's current material.
pub fn sync_materials<B, F>(quads: &QuadStore, lookup: F, binder: &mut B) -> SyncReport
where
    B: SurfaceBinder + ?Sized,
    F: Fn(UnitId) -> Option<MaterialHandle>,
{
    let mut report = SyncReport::default();
    for (id, quad) in quads.iter() {
        let QuadMaterial::Dynamic(unit) = quad.material else {
            continue;
        };
        match lookup(unit) {
            Some(material) => {
                binder.bind(id, material);
                report.bound += 1;
            }
            None => {
                binder.unbind(id);
                report.unbound += 1;
            }
        }
    }
    report
}

/// Headless binder that remembers the last material per quad.
#[derive(Debug, Default)]
pub struct BindingTable {
    bound: HashMap<QuadId, MaterialHandle>,
    rebinds: u64,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, quad: QuadId) -> Option<MaterialHandle> {
        self.bound.get(&quad).copied()
    }

    /// How many binds changed the material of an already bound quad.
    pub fn rebinds(&self) -> u64 {
        self.rebinds
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

impl SurfaceBinder for BindingTable {
    fn bind(&mut self, quad: QuadId, material: MaterialHandle) {
        if let Some(previous) = self.bound.insert(quad, material) {
            if previous != material {
                tracing::trace!(?quad, generation = material.generation, "material rebound");
                self.rebinds += 1;
            }
        }
    }

    fn unbind(&mut self, quad: QuadId) {
        self.bound.remove(&quad);
    }
}
