use std::collections::BTreeMap;

use dyntex_common::{QuadId, Transform, UnitId};
use dyntex_core::InputTexture;
use glam::{Quat, Vec3};

/// What a quad displays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadMaterial {
    /// Flat RGBA color.
    Color([f32; 4]),
    /// A static texture owned outside the pipeline.
    Image(InputTexture),
    /// The current output of a dynamic texture unit.
    Dynamic(UnitId),
}

/// Constant rotation about an axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spin {
    pub axis: Vec3,
    /// Radians per second.
    pub speed: f32,
}

impl Spin {
    pub fn new(axis: Vec3, speed: f32) -> Self {
        Self { axis, speed }
    }

    pub fn apply(&self, transform: &mut Transform, dt: f32) {
        let axis = self.axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return;
        }
        let step = Quat::from_axis_angle(axis, self.speed * dt);
        transform.rotation = (step * transform.rotation).normalize();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub label: String,
    pub transform: Transform,
    pub material: QuadMaterial,
    pub spin: Option<Spin>,
}

/// Quads in deterministic order, plus the root transform they hang from.
#[derive(Debug, Clone)]
pub struct QuadStore {
    quads: BTreeMap<QuadId, Quad>,
    pub root: Transform,
    pub root_spin: Option<Spin>,
}

impl Default for QuadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadStore {
    pub fn new() -> Self {
        Self {
            quads: BTreeMap::new(),
            root: Transform::default(),
            root_spin: None,
        }
    }

    pub fn insert(&mut self, quad: Quad) -> QuadId {
        let id = QuadId::new();
        self.quads.insert(id, quad);
        id
    }

    pub fn remove(&mut self, id: QuadId) -> Option<Quad> {
        self.quads.remove(&id)
    }

    pub fn get(&self, id: QuadId) -> Option<&Quad> {
        self.quads.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuadId, &Quad)> {
        self.quads.iter().map(|(id, q)| (*id, q))
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Quads showing the given unit.
    pub fn displaying(&self, unit: UnitId) -> impl Iterator<Item = QuadId> + '_ {
        self.quads
            .iter()
            .filter(move |(_, q)| q.material == QuadMaterial::Dynamic(unit))
            .map(|(id, _)| *id)
    }

    /// Advance every spin by `dt` seconds.
    pub fn animate(&mut self, dt: f32) {
        if let Some(spin) = self.root_spin {
            spin.apply(&mut self.root, dt);
        }
        for quad in self.quads.values_mut() {
            if let Some(spin) = quad.spin {
                spin.apply(&mut quad.transform, dt);
            }
        }
    }

    /// World matrix of a quad: root transform applied after the quad's own.
    pub fn world_matrix(&self, id: QuadId) -> Option<glam::Mat4> {
        let quad = self.quads.get(&id)?;
        Some(self.root.matrix() * quad.transform.matrix())
    }
}

/// `count` points evenly spaced on a circle around the z axis.
pub fn circle_layout(count: usize, radius: f32) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(material: QuadMaterial) -> Quad {
        Quad {
            label: "q".into(),
            transform: Transform::default(),
            material,
            spin: None,
        }
    }

    #[test]
    fn circle_layout_spacing() {
        let points = circle_layout(4, 0.5);
        assert_eq!(points.len(), 4);
        assert!((points[0] - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
        assert!((points[1] - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);
        assert!(points.iter().all(|p| (p.length() - 0.5).abs() < 1e-5));
        assert!(circle_layout(0, 1.0).is_empty());
    }

    #[test]
    fn spin_rotates_about_axis() {
        let mut t = Transform::default();
        Spin::new(Vec3::Z, std::f32::consts::FRAC_PI_2).apply(&mut t, 1.0);
        let x = t.rotation * Vec3::X;
        assert!((x - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn zero_axis_spin_is_ignored() {
        let mut t = Transform::default();
        Spin::new(Vec3::ZERO, 3.0).apply(&mut t, 1.0);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }

    #[test]
    fn store_finds_quads_by_unit() {
        let unit = UnitId::new();
        let mut store = QuadStore::new();
        let a = store.insert(quad(QuadMaterial::Dynamic(unit)));
        store.insert(quad(QuadMaterial::Color([1.0; 4])));
        assert_eq!(store.displaying(unit).collect::<Vec<_>>(), vec![a]);
        assert_eq!(store.len(), 2);
        assert!(store.remove(a).is_some());
        assert_eq!(store.displaying(unit).count(), 0);
    }

    #[test]
    fn animate_applies_root_and_quad_spin() {
        let mut store = QuadStore::new();
        store.root_spin = Some(Spin::new(Vec3::Z, 1.0));
        let id = store.insert(Quad {
            spin: Some(Spin::new(Vec3::Y, 1.0)),
            ..quad(QuadMaterial::Color([0.0; 4]))
        });
        store.animate(0.5);
        assert_ne!(store.root.rotation, Quat::IDENTITY);
        assert_ne!(store.get(id).unwrap().transform.rotation, Quat::IDENTITY);
        assert!(store.world_matrix(id).is_some());
    }
}
