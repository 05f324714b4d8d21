//! Procedural sphere placement.
//!
//! Spheres are scattered on the ground plane inside a disk, resting on it with
//! their lowest point. Candidates overlapping an already accepted sphere are
//! skipped. All randomness comes from one seeded generator and is drawn in a
//! fixed order, so a seed always reproduces the same field.

use std::f32::consts::TAU;

use turborand::prelude::*;

use crate::{config::SphereSettings, data_structures::records::Sphere};

/// Flat reflectance of dielectric spheres.
const DIELECTRIC_SPECULAR: f32 = 0.04;
const METAL_PROBABILITY: f32 = 0.5;
const EMISSIVE_PROBABILITY: f32 = 0.3;
const EMISSIVE_BOOST: f32 = 0.7;

pub struct PrimitiveGenerator {
    rng: Rng,
}

impl PrimitiveGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Rng::with_seed(seed),
        }
    }

    /// Generate up to `count` non-overlapping spheres.
    ///
    /// The radius and position of a candidate are drawn before the overlap
    /// test, so a rejected candidate still consumes exactly those draws and the
    /// sequence of later candidates does not depend on which ones were skipped.
    /// Material draws only happen for accepted spheres.
    ///
    /// Consumes the generator, so a seed always maps to exactly one field.
    pub fn generate(
        mut self,
        count: u32,
        radius_range: (f32, f32),
        placement_radius: f32,
    ) -> Vec<Sphere> {
        let (min_radius, max_radius) = radius_range;
        let mut spheres: Vec<Sphere> = Vec::new();

        for _ in 0..count {
            let radius = min_radius + self.rng.f32() * (max_radius - min_radius);
            let [x, z] = self.inside_unit_circle();
            let position = [x * placement_radius, radius, z * placement_radius];

            if spheres.iter().any(|other| overlaps(position, radius, other)) {
                continue;
            }

            let color = self.color_hsv();
            let metal = self.rng.f32() < METAL_PROBABILITY;
            let emissive = self.rng.f32() < EMISSIVE_PROBABILITY;
            let smoothness = self.rng.f32();

            spheres.push(Sphere {
                position,
                radius,
                albedo: if metal { [0.0; 3] } else { color },
                specular: if metal {
                    color
                } else {
                    [DIELECTRIC_SPECULAR; 3]
                },
                smoothness,
                emission: if emissive {
                    color.map(|c| c + EMISSIVE_BOOST)
                } else {
                    [0.0; 3]
                },
            });
        }

        log::info!(
            "Placed {} of {} candidate spheres",
            spheres.len(),
            count
        );
        spheres
    }

    /// Polar sampling: always two draws, unlike a rejection loop.
    fn inside_unit_circle(&mut self) -> [f32; 2] {
        let r = self.rng.f32().sqrt();
        let theta = self.rng.f32() * TAU;
        [r * theta.cos(), r * theta.sin()]
    }

    fn color_hsv(&mut self) -> [f32; 3] {
        let h = self.rng.f32();
        let s = self.rng.f32();
        let v = self.rng.f32();
        hsv_to_rgb(h, s, v)
    }
}

/// Convenience wrapper generating the field described by `settings`.
pub fn generate_spheres(settings: &SphereSettings) -> Vec<Sphere> {
    PrimitiveGenerator::new(settings.seed).generate(
        settings.count,
        settings.radius,
        settings.placement_radius,
    )
}

fn overlaps(position: [f32; 3], radius: f32, other: &Sphere) -> bool {
    let min_dist = radius + other.radius;
    let d = [
        position[0] - other.position[0],
        position[1] - other.position[1],
        position[2] - other.position[2],
    ];
    d[0] * d[0] + d[1] * d[1] + d[2] * d[2] < min_dist * min_dist
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    if s <= 0.0 {
        return [v; 3];
    }
    let h = (h.fract() + 1.0).fract() * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}
