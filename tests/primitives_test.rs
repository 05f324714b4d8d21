use trace_ngin::{
    config::SphereSettings,
    data_structures::records::Sphere,
    resources::primitives::{PrimitiveGenerator, generate_spheres, hsv_to_rgb},
};

fn settings(seed: u64) -> SphereSettings {
    SphereSettings {
        seed,
        count: 200,
        radius: (1.0, 4.0),
        placement_radius: 50.0,
    }
}

fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(a, b)| (a - b).abs() < 1e-5)
}

#[test]
fn should_reproduce_the_same_field_for_a_seed() {
    let first = generate_spheres(&settings(42));
    let second = generate_spheres(&settings(42));
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn should_match_a_fresh_generator_for_the_same_seed() {
    let settings = settings(42);
    let direct = PrimitiveGenerator::new(settings.seed).generate(
        settings.count,
        settings.radius,
        settings.placement_radius,
    );
    assert_eq!(direct, generate_spheres(&settings));
}

#[test]
fn should_produce_a_different_field_for_another_seed() {
    let first = generate_spheres(&settings(1));
    let second = generate_spheres(&settings(2));
    assert_ne!(first, second);
}

#[test]
fn should_never_place_overlapping_spheres() {
    let spheres = generate_spheres(&settings(7));
    for (i, a) in spheres.iter().enumerate() {
        for b in &spheres[i + 1..] {
            let d: f32 = (0..3)
                .map(|axis| (a.position[axis] - b.position[axis]).powi(2))
                .sum();
            let min = a.radius + b.radius;
            assert!(d >= min * min, "{:?} overlaps {:?}", a, b);
        }
    }
}

#[test]
fn should_rest_spheres_on_the_ground_inside_the_disk() {
    let config = settings(3);
    let spheres = generate_spheres(&config);
    assert!(spheres.len() <= config.count as usize);
    for sphere in &spheres {
        assert_eq!(sphere.position[1], sphere.radius);
        assert!(sphere.radius >= config.radius.0 && sphere.radius <= config.radius.1);
        let planar = sphere.position[0].powi(2) + sphere.position[2].powi(2);
        assert!(planar <= config.placement_radius.powi(2) + 1e-2);
    }
}

#[test]
fn should_split_spheres_into_metals_and_dielectrics() {
    let spheres = generate_spheres(&settings(11));
    let is_metal = |s: &Sphere| s.albedo == [0.0; 3] && s.specular != [0.04; 3];
    let is_dielectric = |s: &Sphere| s.specular == [0.04; 3];
    assert!(spheres.iter().all(|s| is_metal(s) || is_dielectric(s)));
    assert!(spheres.iter().any(is_metal));
    assert!(spheres.iter().any(is_dielectric));
}

#[test]
fn should_generate_nothing_for_zero_candidates() {
    let spheres = PrimitiveGenerator::new(5).generate(0, (1.0, 2.0), 10.0);
    assert!(spheres.is_empty());
}

#[test]
fn should_convert_hsv_to_rgb() {
    assert!(approx(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]));
    assert!(approx(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0.0, 1.0, 0.0]));
    assert!(approx(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0.0, 0.0, 1.0]));
    assert!(approx(hsv_to_rgb(0.5, 0.0, 0.25), [0.25, 0.25, 0.25]));
}
