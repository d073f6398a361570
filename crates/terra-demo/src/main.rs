//! Headless driver for the terrain patch renderer.
//!
//! Builds a synthetic cube-sphere near tier and a flat far tier, then flies a
//! camera over them for a configured number of frames while streaming patches
//! in and out, the way a terrain producer would.

mod backend;
mod error;
mod synthetic;

use std::f32::consts::FRAC_PI_4;
use std::f64::consts::{PI, TAU};
use std::path::PathBuf;

use clap::Parser;
use glam::{DQuat, DVec3, Mat4, Vec3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use terra_config::{CliArgs, Config};
use terra_patch::{
    AtmosphereParams, FarFrame, PatchDrawList, PatchFrameStats, PatchId, PatchMeshManager,
    PlanetMaterials, SphericalFrame,
};
use tracing::{error, info, warn};

use crate::backend::{DemoBackend, GpuBackend, HeadlessBackend};
use crate::error::DemoError;
use crate::synthetic::{FacePatch, SyntheticTerrain, face_patches};

/// Far-tier patches per edge of the square around the origin.
const FAR_GRID: i32 = 6;
const FAR_PATCH_SIZE: f64 = 20_000.0;
/// Altitude band the camera sweeps through.
const MIN_ALTITUDE: f64 = 2_000.0;
const MAX_ALTITUDE: f64 = 200_000.0;
/// The far tier fades out towards this altitude.
const FAR_FADE_ALTITUDE: f64 = 150_000.0;
/// Frames between streaming events.
const STREAM_INTERVAL: u32 = 10;
/// Spherical patches replaced per streaming event.
const STREAM_BATCH: usize = 4;

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("terra")))
        .unwrap_or_else(|| PathBuf::from("."));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    terra_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(err) = run(&config) {
        error!("Demo failed: {err}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), DemoError> {
    match GpuBackend::new(&config.demo, &config.render)? {
        Some(mut gpu) => drive(&mut gpu, config),
        None => {
            warn!("No GPU adapter available, recording draws headless");
            drive(&mut HeadlessBackend::default(), config)
        }
    }
}

/// Camera state for one frame of the fly-over.
struct Flight {
    position: DVec3,
    altitude: f64,
    view_projection: Mat4,
    orientation: DQuat,
    far_position: DVec3,
    far_view_projection: Mat4,
}

fn flight(frame: u32, frames: u32, radius: f64, projection: Mat4) -> Flight {
    let t = f64::from(frame) / f64::from(frames.max(1));
    let altitude = MIN_ALTITUDE + (MAX_ALTITUDE - MIN_ALTITUDE) * (t * PI).sin();

    // Quarter orbit over the +X/+Y quadrant, looking ahead and slightly down.
    let angle = t * TAU * 0.25;
    let up = DVec3::new(angle.sin(), angle.cos(), 0.0);
    let ahead = DVec3::new(angle.cos(), -angle.sin(), 0.0);
    let view = Mat4::look_to_rh(
        Vec3::ZERO,
        (ahead - up * 0.3).normalize().as_vec3(),
        up.as_vec3(),
    );
    let far_view = Mat4::look_to_rh(Vec3::ZERO, Vec3::new(1.0, -0.3, 0.0).normalize(), Vec3::Y);

    Flight {
        position: up * (radius + altitude),
        altitude,
        view_projection: projection * view,
        orientation: DQuat::from_rotation_y(t * 0.1),
        far_position: DVec3::new(t * 50_000.0, altitude, 0.0),
        far_view_projection: projection * far_view,
    }
}

fn drive(backend: &mut impl DemoBackend, config: &Config) -> Result<(), DemoError> {
    let radius = config.render.planet_radius;
    let per_side = config.demo.patches_per_side.max(1);
    let frames = config.demo.frames;
    let mut rng = Xoshiro256StarStar::seed_from_u64(42); // Fixed seed for reproducible runs

    let terrain = SyntheticTerrain::new(42, radius, per_side);
    let atmosphere = AtmosphereParams::earth_like(radius as f32);
    let mut manager = PatchMeshManager::new(PlanetMaterials::untextured(radius), &config.render);

    let mut spherical: Vec<(PatchId, FacePatch)> = Vec::new();
    for address in face_patches(per_side) {
        let mesh = backend.upload(&terrain.spherical_patch(address))?;
        spherical.push((manager.add_mesh(mesh, true), address));
    }

    let mut far: Vec<(PatchId, (f64, f64))> = Vec::new();
    for i in -FAR_GRID / 2..FAR_GRID / 2 {
        for j in -FAR_GRID / 2..FAR_GRID / 2 {
            let corner = (f64::from(i) * FAR_PATCH_SIZE, f64::from(j) * FAR_PATCH_SIZE);
            let mesh = backend.upload(&terrain.far_patch(corner.0, corner.1, FAR_PATCH_SIZE))?;
            far.push((manager.add_mesh(mesh, false), corner));
        }
    }

    info!(
        "Loaded {} spherical and {} far patches ({} with water)",
        spherical.len(),
        far.len(),
        manager.spherical_water_len() + manager.far_water_len()
    );

    // Reverse-Z: far and near swapped.
    let aspect = config.demo.width.max(1) as f32 / config.demo.height.max(1) as f32;
    let projection = Mat4::perspective_rh(FRAC_PI_4, aspect, 1.0e7, 1.0);
    let light_direction = Vec3::new(0.4, 1.0, 0.2).normalize();

    let mut list = PatchDrawList::new();
    let mut totals = PatchFrameStats::default();

    for frame in 0..frames {
        let camera = flight(frame, frames, radius, projection);

        // Stream a few spherical patches: flag the old mesh, add its replacement.
        if frame % STREAM_INTERVAL == STREAM_INTERVAL - 1 && !spherical.is_empty() {
            for _ in 0..STREAM_BATCH {
                let k = rng.gen_range(0..spherical.len());
                let (old, address) = spherical[k];
                manager.mark_for_deletion(old);
                let mesh = backend.upload(&terrain.spherical_patch(address))?;
                spherical[k] = (manager.add_mesh(mesh, true), address);
            }
        }

        manager.sort_spherical_meshes(camera.position);
        manager.sort_far_meshes(camera.far_position);
        list.clear();

        let spherical_frame = SphericalFrame {
            relative_position: camera.position,
            view_projection: camera.view_projection,
            orientation: camera.orientation,
            light_direction,
            alpha: 1.0,
            atmosphere: Some(&atmosphere),
        };
        let mut stats = manager.draw_spherical_meshes(&spherical_frame, &mut list, &mut *backend);

        // The producer may flag patches while the frame is being drawn.
        if frame % STREAM_INTERVAL == STREAM_INTERVAL / 2 && !far.is_empty() {
            let k = rng.gen_range(0..far.len());
            let (old, corner) = far[k];
            manager.mark_for_deletion(old);
            let mesh = backend.upload(&terrain.far_patch(corner.0, corner.1, FAR_PATCH_SIZE))?;
            far[k] = (manager.add_mesh(mesh, false), corner);
        }

        let far_frame = FarFrame {
            relative_position: camera.far_position,
            view_projection: camera.far_view_projection,
            light_direction,
            alpha: (1.0 - camera.altitude / FAR_FADE_ALTITUDE).clamp(0.0, 1.0) as f32,
            radius: config.render.far_radius_offset,
            atmosphere: Some(&atmosphere),
        };
        stats += manager.draw_far_meshes(&far_frame, &mut list, &mut *backend);

        backend.present(&list);
        totals += stats;

        if frame % 30 == 0 {
            info!(
                "Frame {}: altitude {:.0} m, {} drawn, {} water, {} culled ({} horizon, {} frustum)",
                frame,
                camera.altitude,
                stats.drawn,
                stats.water_drawn,
                stats.culled(),
                stats.horizon_culled,
                stats.frustum_culled
            );
        }
    }

    info!(
        "Ran {} frames: {} drawn, {} culled, {} meshes freed, {} water sub-meshes released, {} normal maps recycled",
        frames,
        totals.drawn,
        totals.culled(),
        totals.meshes_freed,
        totals.water_released,
        totals.normal_maps_recycled
    );

    manager.dispose(&mut *backend);
    backend.report();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_run_frees_every_patch() {
        let mut config = Config::default();
        config.demo.frames = 25;
        config.demo.patches_per_side = 2;
        config.render.planet_radius = 1_000_000.0;

        let mut backend = HeadlessBackend::default();
        drive(&mut backend, &config).unwrap();

        let log = backend.recycle_log();
        assert_eq!(log.freed_buffers().len(), backend.buffers_issued());
        assert!(
            log.freed_buffers()
                .iter()
                .all(|&buffer| log.times_freed(buffer) == 1),
            "no buffer may be freed twice"
        );
    }

    #[test]
    fn test_flight_stays_in_altitude_band() {
        let projection = Mat4::perspective_rh(FRAC_PI_4, 1.0, 1.0e7, 1.0);
        for frame in 0..=60 {
            let camera = flight(frame, 60, 6_000_000.0, projection);
            assert!(camera.altitude >= MIN_ALTITUDE - 1e-6);
            assert!(camera.altitude <= MAX_ALTITUDE + 1e-6);
            assert!((camera.position.length() - 6_000_000.0 - camera.altitude).abs() < 1e-3);
        }
    }
}
