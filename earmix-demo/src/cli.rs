use crate::tones;
use anyhow::{Context, Result};
use earmix::{
    CpalSink, EarMixDesc, EarMixEngine, EarMixEvent, InstanceParams, Quat, Vec3,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn run_cli_tests() -> Result<()> {
    log::info!("=== Running Non-Spatial Playback Test ===");
    test_flat_playback()?;

    log::info!("=== Running Orbit Test ===");
    test_orbit()?;

    Ok(())
}

fn start_engine() -> Result<EarMixEngine> {
    let desc = EarMixDesc::default();
    let mut engine = EarMixEngine::new(desc.clone()).context("Failed to create engine")?;
    engine
        .init_with(move || CpalSink::open(&desc))
        .context("Failed to start mixer")?;

    // The device opens on the mixer thread; give it a moment to report back
    std::thread::sleep(Duration::from_millis(200));
    if !engine.is_running() {
        for event in engine.poll_events() {
            if let EarMixEvent::EngineError { error } = event {
                anyhow::bail!("Mixer failed to start: {}", error);
            }
        }
        anyhow::bail!("Mixer stopped during startup");
    }
    Ok(engine)
}

fn test_flat_playback() -> Result<()> {
    let mut engine = start_engine()?;
    let sample_rate = engine.desc().sample_rate;

    let clip = Arc::new(tones::sine(440.0, 2.0, sample_rate));
    let tone = engine.create_instance(clip, InstanceParams::flat(0.8).looping(true));

    log::info!("Starting playback...");
    engine.add(&tone);
    std::thread::sleep(Duration::from_secs(2));
    log::info!("Level while playing: {:.1}", engine.current_level());

    log::info!("Pausing playback...");
    tone.pause();
    std::thread::sleep(Duration::from_secs(1));
    log::info!("Level while paused: {:.1}", engine.current_level());

    log::info!("Resuming playback...");
    engine.add(&tone);
    std::thread::sleep(Duration::from_secs(1));

    log::info!("Stopping playback...");
    tone.stop();
    std::thread::sleep(Duration::from_millis(100));

    for event in engine.poll_events() {
        if !matches!(event, EarMixEvent::MixTiming(_)) {
            log::info!("Event: {:?}", event);
        }
    }

    engine.shutdown();
    log::info!("Non-spatial playback test completed");
    Ok(())
}

/// Circle a click track around the listener; it should sweep left, behind, right, front
fn test_orbit() -> Result<()> {
    let mut engine = start_engine()?;
    let sample_rate = engine.desc().sample_rate;

    let radius = 3.0;
    let clip = Arc::new(tones::clicks(8, 1.0, sample_rate));
    let source = engine.create_instance(
        clip,
        InstanceParams::spatial(Vec3::new(0.0, 0.0, -radius)).looping(true),
    );
    engine.add(&source);

    let orbit = Duration::from_secs(6);
    let tick = Duration::from_millis(16);
    let started = Instant::now();
    let mut last_report = Instant::now();

    while started.elapsed() < orbit {
        let angle = started.elapsed().as_secs_f32() / orbit.as_secs_f32() * std::f32::consts::TAU;
        let position = Quat::from_rotation_y(angle) * Vec3::new(0.0, 0.0, -radius);
        source.set_position(Some(position));
        engine.frame_update(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, false, tick.as_secs_f32());

        if last_report.elapsed() >= Duration::from_millis(500) {
            log::info!(
                "Source at ({:.1}, {:.1}), level {:.1}",
                position.x,
                position.z,
                engine.current_level()
            );
            last_report = Instant::now();
        }

        for event in engine.poll_events() {
            match event {
                EarMixEvent::MixTiming(_) => {}
                EarMixEvent::EngineError { error } => anyhow::bail!("Mixer died: {}", error),
                other => log::debug!("Event: {:?}", other),
            }
        }

        std::thread::sleep(tick);
    }

    source.stop();
    engine.shutdown();
    log::info!("Orbit test completed");
    Ok(())
}
