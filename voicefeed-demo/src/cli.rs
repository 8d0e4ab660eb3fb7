use anyhow::{Context, Result, bail};
use std::sync::Arc;
use voicefeed::{
    AudioEmitter, AudioListener, EffectSlots, EngineDesc, FilterHandle, FilterMode, PlayState,
    Pose, Quat, SampleFormat, SessionId, SimulatedBackend, SlotHandle, SoundSource,
    StreamedSource, Vec3, VoiceEvent, VoiceWorld,
};

/// Bytes the simulated device plays between two frames.
const BYTES_PER_FRAME: usize = 48_000;

const SCENARIOS: &[&str] = &["stream", "adpcm", "loop", "pause", "spatial", "effects"];

pub fn run_all() -> Result<()> {
    for name in SCENARIOS {
        log::info!("=== Running {} scenario ===", name);
        run_scenario(name)?;
    }
    Ok(())
}

pub fn run_scenario(name: &str) -> Result<()> {
    match name {
        "stream" => stream_to_end(),
        "adpcm" => adpcm_stream(),
        "loop" => looping_stream(),
        "pause" => pause_and_resume(),
        "spatial" => moving_emitter(),
        "effects" => effects(),
        other => bail!(
            "unknown scenario '{}', expected one of {}",
            other,
            SCENARIOS.join(", ")
        ),
    }
}

/// A sawtooth rendered as interleaved 16-bit stereo PCM.
fn stereo16_tone(bytes: usize) -> Vec<u8> {
    (0..bytes / 2)
        .flat_map(|i| (((i % 200) as i16 - 100) * 300).to_le_bytes())
        .collect()
}

fn streamed(format: SampleFormat, block_alignment: u32, data: Vec<u8>) -> Result<SoundSource> {
    let stream = StreamedSource::new(format, 44100, block_alignment, data)
        .context("failed to describe stream")?;
    Ok(SoundSource::Streamed(Arc::new(stream)))
}

/// Plays `frames` frames of audio on the simulated device, refilling after each one.
fn run_frames(world: &mut VoiceWorld<SimulatedBackend>, id: SessionId, frames: usize) -> Result<()> {
    for frame in 0..frames {
        let Some(voice) = world.session(id).and_then(|s| s.voice()) else {
            log::info!("Session {} released its voice after {} frames", id, frame);
            break;
        };
        world
            .backend()
            .lock()
            .map_err(|_| anyhow::anyhow!("backend lock poisoned"))?
            .advance(voice, BYTES_PER_FRAME);
        world.update();
        log_events(world);
    }
    Ok(())
}

fn log_events(world: &VoiceWorld<SimulatedBackend>) {
    for event in world.poll_events() {
        match event {
            VoiceEvent::BackendError { session_id, error } => {
                log::error!("{}: {}", session_id, error)
            }
            VoiceEvent::Looped {
                session_id,
                loop_count,
            } => log::info!("{} looped ({} times)", session_id, loop_count),
            other => log::info!("{:?}", other),
        }
    }
}

fn report_submissions(world: &VoiceWorld<SimulatedBackend>) -> Result<()> {
    let backend = world
        .backend()
        .lock()
        .map_err(|_| anyhow::anyhow!("backend lock poisoned"))?;
    let chunks = backend.submitted_chunks();
    log::info!(
        "Submitted {} chunks, {} bytes: {:?}",
        chunks.len(),
        chunks.iter().sum::<usize>(),
        chunks
    );
    Ok(())
}

fn stream_to_end() -> Result<()> {
    let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
    let id = world.create_session(streamed(SampleFormat::Stereo16, 1, stereo16_tone(1_000_000))?);

    log::info!("Starting playback...");
    world.play(id)?;
    run_frames(&mut world, id, 100)?;

    if world.state(id)? != PlayState::Stopped {
        bail!("stream did not finish");
    }
    report_submissions(&world)?;
    log::info!("Stream test completed successfully");
    Ok(())
}

fn adpcm_stream() -> Result<()> {
    let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
    // Silence is enough; the simulated backend only checks block alignment
    let id = world.create_session(streamed(SampleFormat::MonoMsAdpcm, 512, vec![0u8; 500_000])?);

    world.play(id)?;
    run_frames(&mut world, id, 100)?;
    report_submissions(&world)?;
    Ok(())
}

fn looping_stream() -> Result<()> {
    let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
    let id = world.create_session(streamed(SampleFormat::Stereo16, 1, stereo16_tone(50_002))?);
    world
        .session_mut(id)
        .context("session vanished")?
        .set_looped(true)?;

    world.play(id)?;
    run_frames(&mut world, id, 20)?;

    log::info!("Stopping playback...");
    world.stop(id, true)?;
    log_events(&world);
    Ok(())
}

fn pause_and_resume() -> Result<()> {
    let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
    let id = world.create_session(streamed(SampleFormat::Stereo16, 1, stereo16_tone(400_000))?);

    world.play(id)?;
    run_frames(&mut world, id, 2)?;

    log::info!("Pausing playback twice...");
    world.pause(id)?;
    world.pause(id)?;
    run_frames(&mut world, id, 2)?;

    log::info!("Resuming playback twice...");
    world.resume(id)?;
    world.resume(id)?;
    log::info!("State after resume: {:?}", world.state(id)?);

    run_frames(&mut world, id, 100)?;
    Ok(())
}

fn moving_emitter() -> Result<()> {
    let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
    let id = world.create_session(streamed(SampleFormat::Stereo16, 1, stereo16_tone(600_000))?);

    // Listener at origin looking down -Z, turned a quarter to the left
    let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
    world.set_listener(AudioListener::from_pose(pose));

    world.play(id)?;
    for step in 0..10 {
        let x = -5.0 + step as f32;
        let emitter = AudioEmitter::at(Vec3::new(x, 0.0, -2.0)).with_velocity(Vec3::X);
        world.apply_3d(id, &emitter)?;

        if let Some(voice) = world.session(id).and_then(|s| s.voice()) {
            let backend = world
                .backend()
                .lock()
                .map_err(|_| anyhow::anyhow!("backend lock poisoned"))?;
            if let Some(state) = backend.voice(voice) {
                log::info!(
                    "Emitter at x = {:.1} -> voice position {:?}",
                    x,
                    state.position
                );
            }
        }
        run_frames(&mut world, id, 1)?;
    }

    world.stop(id, true)?;
    Ok(())
}

fn effects() -> Result<()> {
    let backend = SimulatedBackend::new().with_effects(EffectSlots {
        reverb_slot: Some(SlotHandle(1)),
        filter: Some(FilterHandle(1)),
    });
    let mut world = VoiceWorld::new(EngineDesc::default(), backend)?;
    let id = world.create_session(streamed(SampleFormat::Stereo16, 1, stereo16_tone(300_000))?);

    {
        let session = world.session_mut(id).context("session vanished")?;
        session.set_reverb_mix(0.5)?;
        session.set_filter(FilterMode::LowPass, 0.7, 3000.0)?;
    }
    world.play(id)?;
    run_frames(&mut world, id, 2)?;

    log::info!("Switching to a band pass while playing...");
    if let Some(session) = world.session_mut(id) {
        session.set_filter(FilterMode::BandPass, 1.0, 8000.0)?;
    }

    {
        let backend = world
            .backend()
            .lock()
            .map_err(|_| anyhow::anyhow!("backend lock poisoned"))?;
        log::info!("Filter now {:?}", backend.filter_params(FilterHandle(1)));
    }

    run_frames(&mut world, id, 100)?;
    Ok(())
}
