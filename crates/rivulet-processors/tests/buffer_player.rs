//! Integration tests for `buffer~`.
//!
//! Audio reaches the player through `adc~` so every test drives the engine's
//! real input boundary. Buffer contents are checked by playing them back.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use rivulet_core::{
    Controller, Engine, ParamValue, Payload, ProcessorId, ResponseKind, SessionSettings,
    TypeRegistry, create_session,
};
use rivulet_processors::register_builtins;

const BLOCK: usize = 64;

fn session() -> (Engine, Controller) {
    let registry = TypeRegistry::new();
    register_builtins(&registry).unwrap();
    create_session(SessionSettings::default(), Arc::new(registry)).unwrap()
}

fn int(v: i64) -> ParamValue {
    ParamValue::Int(v)
}

fn text(v: &str) -> ParamValue {
    ParamValue::Text(v.to_owned())
}

/// Runs one block with `left`/`right` as engine input.
fn run(engine: &mut Engine, left: &[f32], right: &[f32]) {
    engine.process_block(&[left, right], &mut []).unwrap();
}

fn outlet(engine: &Engine, id: ProcessorId) -> Vec<f32> {
    outlet_at(engine, id, 0)
}

fn outlet_at(engine: &Engine, id: ProcessorId, port: usize) -> Vec<f32> {
    engine.graph().outlet(id, port).unwrap().to_vec()
}

/// Plays the buffer from frame 0 for one block.
fn play_back(engine: &mut Engine, controller: &Controller, id: ProcessorId) {
    controller.set_param(id, "mode", text("play_once")).unwrap();
    controller.set_param(id, "bang", ParamValue::Bang).unwrap();
    run(engine, &[0.0; BLOCK], &[0.0; BLOCK]);
    events(controller, id);
}

/// Responses from `id` as `(kind, int payload)`.
fn events(controller: &Controller, id: ProcessorId) -> Vec<(ResponseKind, Option<i64>)> {
    controller
        .fetch_responses(Duration::from_millis(20))
        .into_iter()
        .filter(|r| r.processor == Some(id))
        .map(|r| (r.kind, r.payload.as_int()))
        .collect()
}

fn ramp(from: usize, scale: f32, offset: f32) -> Vec<f32> {
    (from..from + BLOCK).map(|g| g as f32 * scale + offset).collect()
}

/// `adc~` 0 into audio inlet 0, `adc~` 1 into the trigger inlet.
fn wired_player(engine: &mut Engine, controller: &Controller, params: &[(&str, ParamValue)]) -> ProcessorId {
    let audio = controller.create("adc~", 0, 0, &[("channel", int(0))]).unwrap();
    let trig = controller.create("adc~", 0, 0, &[("channel", int(1))]).unwrap();
    let buf = controller.create("buffer~", 0, 0, params).unwrap();
    controller.connect(audio, 0, buf, 0).unwrap();
    controller.connect(trig, 0, buf, 1).unwrap();
    let silent = vec![0.0; BLOCK];
    run(engine, &silent, &silent);
    events(controller, buf);
    buf
}

// ============================================================================
// 1. Threshold-triggered recording
// ============================================================================

#[test]
fn threshold_record_starts_at_crossing_sample() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let audio = controller.create("adc~", 0, 0, &[]).unwrap();
    let buf = controller
        .create(
            "buffer~",
            0,
            0,
            &[
                ("frames", int(256)),
                ("mode", text("record_once")),
                ("trig_chan", int(0)),
                ("threshold", ParamValue::Float(2.0)),
            ],
        )
        .unwrap();
    controller.connect(audio, 0, buf, 0).unwrap();

    // Fill the whole buffer with 7.0. The source never goes inactive, so only
    // the bang starts recording.
    let sevens = vec![7.0; BLOCK];
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    for _ in 0..4 {
        run(&mut engine, &sevens, &silent);
    }
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(0))]);

    // Ramp 0.0, 0.25, 0.5, ... crosses 2.0 at sample 9.
    controller.set_param(buf, "mode", text("record_trigger")).unwrap();
    run(&mut engine, &ramp(0, 0.25, 0.0), &silent);
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(9))]);

    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    let out = outlet(&engine, buf);

    // 55 samples recorded from the crossing on; the rest keeps its old value.
    let written = BLOCK - 9;
    for (j, &s) in out.iter().enumerate() {
        let expected = if j < written { (9 + j) as f32 * 0.25 } else { 7.0 };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn record_trigger_stops_at_region_end() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = wired_player(
        &mut engine,
        &controller,
        &[
            ("frames", int(96)),
            ("mode", text("record_trigger")),
            ("trig_chan", int(0)),
            ("threshold", ParamValue::Float(2.0)),
        ],
    );

    run(&mut engine, &ramp(0, 0.25, 0.0), &silent);
    run(&mut engine, &ramp(BLOCK, 0.25, 0.0), &silent);
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(9))]);

    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    let first = outlet(&engine, buf);
    run(&mut engine, &silent, &silent);
    let second = outlet(&engine, buf);

    let played: Vec<f32> = first.iter().chain(&second).copied().collect();
    for (j, &s) in played.iter().enumerate() {
        let expected = if j < 96 { (9 + j) as f32 * 0.25 } else { 0.0 };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn rec_offset_shifts_write_position_back() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = wired_player(
        &mut engine,
        &controller,
        &[("frames", int(64)), ("mode", text("record_once")), ("rec_offset", int(4))],
    );

    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &ramp(0, 1.0, 1.0), &silent);
    play_back(&mut engine, &controller, buf);

    // Input sample i lands at frame i - 4, wrapping inside the region.
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = if j < 60 { j as f32 + 5.0 } else { (j - 59) as f32 };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn record_loop_wraps_and_overwrites() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = wired_player(
        &mut engine,
        &controller,
        &[("frames", int(32)), ("mode", text("record_loop"))],
    );

    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &ramp(0, 1.0, 1.0), &silent);

    // The second lap plays what the first lap wrote, then overwrites it.
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = if j < 32 { 0.0 } else { (j - 31) as f32 };
        assert_eq!(s, expected, "sample {j}");
    }
    let ev = events(&controller, buf);
    assert_eq!(ev[0], (ResponseKind::Triggered, Some(0)));
    assert!(ev.contains(&(ResponseKind::LoopStarted, Some(32))));

    play_back(&mut engine, &controller, buf);
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = if j < 32 { j as f32 + 33.0 } else { 0.0 };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn record_retrigger_fades_out_old_take() {
    let (mut engine, controller) = session();
    let buf = recorded_player(&mut engine, &controller, &[("xfade", int(8))]);
    controller.set_param(buf, "mode", text("record_trigger")).unwrap();

    let mut pulses = vec![0.0; BLOCK];
    pulses[10] = 1.0;
    pulses[40] = 1.0;
    run(&mut engine, &[100.0; BLOCK], &pulses);
    assert_eq!(
        events(&controller, buf),
        vec![(ResponseKind::Triggered, Some(10)), (ResponseKind::Triggered, Some(40))]
    );

    // The first take wrote frames 0..30. On the retrigger the frames after the
    // old head ramp down over 8 samples while the new take restarts at 0.
    play_back(&mut engine, &controller, buf);
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = match j {
            0..30 => 100.0,
            30..38 => (j + 1) as f32 * ((37 - j) as f32 / 8.0),
            _ => (j + 1) as f32,
        };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn falling_direction_triggers_below_threshold() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);
    controller.set_param(buf, "mode", text("play_trigger")).unwrap();
    controller.set_param(buf, "direction", text("falling")).unwrap();
    controller.set_param(buf, "threshold", ParamValue::Float(0.0)).unwrap();

    // A rising spike is inactive; the drop below zero fires.
    let mut trig = vec![1.0; BLOCK];
    trig[5] = 5.0;
    trig[20..].fill(-1.0);
    run(&mut engine, &silent, &trig);

    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(20))]);
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = if j < 20 { 0.0 } else { (j - 19) as f32 };
        assert_eq!(s, expected, "sample {j}");
    }
}

#[test]
fn channel_masks_select_recorded_and_played_channels() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let left = controller.create("adc~", 0, 0, &[("channel", int(0))]).unwrap();
    let right = controller.create("adc~", 0, 0, &[("channel", int(1))]).unwrap();
    let buf = controller
        .create(
            "buffer~",
            0,
            0,
            &[
                ("frames", int(64)),
                ("channels", int(2)),
                ("mode", text("record_once")),
                ("rec_mask", int(0b01)),
            ],
        )
        .unwrap();
    controller.connect(left, 0, buf, 0).unwrap();
    controller.connect(right, 0, buf, 1).unwrap();
    run(&mut engine, &silent, &silent);

    // Only channel 0 records.
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &ramp(0, 1.0, 1.0), &[100.0; BLOCK]);
    play_back(&mut engine, &controller, buf);
    assert_eq!(outlet_at(&engine, buf, 0), ramp(0, 1.0, 1.0));
    assert_eq!(outlet_at(&engine, buf, 1), silent);

    // Only channel 1 records; channel 0 keeps its take.
    controller.set_param(buf, "mode", text("record_once")).unwrap();
    controller.set_param(buf, "rec_mask", int(0b10)).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &[50.0; BLOCK], &[100.0; BLOCK]);

    // Only channel 1 plays.
    controller.set_param(buf, "play_mask", int(0b10)).unwrap();
    play_back(&mut engine, &controller, buf);
    assert_eq!(outlet_at(&engine, buf, 0), silent);
    assert_eq!(outlet_at(&engine, buf, 1), vec![100.0; BLOCK]);

    controller.set_param(buf, "play_mask", int(-1)).unwrap();
    play_back(&mut engine, &controller, buf);
    assert_eq!(outlet_at(&engine, buf, 0), ramp(0, 1.0, 1.0));
    assert_eq!(outlet_at(&engine, buf, 1), vec![100.0; BLOCK]);
}

// ============================================================================
// 2. Playback modes
// ============================================================================

/// Records `1.0 + i` into a 64-frame buffer with a bang.
fn recorded_player(engine: &mut Engine, controller: &Controller, extra: &[(&str, ParamValue)]) -> ProcessorId {
    let mut params = vec![("frames", int(BLOCK as i64)), ("mode", text("record_once"))];
    params.extend(extra.iter().cloned());
    let buf = wired_player(engine, controller, &params);
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(engine, &ramp(0, 1.0, 1.0), &[0.0; BLOCK]);
    events(controller, buf);
    buf
}

#[test]
fn play_loop_wraps_at_region_end() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);

    controller.set_param(buf, "region_start", int(8)).unwrap();
    controller.set_param(buf, "region_end", int(40)).unwrap();
    controller.set_param(buf, "mode", text("play_loop")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);

    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        assert_eq!(s, (8 + j % 32) as f32 + 1.0, "sample {j}");
    }
    let ev = events(&controller, buf);
    assert_eq!(ev[0], (ResponseKind::Triggered, Some(0)));
    assert!(ev.contains(&(ResponseKind::LoopStarted, Some(32))));
}

#[test]
fn signal_triggers_and_retriggers_play_trigger() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);

    controller.set_param(buf, "mode", text("play_trigger")).unwrap();
    let mut pulses = vec![0.0; BLOCK];
    pulses[10] = 1.0;
    pulses[40] = 1.0;
    run(&mut engine, &silent, &pulses);

    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        let expected = match j {
            0..10 => 0.0,
            10..40 => (j - 10) as f32 + 1.0,
            _ => (j - 40) as f32 + 1.0,
        };
        assert_eq!(s, expected, "sample {j}");
    }
    assert_eq!(
        events(&controller, buf),
        vec![(ResponseKind::Triggered, Some(10)), (ResponseKind::Triggered, Some(40))]
    );
}

#[test]
fn held_trigger_does_not_refire() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);
    controller.set_param(buf, "mode", text("play_trigger")).unwrap();

    let mut gate = vec![0.0; BLOCK];
    gate[5..30].fill(1.0);
    run(&mut engine, &silent, &gate);
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(5))]);
}

#[test]
fn debounce_delays_trigger() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);
    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "debounce", int(3)).unwrap();

    // A two-sample blip is ignored; the held gate fires on its third sample.
    let mut gate = vec![0.0; BLOCK];
    gate[4..6].fill(1.0);
    gate[20..BLOCK].fill(1.0);
    run(&mut engine, &silent, &gate);

    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(22))]);
    let out = outlet(&engine, buf);
    assert!(out[..22].iter().all(|&s| s == 0.0));
    assert_eq!(out[22], 1.0);
}

#[test]
fn retrigger_crossfades_from_old_position() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[("xfade", int(8))]);

    controller.set_param(buf, "mode", text("play_trigger")).unwrap();
    let mut pulses = vec![0.0; BLOCK];
    pulses[10] = 1.0;
    pulses[40] = 1.0;
    run(&mut engine, &silent, &pulses);

    let out = outlet(&engine, buf);
    // Old head at frame 30 fades out while the new one at frame 0 fades in.
    assert_eq!(out[39], 30.0);
    assert_eq!(out[40], 31.0);
    assert_eq!(out[44], 0.5 * 5.0 + 0.5 * 35.0);
    assert_eq!(out[48], 9.0);
    assert_eq!(out[63], 24.0);
}

#[test]
fn record_loopset_defines_region_on_second_bang() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = wired_player(
        &mut engine,
        &controller,
        &[("frames", int(1000)), ("mode", text("record_loopset"))],
    );

    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &ramp(0, 1.0, 1.0), &silent);
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(0))]);

    // Closing the take loops what was recorded; new input is not recorded.
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    let fives = vec![5.0; BLOCK];
    run(&mut engine, &fives, &silent);
    let ev = events(&controller, buf);
    assert!(ev.contains(&(ResponseKind::RegionSet, Some(64))));
    assert!(ev.contains(&(ResponseKind::LoopStarted, Some(0))));

    for _ in 0..2 {
        let out = outlet(&engine, buf);
        for (j, &s) in out.iter().enumerate() {
            assert_eq!(s, j as f32 + 1.0);
        }
        run(&mut engine, &fives, &silent);
    }
}

#[test]
fn overdub_accumulates() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[("overdub", ParamValue::Bool(true))]);

    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &[10.0; BLOCK], &silent);

    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    let out = outlet(&engine, buf);
    for (j, &s) in out.iter().enumerate() {
        assert_eq!(s, j as f32 + 11.0);
    }
}

#[test]
fn stop_silences_playback() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);
    controller.set_param(buf, "mode", text("play_loop")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(outlet(&engine, buf).iter().any(|&s| s != 0.0));

    controller.set_param(buf, "stop", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(outlet(&engine, buf).iter().all(|&s| s == 0.0));
}

// ============================================================================
// 3. Configuration and resizing
// ============================================================================

#[test]
fn bad_parameters_report_config_error() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);

    controller.set_param(buf, "mode", text("scrub")).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(events(&controller, buf).iter().any(|(k, _)| *k == ResponseKind::ConfigError));

    controller.set_param(buf, "region_start", int(10)).unwrap();
    controller.set_param(buf, "region_end", int(10)).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(events(&controller, buf).iter().any(|(k, _)| *k == ResponseKind::ConfigError));

    // Invalid values stay rejected until corrected; the buffer is untouched.
    controller.set_param(buf, "region_start", int(0)).unwrap();
    controller.set_param(buf, "region_end", int(-1)).unwrap();
    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    assert_eq!(outlet(&engine, buf)[0], 1.0);
}

#[test]
fn bang_survives_rejected_config() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);

    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "xfade", int(-1)).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(outlet(&engine, buf).iter().all(|&s| s == 0.0));

    let responses = controller.fetch_responses(Duration::from_millis(20));
    let rejected = responses
        .iter()
        .find(|r| r.processor == Some(buf) && r.kind == ResponseKind::ConfigError)
        .unwrap();
    assert!(matches!(
        rejected.payload,
        Payload::Text(Cow::Borrowed("parameter out of range"))
    ));

    // Correcting the value applies the bang staged with the bad one.
    controller.set_param(buf, "xfade", int(0)).unwrap();
    run(&mut engine, &silent, &silent);
    assert_eq!(events(&controller, buf), vec![(ResponseKind::Triggered, Some(0))]);
    assert_eq!(outlet(&engine, buf), ramp(0, 1.0, 1.0));
}

#[test]
fn channel_layout_follows_channels_param() {
    let (mut engine, controller) = session();
    let buf = controller.create("buffer~", 0, 0, &[("channels", int(3))]).unwrap();
    engine.process_block(&[], &mut []).unwrap();
    let node = engine.graph().node(buf).unwrap();
    assert_eq!(node.inlet_count(), 4);
    assert_eq!(node.outlet_count(), 3);
}

#[test]
fn resize_waits_until_player_stops() {
    let (mut engine, controller) = session();
    let silent = vec![0.0; BLOCK];
    let buf = recorded_player(&mut engine, &controller, &[]);
    controller.set_param(buf, "mode", text("play_loop")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    events(&controller, buf);

    controller.set_param(buf, "frames", int(128)).unwrap();
    for _ in 0..20 {
        run(&mut engine, &silent, &silent);
        let out = outlet(&engine, buf);
        assert_eq!(out[0], 1.0, "old buffer must keep playing");
        assert!(
            !events(&controller, buf).iter().any(|(k, _)| *k == ResponseKind::BufferResized),
            "swapped while running"
        );
    }

    controller.set_param(buf, "stop", ParamValue::Bang).unwrap();
    let mut resized = None;
    for _ in 0..200 {
        run(&mut engine, &silent, &silent);
        if let Some((_, frames)) = events(&controller, buf)
            .into_iter()
            .find(|(k, _)| *k == ResponseKind::BufferResized)
        {
            resized = frames;
            break;
        }
    }
    assert_eq!(resized, Some(128));

    // The new buffer starts silent and plays for 128 frames.
    controller.set_param(buf, "mode", text("play_once")).unwrap();
    controller.set_param(buf, "bang", ParamValue::Bang).unwrap();
    run(&mut engine, &silent, &silent);
    assert!(outlet(&engine, buf).iter().all(|&s| s == 0.0));
    run(&mut engine, &silent, &silent);
    assert!(events(&controller, buf).contains(&(ResponseKind::Triggered, Some(0))));
}
