//! End-to-end frame loop scenarios

use super::fixtures::{HarnessBuilder, Step};
use crate::assets::AssetError;
use crate::input::Command;
use crate::pipeline::{FrameOutcome, PipelineError, PipelineState};
use crate::render::{BackendCommand, FailurePoint, RecordingBackend, RenderState};
use crate::scene::{Axis, TransformCommand};

fn draw_calls(commands: &[BackendCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, BackendCommand::CallDrawList { .. }))
        .count()
}

fn compiled(commands: &[BackendCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            BackendCommand::CompileDrawList { identifier, .. } => Some(identifier.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_no_marker_means_no_submission() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(false), Step::Frame(true)]).build();
    h.pipeline.start("fox").unwrap();
    h.backend.borrow_mut().take_commands();

    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::NoMarker);
    let frame = h.backend.borrow_mut().take_commands();
    assert_eq!(draw_calls(&frame), 0);
    assert!(frame.contains(&BackendCommand::Present));
    assert!(frame
        .iter()
        .any(|c| matches!(c, BackendCommand::DrawBackground { frame_index: 0, .. })));

    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    let frame = h.backend.borrow_mut().take_commands();
    assert_eq!(draw_calls(&frame), 1);

    let stats = h.pipeline.stats();
    assert_eq!(stats.frames_processed, 2);
    assert_eq!(stats.frames_with_marker, 1);
    assert_eq!(stats.frames_rendered, 1);
}

#[test]
fn test_model_switch_takes_effect_next_frame() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Frame(true)])
        .config(|c| c.performance.asset_cache_capacity = 1)
        .command_during(0, Command::SwitchModel("rocket".to_string()))
        .build();
    h.pipeline.start("fox").unwrap();

    // The switch arrives while frame 0 is in flight: fox is still drawn
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(compiled(h.backend.borrow().commands()), vec!["fox"]);
    assert!(h.pipeline.cache().is_resident("fox"));
    assert_eq!(h.loaded_models(), vec!["fox"]);

    // Next frame loads rocket, which replaces fox in a cache of one
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(compiled(h.backend.borrow().commands()), vec!["fox", "rocket"]);
    assert_eq!(h.loaded_models(), vec!["fox", "rocket"]);
    assert_eq!(h.pipeline.displayed_model(), Some("rocket"));
    assert!(!h.pipeline.cache().is_resident("fox"));
    assert!(h.pipeline.cache().is_pinned("rocket"));
    assert!(!h.pipeline.cache().is_pinned("fox"));

    let backend = h.backend.borrow();
    assert_eq!(backend.live_draw_lists(), 1);
    assert_eq!(backend.live_textures(), 1);
}

#[test]
fn test_scale_saturates_through_commands() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true)])
        .config(|c| c.controls.max_scale = 2.0)
        .build();
    h.pipeline.start("fox").unwrap();

    for _ in 0..20 {
        h.pipeline
            .handle_command(TransformCommand::ScaleBy(0.1).into());
    }
    assert_eq!(h.pipeline.transform().scale, 2.0);
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
}

#[test]
fn test_failed_switch_keeps_previous_model() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Frame(true), Step::Frame(true)])
        .command_during(0, Command::SwitchModel("missing".to_string()))
        .command_during(1, Command::SwitchModel("pikachu".to_string()))
        .build();
    h.pipeline.start("fox").unwrap();

    for _ in 0..3 {
        assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    }
    assert_eq!(h.pipeline.displayed_model(), Some("fox"));
    assert!(h.pipeline.cache().is_pinned("fox"));
    assert_eq!(h.pipeline.cache().len(), 1);
    assert_eq!(h.loaded_models(), vec!["fox"]);
    assert_eq!(h.pipeline.state(), PipelineState::Running);
}

#[test]
fn test_missing_initial_model_is_a_startup_failure() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true)]).build();

    let err = h.pipeline.start("missing").unwrap_err();
    match err {
        PipelineError::AssetLoad(e) => {
            assert_eq!(e.identifier, "missing");
            assert!(matches!(e.cause, AssetError::NotFound(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
    assert!(h.pipeline.run_frame().is_err());
    assert!(h.detector_released.get());
}

#[test]
fn test_calibration_mismatch_aborts_startup() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true)])
        .resolution(320, 240)
        .build();

    let err = h.pipeline.start("fox").unwrap_err();
    assert!(matches!(err, PipelineError::CalibrationMismatch(_)));
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
    assert!(h.loaded_models().is_empty());
}

#[test]
fn test_exit_before_frame_stops_and_releases() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Frame(true)]).build();
    h.pipeline.start("fox").unwrap();
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);

    h.pipeline.command_sender().send(Command::Exit);
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Stopped);
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);

    h.pipeline.stop();
    h.pipeline.stop();
    let backend = h.backend.borrow();
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_draw_lists(), 0);
    assert!(h.source_released.get());
    assert!(h.detector_released.get());
    assert!(h.pipeline.cache().is_empty());
}

#[test]
fn test_exit_mid_frame_drops_the_frame() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Frame(true)])
        .command_during(0, Command::Exit)
        .build();
    h.pipeline.start("fox").unwrap();
    h.backend.borrow_mut().take_commands();

    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Aborted);
    let backend = h.backend.borrow();
    assert!(backend.commands().contains(&BackendCommand::DiscardFrame));
    assert!(!backend.commands().contains(&BackendCommand::Present));
    assert_eq!(backend.frames_presented(), 0);
    assert_eq!(h.pipeline.stats().frames_discarded, 1);
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
}

#[test]
fn test_timeout_represents_previous_image() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Timeout, Step::Frame(true)]).build();
    h.pipeline.start("fox").unwrap();

    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Timeout);
    assert_eq!(
        h.backend.borrow().commands().last(),
        Some(&BackendCommand::PresentPrevious)
    );
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(h.pipeline.stats().timeouts, 1);
    assert_eq!(h.backend.borrow().frames_presented(), 3);
}

#[test]
fn test_closed_source_shuts_down() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(false), Step::Frame(true)])
        .config(|c| c.performance.max_fps = 1000)
        .build();
    h.pipeline.start("fox").unwrap();

    let stats = h.pipeline.run(None).unwrap();
    assert_eq!(stats.frames_processed, 2);
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
}

#[test]
fn test_run_respects_frame_limit() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true); 5])
        .config(|c| c.performance.max_fps = 1000)
        .build();
    h.pipeline.start("fox").unwrap();

    let stats = h.pipeline.run(Some(3)).unwrap();
    assert_eq!(stats.frames_processed, 3);
    assert_eq!(h.pipeline.state(), PipelineState::Running);
}

#[test]
fn test_detection_fault_skips_one_frame() {
    let mut h =
        HarnessBuilder::new(vec![Step::Frame(true), Step::DetectionFault, Step::Frame(true)]).build();
    h.pipeline.start("fox").unwrap();

    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::DetectionFault);
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);
    assert_eq!(h.pipeline.stats().detection_faults, 1);
    assert_eq!(h.backend.borrow().frames_presented(), 2);
}

#[test]
fn test_frame_source_failure_is_fatal() {
    let mut h = HarnessBuilder::new(vec![Step::Fail]).build();
    h.pipeline.start("fox").unwrap();

    assert!(matches!(
        h.pipeline.run_frame(),
        Err(PipelineError::FrameSource(_))
    ));
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
}

#[test]
fn test_graphics_failure_is_fatal() {
    let mut backend = RecordingBackend::new();
    backend.fail_at(FailurePoint::Present, 0);
    let mut h = HarnessBuilder::new(vec![Step::Frame(true)])
        .backend(backend)
        .build();
    h.pipeline.start("fox").unwrap();

    assert!(matches!(
        h.pipeline.run_frame(),
        Err(PipelineError::GraphicsBackend(_))
    ));
    assert_eq!(h.pipeline.state(), PipelineState::ShuttingDown);
    assert_eq!(h.backend.borrow().live_textures(), 0);
}

#[test]
fn test_lighting_toggle_is_scoped_to_the_model() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true)]).build();
    h.pipeline.start("fox").unwrap();
    assert!(h.backend.borrow().lighting_config().is_some());

    h.pipeline
        .handle_command(TransformCommand::ToggleLighting.into());
    h.pipeline
        .handle_command(TransformCommand::TranslateBy(Axis::Z, 0.05).into());
    assert_eq!(h.pipeline.run_frame().unwrap(), FrameOutcome::Rendered);

    let backend = h.backend.borrow();
    let model_state = backend.commands().iter().find_map(|c| match c {
        BackendCommand::CallDrawList { state, .. } => Some(*state),
        _ => None,
    });
    assert_eq!(model_state.map(|s| s.contains(RenderState::LIGHTING)), Some(false));
    assert!(backend.state().contains(RenderState::LIGHTING));
}

#[test]
fn test_shrinking_cache_keeps_displayed_model() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true), Step::Frame(true)])
        .command_during(0, Command::SwitchModel("rocket".to_string()))
        .build();
    h.pipeline.start("fox").unwrap();
    h.pipeline.run_frame().unwrap();
    h.pipeline.run_frame().unwrap();
    assert_eq!(h.pipeline.cache().len(), 2);

    h.pipeline.set_cache_capacity(1);
    assert!(h.pipeline.cache().is_resident("rocket"));
    assert!(!h.pipeline.cache().is_resident("fox"));
    assert_eq!(h.pipeline.submitter().cached_draw_lists(), 1);
}

#[test]
fn test_headless_backend_log_stays_empty_over_a_long_run() {
    let mut h = HarnessBuilder::new(vec![Step::Frame(true); 200])
        .config(|c| c.performance.max_fps = 1000)
        .backend(RecordingBackend::headless())
        .build();
    h.pipeline.start("fox").unwrap();

    let stats = h.pipeline.run(None).unwrap();
    assert_eq!(stats.frames_rendered, 200);
    let backend = h.backend.borrow();
    assert!(backend.commands().is_empty());
    assert_eq!(backend.frames_presented(), 200);
}
