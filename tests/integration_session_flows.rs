mod common;

use assert_matches::assert_matches;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use common::World;
use skimr::anticheat::{Disposition, MonitorState, ViewportDims};
use skimr::config::{ReaderSettings, ReadingMode};
use skimr::error::SessionError;
use skimr::services::SessionExit;
use skimr::session::{Outcome, Phase, SessionController};
use skimr::timer::TimerKind;

const FOUR_WORDS: &str = "The quick brown fox.";

fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
    KeyEvent::new(code, modifiers)
}

fn sixteen_words() -> String {
    vec!["alpha"; 16].join(" ")
}

#[test]
fn training_session_reads_to_the_end_and_submits_directly() {
    let world = World::training(FOUR_WORDS);
    let mut session = world.start();
    assert_eq!(session.phase(), Phase::Reading);
    assert_eq!(session.current_word(), Some("The"));

    world.run_to(&mut session, 599);
    assert_eq!(session.cursor(), 2);

    world.run_to(&mut session, 600);
    assert_eq!(session.current_word(), Some("fox."));

    world.run_to(&mut session, 949);
    assert_eq!(session.phase(), Phase::Reading);

    world.run_to(&mut session, 950);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));

    let subs = world.submissions();
    assert_eq!(subs.len(), 1);
    assert!(subs[0].answers.is_empty());
    assert!((subs[0].elapsed_reading_time_ms - 801.0).abs() < 1e-9);
    assert_matches!(world.exits.last(), Some(SessionExit::Completed(r)) if r.wpm == 300);
    assert_eq!(session.timers().live_count(), 0);
}

#[test]
fn late_advance_still_visits_every_word_once() {
    let world = World::training(FOUR_WORDS);
    let mut session = world.start();
    world.run_to(&mut session, 10_000);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));
    assert_eq!(world.submissions().len(), 1);
    // start click plus one per advanced word
    assert_eq!(world.clicks.get(), 4);
}

#[test]
fn muted_and_chunk_modes_do_not_click() {
    let mut world = World::training(FOUR_WORDS);
    world.settings = Some(ReaderSettings {
        muted: true,
        ..ReaderSettings::default()
    });
    let mut session = world.start();
    world.run_to(&mut session, 10_000);
    assert_eq!(world.clicks.get(), 0);

    let mut world = World::training(FOUR_WORDS);
    world.settings = Some(ReaderSettings {
        mode: ReadingMode::Chunking,
        chunk_size: 3,
        ..ReaderSettings::default()
    });
    let mut session = world.start();
    world.run_to(&mut session, 599);
    assert_eq!(session.cursor(), 0);
    world.run_to(&mut session, 600);
    assert_eq!(session.cursor(), 3);
    world.run_to(&mut session, 1_200);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));
    assert_eq!(world.clicks.get(), 0);
}

#[test]
fn oversized_pace_is_capped_before_scheduling() {
    let mut world = World::training(FOUR_WORDS);
    world.settings = Some(ReaderSettings {
        speed_ms: u64::MAX / 2,
        mode: ReadingMode::Chunking,
        chunk_size: 3,
        ..ReaderSettings::default()
    });
    let session = world.start();
    assert_eq!(session.settings().speed_ms, 60_000);
    assert_eq!(session.timers().next_due(), Some(180_000));
    assert_eq!(session.phase(), Phase::Reading);
}

#[test]
fn settings_failure_falls_back_to_defaults() {
    let mut world = World::training(FOUR_WORDS);
    world.settings = None;
    let session = world.load();
    assert_eq!(session.settings(), &ReaderSettings::default());
    assert_eq!(session.configured_wpm(), 300);
}

#[test]
fn exercise_failure_is_fatal_and_reported() {
    let mut world = World::training(FOUR_WORDS);
    world.exercise = None;
    let err = SessionController::load(world.services(), "ex-1").err();
    assert_matches!(err, Some(SessionError::ExerciseLoad { .. }));
    assert_matches!(world.exits.last(), Some(SessionExit::Failed { .. }));
    assert!(world.submissions().is_empty());
}

#[test]
fn text_without_words_is_rejected() {
    let world = World::training("  ( only an aside )  ");
    let err = SessionController::load(world.services(), "ex-1").err();
    assert_matches!(err, Some(SessionError::EmptyText { .. }));
    assert_matches!(world.exits.last(), Some(SessionExit::Failed { .. }));
}

#[test]
fn start_twice_is_an_error() {
    let world = World::training(FOUR_WORDS);
    let mut session = world.start();
    assert_matches!(
        session.start(),
        Err(SessionError::InvalidPhase { action: "start", .. })
    );
}

#[test]
fn pause_holds_the_cursor_and_resume_restarts_the_delay() {
    let world = World::training(FOUR_WORDS);
    let mut session = world.start();
    world.run_to(&mut session, 300);
    assert_eq!(session.cursor(), 1);

    session.pause().unwrap();
    world.run_to(&mut session, 5_000);
    assert_eq!(session.cursor(), 1);
    assert!(session.pacing().paused);
    assert_eq!(session.timers().live_count_of(TimerKind::PacingTick), 0);

    session.resume().unwrap();
    world.run_to(&mut session, 5_199);
    assert_eq!(session.cursor(), 1);
    world.run_to(&mut session, 5_200);
    assert_eq!(session.cursor(), 2);
}

#[test]
fn restart_resets_cursor_and_keeps_one_tick() {
    let world = World::training(FOUR_WORDS);
    let mut session = world.start();
    world.run_to(&mut session, 400);
    assert_eq!(session.cursor(), 2);

    session.restart().unwrap();
    session.restart().unwrap();
    assert_eq!(session.cursor(), 0);
    assert_eq!(session.timers().live_count_of(TimerKind::PacingTick), 1);

    world.run_to(&mut session, 599);
    assert_eq!(session.cursor(), 0);
    world.run_to(&mut session, 600);
    assert_eq!(session.cursor(), 1);
}

#[test]
fn exit_abandons_and_silences_everything() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.run_to(&mut session, 1_000);

    session.exit_session();
    session.exit_session();
    assert_eq!(session.phase(), Phase::Finished(Outcome::Abandoned));
    assert_eq!(world.exits.all(), vec![SessionExit::Abandoned]);
    assert_eq!(session.timers().live_count(), 0);

    world.run_to(&mut session, 100_000);
    assert!(world.submissions().is_empty());
    assert_eq!(
        session.on_key(&key(KeyCode::F(12), KeyModifiers::NONE)),
        Disposition::Allow
    );
}

#[test]
fn ranked_attempt_cannot_pause() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    assert!(!session.can_pause());
    assert_matches!(session.pause(), Err(SessionError::PauseLocked));
}

#[test]
fn ranked_reading_enters_quiz_then_expiry_submits_held_answers() {
    let world = World::ranked(&sixteen_words(), 15);
    let mut session = world.start();

    // 16 words at 200 ms each
    world.run_to(&mut session, 3_200);
    assert_eq!(session.phase(), Phase::Quiz);
    assert_eq!(session.questions().len(), 15);
    assert_eq!(session.quiz_timer().unwrap().total_seconds, 300);
    assert_eq!(session.monitor_state(), MonitorState::Armed);
    assert!(world.submissions().is_empty());

    session.answer("q1", "one").unwrap();
    session.answer("q2", "two").unwrap();
    world.run_to(&mut session, 3_200 + 150_000);
    assert_eq!(session.quiz_timer().unwrap().remaining_seconds, 150);
    session.answer("q3", "three").unwrap();

    world.run_to(&mut session, 3_200 + 299_999);
    assert_eq!(session.phase(), Phase::Quiz);
    world.run_to(&mut session, 3_200 + 300_000);

    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));
    let subs = world.submissions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].answers.len(), 3);
    assert_eq!(subs[0].answers["q3"], "three");
    // 16 words at 300 wpm
    assert!((subs[0].elapsed_reading_time_ms - 3_201.0).abs() < 1e-9);
    assert_eq!(session.timers().live_count(), 0);
}

#[test]
fn manual_check_then_expiry_submits_once() {
    let world = World::ranked(&sixteen_words(), 2);
    let mut session = world.start();
    world.run_to(&mut session, 3_200);
    session.answer("q1", "x").unwrap();

    session.check_answers().unwrap();
    world.run_to(&mut session, 100_000);
    assert_matches!(session.check_answers(), Err(SessionError::InvalidPhase { .. }));

    assert_eq!(world.submissions().len(), 1);
    assert_eq!(world.exits.all().len(), 1);
    assert_matches!(session.answer("q2", "late"), Err(SessionError::InvalidPhase { .. }));
}

#[test]
fn expiry_then_manual_check_submits_once() {
    let world = World::ranked(&sixteen_words(), 1);
    let mut session = world.start();
    world.run_to(&mut session, 3_200 + 20_000);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));
    assert!(session.check_answers().is_err());
    assert_eq!(world.submissions().len(), 1);
}

#[test]
fn questions_failure_ends_the_session() {
    let mut world = World::ranked(&sixteen_words(), 3);
    world.questions = None;
    let mut session = world.start();
    world.run_to(&mut session, 3_200);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Failed));
    assert_matches!(world.exits.last(), Some(SessionExit::Failed { .. }));
    assert!(world.submissions().is_empty());
    assert_eq!(session.timers().live_count(), 0);
}

#[test]
fn ineligible_ranked_exercise_runs_as_training() {
    let mut world = World::ranked(&sixteen_words(), 3);
    world.status = Some(skimr::services::AttemptStatus {
        can_rank: false,
        message: "cooldown".into(),
    });
    let mut session = world.start();
    assert_eq!(session.monitor_state(), MonitorState::Inert);
    assert_eq!(
        session.on_key(&key(KeyCode::F(12), KeyModifiers::NONE)),
        Disposition::Allow
    );
    assert!(session.can_pause());

    world.run_to(&mut session, 3_200);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Scored));
    assert!(session.questions().is_empty());
    assert!(world.submissions()[0].answers.is_empty());
}

#[test]
fn attempt_status_failure_means_not_eligible() {
    let mut world = World::ranked(&sixteen_words(), 3);
    world.status = None;
    let session = world.load();
    assert!(!session.is_ranked_attempt());
    assert_eq!(session.attempt_status().map(|s| s.can_rank), Some(false));
}

#[test]
fn training_submission_failure_surfaces_message() {
    let world = World::training(FOUR_WORDS);
    world.fail_scoring("server is sleeping");
    let mut session = world.start();
    world.run_to(&mut session, 950);
    assert_eq!(session.phase(), Phase::Finished(Outcome::Failed));
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::Failed { message }) if message.contains("server is sleeping")
    );
}

#[test]
fn quiz_submission_failure_is_not_retried() {
    let world = World::ranked(&sixteen_words(), 1);
    world.fail_scoring("grader down");
    let mut session = world.start();
    world.run_to(&mut session, 3_200);
    session.check_answers().unwrap();
    world.run_to(&mut session, 200_000);
    assert_eq!(world.submissions().len(), 1);
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::Failed { message }) if message == "grader down"
    );
}

#[test]
fn devtools_shortcut_during_reading_cancels_with_zero_credit() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.run_to(&mut session, 1_000);

    let verdict = session.on_key(&key(KeyCode::F(12), KeyModifiers::NONE));
    assert_eq!(verdict, Disposition::Prevent);
    assert_eq!(session.phase(), Phase::Finished(Outcome::CheatCancelled));
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "attempted to open developer tools"
    );

    let subs = world.submissions();
    assert_eq!(subs.len(), 1);
    assert!(subs[0].answers.is_empty());
    assert!(subs[0].cancelled);
    assert!((subs[0].elapsed_reading_time_ms - 3_201.0).abs() < 1e-9);

    // nothing fires afterwards
    assert_eq!(session.timers().live_count(), 0);
    assert_eq!(
        session.on_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        Disposition::Allow
    );
    world.run_to(&mut session, 1_000_000);
    assert_eq!(world.submissions().len(), 1);
    assert_eq!(world.exits.all().len(), 1);
}

#[test]
fn copy_is_a_violation_while_reading() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    assert_eq!(session.on_copy(), Disposition::Prevent);
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "attempted to copy the text"
    );
}

#[test]
fn copy_is_tolerated_during_the_quiz_but_leaving_is_not() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.run_to(&mut session, 3_200);
    session.answer("q1", "kept").unwrap();

    assert_eq!(session.on_copy(), Disposition::Allow);
    assert_eq!(
        session.on_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        Disposition::Allow
    );
    assert_eq!(session.phase(), Phase::Quiz);

    session.on_visibility_change(true);
    assert_eq!(session.phase(), Phase::Finished(Outcome::CheatCancelled));
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "left the tab during the quiz"
    );
    let subs = world.submissions();
    assert_eq!(subs.len(), 1);
    assert!(subs[0].answers.is_empty());

    world.run_to(&mut session, 1_000_000);
    assert_eq!(world.submissions().len(), 1);
}

#[test]
fn context_menu_cancels_the_quiz() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.run_to(&mut session, 3_200);
    assert_eq!(session.on_context_menu(), Disposition::Prevent);
    assert_eq!(session.phase(), Phase::Finished(Outcome::CheatCancelled));
}

#[test]
fn open_devtools_are_caught_by_the_viewport_poll() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.viewport.set(ViewportDims {
        outer_width: 1400,
        outer_height: 800,
        inner_width: 1200,
        inner_height: 800,
    });
    world.run_to(&mut session, 999);
    assert_eq!(session.phase(), Phase::Reading);
    world.run_to(&mut session, 1_000);
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "developer tools are open"
    );
}

#[test]
fn debugger_pause_is_caught_by_the_probe() {
    let world = World::ranked(&vec!["alpha"; 40].join(" "), 3);
    let mut session = world.start();
    world.debugger_pause_ms.set(150);
    world.run_to(&mut session, 3_000);
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "an active debugger was detected"
    );
}

#[test]
fn focus_loss_counts_only_after_the_grace_window() {
    let world = World::ranked(&vec!["alpha"; 40].join(" "), 3);
    let mut session = world.start();

    world.focus.set(false);
    session.on_blur();
    world.focus.set(true);
    world.run_to(&mut session, 500);
    assert_eq!(session.phase(), Phase::Reading);

    world.clock.set(600);
    world.focus.set(false);
    session.on_blur();
    world.run_to(&mut session, 1_099);
    assert_eq!(session.phase(), Phase::Reading);
    world.run_to(&mut session, 1_100);
    assert_matches!(
        world.exits.last(),
        Some(SessionExit::CheatCancelled { reason }) if reason == "the window lost focus"
    );
}

#[test]
fn zero_credit_submission_failure_still_cancels() {
    let world = World::ranked(&sixteen_words(), 3);
    world.fail_scoring("offline");
    let mut session = world.start();
    session.on_visibility_change(true);
    assert_eq!(session.phase(), Phase::Finished(Outcome::CheatCancelled));
    assert_eq!(world.submissions().len(), 1);
    assert_matches!(world.exits.last(), Some(SessionExit::CheatCancelled { .. }));
}

#[test]
fn restart_rearms_a_fresh_monitor() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.start();
    world.run_to(&mut session, 2_500);
    session.restart().unwrap();
    assert_eq!(session.monitor_state(), MonitorState::Armed);
    assert_eq!(session.timers().live_count_of(TimerKind::DevtoolsPoll), 1);
    assert_eq!(session.timers().live_count_of(TimerKind::DebuggerProbe), 1);

    world.run_to(&mut session, 2_500 + 3_199);
    assert_eq!(session.phase(), Phase::Reading);
    world.run_to(&mut session, 2_500 + 3_200);
    assert_eq!(session.phase(), Phase::Quiz);
}

#[test]
fn restart_is_rejected_outside_reading() {
    let world = World::ranked(&sixteen_words(), 3);
    let mut session = world.load();
    assert_matches!(session.restart(), Err(SessionError::InvalidPhase { .. }));
    session.start().unwrap();
    world.run_to(&mut session, 3_200);
    assert_matches!(
        session.restart(),
        Err(SessionError::InvalidPhase { action: "restart", phase: Phase::Quiz })
    );
}

#[test]
fn telemetry_tracks_progress() {
    let world = World::training(&vec!["alpha"; 10].join(" "));
    let mut session = world.start();
    assert_eq!(session.words_remaining(), 10);
    assert_eq!(session.estimated_seconds_left(), 2);
    world.run_to(&mut session, 1_000);
    assert_eq!(session.cursor(), 5);
    assert!((session.progress_percent() - 50.0).abs() < 1e-9);
    assert_eq!(session.words_remaining(), 5);
    assert_eq!(session.estimated_seconds_left(), 1);
    assert_eq!(session.live_wpm(), 300);
}
