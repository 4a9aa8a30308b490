//! End-to-end recording lifecycle: start, capture, stop, rotate, sweep.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use tempfile::TempDir;

use reelhouse_archive::{catalog, Archive};
use reelhouse_core::{Clock, Config, ManualClock, RecordingFilter, SessionKey, Subject};
use reelhouse_session::testing::TestSubject;
use reelhouse_session::{
    rotate, NoopHandler, Recorder, RecorderError, RegistryOptions, RetentionSweep, SessionRegistry,
};

fn registry(tmp: &TempDir, clock: &ManualClock) -> SessionRegistry {
    SessionRegistry::new(RegistryOptions::new(tmp.path()), Arc::new(clock.clone()))
}

#[test]
fn test_record_stop_and_restart() {
    let tmp = TempDir::new().unwrap();
    let clock = ManualClock::at(2024, 5, 17, 15, 4, 5);
    let reg = registry(&tmp, &clock);

    let alice = TestSubject::online("alice");
    let key = SessionKey::Subject(alice.id());
    let session = reg.start_session(key.clone(), alice.clone()).unwrap();
    for i in 0..3u8 {
        clock.advance(chrono::Duration::milliseconds(400));
        assert!(session.record_event(vec![i]));
    }

    let path = reg.stop_session(&key).unwrap();
    assert!(!reg.is_active(&key));
    assert!(path.file_name().is_some());

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.events.len(), 3);
    assert_eq!(
        archive.events.iter().map(|e| e.payload[0]).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(archive.metadata.duration, 1);
    assert_eq!(archive.metadata.subject_name, "alice");

    // Previous session is fully gone; a new one gets the next sequence.
    let again = reg.start_session(key.clone(), alice).unwrap();
    assert!(again.output_path().ends_with("alice_15-04-06_2.mcpr"));
}

#[test]
fn test_stop_without_start() {
    let tmp = TempDir::new().unwrap();
    let clock = ManualClock::at(2024, 5, 17, 15, 4, 5);
    let reg = registry(&tmp, &clock);

    let err = reg
        .stop_session(&SessionKey::Custom("ghost".into()))
        .unwrap_err();
    assert!(matches!(err, RecorderError::NotRecording(_)));
    assert_eq!(reg.active_count(), 0);
    assert!(catalog::scan(tmp.path(), "mcpr").is_empty());
}

#[test]
fn test_concurrent_starts_single_winner() {
    const CALLERS: usize = 16;

    let tmp = TempDir::new().unwrap();
    let clock = ManualClock::at(2024, 5, 17, 15, 4, 5);
    let reg = Arc::new(registry(&tmp, &clock));
    let subject = TestSubject::online("alice");
    let key = SessionKey::Subject(subject.id());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let reg = Arc::clone(&reg);
            let key = key.clone();
            let subject: Arc<dyn Subject> = subject.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reg.start_session(key, subject)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let dupes = results
        .iter()
        .filter(|r| matches!(r, Err(RecorderError::AlreadyRecording(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(dupes, CALLERS - 1);
    assert_eq!(reg.active_count(), 1);
    assert_eq!(catalog::scan(tmp.path(), "mcpr").len(), 1);
}

#[test]
fn test_backward_clock_clamps_duration() {
    let tmp = TempDir::new().unwrap();
    let clock = ManualClock::at(2024, 5, 17, 15, 4, 5);
    let reg = registry(&tmp, &clock);

    let key = SessionKey::Custom("tower".into());
    let session = reg.start_session(key.clone(), TestSubject::online("tower")).unwrap();
    session.record_event(b"before".to_vec());
    clock.advance(chrono::Duration::hours(-2));
    session.record_event(b"after".to_vec());

    let archive = Archive::open(reg.stop_session(&key).unwrap()).unwrap();
    assert_eq!(archive.metadata.duration, 0);
    assert_eq!(archive.events.len(), 2);
}

#[test]
fn test_midnight_rotation() {
    let tmp = TempDir::new().unwrap();
    let clock = ManualClock::at(2024, 5, 17, 23, 58, 0);
    let reg = registry(&tmp, &clock);

    let alice = TestSubject::online("alice");
    let bob = TestSubject::online("bob");
    let alice_key = SessionKey::Subject(alice.id());
    let bob_key = SessionKey::Subject(bob.id());
    let alice_first = reg.start_session(alice_key.clone(), alice.clone()).unwrap();
    reg.start_session(bob_key.clone(), bob.clone()).unwrap();
    alice_first.record_event(b"late night".to_vec());

    bob.set_online(false);
    clock.advance(chrono::Duration::minutes(3));
    let report = rotate(&reg, &RecordingFilter::allow_all(), clock.today());

    let old_day = tmp.path().join("2024_05_17");
    let new_day = tmp.path().join("2024_05_18");
    assert_eq!(report.sealed.len(), 2);
    assert!(report.sealed.iter().all(|(_, p)| p.starts_with(&old_day)));
    assert_eq!(catalog::scan(&old_day, "mcpr").len(), 2);

    assert_eq!(report.restarted, vec![alice_key.clone()]);
    assert!(!reg.is_active(&bob_key));
    let alice_next = reg.get(&alice_key).unwrap();
    assert!(alice_next.output_path().starts_with(&new_day));
    assert_ne!(alice_next.output_path(), alice_first.output_path());
    assert_eq!(reg.partition(), NaiveDate::from_ymd_opt(2024, 5, 18).unwrap());
}

#[test]
fn test_retention_days() {
    let tmp = TempDir::new().unwrap();
    let now = SystemTime::now();
    let mut paths = Vec::new();
    for days in [0u64, 6, 8, 10] {
        let path = tmp.path().join(format!("day{}.mcpr", days));
        let file = std::fs::File::create(&path).unwrap();
        file.set_modified(now - Duration::from_secs(days * 24 * 3600)).unwrap();
        paths.push(path);
    }

    let report = RetentionSweep::days(tmp.path(), "mcpr", 7).unwrap().sweep(now);

    assert!(paths[0].exists());
    assert!(paths[1].exists());
    assert!(!paths[2].exists());
    assert!(!paths[3].exists());
    assert_eq!(report.deleted.len(), 2);
}

#[tokio::test]
async fn test_recorder_shutdown_seals_all() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.recording.root = tmp.path().to_path_buf();
    config.instant_replay.dir = tmp.path().join("instant");

    let clock = ManualClock::at(2024, 5, 17, 10, 0, 0);
    let recorder = Recorder::init(config, Arc::new(clock), Arc::new(NoopHandler));

    let subjects: Vec<_> = ["alice", "bob", "carol"]
        .iter()
        .map(|n| TestSubject::online(*n))
        .collect();
    for subject in &subjects {
        let key = SessionKey::Subject(subject.id());
        assert!(recorder.start_session(key.clone(), subject.clone()));
        assert!(recorder.record_event(&key, b"tick".to_vec()));
    }
    assert_eq!(recorder.active_count(), 3);

    recorder.shutdown().await;

    assert_eq!(recorder.active_count(), 0);
    let archives = catalog::scan(tmp.path(), "mcpr");
    assert_eq!(archives.len(), 3);
    for entry in archives {
        assert_eq!(Archive::open(&entry.path).unwrap().events.len(), 1);
    }
}
