//! Workstation lifecycle with real loop threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use operant_core::{ChamberId, TaskTime};
use operant_runtime::{ChamberNotice, NoticeSink, StatusBoard, Workstation, WorkstationConfig};
use operant_task::Protocol;
use operant_test::{
    test_registry, PanickingLogger, PanickingPresentation, RecordingLogger, SimSource,
};

fn config(output: &std::path::Path) -> WorkstationConfig {
    WorkstationConfig::from_toml(&format!(
        r#"
logic_rate_hz = 1000
frame_rate_hz = 60
chambers = 2
output_folder = '{}'

[[chamber]]
chamber = 0
task = "Trial"
subject = "rat07"
loggers = [{{ kind = "jsonl" }}, {{ kind = "csv" }}]
components = [{{ id = "poke", kind = "binary_input", source = "sim", address = "box0/poke" }}]

[[chamber]]
chamber = 1
task = "Timer"
protocol = {{ duration = 0.05 }}
"#,
        output.display()
    ))
    .unwrap()
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_session_runs_and_shuts_down_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimSource::new("sim");
    let (sink, mut notices) = NoticeSink::channel();
    let workstation = Workstation::builder(config(dir.path()))
        .tasks(test_registry())
        .source(Arc::new(sim.clone()))
        .notices(sink)
        .start()
        .unwrap();

    let board = StatusBoard::new();
    let added = workstation.add_configured(|_| board.presentation()).unwrap();
    assert_eq!(added, vec![ChamberId(0), ChamberId(1)]);
    for &chamber in &added {
        workstation.manager().start(chamber).unwrap();
    }

    let manager = workstation.manager().clone();
    wait_until("the initiation state", || {
        manager
            .status(ChamberId(0))
            .map_or(false, |s| s.snapshot.state == "INITIATION" && s.snapshot.started)
    });
    sim.input("box0/poke").unwrap().enter();
    wait_until("the stimulus state", || {
        manager
            .status(ChamberId(0))
            .map_or(false, |s| s.snapshot.state == "STIMULUS")
    });
    wait_until("the timer to complete", || {
        manager
            .status(ChamberId(1))
            .map_or(false, |s| !s.snapshot.started)
    });
    wait_until("a status line", || {
        board
            .line(ChamberId(0))
            .map_or(false, |line| line.contains("rat07") && line.contains("STIMULUS"))
    });

    workstation.shutdown().unwrap();
    assert!(manager.chambers().is_empty());
    assert!(sim.is_closed());
    assert!(sim.input("box0/poke").unwrap().is_closed());

    let mut received = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        received.push(notice);
    }
    assert!(received.contains(&ChamberNotice::Completed {
        chamber: ChamberId(1),
        task: "Timer"
    }));
    assert!(received.contains(&ChamberNotice::Removed { chamber: ChamberId(0) }));
    assert!(received.contains(&ChamberNotice::Removed { chamber: ChamberId(1) }));

    // Every event, including the final state from the shutdown stop, is on disk
    let jsonl = std::fs::read_to_string(dir.path().join("chamber0_rat07_Trial.jsonl")).unwrap();
    let types: Vec<String> = jsonl
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(types, vec!["state", "input", "state", "final_state"]);

    let csv = std::fs::read_to_string(dir.path().join("chamber0_rat07_Trial.csv")).unwrap();
    let mut rows = csv.lines();
    assert_eq!(rows.next(), Some("time,type,state,component,change,metadata"));
    assert_eq!(rows.count(), 4);
}

#[test]
fn test_invalid_configuration_is_rejected_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.sessions[1].task = "NoSuchTask".to_string();
    let result = Workstation::builder(config)
        .tasks(test_registry())
        .source(Arc::new(SimSource::new("sim")))
        .start();
    assert!(result.is_err());
}

#[test]
fn test_unknown_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let result = Workstation::builder(config(dir.path()))
        .tasks(test_registry())
        .start();
    assert!(result.is_err());
}

#[test]
fn test_drop_shuts_down_idle_workstation() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimSource::new("sim");
    {
        let workstation = Workstation::builder(config(dir.path()))
            .tasks(test_registry())
            .source(Arc::new(sim.clone()))
            .start()
            .unwrap();
        workstation.add_configured(|_| StatusBoard::new().presentation()).unwrap();
    }
    assert!(sim.is_closed());
    assert!(sim.input("box0/poke").unwrap().is_closed());
}

#[test]
fn test_remove_during_ticks_delivers_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimSource::new("sim");
    let mut config = config(dir.path());
    config.sessions[0].protocol = Protocol::new().with("max_rewards", 1_000_000);
    let workstation = Workstation::builder(config)
        .tasks(test_registry())
        .source(Arc::new(sim.clone()))
        .start()
        .unwrap();

    let (recorder, log) = RecordingLogger::new("recorder");
    let chamber = workstation
        .add_session(
            &workstation.config().sessions[0],
            StatusBoard::new().presentation(),
            vec![Box::new(recorder)],
        )
        .unwrap();
    workstation.manager().start(chamber).unwrap();

    let input = sim.input("box0/poke").unwrap();
    let poking = Arc::new(AtomicBool::new(true));
    let subject = {
        let input = Arc::clone(&input);
        let poking = Arc::clone(&poking);
        thread::spawn(move || {
            let mut pokes = 0u64;
            while poking.load(Ordering::Acquire) {
                input.poke();
                pokes += 1;
                thread::sleep(Duration::from_micros(500));
            }
            pokes
        })
    };
    let input_labels = || -> Vec<String> {
        log.labels()
            .into_iter()
            .filter(|label| label.starts_with("poke:"))
            .collect()
    };
    wait_until("input events", || input_labels().len() >= 20);

    // No stop: the logic loop is ticking the chamber when removal begins
    workstation.manager().remove(chamber, true).unwrap().join().unwrap();
    poking.store(false, Ordering::Release);
    let pokes = subject.join().unwrap();

    // Every change the task consumed was logged, in the order it was produced
    let inputs = input_labels();
    assert_eq!(inputs.len() as u64, pokes * 2 - input.pending() as u64);
    for (i, label) in inputs.iter().enumerate() {
        let expected = if i % 2 == 0 { "poke:entered" } else { "poke:exited" };
        assert_eq!(label, expected, "input {i}");
    }
    let times: Vec<TaskTime> = log.events().iter().map(|e| e.time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "times went backwards");
    assert_eq!(log.labels().first().map(String::as_str), Some("INITIATION"));
    assert_eq!((log.starts(), log.closes()), (1, 1));
    assert!(input.is_closed());
    assert!(workstation.manager().status(chamber).is_none());

    workstation.shutdown().unwrap();
}

#[test]
fn test_panicking_logger_and_presentation_do_not_stall_the_loops() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimSource::new("sim");
    let (sink, mut notices) = NoticeSink::channel();
    let workstation = Workstation::builder(config(dir.path()))
        .tasks(test_registry())
        .source(Arc::new(sim.clone()))
        .notices(sink)
        .start()
        .unwrap();

    let (sibling, sibling_log) = RecordingLogger::new("sibling");
    let (timer, timer_log) = RecordingLogger::new("timer");
    let sessions = &workstation.config().sessions;
    workstation
        .add_session(
            &sessions[0],
            Box::new(PanickingPresentation),
            vec![Box::new(PanickingLogger::new("wild")), Box::new(sibling)],
        )
        .unwrap();
    workstation
        .add_session(&sessions[1], StatusBoard::new().presentation(), vec![Box::new(timer)])
        .unwrap();
    for chamber in [ChamberId(0), ChamberId(1)] {
        workstation.manager().start(chamber).unwrap();
    }

    sim.input("box0/poke").unwrap().enter();
    wait_until("the sibling logger to see the stimulus", || {
        sibling_log.labels() == ["INITIATION", "poke:entered", "STIMULUS"]
    });
    wait_until("the timer's final state", || {
        timer_log.labels() == ["RUNNING", "final:RUNNING"]
    });

    let removal = workstation.manager().remove(ChamberId(1), true).unwrap();
    wait_until("the removal of chamber 1", || removal.is_finished());
    removal.join().unwrap();

    workstation.shutdown().unwrap();
    assert_eq!(sibling_log.closes(), 1);
    assert!(sibling_log.labels().last().unwrap().starts_with("final:"));

    let mut failed = 0;
    while let Ok(notice) = notices.try_recv() {
        if let ChamberNotice::LoggerFailed { chamber, logger, .. } = notice {
            assert_eq!((chamber, logger.as_str()), (ChamberId(0), "wild"));
            failed += 1;
        }
    }
    assert!(failed >= 2, "expected a failure per batch and on close, got {failed}");
}
