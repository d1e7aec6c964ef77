//! End-to-end scenarios: processes sharing resources over simulated time.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EnvironmentConfig;
use crate::environment::{Environment, StopReason, Until};
use crate::event::EventKind;
use crate::payload::Value;
use crate::process::{Context, Named, Process, ProcessState, Resume, Step, Using};
use crate::resource::ResourceId;
use crate::time::SimTime;

type Log = Rc<RefCell<Vec<(u64, String)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn note(log: &Log, ctx: &Context<'_>, what: impl Into<String>) {
    log.borrow_mut().push((ctx.now().ticks(), what.into()));
}

// ── Charging station ──────────────────────────────────────────────────

/// Arrives after `delay`, waits for a charging point, charges for
/// `charge` ticks, leaves.
struct Car {
    name: String,
    station: ResourceId,
    delay: u64,
    charge: u64,
    log: Log,
    stage: u8,
    request: Option<crate::event::EventId>,
}

impl Car {
    fn new(index: usize, station: ResourceId, delay: u64, charge: u64, log: Log) -> Self {
        Car {
            name: format!("Car {}", index),
            station,
            delay,
            charge,
            log,
            stage: 0,
            request: None,
        }
    }
}

impl Process for Car {
    fn resume(&mut self, ctx: &mut Context<'_>, _resume: Resume) -> Step {
        self.stage += 1;
        match self.stage {
            1 => Step::wait(ctx.timeout(self.delay)),
            2 => {
                note(&self.log, ctx, format!("{} arrives", self.name));
                let req = ctx.request(self.station);
                self.request = req.as_ref().ok().copied();
                Step::wait(req)
            }
            3 => {
                note(&self.log, ctx, format!("{} starts charging", self.name));
                Step::wait(ctx.timeout(self.charge))
            }
            _ => {
                note(&self.log, ctx, format!("{} leaves", self.name));
                if let Some(req) = self.request.take() {
                    if let Err(e) = ctx.release(self.station, req) {
                        return Step::Fail(crate::payload::Failure::new(e.to_string()));
                    }
                }
                Step::done()
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn expected(rows: &[(u64, &str)]) -> Vec<(u64, String)> {
    rows.iter().map(|(t, s)| (*t, s.to_string())).collect()
}

#[test]
fn test_charging_station() {
    init_tracing();
    let mut env = Environment::new();
    let station = env.resource(2).unwrap();
    let log = new_log();
    for i in 0..4 {
        env.process(Car::new(i, station, i as u64 * 2, 5, log.clone()))
            .unwrap();
    }

    let reason = env.run(Until::Forever).unwrap();
    assert!(!reason.is_deadlock());
    assert_eq!(
        *log.borrow(),
        expected(&[
            (0, "Car 0 arrives"),
            (0, "Car 0 starts charging"),
            (2, "Car 1 arrives"),
            (2, "Car 1 starts charging"),
            (4, "Car 2 arrives"),
            (5, "Car 0 leaves"),
            (5, "Car 2 starts charging"),
            (6, "Car 3 arrives"),
            (7, "Car 1 leaves"),
            (7, "Car 3 starts charging"),
            (10, "Car 2 leaves"),
            (12, "Car 3 leaves"),
        ])
    );
    assert_eq!(env.now(), SimTime::new(12));
    assert_eq!(env.inspect_resource(station).unwrap().count(), 0);
}

#[test]
fn test_request_beyond_capacity_is_queued() {
    let mut env = Environment::new();
    let res = env.resource(2).unwrap();
    let a = env.request(res).unwrap();
    let b = env.request(res).unwrap();
    let c = env.request(res).unwrap();

    let r = env.inspect_resource(res).unwrap();
    assert_eq!(r.count(), 2);
    assert_eq!(r.queue_len(), 1);
    assert_eq!(r.users(), &[a, b]);

    env.run(Until::Forever).unwrap();
    assert_eq!(env.event_kind(c).unwrap(), Some(EventKind::Request { resource: res }));
    assert_eq!(env.event_value(c).unwrap(), None);

    env.release(res, a).unwrap();
    assert_eq!(env.inspect_resource(res).unwrap().users(), &[b, c]);
    env.run(Until::Forever).unwrap();
    assert!(env.event_value(c).unwrap().is_some());
}

// ── Car with a charging sub-process ───────────────────────────────────

/// Drives for 5, then charges for 2 in a child process it waits on.
fn car_with_charger(log: Log) -> impl Process {
    let mut driving = false;
    move |ctx: &mut Context<'_>, _r: Resume| {
        if driving {
            note(&log, ctx, "drive");
            driving = false;
            let charge_log = log.clone();
            let mut charged = false;
            let charge = Named::new("charge", move |ctx: &mut Context<'_>, _r: Resume| {
                if charged {
                    return Step::done();
                }
                charged = true;
                note(&charge_log, ctx, "charge");
                Step::wait(ctx.timeout(2))
            });
            return Step::wait(ctx.process(charge).map(|h| h.completion_event()));
        }
        note(&log, ctx, "park");
        driving = true;
        Step::wait(ctx.timeout(5))
    }
}

#[test]
fn test_car_waits_on_charge_process() {
    init_tracing();
    let mut env = Environment::new();
    let log = new_log();
    env.process(car_with_charger(log.clone())).unwrap();

    let reason = env.run(Until::at(15)).unwrap();
    assert_eq!(reason, StopReason::ReachedTime(SimTime::new(15)));
    assert_eq!(
        *log.borrow(),
        expected(&[
            (0, "park"),
            (5, "drive"),
            (5, "charge"),
            (7, "park"),
            (12, "drive"),
            (12, "charge"),
            (14, "park"),
        ])
    );
    assert_eq!(env.now(), SimTime::new(15));
}

// ── Canonical scenarios ───────────────────────────────────────────────

#[test]
fn test_single_unit_is_handed_over_at_release_time() {
    let mut env = Environment::new();
    let res = env.resource(1).unwrap();
    let log = new_log();

    for name in ["first", "second"] {
        let log = log.clone();
        let mut held = false;
        env.process(Using::new(res, move |ctx: &mut Context<'_>, _r: Resume| {
            if held {
                note(&log, ctx, format!("{} out", name));
                return Step::done();
            }
            held = true;
            note(&log, ctx, format!("{} in", name));
            Step::wait(ctx.timeout(5))
        }))
        .unwrap();
    }

    env.run(Until::Forever).unwrap();
    assert_eq!(
        *log.borrow(),
        expected(&[
            (0, "first in"),
            (5, "first out"),
            (5, "second in"),
            (10, "second out"),
        ])
    );
}

#[test]
fn test_alternating_timeouts_until_bound() {
    let mut env = Environment::new();
    let times: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = times.clone();
    let mut long = true;
    env.process(move |ctx: &mut Context<'_>, _r: Resume| {
        seen.borrow_mut().push(ctx.now().ticks());
        let delay = if long { 5 } else { 2 };
        long = !long;
        Step::wait(ctx.timeout(delay))
    })
    .unwrap();

    let reason = env.run(Until::at(15)).unwrap();
    assert_eq!(reason, StopReason::ReachedTime(SimTime::new(15)));
    assert_eq!(*times.borrow(), vec![0, 5, 7, 12, 14]);
    assert_eq!(env.now(), SimTime::new(15));
    assert_eq!(env.peek(), Some(SimTime::new(19)));
}

#[test]
fn test_waiter_resumes_only_after_target_terminates() {
    let mut env = Environment::new();
    let mut slept = false;
    let worker = env
        .process(move |ctx: &mut Context<'_>, _r: Resume| {
            if slept {
                return Step::done();
            }
            slept = true;
            Step::wait(ctx.timeout(8))
        })
        .unwrap();

    let log = new_log();
    let seen = log.clone();
    let target = worker.id();
    env.process(move |ctx: &mut Context<'_>, resume: Resume| match resume {
        Resume::Start => Step::Wait(worker.completion_event()),
        _ => {
            let done = matches!(ctx.process_state(target), Ok(ProcessState::Finished));
            note(&seen, ctx, format!("resumed, worker finished: {}", done));
            Step::done()
        }
    })
    .unwrap();

    env.run(Until::at(8)).unwrap();
    assert!(log.borrow().is_empty());
    env.run(Until::Forever).unwrap();
    assert_eq!(
        *log.borrow(),
        expected(&[(8, "resumed, worker finished: true")])
    );
}

// ── Reproducibility ───────────────────────────────────────────────────

fn traced_station_run() -> (u64, usize) {
    let mut env = Environment::with_config(EnvironmentConfig::default().traced());
    let station = env.resource(2).unwrap();
    let log = new_log();
    for i in 0..6 {
        env.process(Car::new(i, station, i as u64, 3 + i as u64 % 2, log.clone()))
            .unwrap();
    }
    env.run(Until::Forever).unwrap();
    let trace = env.trace().unwrap();
    (trace.hash(), trace.len())
}

#[test]
fn test_identical_runs_produce_identical_traces() {
    let (h1, n1) = traced_station_run();
    let (h2, n2) = traced_station_run();
    assert_eq!(h1, h2);
    assert_eq!(n1, n2);
    assert!(n1 > 0);
}

// ── Long runs ─────────────────────────────────────────────────────────

/// Charges for 5 ticks through a `Using` child, drives for 2, forever.
fn commuter(station: ResourceId) -> impl Process {
    let mut charging = false;
    move |ctx: &mut Context<'_>, _r: Resume| {
        charging = !charging;
        if !charging {
            return Step::wait(ctx.timeout(2));
        }
        let mut plugged = false;
        let charge = Using::new(station, move |ctx: &mut Context<'_>, _r: Resume| {
            if plugged {
                return Step::done();
            }
            plugged = true;
            Step::wait(ctx.timeout(5))
        });
        Step::wait(ctx.process(charge).map(|h| h.completion_event()))
    }
}

fn footprint(until: u64) -> (usize, usize, usize) {
    let mut env = Environment::new();
    let station = env.resource(1).unwrap();
    env.process(commuter(station)).unwrap();
    env.run(Until::at(until)).unwrap();
    let res = env.inspect_resource(station).unwrap();
    (
        env.retained_events(),
        env.retained_processes(),
        res.count() + res.queue_len(),
    )
}

#[test]
fn test_long_run_keeps_bounded_state() {
    let short = footprint(7_000);
    let long = footprint(70_000);
    assert_eq!(short, long);
    let (events, processes, requests) = long;
    assert!(events <= 4, "events retained: {events}");
    assert!(processes <= 2, "processes retained: {processes}");
    assert!(requests <= 1, "requests tracked: {requests}");
}

#[test]
fn test_finished_processes_are_read_back_from_completion() {
    let mut env = Environment::new();
    let quiet = env
        .process(|_ctx: &mut Context<'_>, _r: Resume| Step::done())
        .unwrap();
    let loud = env
        .process(|_ctx: &mut Context<'_>, _r: Resume| Step::Done(Value::Int(3)))
        .unwrap();
    assert_eq!(env.retained_processes(), 2);

    env.run(Until::Forever).unwrap();
    assert_eq!(env.retained_processes(), 0);
    assert_eq!(env.process_state(quiet.id()).unwrap(), ProcessState::Finished);
    assert_eq!(env.process_state(loud.id()).unwrap(), ProcessState::Finished);
    assert_eq!(env.completion_event(loud.id()).unwrap(), loud.completion_event());
    assert_eq!(
        env.event_value(loud.completion_event()).unwrap(),
        Some(&Value::Int(3))
    );
    // Only the completion carrying a value is still held.
    assert_eq!(env.retained_events(), 1);
}
