//! End-to-end trials against scripted devices.

use std::time::Duration;

use evt_response::backends::virtual_input::{VirtualBackend, VirtualCall, VirtualKeyboard};
use evt_response::{
    ActiveDevice, DeviceDescriptor, DeviceSelector, EvtError, LedTrigger, Response,
    ResponseOutcome, ResponseSource, Rgb, Session, TrialConfig, TrialState,
};

const RSP: &str = "/dev/hidraw-rsp";

fn rsp() -> DeviceDescriptor {
    DeviceDescriptor::new(RSP, "EventExchanger-RSP-LT-4", "00421")
}

fn device_trial() -> TrialConfig {
    TrialConfig {
        item: "target".into(),
        device: "1: RSP-LT-4 s/n: 00421".into(),
        correct_response: "3".into(),
        allowed_responses: "1;3".into(),
        reset_delay: 0,
        ..Default::default()
    }
}

fn session_with(backend: &VirtualBackend) -> Session {
    Session::new(Box::new(backend.handle()), Box::new(VirtualKeyboard::new()))
}

#[test]
fn correct_press_on_response_box() {
    let backend = VirtualBackend::new().with_device(rsp());
    backend.press_button(RSP, 3, Duration::from_millis(412));
    let mut session = session_with(&backend);

    let prepared = session.prepare(&device_trial()).unwrap();
    assert_eq!(prepared.plan.allowed.mask(), 0b101);
    assert_eq!(prepared.active, ActiveDevice::Device { slot: 1 });

    let mut recorded: Vec<ResponseOutcome> = Vec::new();
    let outcome = session.run_and_record(&prepared, &mut recorded).unwrap();

    assert_eq!(outcome.response, Response::Button(3));
    assert!(outcome.correct);
    assert_eq!(outcome.response_time, 412.0);
    assert_eq!(outcome.item, "target");
    assert_eq!(outcome.source, ResponseSource::Device { slot: 1 });
    assert_eq!(recorded, vec![outcome]);

    let waits: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, VirtualCall::Wait { .. }))
        .collect();
    assert_eq!(
        waits,
        vec![VirtualCall::Wait {
            device: format!("virtual:{RSP}#1"),
            mask: 0b101,
            timeout: None,
        }]
    );
}

#[test]
fn wrong_press_is_incorrect() {
    let backend = VirtualBackend::new().with_device(rsp());
    // Button 2 is not allowed and is ignored; button 1 qualifies.
    backend.press_button(RSP, 2, Duration::from_millis(100));
    backend.press_button(RSP, 1, Duration::from_millis(250));
    let mut session = session_with(&backend);

    let prepared = session.prepare(&device_trial()).unwrap();
    let run = session.run(&prepared).unwrap();
    assert_eq!(run.outcome.response, Response::Button(1));
    assert!(!run.outcome.correct);
    assert_eq!(
        run.states,
        vec![
            TrialState::Idle,
            TrialState::ColorsSet,
            TrialState::AwaitingResponse,
            TrialState::FeedbackShown,
            TrialState::Done,
        ]
    );
}

#[test]
fn led_commands_in_order() {
    let backend = VirtualBackend::new().with_device(rsp());
    backend.press_button(RSP, 3, Duration::from_millis(10));
    let mut session = session_with(&backend);
    let cfg = TrialConfig {
        button1_color: "#101010".into(),
        ..device_trial()
    };

    let prepared = session.prepare(&cfg).unwrap();
    session.run(&prepared).unwrap();

    let leds: Vec<(u8, Rgb, LedTrigger)> = backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            VirtualCall::SetLed {
                led,
                color,
                trigger,
                ..
            } => Some((led, color, trigger)),
            _ => None,
        })
        .collect();

    let idle = Rgb::BLACK;
    let expected = vec![
        (1, Rgb::new(0x10, 0x10, 0x10), LedTrigger::Immediate),
        (2, idle, LedTrigger::Immediate),
        (3, idle, LedTrigger::Immediate),
        (4, idle, LedTrigger::Immediate),
        (1, Rgb::RED, LedTrigger::OnButton(1)),
        (2, Rgb::RED, LedTrigger::OnButton(2)),
        (3, Rgb::RED, LedTrigger::OnButton(3)),
        (4, Rgb::RED, LedTrigger::OnButton(4)),
        (3, Rgb::GREEN, LedTrigger::OnButton(3)),
        (1, Rgb::BLACK, LedTrigger::Immediate),
        (2, Rgb::BLACK, LedTrigger::Immediate),
        (3, Rgb::BLACK, LedTrigger::Immediate),
        (4, Rgb::BLACK, LedTrigger::Immediate),
    ];
    assert_eq!(leds, expected);
}

#[test]
fn finite_timeout_records_no_response() {
    let backend = VirtualBackend::new().with_device(rsp());
    let mut session = session_with(&backend);
    let cfg = TrialConfig {
        timeout: "1500".into(),
        ..device_trial()
    };

    let prepared = session.prepare(&cfg).unwrap();
    let run = session.run(&prepared).unwrap();
    assert_eq!(run.outcome.response, Response::NoResponse);
    assert!(!run.outcome.correct);
    assert_eq!(run.outcome.response_time, 1500.0);
    assert!(run.states.contains(&TrialState::TimedOut));
    assert!(backend.calls().contains(&VirtualCall::Wait {
        device: format!("virtual:{RSP}#1"),
        mask: 0b101,
        timeout: Some(Duration::from_millis(1500)),
    }));
}

#[test]
fn infinite_timeout_waits_unbounded() {
    let backend = VirtualBackend::new().with_device(rsp());
    let mut session = session_with(&backend);

    // Nothing scripted: an unbounded wait has nothing to return and must not time out.
    let prepared = session.prepare(&device_trial()).unwrap();
    assert!(prepared.plan.timeout.as_duration().is_none());
    assert!(session.run(&prepared).is_err());
    assert!(backend
        .calls()
        .iter()
        .any(|c| matches!(c, VirtualCall::Wait { timeout: None, .. })));
}

#[test]
fn simultaneous_presses_are_rejected() {
    let backend = VirtualBackend::new().with_device(rsp());
    backend.feed(
        RSP,
        evt_response::DeviceEvent {
            raw: 0b101,
            elapsed: Duration::from_millis(5),
        },
    );
    let mut session = session_with(&backend);

    let prepared = session.prepare(&device_trial()).unwrap();
    let mut recorded: Vec<ResponseOutcome> = Vec::new();
    let err = session.run_and_record(&prepared, &mut recorded).unwrap_err();
    assert!(matches!(err, EvtError::MultipleButtonsPressed { mask: 0b101 }));
    assert!(recorded.is_empty());
}

#[test]
fn keyboard_mode_makes_no_vendor_calls() {
    let backend = VirtualBackend::new().with_device(rsp());
    let mut keyboard = VirtualKeyboard::new();
    keyboard.press("3", Duration::from_millis(640));
    let mut session = Session::new(Box::new(backend.handle()), Box::new(keyboard));

    let cfg = TrialConfig {
        device: "0: Keyboard".into(),
        ..device_trial()
    };
    let prepared = session.prepare(&cfg).unwrap();
    assert_eq!(prepared.active, ActiveDevice::Keyboard);

    let run = session.run(&prepared).unwrap();
    assert_eq!(run.outcome.response, Response::Button(3));
    assert!(run.outcome.correct);
    assert_eq!(run.outcome.source, ResponseSource::Keyboard);
    assert_eq!(run.outcome.response_time, 640.0);
    assert!(run.states.is_empty());
    assert!(backend.calls().is_empty());
}

#[test]
fn scan_failure_falls_back_to_keyboard() {
    let backend = VirtualBackend::new().with_device(rsp()).failing_scan();
    let mut keyboard = VirtualKeyboard::new();
    keyboard.press("1", Duration::from_millis(300));
    let mut session = Session::new(Box::new(backend.handle()), Box::new(keyboard));

    let prepared = session.prepare(&device_trial()).unwrap();
    assert_eq!(prepared.active, ActiveDevice::Keyboard);
    assert!(session.registry().is_empty());

    let run = session.run(&prepared).unwrap();
    assert_eq!(run.outcome.response, Response::Button(1));
    assert_eq!(run.outcome.source, ResponseSource::Keyboard);
    assert_eq!(
        backend.calls(),
        vec![VirtualCall::Scan {
            group: "RSP-LT".into()
        }]
    );
}

#[test]
fn empty_scan_falls_back_to_keyboard() {
    let backend = VirtualBackend::new();
    let mut session = session_with(&backend);

    let prepared = session.prepare(&device_trial()).unwrap();
    assert_eq!(prepared.active, ActiveDevice::Keyboard);
    assert_eq!(backend.attach_count(), 0);
}

#[test]
fn attach_failure_falls_back_to_keyboard() {
    let backend = VirtualBackend::new().with_device(rsp()).failing_attach(RSP);
    let mut session = session_with(&backend);

    let prepared = session.prepare(&device_trial()).unwrap();
    assert_eq!(prepared.active, ActiveDevice::Keyboard);
}

#[test]
fn invalid_configuration_fails_before_hardware() {
    let backend = VirtualBackend::new().with_device(rsp());
    let mut session = session_with(&backend);
    let cfg = TrialConfig {
        allowed_responses: "1;three".into(),
        ..device_trial()
    };

    assert!(matches!(
        session.prepare(&cfg),
        Err(EvtError::InvalidConfiguration(_))
    ));
    assert!(backend.calls().is_empty());
}

#[test]
fn handles_persist_across_trials_and_release_on_close() {
    let backend = VirtualBackend::new().with_device(rsp());
    backend.press_button(RSP, 1, Duration::from_millis(10));
    backend.press_button(RSP, 3, Duration::from_millis(20));
    let mut session = session_with(&backend);

    for _ in 0..2 {
        let prepared = session.prepare(&device_trial()).unwrap();
        session.run(&prepared).unwrap();
    }
    assert_eq!(backend.attach_count(), 1);
    assert_eq!(session.registry().len(), 1);

    session.close();
}

#[test]
fn unplugged_device_falls_back_to_keyboard() {
    let other = DeviceDescriptor::new("/dev/hidraw-other", "EventExchanger-RSP-LT-4", "B");
    let backend = VirtualBackend::new().with_device(rsp()).with_device(other);
    let mut session = session_with(&backend);
    let selector: DeviceSelector = "2: RSP-LT-4 s/n: B".parse().unwrap();

    assert_eq!(session.resolve(&selector), ActiveDevice::Device { slot: 2 });

    backend.unplug("/dev/hidraw-other");
    assert_eq!(session.resolve(&selector), ActiveDevice::Keyboard);
    assert!(!session.registry().contains(2));
}

#[test]
fn failed_reattach_after_path_change_falls_back_to_keyboard() {
    let backend = VirtualBackend::new().with_device(rsp());
    let mut session = session_with(&backend);
    let selector: DeviceSelector = "1: RSP-LT-4 s/n: 00421".parse().unwrap();
    assert_eq!(session.resolve(&selector), ActiveDevice::Device { slot: 1 });

    // Slot 1 now names a different box that cannot be opened.
    let replacement =
        DeviceDescriptor::new("/dev/hidraw-new", "EventExchanger-RSP-LT-4", "00999");
    backend.unplug(RSP);
    backend.plug(replacement.clone());
    backend.refuse_attach(&replacement.path);

    assert_eq!(session.resolve(&selector), ActiveDevice::Keyboard);
    assert!(session.registry().descriptor(1).is_none());
    assert_eq!(backend.attach_count(), 1);
}
