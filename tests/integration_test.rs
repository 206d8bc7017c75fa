//! Integration tests for the control-plane proxy
//!
//! These tests drive the public API end to end on the desktop stub engine:
//! - Session lifecycle through host lifecycle commands
//! - Delay pinning against concurrent engine feedback
//! - Attach/detach cycles of transient observers
//! - Teardown guarantees for the engine handle

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use futures::StreamExt;
use stream_audio::config::ControlConfig;
use stream_audio::{
    AppConfig, ControlService, DisplayUpdate, ErrorCode, LifecycleCommand, SessionError,
    StubEngine,
};

fn fast_config() -> AppConfig {
    AppConfig {
        control: ControlConfig {
            poll_interval_ms: 10,
            delay_step_ms: 25,
            ..ControlConfig::default()
        },
        ..AppConfig::default()
    }
}

fn start_service() -> (ControlService, Arc<StubEngine>) {
    let engine = Arc::new(StubEngine::new());
    let service = ControlService::new(fast_config(), engine.clone())
        .expect("control service should start");
    (service, engine)
}

/// Host triggers start and stop the session without any UI attached
#[test]
fn test_lifecycle_commands_headless() {
    let (service, engine) = start_service();

    service
        .handle_command(LifecycleCommand::Play {
            address: "192.168.1.20:25204".to_string(),
        })
        .unwrap();
    assert!(service.is_playing());
    assert_eq!(engine.active_count(), 1);

    service.handle_command(LifecycleCommand::Stop).unwrap();
    assert!(!service.is_playing());
    assert_eq!(engine.active_count(), 0);
}

/// Unparsable addresses surface as engine errors and leave the session stopped
#[test]
fn test_unparsable_address_is_engine_error() {
    let (service, engine) = start_service();
    let result = service.handle_command(LifecycleCommand::Play {
        address: "not an address".to_string(),
    });

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::EngineError { .. }));
    assert_eq!(err.code(), 3003);
    assert!(!service.is_playing());
    assert_eq!(engine.open_count(), 0);
}

/// A configured step size drives increase/decrease granularity
#[test]
fn test_configured_step_size() {
    let (service, _engine) = start_service();
    let proxy = service.attach(stream_audio::ChannelObserver::new().0);

    proxy.play("127.0.0.1:25204").unwrap();
    assert_eq!(proxy.increase_delay().unwrap(), 25);
    assert_eq!(proxy.increase_delay().unwrap(), 50);
    assert_eq!(proxy.decrease_delay().unwrap(), 25);
    assert!(proxy.is_delay_fixed().unwrap());
}

/// Engine reports arriving from another thread never override a pinned delay
#[test]
fn test_pinned_delay_under_concurrent_reports() {
    let (service, engine) = start_service();
    let proxy = service.attach(stream_audio::ChannelObserver::new().0);
    proxy.play("127.0.0.1:25204").unwrap();

    let feeder_engine = Arc::clone(&engine);
    let feeder = thread::spawn(move || {
        for delay_ms in 0..200 {
            feeder_engine.emit_delay(delay_ms);
            thread::sleep(Duration::from_micros(200));
        }
    });

    for delay_ms in [100, 150, 175] {
        proxy.fix_delay_at(delay_ms).unwrap();
        assert_eq!(proxy.get_delay_ms().unwrap(), delay_ms);
        assert!(proxy.is_delay_fixed().unwrap());
    }
    feeder.join().unwrap();
    assert_eq!(proxy.get_delay_ms().unwrap(), 175);

    proxy.unfix_delay().unwrap();
    engine.emit_delay(33);
    assert_eq!(proxy.get_delay_ms().unwrap(), 33);
}

/// UI instances come and go while the session keeps playing
#[test]
fn test_repeated_ui_attach_cycles() {
    let (service, engine) = start_service();
    service
        .handle_command(LifecycleCommand::Play {
            address: "127.0.0.1:25204".to_string(),
        })
        .unwrap();
    engine.emit_delay(140);

    for _ in 0..5 {
        let (proxy, mut updates) = service.attach_stream();
        assert!(proxy.is_playing());
        assert_eq!(
            block_on(updates.next()),
            Some(DisplayUpdate::Playing { playing: true })
        );
        assert_eq!(
            block_on(updates.next()),
            Some(DisplayUpdate::Delay { delay_ms: 140 })
        );
        proxy.detach();
    }

    let status = service.status().unwrap();
    assert!(status.playing);
    assert!(!status.attached);
    assert_eq!(status.delay_ms, 140);
    assert_eq!(engine.open_count(), 1);
}

/// Dropping a proxy handle detaches it without blocking
#[test]
fn test_dropped_handle_detaches() {
    let (service, _engine) = start_service();
    let (proxy, _updates) = service.attach_stream();
    assert!(!proxy.is_detached());
    drop(proxy);

    assert!(!service.status().unwrap().attached);
}

/// Dropping the service releases a playing engine handle exactly once
#[test]
fn test_service_drop_releases_engine_handle() {
    let (service, engine) = start_service();
    let proxy = service.attach(stream_audio::ChannelObserver::new().0);
    proxy.play("127.0.0.1:25204").unwrap();
    assert_eq!(engine.active_count(), 1);

    drop(service);
    assert_eq!(engine.active_count(), 0);
    assert_eq!(engine.close_count(), 1);

    assert!(matches!(
        proxy.play("127.0.0.1:25204"),
        Err(SessionError::ServiceUnavailable)
    ));
    assert_eq!(engine.open_count(), 1);
}

/// Close failures are reported but still leave the session stopped
#[test]
fn test_close_failure_reported_once() {
    let (service, engine) = start_service();
    let proxy = service.attach(stream_audio::ChannelObserver::new().0);
    proxy.play("127.0.0.1:25204").unwrap();

    engine.fail_next_close("transport already gone");
    assert!(matches!(
        proxy.stop(),
        Err(SessionError::EngineError { .. })
    ));
    assert!(!proxy.is_playing());
    proxy.stop().unwrap();

    drop(service);
    assert_eq!(engine.close_count(), 1);
}
