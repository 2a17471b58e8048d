//! End-to-end tests: editor client against the engine simulator over
//! loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use studio_link::protocol::{ComponentType, EntitySelected, LogSeverity};
use studio_link::{
    Config, ConnectionLost, EngineClient, EngineSimulator, EventDispatcher, InboundEvent,
    SelectionState,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn loopback_config() -> Config {
    Config {
        port: 0,
        ..Config::default()
    }
}

/// Start a simulator and a client whose events all land in one channel.
async fn connected_pair() -> (EngineSimulator, EngineClient, UnboundedReceiver<InboundEvent>) {
    let simulator = EngineSimulator::start(&loopback_config()).await.unwrap();

    let dispatcher = Arc::new(EventDispatcher::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let t = tx.clone();
    dispatcher.on_entity_selected(move |e| {
        let _ = t.send(InboundEvent::EntitySelected(e.clone()));
    });
    let t = tx.clone();
    dispatcher.on_component_properties(move |e| {
        let _ = t.send(InboundEvent::ComponentProperties(e.clone()));
    });
    let t = tx.clone();
    dispatcher.on_entity_position(move |e| {
        let _ = t.send(InboundEvent::EntityPosition(*e));
    });
    dispatcher.on_log_message(move |e| {
        let _ = tx.send(InboundEvent::LogMessage(e.clone()));
    });

    let config = Config {
        port: simulator.local_addr().port(),
        ..Config::default()
    };
    let client = EngineClient::connect_with(&config, dispatcher).await.unwrap();
    (simulator, client, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<InboundEvent>) -> InboundEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("Timed out waiting for an engine event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_entity_and_component_round_trip() {
    let (simulator, client, mut rx) = connected_pair().await;
    let mesh = ComponentType(0xABCD_1234);

    client.create_entity().unwrap();
    let InboundEvent::EntitySelected(EntitySelected::Entity { uid, components }) =
        next_event(&mut rx).await
    else {
        panic!("Expected a selected entity");
    };
    assert!(components.is_empty(), "new entity has no components");

    client.create_component(mesh).unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        InboundEvent::EntitySelected(EntitySelected::Entity { uid, components: vec![mesh] })
    );

    client.set_component_property(mesh, "radius", "2.5").unwrap();
    client.request_component_properties(mesh).unwrap();
    let InboundEvent::ComponentProperties(props) = next_event(&mut rx).await else {
        panic!("Expected component properties");
    };
    assert_eq!(props.component, mesh);
    assert_eq!(props.get("radius").map(|p| p.value.as_str()), Some("2.5"));

    client.remove_entity().unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        InboundEvent::EntitySelected(EntitySelected::Cleared)
    );
    assert_eq!(simulator.world().entity_count(), 0);

    client.close();
    simulator.shutdown();
}

#[tokio::test]
async fn test_position_updates() {
    let (simulator, client, mut rx) = connected_pair().await;

    client.create_entity().unwrap();
    let InboundEvent::EntitySelected(selected) = next_event(&mut rx).await else {
        panic!("Expected a selection");
    };
    let uid = selected.uid();

    client.set_position(uid, 4.0, -2.0, 0.25).unwrap();
    let InboundEvent::EntityPosition(pos) = next_event(&mut rx).await else {
        panic!("Expected a position");
    };
    assert_eq!((pos.uid, pos.x, pos.y, pos.z), (uid, 4.0, -2.0, 0.25));

    client.request_position().unwrap();
    assert_eq!(next_event(&mut rx).await, InboundEvent::EntityPosition(pos));
    assert_eq!(simulator.world().position(uid), Some([4.0, -2.0, 0.25]));

    client.close();
    simulator.shutdown();
}

#[tokio::test]
async fn test_universe_and_script_commands_log() {
    let (simulator, client, mut rx) = connected_pair().await;

    client.save_universe_as("universes/test.unv").unwrap();
    client.reload_script("scripts/player.lua").unwrap();
    client.start_game_mode().unwrap();

    for expected in ["universes/test.unv", "scripts/player.lua", "Game mode started"] {
        let InboundEvent::LogMessage(log) = next_event(&mut rx).await else {
            panic!("Expected a log message");
        };
        assert_eq!(log.severity, LogSeverity::Info);
        assert!(log.message.contains(expected), "{:?} missing {expected}", log.message);
    }

    client.close();
    simulator.shutdown();
}

#[tokio::test]
async fn test_viewport_input_is_fire_and_forget() {
    let (simulator, client, mut rx) = connected_pair().await;

    client.mouse_down(10, 10, 0).unwrap();
    client.mouse_move(12, 11, 2, 1, 1).unwrap();
    client.mouse_up(12, 11, 0).unwrap();
    client.navigate(1.0, 0.0, true).unwrap();
    client.look_at_selected().unwrap();
    // A command with a reply, to prove the ones before it produced nothing.
    client.new_universe().unwrap();

    let InboundEvent::LogMessage(log) = next_event(&mut rx).await else {
        panic!("Expected only the new-universe log");
    };
    assert!(log.message.contains("New universe"));

    client.close();
    simulator.shutdown();
}

#[tokio::test]
async fn test_selection_state_tracks_engine() {
    let simulator = EngineSimulator::start(&loopback_config()).await.unwrap();
    let dispatcher = Arc::new(EventDispatcher::new());
    let selection = SelectionState::track(&dispatcher);
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.on_entity_selected(move |e| {
        let _ = tx.send(e.clone());
    });

    let config = Config {
        port: simulator.local_addr().port(),
        ..Config::default()
    };
    let client = EngineClient::connect_with(&config, dispatcher).await.unwrap();

    client.create_entity().unwrap();
    let selected = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        selection.lock().selected().map(|s| s.uid),
        Some(selected.uid())
    );

    client.close();
    assert_eq!(client.closed().await, ConnectionLost::Closed);
    assert!(selection.lock().selected().is_none());
    simulator.shutdown();
}

#[tokio::test]
async fn test_connect_refused_is_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config {
        port,
        ..Config::default()
    };
    assert!(EngineClient::connect(&config).await.is_err());
}
