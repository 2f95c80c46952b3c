//! Integration tests for the relay server and its clients
//!
//! These tests run a real server on loopback and drive several clients
//! through it frame by frame.

use assert_approx_eq::assert_approx_eq;
use client::input::InputSample;
use client::network::Client;
use server::network::Server;
use shared::{ActorFlags, ClientId, MAX_PEERS};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;

const FRAME: f32 = 1.0 / 60.0;
const MAX_ROUNDS: usize = 400;

async fn start_server() -> SocketAddr {
    let mut server = Server::bind("127.0.0.1:0", MAX_PEERS).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

/// Updates every client once per round with its own input, letting the
/// server run in between, until `done` holds or the rounds run out.
async fn pump_until<F>(clients: &mut [Client], inputs: &[InputSample], dt: f32, mut done: F) -> bool
where
    F: FnMut(&[Client]) -> bool,
{
    for _ in 0..MAX_ROUNDS {
        for (client, input) in clients.iter_mut().zip(inputs) {
            client.update(*input, dt).await.unwrap();
        }
        if done(clients) {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    false
}

fn idle(count: usize) -> Vec<InputSample> {
    vec![InputSample::default(); count]
}

fn forward() -> InputSample {
    InputSample {
        flags: ActorFlags::FORWARD,
        turn: 0.0,
    }
}

fn local_id(client: &Client) -> ClientId {
    client.world().local_id.expect("local id not learned yet")
}

/// Connects `names.len()` clients one after another and waits until every
/// client knows its own id and every other client.
async fn connect_all(addr: SocketAddr, names: &[&str]) -> Vec<Client> {
    let mut clients = Vec::new();
    for name in names {
        clients.push(Client::connect(addr, Some(name)).await.unwrap());
    }

    let expected = names.len() - 1;
    let settled = pump_until(&mut clients, &idle(names.len()), FRAME, |clients| {
        clients
            .iter()
            .all(|c| c.world().local_id.is_some() && c.world().remotes.len() == expected)
    })
    .await;
    assert!(settled, "clients never learned about each other");
    clients
}

/// JOIN AND PART
mod membership_tests {
    use super::*;

    /// Tests that connected clients learn their ids and each other
    #[tokio::test]
    async fn clients_discover_each_other() {
        let addr = start_server().await;
        let clients = connect_all(addr, &["alice", "bob"]).await;

        let alice = local_id(&clients[0]);
        let bob = local_id(&clients[1]);
        assert_ne!(alice, bob);

        assert!(clients[0].world().remotes.contains(bob));
        assert!(clients[1].world().remotes.contains(alice));
        assert!(!clients[0].world().remotes.contains(alice));
    }

    /// Tests that announced display names reach the other clients
    #[tokio::test]
    async fn display_names_propagate() {
        let addr = start_server().await;
        let mut clients = connect_all(addr, &["alice", "bob"]).await;

        let alice = local_id(&clients[0]);
        let bob = local_id(&clients[1]);

        let named = pump_until(&mut clients, &idle(2), FRAME, |clients| {
            let a = clients[1].world().remotes.find_by_id(alice);
            let b = clients[0].world().remotes.find_by_id(bob);
            matches!((a, b), (Some(a), Some(b)) if a.host == "alice" && b.host == "bob")
        })
        .await;
        assert!(named, "display names never arrived");
    }

    /// Tests that a departing client is removed everywhere else
    #[tokio::test]
    async fn part_removes_remote_actor() {
        let addr = start_server().await;
        let mut clients = connect_all(addr, &["alice", "bob", "carol"]).await;

        let bob = local_id(&clients[1]);
        let leaving = clients.remove(1);
        let inputs = idle(2);
        let (shutdown, gone) = tokio::join!(
            leaving.shutdown(),
            pump_until(&mut clients, &inputs, FRAME, |clients| {
                clients.iter().all(|c| !c.world().remotes.contains(bob))
            })
        );
        shutdown.unwrap();
        assert!(gone, "departed client still present");
        assert!(clients.iter().all(|c| c.world().remotes.len() == 1));
    }
}

/// STATE REPLICATION
mod replication_tests {
    use super::*;

    /// Tests that one client's movement is seen by the others
    #[tokio::test]
    async fn movement_fans_out() {
        let addr = start_server().await;
        let mut clients = connect_all(addr, &["alice", "bob", "carol"]).await;
        let alice = local_id(&clients[0]);

        let placed = pump_until(&mut clients, &idle(3), FRAME, |clients| {
            clients[1..].iter().all(|c| {
                c.world()
                    .remotes
                    .find_by_id(alice)
                    .map_or(false, |actor| actor.should_interpolate)
            })
        })
        .await;
        assert!(placed, "initial full state never arrived");

        let inputs = [forward(), InputSample::default(), InputSample::default()];
        let moved = pump_until(&mut clients, &inputs, FRAME, |clients| {
            clients[1..].iter().all(|c| {
                c.world().remotes.find_by_id(alice).map_or(false, |actor| {
                    actor.flags.contains(ActorFlags::FORWARD) && actor.position.length() > 0.5
                })
            })
        })
        .await;
        assert!(moved, "movement never reached the other clients");

        // the mover sees nothing of itself
        assert!(!clients[0].world().remotes.contains(alice));
    }

    /// Tests that a late joiner is placed at the cached position
    #[tokio::test]
    async fn late_joiner_receives_cached_state() {
        let addr = start_server().await;
        let mut clients = connect_all(addr, &["alice"]).await;
        let alice = local_id(&clients[0]);

        // long enough to pass the cooldown, so stopping sends a full state
        let step = 0.1;
        for _ in 0..30 {
            clients[0].update(forward(), step).await.unwrap();
            sleep(Duration::from_millis(2)).await;
        }
        for _ in 0..10 {
            clients[0].update(InputSample::default(), step).await.unwrap();
            sleep(Duration::from_millis(5)).await;
        }
        let resting = clients[0].world().me.state.position;
        assert!(resting.length() > 10.0);

        clients.push(Client::connect(addr, Some("dave")).await.unwrap());
        let placed = pump_until(&mut clients, &idle(2), FRAME, |clients| {
            clients[1]
                .world()
                .remotes
                .find_by_id(alice)
                .map_or(false, |actor| actor.should_interpolate)
        })
        .await;
        assert!(placed, "late joiner never received the cached state");

        let actor = clients[1].world().remotes.find_by_id(alice).unwrap();
        assert_eq!(actor.host, "alice");
        assert_approx_eq!(actor.position.x, resting.x, 0.2);
        assert_approx_eq!(actor.position.z, resting.z, 0.2);
    }
}
