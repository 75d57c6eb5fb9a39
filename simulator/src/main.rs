//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

mod logger;
mod sim;

use std::env;

use log::{info, Level};
use protocol_api::{Action as ProtocolAction, Protocol};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use mote_core::{HostEvent, Message, Mote, NodeId, RoleType, TimeMs};
use sim::{
    check_visibility_based_on_distance, forward_message, get_distance, synthetic_rssi,
    write_metadata_to_file, Coordinates, Event, ProtocolWrapper,
};
use sorted_linked_list::SortedLinkedList;

/// This simulator has no per-channel concept (§9): every mote listens on the one shared medium.
pub(crate) type Channel = mote_core::Channel;
pub(crate) type ProtocolImpl = Mote;
pub(crate) type Action = ProtocolAction<TimeMs, NodeId, Message, Channel>;
pub(crate) type Data = HostEvent;

/// How long the medium is considered occupied by one frame, for collision detection.
pub(crate) const TIME_ON_AIR: TimeMs = 50;

pub(crate) const ROOT_ID: NodeId = 0;

struct Config {
    seed: u64,
    num_nodes: usize,
    range: u32,
    time_min: u64,
    log_level: Level,
    event_log_path: Option<String>,
    node_metadata_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            num_nodes: 20,
            range: 150,
            time_min: 60,
            log_level: Level::Info,
            event_log_path: None,
            node_metadata_path: None,
        }
    }
}

fn parse_level(s: &str) -> Level {
    match s {
        "error" => Level::Error,
        "warn" => Level::Warn,
        "info" => Level::Info,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        other => panic!("unknown --log_level {other}"),
    }
}

/// Hand-rolled `--flag value` pair parsing, same shape as the teacher's CLI: this tool has few
/// enough flags that a dedicated argument-parsing crate would be pure overhead.
fn parse_args() -> Config {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config = Config::default();

    for chunk in args.chunks_exact(2) {
        let value = chunk[1].as_str();
        match chunk[0].as_str() {
            "--seed" => config.seed = value.parse().expect("--seed expects an integer"),
            "--nodes" => config.num_nodes = value.parse().expect("--nodes expects an integer"),
            "--range" => config.range = value.parse().expect("--range expects an integer"),
            "--time_min" => config.time_min = value.parse().expect("--time_min expects an integer"),
            "--log_level" => config.log_level = parse_level(value),
            "--event_log" => config.event_log_path = Some(value.to_string()),
            "--node_metadata" => config.node_metadata_path = Some(value.to_string()),
            other => panic!("unknown argument {other}"),
        }
    }

    config
}

fn get_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Node 0 is always ROOT; the remainder cycle through the other five roles so every run gets a
/// mixed topology without needing its own distribution flag.
fn create_nodes(num_nodes: usize, range: u32, rng: &mut impl RngCore) -> Vec<ProtocolWrapper> {
    assert!(num_nodes >= 1, "a topology needs at least a root");

    let roles = [
        RoleType::Forwarder,
        RoleType::LightSensor,
        RoleType::ActuatorSprinkler,
        RoleType::ActuatorLight,
        RoleType::MobileOperator,
    ];

    // Scatter nodes over a square whose side grows with the node count, so a reasonably dense
    // topology still needs more than one hop to reach every leaf from the root.
    let side = range as f32 * (num_nodes as f32).sqrt().max(1.0);

    let mut nodes = Vec::with_capacity(num_nodes);
    nodes.push(ProtocolWrapper::new(
        ProtocolImpl::new(ROOT_ID, RoleType::Root),
        Coordinates::from((0, 0)),
    ));

    for id in 1..num_nodes {
        let role = roles[(id - 1) % roles.len()];
        let x = (rng.next_u32() as f32 / u32::MAX as f32 - 0.5) * side;
        let y = (rng.next_u32() as f32 / u32::MAX as f32 - 0.5) * side;
        nodes.push(ProtocolWrapper::new(
            ProtocolImpl::new(id as NodeId, role),
            Coordinates::from((x as i64, y as i64)),
        ));
    }

    nodes
}

/// Run the discrete event simulation until `end_time`, returning every `HostEvent` ROOT surfaced
/// along the way (§6: the ACK/LIGHT lines the serial host would have printed).
pub(crate) fn run(
    mut nodes: Vec<ProtocolWrapper>,
    range: u32,
    packet_error_rate_ppt: Option<u32>,
    end_time: TimeMs,
    host_commands: Vec<(TimeMs, RoleType)>,
    mut rng: ChaCha8Rng,
) -> Vec<HostEvent> {
    let mut event_queue: SortedLinkedList<Event> = SortedLinkedList::new();
    let mut collected = Vec::new();

    for node in &nodes {
        event_queue.push(Event::new(0, node.id(), None));
    }
    for (time, role) in host_commands {
        event_queue.push(Event::host_command(time, ROOT_ID, role));
    }

    while let Some(event) = event_queue.pop() {
        if event.time > end_time {
            break;
        }

        let node_id = event.node_id;

        if let Some(target_role) = event.host_command {
            nodes[node_id as usize].issue_turn_on(target_role, event.time, &mut rng);
        }

        let mut incoming = event.message.as_ref().and_then(|wrapper| {
            if wrapper.is_corrupt {
                None
            } else {
                let sender_loc = nodes[wrapper.origin as usize].location().clone();
                let receiver_loc = nodes[node_id as usize].location().clone();
                let distance = get_distance(&sender_loc, &receiver_loc);
                Some((wrapper.message.clone(), synthetic_rssi(distance)))
            }
        });

        let mut time = event.time;

        // A transmit is immediately followed by another `progress()` call at the same instant to
        // learn what the mote does next (wait, or start receiving) — the event queue only ever
        // needs to hold the *next externally-visible* event per node.
        loop {
            let (action, host_events) = nodes[node_id as usize].progress(time, incoming, &mut rng);
            if let Some(host_events) = host_events {
                collected.extend(host_events);
            }
            incoming = None;

            match action {
                Action::None => break,
                Action::Wait { end } => {
                    event_queue.push(Event::new(end, node_id, None));
                    break;
                }
                Action::Receive { end, .. } => {
                    event_queue.push(Event::new(end, node_id, None));
                    break;
                }
                Action::Transmit { dest, message, delay, .. } => {
                    let departure = time + delay.unwrap_or(0);
                    forward_message(
                        departure,
                        node_id,
                        dest,
                        &message,
                        &mut event_queue,
                        &nodes,
                        |a, b| check_visibility_based_on_distance(a, b, range),
                        packet_error_rate_ppt,
                        &mut rng,
                    );
                    time = departure;
                }
            }
        }
    }

    collected
}

fn main() {
    let config = parse_args();
    logger::init(config.log_level, config.event_log_path.as_deref())
        .expect("logger already initialized");

    let mut rng = get_rng(config.seed);
    let nodes = create_nodes(config.num_nodes, config.range, &mut rng);

    if let Some(path) = &config.node_metadata_path {
        write_metadata_to_file(&nodes, config.range, path).expect("failed to write node metadata");
    }

    info!(
        "simulating {} nodes for {} minutes (seed {})",
        config.num_nodes, config.time_min, config.seed
    );

    let end_time = config.time_min * 60_000;
    let host_events = run(nodes, config.range, None, end_time, Vec::new(), rng);

    // §6: the exact textual lines the serial host prints on ROOT's UART.
    for event in host_events {
        match event {
            HostEvent::Ack { role, .. } => println!("Ack received from:\n{}", role as u8),
            HostEvent::Light { level, .. } => println!("LIGHTSENSOR{level}\nLIGHTSENSOR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> ChaCha8Rng {
        get_rng(42)
    }

    fn chain(roles: &[RoleType], spacing: i64) -> Vec<ProtocolWrapper> {
        roles
            .iter()
            .enumerate()
            .map(|(id, role)| {
                ProtocolWrapper::new(
                    ProtocolImpl::new(id as NodeId, *role),
                    Coordinates::from((id as i64 * spacing, 0)),
                )
            })
            .collect()
    }

    /// S1 — a chain of forwarders attaches hop by hop without panicking or raising host events.
    #[test]
    fn chain_of_forwarders_attaches() {
        let nodes = chain(
            &[RoleType::Root, RoleType::Forwarder, RoleType::Forwarder],
            80,
        );
        let events = run(nodes, 100, None, 5 * 60_000, Vec::new(), rng());
        assert!(events.is_empty());
    }

    /// S2 — a light sensor two hops behind root reports, and the reading reaches the root.
    #[test]
    fn light_sensor_report_reaches_root_over_two_hops() {
        let nodes = chain(
            &[RoleType::Root, RoleType::Forwarder, RoleType::LightSensor],
            80,
        );
        let events = run(nodes, 100, None, 10 * 60_000, Vec::new(), rng());
        assert!(
            events.iter().any(|e| matches!(e, HostEvent::Light { from, .. } if *from == 2)),
            "expected a LIGHT host event from node 2, got {events:?}"
        );
    }

    /// S3 — a WATER command fans out to a sprinkler two hops away and its ACK reaches root.
    #[test]
    fn water_command_reaches_sprinkler_and_acks_back() {
        let nodes = chain(
            &[RoleType::Root, RoleType::Forwarder, RoleType::ActuatorSprinkler],
            80,
        );
        let events = run(
            nodes,
            100,
            None,
            10 * 60_000,
            vec![(6 * 60_000, RoleType::ActuatorSprinkler)],
            rng(),
        );
        assert!(
            events.iter().any(|e| matches!(
                e,
                HostEvent::Ack { from, role } if *from == 2 && *role == RoleType::ActuatorSprinkler
            )),
            "expected an ACK host event from the sprinkler, got {events:?}"
        );
    }

    /// S4 — a sensor with no root in range keeps soliciting but never attaches, so it never
    /// samples or reports (only an attached sensor does, §4.6).
    #[test]
    fn isolated_sensor_never_joins_or_reports() {
        let nodes = vec![ProtocolWrapper::new(
            ProtocolImpl::new(0, RoleType::LightSensor),
            Coordinates::from((0, 0)),
        )];
        let events = run(nodes, 100, None, 10 * 60_000, Vec::new(), rng());
        assert!(events.is_empty());
    }

    /// S5 — a sensor joins through whichever of two equally-ranked forwarders it hears with the
    /// better RSS (here, whichever is physically closer), and its report still reaches root.
    #[test]
    fn sensor_prefers_closer_forwarder() {
        let nodes = vec![
            ProtocolWrapper::new(ProtocolImpl::new(0, RoleType::Root), Coordinates::from((0, 0))),
            ProtocolWrapper::new(
                ProtocolImpl::new(1, RoleType::Forwarder),
                Coordinates::from((40, 0)),
            ),
            ProtocolWrapper::new(
                ProtocolImpl::new(2, RoleType::Forwarder),
                Coordinates::from((0, 40)),
            ),
            ProtocolWrapper::new(
                ProtocolImpl::new(3, RoleType::LightSensor),
                Coordinates::from((20, 38)),
            ),
        ];
        let events = run(nodes, 100, None, 10 * 60_000, Vec::new(), rng());
        assert!(
            events.iter().any(|e| matches!(e, HostEvent::Light { from, .. } if *from == 3)),
            "expected the sensor to join through whichever forwarder it heard best and report, got {events:?}"
        );
    }

    /// S6 — a mobile operator joins via a forwarder (it refuses ROOT as a parent directly, §4.2)
    /// and runs its maintenance probe burst against an actuator hanging off that same forwarder,
    /// without the simulation panicking or deadlocking.
    #[test]
    fn mobile_operator_completes_maintenance_round() {
        let nodes = vec![
            ProtocolWrapper::new(ProtocolImpl::new(0, RoleType::Root), Coordinates::from((0, 0))),
            ProtocolWrapper::new(
                ProtocolImpl::new(1, RoleType::Forwarder),
                Coordinates::from((80, 0)),
            ),
            ProtocolWrapper::new(
                ProtocolImpl::new(2, RoleType::MobileOperator),
                Coordinates::from((80, 40)),
            ),
            ProtocolWrapper::new(
                ProtocolImpl::new(3, RoleType::ActuatorLight),
                Coordinates::from((80, -40)),
            ),
        ];
        let events = run(nodes, 100, None, 10 * 60_000, Vec::new(), rng());
        assert!(events.is_empty());
    }
}
