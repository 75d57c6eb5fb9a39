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

//! Macros for generating parseable event log messages

#[macro_export]
macro_rules! event_log {
    ($uptime:expr,$node_id:expr,$kind:expr,$content:expr) => {
        info!("${};{};{};{}", $uptime, $node_id, $kind, $content);
    };
}

#[macro_export]
macro_rules! event_log_msg {
    ($uptime:expr,$node_id:expr,$content:expr) => {
        event_log!($uptime, $node_id, "message", $content);
    };
}

#[macro_export]
macro_rules! event_log_action {
    ($uptime:expr,$node_id:expr,$action:expr) => {
        event_log!($uptime, $node_id, "action", $action);
    };
}

#[macro_export]
macro_rules! event_log_reset {
    ($uptime:expr,$node_id:expr,$role:expr) => {
        info!("${};{};reset;{{\"role\":{}}}", $uptime, $node_id, $role as u8);
    };
}

#[macro_export]
macro_rules! event_log_parent {
    ($uptime:expr,$node_id:expr,$outcome:expr,$parent:expr) => {
        info!(
            "${};{};parent;{{\"outcome\":\"{:?}\",\"addr\":{},\"rank\":{}}}",
            $uptime, $node_id, $outcome, $parent.addr, $parent.rank
        );
    };
}

#[macro_export]
macro_rules! event_log_route {
    ($uptime:expr,$node_id:expr,$outcome:expr,$destination:expr,$next_hop:expr) => {
        info!(
            "${};{};route;{{\"outcome\":\"{:?}\",\"dest\":{},\"next_hop\":{}}}",
            $uptime, $node_id, $outcome, $destination, $next_hop
        );
    };
}

#[macro_export]
macro_rules! event_log_detach {
    ($uptime:expr,$node_id:expr) => {
        info!("${};{};detach;{{}}", $uptime, $node_id);
    };
}
