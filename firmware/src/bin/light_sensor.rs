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

//! LIGHT_SENSOR entry point: samples once it attaches, and again on every jittered
//! `LIGHT_PERIOD_MS` tick, reporting each reading upward.

use mote_core::RoleType;

#[embassy_executor::main]
async fn main(_spawner: embassy_executor::Spawner) {
    env_logger::init();
    mote_firmware::run(RoleType::LightSensor).await;
}
